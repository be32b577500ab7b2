// [libs/domain/topology/src/sockets.rs]
/*!
 * APARATO: SOCKET EVIDENCE PARSER
 * RESPONSABILIDAD: Aristas desde sockets establecidos (method=socket).
 */

use serde_json::Value;

use sysmap_core_document::{expect_array, safe_str};
use sysmap_domain_models::topology::{DetectionMethod, EdgeDraft};

use crate::{draft, split_endpoint, ResolutionContext};

/// Un par remoto distinto de wildcard/loopback produce una arista
/// atribuida al proceso reportado.
pub(crate) fn edges_from_sockets(
    document: &Value,
    resolution: &ResolutionContext<'_>,
) -> Vec<EdgeDraft> {
    let mut drafts = Vec::new();

    for socket_entry in expect_array(document.get("sockets")) {
        let peer_endpoint = safe_str(socket_entry.get("peer"));
        if peer_endpoint.is_empty() || peer_endpoint.starts_with('*') {
            continue;
        }

        let Some((peer_ip, peer_port)) = split_endpoint(&peer_endpoint) else {
            continue;
        };

        // Pares wildcard ("0.0.0.0", "::") no son conexiones reales.
        if peer_ip == "0.0.0.0" || peer_ip == "::" {
            continue;
        }

        let source_process = {
            let process_name = safe_str(socket_entry.get("process"));
            if process_name.is_empty() { None } else { Some(process_name) }
        };

        if let Some(edge) = draft(
            resolution,
            &peer_ip,
            peer_port,
            source_process,
            DetectionMethod::Socket,
            format!("established socket to {}", peer_endpoint),
        ) {
            drafts.push(edge);
        }
    }

    drafts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HostIndex;
    use serde_json::json;

    #[test]
    fn certify_socket_attribution() {
        let mut host_index = HostIndex::new();
        host_index.register("host-b", "10.0.0.11", None);

        let document = json!({
            "sockets": [
                {"local": "10.0.0.10:5599", "peer": "10.0.0.11:5432", "process": "postgres", "pid": 812},
                {"local": "10.0.0.10:5600", "peer": "*", "process": "x", "pid": 1}
            ]
        });
        let resolution = ResolutionContext { host_index: &host_index, etc_hosts: Default::default() };

        let edges = edges_from_sockets(&document, &resolution);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].source_process.as_deref(), Some("postgres"));
        assert_eq!(edges[0].target_host_id.as_deref(), Some("host-b"));
        assert_eq!(edges[0].target_port, 5432);
    }

    #[test]
    fn certify_ipv6_peer_parsing() {
        let host_index = HostIndex::new();
        let document = json!({
            "sockets": [{"local": "[::1]:9", "peer": "[2001:db8::7]:443", "process": "curl", "pid": 4}]
        });
        let resolution = ResolutionContext { host_index: &host_index, etc_hosts: Default::default() };

        let edges = edges_from_sockets(&document, &resolution);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target_ip, "2001:db8::7");
        assert_eq!(edges[0].target_port, 443);
    }
}
