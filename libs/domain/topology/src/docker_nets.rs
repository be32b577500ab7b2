// [libs/domain/topology/src/docker_nets.rs]
/*!
 * APARATO: DOCKER NETWORK EVIDENCE PARSER
 * RESPONSABILIDAD: Aristas de membresía de red Docker (method=docker).
 *
 * Por cada red nombrada: arista al gateway y aristas contenedor-a-
 * contenedor por IP entre pares de la misma red. Los mapeos de puertos
 * con IP de host explícita producen aristas adicionales host→mapeo.
 */

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use sysmap_core_document::{expect_array, safe_str};
use sysmap_domain_models::topology::{DetectionMethod, EdgeDraft};

use crate::{draft, ResolutionContext};

/// Mapeo "ip:host_port->container_port/proto" del listado de puertos.
static EXPLICIT_PORT_MAPPING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,3}(?:\.\d{1,3}){3}):(\d{1,5})->(\d{1,5})/(tcp|udp)").unwrap()
});

pub(crate) fn edges_from_docker_networks(
    document: &Value,
    resolution: &ResolutionContext<'_>,
) -> Vec<EdgeDraft> {
    let mut drafts = Vec::new();

    // 1. REDES: gateway + pares de la misma red nombrada.
    for network_entry in expect_array(document.get("docker_networks")) {
        let network_name = safe_str(network_entry.get("name"));
        let gateway_ip = safe_str(network_entry.get("gateway"));

        if !gateway_ip.is_empty() {
            if let Some(edge) = draft(
                resolution,
                &gateway_ip,
                0,
                None,
                DetectionMethod::Docker,
                format!("gateway of docker network {}", network_name),
            ) {
                drafts.push(edge);
            }
        }

        let members = expect_array(network_entry.get("containers"));
        for member in &members {
            let member_name = safe_str(member.get("name"));

            for peer in &members {
                let peer_name = safe_str(peer.get("name"));
                let peer_ip = safe_str(peer.get("ip"));

                if peer_name == member_name || peer_ip.is_empty() {
                    continue;
                }

                if let Some(edge) = draft(
                    resolution,
                    &peer_ip,
                    0,
                    Some(member_name.clone()),
                    DetectionMethod::Docker,
                    format!("peer {} on docker network {}", peer_name, network_name),
                ) {
                    drafts.push(edge);
                }
            }
        }
    }

    // 2. MAPEOS DE PUERTOS con IP de host explícita.
    for container_entry in expect_array(document.get("docker_containers")) {
        let container_name = safe_str(container_entry.get("name"));
        let ports_blob = safe_str(container_entry.get("ports"));

        for capture in EXPLICIT_PORT_MAPPING.captures_iter(&ports_blob) {
            let mapped_ip = capture[1].to_string();
            // 0.0.0.0 es comodín, no una IP de host explícita.
            if mapped_ip == "0.0.0.0" {
                continue;
            }

            let host_port: i64 = capture[2].parse().unwrap_or(0);

            if let Some(edge) = draft(
                resolution,
                &mapped_ip,
                host_port,
                Some(container_name.clone()),
                DetectionMethod::Docker,
                format!("explicit port mapping {}", &capture[0]),
            ) {
                drafts.push(edge);
            }
        }
    }

    drafts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HostIndex;
    use serde_json::json;

    fn resolution(host_index: &HostIndex) -> ResolutionContext<'_> {
        ResolutionContext { host_index, etc_hosts: Default::default() }
    }

    #[test]
    fn certify_gateway_and_peer_edges() {
        let host_index = HostIndex::new();
        let document = json!({
            "docker_networks": [{
                "name": "appnet",
                "gateway": "172.18.0.1",
                "containers": [
                    {"name": "api", "ip": "172.18.0.2"},
                    {"name": "db", "ip": "172.18.0.3"}
                ]
            }]
        });

        let edges = edges_from_docker_networks(&document, &resolution(&host_index));

        assert!(edges.iter().any(|e| e.target_ip == "172.18.0.1" && e.source_process.is_none()));
        assert!(edges.iter().any(|e| {
            e.target_ip == "172.18.0.3" && e.source_process.as_deref() == Some("api")
        }));
        assert!(edges.iter().any(|e| {
            e.target_ip == "172.18.0.2" && e.source_process.as_deref() == Some("db")
        }));
        assert!(edges.iter().all(|e| e.detection_method == DetectionMethod::Docker));
    }

    #[test]
    fn certify_explicit_port_mapping_edges() {
        let host_index = HostIndex::new();
        let document = json!({
            "docker_containers": [{
                "name": "proxy",
                "ports": "10.0.0.10:8443->443/tcp;0.0.0.0:8080->80/tcp;"
            }]
        });

        let edges = edges_from_docker_networks(&document, &resolution(&host_index));
        // Solo el mapeo con IP explícita sobrevive; 0.0.0.0 es comodín.
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target_ip, "10.0.0.10");
        assert_eq!(edges[0].target_port, 8443);
    }
}
