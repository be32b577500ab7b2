// [libs/domain/topology/src/static_sources.rs]
/*!
 * APARATO: STATIC HOSTS & ARP EVIDENCE PARSER
 * RESPONSABILIDAD: Aristas desde /etc/hosts y tabla ARP (method=arp).
 *
 * Ambas fuentes solo aportan cuando la IP resuelve a un host conocido
 * del inventario; la tabla ARP descarta además vecinos en FAILED.
 */

use serde_json::Value;

use sysmap_core_document::{expect_array, safe_str};
use sysmap_domain_models::topology::{DetectionMethod, EdgeDraft};

use crate::{is_loopback, ResolutionContext};

pub(crate) fn edges_from_etc_hosts(
    document: &Value,
    resolution: &ResolutionContext<'_>,
) -> Vec<EdgeDraft> {
    let mut drafts = Vec::new();

    for hosts_entry in expect_array(document.get("etc_hosts")) {
        let entry_ip = safe_str(hosts_entry.get("ip"));
        let entry_hostname = safe_str(hosts_entry.get("hostname"));

        if entry_ip.is_empty() || is_loopback(&entry_ip) {
            continue;
        }

        // Solo IPs que el inventario conoce.
        let Some(known_host_id) = resolution.host_index.host_id_for_ip(&entry_ip) else {
            continue;
        };

        drafts.push(EdgeDraft {
            target_host_id: Some(known_host_id.to_string()),
            target_ip: entry_ip.clone(),
            target_port: 0,
            source_process: None,
            detection_method: DetectionMethod::Arp,
            details: format!("/etc/hosts entry {} {}", entry_ip, entry_hostname),
        });
    }

    drafts
}

pub(crate) fn edges_from_arp_table(
    document: &Value,
    resolution: &ResolutionContext<'_>,
) -> Vec<EdgeDraft> {
    let mut drafts = Vec::new();

    for neighbor_entry in expect_array(document.get("arp_table")) {
        let neighbor_ip = safe_str(neighbor_entry.get("ip"));
        let neighbor_state = safe_str(neighbor_entry.get("state")).to_ascii_uppercase();

        if neighbor_ip.is_empty() || is_loopback(&neighbor_ip) {
            continue;
        }
        if neighbor_state == "FAILED" {
            continue;
        }

        let Some(known_host_id) = resolution.host_index.host_id_for_ip(&neighbor_ip) else {
            continue;
        };

        drafts.push(EdgeDraft {
            target_host_id: Some(known_host_id.to_string()),
            target_ip: neighbor_ip.clone(),
            target_port: 0,
            source_process: None,
            detection_method: DetectionMethod::Arp,
            details: format!(
                "arp neighbor {} ({})",
                neighbor_ip,
                safe_str(neighbor_entry.get("mac"))
            ),
        });
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
    fn certify_etc_hosts_only_known_ips() {
        let mut host_index = HostIndex::new();
        host_index.register("host-b", "10.0.0.11", Some("db01"));

        let document = json!({
            "etc_hosts": [
                {"ip": "10.0.0.11", "hostname": "db01"},
                {"ip": "203.0.113.9", "hostname": "external"},
                {"ip": "127.0.0.1", "hostname": "localhost"}
            ]
        });

        let edges = edges_from_etc_hosts(&document, &resolution(&host_index));
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target_host_id.as_deref(), Some("host-b"));
        assert_eq!(edges[0].detection_method, DetectionMethod::Arp);
    }

    #[test]
    fn certify_arp_failed_state_excluded() {
        let mut host_index = HostIndex::new();
        host_index.register("host-b", "10.0.0.11", None);
        host_index.register("host-c", "10.0.0.12", None);

        let document = json!({
            "arp_table": [
                {"ip": "10.0.0.11", "mac": "aa:bb", "device": "eth0", "state": "REACHABLE"},
                {"ip": "10.0.0.12", "mac": "", "device": "eth0", "state": "FAILED"},
                {"ip": "192.0.2.77", "mac": "cc:dd", "device": "eth0", "state": "STALE"}
            ]
        });

        let edges = edges_from_arp_table(&document, &resolution(&host_index));
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target_ip, "10.0.0.11");
    }
}
