// [libs/domain/topology/src/lib.rs]
/*!
 * =================================================================
 * APARATO: TOPOLOGY CORRELATOR (V4.4 - SIX SOURCE FUSION)
 * CLASIFICACIÓN: DOMAIN ENGINE (ESTRATO L2)
 * RESPONSABILIDAD: DERIVACIÓN DE ARISTAS DESDE EVIDENCIA HETEROGÉNEA
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. PURE FUNCTION: la correlación es función exclusiva del documento
 *    crudo y del índice de hosts; ninguna otra entrada participa.
 * 2. SIX SOURCES: sockets activos, configs de webserver, entorno de
 *    contenedores, redes Docker, /etc/hosts estático y tabla ARP.
 * 3. DEDUP LAW: unicidad por (target_ip, target_port, source_process);
 *    loopback se descarta siempre.
 * 4. RESOLUTION ORDER: el etc_hosts recolectado precede al índice de
 *    inventario al resolver nombres.
 * =================================================================
 */

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::debug;

use sysmap_core_document::{expect_array, safe_str};
use sysmap_domain_models::topology::{DetectionMethod, EdgeDraft};

mod sockets;
mod webserver;
mod containers;
mod docker_nets;
mod static_sources;

// ------------------------------------------------------------------
// ÍNDICE DE HOSTS
// ------------------------------------------------------------------

/// Índice mínimo del inventario: ip→id y hostname→(id, ip).
#[derive(Debug, Clone, Default)]
pub struct HostIndex {
    by_ip: HashMap<String, String>,
    by_hostname: HashMap<String, (String, String)>,
}

impl HostIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, host_id: &str, ip: &str, hostname: Option<&str>) {
        self.by_ip.insert(ip.to_string(), host_id.to_string());
        if let Some(name) = hostname {
            if !name.is_empty() {
                self.by_hostname
                    .insert(name.to_ascii_lowercase(), (host_id.to_string(), ip.to_string()));
            }
        }
    }

    pub fn host_id_for_ip(&self, ip: &str) -> Option<&str> {
        self.by_ip.get(ip).map(String::as_str)
    }

    pub fn resolve_hostname(&self, hostname: &str) -> Option<(&str, &str)> {
        self.by_hostname
            .get(&hostname.to_ascii_lowercase())
            .map(|(host_id, ip)| (host_id.as_str(), ip.as_str()))
    }
}

// ------------------------------------------------------------------
// RESOLUCIÓN DE OBJETIVOS
// ------------------------------------------------------------------

/// Contexto de resolución de una pasada: etc_hosts del documento
/// primero, índice de inventario después.
pub(crate) struct ResolutionContext<'a> {
    pub host_index: &'a HostIndex,
    pub etc_hosts: HashMap<String, String>,
}

impl<'a> ResolutionContext<'a> {
    fn from_document(document: &Value, host_index: &'a HostIndex) -> Self {
        let mut etc_hosts = HashMap::new();
        for entry in expect_array(document.get("etc_hosts")) {
            let ip = safe_str(entry.get("ip"));
            let hostname = safe_str(entry.get("hostname")).to_ascii_lowercase();
            if !ip.is_empty() && !hostname.is_empty() {
                etc_hosts.insert(hostname, ip);
            }
        }
        Self { host_index, etc_hosts }
    }

    /// Resuelve un objetivo textual (IP o nombre) a (ip, host_id?).
    pub fn resolve_target(&self, target: &str) -> Option<(String, Option<String>)> {
        let trimmed_target = target.trim().trim_matches(|c| c == '[' || c == ']');
        if trimmed_target.is_empty() {
            return None;
        }

        if looks_like_ip(trimmed_target) {
            let host_id = self
                .host_index
                .host_id_for_ip(trimmed_target)
                .map(str::to_string);
            return Some((trimmed_target.to_string(), host_id));
        }

        // Nombre: primero el etc_hosts recolectado, después el índice.
        let lowered_name = trimmed_target.to_ascii_lowercase();
        if let Some(resolved_ip) = self.etc_hosts.get(&lowered_name) {
            let host_id = self.host_index.host_id_for_ip(resolved_ip).map(str::to_string);
            return Some((resolved_ip.clone(), host_id));
        }

        self.host_index
            .resolve_hostname(&lowered_name)
            .map(|(host_id, ip)| (ip.to_string(), Some(host_id.to_string())))
    }
}

pub(crate) fn looks_like_ip(candidate: &str) -> bool {
    candidate.parse::<std::net::IpAddr>().is_ok()
}

pub(crate) fn is_loopback(ip: &str) -> bool {
    match ip.parse::<std::net::IpAddr>() {
        Ok(address) => address.is_loopback(),
        Err(_) => ip == "localhost",
    }
}

/// Puertos por defecto de los esquemas de URL de conexión.
pub(crate) fn default_port_for_scheme(scheme: &str) -> Option<i64> {
    match scheme {
        "postgres" | "postgresql" => Some(5432),
        "mysql" => Some(3306),
        "redis" => Some(6379),
        "mongodb" => Some(27017),
        "amqp" => Some(5672),
        "amqps" => Some(5671),
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}

// ------------------------------------------------------------------
// ORQUESTACIÓN DE LA PASADA
// ------------------------------------------------------------------

/**
 * Deriva las aristas salientes de un host desde su documento crudo.
 *
 * Función pura del documento y del índice; el llamador persiste el
 * resultado con reemplazo al por mayor.
 */
pub fn correlate_document(document: &Value, host_index: &HostIndex) -> Vec<EdgeDraft> {
    let resolution = ResolutionContext::from_document(document, host_index);

    let mut collected_drafts: Vec<EdgeDraft> = Vec::new();
    collected_drafts.extend(sockets::edges_from_sockets(document, &resolution));
    collected_drafts.extend(webserver::edges_from_webserver_configs(document, &resolution));
    collected_drafts.extend(containers::edges_from_container_env(document, &resolution));
    collected_drafts.extend(docker_nets::edges_from_docker_networks(document, &resolution));
    collected_drafts.extend(static_sources::edges_from_etc_hosts(document, &resolution));
    collected_drafts.extend(static_sources::edges_from_arp_table(document, &resolution));

    // LEY DE DEDUPLICACIÓN + descarte de loopback.
    let mut seen_keys: HashSet<(String, i64, Option<String>)> = HashSet::new();
    let mut unique_drafts: Vec<EdgeDraft> = Vec::new();

    for draft in collected_drafts {
        if is_loopback(&draft.target_ip) {
            continue;
        }
        if seen_keys.insert(draft.dedup_key()) {
            unique_drafts.push(draft);
        }
    }

    debug!("🕸️ [TOPOLOGY]: Correlation pass produced {} unique edges.", unique_drafts.len());
    unique_drafts
}

/// Fabrica interna compartida por los parsers de evidencia.
pub(crate) fn draft(
    resolution: &ResolutionContext<'_>,
    raw_target: &str,
    target_port: i64,
    source_process: Option<String>,
    detection_method: DetectionMethod,
    details: String,
) -> Option<EdgeDraft> {
    let (target_ip, target_host_id) = resolution.resolve_target(raw_target)?;

    Some(EdgeDraft {
        target_host_id,
        target_ip,
        target_port,
        source_process,
        detection_method,
        details,
    })
}

/// Parte "ip:port" con soporte de IPv6 entre corchetes.
pub(crate) fn split_endpoint(endpoint: &str) -> Option<(String, i64)> {
    let trimmed = endpoint.trim();

    if let Some(stripped) = trimmed.strip_prefix('[') {
        // IPv6: [addr]:port
        let (address, remainder) = stripped.split_once(']')?;
        let port = remainder.strip_prefix(':')?.parse::<i64>().ok()?;
        return Some((address.to_string(), port));
    }

    let (address, port_text) = trimmed.rsplit_once(':')?;
    let port = port_text.parse::<i64>().ok()?;
    Some((address.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn index_with_two_hosts() -> HostIndex {
        let mut host_index = HostIndex::new();
        host_index.register("host-a", "10.0.0.10", Some("app01"));
        host_index.register("host-b", "10.0.0.11", Some("db01"));
        host_index
    }

    /**
     * Escenario de referencia: DATABASE_URL de un contenedor apunta al
     * host B inventariado; debe existir exactamente una arista config
     * interna al puerto 5432.
     */
    #[test]
    fn certify_container_env_database_url_scenario() {
        let document = json!({
            "docker_containers": [{
                "id": "c1", "name": "api", "image": "api:1", "state": "running",
                "env": ["DATABASE_URL=postgres://u:p@10.0.0.11:5432/db", "LOG_LEVEL=info"]
            }]
        });

        let edges = correlate_document(&document, &index_with_two_hosts());

        let database_edges: Vec<_> = edges
            .iter()
            .filter(|edge| edge.target_port == 5432)
            .collect();

        assert_eq!(database_edges.len(), 1);
        let edge = database_edges[0];
        assert_eq!(edge.target_host_id.as_deref(), Some("host-b"));
        assert_eq!(edge.target_ip, "10.0.0.11");
        assert_eq!(edge.detection_method, DetectionMethod::Config);
        assert!(!edge.is_external());
    }

    #[test]
    fn certify_loopback_always_dropped() {
        let document = json!({
            "sockets": [
                {"local": "10.0.0.10:41000", "peer": "127.0.0.1:5432", "process": "app", "pid": 10},
                {"local": "10.0.0.10:41001", "peer": "10.0.0.11:6379", "process": "app", "pid": 10}
            ]
        });

        let edges = correlate_document(&document, &index_with_two_hosts());
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target_ip, "10.0.0.11");
    }

    #[test]
    fn certify_dedup_across_sources() {
        // El mismo destino visto por socket y por env del contenedor con
        // el mismo proceso origen (None) colapsa por llave; con proceso
        // distinto sobrevive.
        let document = json!({
            "sockets": [
                {"local": "10.0.0.10:41000", "peer": "10.0.0.11:5432", "process": "api", "pid": 10},
                {"local": "10.0.0.10:41002", "peer": "10.0.0.11:5432", "process": "api", "pid": 10}
            ]
        });

        let edges = correlate_document(&document, &index_with_two_hosts());
        assert_eq!(edges.len(), 1);
    }

    #[test]
    fn certify_etc_hosts_resolution_precedence() {
        // db01 existe en el índice con 10.0.0.11, pero el etc_hosts del
        // host lo fija en 10.0.0.99: el documento manda.
        let document = json!({
            "etc_hosts": [{"ip": "10.0.0.99", "hostname": "db01"}],
            "webserver_configs": [{
                "server": "nginx", "path": "/etc/nginx/nginx.conf",
                "content": "server { proxy_pass http://db01:8080; }"
            }]
        });

        let edges = correlate_document(&document, &index_with_two_hosts());
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target_ip, "10.0.0.99");
        // 10.0.0.99 no está inventariado: arista externa.
        assert!(edges[0].is_external());
    }

    #[test]
    fn certify_empty_document_yields_no_edges() {
        let edges = correlate_document(&json!({}), &index_with_two_hosts());
        assert!(edges.is_empty());
    }

    #[test]
    fn certify_endpoint_splitting() {
        assert_eq!(split_endpoint("10.0.0.1:443"), Some(("10.0.0.1".into(), 443)));
        assert_eq!(
            split_endpoint("[2001:db8::1]:8080"),
            Some(("2001:db8::1".into(), 8080))
        );
        assert_eq!(split_endpoint("garbage"), None);
    }

    #[test]
    fn certify_scheme_port_defaults() {
        assert_eq!(default_port_for_scheme("postgres"), Some(5432));
        assert_eq!(default_port_for_scheme("mysql"), Some(3306));
        assert_eq!(default_port_for_scheme("redis"), Some(6379));
        assert_eq!(default_port_for_scheme("mongodb"), Some(27017));
        assert_eq!(default_port_for_scheme("amqp"), Some(5672));
        assert_eq!(default_port_for_scheme("amqps"), Some(5671));
        assert_eq!(default_port_for_scheme("http"), Some(80));
        assert_eq!(default_port_for_scheme("https"), Some(443));
        assert_eq!(default_port_for_scheme("gopher"), None);
    }
}
