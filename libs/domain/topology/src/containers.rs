// [libs/domain/topology/src/containers.rs]
/*!
 * APARATO: CONTAINER ENV EVIDENCE PARSER
 * RESPONSABILIDAD: Aristas declaradas en variables de entorno de
 * contenedores (method=config).
 *
 * Solo variables no enmascaradas participan: el recolector ya sustituyó
 * las sensibles por KEY=***MASKADO*** y ese marcador nunca parsea como
 * URL ni como host.
 */

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use sysmap_core_document::{expect_array, safe_str};
use sysmap_domain_models::topology::{DetectionMethod, EdgeDraft};

use crate::{default_port_for_scheme, draft, looks_like_ip, ResolutionContext};

/// URL de conexión: scheme://[user[:pass]@]host[:port][/...]
static CONNECTION_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(postgres|postgresql|mysql|redis|mongodb|amqps?|https?)://(?:[^@/\s]+@)?([A-Za-z0-9_.\-]+)(?::(\d{1,5}))?").unwrap()
});

/// Patrón genérico *_HOST / *_ADDR / *_SERVER con valor host[:port].
static GENERIC_HOST_VAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Z][A-Z0-9_]*(?:HOST|ADDR|SERVER))=([A-Za-z0-9_.\-]+)(?::(\d{1,5}))?$").unwrap()
});

pub(crate) fn edges_from_container_env(
    document: &Value,
    resolution: &ResolutionContext<'_>,
) -> Vec<EdgeDraft> {
    let mut drafts = Vec::new();

    for container_entry in expect_array(document.get("docker_containers")) {
        let container_name = safe_str(container_entry.get("name"));

        for env_value in expect_array(container_entry.get("env")) {
            let env_line = safe_str(Some(&env_value));
            if env_line.is_empty() || env_line.contains("***MASKED***") {
                continue;
            }

            // 1. URLs de conexión explícitas.
            for capture in CONNECTION_URL.captures_iter(&env_line) {
                let scheme = capture[1].to_ascii_lowercase();
                let target_host = capture[2].to_string();

                let target_port = capture
                    .get(3)
                    .and_then(|m| m.as_str().parse::<i64>().ok())
                    .or_else(|| default_port_for_scheme(&scheme));

                let Some(target_port) = target_port else { continue };

                if let Some(edge) = draft(
                    resolution,
                    &target_host,
                    target_port,
                    Some(container_name.clone()),
                    DetectionMethod::Config,
                    format!("container env {} ({}://…)", env_key_of(&env_line), scheme),
                ) {
                    drafts.push(edge);
                }
            }

            // 2. Variables *_HOST/*_ADDR/*_SERVER genéricas. Solo valores
            //    que parecen host o IP; "true"/"1" y similares no resuelven.
            if let Some(capture) = GENERIC_HOST_VAR.captures(&env_line) {
                let variable_name = capture[1].to_string();
                let target_host = capture[2].to_string();

                if !looks_like_ip(&target_host) && !target_host.contains('.') {
                    // Nombres planos solo cuentan si el índice o el
                    // etc_hosts del documento los conocen.
                    if resolution.resolve_target(&target_host).is_none() {
                        continue;
                    }
                }

                let target_port = capture
                    .get(3)
                    .and_then(|m| m.as_str().parse::<i64>().ok())
                    .unwrap_or(0);

                if let Some(edge) = draft(
                    resolution,
                    &target_host,
                    target_port,
                    Some(container_name.clone()),
                    DetectionMethod::Config,
                    format!("container env {}", variable_name),
                ) {
                    drafts.push(edge);
                }
            }
        }
    }

    drafts
}

fn env_key_of(env_line: &str) -> &str {
    env_line.split('=').next().unwrap_or(env_line)
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
    fn certify_url_pattern_with_explicit_port() {
        let host_index = HostIndex::new();
        let document = json!({
            "docker_containers": [{
                "name": "api",
                "env": ["DATABASE_URL=postgres://user:pw@10.0.0.11:5433/app"]
            }]
        });

        let edges = edges_from_container_env(&document, &resolution(&host_index));
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target_port, 5433);
        assert_eq!(edges[0].source_process.as_deref(), Some("api"));
    }

    #[test]
    fn certify_url_pattern_scheme_defaults() {
        let host_index = HostIndex::new();
        let document = json!({
            "docker_containers": [{
                "name": "worker",
                "env": [
                    "REDIS_URL=redis://10.0.0.20",
                    "BROKER=amqp://10.0.0.21",
                    "METRICS=https://10.0.0.22/push"
                ]
            }]
        });

        let edges = edges_from_container_env(&document, &resolution(&host_index));
        assert!(edges.iter().any(|e| e.target_ip == "10.0.0.20" && e.target_port == 6379));
        assert!(edges.iter().any(|e| e.target_ip == "10.0.0.21" && e.target_port == 5672));
        assert!(edges.iter().any(|e| e.target_ip == "10.0.0.22" && e.target_port == 443));
    }

    #[test]
    fn certify_generic_host_variables() {
        let mut host_index = HostIndex::new();
        host_index.register("host-db", "10.0.0.30", Some("pgmaster"));

        let document = json!({
            "docker_containers": [{
                "name": "api",
                "env": [
                    "POSTGRES_HOST=pgmaster",
                    "CACHE_ADDR=10.0.0.31:6380",
                    "DEBUG_HOST=not_resolvable_name"
                ]
            }]
        });

        let edges = edges_from_container_env(&document, &resolution(&host_index));
        assert_eq!(edges.len(), 2);
        assert!(edges.iter().any(|e| e.target_ip == "10.0.0.30" && e.target_host_id.is_some()));
        assert!(edges.iter().any(|e| e.target_ip == "10.0.0.31" && e.target_port == 6380));
    }

    #[test]
    fn certify_masked_env_never_parsed() {
        let host_index = HostIndex::new();
        let document = json!({
            "docker_containers": [{
                "name": "api",
                "env": ["DB_PASSWORD=***MASKED***", "AUTH_TOKEN=***MASKED***"]
            }]
        });

        assert!(edges_from_container_env(&document, &resolution(&host_index)).is_empty());
    }
}
