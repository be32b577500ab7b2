// [libs/domain/topology/src/webserver.rs]
/*!
 * APARATO: WEBSERVER CONFIG EVIDENCE PARSER
 * RESPONSABILIDAD: Aristas declaradas en configs nginx/apache/haproxy
 * (method=config).
 */

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use sysmap_core_document::{expect_array, safe_str};
use sysmap_domain_models::topology::{DetectionMethod, EdgeDraft};

use crate::{default_port_for_scheme, draft, split_endpoint, ResolutionContext};

/// proxy_pass http://backend:8080; (y upstream legacy "server host:port;")
static NGINX_PROXY_PASS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"proxy_pass\s+(https?)://([^;/\s]+)").unwrap());
static NGINX_UPSTREAM_SERVER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*server\s+([A-Za-z0-9_.\-]+:\d+)\s*[;\s]").unwrap());

/// ProxyPass / ProxyPassReverse dentro del vhost.
static APACHE_PROXY_PASS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"ProxyPass(?:Reverse)?\s+\S+\s+(https?)://([^\s/]+)").unwrap());

/// server <name> <host:port> bajo backend/frontend/listen.
static HAPROXY_SERVER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*server\s+\S+\s+([^\s:]+:\d+)").unwrap());

pub(crate) fn edges_from_webserver_configs(
    document: &Value,
    resolution: &ResolutionContext<'_>,
) -> Vec<EdgeDraft> {
    let mut drafts = Vec::new();

    for config_entry in expect_array(document.get("webserver_configs")) {
        let server_kind = safe_str(config_entry.get("server"));
        let config_path = safe_str(config_entry.get("path"));
        let content = safe_str(config_entry.get("content"));

        match server_kind.as_str() {
            "nginx" => {
                for capture in NGINX_PROXY_PASS.captures_iter(&content) {
                    push_scheme_target(
                        &mut drafts, resolution, &server_kind, &config_path,
                        &capture[1], &capture[2],
                    );
                }
                for capture in NGINX_UPSTREAM_SERVER.captures_iter(&content) {
                    push_endpoint_target(
                        &mut drafts, resolution, &server_kind, &config_path, &capture[1],
                    );
                }
            }
            "apache" => {
                for capture in APACHE_PROXY_PASS.captures_iter(&content) {
                    push_scheme_target(
                        &mut drafts, resolution, &server_kind, &config_path,
                        &capture[1], &capture[2],
                    );
                }
            }
            "haproxy" => {
                for capture in HAPROXY_SERVER.captures_iter(&content) {
                    push_endpoint_target(
                        &mut drafts, resolution, &server_kind, &config_path, &capture[1],
                    );
                }
            }
            _ => {}
        }
    }

    drafts
}

/// Destino "host[:port]" con puerto por defecto del esquema.
fn push_scheme_target(
    drafts: &mut Vec<EdgeDraft>,
    resolution: &ResolutionContext<'_>,
    server_kind: &str,
    config_path: &str,
    scheme: &str,
    authority: &str,
) {
    let (target_host, target_port) = match split_endpoint(authority) {
        Some((host, port)) => (host, port),
        None => {
            let Some(default_port) = default_port_for_scheme(scheme) else { return };
            (authority.to_string(), default_port)
        }
    };

    if let Some(edge) = draft(
        resolution,
        &target_host,
        target_port,
        Some(server_kind.to_string()),
        DetectionMethod::Config,
        format!("{} directive in {}", server_kind, config_path),
    ) {
        drafts.push(edge);
    }
}

fn push_endpoint_target(
    drafts: &mut Vec<EdgeDraft>,
    resolution: &ResolutionContext<'_>,
    server_kind: &str,
    config_path: &str,
    endpoint: &str,
) {
    let Some((target_host, target_port)) = split_endpoint(endpoint) else { return };

    if let Some(edge) = draft(
        resolution,
        &target_host,
        target_port,
        Some(server_kind.to_string()),
        DetectionMethod::Config,
        format!("{} backend in {}", server_kind, config_path),
    ) {
        drafts.push(edge);
    }
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
    fn certify_nginx_proxy_pass_and_upstream() {
        let host_index = HostIndex::new();
        let document = json!({
            "webserver_configs": [{
                "server": "nginx", "path": "/etc/nginx/conf.d/app.conf",
                "content": "upstream backend {\n  server 10.0.1.5:9000;\n}\nserver {\n  location / { proxy_pass http://10.0.1.6:8080; }\n}"
            }]
        });

        let edges = edges_from_webserver_configs(&document, &resolution(&host_index));
        assert_eq!(edges.len(), 2);
        assert!(edges.iter().any(|e| e.target_ip == "10.0.1.5" && e.target_port == 9000));
        assert!(edges.iter().any(|e| e.target_ip == "10.0.1.6" && e.target_port == 8080));
        assert!(edges.iter().all(|e| e.detection_method == DetectionMethod::Config));
    }

    #[test]
    fn certify_proxy_pass_scheme_default_port() {
        let host_index = HostIndex::new();
        let document = json!({
            "webserver_configs": [{
                "server": "nginx", "path": "/etc/nginx/nginx.conf",
                "content": "proxy_pass https://10.9.9.9;"
            }]
        });

        let edges = edges_from_webserver_configs(&document, &resolution(&host_index));
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target_port, 443);
    }

    #[test]
    fn certify_apache_and_haproxy_directives() {
        let host_index = HostIndex::new();
        let document = json!({
            "webserver_configs": [
                {
                    "server": "apache", "path": "/etc/apache2/sites-enabled/app.conf",
                    "content": "<VirtualHost *:80>\nProxyPass / http://10.2.2.2:8000/\nProxyPassReverse / http://10.2.2.2:8000/\n</VirtualHost>"
                },
                {
                    "server": "haproxy", "path": "/etc/haproxy/haproxy.cfg",
                    "content": "backend app\n  server app1 10.3.3.3:8080 check\n  server app2 10.3.3.4:8080 check"
                }
            ]
        });

        let edges = edges_from_webserver_configs(&document, &resolution(&host_index));
        // ProxyPass + ProxyPassReverse producen el mismo destino dos
        // veces; la deduplicación global los colapsa más arriba.
        assert!(edges.iter().any(|e| e.target_ip == "10.2.2.2" && e.target_port == 8000));
        assert!(edges.iter().any(|e| e.target_ip == "10.3.3.3"));
        assert!(edges.iter().any(|e| e.target_ip == "10.3.3.4"));
    }
}
