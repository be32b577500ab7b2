// [libs/domain/models/src/topology.rs]
/*!
 * =================================================================
 * APARATO: TOPOLOGY EDGE CONTRACTS (V4.1)
 * CLASIFICACIÓN: DOMAIN MODELS (ESTRATO L2)
 * RESPONSABILIDAD: ARISTAS DIRIGIDAS DEL GRAFO DE LLAMADAS
 *
 * Unicidad por (source_host_id, target_ip, target_port, source_process).
 * Las aristas de un host se reemplazan al por mayor en cada pasada del
 * correlador.
 * =================================================================
 */

use serde::{Deserialize, Serialize};

/// Fuente de evidencia que originó la arista.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// Socket activo con par remoto observado.
    Socket,
    /// Declaración de configuración (webserver, env de contenedor).
    Config,
    /// Membresía de red Docker o mapeo de puertos.
    Docker,
    /// /etc/hosts estático o tabla ARP.
    Arp,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::Socket => "socket",
            DetectionMethod::Config => "config",
            DetectionMethod::Docker => "docker",
            DetectionMethod::Arp => "arp",
        }
    }

    pub fn parse(label: &str) -> Option<DetectionMethod> {
        match label {
            "socket" => Some(DetectionMethod::Socket),
            "config" => Some(DetectionMethod::Config),
            "docker" => Some(DetectionMethod::Docker),
            "arp" => Some(DetectionMethod::Arp),
            _ => None,
        }
    }
}

/// Arista candidata producida por el correlador puro, previa a persistencia.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EdgeDraft {
    /// Host destino resuelto contra el índice de inventario; None = externo.
    pub target_host_id: Option<String>,
    pub target_ip: String,
    pub target_port: i64,
    /// Proceso origen cuando la evidencia lo atribuye.
    pub source_process: Option<String>,
    pub detection_method: DetectionMethod,
    /// Evidencia legible (p.ej. la directiva proxy_pass o la variable env).
    pub details: String,
}

impl EdgeDraft {
    /// Llave de deduplicación del correlador.
    pub fn dedup_key(&self) -> (String, i64, Option<String>) {
        (
            self.target_ip.clone(),
            self.target_port,
            self.source_process.clone(),
        )
    }

    pub fn is_external(&self) -> bool {
        self.target_host_id.is_none()
    }
}

/// Arista persistida con propiedad del host origen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionEdge {
    pub id: String,
    pub source_host_id: String,
    pub target_host_id: Option<String>,
    pub target_ip: String,
    pub target_port: i64,
    pub source_process: Option<String>,
    pub detection_method: DetectionMethod,
    pub details: String,
    pub is_external: bool,
}
