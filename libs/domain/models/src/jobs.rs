// [libs/domain/models/src/jobs.rs]
/*!
 * =================================================================
 * APARATO: JOB RUNTIME CONTRACTS (V4.2 - QUEUE SEALED)
 * CLASIFICACIÓN: DOMAIN MODELS (ESTRATO L2)
 * RESPONSABILIDAD: COLAS DURABLES, PROGRESO Y DESCUBRIMIENTO DE RED
 *
 * El id de job incrusta la identidad del objetivo (`queue:<target>`)
 * para que un disparo programado y uno manual jamás coincidan sobre
 * el mismo host.
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Colas durables del runtime. Los parámetros viven en `QueuePolicy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueName {
    ServerScan,
    NetworkScan,
    AiAnalysis,
    ProcessMap,
}

impl QueueName {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::ServerScan => "server-scan",
            QueueName::NetworkScan => "network-scan",
            QueueName::AiAnalysis => "ai-analysis",
            QueueName::ProcessMap => "process-map",
        }
    }

    pub fn parse(label: &str) -> Option<QueueName> {
        match label {
            "server-scan" => Some(QueueName::ServerScan),
            "network-scan" => Some(QueueName::NetworkScan),
            "ai-analysis" => Some(QueueName::AiAnalysis),
            "process-map" => Some(QueueName::ProcessMap),
            _ => None,
        }
    }

    pub fn all() -> [QueueName; 4] {
        [
            QueueName::ServerScan,
            QueueName::NetworkScan,
            QueueName::AiAnalysis,
            QueueName::ProcessMap,
        ]
    }

    /// Parámetros operativos por cola (§ runtime de jobs).
    pub fn policy(&self) -> QueuePolicy {
        match self {
            QueueName::ServerScan => QueuePolicy {
                concurrency: 3,
                rate_limit: Some(RateLimit { max_jobs: 10, window_secs: 60 }),
                max_retries: 2,
                backoff_base_secs: 5,
            },
            QueueName::NetworkScan => QueuePolicy {
                concurrency: 1,
                rate_limit: None,
                max_retries: 1,
                backoff_base_secs: 5,
            },
            QueueName::AiAnalysis => QueuePolicy {
                concurrency: 1,
                rate_limit: None,
                max_retries: 1,
                backoff_base_secs: 5,
            },
            QueueName::ProcessMap => QueuePolicy {
                concurrency: 1,
                rate_limit: None,
                max_retries: 0,
                backoff_base_secs: 5,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max_jobs: u32,
    pub window_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePolicy {
    pub concurrency: usize,
    pub rate_limit: Option<RateLimit>,
    /// Reintentos adicionales tras el primer fallo.
    pub max_retries: u32,
    /// Backoff exponencial: base * 2^(attempt-1).
    pub backoff_base_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Active,
    Completed,
    Failed,
    /// Agotó reintentos; retenida para inspección post-mortem.
    Dead,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Active => "active",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Dead => "dead",
        }
    }

    pub fn parse(label: &str) -> JobStatus {
        match label {
            "active" => JobStatus::Active,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            "dead" => JobStatus::Dead,
            _ => JobStatus::Queued,
        }
    }
}

/// Registro observable de progreso que el worker publica por pasos.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobProgress {
    pub step: String,
    pub percent: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counts: Option<Value>,
}

/// Fila durable de la cola.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// `queue:<target>`, p.ej. "server-scan:1f3c".
    pub id: String,
    pub queue: QueueName,
    /// Identifica objetivo y principal disparador.
    pub payload: Value,
    pub status: JobStatus,
    pub attempt: u32,
    pub max_attempts: u32,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub progress: Option<JobProgress>,
    /// Motivo de fallo verbatim, primeros 2000 caracteres.
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Construcción determinista del id: un objetivo, un job vivo.
    pub fn compose_id(queue: QueueName, target_identifier: &str) -> String {
        format!("{}:{}", queue.as_str(), target_identifier)
    }
}

// ------------------------------------------------------------------
// DESCUBRIMIENTO DE RED
// ------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkScanStatus {
    Idle,
    Running,
    Completed,
    Failed,
}

impl NetworkScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkScanStatus::Idle => "idle",
            NetworkScanStatus::Running => "running",
            NetworkScanStatus::Completed => "completed",
            NetworkScanStatus::Failed => "failed",
        }
    }

    pub fn parse(label: &str) -> NetworkScanStatus {
        match label {
            "running" => NetworkScanStatus::Running,
            "completed" => NetworkScanStatus::Completed,
            "failed" => NetworkScanStatus::Failed,
            _ => NetworkScanStatus::Idle,
        }
    }
}

/// Registro de descubrimiento de subred con programación opcional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkScan {
    pub id: String,
    /// CIDR objetivo, p.ej. "10.0.0.0/24".
    pub subnet: String,
    pub schedule: Option<String>,
    pub status: NetworkScanStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub hosts_found: i64,
    pub results: Option<Value>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certify_queue_policies() {
        let server_scan_policy = QueueName::ServerScan.policy();
        assert_eq!(server_scan_policy.concurrency, 3);
        assert_eq!(server_scan_policy.max_retries, 2);
        assert_eq!(
            server_scan_policy.rate_limit,
            Some(RateLimit { max_jobs: 10, window_secs: 60 })
        );

        assert_eq!(QueueName::ProcessMap.policy().max_retries, 0);
        assert_eq!(QueueName::NetworkScan.policy().concurrency, 1);
    }

    #[test]
    fn certify_job_id_embeds_target() {
        assert_eq!(
            JobRecord::compose_id(QueueName::ServerScan, "host-17"),
            "server-scan:host-17"
        );
    }

    #[test]
    fn certify_queue_labels_round_trip() {
        for queue in QueueName::all() {
            assert_eq!(QueueName::parse(queue.as_str()), Some(queue));
        }
    }
}
