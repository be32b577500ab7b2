// [libs/domain/models/src/lib.rs]
/*!
 * =================================================================
 * APARATO: DOMAIN MODELS INDEX (V4.0 - INVENTORY MASTER)
 * CLASIFICACIÓN: DOMAIN MODELS (ESTRATO L2)
 * RESPONSABILIDAD: PUNTO DE MONTAJE DE LOS CONTRATOS SOBERANOS
 * =================================================================
 */

pub mod host;
pub mod inventory;
pub mod snapshot;
pub mod topology;
pub mod rules;
pub mod ai;
pub mod jobs;

pub use host::{Host, HostStatus, SshAuthMethod};
pub use snapshot::{ChangeType, DiffCategory, DiffEvent, Severity, Snapshot};
pub use topology::{ConnectionEdge, DetectionMethod, EdgeDraft};
pub use rules::{Alert, AlertRule, RuleCondition, RuleScope};
pub use ai::{AiAnalysis, AiPurpose, LlmProviderKind, LlmSettings};
pub use jobs::{JobProgress, JobRecord, JobStatus, NetworkScan, NetworkScanStatus, QueueName};
