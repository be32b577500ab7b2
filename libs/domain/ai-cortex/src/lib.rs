// [libs/domain/ai-cortex/src/lib.rs]
/*!
 * =================================================================
 * APARATO: AI CORTEX INDEX (V5.0 - INFERENCE STRATUM)
 * CLASIFICACIÓN: DOMAIN ENGINE (ESTRATO L2)
 * RESPONSABILIDAD: PUNTO DE MONTAJE DEL CÓRTEX DE INFERENCIA
 * =================================================================
 */

pub mod errors;
pub mod providers;
pub mod json_extract;
pub mod prompts;
pub mod outputs;
pub mod log_compress;

pub use errors::CortexError;
pub use providers::{
    provider_for, ChatMessage, ChatOptions, ChatOutcome, ChatProvider,
};
pub use json_extract::{chat_expecting_json, extract_json};
pub use outputs::{
    AnomalyFinding, AnomalyReport, LogAnalysisReport, ProcessTreeNode, RunbookDocument,
    RunbookSection, ServerSummary, TreeNodeType,
};
pub use log_compress::compress_logs;
pub use prompts::prioritize_diffs;
