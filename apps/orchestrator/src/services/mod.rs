// [apps/orchestrator/src/services/mod.rs]
/*!
 * =================================================================
 * APARATO: BACKGROUND SERVICES INDEX (V5.0)
 * CLASIFICACIÓN: BACKGROUND INFRASTRUCTURE (ESTRATO L4)
 * RESPONSABILIDAD: REGISTRO DE DAEMONS Y HANDLERS DE COLA
 * =================================================================
 */

pub mod scheduler;
pub mod worker_pool;
pub mod scan_pipeline;
pub mod network_discovery;
pub mod llm_pipelines;
pub mod process_map;
