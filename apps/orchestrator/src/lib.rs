// [apps/orchestrator/src/lib.rs]
/*!
 * =================================================================
 * APARATO: ORCHESTRATOR LIBRARY INDEX (V5.0)
 * CLASIFICACIÓN: APPLICATION SHELL (ESTRATO L1-APP)
 * RESPONSABILIDAD: PUNTO DE MONTAJE DEL CENTRO DE MANDO
 * =================================================================
 */

pub mod bootstrap;
pub mod config;
pub mod kernel;
pub mod state;
pub mod services;

pub mod prelude {
    pub use crate::bootstrap::Bootstrap;
    pub use crate::config::RuntimeConfig;
    pub use crate::kernel::OrchestratorKernel;
    pub use crate::state::AppState;
}
