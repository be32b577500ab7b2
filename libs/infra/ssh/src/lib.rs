// [libs/infra/ssh/src/lib.rs]
/*!
 * =================================================================
 * APARATO: REMOTE EXECUTOR INDEX (V4.0)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: PUNTO DE MONTAJE DEL EJECUTOR REMOTO
 * =================================================================
 */

pub mod errors;
pub mod executor;

pub use errors::SshError;
pub use executor::{ExecOptions, HealthProbe, SshExecutor, STDERR_CAP_BYTES, STDOUT_HARD_CAP_BYTES};
