// [apps/orchestrator/src/services/worker_pool.rs]
/*!
 * =================================================================
 * APARATO: QUEUE WORKER POOL (V5.4 - GRACEFUL DRAIN)
 * CLASIFICACIÓN: BACKGROUND INFRASTRUCTURE (ESTRATO L4)
 * RESPONSABILIDAD: POOLS DE TAMAÑO FIJO POR COLA CON DRENADO ELEGANTE
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. FIXED POOLS: server-scan x3, network-scan x1, ai-analysis x1,
 *    process-map x1; cada job ocupa un worker lógico en exclusiva.
 * 2. AT-LEAST-ONCE: la reserva es atómica en el Ledger; los handlers
 *    son idempotentes frente a re-ejecución.
 * 3. GRACEFUL DRAIN: ante la señal de terminación el worker completa
 *    el job en vuelo y deja de reclamar; jamás aborta a mitad.
 * 4. OUTCOME ROUTING: Completed sella, Retriable re-encola con
 *    backoff, Permanent mata el job sin consumir presupuesto.
 * =================================================================
 */

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};

use sysmap_domain_models::jobs::{JobRecord, QueueName};

use crate::services::{llm_pipelines, network_discovery, process_map, scan_pipeline};
use crate::state::AppState;

/// Pausa entre sondeos de una cola vacía.
const IDLE_POLL_SECS: u64 = 3;

/// Veredicto de un handler de job.
pub enum HandlerOutcome {
    Completed,
    /// Fallo de infraestructura transitoria: re-encolar con backoff.
    Retriable(String),
    /// Fallo permanente: el job muere sin segundo intento.
    Permanent(String),
}

pub struct WorkerPoolService;

impl WorkerPoolService {
    /// Levanta los pools de tamaño fijo de las cuatro colas.
    pub fn spawn_all(application_state: AppState) -> Vec<JoinHandle<()>> {
        let mut worker_handles = Vec::new();

        for queue in QueueName::all() {
            let pool_size = queue.policy().concurrency;

            for worker_index in 0..pool_size {
                let worker_state = application_state.clone();
                worker_handles.push(tokio::spawn(async move {
                    Self::worker_loop(worker_state, queue, worker_index).await;
                }));
            }
        }

        worker_handles
    }

    async fn worker_loop(application_state: AppState, queue: QueueName, worker_index: usize) {
        info!("⚙️ [WORKER]: {}#{} online.", queue.as_str(), worker_index);

        loop {
            // DRENADO: no se reclama nada nuevo tras la señal.
            if application_state.is_draining() {
                break;
            }

            match application_state.jobs.claim_next(queue).await {
                Ok(Some(job)) => {
                    Self::execute_and_seal(&application_state, &job).await;
                }
                Ok(None) => {
                    sleep(Duration::from_secs(IDLE_POLL_SECS)).await;
                }
                Err(claim_fault) => {
                    error!(
                        "❌ [WORKER]: {}#{} claim collapsed: {}. Pausing.",
                        queue.as_str(),
                        worker_index,
                        claim_fault
                    );
                    sleep(Duration::from_secs(5)).await;
                }
            }
        }

        info!("⚙️ [WORKER]: {}#{} drained and offline.", queue.as_str(), worker_index);
    }

    async fn execute_and_seal(application_state: &AppState, job: &JobRecord) {
        let outcome = match job.queue {
            QueueName::ServerScan => scan_pipeline::execute(application_state, job).await,
            QueueName::NetworkScan => network_discovery::execute(application_state, job).await,
            QueueName::AiAnalysis => llm_pipelines::execute_ai_task(application_state, job).await,
            QueueName::ProcessMap => process_map::execute(application_state, job).await,
        };

        let seal_result = match outcome {
            HandlerOutcome::Completed => application_state.jobs.complete(&job.id).await,
            HandlerOutcome::Retriable(failure_reason) => {
                warn!("🔁 [WORKER]: Job {} failed (retriable): {}", job.id, failure_reason);
                application_state.jobs.fail(&job.id, &failure_reason).await.map(|_| ())
            }
            HandlerOutcome::Permanent(failure_reason) => {
                warn!("⚰️ [WORKER]: Job {} failed (permanent): {}", job.id, failure_reason);
                application_state.jobs.fail_permanently(&job.id, &failure_reason).await
            }
        };

        if let Err(seal_fault) = seal_result {
            error!("❌ [WORKER]: Sealing job {} collapsed: {}", job.id, seal_fault);
        }
    }
}
