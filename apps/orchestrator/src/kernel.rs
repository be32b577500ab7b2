// [apps/orchestrator/src/kernel.rs]
/*!
 * =================================================================
 * APARATO: ORCHESTRATOR SOVEREIGN KERNEL (V5.4 - DRAIN AWARE)
 * CLASIFICACIÓN: COMPOSITION ROOT (ESTRATO L1-APP)
 * RESPONSABILIDAD: BOOTSTRAP DE INFRAESTRUCTURA E IGNICIÓN SEGURA
 *
 * VISION HIPER-HOLÍSTICA:
 * Actúa como la placa base donde se conectan scheduler, pools de
 * workers y pipelines. La señal de terminación ordena el drenado:
 * los workers completan el job en vuelo y dejan de reclamar; los
 * daemons del scheduler se cancelan en el acto.
 * =================================================================
 */

use tokio::sync::watch;
use tracing::{error, info, instrument};

use sysmap_core_vault::VaultEngine;
use sysmap_infra_db::DbClient;

use crate::bootstrap::Bootstrap;
use crate::config::RuntimeConfig;
use crate::services::{scheduler::SchedulerService, worker_pool::WorkerPoolService};
use crate::state::AppState;

pub struct OrchestratorKernel {
    application_state: AppState,
    shutdown_transmitter: watch::Sender<bool>,
}

impl OrchestratorKernel {
    /**
     * Realiza la ignición del cliente de base y el estado neural.
     * La bóveda se construye aquí: una llave mal dimensionada detiene
     * el proceso antes de cualquier I/O remoto.
     */
    #[instrument(skip(runtime_config))]
    pub async fn ignite(runtime_config: RuntimeConfig) -> anyhow::Result<Self> {
        let vault_engine = VaultEngine::from_hex_key(&runtime_config.vault_master_key_hex)?;

        let database_client = DbClient::connect(
            &runtime_config.database_url,
            runtime_config.database_access_token.clone(),
        )
        .await?;

        let (shutdown_transmitter, shutdown_receiver) = watch::channel(false);

        let application_state = AppState::assemble(
            runtime_config,
            vault_engine,
            database_client,
            shutdown_receiver,
        );

        Ok(Self { application_state, shutdown_transmitter })
    }

    /**
     * Lanza todas las operaciones autónomas y espera la señal de
     * terminación para el drenado elegante.
     */
    pub async fn launch_sovereign_operations(self) {
        let shared_application_state = self.application_state.clone();

        // 1. CERTIFICACIÓN PRE-OPERATIVA (bloqueante por diseño)
        if let Err(certification_fault) =
            Bootstrap::execute_preflight_certification(&shared_application_state).await
        {
            error!("❌ [KERNEL]: Pre-flight certification collapsed: {}", certification_fault);
            return;
        }

        // 2. DAEMONS DEL SCHEDULER (sync 60s / stale 5min / health 15min)
        let scheduler_handles = SchedulerService::spawn_all(shared_application_state.clone());

        // 3. POOLS DE WORKERS POR COLA
        let worker_handles = WorkerPoolService::spawn_all(shared_application_state.clone());

        info!(
            "🚀 [KERNEL]: Command center operational ({} scheduler daemons, {} workers).",
            scheduler_handles.len(),
            worker_handles.len()
        );

        // 4. ESPERA DE LA SEÑAL DE TERMINACIÓN
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("🛑 [KERNEL]: Termination signal received. Initiating graceful drain."),
            Err(signal_fault) => {
                error!("❌ [KERNEL]: Signal listener collapsed: {}. Draining anyway.", signal_fault)
            }
        }

        // 5. DRENADO: workers completan el job en vuelo y dejan de
        //    reclamar; los daemons del scheduler se cancelan.
        let _ = self.shutdown_transmitter.send(true);

        for scheduler_handle in scheduler_handles {
            scheduler_handle.abort();
        }

        for worker_handle in worker_handles {
            let _ = worker_handle.await;
        }

        let _ = shared_application_state
            .audit
            .record("system", "shutdown", "orchestrator", "ok", None)
            .await;

        info!("✅ [KERNEL]: Drain complete. Command center offline.");
    }
}
