// [apps/orchestrator/src/state.rs]
/*!
 * =================================================================
 * APARATO: APPLICATION NEURAL STATE (V5.3)
 * CLASIFICACIÓN: APPLICATION SHELL (ESTRATO L1-APP)
 * RESPONSABILIDAD: ESTADO COMPARTIDO INYECTADO EN DAEMONS Y WORKERS
 *
 * El estado es un haz de repositorios sobre el mismo cliente de base:
 * el almacén relacional es la única fuente de verdad y el único canal
 * entre scheduler, workers y pipelines. Ninguna cola en memoria.
 * =================================================================
 */

use std::sync::Arc;

use tokio::sync::watch;

use sysmap_core_vault::VaultEngine;
use sysmap_infra_db::repositories::{
    AiRepository, AuditRepository, EdgeRepository, HostRepository, InventoryMapper,
    JobRepository, NetworkScanRepository, RuleRepository, SnapshotRepository,
};
use sysmap_infra_db::DbClient;

use crate::config::RuntimeConfig;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RuntimeConfig>,
    pub vault: Arc<VaultEngine>,

    pub hosts: Arc<HostRepository>,
    pub mapper: Arc<InventoryMapper>,
    pub snapshots: Arc<SnapshotRepository>,
    pub edges: Arc<EdgeRepository>,
    pub rules: Arc<RuleRepository>,
    pub ai: Arc<AiRepository>,
    pub jobs: Arc<JobRepository>,
    pub network: Arc<NetworkScanRepository>,
    pub audit: Arc<AuditRepository>,

    /// Señal de drenado: true ordena a los workers terminar el job en
    /// vuelo y dejar de reclamar.
    pub shutdown_signal: watch::Receiver<bool>,
}

impl AppState {
    pub fn assemble(
        config: RuntimeConfig,
        vault: VaultEngine,
        database_client: DbClient,
        shutdown_signal: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            vault: Arc::new(vault),
            hosts: Arc::new(HostRepository::new(database_client.clone())),
            mapper: Arc::new(InventoryMapper::new(database_client.clone())),
            snapshots: Arc::new(SnapshotRepository::new(database_client.clone())),
            edges: Arc::new(EdgeRepository::new(database_client.clone())),
            rules: Arc::new(RuleRepository::new(database_client.clone())),
            ai: Arc::new(AiRepository::new(database_client.clone())),
            jobs: Arc::new(JobRepository::new(database_client.clone())),
            network: Arc::new(NetworkScanRepository::new(database_client.clone())),
            audit: Arc::new(AuditRepository::new(database_client)),
            shutdown_signal,
        }
    }

    /// Consulta no bloqueante del drenado.
    pub fn is_draining(&self) -> bool {
        *self.shutdown_signal.borrow()
    }
}
