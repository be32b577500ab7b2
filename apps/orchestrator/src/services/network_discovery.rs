// [apps/orchestrator/src/services/network_discovery.rs]
/*!
 * =================================================================
 * APARATO: NETWORK DISCOVERY WORKER (V5.3)
 * CLASIFICACIÓN: WORKER EXECUTION LAYER (ESTRATO L1-WORKER)
 * RESPONSABILIDAD: DESCUBRIMIENTO DE SUBRED Y ALTA DE HOSTS NUEVOS
 *
 * Los hosts vivos que el inventario desconoce se registran con status
 * 'discovered' y sin credenciales; el operador decide si los adopta.
 * =================================================================
 */

use serde_json::json;
use tracing::{info, instrument, warn};

use sysmap_core_document::safe_str;
use sysmap_domain_models::jobs::{JobProgress, JobRecord};
use sysmap_infra_netscan::NetworkScanner;

use crate::services::worker_pool::HandlerOutcome;
use crate::state::AppState;

/**
 * Ejecuta un job de la cola network-scan.
 */
#[instrument(skip(application_state, job), fields(job = %job.id))]
pub async fn execute(application_state: &AppState, job: &JobRecord) -> HandlerOutcome {
    let subnet = safe_str(job.payload.get("subnet"));
    if subnet.is_empty() {
        return HandlerOutcome::Permanent("payload missing subnet".into());
    }

    // Registro de corrida (existente por id o alta efímera por subred).
    let scan_record_id = match safe_str(job.payload.get("network_scan_id")) {
        id if !id.is_empty() => id,
        _ => match application_state.network.create(&subnet, None).await {
            Ok(created_id) => created_id,
            Err(create_fault) => return HandlerOutcome::Retriable(create_fault.to_string()),
        },
    };

    if let Err(running_fault) = application_state.network.mark_running(&scan_record_id).await {
        return HandlerOutcome::Retriable(running_fault.to_string());
    }

    let _ = application_state
        .jobs
        .update_progress(
            &job.id,
            &JobProgress {
                step: "probe".into(),
                percent: 20,
                message: format!("two-phase sweep of {}", subnet),
                counts: None,
            },
        )
        .await;

    let scanner = NetworkScanner::new(application_state.config.scanner_binary_path.clone());

    match scanner.discover(&subnet).await {
        Ok(discovered_hosts) => {
            // ALTA SILENCIOSA de los desconocidos.
            let mut newly_registered = 0usize;
            for discovered in &discovered_hosts {
                match application_state
                    .hosts
                    .register_discovered(&discovered.ip, discovered.hostname.as_deref())
                    .await
                {
                    Ok(true) => newly_registered += 1,
                    Ok(false) => {}
                    Err(register_fault) => {
                        warn!("⚠️ [NETSCAN]: Auto-registration of {} failed: {}", discovered.ip, register_fault);
                    }
                }
            }

            let results_document = json!({
                "subnet": subnet,
                "hosts": discovered_hosts,
                "newly_registered": newly_registered,
            });

            if let Err(seal_fault) = application_state
                .network
                .mark_completed(&scan_record_id, discovered_hosts.len() as i64, &results_document)
                .await
            {
                return HandlerOutcome::Retriable(seal_fault.to_string());
            }

            let _ = application_state
                .audit
                .record(
                    &safe_str(job.payload.get("principal")),
                    "network_scan",
                    &subnet,
                    "ok",
                    Some(&format!("{} up, {} new", discovered_hosts.len(), newly_registered)),
                )
                .await;

            info!(
                "📡 [NETSCAN]: Subnet {} swept: {} live hosts, {} newly registered.",
                subnet,
                discovered_hosts.len(),
                newly_registered
            );
            HandlerOutcome::Completed
        }
        Err(discover_fault) => {
            let _ = application_state
                .network
                .mark_failed(&scan_record_id, &discover_fault.to_string())
                .await;
            HandlerOutcome::Retriable(discover_fault.to_string())
        }
    }
}
