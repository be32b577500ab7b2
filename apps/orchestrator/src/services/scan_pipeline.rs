// [apps/orchestrator/src/services/scan_pipeline.rs]
/*!
 * =================================================================
 * APARATO: DEEP SCAN PIPELINE (V5.6 - SEQUENTIAL AUTHORITY)
 * CLASIFICACIÓN: WORKER EXECUTION LAYER (ESTRATO L1-WORKER)
 * RESPONSABILIDAD: CICLO COMPLETO DE ESCANEO DE UN HOST
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. LINEAR SEQUENCE: credenciales -> recolección SSH -> mapeo ->
 *    correlación -> snapshot/diff -> reglas -> córtex, en un único
 *    worker; jamás se entrelazan dos escaneos del mismo host.
 * 2. STATUS AUTHORITY: 'scanning' al reservar, 'online' lo escribe el
 *    mapeador, 'error' con motivo verbatim ante cualquier colapso.
 * 3. CORTEX NEVER FAILS THE SCAN: los fallos de inferencia degradan a
 *    warning y el escaneo cierra completo.
 * =================================================================
 */

use serde_json::json;
use tracing::{info, instrument, warn};

use sysmap_core_document::safe_str;
use sysmap_domain_gather::{generate_gather_script, GatherScriptOptions};
use sysmap_domain_models::host::{DecryptedCredentials, Host};
use sysmap_domain_models::jobs::{JobProgress, JobRecord};
use sysmap_domain_rules::EvaluationContext;
use sysmap_domain_topology::{correlate_document, HostIndex};
use sysmap_infra_db::DbError;
use sysmap_infra_ssh::{ExecOptions, SshExecutor};

use sysmap_core_vault::CipherEnvelope;

use crate::services::llm_pipelines;
use crate::services::worker_pool::HandlerOutcome;
use crate::state::AppState;

/**
 * Ejecuta un job de la cola server-scan de punta a punta.
 */
#[instrument(skip(application_state, job), fields(job = %job.id))]
pub async fn execute(application_state: &AppState, job: &JobRecord) -> HandlerOutcome {
    let host_id = safe_str(job.payload.get("host_id"));
    if host_id.is_empty() {
        return HandlerOutcome::Permanent("payload missing host_id".into());
    }

    let host = match application_state.hosts.get(&host_id).await {
        Ok(host) => host,
        Err(DbError::HostNotFound) => {
            return HandlerOutcome::Permanent(format!("host {} vanished", host_id));
        }
        Err(lookup_fault) => return HandlerOutcome::Retriable(lookup_fault.to_string()),
    };

    // RESERVA DE EXCLUSIÓN MUTUA: un disparo rezagado contra un host ya
    // en vuelo se absorbe sin error (idempotencia de la cola).
    match application_state.hosts.begin_scan(&host_id).await {
        Ok(()) => {}
        Err(DbError::ScanInProgress) => {
            info!("⛔ [SCAN]: Host {} already in flight; duplicate trigger absorbed.", host_id);
            return HandlerOutcome::Completed;
        }
        Err(reserve_fault) => return HandlerOutcome::Retriable(reserve_fault.to_string()),
    }

    match run_pipeline(application_state, job, &host).await {
        Ok(()) => HandlerOutcome::Completed,
        Err(pipeline_fault) => {
            let _ = application_state
                .hosts
                .fail_scan(&host_id, &pipeline_fault.message)
                .await;
            let _ = application_state
                .audit
                .record(
                    &principal_of(job),
                    "server_scan",
                    &host_id,
                    "failed",
                    Some(&pipeline_fault.message),
                )
                .await;

            if pipeline_fault.retriable {
                HandlerOutcome::Retriable(pipeline_fault.message)
            } else {
                HandlerOutcome::Permanent(pipeline_fault.message)
            }
        }
    }
}

struct PipelineFault {
    message: String,
    retriable: bool,
}

impl PipelineFault {
    fn retriable(message: impl Into<String>) -> Self {
        Self { message: message.into(), retriable: true }
    }

    fn permanent(message: impl Into<String>) -> Self {
        Self { message: message.into(), retriable: false }
    }
}

async fn run_pipeline(
    application_state: &AppState,
    job: &JobRecord,
    host: &Host,
) -> Result<(), PipelineFault> {
    let host_id = &host.id;
    let host_label = host.hostname.clone().unwrap_or_else(|| host.ip.clone());

    // 1. CREDENCIALES (descifradas, vida corta)
    report_progress(application_state, &job.id, "credentials", 5, "decrypting access material").await;

    let credentials = decrypt_credentials(application_state, host)
        .map_err(PipelineFault::permanent)?;

    // 2. RECOLECCIÓN REMOTA
    report_progress(application_state, &job.id, "gather", 15, "collecting deep state over ssh").await;

    let gather_script = generate_gather_script(&GatherScriptOptions::default());
    let document = SshExecutor::run_script(&credentials, &gather_script, &ExecOptions::default())
        .await
        .map_err(|ssh_fault| {
            if ssh_fault.is_retriable() {
                PipelineFault::retriable(ssh_fault.to_string())
            } else {
                PipelineFault::permanent(ssh_fault.to_string())
            }
        })?;

    // 3. MAPEO TRANSACCIONAL (escribe status=online)
    report_progress(application_state, &job.id, "map", 40, "reconciling inventory").await;

    let map_counts = application_state
        .mapper
        .map_document(host_id, &document)
        .await
        .map_err(|map_fault| match map_fault {
            DbError::MalformedDocument => PipelineFault::permanent(map_fault.to_string()),
            other_fault => PipelineFault::retriable(other_fault.to_string()),
        })?;

    // 4. CORRELACIÓN DE TOPOLOGÍA (reemplazo al por mayor)
    report_progress(application_state, &job.id, "topology", 55, "correlating call graph").await;

    let mut host_index = HostIndex::new();
    for (indexed_id, indexed_ip, indexed_hostname) in application_state
        .hosts
        .host_index()
        .await
        .map_err(|index_fault| PipelineFault::retriable(index_fault.to_string()))?
    {
        host_index.register(&indexed_id, &indexed_ip, indexed_hostname.as_deref());
    }

    let edge_drafts = correlate_document(&document, &host_index);
    let edge_count = application_state
        .edges
        .replace_for_host(host_id, &edge_drafts)
        .await
        .map_err(|edge_fault| PipelineFault::retriable(edge_fault.to_string()))?;

    // 5. SNAPSHOT + DIFF
    report_progress(application_state, &job.id, "snapshot", 70, "sealing snapshot history").await;

    let snapshot_outcome = application_state
        .snapshots
        .snapshot_and_diff(host_id)
        .await
        .map_err(|snapshot_fault| PipelineFault::retriable(snapshot_fault.to_string()))?;

    // 6. MOTOR DE REGLAS
    report_progress(application_state, &job.id, "rules", 85, "evaluating alert rules").await;

    let evaluation_context = EvaluationContext {
        diffs: snapshot_outcome.diffs.clone(),
        certificates: application_state
            .hosts
            .certificates_of(host_id)
            .await
            .unwrap_or_default(),
        mounts: application_state.hosts.mounts_of(host_id).await.unwrap_or_default(),
        systemd_units: application_state
            .hosts
            .systemd_units_of(host_id)
            .await
            .unwrap_or_default(),
        service_names: application_state
            .hosts
            .service_names_of(host_id)
            .await
            .unwrap_or_default(),
    };

    let alert_count = application_state
        .rules
        .evaluate_and_emit(host_id, &host_label, &evaluation_context)
        .await
        .map_err(|rules_fault| PipelineFault::retriable(rules_fault.to_string()))?;

    // 7. CÓRTEX POST-ESCANEO (jamás tumba el escaneo)
    report_progress(application_state, &job.id, "cortex", 95, "running inference pipelines").await;

    if let Err(cortex_fault) =
        llm_pipelines::run_post_scan(application_state, host, &snapshot_outcome.diffs).await
    {
        warn!("🧠 [SCAN]: Cortex post-scan degraded for {}: {}", host_label, cortex_fault);
    }

    // 8. SELLADO
    report_progress_with_counts(
        application_state,
        &job.id,
        "done",
        100,
        "scan complete",
        json!({
            "services": map_counts.services,
            "mounts": map_counts.mounts,
            "processes": map_counts.processes,
            "edges": edge_count,
            "scan_number": snapshot_outcome.scan_number,
            "diffs": snapshot_outcome.diff_count,
            "alerts": alert_count,
        }),
    )
    .await;

    let _ = application_state
        .audit
        .record(&principal_of(job), "server_scan", host_id, "ok", None)
        .await;

    info!(
        "✅ [SCAN]: Host {} sealed (scan {}, {} diffs, {} alerts, {} edges).",
        host_label, snapshot_outcome.scan_number, snapshot_outcome.diff_count, alert_count, edge_count
    );
    Ok(())
}

// ------------------------------------------------------------------
// APOYOS
// ------------------------------------------------------------------

fn decrypt_credentials(
    application_state: &AppState,
    host: &Host,
) -> Result<DecryptedCredentials, String> {
    let username = host
        .ssh_user
        .clone()
        .ok_or_else(|| "host has no ssh user configured".to_string())?;

    let open_envelope = |sealed: &Option<String>, label: &str| -> Result<Option<String>, String> {
        match sealed {
            None => Ok(None),
            Some(envelope_text) => {
                let envelope: CipherEnvelope = serde_json::from_str(envelope_text)
                    .map_err(|parse_fault| format!("{} envelope malformed: {}", label, parse_fault))?;
                application_state
                    .vault
                    .decrypt(&envelope)
                    .map(Some)
                    .map_err(|vault_fault| format!("{} decryption failed: {}", label, vault_fault))
            }
        }
    };

    let password = open_envelope(&host.encrypted_password, "password")?;
    let private_key_pem = open_envelope(&host.encrypted_private_key, "private key")?;

    if password.is_none() && private_key_pem.is_none() {
        return Err("host has no credential material".to_string());
    }

    Ok(DecryptedCredentials {
        host_address: host.ip.clone(),
        port: host.ssh_port,
        username,
        password,
        private_key_pem,
    })
}

fn principal_of(job: &JobRecord) -> String {
    let principal = safe_str(job.payload.get("principal"));
    if principal.is_empty() { "operator".to_string() } else { principal }
}

async fn report_progress(
    application_state: &AppState,
    job_id: &str,
    step: &str,
    percent: u8,
    message: &str,
) {
    report_progress_with_counts(application_state, job_id, step, percent, message, serde_json::Value::Null).await;
}

async fn report_progress_with_counts(
    application_state: &AppState,
    job_id: &str,
    step: &str,
    percent: u8,
    message: &str,
    counts: serde_json::Value,
) {
    let progress = JobProgress {
        step: step.to_string(),
        percent,
        message: message.to_string(),
        counts: if counts.is_null() { None } else { Some(counts) },
    };

    if let Err(progress_fault) = application_state.jobs.update_progress(job_id, &progress).await {
        warn!("⚠️ [SCAN]: Progress report for {} failed: {}", job_id, progress_fault);
    }
}
