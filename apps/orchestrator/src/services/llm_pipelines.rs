// [apps/orchestrator/src/services/llm_pipelines.rs]
/*!
 * =================================================================
 * APARATO: CORTEX PIPELINE ORCHESTRATION (V5.6 - LOCK DISCIPLINED)
 * CLASIFICACIÓN: WORKER EXECUTION LAYER (ESTRATO L1-WORKER)
 * RESPONSABILIDAD: PIPELINES POST-ESCANEO Y TAREAS IA BAJO DEMANDA
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. SINGLE WRITER: los proveedores locales exigen el candado CAS de
 *    la fila singleton; los de API externa lo esquivan. La liberación
 *    cubre todas las rutas de salida.
 * 2. NEVER FAIL THE SCAN: todo fallo de inferencia degrada a warning;
 *    el escaneo que lo envuelve cierra completo.
 * 3. GATES: summaries/anomaly/log_analysis respetan sus banderas; el
 *    análisis de logs corre a lo sumo una vez por host cada 24 h.
 * =================================================================
 */

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use sysmap_core_document::safe_str;
use sysmap_domain_ai_cortex::{
    chat_expecting_json, compress_logs, prompts, provider_for, AnomalyReport, ChatOptions,
    CortexError, LogAnalysisReport, RunbookDocument, ServerSummary,
};
use sysmap_domain_diff::DiffDraft;
use sysmap_domain_models::ai::{AiPurpose, LlmSettings};
use sysmap_domain_models::host::Host;
use sysmap_domain_models::jobs::JobRecord;
use sysmap_domain_models::snapshot::Severity;
use sysmap_domain_ai_cortex::outputs::HealthStatus;
use sysmap_infra_db::DbError;

use crate::services::worker_pool::HandlerOutcome;
use crate::state::AppState;

// ------------------------------------------------------------------
// ENTRADAS
// ------------------------------------------------------------------

/**
 * Pipelines posteriores a un escaneo exitoso. Jamás propaga un fallo
 * que pueda tumbar el escaneo: degrada y reporta.
 */
#[instrument(skip_all, fields(host = %host.id))]
pub async fn run_post_scan(
    application_state: &AppState,
    host: &Host,
    fresh_diffs: &[DiffDraft],
) -> Result<(), String> {
    let settings = match application_state.ai.load_settings().await {
        Ok(settings) => settings,
        Err(settings_fault) => return Err(settings_fault.to_string()),
    };

    if !settings.enabled {
        return Ok(());
    }

    if settings.summaries_enabled {
        if let Err(summary_fault) = run_server_summary(application_state, &settings, host).await {
            warn!("🧠 [CORTEX]: server_summary degraded: {}", summary_fault);
        }
    }

    if settings.anomaly_enabled && !fresh_diffs.is_empty() {
        if let Err(anomaly_fault) =
            run_anomaly_check(application_state, &settings, host, fresh_diffs).await
        {
            warn!("🧠 [CORTEX]: anomaly_check degraded: {}", anomaly_fault);
        }
    }

    if settings.log_analysis_enabled {
        if let Err(log_fault) = run_log_analysis(application_state, &settings, host).await {
            warn!("🧠 [CORTEX]: log_analysis degraded: {}", log_fault);
        }
    }

    Ok(())
}

/**
 * Handler de la cola ai-analysis: tareas bajo demanda.
 */
#[instrument(skip(application_state, job), fields(job = %job.id))]
pub async fn execute_ai_task(application_state: &AppState, job: &JobRecord) -> HandlerOutcome {
    let host_id = safe_str(job.payload.get("host_id"));
    let task_label = safe_str(job.payload.get("task"));

    let host = match application_state.hosts.get(&host_id).await {
        Ok(host) => host,
        Err(DbError::HostNotFound) => {
            return HandlerOutcome::Permanent(format!("host {} vanished", host_id));
        }
        Err(lookup_fault) => return HandlerOutcome::Retriable(lookup_fault.to_string()),
    };

    let settings = match application_state.ai.load_settings().await {
        Ok(settings) if settings.enabled => settings,
        Ok(_) => return HandlerOutcome::Permanent("llm feature disabled".into()),
        Err(settings_fault) => return HandlerOutcome::Retriable(settings_fault.to_string()),
    };

    let task_outcome = match task_label.as_str() {
        "server_summary" => run_server_summary(application_state, &settings, &host).await,
        "log_analysis" => run_log_analysis(application_state, &settings, &host).await,
        "runbook" => run_runbook(application_state, &settings, &host).await,
        unknown_task => {
            return HandlerOutcome::Permanent(format!("unknown ai task '{}'", unknown_task));
        }
    };

    match task_outcome {
        Ok(()) => HandlerOutcome::Completed,
        // Compuertas de política y errores de programación no se
        // reintentan; la infraestructura transitoria sí.
        Err(cortex_fault) if cortex_fault.is_retriable() => {
            HandlerOutcome::Retriable(cortex_fault.to_string())
        }
        Err(cortex_fault) => HandlerOutcome::Permanent(cortex_fault.to_string()),
    }
}

// ------------------------------------------------------------------
// CANDADO DE ESCRITOR ÚNICO
// ------------------------------------------------------------------

/// Adquiere el slot de inferencia cuando el proveedor es local.
/// Devuelve true si el candado quedó tomado (y debe liberarse).
async fn acquire_inference_slot(
    application_state: &AppState,
    settings: &LlmSettings,
    holder_host_id: &str,
) -> Result<bool, CortexError> {
    if !settings.requires_writer_lock() {
        return Ok(false);
    }

    match application_state.ai.acquire_lock(holder_host_id).await {
        Ok(()) => Ok(true),
        Err(DbError::InferenceLockBusy(holder)) => Err(CortexError::LockBusy { holder }),
        Err(other_fault) => Err(CortexError::Storage(other_fault.to_string())),
    }
}

async fn release_inference_slot(
    application_state: &AppState,
    slot_was_locked: bool,
    holder_host_id: &str,
) {
    if slot_was_locked {
        if let Err(release_fault) = application_state.ai.release_lock(holder_host_id).await {
            warn!("🔓 [CORTEX]: Lock release degraded: {}", release_fault);
        }
    }
}

// ------------------------------------------------------------------
// INVOCACIÓN CON REINTENTO DE INFRAESTRUCTURA
// ------------------------------------------------------------------

async fn invoke_expecting_json(
    settings: &LlmSettings,
    messages: &[sysmap_domain_ai_cortex::ChatMessage],
) -> Result<(Value, sysmap_domain_ai_cortex::ChatOutcome), CortexError> {
    let provider = provider_for(settings.provider);
    let options = ChatOptions {
        temperature: settings.temperature,
        max_tokens: settings.max_tokens,
        context_tokens: settings.context_tokens,
        timeout_secs: settings.timeout_secs,
        force_json: true,
    };

    let first_attempt = chat_expecting_json(
        provider.as_ref(),
        messages,
        &options,
        &settings.endpoint,
        settings.api_credential.as_deref(),
        &settings.model,
    )
    .await;

    match first_attempt {
        Err(transport_fault) if transport_fault.is_retriable() => {
            warn!("🧠 [CORTEX]: Transient inference fault ({}); single retry.", transport_fault);
            chat_expecting_json(
                provider.as_ref(),
                messages,
                &options,
                &settings.endpoint,
                settings.api_credential.as_deref(),
                &settings.model,
            )
            .await
        }
        other_outcome => other_outcome,
    }
}

// ------------------------------------------------------------------
// PIPELINE: SERVER SUMMARY
// ------------------------------------------------------------------

async fn run_server_summary(
    application_state: &AppState,
    settings: &LlmSettings,
    host: &Host,
) -> Result<(), CortexError> {
    let slot_locked = acquire_inference_slot(application_state, settings, &host.id).await?;

    let summary_outcome = async {
        let host_facts = collect_host_facts(application_state, host).await;
        let messages = prompts::server_summary_messages(&host_facts);

        let (parsed_value, chat_outcome) = invoke_expecting_json(settings, &messages).await?;

        let summary: ServerSummary = serde_json::from_value(parsed_value.clone())
            .map_err(|shape_fault| CortexError::UnparseableResponse(shape_fault.to_string()))?;

        let _ = application_state
            .hosts
            .save_ai_fields(&host.id, &summary.purpose, &summary.tags.join(","), &summary.summary)
            .await;

        let _ = application_state
            .ai
            .save_analysis(
                &host.id,
                AiPurpose::ServerSummary,
                &parsed_value,
                &messages.last().map(|message| message.content.clone()).unwrap_or_default(),
                &chat_outcome.content,
                &chat_outcome.model,
                chat_outcome.duration_ms as i64,
            )
            .await;

        info!("🧠 [CORTEX]: server_summary sealed for {} ({}ms).", host.id, chat_outcome.duration_ms);
        Ok(())
    }
    .await;

    release_inference_slot(application_state, slot_locked, &host.id).await;
    summary_outcome
}

// ------------------------------------------------------------------
// PIPELINE: ANOMALY CHECK
// ------------------------------------------------------------------

async fn run_anomaly_check(
    application_state: &AppState,
    settings: &LlmSettings,
    host: &Host,
    fresh_diffs: &[DiffDraft],
) -> Result<(), CortexError> {
    let slot_locked = acquire_inference_slot(application_state, settings, &host.id).await?;

    let anomaly_outcome = async {
        let prioritized = prompts::prioritize_diffs(fresh_diffs);
        let messages = prompts::anomaly_check_messages(&prioritized);

        let (parsed_value, chat_outcome) = invoke_expecting_json(settings, &messages).await?;

        let report: AnomalyReport = serde_json::from_value(parsed_value.clone())
            .map_err(|shape_fault| CortexError::UnparseableResponse(shape_fault.to_string()))?;

        let _ = application_state
            .ai
            .save_analysis(
                &host.id,
                AiPurpose::AnomalyCheck,
                &parsed_value,
                &messages.last().map(|message| message.content.clone()).unwrap_or_default(),
                &chat_outcome.content,
                &chat_outcome.model,
                chat_outcome.duration_ms as i64,
            )
            .await;

        // ESCALAMIENTO: riesgo alto o hallazgo crítico se vuelve alerta.
        if let Some(alert_severity) = report.alert_escalation() {
            let host_label = host.hostname.clone().unwrap_or_else(|| host.ip.clone());
            let _ = application_state
                .rules
                .emit_direct_alert(
                    Some(&host.id),
                    &format!("[{}] AI anomaly assessment", host_label),
                    &report.summary,
                    alert_severity,
                    "ai_anomaly",
                    parsed_value.clone(),
                )
                .await;
        }

        info!("🧠 [CORTEX]: anomaly_check sealed for {}.", host.id);
        Ok(())
    }
    .await;

    release_inference_slot(application_state, slot_locked, &host.id).await;
    anomaly_outcome
}

// ------------------------------------------------------------------
// PIPELINE: LOG ANALYSIS (compuerta de 24 h)
// ------------------------------------------------------------------

async fn run_log_analysis(
    application_state: &AppState,
    settings: &LlmSettings,
    host: &Host,
) -> Result<(), CortexError> {
    // COMPUERTA DE 24 HORAS por host.
    if let Ok(Some(last_run)) = application_state
        .ai
        .last_analysis_at(&host.id, AiPurpose::LogAnalysis)
        .await
    {
        if Utc::now().signed_duration_since(last_run) < chrono::Duration::hours(24) {
            return Ok(());
        }
    }

    let log_lines = application_state
        .hosts
        .log_lines_of(&host.id)
        .await
        .unwrap_or_default();

    if log_lines.is_empty() {
        return Ok(());
    }

    let slot_locked = acquire_inference_slot(application_state, settings, &host.id).await?;

    let log_outcome = async {
        let compressed_material = compress_logs(&log_lines);
        let messages = prompts::log_analysis_messages(&compressed_material);

        let (parsed_value, chat_outcome) = invoke_expecting_json(settings, &messages).await?;

        let report: LogAnalysisReport = serde_json::from_value(parsed_value.clone())
            .map_err(|shape_fault| CortexError::UnparseableResponse(shape_fault.to_string()))?;
        let report = report.clamp();

        let _ = application_state
            .ai
            .save_analysis(
                &host.id,
                AiPurpose::LogAnalysis,
                &serde_json::to_value(&report).unwrap_or(parsed_value.clone()),
                &messages.last().map(|message| message.content.clone()).unwrap_or_default(),
                &chat_outcome.content,
                &chat_outcome.model,
                chat_outcome.duration_ms as i64,
            )
            .await;

        if report.status == HealthStatus::Critical {
            let host_label = host.hostname.clone().unwrap_or_else(|| host.ip.clone());
            let _ = application_state
                .rules
                .emit_direct_alert(
                    Some(&host.id),
                    &format!("[{}] Log health critical", host_label),
                    &report.summary.join("; "),
                    Severity::Critical,
                    "ai_logs",
                    parsed_value.clone(),
                )
                .await;
        }

        info!("🧠 [CORTEX]: log_analysis sealed for {} (score {}).", host.id, report.status_score);
        Ok(())
    }
    .await;

    release_inference_slot(application_state, slot_locked, &host.id).await;
    log_outcome
}

// ------------------------------------------------------------------
// PIPELINE: RUNBOOK (solo bajo demanda)
// ------------------------------------------------------------------

async fn run_runbook(
    application_state: &AppState,
    settings: &LlmSettings,
    host: &Host,
) -> Result<(), CortexError> {
    let slot_locked = acquire_inference_slot(application_state, settings, &host.id).await?;

    let runbook_outcome = async {
        let host_facts = collect_host_facts(application_state, host).await;
        let messages = prompts::runbook_messages(&host_facts);

        let (parsed_value, chat_outcome) = invoke_expecting_json(settings, &messages).await?;

        let runbook: RunbookDocument = serde_json::from_value(parsed_value.clone())
            .map_err(|shape_fault| CortexError::UnparseableResponse(shape_fault.to_string()))?;
        let runbook = runbook.sorted();

        let _ = application_state
            .ai
            .save_analysis(
                &host.id,
                AiPurpose::Runbook,
                &serde_json::to_value(&runbook).unwrap_or(parsed_value),
                &messages.last().map(|message| message.content.clone()).unwrap_or_default(),
                &chat_outcome.content,
                &chat_outcome.model,
                chat_outcome.duration_ms as i64,
            )
            .await;

        info!("🧠 [CORTEX]: runbook sealed for {} ({} sections).", host.id, runbook.sections.len());
        Ok(())
    }
    .await;

    release_inference_slot(application_state, slot_locked, &host.id).await;
    runbook_outcome
}

// ------------------------------------------------------------------
// HECHOS DEL HOST PARA LOS PROMPTS
// ------------------------------------------------------------------

async fn collect_host_facts(application_state: &AppState, host: &Host) -> Value {
    json!({
        "hostname": host.hostname,
        "ip": host.ip,
        "os": host.os_info,
        "kernel": host.kernel_info,
        "cpu": host.cpu_info,
        "memory_mb": host.memory_mb,
        "services": application_state.hosts.services_of(&host.id).await.unwrap_or_default(),
        "mounts": application_state.hosts.mounts_of(&host.id).await.unwrap_or_default(),
        "systemd_units": application_state.hosts.systemd_units_of(&host.id).await.unwrap_or_default(),
        "certificates": application_state.hosts.certificates_of(&host.id).await.unwrap_or_default(),
    })
}
