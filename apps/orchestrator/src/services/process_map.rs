// [apps/orchestrator/src/services/process_map.rs]
/*!
 * =================================================================
 * APARATO: PROCESS MAP PIPELINE (V5.5 - FIVE PHASE)
 * CLASIFICACIÓN: WORKER EXECUTION LAYER (ESTRATO L1-WORKER)
 * RESPONSABILIDAD: ÁRBOLES DE CONFIGURACIÓN POR PROCESO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. FASE 1: caza de configuración sobre SSH (base64, topes duros).
 * 2. FASE 2: decodificación de payloads a texto UTF-8.
 * 3. FASE 3: hechos de runtime por catálogo fijo (15 s por comando,
 *    jamás una llamada LLM).
 * 4. FASE 4: con más de tres rutas candidatas, el modelo selecciona
 *    las estructuralmente relevantes.
 * 5. FASE 5: árbol jerárquico tipado por proceso + enriquecimiento
 *    (puertos del índice de servicios, cpu/mem/user/pid del
 *    inventario) y alta de procesos sin configuración.
 *
 * Toda la corrida ocurre bajo el candado de escritor único cuando el
 * proveedor es local, con refresco de lease entre fases.
 * =================================================================
 */

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use sysmap_core_document::{expect_array, safe_int, safe_str};
use sysmap_domain_ai_cortex::{
    chat_expecting_json, prompts, provider_for, ChatOptions, CortexError, ProcessTreeNode,
};
use sysmap_domain_gather::{
    discovery_command_for, generate_config_discovery_script, ConfigDiscoveryOptions,
};
use sysmap_domain_models::ai::{AiPurpose, LlmSettings};
use sysmap_domain_models::host::{DecryptedCredentials, Host};
use sysmap_domain_models::jobs::{JobProgress, JobRecord};
use sysmap_core_vault::CipherEnvelope;
use sysmap_infra_db::DbError;
use sysmap_infra_ssh::{ExecOptions, SshExecutor};

use crate::services::worker_pool::HandlerOutcome;
use crate::state::AppState;

/// Tope de procesos que reciben árbol LLM en una corrida.
const TREE_PROCESS_CAP: usize = 12;

/**
 * Ejecuta un job de la cola process-map (sin reintento por política).
 */
#[instrument(skip(application_state, job), fields(job = %job.id))]
pub async fn execute(application_state: &AppState, job: &JobRecord) -> HandlerOutcome {
    let host_id = safe_str(job.payload.get("host_id"));

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

    let credentials = match decrypt_credentials(application_state, &host) {
        Ok(credentials) => credentials,
        Err(credential_fault) => return HandlerOutcome::Permanent(credential_fault),
    };

    // CANDADO DE ESCRITOR ÚNICO para toda la corrida.
    let slot_locked = if settings.requires_writer_lock() {
        match application_state.ai.acquire_lock(&host.id).await {
            Ok(()) => true,
            Err(DbError::InferenceLockBusy(holder)) => {
                return HandlerOutcome::Permanent(
                    CortexError::LockBusy { holder }.to_string(),
                );
            }
            Err(lock_fault) => return HandlerOutcome::Retriable(lock_fault.to_string()),
        }
    } else {
        false
    };

    let pipeline_outcome = run_pipeline(application_state, job, &host, &settings, &credentials).await;

    if slot_locked {
        if let Err(release_fault) = application_state.ai.release_lock(&host.id).await {
            warn!("🔓 [PROCESS_MAP]: Lock release degraded: {}", release_fault);
        }
    }

    match pipeline_outcome {
        Ok(tree_count) => {
            info!("🗺️ [PROCESS_MAP]: Host {} mapped ({} process trees).", host.id, tree_count);
            HandlerOutcome::Completed
        }
        Err(pipeline_fault) => HandlerOutcome::Permanent(pipeline_fault),
    }
}

async fn run_pipeline(
    application_state: &AppState,
    job: &JobRecord,
    host: &Host,
    settings: &LlmSettings,
    credentials: &DecryptedCredentials,
) -> Result<usize, String> {
    // ------------------------------------------------------------------
    // FASE 1: CAZA DE CONFIGURACIÓN
    // ------------------------------------------------------------------
    report(application_state, &job.id, "discovery", 20, "hunting configuration files").await;

    let discovery_script = generate_config_discovery_script(&ConfigDiscoveryOptions {
        per_process_timeout_secs: 15,
        allow_sudo: host.allow_sudo,
    });

    let discovery_document =
        SshExecutor::run_script(credentials, &discovery_script, &ExecOptions::default())
            .await
            .map_err(|ssh_fault| ssh_fault.to_string())?;

    // ------------------------------------------------------------------
    // FASE 2: DECODIFICACIÓN BASE64
    // ------------------------------------------------------------------
    report(application_state, &job.id, "decode", 35, "decoding configuration payloads").await;

    let mut discovered_processes: Vec<DiscoveredProcess> = Vec::new();
    for process_entry in expect_array(discovery_document.get("processes")) {
        let process_name = safe_str(process_entry.get("process"));
        if process_name.is_empty() {
            continue;
        }

        let mut decoded_configs = Vec::new();
        for config_entry in expect_array(process_entry.get("configs")) {
            let config_path = safe_str(config_entry.get("path"));
            let encoded_payload = safe_str(config_entry.get("content_base64"));

            let decoded_text = BASE64
                .decode(encoded_payload.as_bytes())
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                .unwrap_or_default();

            if !config_path.is_empty() && !decoded_text.is_empty() {
                decoded_configs.push((config_path, decoded_text));
            }
        }

        discovered_processes.push(DiscoveredProcess {
            name: process_name,
            pid: safe_int(process_entry.get("pid"), 0),
            configs: decoded_configs,
            ..Default::default()
        });
    }

    let _ = application_state.ai.touch_lock(&host.id).await;

    // ------------------------------------------------------------------
    // FASE 3: HECHOS DE RUNTIME (catálogo fijo, jamás LLM)
    // ------------------------------------------------------------------
    report(application_state, &job.id, "facts", 50, "capturing runtime facts").await;

    let facts_options = ExecOptions { deadline_secs: 15, extra_retries: 0, ready_timeout_secs: 15 };

    for process in discovered_processes.iter_mut() {
        if let Some(discovery_command) = discovery_command_for(&process.name, host.allow_sudo) {
            match SshExecutor::run_command(credentials, &discovery_command, &facts_options).await {
                Ok(command_output) => {
                    process.runtime_facts = command_output.chars().take(4000).collect();
                }
                Err(command_fault) => {
                    warn!(
                        "🗺️ [PROCESS_MAP]: Catalog command for '{}' degraded: {}",
                        process.name, command_fault
                    );
                }
            }
        }
    }

    let _ = application_state.ai.touch_lock(&host.id).await;

    // ------------------------------------------------------------------
    // FASE 4: SELECCIÓN DE RUTAS (solo con más de tres candidatas)
    // ------------------------------------------------------------------
    report(application_state, &job.id, "selection", 65, "selecting relevant configuration").await;

    for process in discovered_processes.iter_mut() {
        if process.configs.len() <= 3 {
            continue;
        }

        let candidate_paths: Vec<String> =
            process.configs.iter().map(|(path, _)| path.clone()).collect();
        let messages = prompts::path_selection_messages(&process.name, &candidate_paths);

        match invoke_json(settings, &messages).await {
            Ok((selection_value, _)) => {
                let selected: Vec<String> = serde_json::from_value(selection_value)
                    .unwrap_or_else(|_| candidate_paths.clone());
                process
                    .configs
                    .retain(|(path, _)| selected.iter().any(|chosen| chosen == path));
            }
            Err(selection_fault) => {
                warn!(
                    "🗺️ [PROCESS_MAP]: Path selection for '{}' degraded: {}. Keeping all.",
                    process.name, selection_fault
                );
            }
        }
    }

    let _ = application_state.ai.touch_lock(&host.id).await;

    // ------------------------------------------------------------------
    // FASE 5: ÁRBOLES TIPADOS + ENRIQUECIMIENTO
    // ------------------------------------------------------------------
    report(application_state, &job.id, "trees", 85, "building configuration trees").await;

    let inventory_services = application_state.hosts.services_of(&host.id).await.unwrap_or_default();
    let inventory_processes = application_state.hosts.processes_of(&host.id).await.unwrap_or_default();

    let mut mapped_entries: Vec<Value> = Vec::new();
    let mut mapped_names: Vec<String> = Vec::new();

    for process in discovered_processes.iter().take(TREE_PROCESS_CAP) {
        if process.configs.is_empty() {
            continue;
        }

        let config_material = process
            .configs
            .iter()
            .map(|(path, content)| format!("### {}\n{}", path, content))
            .collect::<Vec<_>>()
            .join("\n\n");

        let messages =
            prompts::process_tree_messages(&process.name, &config_material, &process.runtime_facts);

        let tree = match invoke_json(settings, &messages).await {
            Ok((tree_value, _)) => match serde_json::from_value::<ProcessTreeNode>(tree_value) {
                Ok(tree) => tree,
                Err(shape_fault) => {
                    warn!(
                        "🗺️ [PROCESS_MAP]: Tree for '{}' had a foreign shape: {}. Skipped.",
                        process.name, shape_fault
                    );
                    continue;
                }
            },
            Err(tree_fault) => {
                warn!("🗺️ [PROCESS_MAP]: Tree for '{}' degraded: {}. Skipped.", process.name, tree_fault);
                continue;
            }
        };

        mapped_names.push(process.name.clone());
        mapped_entries.push(enrich_entry(
            &process.name,
            process.pid,
            Some(tree),
            &inventory_services,
            &inventory_processes,
        ));
    }

    // ALTA DE PROCESOS SIN CONFIGURACIÓN: presentes en el inventario,
    // ausentes del mapa.
    for inventory_process in &inventory_processes {
        let process_command = safe_str(inventory_process.get("command"));
        if process_command.is_empty()
            || process_command.starts_with('[')
            || mapped_names.iter().any(|mapped| *mapped == process_command)
        {
            continue;
        }

        mapped_names.push(process_command.clone());
        mapped_entries.push(enrich_entry(
            &process_command,
            safe_int(inventory_process.get("pid"), 0),
            None,
            &inventory_services,
            &inventory_processes,
        ));
    }

    let process_map_document = json!({ "processes": mapped_entries });
    let tree_count = mapped_entries_count(&process_map_document);

    application_state
        .ai
        .save_analysis(
            &host.id,
            AiPurpose::ProcessMap,
            &process_map_document,
            "process map five-phase pipeline",
            "",
            &settings.model,
            0,
        )
        .await
        .map_err(|save_fault| save_fault.to_string())?;

    report(application_state, &job.id, "done", 100, "process map sealed").await;
    Ok(tree_count)
}

// ------------------------------------------------------------------
// APOYOS
// ------------------------------------------------------------------

struct DiscoveredProcess {
    name: String,
    pid: i64,
    configs: Vec<(String, String)>,
    runtime_facts: String,
}

impl Default for DiscoveredProcess {
    fn default() -> Self {
        Self { name: String::new(), pid: 0, configs: Vec::new(), runtime_facts: String::new() }
    }
}

fn enrich_entry(
    process_name: &str,
    pid: i64,
    tree: Option<ProcessTreeNode>,
    inventory_services: &[Value],
    inventory_processes: &[Value],
) -> Value {
    // Puertos del índice de servicios atribuidos a este proceso.
    let listening_ports: Vec<i64> = inventory_services
        .iter()
        .filter(|service| safe_str(service.get("name")) == process_name)
        .map(|service| safe_int(service.get("port"), 0))
        .filter(|port| *port > 0)
        .collect();

    // Métricas del inventario de procesos (primera coincidencia).
    let inventory_metrics = inventory_processes
        .iter()
        .find(|process| {
            safe_str(process.get("command")) == process_name
                || safe_int(process.get("pid"), -1) == pid
        })
        .cloned()
        .unwrap_or(Value::Null);

    json!({
        "process": process_name,
        "pid": pid,
        "ports": listening_ports,
        "cpu_pct": inventory_metrics.get("cpu_pct").cloned().unwrap_or(Value::Null),
        "mem_mb": inventory_metrics.get("mem_mb").cloned().unwrap_or(Value::Null),
        "user": inventory_metrics.get("user").cloned().unwrap_or(Value::Null),
        "tree": tree.map(|node| serde_json::to_value(node).unwrap_or(Value::Null)),
    })
}

fn mapped_entries_count(document: &Value) -> usize {
    expect_array(document.get("processes")).len()
}

async fn invoke_json(
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

fn decrypt_credentials(application_state: &AppState, host: &Host) -> Result<DecryptedCredentials, String> {
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

async fn report(application_state: &AppState, job_id: &str, step: &str, percent: u8, message: &str) {
    let progress = JobProgress {
        step: step.to_string(),
        percent,
        message: message.to_string(),
        counts: None,
    };

    if let Err(progress_fault) = application_state.jobs.update_progress(job_id, &progress).await {
        warn!("⚠️ [PROCESS_MAP]: Progress report degraded: {}", progress_fault);
    }
}
