// [libs/domain/ai-cortex/src/prompts.rs]
/*!
 * =================================================================
 * APARATO: INFERENCE PROMPT FORGE (V5.3)
 * CLASIFICACIÓN: DOMAIN GENERATORS (ESTRATO L2)
 * RESPONSABILIDAD: PROMPTS DE LOS PIPELINES POST-ESCANEO
 *
 * Los prompts exigen JSON en el propio texto: el proveedor Anthropic
 * carece de bandera de modo JSON y debe ser instruido por prompt.
 * =================================================================
 */

use serde_json::Value;

use sysmap_domain_diff::DiffDraft;
use sysmap_domain_models::snapshot::{ChangeType, Severity};

use crate::providers::ChatMessage;

/// Tope de diffs que viajan al chequeo de anomalías.
pub const ANOMALY_DIFF_CAP: usize = 30;
/// Tope de caracteres de configuración por árbol de proceso.
pub const TREE_INPUT_CHAR_CAP: usize = 60_000;

// ------------------------------------------------------------------
// PRIORIZACIÓN DE DIFFS
// ------------------------------------------------------------------

/**
 * Ordena por (severidad critical→warning→info, tipo removed→added→
 * modified) y recorta al tope del contrato.
 */
pub fn prioritize_diffs(diffs: &[DiffDraft]) -> Vec<&DiffDraft> {
    let severity_rank = |severity: Severity| match severity {
        Severity::Critical => 0,
        Severity::Warning => 1,
        Severity::Info => 2,
    };
    let change_rank = |change_type: ChangeType| match change_type {
        ChangeType::Removed => 0,
        ChangeType::Added => 1,
        ChangeType::Modified => 2,
    };

    let mut ranked: Vec<&DiffDraft> = diffs.iter().collect();
    ranked.sort_by_key(|diff| (severity_rank(diff.severity), change_rank(diff.change_type)));
    ranked.truncate(ANOMALY_DIFF_CAP);
    ranked
}

// ------------------------------------------------------------------
// PROMPTS
// ------------------------------------------------------------------

pub fn server_summary_messages(host_facts: &Value) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(
            "You are an infrastructure analyst. Answer ONLY with a JSON object of the shape \
             {\"purpose\": string, \"tags\": [string], \"summary\": string}. The purpose is a \
             one-line role statement; tags are at most six short lowercase labels; the summary \
             is at most four sentences.",
        ),
        ChatMessage::user(format!(
            "Classify this Linux server from its inventory facts:\n{}",
            serde_json::to_string_pretty(host_facts).unwrap_or_default()
        )),
    ]
}

pub fn anomaly_check_messages(prioritized_diffs: &[&DiffDraft]) -> Vec<ChatMessage> {
    let diff_lines: Vec<String> = prioritized_diffs
        .iter()
        .map(|diff| {
            format!(
                "- [{}] {} {} ({})",
                diff.severity.as_str(),
                diff.change_type.as_str(),
                diff.item_key,
                diff.category.as_str()
            )
        })
        .collect();

    vec![
        ChatMessage::system(
            "You are a security-minded change reviewer. Answer ONLY with a JSON object of the \
             shape {\"overall_risk\": \"low\"|\"medium\"|\"high\"|\"critical\", \"summary\": \
             string, \"findings\": [{\"title\": string, \"assessment\": \
             \"normal\"|\"suspicious\"|\"critical\", \"detail\": string}]}.",
        ),
        ChatMessage::user(format!(
            "Assess the risk of these configuration changes detected on one host:\n{}",
            diff_lines.join("\n")
        )),
    ]
}

pub fn log_analysis_messages(compressed_logs: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(
            "You are a Linux operations analyst. Answer ONLY with a JSON object of the shape \
             {\"status_score\": 0-100, \"status\": \"healthy\"|\"degraded\"|\"critical\", \
             \"summary\": [string], \"findings\": [{\"title\": string, \"assessment\": \
             \"normal\"|\"suspicious\"|\"critical\", \"detail\": string}]} with at most 8 findings.",
        ),
        ChatMessage::user(format!(
            "Evaluate host health from these filtered log lines (24h window):\n{}",
            compressed_logs
        )),
    ]
}

pub fn runbook_messages(host_facts: &Value) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(
            "You are a senior SRE writing a maintenance playbook. Answer ONLY with a JSON \
             object of the shape {\"sections\": [{\"title\": string, \"priority\": \
             \"routine\"|\"important\"|\"critical\", \"steps\": [string]}]}. Steps must be \
             concrete commands or checks for THIS host.",
        ),
        ChatMessage::user(format!(
            "Produce the maintenance runbook for this server:\n{}",
            serde_json::to_string_pretty(host_facts).unwrap_or_default()
        )),
    ]
}

/**
 * Selección de rutas: cuando un proceso acumula más de tres
 * candidatos, el modelo elige los estructuralmente relevantes.
 */
pub fn path_selection_messages(process_name: &str, candidate_paths: &[String]) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(
            "You select configuration files. Answer ONLY with a JSON array of the paths (strings) \
             that are structurally relevant main configuration files, at most 3 entries.",
        ),
        ChatMessage::user(format!(
            "Process `{}` exposes these candidate configuration paths:\n{}",
            process_name,
            candidate_paths.join("\n")
        )),
    ]
}

pub fn process_tree_messages(
    process_name: &str,
    config_material: &str,
    runtime_facts: &str,
) -> Vec<ChatMessage> {
    // Compresión libre: comentarios y líneas en blanco fuera, y tope
    // duro de caracteres para no desbordar la ventana del modelo.
    let compacted_material = compact_config_material(config_material);

    vec![
        ChatMessage::system(
            "You map process configuration into a tree. Answer ONLY with a JSON object of the \
             shape {\"type\": node_type, \"value\": string, \"children\": [node]}, where \
             node_type is one of config_file|port|path|directory|vhost|upstream|connection|\
             volume|parameter|user|module|database|log.",
        ),
        ChatMessage::user(format!(
            "Build the configuration tree for process `{}`.\n\nRuntime facts:\n{}\n\nConfiguration material:\n{}",
            process_name, runtime_facts, compacted_material
        )),
    ]
}

/// Elimina comentarios y líneas vacías, y aplica el tope de 60 000
/// caracteres del contrato.
pub fn compact_config_material(raw_material: &str) -> String {
    let mut compacted = String::with_capacity(raw_material.len().min(TREE_INPUT_CHAR_CAP));

    for line in raw_material.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("//") {
            continue;
        }
        if compacted.len() + trimmed.len() + 1 > TREE_INPUT_CHAR_CAP {
            break;
        }
        compacted.push_str(trimmed);
        compacted.push('\n');
    }

    compacted
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sysmap_domain_models::snapshot::DiffCategory;

    fn diff(severity: Severity, change_type: ChangeType, key: &str) -> DiffDraft {
        DiffDraft {
            category: DiffCategory::Services,
            change_type,
            item_key: key.into(),
            old_value: None,
            new_value: None,
            severity,
        }
    }

    /**
     * Orden exigido: severidad critical→warning→info y dentro de cada
     * severidad removed→added→modified; tope de 30.
     */
    #[test]
    fn certify_diff_prioritization() {
        let mut diffs = vec![
            diff(Severity::Info, ChangeType::Modified, "i-m"),
            diff(Severity::Critical, ChangeType::Modified, "c-m"),
            diff(Severity::Warning, ChangeType::Removed, "w-r"),
            diff(Severity::Critical, ChangeType::Removed, "c-r"),
            diff(Severity::Warning, ChangeType::Added, "w-a"),
        ];
        for index in 0..40 {
            diffs.push(diff(Severity::Info, ChangeType::Added, &format!("pad-{index}")));
        }

        let prioritized = prioritize_diffs(&diffs);
        assert_eq!(prioritized.len(), ANOMALY_DIFF_CAP);
        assert_eq!(prioritized[0].item_key, "c-r");
        assert_eq!(prioritized[1].item_key, "c-m");
        assert_eq!(prioritized[2].item_key, "w-r");
        assert_eq!(prioritized[3].item_key, "w-a");
    }

    #[test]
    fn certify_config_compaction() {
        let material = "# comment line\n\nserver {\n  listen 443;\n  # inline note\n}\n";
        let compacted = compact_config_material(material);
        assert!(compacted.contains("listen 443;"));
        assert!(!compacted.contains("comment line"));
        assert!(!compacted.contains("inline note"));
    }

    #[test]
    fn certify_compaction_cap() {
        let huge_material = "directive value;\n".repeat(10_000);
        assert!(compact_config_material(&huge_material).len() <= TREE_INPUT_CHAR_CAP);
    }

    /// Todos los prompts JSON declaran la orden en el texto (Anthropic
    /// carece de bandera de modo JSON).
    #[test]
    fn certify_prompts_demand_json() {
        let summary = server_summary_messages(&json!({"hostname": "h1"}));
        assert!(summary[0].content.contains("ONLY with a JSON"));

        let anomaly = anomaly_check_messages(&[]);
        assert!(anomaly[0].content.contains("ONLY with a JSON"));

        let logs = log_analysis_messages("ERROR x");
        assert!(logs[0].content.contains("at most 8 findings"));
    }
}
