// [apps/orchestrator/src/config.rs]
/*!
 * =================================================================
 * APARATO: RUNTIME CONFIGURATION LOADER (V5.2)
 * CLASIFICACIÓN: APPLICATION SHELL (ESTRATO L1-APP)
 * RESPONSABILIDAD: CAPTURA TIPADA DEL ENTORNO DE PROCESO
 * =================================================================
 */

use std::env;

use sysmap_domain_models::ai::{LlmProviderKind, LlmSettings};

/// Coordenadas operativas capturadas del entorno en la ignición.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub database_url: String,
    pub database_access_token: Option<String>,
    /// Llave maestra de la bóveda: 64 caracteres hexadecimales.
    pub vault_master_key_hex: String,
    /// Ruta del binario del escáner de red externo.
    pub scanner_binary_path: String,
    pub llm_bootstrap: LlmSettings,
}

impl RuntimeConfig {
    /**
     * Captura y valida el entorno. Falla temprano y con diagnóstico
     * preciso: un proceso sin coordenadas no debe levantar workers.
     */
    pub fn from_env() -> Result<Self, String> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL not defined in runtime environment".to_string())?;

        let vault_master_key_hex = env::var("SYSMAP_MASTER_KEY")
            .map_err(|_| "SYSMAP_MASTER_KEY not defined (64 hex chars required)".to_string())?;

        Ok(Self {
            database_url,
            database_access_token: env::var("TURSO_AUTH_TOKEN").ok(),
            vault_master_key_hex,
            scanner_binary_path: env::var("NMAP_BINARY_PATH")
                .unwrap_or_else(|_| "nmap".to_string()),
            llm_bootstrap: llm_bootstrap_from_env(),
        })
    }
}

/// Bootstrap de la fila singleton LLM en el primer arranque; las
/// corridas posteriores leen exclusivamente la base.
fn llm_bootstrap_from_env() -> LlmSettings {
    let provider = env::var("LLM_PROVIDER")
        .ok()
        .and_then(|label| LlmProviderKind::parse(&label))
        .unwrap_or(LlmProviderKind::Ollama);

    LlmSettings {
        provider,
        endpoint: env::var("LLM_ENDPOINT")
            .unwrap_or_else(|_| "http://127.0.0.1:11434".to_string()),
        api_credential: env::var("LLM_API_KEY").ok().filter(|key| !key.is_empty()),
        model: env::var("LLM_MODEL").unwrap_or_else(|_| "qwen2.5:7b".to_string()),
        enabled: env::var("LLM_ENABLED").map(|flag| flag == "1" || flag == "true").unwrap_or(false),
        summaries_enabled: true,
        anomaly_enabled: true,
        log_analysis_enabled: true,
        temperature: 0.2,
        max_tokens: 2048,
        context_tokens: 8192,
        timeout_secs: 300,
        lock_running: false,
        lock_holder_host_id: None,
        lock_updated_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certify_llm_bootstrap_defaults() {
        let bootstrap = llm_bootstrap_from_env();
        assert_eq!(bootstrap.provider, LlmProviderKind::Ollama);
        assert_eq!(bootstrap.timeout_secs, 300);
        assert!(bootstrap.summaries_enabled);
    }
}
