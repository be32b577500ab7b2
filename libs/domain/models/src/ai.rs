// [libs/domain/models/src/ai.rs]
/*!
 * =================================================================
 * APARATO: AI ANALYSIS CONTRACTS (V4.2 - SINGLE WRITER)
 * CLASIFICACIÓN: DOMAIN MODELS (ESTRATO L2)
 * RESPONSABILIDAD: ANÁLISIS IA Y CONFIGURACIÓN SINGLETON DEL PROVEEDOR
 *
 * # Mathematical Proof (Single Writer):
 * El candado de escritor único vive en la fila singleton de
 * configuración (no en memoria de proceso) para sobrevivir reinicios
 * de workers. La adquisición es un CAS sobre 'lock_running' y los
 * candados con más de 45 minutos son recuperables.
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Propósitos de análisis; a lo sumo una fila por (host, propósito).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiPurpose {
    ServerSummary,
    AnomalyCheck,
    ProcessMap,
    Runbook,
    LogAnalysis,
}

impl AiPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            AiPurpose::ServerSummary => "server_summary",
            AiPurpose::AnomalyCheck => "anomaly_check",
            AiPurpose::ProcessMap => "process_map",
            AiPurpose::Runbook => "runbook",
            AiPurpose::LogAnalysis => "log_analysis",
        }
    }

    pub fn parse(label: &str) -> Option<AiPurpose> {
        match label {
            "server_summary" => Some(AiPurpose::ServerSummary),
            "anomaly_check" => Some(AiPurpose::AnomalyCheck),
            "process_map" => Some(AiPurpose::ProcessMap),
            "runbook" => Some(AiPurpose::Runbook),
            "log_analysis" => Some(AiPurpose::LogAnalysis),
            _ => None,
        }
    }
}

/// Resultado persistido de una tarea IA (reemplaza la fila previa).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiAnalysis {
    pub id: String,
    pub host_id: String,
    pub purpose: AiPurpose,
    pub document: Value,
    pub raw_prompt: String,
    pub raw_response: String,
    pub model_used: String,
    pub duration_ms: i64,
    pub created_at: DateTime<Utc>,
}

/// Familia del proveedor de inferencia.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProviderKind {
    /// Endpoints compatibles con la API de chat de OpenAI (incluye
    /// llama.cpp en modo server). Local cuando apunta a loopback.
    OpenaiCompatible,
    Ollama,
    Anthropic,
}

impl LlmProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProviderKind::OpenaiCompatible => "openai_compatible",
            LlmProviderKind::Ollama => "ollama",
            LlmProviderKind::Anthropic => "anthropic",
        }
    }

    pub fn parse(label: &str) -> Option<LlmProviderKind> {
        match label {
            "openai_compatible" => Some(LlmProviderKind::OpenaiCompatible),
            "ollama" => Some(LlmProviderKind::Ollama),
            "anthropic" => Some(LlmProviderKind::Anthropic),
            _ => None,
        }
    }
}

/// Fila singleton de configuración LLM, incluidos los campos del candado.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    pub provider: LlmProviderKind,
    pub endpoint: String,
    /// Credencial del proveedor (sobre cifrado serializado o vacía).
    pub api_credential: Option<String>,
    pub model: String,

    // --- BANDERAS DE CARACTERÍSTICAS ---
    pub enabled: bool,
    pub summaries_enabled: bool,
    pub anomaly_enabled: bool,
    pub log_analysis_enabled: bool,

    // --- MUESTREO Y PLAZOS ---
    pub temperature: f64,
    pub max_tokens: i64,
    pub context_tokens: i64,
    pub timeout_secs: u64,

    // --- CANDADO DE ESCRITOR ÚNICO ---
    pub lock_running: bool,
    pub lock_holder_host_id: Option<String>,
    pub lock_updated_at: Option<DateTime<Utc>>,
}

impl LlmSettings {
    /// Minutos tras los cuales un candado abandonado es recuperable.
    pub const LOCK_STALE_MINUTES: i64 = 45;

    /// Los proveedores de API externa esquivan el candado local.
    pub fn requires_writer_lock(&self) -> bool {
        match self.provider {
            LlmProviderKind::Ollama => true,
            LlmProviderKind::OpenaiCompatible => {
                let endpoint_lowered = self.endpoint.to_ascii_lowercase();
                endpoint_lowered.contains("localhost")
                    || endpoint_lowered.contains("127.0.0.1")
                    || endpoint_lowered.contains("0.0.0.0")
            }
            LlmProviderKind::Anthropic => false,
        }
    }

    pub fn lock_is_stale(&self, now: DateTime<Utc>) -> bool {
        match (self.lock_running, self.lock_updated_at) {
            (true, Some(updated_at)) => {
                now.signed_duration_since(updated_at)
                    >= chrono::Duration::minutes(Self::LOCK_STALE_MINUTES)
            }
            (true, None) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn settings(provider: LlmProviderKind, endpoint: &str) -> LlmSettings {
        LlmSettings {
            provider,
            endpoint: endpoint.into(),
            api_credential: None,
            model: "test-model".into(),
            enabled: true,
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

    #[test]
    fn certify_lock_requirement_by_provider() {
        assert!(settings(LlmProviderKind::Ollama, "http://10.1.1.1:11434").requires_writer_lock());
        assert!(settings(LlmProviderKind::OpenaiCompatible, "http://127.0.0.1:8080/v1").requires_writer_lock());
        assert!(!settings(LlmProviderKind::OpenaiCompatible, "https://api.example.com/v1").requires_writer_lock());
        assert!(!settings(LlmProviderKind::Anthropic, "https://api.anthropic.com").requires_writer_lock());
    }

    #[test]
    fn certify_stale_lock_window() {
        let now = Utc::now();
        let mut llm_settings = settings(LlmProviderKind::Ollama, "http://localhost:11434");

        llm_settings.lock_running = true;
        llm_settings.lock_updated_at = Some(now - Duration::minutes(44));
        assert!(!llm_settings.lock_is_stale(now));

        llm_settings.lock_updated_at = Some(now - Duration::minutes(46));
        assert!(llm_settings.lock_is_stale(now));

        llm_settings.lock_running = false;
        assert!(!llm_settings.lock_is_stale(now));
    }
}
