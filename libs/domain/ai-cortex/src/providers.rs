// [libs/domain/ai-cortex/src/providers.rs]
/*!
 * =================================================================
 * APARATO: CHAT PROVIDER ABSTRACTION (V5.3 - TRIPLE REALISATION)
 * CLASIFICACIÓN: DOMAIN ADAPTER (ESTRATO L2)
 * RESPONSABILIDAD: UNA INTERFAZ DE CHAT, TRES PROVEEDORES
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. OPENAI-COMPATIBLE: bearer token, response_format opcional; cubre
 *    llama.cpp en modo server y endpoints gestionados.
 * 2. OLLAMA: stream:false, options{temperature,num_predict,num_ctx},
 *    format:"json" opcional y keep_alive; doble plazo (señal de abort
 *    + carrera de reloj de pared) porque el abort es poco fiable en
 *    generaciones largas.
 * 3. ANTHROPIC: cabecera x-api-key, campo system separado; sin bandera
 *    de modo JSON (el prompt debe instruirlo).
 * =================================================================
 */

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::time::timeout;
use tracing::{debug, instrument};

use sysmap_domain_models::ai::LlmProviderKind;

use crate::errors::CortexError;

/// Margen del reloj de pared sobre el plazo de abort de Ollama.
const WALL_CLOCK_GRACE_SECS: u64 = 15;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }
}

#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub temperature: f64,
    pub max_tokens: i64,
    pub context_tokens: i64,
    pub timeout_secs: u64,
    /// Exige salida JSON en los proveedores que soportan la bandera.
    pub force_json: bool,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 2048,
            context_tokens: 8192,
            timeout_secs: 300,
            force_json: false,
        }
    }
}

/// Resultado normalizado de una invocación de chat.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub content: String,
    pub model: String,
    pub provider: String,
    pub usage: Option<Value>,
    pub duration_ms: u64,
    pub raw: Value,
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
        endpoint: &str,
        credential: Option<&str>,
        model: &str,
    ) -> Result<ChatOutcome, CortexError>;

    fn name(&self) -> &'static str;
}

/// Resuelve la realización del proveedor configurado.
pub fn provider_for(kind: LlmProviderKind) -> Box<dyn ChatProvider> {
    match kind {
        LlmProviderKind::OpenaiCompatible => Box::new(OpenAiCompatibleProvider),
        LlmProviderKind::Ollama => Box::new(OllamaProvider),
        LlmProviderKind::Anthropic => Box::new(AnthropicProvider),
    }
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client, CortexError> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent("systemmap-cortex/0.5")
        .build()?)
}

async fn read_checked_body(response: reqwest::Response) -> Result<Value, CortexError> {
    let status = response.status();
    if !status.is_success() {
        let body_excerpt: String = response
            .text()
            .await
            .unwrap_or_default()
            .chars()
            .take(400)
            .collect();
        return Err(CortexError::UpstreamStatus { status: status.as_u16(), body_excerpt });
    }
    Ok(response.json::<Value>().await?)
}

fn non_empty(content: String) -> Result<String, CortexError> {
    if content.trim().is_empty() {
        return Err(CortexError::EmptyCompletion);
    }
    Ok(content)
}

// ------------------------------------------------------------------
// REALIZACIÓN 1: OPENAI-COMPATIBLE
// ------------------------------------------------------------------

pub struct OpenAiCompatibleProvider;

#[async_trait]
impl ChatProvider for OpenAiCompatibleProvider {
    #[instrument(skip_all, fields(model = %model))]
    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
        endpoint: &str,
        credential: Option<&str>,
        model: &str,
    ) -> Result<ChatOutcome, CortexError> {
        let call_start = Instant::now();

        let mut body = json!({
            "model": model,
            "messages": messages,
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
        });
        if options.force_json {
            body["response_format"] = json!({ "type": "json_object" });
        }

        let mut request = http_client(options.timeout_secs)?
            .post(format!("{}/chat/completions", endpoint.trim_end_matches('/')))
            .json(&body);

        if let Some(bearer_token) = credential {
            request = request.bearer_auth(bearer_token);
        }

        let raw = read_checked_body(request.send().await?).await?;

        let content = raw["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        debug!("🧠 [CORTEX]: openai-compatible completion in {}ms", call_start.elapsed().as_millis());

        Ok(ChatOutcome {
            content: non_empty(content)?,
            model: raw["model"].as_str().unwrap_or(model).to_string(),
            provider: self.name().to_string(),
            usage: raw.get("usage").cloned(),
            duration_ms: call_start.elapsed().as_millis() as u64,
            raw,
        })
    }

    fn name(&self) -> &'static str {
        "openai_compatible"
    }
}

// ------------------------------------------------------------------
// REALIZACIÓN 2: OLLAMA
// ------------------------------------------------------------------

pub struct OllamaProvider;

#[async_trait]
impl ChatProvider for OllamaProvider {
    #[instrument(skip_all, fields(model = %model))]
    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
        endpoint: &str,
        _credential: Option<&str>,
        model: &str,
    ) -> Result<ChatOutcome, CortexError> {
        let call_start = Instant::now();

        let mut body = json!({
            "model": model,
            "messages": messages,
            "stream": false,
            "options": {
                "temperature": options.temperature,
                "num_predict": options.max_tokens,
                "num_ctx": options.context_tokens,
            },
            "keep_alive": "5m",
        });
        if options.force_json {
            body["format"] = json!("json");
        }

        let request = http_client(options.timeout_secs)?
            .post(format!("{}/api/chat", endpoint.trim_end_matches('/')))
            .json(&body);

        // DOBLE PLAZO: el timeout de reqwest aborta la conexión, pero
        // Ollama puede ignorar el abort en generaciones largas; la
        // carrera de reloj de pared garantiza el retorno del worker.
        let wall_clock_budget = Duration::from_secs(options.timeout_secs + WALL_CLOCK_GRACE_SECS);
        let response = match timeout(wall_clock_budget, request.send()).await {
            Err(_) => return Err(CortexError::Timeout(options.timeout_secs + WALL_CLOCK_GRACE_SECS)),
            Ok(transport_outcome) => transport_outcome?,
        };

        let raw = match timeout(wall_clock_budget, read_checked_body(response)).await {
            Err(_) => return Err(CortexError::Timeout(options.timeout_secs + WALL_CLOCK_GRACE_SECS)),
            Ok(body_outcome) => body_outcome?,
        };

        let content = raw["message"]["content"].as_str().unwrap_or_default().to_string();

        debug!("🧠 [CORTEX]: ollama completion in {}ms", call_start.elapsed().as_millis());

        Ok(ChatOutcome {
            content: non_empty(content)?,
            model: raw["model"].as_str().unwrap_or(model).to_string(),
            provider: self.name().to_string(),
            usage: raw.get("eval_count").map(|count| json!({ "eval_count": count })),
            duration_ms: call_start.elapsed().as_millis() as u64,
            raw,
        })
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}

// ------------------------------------------------------------------
// REALIZACIÓN 3: ANTHROPIC
// ------------------------------------------------------------------

pub struct AnthropicProvider;

#[async_trait]
impl ChatProvider for AnthropicProvider {
    #[instrument(skip_all, fields(model = %model))]
    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
        endpoint: &str,
        credential: Option<&str>,
        model: &str,
    ) -> Result<ChatOutcome, CortexError> {
        let call_start = Instant::now();

        let api_key = credential.ok_or(CortexError::MissingCredential)?;

        // El campo system viaja aparte; el resto conserva su rol.
        let system_prompt: String = messages
            .iter()
            .filter(|message| message.role == "system")
            .map(|message| message.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let conversation: Vec<&ChatMessage> = messages
            .iter()
            .filter(|message| message.role != "system")
            .collect();

        let mut body = json!({
            "model": model,
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
            "messages": conversation,
        });
        if !system_prompt.is_empty() {
            body["system"] = json!(system_prompt);
        }

        let raw = read_checked_body(
            http_client(options.timeout_secs)?
                .post(format!("{}/v1/messages", endpoint.trim_end_matches('/')))
                .header("x-api-key", api_key)
                .header("anthropic-version", "2023-06-01")
                .json(&body)
                .send()
                .await?,
        )
        .await?;

        let content = raw["content"][0]["text"].as_str().unwrap_or_default().to_string();

        debug!("🧠 [CORTEX]: anthropic completion in {}ms", call_start.elapsed().as_millis());

        Ok(ChatOutcome {
            content: non_empty(content)?,
            model: raw["model"].as_str().unwrap_or(model).to_string(),
            provider: self.name().to_string(),
            usage: raw.get("usage").cloned(),
            duration_ms: call_start.elapsed().as_millis() as u64,
            raw,
        })
    }

    fn name(&self) -> &'static str {
        "anthropic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certify_provider_resolution() {
        assert_eq!(provider_for(LlmProviderKind::OpenaiCompatible).name(), "openai_compatible");
        assert_eq!(provider_for(LlmProviderKind::Ollama).name(), "ollama");
        assert_eq!(provider_for(LlmProviderKind::Anthropic).name(), "anthropic");
    }

    #[test]
    fn certify_message_constructors() {
        let system_message = ChatMessage::system("be terse");
        assert_eq!(system_message.role, "system");

        let user_message = ChatMessage::user("hello");
        assert_eq!(user_message.role, "user");
    }

    #[test]
    fn certify_default_sampling_envelope() {
        let options = ChatOptions::default();
        assert_eq!(options.timeout_secs, 300);
        assert!(!options.force_json);
    }
}
