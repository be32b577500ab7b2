// [libs/domain/ai-cortex/src/json_extract.rs]
/*!
 * =================================================================
 * APARATO: JSON EXTRACTION FSM (V5.2 - ONE RETRY SEALED)
 * CLASIFICACIÓN: DOMAIN ENGINE (ESTRATO L2)
 * RESPONSABILIDAD: RECUPERACIÓN DE JSON DESDE COMPLETIONS RUIDOSAS
 *
 * Estrategias en orden: parseo directo, bloque cercado, primera
 * corrida balanceada `{…}` o `[…]`. Ante fallo total, UNA ronda de
 * re-prompt "return JSON only"; el segundo fallo aflora como error de
 * programación. Máquina de estados finita, jamás recursión abierta.
 * =================================================================
 */

use serde_json::Value;
use tracing::warn;

use crate::errors::CortexError;
use crate::providers::{ChatMessage, ChatOptions, ChatOutcome, ChatProvider};

/**
 * Extrae el primer valor JSON recuperable del texto de la completion.
 */
pub fn extract_json(content: &str) -> Option<Value> {
    let trimmed = content.trim();

    // ESTRATEGIA 1: parseo directo.
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    // ESTRATEGIA 2: bloque cercado ```json … ``` (o cerca anónima).
    if let Some(fenced_body) = extract_fenced_block(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(fenced_body.trim()) {
            return Some(value);
        }
    }

    // ESTRATEGIA 3: primera corrida balanceada de objeto o arreglo.
    if let Some(balanced_run) = extract_balanced_run(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(&balanced_run) {
            return Some(value);
        }
    }

    None
}

fn extract_fenced_block(content: &str) -> Option<&str> {
    let fence_open = content.find("```")?;
    let after_fence = &content[fence_open + 3..];

    // Descarta la etiqueta de lenguaje ("json", "JSON", vacía).
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let fence_close = body.find("```")?;

    Some(&body[..fence_close])
}

/// Corrida balanceada consciente de cadenas (comillas y escapes).
fn extract_balanced_run(content: &str) -> Option<String> {
    let opening_index = content.find(|c| c == '{' || c == '[')?;
    let bytes: Vec<char> = content[opening_index..].chars().collect();

    let opening_char = bytes[0];
    let closing_char = if opening_char == '{' { '}' } else { ']' };

    let mut depth = 0i32;
    let mut inside_string = false;
    let mut escaped = false;

    for (position, character) in bytes.iter().enumerate() {
        if inside_string {
            if escaped {
                escaped = false;
            } else if *character == '\\' {
                escaped = true;
            } else if *character == '"' {
                inside_string = false;
            }
            continue;
        }

        match character {
            '"' => inside_string = true,
            c if *c == opening_char => depth += 1,
            c if *c == closing_char => {
                depth -= 1;
                if depth == 0 {
                    return Some(bytes[..=position].iter().collect());
                }
            }
            _ => {}
        }
    }

    None
}

/**
 * Invoca el chat esperando JSON; ante completion imparseable ejecuta
 * exactamente una ronda de re-prompt explícito.
 *
 * # Errors:
 * `CortexError::UnparseableResponse` cuando ambas rondas fallan.
 */
pub async fn chat_expecting_json(
    provider: &dyn ChatProvider,
    messages: &[ChatMessage],
    options: &ChatOptions,
    endpoint: &str,
    credential: Option<&str>,
    model: &str,
) -> Result<(Value, ChatOutcome), CortexError> {
    let mut json_options = options.clone();
    json_options.force_json = true;

    let first_outcome = provider
        .chat(messages, &json_options, endpoint, credential, model)
        .await?;

    if let Some(value) = extract_json(&first_outcome.content) {
        return Ok((value, first_outcome));
    }

    warn!("🧠 [CORTEX_REPROMPT]: First completion was not parseable JSON; issuing the single retry.");

    // RONDA ÚNICA DE RE-PROMPT: la conversación previa más la orden
    // explícita; sin recursión, sin tercera oportunidad.
    let mut retry_conversation = messages.to_vec();
    retry_conversation.push(ChatMessage {
        role: "assistant".into(),
        content: first_outcome.content.clone(),
    });
    retry_conversation.push(ChatMessage::user(
        "Your previous reply was not valid JSON. Return ONLY the JSON document, \
         with no prose, no markdown fences and no commentary.",
    ));

    let second_outcome = provider
        .chat(&retry_conversation, &json_options, endpoint, credential, model)
        .await?;

    match extract_json(&second_outcome.content) {
        Some(value) => Ok((value, second_outcome)),
        None => Err(CortexError::UnparseableResponse(
            second_outcome.content.chars().take(300).collect(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn certify_direct_parse() {
        let value = extract_json(r#"{"risk": "low"}"#).unwrap();
        assert_eq!(value["risk"], "low");
    }

    #[test]
    fn certify_fenced_block_extraction() {
        let completion = "Here is the analysis:\n```json\n{\"risk\": \"high\", \"findings\": []}\n```\nHope it helps!";
        let value = extract_json(completion).unwrap();
        assert_eq!(value["risk"], "high");
    }

    #[test]
    fn certify_balanced_run_extraction() {
        let completion = "The summary follows {\"purpose\": \"database host\", \"tags\": [\"db\"]} as requested.";
        let value = extract_json(completion).unwrap();
        assert_eq!(value["purpose"], "database host");
    }

    #[test]
    fn certify_array_run_extraction() {
        let completion = "items: [1, 2, {\"x\": \"}\"}] trailing";
        let value = extract_json(completion).unwrap();
        assert_eq!(value, json!([1, 2, {"x": "}"}]));
    }

    /// Llaves dentro de cadenas no deben romper el balanceo.
    #[test]
    fn certify_string_aware_balancing() {
        let completion = r#"prefix {"note": "a { b } c", "n": 1} suffix"#;
        let value = extract_json(completion).unwrap();
        assert_eq!(value["n"], 1);
    }

    #[test]
    fn certify_hopeless_content_yields_none() {
        assert!(extract_json("no structured data at all").is_none());
        assert!(extract_json("{broken json").is_none());
    }
}
