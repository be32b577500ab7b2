// INICIO DEL ARCHIVO [libs/core/document/src/lib.rs]
/*!
 * =================================================================
 * APARATO: DYNAMIC DOCUMENT CORE (V2.3 - CANONICAL SEALED)
 * CLASIFICACIÓN: CORE UTILITY (ESTRATO L1)
 * RESPONSABILIDAD: PROYECCIONES TIPADAS Y CHECKSUMS DETERMINISTAS
 *
 * VISION HIPER-HOLÍSTICA:
 * El documento de recolección llega como árbol no tipado. Este núcleo
 * ofrece las proyecciones seguras (expect_object, safe_int, safe_float,
 * truncate) que usan el mapeador y el correlador, junto con la
 * serialización canónica (llaves ordenadas) y el checksum SHA-256 que
 * sella los snapshots. Dos documentos equivalentes producen el mismo
 * checksum sin importar el orden de inserción de sus llaves.
 * =================================================================
 */

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocumentError {
    /// El stdout remoto no contiene un documento `{…}` bien formado.
    #[error("[L1_DOCUMENT_FAULT]: OUTER_JSON_ABSENT -> no top-level object delimiters found")]
    OuterJsonAbsent,

    #[error("[L1_DOCUMENT_FAULT]: JSON_MALFORMED -> {0}")]
    Malformed(#[from] serde_json::Error),
}

// ------------------------------------------------------------------
// PROYECCIONES TIPADAS
// ------------------------------------------------------------------

/// Proyecta una sección como objeto; secciones ausentes o de otra forma
/// colapsan a objeto vacío (el recolector garantiza forma-o-ausencia).
pub fn expect_object(value: Option<&Value>) -> Map<String, Value> {
    value
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

/// Proyecta una sección como arreglo; ausencia o forma ajena colapsa a vacío.
pub fn expect_array(value: Option<&Value>) -> Vec<Value> {
    value
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Coerción numérica tolerante: número nativo, cadena numérica o fallback.
pub fn safe_int(value: Option<&Value>, fallback: i64) -> i64 {
    match value {
        Some(Value::Number(number)) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|float| float as i64))
            .unwrap_or(fallback),
        Some(Value::String(text)) => text.trim().parse::<i64>()
            .or_else(|_| text.trim().parse::<f64>().map(|float| float as i64))
            .unwrap_or(fallback),
        _ => fallback,
    }
}

/// Coerción flotante tolerante con el mismo contrato que `safe_int`.
pub fn safe_float(value: Option<&Value>, fallback: f64) -> f64 {
    match value {
        Some(Value::Number(number)) => number.as_f64().unwrap_or(fallback),
        Some(Value::String(text)) => text.trim().parse::<f64>().unwrap_or(fallback),
        _ => fallback,
    }
}

/// Proyección de cadena; números se serializan, otras formas colapsan a vacío.
pub fn safe_str(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number.to_string(),
        Some(Value::Bool(flag)) => flag.to_string(),
        _ => String::new(),
    }
}

/// Proyección booleana tolerante ("true"/"yes"/1 cuentan como verdadero).
pub fn safe_bool(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(number)) => number.as_i64().unwrap_or(0) != 0,
        Some(Value::String(text)) => {
            matches!(text.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1")
        }
        _ => false,
    }
}

/// Trunca a un límite declarado respetando fronteras UTF-8.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}

// ------------------------------------------------------------------
// EXTRACCIÓN DEL DOCUMENTO EXTERIOR
// ------------------------------------------------------------------

/**
 * Extrae el documento de nivel superior delimitado por el `{…}` más externo.
 *
 * El stdout remoto puede traer ruido antes y después (banners de shell,
 * advertencias de PAM); todo lo externo a los delimitadores se tolera.
 *
 * # Errors:
 * - `DocumentError::OuterJsonAbsent` sin delimitadores balanceados.
 * - `DocumentError::Malformed` si el interior no parsea.
 */
pub fn extract_outer_json(raw_stdout: &str) -> Result<Value, DocumentError> {
    let opening_index = raw_stdout.find('{').ok_or(DocumentError::OuterJsonAbsent)?;
    let closing_index = raw_stdout.rfind('}').ok_or(DocumentError::OuterJsonAbsent)?;

    if closing_index <= opening_index {
        return Err(DocumentError::OuterJsonAbsent);
    }

    let candidate_slice = &raw_stdout[opening_index..=closing_index];
    Ok(serde_json::from_str(candidate_slice)?)
}

// ------------------------------------------------------------------
// SERIALIZACIÓN CANÓNICA Y CHECKSUM
// ------------------------------------------------------------------

/**
 * Serializa con llaves de objeto ordenadas lexicográficamente en todos
 * los niveles. Base determinista del checksum de snapshots.
 */
pub fn canonical_json(value: &Value) -> String {
    fn canonicalize(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut sorted_keys: Vec<&String> = map.keys().collect();
                sorted_keys.sort();

                let mut ordered = Map::new();
                for key in sorted_keys {
                    ordered.insert(key.clone(), canonicalize(&map[key]));
                }
                Value::Object(ordered)
            }
            Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
            other => other.clone(),
        }
    }

    // serde_json preserva el orden de inserción del Map reconstruido.
    serde_json::to_string(&canonicalize(value)).unwrap_or_default()
}

/// SHA-256 hexadecimal sobre la forma canónica del valor.
pub fn checksum(value: &Value) -> String {
    let canonical_material = canonical_json(value);
    let digest = Sha256::digest(canonical_material.as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn certify_outer_extraction_tolerates_noise() {
        let raw = "Warning: locale not set\n{\"os\":{\"hostname\":\"h1\"}}\nConnection closed.";
        let document = extract_outer_json(raw).expect("extraction must succeed");
        assert_eq!(document["os"]["hostname"], "h1");
    }

    #[test]
    fn certify_outer_extraction_rejects_empty_stream() {
        assert!(matches!(
            extract_outer_json("no json here"),
            Err(DocumentError::OuterJsonAbsent)
        ));
    }

    /**
     * Dos documentos equivalentes con distinto orden de llaves deben
     * sellar con el mismo checksum.
     */
    #[test]
    fn certify_checksum_key_order_independence() {
        let first: Value = serde_json::from_str(r#"{"b":1,"a":{"y":2,"x":3}}"#).unwrap();
        let second: Value = serde_json::from_str(r#"{"a":{"x":3,"y":2},"b":1}"#).unwrap();

        assert_eq!(checksum(&first), checksum(&second));
    }

    #[test]
    fn certify_checksum_detects_content_drift() {
        let first = json!({"services": [{"name": "sshd", "port": 22}]});
        let second = json!({"services": [{"name": "sshd", "port": 2222}]});

        assert_ne!(checksum(&first), checksum(&second));
    }

    #[test]
    fn certify_safe_coercions() {
        assert_eq!(safe_int(Some(&json!("42")), 0), 42);
        assert_eq!(safe_int(Some(&json!(7.9)), 0), 7);
        assert_eq!(safe_int(Some(&json!("not_a_number")), -1), -1);
        assert_eq!(safe_int(None, 5), 5);

        assert!((safe_float(Some(&json!("87.5")), 0.0) - 87.5).abs() < f64::EPSILON);
        assert_eq!(safe_str(Some(&json!(8080))), "8080");
        assert!(safe_bool(Some(&json!("Yes"))));
        assert!(!safe_bool(Some(&json!("no"))));
    }

    #[test]
    fn certify_truncation_respects_utf8() {
        assert_eq!(truncate("abcdef", 3), "abc");
        assert_eq!(truncate("añejo", 2), "añ");
        assert_eq!(truncate("short", 64), "short");
    }

    #[test]
    fn certify_array_projection_collapses_malformed_sections() {
        let document = json!({"mounts": "collector_failed"});
        assert!(expect_array(document.get("mounts")).is_empty());
        assert!(expect_object(document.get("absent_section")).is_empty());
    }
}
// FIN DEL ARCHIVO [libs/core/document/src/lib.rs]
