// [libs/domain/ai-cortex/src/errors.rs]
/*!
 * =================================================================
 * APARATO: CORTEX ERROR CATALOG (V5.1)
 * CLASIFICACIÓN: DOMAIN CORE (ESTRATO L2)
 * RESPONSABILIDAD: CATALOGACIÓN SEMÁNTICA DE FALLOS DE INFERENCIA
 *
 * Las compuertas de política (deshabilitado, candado ocupado) y los
 * fallos de programación (JSON imparseable tras el reintento) jamás
 * se reintentan; solo la infraestructura transitoria (red, 5xx,
 * timeout) habilita una segunda oportunidad.
 * =================================================================
 */

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CortexError {
    /// La característica LLM está apagada en la configuración.
    #[error("[L2_CORTEX_GATE]: FEATURE_DISABLED")]
    FeatureDisabled,

    /// Otro worker mantiene el candado de escritor único.
    #[error("[L2_CORTEX_GATE]: INFERENCE_LOCK_BUSY -> held for host {holder}")]
    LockBusy { holder: String },

    #[error("[L2_CORTEX_GATE]: CREDENTIAL_ABSENT for external provider")]
    MissingCredential,

    #[error("[L2_CORTEX_NET_FAULT]: TRANSPORT_COLLAPSE -> {0}")]
    Network(#[from] reqwest::Error),

    #[error("[L2_CORTEX_NET_FAULT]: UPSTREAM_STATUS_{status} -> {body_excerpt}")]
    UpstreamStatus { status: u16, body_excerpt: String },

    /// Venció la carrera de doble plazo (abort + reloj de pared).
    #[error("[L2_CORTEX_NET_FAULT]: INFERENCE_DEADLINE_EXCEEDED after {0}s")]
    Timeout(u64),

    #[error("[L2_CORTEX_FAULT]: EMPTY_COMPLETION from provider")]
    EmptyCompletion,

    /// Fallo del almacén de configuración/candado (hipo de la base).
    #[error("[L2_CORTEX_FAULT]: SETTINGS_STORE_FAULT -> {0}")]
    Storage(String),

    /// JSON irrecuperable tras la ronda de re-prompt.
    #[error("[L2_CORTEX_FAULT]: UNPARSEABLE_RESPONSE -> {0}")]
    UnparseableResponse(String),
}

impl CortexError {
    /// Solo infraestructura transitoria habilita reintento.
    pub fn is_retriable(&self) -> bool {
        match self {
            CortexError::Network(_) | CortexError::Timeout(_) | CortexError::Storage(_) => true,
            CortexError::UpstreamStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certify_retry_policy() {
        assert!(CortexError::Timeout(300).is_retriable());
        assert!(CortexError::UpstreamStatus { status: 503, body_excerpt: String::new() }.is_retriable());
        assert!(!CortexError::UpstreamStatus { status: 401, body_excerpt: String::new() }.is_retriable());
        assert!(!CortexError::FeatureDisabled.is_retriable());
        assert!(!CortexError::LockBusy { holder: "h1".into() }.is_retriable());
        assert!(!CortexError::UnparseableResponse("x".into()).is_retriable());
    }
}
