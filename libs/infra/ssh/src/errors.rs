// [libs/infra/ssh/src/errors.rs]
/*!
 * =================================================================
 * APARATO: REMOTE EXECUTOR ERROR CATALOG (V4.3 - TAXONOMY SEALED)
 * CLASIFICACIÓN: INFRASTRUCTURE CORE (ESTRATO L3)
 * RESPONSABILIDAD: CATALOGACIÓN SEMÁNTICA DE FALLOS SSH CON REINTENTO
 *
 * Cada variante declara su retriabilidad. El bucle de reintentos del
 * ejecutor consulta exclusivamente 'is_retriable'; ningún otro estrato
 * decide por cadena de texto.
 * =================================================================
 */

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SshError {
    /// Credenciales rechazadas por el host. Nunca se reintenta: un
    /// segundo intento solo alimenta contadores de fail2ban.
    #[error("[L3_SSH_AUTH_FAULT]: AUTHENTICATION_REJECTED by remote host")]
    AuthFailed,

    #[error("[L3_SSH_DNS_FAULT]: NAME_RESOLUTION_COLLAPSE -> {0}")]
    DnsResolution(String),

    #[error("[L3_SSH_NET_FAULT]: CONNECTION_REFUSED -> {0}")]
    ConnectionRefused(String),

    #[error("[L3_SSH_NET_FAULT]: CONNECTION_TIMEOUT after {0} seconds")]
    ConnectionTimeout(u64),

    #[error("[L3_SSH_NET_FAULT]: HOST_UNREACHABLE -> {0}")]
    HostUnreachable(String),

    /// El plazo global de la llamada venció con el script en vuelo.
    #[error("[L3_SSH_EXEC_FAULT]: SCRIPT_DEADLINE_EXCEEDED after {0} seconds")]
    ScriptTimeout(u64),

    /// Salida no-cero del programa remoto. Retriable solo para los
    /// códigos de timeout/kill del coreutils timeout (124, 137).
    #[error("[L3_SSH_EXEC_FAULT]: SCRIPT_EXIT_{exit_code} -> {stderr_excerpt}")]
    ScriptExit { exit_code: u32, stderr_excerpt: String },

    /// El stdout remoto no contiene el documento exterior bien formado.
    #[error("[L3_SSH_PARSE_FAULT]: DOCUMENT_MALFORMED -> {0}")]
    ParseError(String),

    #[error("[L3_SSH_CAPACITY_FAULT]: OUTPUT_TOO_LARGE -> stdout exceeded {0} bytes")]
    OutputTooLarge(usize),

    /// Material de llave privada indescifrable o corrupto.
    #[error("[L3_SSH_KEY_FAULT]: PRIVATE_KEY_REJECTED -> {0}")]
    KeyMaterial(String),

    /// Fallo de protocolo o transporte sin clasificación específica.
    #[error("[L3_SSH_PROTOCOL_FAULT]: UNCLASSIFIED_TRANSPORT_FAULT -> {0}")]
    Unknown(String),
}

impl SshError {
    /// Política de reintento por clase de fallo.
    pub fn is_retriable(&self) -> bool {
        match self {
            SshError::AuthFailed => false,
            SshError::DnsResolution(_) => false,
            SshError::ConnectionRefused(_) => true,
            SshError::ConnectionTimeout(_) => true,
            SshError::HostUnreachable(_) => true,
            SshError::ScriptTimeout(_) => true,
            SshError::ScriptExit { exit_code, .. } => matches!(exit_code, 124 | 137),
            SshError::ParseError(_) => false,
            SshError::OutputTooLarge(_) => false,
            SshError::KeyMaterial(_) => false,
            SshError::Unknown(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certify_retry_taxonomy() {
        assert!(!SshError::AuthFailed.is_retriable());
        assert!(!SshError::DnsResolution("nx".into()).is_retriable());
        assert!(SshError::ConnectionRefused("rst".into()).is_retriable());
        assert!(SshError::ConnectionTimeout(15).is_retriable());
        assert!(SshError::HostUnreachable("no route".into()).is_retriable());
        assert!(SshError::ScriptTimeout(180).is_retriable());
        assert!(!SshError::ParseError("garbage".into()).is_retriable());
        assert!(!SshError::OutputTooLarge(10_485_760).is_retriable());
        assert!(SshError::Unknown("banner".into()).is_retriable());
    }

    /**
     * Solo los códigos del coreutils timeout habilitan reintento de
     * salida no-cero.
     */
    #[test]
    fn certify_exit_code_retry_whitelist() {
        for (exit_code, expected) in [(124, true), (137, true), (1, false), (2, false), (255, false)] {
            let fault = SshError::ScriptExit { exit_code, stderr_excerpt: String::new() };
            assert_eq!(fault.is_retriable(), expected, "exit {}", exit_code);
        }
    }
}
