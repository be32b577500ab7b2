// [libs/domain/models/src/host.rs]
/*!
 * =================================================================
 * APARATO: HOST DOMAIN CONTRACT (V4.2 - LIFECYCLE SEALED)
 * CLASIFICACIÓN: DOMAIN MODELS (ESTRATO L2)
 * RESPONSABILIDAD: CICLO DE VIDA DEL SERVIDOR INVENTARIADO
 *
 * # Mathematical Proof (Status Ownership):
 * El campo 'status' pertenece en exclusiva al runtime de jobs y al
 * mapeador: 'scanning' bloquea el re-encolado y las transiciones
 * terminales ('online'/'error') solo ocurren al cierre del pipeline.
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Estados legales del ciclo de vida de un host inventariado.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostStatus {
    /// Detectado por un descubrimiento de red, sin credenciales todavía.
    Discovered,
    /// Credenciales registradas, aún sin primer escaneo.
    Configured,
    /// Un worker mantiene el escaneo profundo en vuelo.
    Scanning,
    Online,
    Offline,
    Error,
}

impl HostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostStatus::Discovered => "discovered",
            HostStatus::Configured => "configured",
            HostStatus::Scanning => "scanning",
            HostStatus::Online => "online",
            HostStatus::Offline => "offline",
            HostStatus::Error => "error",
        }
    }

    pub fn parse(label: &str) -> HostStatus {
        match label {
            "configured" => HostStatus::Configured,
            "scanning" => HostStatus::Scanning,
            "online" => HostStatus::Online,
            "offline" => HostStatus::Offline,
            "error" => HostStatus::Error,
            _ => HostStatus::Discovered,
        }
    }
}

/// Mecanismo de autenticación configurado para la sesión SSH.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SshAuthMethod {
    Password,
    PrivateKey,
}

/// Registro maestro del servidor. Único por IP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub id: String,
    pub ip: String,
    pub hostname: Option<String>,
    pub os_info: Option<String>,
    pub kernel_info: Option<String>,
    pub cpu_info: Option<String>,
    pub memory_mb: Option<i64>,

    // --- MATERIAL DE ACCESO (siempre sobre cifrado, nunca texto plano) ---
    pub ssh_port: u16,
    pub ssh_user: Option<String>,
    pub auth_method: SshAuthMethod,
    /// Sobre {nonce, auth_tag, body} serializado de la contraseña.
    pub encrypted_password: Option<String>,
    /// Sobre {nonce, auth_tag, body} serializado de la llave privada PEM.
    pub encrypted_private_key: Option<String>,
    /// Autoriza el envoltorio 'sudo -n' del catálogo de descubrimiento.
    pub allow_sudo: bool,

    // --- PLANIFICACIÓN Y CICLO DE VIDA ---
    /// Expresión cron de escaneo periódico; None desactiva la programación.
    pub scan_schedule: Option<String>,
    pub status: HostStatus,
    pub last_scan_at: Option<DateTime<Utc>>,
    pub last_scan_error: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,

    // --- CAMPOS DERIVADOS POR IA ---
    pub ai_purpose: Option<String>,
    pub ai_tags: Option<String>,
    pub ai_summary: Option<String>,
}

/// Credenciales ya descifradas, de vida corta: existen solo dentro del
/// worker que ejecuta el job y nunca se persisten.
#[derive(Clone)]
pub struct DecryptedCredentials {
    pub host_address: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub private_key_pem: Option<String>,
}

impl std::fmt::Debug for DecryptedCredentials {
    // El material sensible jamás entra al rastro de tracing.
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("DecryptedCredentials")
            .field("host_address", &self.host_address)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("private_key_pem", &self.private_key_pem.as_ref().map(|_| "***"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certify_status_round_trip() {
        for status in [
            HostStatus::Discovered,
            HostStatus::Configured,
            HostStatus::Scanning,
            HostStatus::Online,
            HostStatus::Offline,
            HostStatus::Error,
        ] {
            assert_eq!(HostStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn certify_debug_redacts_secrets() {
        let credentials = DecryptedCredentials {
            host_address: "10.0.0.5".into(),
            port: 22,
            username: "root".into(),
            password: Some("hunter2".into()),
            private_key_pem: None,
        };

        let rendered = format!("{:?}", credentials);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("***"));
    }
}
