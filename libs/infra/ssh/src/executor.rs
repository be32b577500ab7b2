// [libs/infra/ssh/src/executor.rs]
/*!
 * =================================================================
 * APARATO: SOVEREIGN REMOTE EXECUTOR (V4.5 - BOUNDED CAPTURE)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: SESIONES SSH, SUBIDA HEREDOC Y EJECUCIÓN ACOTADA
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. ONE SESSION PER CALL: cada invocación abre y cierra su propia
 *    sesión; keepalive cada 15 s con máximo 3 pulsos perdidos.
 * 2. ZERO RESIDUE: el script viaja por heredoc a
 *    /tmp/.systemmap_gather.sh, se ejecuta y se borra en la misma
 *    orden compuesta; ningún resto sobrevive a la salida normal.
 * 3. BOUNDED CAPTURE: stdout tope duro de 10 MB (excedente descartado
 *    y reportado), stderr tope de 100 KB.
 * 4. CLASSIFIED RETRY: backoff exponencial 3s * 2^(n-1) únicamente
 *    para fallos retriables; el aborto ante fallo permanente es
 *    inmediato (a lo sumo una conexión ante auth rechazada).
 * =================================================================
 */

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use russh::client::{self, KeyboardInteractiveAuthResponse};
use russh::{ChannelMsg, Disconnect};
use russh_keys::key;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, instrument, warn};

use sysmap_core_document::extract_outer_json;
use sysmap_domain_models::host::DecryptedCredentials;

use crate::errors::SshError;

/// Tope duro del buffer de stdout remoto (10 MB).
pub const STDOUT_HARD_CAP_BYTES: usize = 10 * 1024 * 1024;
/// Tope del buffer de stderr remoto (100 KB).
pub const STDERR_CAP_BYTES: usize = 100 * 1024;
/// Marcador heredoc; improbable en cualquier script generado.
const HEREDOC_MARKER: &str = "SYSTEMMAP_EOF_7C9A";
/// Ruta remota del programa de recolección.
const REMOTE_SCRIPT_PATH: &str = "/tmp/.systemmap_gather.sh";

/// Parámetros de una llamada al ejecutor.
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Plazo global de la llamada completa.
    pub deadline_secs: u64,
    /// Reintentos adicionales tras el primer intento.
    pub extra_retries: u32,
    /// Plazo de establecimiento de sesión.
    pub ready_timeout_secs: u64,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self { deadline_secs: 180, extra_retries: 2, ready_timeout_secs: 15 }
    }
}

/// Veredicto de la sonda de salud no-scriptada.
#[derive(Debug, Clone)]
pub struct HealthProbe {
    pub reachable: bool,
    pub latency_ms: u64,
    pub os_banner: Option<String>,
}

/// Salida capturada de una orden remota.
struct CapturedOutput {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    stdout_overflowed: bool,
    exit_code: Option<u32>,
}

struct ClientHandler;

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = russh::Error;

    // El inventario opera sobre hosts ya registrados por el operador;
    // la verificación de huella queda en la capa de registro.
    async fn check_server_key(
        &mut self,
        _server_public_key: &key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

pub struct SshExecutor;

impl SshExecutor {
    /**
     * Sube el script por heredoc, lo ejecuta y recupera el documento
     * JSON exterior del stdout.
     *
     * # Errors:
     * Toda la taxonomía de `SshError`; los fallos retriables consumen
     * el presupuesto de reintentos con backoff exponencial.
     */
    #[instrument(skip_all, fields(host = %credentials.host_address))]
    pub async fn run_script(
        credentials: &DecryptedCredentials,
        script_body: &str,
        options: &ExecOptions,
    ) -> Result<serde_json::Value, SshError> {
        let composite_command = Self::compose_heredoc_command(script_body);

        let captured = Self::execute_with_retry(credentials, &composite_command, options).await?;

        if captured.stdout_overflowed {
            warn!(
                "📦 [SSH_CAPACITY]: Remote stdout exceeded {} bytes; truncated capture.",
                STDOUT_HARD_CAP_BYTES
            );
            return Err(SshError::OutputTooLarge(STDOUT_HARD_CAP_BYTES));
        }

        let stdout_text = String::from_utf8_lossy(&captured.stdout);
        extract_outer_json(&stdout_text)
            .map_err(|document_fault| SshError::ParseError(document_fault.to_string()))
    }

    /**
     * Ejecuta una orden simple y devuelve su stdout como texto.
     */
    #[instrument(skip_all, fields(host = %credentials.host_address))]
    pub async fn run_command(
        credentials: &DecryptedCredentials,
        command: &str,
        options: &ExecOptions,
    ) -> Result<String, SshError> {
        let captured = Self::execute_with_retry(credentials, command, options).await?;

        if captured.stdout_overflowed {
            return Err(SshError::OutputTooLarge(STDOUT_HARD_CAP_BYTES));
        }

        Ok(String::from_utf8_lossy(&captured.stdout).into_owned())
    }

    /**
     * Sonda de salud no-scriptada: una sesión, `uname -a && hostname`.
     * Nunca reintenta; la latencia cubre sesión + orden.
     */
    #[instrument(skip_all, fields(host = %credentials.host_address))]
    pub async fn health_check(credentials: &DecryptedCredentials) -> HealthProbe {
        let probe_start = Instant::now();
        let options = ExecOptions { deadline_secs: 30, extra_retries: 0, ready_timeout_secs: 15 };

        match Self::execute_once(credentials, "uname -a && hostname", &options).await {
            Ok(captured) if captured.exit_code == Some(0) => HealthProbe {
                reachable: true,
                latency_ms: probe_start.elapsed().as_millis() as u64,
                os_banner: Some(
                    String::from_utf8_lossy(&captured.stdout).trim().to_string(),
                ),
            },
            Ok(_) | Err(_) => HealthProbe {
                reachable: false,
                latency_ms: probe_start.elapsed().as_millis() as u64,
                os_banner: None,
            },
        }
    }

    // --------------------------------------------------------------
    // NÚCLEO DE EJECUCIÓN
    // --------------------------------------------------------------

    fn compose_heredoc_command(script_body: &str) -> String {
        format!(
            "cat > {path} <<'{marker}'\n{body}\n{marker}\nchmod 700 {path}\nbash {path}\nSCRIPT_STATUS=$?\nrm -f {path}\nexit $SCRIPT_STATUS\n",
            path = REMOTE_SCRIPT_PATH,
            marker = HEREDOC_MARKER,
            body = script_body,
        )
    }

    async fn execute_with_retry(
        credentials: &DecryptedCredentials,
        command: &str,
        options: &ExecOptions,
    ) -> Result<CapturedOutput, SshError> {
        let total_attempts = options.extra_retries + 1;

        for attempt_number in 1..=total_attempts {
            match Self::execute_once(credentials, command, options).await {
                Ok(captured) => {
                    match captured.exit_code {
                        Some(0) | None => return Ok(captured),
                        Some(exit_code) => {
                            let fault = SshError::ScriptExit {
                                exit_code,
                                stderr_excerpt: String::from_utf8_lossy(&captured.stderr)
                                    .chars()
                                    .take(500)
                                    .collect(),
                            };
                            if !fault.is_retriable() || attempt_number == total_attempts {
                                return Err(fault);
                            }
                            Self::backoff_pause(attempt_number, &fault).await;
                        }
                    }
                }
                Err(fault) => {
                    if !fault.is_retriable() || attempt_number == total_attempts {
                        return Err(fault);
                    }
                    Self::backoff_pause(attempt_number, &fault).await;
                }
            }
        }

        unreachable!("retry loop always returns within the attempt budget")
    }

    async fn backoff_pause(attempt_number: u32, fault: &SshError) {
        let pause_secs = 3u64.saturating_mul(1u64 << (attempt_number - 1));
        warn!(
            "🔁 [SSH_RETRY]: Attempt {} collapsed ({}). Pausing {}s before retry.",
            attempt_number, fault, pause_secs
        );
        sleep(Duration::from_secs(pause_secs)).await;
    }

    async fn execute_once(
        credentials: &DecryptedCredentials,
        command: &str,
        options: &ExecOptions,
    ) -> Result<CapturedOutput, SshError> {
        let execution = Self::open_and_execute(credentials, command, options);

        match timeout(Duration::from_secs(options.deadline_secs), execution).await {
            Ok(outcome) => outcome,
            Err(_) => Err(SshError::ScriptTimeout(options.deadline_secs)),
        }
    }

    async fn open_and_execute(
        credentials: &DecryptedCredentials,
        command: &str,
        options: &ExecOptions,
    ) -> Result<CapturedOutput, SshError> {
        let session_handle = Self::open_session(credentials, options).await?;

        let mut channel = session_handle
            .channel_open_session()
            .await
            .map_err(|protocol_fault| SshError::Unknown(protocol_fault.to_string()))?;

        channel
            .exec(true, command)
            .await
            .map_err(|protocol_fault| SshError::Unknown(protocol_fault.to_string()))?;

        let mut stdout_buffer: Vec<u8> = Vec::with_capacity(64 * 1024);
        let mut stderr_buffer: Vec<u8> = Vec::new();
        let mut stdout_overflowed = false;
        let mut exit_code: Option<u32> = None;

        while let Some(channel_message) = channel.wait().await {
            match channel_message {
                ChannelMsg::Data { ref data } => {
                    let remaining_capacity =
                        STDOUT_HARD_CAP_BYTES.saturating_sub(stdout_buffer.len());
                    if data.len() > remaining_capacity {
                        stdout_buffer.extend_from_slice(&data[..remaining_capacity]);
                        stdout_overflowed = true;
                    } else {
                        stdout_buffer.extend_from_slice(data);
                    }
                }
                ChannelMsg::ExtendedData { ref data, ext: 1 } => {
                    let remaining_capacity = STDERR_CAP_BYTES.saturating_sub(stderr_buffer.len());
                    let slice_end = data.len().min(remaining_capacity);
                    stderr_buffer.extend_from_slice(&data[..slice_end]);
                }
                ChannelMsg::ExitStatus { exit_status } => {
                    exit_code = Some(exit_status);
                }
                _ => {}
            }
        }

        let _ = session_handle
            .disconnect(Disconnect::ByApplication, "systemmap scan complete", "en")
            .await;

        debug!(
            "📡 [SSH_CAPTURE]: stdout={}B stderr={}B exit={:?}",
            stdout_buffer.len(),
            stderr_buffer.len(),
            exit_code
        );

        Ok(CapturedOutput { stdout: stdout_buffer, stderr: stderr_buffer, stdout_overflowed, exit_code })
    }

    // --------------------------------------------------------------
    // ESTABLECIMIENTO Y AUTENTICACIÓN DE SESIÓN
    // --------------------------------------------------------------

    async fn open_session(
        credentials: &DecryptedCredentials,
        options: &ExecOptions,
    ) -> Result<client::Handle<ClientHandler>, SshError> {
        let session_config = Arc::new(client::Config {
            keepalive_interval: Some(Duration::from_secs(15)),
            keepalive_max: 3,
            inactivity_timeout: Some(Duration::from_secs(options.deadline_secs + 30)),
            ..Default::default()
        });

        // Resolución explícita para distinguir el colapso DNS del de red.
        let socket_targets = tokio::net::lookup_host(
            (credentials.host_address.as_str(), credentials.port),
        )
        .await
        .map_err(|resolution_fault| SshError::DnsResolution(resolution_fault.to_string()))?
        .collect::<Vec<_>>();

        let socket_address = socket_targets
            .first()
            .copied()
            .ok_or_else(|| SshError::DnsResolution("empty resolution set".into()))?;

        let tcp_stream = match timeout(
            Duration::from_secs(options.ready_timeout_secs),
            TcpStream::connect(socket_address),
        )
        .await
        {
            Err(_) => return Err(SshError::ConnectionTimeout(options.ready_timeout_secs)),
            Ok(Err(io_fault)) => return Err(Self::classify_connect_fault(io_fault)),
            Ok(Ok(stream)) => stream,
        };

        let mut session_handle = timeout(
            Duration::from_secs(options.ready_timeout_secs),
            client::connect_stream(session_config, tcp_stream, ClientHandler),
        )
        .await
        .map_err(|_| SshError::ConnectionTimeout(options.ready_timeout_secs))?
        .map_err(|handshake_fault| SshError::Unknown(handshake_fault.to_string()))?;

        Self::authenticate(&mut session_handle, credentials).await?;
        Ok(session_handle)
    }

    fn classify_connect_fault(io_fault: std::io::Error) -> SshError {
        match io_fault.kind() {
            std::io::ErrorKind::ConnectionRefused => {
                SshError::ConnectionRefused(io_fault.to_string())
            }
            // EHOSTUNREACH / ENETUNREACH carecen de ErrorKind estable.
            _ if matches!(io_fault.raw_os_error(), Some(113) | Some(101)) => {
                SshError::HostUnreachable(io_fault.to_string())
            }
            _ => SshError::Unknown(io_fault.to_string()),
        }
    }

    async fn authenticate(
        session_handle: &mut client::Handle<ClientHandler>,
        credentials: &DecryptedCredentials,
    ) -> Result<(), SshError> {
        // 1. LLAVE PRIVADA
        if let Some(private_key_pem) = &credentials.private_key_pem {
            let key_pair = russh_keys::decode_secret_key(private_key_pem, None)
                .map_err(|key_fault| SshError::KeyMaterial(key_fault.to_string()))?;

            let accepted = session_handle
                .authenticate_publickey(&credentials.username, Arc::new(key_pair))
                .await
                .map_err(|protocol_fault| SshError::Unknown(protocol_fault.to_string()))?;

            if accepted {
                info!("🔑 [SSH_AUTH]: Public-key authentication accepted.");
                return Ok(());
            }
        }

        // 2. CONTRASEÑA
        if let Some(password) = &credentials.password {
            let accepted = session_handle
                .authenticate_password(&credentials.username, password)
                .await
                .map_err(|protocol_fault| SshError::Unknown(protocol_fault.to_string()))?;

            if accepted {
                return Ok(());
            }

            // 3. KEYBOARD-INTERACTIVE con la contraseña configurada
            // (hosts con PAM que rechazan 'password' plano).
            if Self::keyboard_interactive_fallback(session_handle, credentials, password).await? {
                info!("🔑 [SSH_AUTH]: Keyboard-interactive fallback accepted.");
                return Ok(());
            }
        }

        Err(SshError::AuthFailed)
    }

    async fn keyboard_interactive_fallback(
        session_handle: &mut client::Handle<ClientHandler>,
        credentials: &DecryptedCredentials,
        password: &str,
    ) -> Result<bool, SshError> {
        let mut interactive_state = session_handle
            .authenticate_keyboard_interactive_start(&credentials.username, None)
            .await
            .map_err(|protocol_fault| SshError::Unknown(protocol_fault.to_string()))?;

        // Máximo 3 rondas de prompts; un PAM sano no pide más.
        for _round in 0..3 {
            match interactive_state {
                KeyboardInteractiveAuthResponse::Success => return Ok(true),
                KeyboardInteractiveAuthResponse::Failure => return Ok(false),
                KeyboardInteractiveAuthResponse::InfoRequest { ref prompts, .. } => {
                    let prompt_responses: Vec<String> =
                        prompts.iter().map(|_| password.to_string()).collect();

                    interactive_state = session_handle
                        .authenticate_keyboard_interactive_respond(prompt_responses)
                        .await
                        .map_err(|protocol_fault| SshError::Unknown(protocol_fault.to_string()))?;
                }
            }
        }

        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certify_heredoc_composition() {
        let command = SshExecutor::compose_heredoc_command("echo '{}'");

        assert!(command.starts_with("cat > /tmp/.systemmap_gather.sh <<'SYSTEMMAP_EOF_7C9A'"));
        assert!(command.contains("chmod 700 /tmp/.systemmap_gather.sh"));
        assert!(command.contains("bash /tmp/.systemmap_gather.sh"));
        assert!(command.contains("rm -f /tmp/.systemmap_gather.sh"));
        // El estado de salida del script debe sobrevivir al borrado.
        assert!(command.ends_with("exit $SCRIPT_STATUS\n"));
    }

    #[test]
    fn certify_backoff_progression() {
        // 3s * 2^(n-1): 3, 6, 12…
        let pauses: Vec<u64> = (1u32..=3)
            .map(|attempt| 3u64.saturating_mul(1u64 << (attempt - 1)))
            .collect();
        assert_eq!(pauses, vec![3, 6, 12]);
    }

    #[test]
    fn certify_default_exec_envelope() {
        let options = ExecOptions::default();
        assert_eq!(options.deadline_secs, 180);
        assert_eq!(options.extra_retries, 2);
        assert_eq!(options.ready_timeout_secs, 15);
    }
}
