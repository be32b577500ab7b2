// [libs/infra/db/src/repositories/hosts.rs]
/*!
 * =================================================================
 * APARATO: HOST OMNISCIENT REPOSITORY (V5.5 - LIFECYCLE GUARDED)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: REGISTRO, CICLO DE VIDA Y LECTURAS DE CONTEXTO
 *
 * # Mathematical Proof (Scan Mutual Exclusion):
 * 'begin_scan' es un CAS sobre el estado: el UPDATE exige
 * status != 'scanning', de modo que dos workers jamás mantienen el
 * mismo host en vuelo. El disparo programado y el manual colisionan
 * aquí y uno de los dos recibe SCAN_IN_PROGRESS.
 * =================================================================
 */

use libsql::params;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use sysmap_domain_models::host::{Host, HostStatus, SshAuthMethod};

use crate::errors::DbError;
use crate::repositories::{
    bool_at, float_at, int_at, now_stamp, opt_int_at, opt_text_at, stamp_at, text_at,
};
use crate::DbClient;

/// Campos de registro inicial de un host gestionado.
pub struct HostRegistration {
    pub ip: String,
    pub ssh_port: u16,
    pub ssh_user: String,
    pub auth_method: SshAuthMethod,
    /// Sobres {nonce, auth_tag, body} ya serializados por la bóveda.
    pub encrypted_password: Option<String>,
    pub encrypted_private_key: Option<String>,
    pub scan_schedule: Option<String>,
    pub allow_sudo: bool,
}

pub struct HostRepository {
    database_client: DbClient,
}

impl HostRepository {
    pub fn new(client: DbClient) -> Self {
        Self { database_client: client }
    }

    // --------------------------------------------------------------
    // REGISTRO
    // --------------------------------------------------------------

    /**
     * Registra un host gestionado. La unicidad por IP es ley dura.
     */
    #[instrument(skip(self, registration))]
    pub async fn register(&self, registration: HostRegistration) -> Result<String, DbError> {
        let connection = self.database_client.get_connection()?;
        let host_id = Uuid::new_v4().to_string();

        connection
            .execute(
                "INSERT INTO hosts (id, ip, ssh_port, ssh_user, auth_method,
                                    encrypted_password, encrypted_private_key,
                                    allow_sudo, scan_schedule, status, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'configured', ?10)",
                params![
                    host_id.clone(),
                    registration.ip.clone(),
                    registration.ssh_port as i64,
                    registration.ssh_user,
                    match registration.auth_method {
                        SshAuthMethod::Password => "password",
                        SshAuthMethod::PrivateKey => "private_key",
                    },
                    registration.encrypted_password,
                    registration.encrypted_private_key,
                    registration.allow_sudo as i64,
                    registration.scan_schedule,
                    now_stamp()
                ],
            )
            .await?;

        info!("🖥️ [HOSTS]: Registered managed host {} ({})", registration.ip, host_id);
        Ok(host_id)
    }

    /**
     * Alta silenciosa desde el descubrimiento de red: status
     * 'discovered', sin credenciales. La IP repetida se absorbe.
     */
    pub async fn register_discovered(
        &self,
        ip: &str,
        hostname: Option<&str>,
    ) -> Result<bool, DbError> {
        let connection = self.database_client.get_connection()?;

        let inserted_rows = connection
            .execute(
                "INSERT OR IGNORE INTO hosts (id, ip, hostname, status, updated_at)
                 VALUES (?1, ?2, ?3, 'discovered', ?4)",
                params![Uuid::new_v4().to_string(), ip, hostname, now_stamp()],
            )
            .await?;

        Ok(inserted_rows > 0)
    }

    // --------------------------------------------------------------
    // LECTURAS
    // --------------------------------------------------------------

    pub async fn get(&self, host_id: &str) -> Result<Host, DbError> {
        let connection = self.database_client.get_connection()?;

        let mut rows = connection
            .query(&format!("SELECT {} FROM hosts WHERE id = ?1", HOST_COLUMNS), params![host_id])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(host_from_row(&row)),
            None => Err(DbError::HostNotFound),
        }
    }

    pub async fn get_by_ip(&self, ip: &str) -> Result<Option<Host>, DbError> {
        let connection = self.database_client.get_connection()?;

        let mut rows = connection
            .query(&format!("SELECT {} FROM hosts WHERE ip = ?1", HOST_COLUMNS), params![ip])
            .await?;

        Ok(rows.next().await?.map(|row| host_from_row(&row)))
    }

    pub async fn list_all(&self) -> Result<Vec<Host>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(&format!("SELECT {} FROM hosts ORDER BY ip", HOST_COLUMNS), ())
            .await?;

        let mut hosts = Vec::new();
        while let Some(row) = rows.next().await? {
            hosts.push(host_from_row(&row));
        }
        Ok(hosts)
    }

    /// Hosts elegibles para programación: expresión cron no nula Y
    /// material de credenciales presente.
    pub async fn list_scheduled(&self) -> Result<Vec<Host>, DbError> {
        let connection = self.database_client.get_connection()?;

        let mut rows = connection
            .query(
                &format!(
                    "SELECT {} FROM hosts
                     WHERE scan_schedule IS NOT NULL AND scan_schedule != ''
                       AND (encrypted_password IS NOT NULL OR encrypted_private_key IS NOT NULL)",
                    HOST_COLUMNS
                ),
                (),
            )
            .await?;

        let mut hosts = Vec::new();
        while let Some(row) = rows.next().await? {
            hosts.push(host_from_row(&row));
        }
        Ok(hosts)
    }

    /// Índice mínimo (id, ip, hostname) para el correlador.
    pub async fn host_index(&self) -> Result<Vec<(String, String, Option<String>)>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection.query("SELECT id, ip, hostname FROM hosts", ()).await?;

        let mut index_entries = Vec::new();
        while let Some(row) = rows.next().await? {
            index_entries.push((text_at(&row, 0), text_at(&row, 1), opt_text_at(&row, 2)));
        }
        Ok(index_entries)
    }

    pub async fn raw_document(&self, host_id: &str) -> Result<Option<Value>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query("SELECT raw_scan_data FROM hosts WHERE id = ?1", params![host_id])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(opt_text_at(&row, 0)
                .and_then(|document_text| serde_json::from_str(&document_text).ok())),
            None => Err(DbError::HostNotFound),
        }
    }

    // --------------------------------------------------------------
    // CICLO DE VIDA DEL ESCANEO
    // --------------------------------------------------------------

    /**
     * Reserva el host para un escaneo. CAS de exclusión mutua.
     *
     * # Errors:
     * `DbError::ScanInProgress` si otro worker ya lo mantiene en vuelo.
     */
    #[instrument(skip(self))]
    pub async fn begin_scan(&self, host_id: &str) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;

        let updated_rows = connection
            .execute(
                "UPDATE hosts SET status = 'scanning', updated_at = ?2
                 WHERE id = ?1 AND status != 'scanning'",
                params![host_id, now_stamp()],
            )
            .await?;

        if updated_rows == 0 {
            // O no existe, o ya está en vuelo: distinguimos.
            self.get(host_id).await?;
            warn!("⛔ [HOSTS]: Host {} already scanning; trigger rejected.", host_id);
            return Err(DbError::ScanInProgress);
        }

        Ok(())
    }

    /// Cierre fallido: status=error y motivo verbatim.
    pub async fn fail_scan(&self, host_id: &str, error_message: &str) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;

        connection
            .execute(
                "UPDATE hosts SET status = 'error', last_scan_error = ?2, updated_at = ?3
                 WHERE id = ?1",
                params![
                    host_id,
                    error_message.chars().take(2000).collect::<String>(),
                    now_stamp()
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn set_status(&self, host_id: &str, status: HostStatus) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                "UPDATE hosts SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![host_id, status.as_str(), now_stamp()],
            )
            .await?;
        Ok(())
    }

    /**
     * Recuperación de obsoletos: hosts en 'scanning' más allá del
     * umbral pasan a 'error' con el mensaje "scan timeout".
     */
    #[instrument(skip(self))]
    pub async fn force_stale_to_error(
        &self,
        stale_threshold_minutes: i64,
    ) -> Result<Vec<String>, DbError> {
        let connection = self.database_client.get_connection()?;
        let threshold_stamp = crate::repositories::stamp_of(
            chrono::Utc::now() - chrono::Duration::minutes(stale_threshold_minutes),
        );

        let mut rows = connection
            .query(
                "SELECT id FROM hosts WHERE status = 'scanning' AND updated_at < ?1",
                params![threshold_stamp.clone()],
            )
            .await?;

        let mut stale_host_ids = Vec::new();
        while let Some(row) = rows.next().await? {
            stale_host_ids.push(text_at(&row, 0));
        }

        if !stale_host_ids.is_empty() {
            connection
                .execute(
                    "UPDATE hosts SET status = 'error', last_scan_error = 'scan timeout',
                                      updated_at = ?2
                     WHERE status = 'scanning' AND updated_at < ?1",
                    params![threshold_stamp, now_stamp()],
                )
                .await?;

            warn!("💀 [HOSTS]: Forced {} stale scanning hosts to error.", stale_host_ids.len());
        }

        Ok(stale_host_ids)
    }

    /// Campos derivados por IA cacheados sobre el host.
    pub async fn save_ai_fields(
        &self,
        host_id: &str,
        purpose: &str,
        tags: &str,
        summary: &str,
    ) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                "UPDATE hosts SET ai_purpose = ?2, ai_tags = ?3, ai_summary = ?4, updated_at = ?5
                 WHERE id = ?1",
                params![host_id, purpose, tags, summary, now_stamp()],
            )
            .await?;
        Ok(())
    }

    // --------------------------------------------------------------
    // LECTURAS DE CONTEXTO (motor de reglas, pipelines IA)
    // --------------------------------------------------------------

    pub async fn certificates_of(&self, host_id: &str) -> Result<Vec<Value>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT path, subject, issuer, valid_from, valid_to, is_expired, days_left
                 FROM ssl_certificates WHERE host_id = ?1 ORDER BY path",
                params![host_id],
            )
            .await?;

        let mut certificates = Vec::new();
        while let Some(row) = rows.next().await? {
            certificates.push(serde_json::json!({
                "path": text_at(&row, 0),
                "subject": text_at(&row, 1),
                "issuer": text_at(&row, 2),
                "valid_from": text_at(&row, 3),
                "valid_to": text_at(&row, 4),
                "is_expired": bool_at(&row, 5),
                "days_left": int_at(&row, 6),
            }));
        }
        Ok(certificates)
    }

    pub async fn mounts_of(&self, host_id: &str) -> Result<Vec<Value>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT device, mountpoint, filesystem, size_mb, used_mb, use_pct
                 FROM mounts WHERE host_id = ?1 ORDER BY mountpoint",
                params![host_id],
            )
            .await?;

        let mut mounts = Vec::new();
        while let Some(row) = rows.next().await? {
            mounts.push(serde_json::json!({
                "device": text_at(&row, 0),
                "mountpoint": text_at(&row, 1),
                "fs": text_at(&row, 2),
                "size_mb": int_at(&row, 3),
                "used_mb": int_at(&row, 4),
                "use_pct": opt_int_at(&row, 5),
            }));
        }
        Ok(mounts)
    }

    pub async fn systemd_units_of(&self, host_id: &str) -> Result<Vec<Value>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT name, active_state, sub_state, enabled
                 FROM systemd_units WHERE host_id = ?1 ORDER BY name",
                params![host_id],
            )
            .await?;

        let mut units = Vec::new();
        while let Some(row) = rows.next().await? {
            units.push(serde_json::json!({
                "name": text_at(&row, 0),
                "active_state": text_at(&row, 1),
                "sub_state": text_at(&row, 2),
                "enabled": bool_at(&row, 3),
            }));
        }
        Ok(units)
    }

    pub async fn service_names_of(&self, host_id: &str) -> Result<HashSet<String>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query("SELECT DISTINCT name FROM services WHERE host_id = ?1", params![host_id])
            .await?;

        let mut names = HashSet::new();
        while let Some(row) = rows.next().await? {
            names.insert(text_at(&row, 0));
        }
        Ok(names)
    }

    pub async fn services_of(&self, host_id: &str) -> Result<Vec<Value>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT name, port, protocol, bind_address, state
                 FROM services WHERE host_id = ?1 ORDER BY name, port, protocol",
                params![host_id],
            )
            .await?;

        let mut services = Vec::new();
        while let Some(row) = rows.next().await? {
            services.push(serde_json::json!({
                "name": text_at(&row, 0),
                "port": int_at(&row, 1),
                "protocol": text_at(&row, 2),
                "bind": text_at(&row, 3),
                "state": text_at(&row, 4),
            }));
        }
        Ok(services)
    }

    pub async fn processes_of(&self, host_id: &str) -> Result<Vec<Value>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT pid, ppid, process_user, cpu_pct, mem_mb, command, full_path, args
                 FROM processes WHERE host_id = ?1 ORDER BY cpu_pct DESC",
                params![host_id],
            )
            .await?;

        let mut process_rows = Vec::new();
        while let Some(row) = rows.next().await? {
            process_rows.push(serde_json::json!({
                "pid": int_at(&row, 0),
                "ppid": int_at(&row, 1),
                "user": text_at(&row, 2),
                "cpu_pct": float_at(&row, 3),
                "mem_mb": float_at(&row, 4),
                "command": text_at(&row, 5),
                "full_path": text_at(&row, 6),
                "args": text_at(&row, 7),
            }));
        }
        Ok(process_rows)
    }

    pub async fn log_lines_of(&self, host_id: &str) -> Result<Vec<String>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT line FROM server_log_entries WHERE host_id = ?1 ORDER BY id",
                params![host_id],
            )
            .await?;

        let mut lines = Vec::new();
        while let Some(row) = rows.next().await? {
            lines.push(text_at(&row, 0));
        }
        Ok(lines)
    }
}

// ------------------------------------------------------------------
// MAPEO DE FILA
// ------------------------------------------------------------------

const HOST_COLUMNS: &str = "id, ip, hostname, os_info, kernel_info, cpu_info, memory_mb, \
                            ssh_port, ssh_user, auth_method, encrypted_password, \
                            encrypted_private_key, allow_sudo, scan_schedule, status, \
                            last_scan_at, last_scan_error, ai_purpose, ai_tags, ai_summary, \
                            updated_at";

fn host_from_row(row: &libsql::Row) -> Host {
    Host {
        id: text_at(row, 0),
        ip: text_at(row, 1),
        hostname: opt_text_at(row, 2),
        os_info: opt_text_at(row, 3),
        kernel_info: opt_text_at(row, 4),
        cpu_info: opt_text_at(row, 5),
        memory_mb: opt_int_at(row, 6),
        ssh_port: int_at(row, 7).clamp(1, 65535) as u16,
        ssh_user: opt_text_at(row, 8),
        auth_method: match text_at(row, 9).as_str() {
            "private_key" => SshAuthMethod::PrivateKey,
            _ => SshAuthMethod::Password,
        },
        encrypted_password: opt_text_at(row, 10),
        encrypted_private_key: opt_text_at(row, 11),
        allow_sudo: bool_at(row, 12),
        scan_schedule: opt_text_at(row, 13),
        status: HostStatus::parse(&text_at(row, 14)),
        last_scan_at: stamp_at(row, 15),
        last_scan_error: opt_text_at(row, 16),
        ai_purpose: opt_text_at(row, 17),
        ai_tags: opt_text_at(row, 18),
        ai_summary: opt_text_at(row, 19),
        updated_at: stamp_at(row, 20),
    }
}
