// [libs/infra/db/src/repositories/inventory.rs]
/*!
 * =================================================================
 * APARATO: INVENTORY MAPPER (V5.7 - TRANSACTIONAL RECONCILER)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: RECONCILIACIÓN ATÓMICA DEL DOCUMENTO RECOLECTADO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. ONE TRANSACTION: host + todas las colecciones hijas dentro de una
 *    transacción con plazo blando de 60 s; el rollback deja el
 *    inventario anterior intacto.
 * 2. TYPED FUNNEL: el documento crudo se proyecta primero a los
 *    contratos de dominio (Service, Mount, SystemdUnit…) y solo
 *    después a filas; la coerción tolerante y el truncado viven en
 *    la proyección.
 * 3. DELETE-THEN-INSERT: cada colección hija se reemplaza por completo
 *    en lotes de 200 filas con INSERT OR IGNORE (duplicados saltados).
 * 4. DERIVATIONS: servicios desde listeners deduplicados por
 *    (proceso, puerto, protocolo); unidades systemd retenidas solo en
 *    active/failed; LVM enriquecido por join con mounts.
 * =================================================================
 */

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use libsql::{params, Connection, Value as SqlValue};
use serde_json::Value;
use tokio::time::timeout;
use tracing::{info, instrument};
use uuid::Uuid;

use sysmap_core_document::{expect_array, safe_bool, safe_float, safe_int, safe_str, truncate};
use sysmap_domain_models::inventory::{
    CronEntry, DockerContainer, LvmVolume, MapCounts, Mount, NetworkInterface, ProcessRecord,
    ServerLogEntry, Service, SslCertificate, SystemdUnit, UserAccount,
};

use crate::errors::DbError;
use crate::repositories::now_stamp;
use crate::DbClient;

/// Plazo blando de la transacción del mapeador.
const MAP_DEADLINE_SECS: u64 = 60;
/// Tamaño de lote acotado por los límites del backend.
const INSERT_BATCH_SIZE: usize = 200;
/// Límite general de cadenas cortas (nombres, estados).
const SHORT_TEXT_LIMIT: usize = 255;
/// Límite de blobs de texto (args, env, rutas compuestas).
const LONG_TEXT_LIMIT: usize = 4000;

pub struct InventoryMapper {
    database_client: DbClient,
}

impl InventoryMapper {
    pub fn new(client: DbClient) -> Self {
        Self { database_client: client }
    }

    /**
     * Reconcilia el documento dentro de una transacción única.
     *
     * # Errors:
     * - `DbError::MalformedDocument` sin sección 'os' (permanente).
     * - `DbError::DeadlineExceeded` al vencer el plazo blando.
     * - El resto provoca rollback implícito y el host queda intacto.
     */
    #[instrument(skip(self, document), fields(host = %host_id))]
    pub async fn map_document(&self, host_id: &str, document: &Value) -> Result<MapCounts, DbError> {
        match timeout(
            Duration::from_secs(MAP_DEADLINE_SECS),
            self.map_document_inner(host_id, document),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(DbError::DeadlineExceeded(MAP_DEADLINE_SECS)),
        }
    }

    async fn map_document_inner(
        &self,
        host_id: &str,
        document: &Value,
    ) -> Result<MapCounts, DbError> {
        // El documento sin 'os' es basura permanente: aborta antes de
        // tocar la transacción.
        let os_section = document
            .get("os")
            .and_then(Value::as_object)
            .ok_or(DbError::MalformedDocument)?;

        let connection = self.database_client.get_connection()?;
        let transaction = connection.transaction().await?;

        // 1. ACTUALIZACIÓN DEL HOST DESDE 'os'
        let cpu_info = compose_cpu_info(
            &safe_str(os_section.get("cpu_model")),
            safe_int(os_section.get("cpu_cores"), 0),
        );

        transaction
            .execute(
                "UPDATE hosts SET hostname = ?2, os_info = ?3, kernel_info = ?4,
                                  cpu_info = ?5, memory_mb = ?6, raw_scan_data = ?7,
                                  last_scan_at = ?8, last_scan_error = NULL,
                                  status = 'online', updated_at = ?8
                 WHERE id = ?1",
                params![
                    host_id,
                    truncate(&safe_str(os_section.get("hostname")), SHORT_TEXT_LIMIT),
                    truncate(&safe_str(os_section.get("os_name")), SHORT_TEXT_LIMIT),
                    truncate(&safe_str(os_section.get("kernel")), SHORT_TEXT_LIMIT),
                    cpu_info,
                    safe_int(os_section.get("memory_mb"), 0),
                    document.to_string(),
                    now_stamp()
                ],
            )
            .await?;

        // 2. PROYECCIÓN TIPADA DEL DOCUMENTO
        let services = parse_services(document);
        let mounts = parse_mounts(document);
        let interfaces = parse_interfaces(document);
        let containers = parse_containers(document);
        let cron_entries = parse_cron_entries(document);
        let systemd_units = parse_systemd_units(document);
        let certificates = parse_certificates(document);
        let lvm_volumes = parse_lvm_volumes(document);
        let user_accounts = parse_user_accounts(document);
        let processes = parse_processes(document);
        let log_entries = parse_log_entries(document);

        // 3. REEMPLAZO ATÓMICO POR COLECCIÓN
        let counts = MapCounts {
            services: self
                .replace_rows(&transaction, host_id, "services",
                    &["name", "port", "protocol", "bind_address", "state", "pid"],
                    services.iter().map(service_row).collect())
                .await?,
            mounts: self
                .replace_rows(&transaction, host_id, "mounts",
                    &["device", "mountpoint", "filesystem", "size_mb", "used_mb", "use_pct"],
                    mounts.iter().map(mount_row).collect())
                .await?,
            interfaces: self
                .replace_rows(&transaction, host_id, "interfaces",
                    &["name", "ip", "mac", "state", "mtu", "rx_bytes", "tx_bytes"],
                    interfaces.iter().map(interface_row).collect())
                .await?,
            containers: self
                .replace_rows(&transaction, host_id, "containers",
                    &["container_id", "name", "image", "state", "ports", "networks", "env", "volumes"],
                    containers.iter().map(container_row).collect())
                .await?,
            cron_entries: self
                .replace_rows(&transaction, host_id, "cron_entries",
                    &["cron_user", "schedule", "command", "source"],
                    cron_entries.iter().map(cron_row).collect())
                .await?,
            systemd_units: self
                .replace_rows(&transaction, host_id, "systemd_units",
                    &["name", "unit_type", "active_state", "sub_state", "main_pid", "memory_mb", "cpu_seconds", "enabled"],
                    systemd_units.iter().map(systemd_row).collect())
                .await?,
            certificates: self
                .replace_rows(&transaction, host_id, "ssl_certificates",
                    &["path", "subject", "issuer", "valid_from", "valid_to", "is_expired", "days_left", "san_domains"],
                    certificates.iter().map(certificate_row).collect())
                .await?,
            lvm_volumes: self
                .replace_rows(&transaction, host_id, "lvm_volumes",
                    &["volume_group", "logical_volume", "device_path", "size_mb", "mountpoint"],
                    lvm_volumes.iter().map(lvm_row).collect())
                .await?,
            user_accounts: self
                .replace_rows(&transaction, host_id, "user_accounts",
                    &["username", "uid", "gid", "shell", "home_dir", "has_login", "groups_list"],
                    user_accounts.iter().map(user_row).collect())
                .await?,
            processes: self
                .replace_rows(&transaction, host_id, "processes",
                    &["pid", "ppid", "process_user", "cpu_pct", "mem_mb", "command", "full_path", "args", "cgroup", "fd_count"],
                    processes.iter().map(process_row).collect())
                .await?,
            // 4. LOGS: solo la colección más reciente sobrevive.
            log_entries: self
                .replace_rows(&transaction, host_id, "server_log_entries",
                    &["source", "severity", "line"],
                    log_entries.iter().map(log_row).collect())
                .await?,
        };

        transaction.commit().await?;

        info!(
            "🗃️ [MAPPER]: Host {} reconciled ({} services, {} mounts, {} processes).",
            host_id, counts.services, counts.mounts, counts.processes
        );
        Ok(counts)
    }

    /// Reemplazo atómico de una colección hija en lotes acotados.
    async fn replace_rows(
        &self,
        transaction: &Connection,
        host_id: &str,
        table: &str,
        columns: &[&str],
        rows: Vec<Vec<SqlValue>>,
    ) -> Result<usize, DbError> {
        transaction
            .execute(&format!("DELETE FROM {} WHERE host_id = ?1", table), params![host_id])
            .await?;

        let mut inserted_total = 0usize;

        for batch in rows.chunks(INSERT_BATCH_SIZE) {
            let row_width = columns.len() + 2; // id + host_id + columnas
            let mut placeholders = Vec::with_capacity(batch.len());
            let mut bound_values: Vec<SqlValue> = Vec::with_capacity(batch.len() * row_width);

            for (row_index, row_values) in batch.iter().enumerate() {
                let base = row_index * row_width;
                let slots: Vec<String> =
                    (1..=row_width).map(|offset| format!("?{}", base + offset)).collect();
                placeholders.push(format!("({})", slots.join(", ")));

                bound_values.push(SqlValue::Text(Uuid::new_v4().to_string()));
                bound_values.push(SqlValue::Text(host_id.to_string()));
                bound_values.extend(row_values.iter().cloned());
            }

            let statement = format!(
                "INSERT OR IGNORE INTO {} (id, host_id, {}) VALUES {}",
                table,
                columns.join(", "),
                placeholders.join(", ")
            );

            inserted_total += transaction
                .execute(&statement, libsql::params_from_iter(bound_values))
                .await? as usize;
        }

        Ok(inserted_total)
    }
}

// ------------------------------------------------------------------
// PROYECCIONES TIPADAS (documento -> contratos de dominio)
// ------------------------------------------------------------------

fn compose_cpu_info(cpu_model: &str, cpu_cores: i64) -> String {
    if cpu_model.is_empty() {
        format!("{} cores", cpu_cores)
    } else {
        format!("{} ({} cores)", truncate(cpu_model, SHORT_TEXT_LIMIT), cpu_cores)
    }
}

/// Servicios derivados de 'listeners', deduplicados por
/// (proceso, puerto, protocolo).
fn parse_services(document: &Value) -> Vec<Service> {
    let mut seen_identities: HashSet<(String, i64, String)> = HashSet::new();
    let mut services = Vec::new();

    for listener in expect_array(document.get("listeners")) {
        let port = safe_int(listener.get("port"), 0);
        if port <= 0 {
            continue;
        }

        let name = {
            let raw_name = truncate(&safe_str(listener.get("process")), SHORT_TEXT_LIMIT);
            if raw_name.is_empty() { "unknown".to_string() } else { raw_name }
        };
        let protocol = {
            let raw_protocol = safe_str(listener.get("protocol")).to_ascii_lowercase();
            if raw_protocol.is_empty() { "tcp".to_string() } else { truncate(&raw_protocol, 16) }
        };

        if !seen_identities.insert((name.clone(), port, protocol.clone())) {
            continue;
        }

        services.push(Service {
            name,
            port,
            protocol,
            bind_address: truncate(&safe_str(listener.get("bind")), SHORT_TEXT_LIMIT),
            state: truncate(&safe_str(listener.get("state")), 64),
            pid: listener.get("pid").and_then(Value::as_i64),
        });
    }

    services
}

fn parse_mounts(document: &Value) -> Vec<Mount> {
    expect_array(document.get("mounts"))
        .iter()
        .filter(|mount| !safe_str(mount.get("mountpoint")).is_empty())
        .map(|mount| Mount {
            device: truncate(&safe_str(mount.get("device")), SHORT_TEXT_LIMIT),
            mountpoint: truncate(&safe_str(mount.get("mountpoint")), SHORT_TEXT_LIMIT),
            filesystem: truncate(&safe_str(mount.get("fs")), 64),
            size_mb: safe_int(mount.get("size_mb"), 0),
            used_mb: safe_int(mount.get("used_mb"), 0),
            use_pct: match mount.get("use_pct") {
                Some(value) if !value.is_null() => Some(safe_int(Some(value), 0)),
                _ => None,
            },
        })
        .collect()
}

fn parse_interfaces(document: &Value) -> Vec<NetworkInterface> {
    expect_array(document.get("interfaces"))
        .iter()
        .filter(|interface| !safe_str(interface.get("name")).is_empty())
        .map(|interface| NetworkInterface {
            name: truncate(&safe_str(interface.get("name")), 64),
            ip: truncate(&safe_str(interface.get("ip")), 64),
            mac: truncate(&safe_str(interface.get("mac")), 32),
            state: truncate(&safe_str(interface.get("state")), 32),
            mtu: safe_int(interface.get("mtu"), 0),
            rx_bytes: safe_int(interface.get("rx_bytes"), 0),
            tx_bytes: safe_int(interface.get("tx_bytes"), 0),
        })
        .collect()
}

fn parse_containers(document: &Value) -> Vec<DockerContainer> {
    expect_array(document.get("docker_containers"))
        .iter()
        .filter(|container| !safe_str(container.get("name")).is_empty())
        .map(|container| {
            // El env llega como arreglo ya enmascarado; se persiste
            // como blob de líneas.
            let env_blob = expect_array(container.get("env"))
                .iter()
                .map(|line| safe_str(Some(line)))
                .collect::<Vec<_>>()
                .join("\n");

            DockerContainer {
                container_id: truncate(&safe_str(container.get("id")), 64),
                name: truncate(&safe_str(container.get("name")), SHORT_TEXT_LIMIT),
                image: truncate(&safe_str(container.get("image")), SHORT_TEXT_LIMIT),
                state: truncate(&safe_str(container.get("state")), 64),
                ports: truncate(&safe_str(container.get("ports")), LONG_TEXT_LIMIT),
                networks: truncate(&safe_str(container.get("networks")), LONG_TEXT_LIMIT),
                env: truncate(&env_blob, LONG_TEXT_LIMIT),
                volumes: truncate(&safe_str(container.get("volumes")), LONG_TEXT_LIMIT),
            }
        })
        .collect()
}

fn parse_cron_entries(document: &Value) -> Vec<CronEntry> {
    expect_array(document.get("cron_jobs"))
        .iter()
        .filter(|entry| !safe_str(entry.get("command")).is_empty())
        .map(|entry| CronEntry {
            cron_user: truncate(&safe_str(entry.get("user")), 64),
            schedule: truncate(&safe_str(entry.get("schedule")), SHORT_TEXT_LIMIT),
            command: truncate(&safe_str(entry.get("command")), LONG_TEXT_LIMIT),
            source: truncate(&safe_str(entry.get("source")), SHORT_TEXT_LIMIT),
        })
        .collect()
}

/// Solo unidades en active/failed sobreviven al mapeo.
fn parse_systemd_units(document: &Value) -> Vec<SystemdUnit> {
    expect_array(document.get("systemd_units"))
        .iter()
        .filter(|unit| {
            matches!(safe_str(unit.get("active_state")).as_str(), "active" | "failed")
        })
        .map(|unit| SystemdUnit {
            name: truncate(&safe_str(unit.get("name")), SHORT_TEXT_LIMIT),
            unit_type: {
                let raw_type = truncate(&safe_str(unit.get("type")), 32);
                if raw_type.is_empty() { "service".to_string() } else { raw_type }
            },
            active_state: truncate(&safe_str(unit.get("active_state")), 32),
            sub_state: truncate(&safe_str(unit.get("sub_state")), 32),
            main_pid: unit.get("main_pid").and_then(Value::as_i64),
            memory_mb: unit.get("memory_mb").and_then(Value::as_i64),
            cpu_seconds: unit.get("cpu_sec").and_then(Value::as_i64),
            enabled: safe_bool(unit.get("enabled")),
        })
        .collect()
}

fn parse_certificates(document: &Value) -> Vec<SslCertificate> {
    expect_array(document.get("ssl_certificates"))
        .iter()
        .filter(|certificate| !safe_str(certificate.get("path")).is_empty())
        .map(|certificate| SslCertificate {
            path: truncate(&safe_str(certificate.get("path")), SHORT_TEXT_LIMIT),
            subject: truncate(&safe_str(certificate.get("subject")), LONG_TEXT_LIMIT),
            issuer: truncate(&safe_str(certificate.get("issuer")), LONG_TEXT_LIMIT),
            valid_from: truncate(&safe_str(certificate.get("valid_from")), 64),
            valid_to: truncate(&safe_str(certificate.get("valid_to")), 64),
            is_expired: safe_bool(certificate.get("is_expired")),
            days_left: safe_int(certificate.get("days_left"), 0),
            san_domains: truncate(&safe_str(certificate.get("san_domains")), LONG_TEXT_LIMIT),
        })
        .collect()
}

/// LVM enriquecido: mountpoint por join contra mounts vía device path.
fn parse_lvm_volumes(document: &Value) -> Vec<LvmVolume> {
    let mountpoint_by_device: HashMap<String, String> = expect_array(document.get("mounts"))
        .iter()
        .map(|mount| (safe_str(mount.get("device")), safe_str(mount.get("mountpoint"))))
        .filter(|(device, _)| !device.is_empty())
        .collect();

    expect_array(document.get("lvm"))
        .iter()
        .filter(|volume| !safe_str(volume.get("lv")).is_empty())
        .map(|volume| {
            let device_path = truncate(&safe_str(volume.get("path")), SHORT_TEXT_LIMIT);
            let mountpoint = mountpoint_by_device
                .get(&device_path)
                .filter(|point| !point.is_empty())
                .cloned();

            LvmVolume {
                volume_group: truncate(&safe_str(volume.get("vg")), SHORT_TEXT_LIMIT),
                logical_volume: truncate(&safe_str(volume.get("lv")), SHORT_TEXT_LIMIT),
                device_path,
                size_mb: safe_int(volume.get("size_mb"), 0),
                mountpoint,
            }
        })
        .collect()
}

fn parse_user_accounts(document: &Value) -> Vec<UserAccount> {
    expect_array(document.get("user_accounts"))
        .iter()
        .filter(|account| !safe_str(account.get("username")).is_empty())
        .map(|account| UserAccount {
            username: truncate(&safe_str(account.get("username")), 64),
            uid: safe_int(account.get("uid"), -1),
            gid: safe_int(account.get("gid"), -1),
            shell: truncate(&safe_str(account.get("shell")), SHORT_TEXT_LIMIT),
            home_dir: truncate(&safe_str(account.get("home_dir")), SHORT_TEXT_LIMIT),
            has_login: safe_bool(account.get("has_login")),
            groups: truncate(&safe_str(account.get("groups")), LONG_TEXT_LIMIT),
        })
        .collect()
}

fn parse_processes(document: &Value) -> Vec<ProcessRecord> {
    expect_array(document.get("processes"))
        .iter()
        .filter(|process| safe_int(process.get("pid"), 0) > 0)
        .map(|process| ProcessRecord {
            pid: safe_int(process.get("pid"), 0),
            ppid: safe_int(process.get("ppid"), 0),
            process_user: truncate(&safe_str(process.get("user")), 64),
            cpu_pct: safe_float(process.get("cpu_pct"), 0.0),
            mem_mb: safe_float(process.get("mem_mb"), 0.0),
            command: truncate(&safe_str(process.get("command")), SHORT_TEXT_LIMIT),
            full_path: truncate(&safe_str(process.get("full_path")), SHORT_TEXT_LIMIT),
            args: truncate(&safe_str(process.get("args")), LONG_TEXT_LIMIT),
            cgroup: truncate(&safe_str(process.get("cgroup")), SHORT_TEXT_LIMIT),
            fd_count: process.get("fd_count").and_then(Value::as_i64),
        })
        .collect()
}

fn parse_log_entries(document: &Value) -> Vec<ServerLogEntry> {
    expect_array(document.get("logs"))
        .iter()
        .filter(|entry| !safe_str(entry.get("line")).is_empty())
        .map(|entry| ServerLogEntry {
            source: truncate(&safe_str(entry.get("source")), SHORT_TEXT_LIMIT),
            severity: truncate(&safe_str(entry.get("severity")), 32),
            line: truncate(&safe_str(entry.get("line")), LONG_TEXT_LIMIT),
        })
        .collect()
}

// ------------------------------------------------------------------
// CONVERSIÓN CONTRATO -> FILA
// ------------------------------------------------------------------

fn text(value: &str) -> SqlValue {
    SqlValue::Text(value.to_string())
}

fn opt_int(value: Option<i64>) -> SqlValue {
    match value {
        Some(number) => SqlValue::Integer(number),
        None => SqlValue::Null,
    }
}

fn service_row(service: &Service) -> Vec<SqlValue> {
    vec![
        text(&service.name),
        SqlValue::Integer(service.port),
        text(&service.protocol),
        text(&service.bind_address),
        text(&service.state),
        opt_int(service.pid),
    ]
}

fn mount_row(mount: &Mount) -> Vec<SqlValue> {
    vec![
        text(&mount.device),
        text(&mount.mountpoint),
        text(&mount.filesystem),
        SqlValue::Integer(mount.size_mb),
        SqlValue::Integer(mount.used_mb),
        opt_int(mount.use_pct),
    ]
}

fn interface_row(interface: &NetworkInterface) -> Vec<SqlValue> {
    vec![
        text(&interface.name),
        text(&interface.ip),
        text(&interface.mac),
        text(&interface.state),
        SqlValue::Integer(interface.mtu),
        SqlValue::Integer(interface.rx_bytes),
        SqlValue::Integer(interface.tx_bytes),
    ]
}

fn container_row(container: &DockerContainer) -> Vec<SqlValue> {
    vec![
        text(&container.container_id),
        text(&container.name),
        text(&container.image),
        text(&container.state),
        text(&container.ports),
        text(&container.networks),
        text(&container.env),
        text(&container.volumes),
    ]
}

fn cron_row(entry: &CronEntry) -> Vec<SqlValue> {
    vec![
        text(&entry.cron_user),
        text(&entry.schedule),
        text(&entry.command),
        text(&entry.source),
    ]
}

fn systemd_row(unit: &SystemdUnit) -> Vec<SqlValue> {
    vec![
        text(&unit.name),
        text(&unit.unit_type),
        text(&unit.active_state),
        text(&unit.sub_state),
        opt_int(unit.main_pid),
        opt_int(unit.memory_mb),
        opt_int(unit.cpu_seconds),
        SqlValue::Integer(unit.enabled as i64),
    ]
}

fn certificate_row(certificate: &SslCertificate) -> Vec<SqlValue> {
    vec![
        text(&certificate.path),
        text(&certificate.subject),
        text(&certificate.issuer),
        text(&certificate.valid_from),
        text(&certificate.valid_to),
        SqlValue::Integer(certificate.is_expired as i64),
        SqlValue::Integer(certificate.days_left),
        text(&certificate.san_domains),
    ]
}

fn lvm_row(volume: &LvmVolume) -> Vec<SqlValue> {
    vec![
        text(&volume.volume_group),
        text(&volume.logical_volume),
        text(&volume.device_path),
        SqlValue::Integer(volume.size_mb),
        match &volume.mountpoint {
            Some(point) => text(point),
            None => SqlValue::Null,
        },
    ]
}

fn user_row(account: &UserAccount) -> Vec<SqlValue> {
    vec![
        text(&account.username),
        SqlValue::Integer(account.uid),
        SqlValue::Integer(account.gid),
        text(&account.shell),
        text(&account.home_dir),
        SqlValue::Integer(account.has_login as i64),
        text(&account.groups),
    ]
}

fn process_row(process: &ProcessRecord) -> Vec<SqlValue> {
    vec![
        SqlValue::Integer(process.pid),
        SqlValue::Integer(process.ppid),
        text(&process.process_user),
        SqlValue::Real(process.cpu_pct),
        SqlValue::Real(process.mem_mb),
        text(&process.command),
        text(&process.full_path),
        text(&process.args),
        text(&process.cgroup),
        opt_int(process.fd_count),
    ]
}

fn log_row(entry: &ServerLogEntry) -> Vec<SqlValue> {
    vec![text(&entry.source), text(&entry.severity), text(&entry.line)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn certify_service_projection_dedup() {
        let document = json!({
            "listeners": [
                {"process": "nginx", "port": 80, "protocol": "tcp", "bind": "0.0.0.0", "state": "LISTEN", "pid": 100},
                {"process": "nginx", "port": 80, "protocol": "tcp", "bind": "::", "state": "LISTEN", "pid": 100},
                {"process": "nginx", "port": 443, "protocol": "tcp", "bind": "0.0.0.0", "state": "LISTEN", "pid": 100},
                {"process": "", "port": 53, "protocol": "udp", "bind": "127.0.0.53", "state": "UNCONN"}
            ]
        });

        let services = parse_services(&document);
        // IPv4+IPv6 del mismo (proceso, puerto, protocolo) colapsan.
        assert_eq!(services.len(), 3);

        // El listener sin proceso cae al nombre 'unknown'.
        assert!(services.iter().any(|service| service.name == "unknown"));
    }

    #[test]
    fn certify_systemd_retention_filter() {
        let document = json!({
            "systemd_units": [
                {"name": "sshd.service", "active_state": "active", "sub_state": "running", "enabled": true},
                {"name": "old.service", "active_state": "inactive", "sub_state": "dead", "enabled": false},
                {"name": "broken.service", "active_state": "failed", "sub_state": "failed", "enabled": true}
            ]
        });

        let units = parse_systemd_units(&document);
        assert_eq!(units.len(), 2);
        assert!(units.iter().any(|unit| unit.name == "broken.service"));
    }

    #[test]
    fn certify_lvm_mount_enrichment() {
        let document = json!({
            "mounts": [
                {"device": "/dev/mapper/vg0-data", "mountpoint": "/data", "fs": "ext4", "size_mb": 1000, "used_mb": 10, "use_pct": 1}
            ],
            "lvm": [
                {"vg": "vg0", "lv": "data", "path": "/dev/mapper/vg0-data", "size_mb": 1000},
                {"vg": "vg0", "lv": "scratch", "path": "/dev/mapper/vg0-scratch", "size_mb": 500}
            ]
        });

        let volumes = parse_lvm_volumes(&document);
        assert_eq!(volumes.len(), 2);
        assert_eq!(volumes[0].mountpoint.as_deref(), Some("/data"));
        assert!(volumes[1].mountpoint.is_none());
    }

    #[test]
    fn certify_numeric_coercion_tolerance() {
        let document = json!({
            "mounts": [
                {"device": "/dev/sda1", "mountpoint": "/", "fs": "ext4",
                 "size_mb": "102400", "used_mb": "51200", "use_pct": "50"}
            ]
        });

        let mounts = parse_mounts(&document);
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].size_mb, 102400);
        assert_eq!(mounts[0].use_pct, Some(50));
    }

    #[test]
    fn certify_cpu_info_composition() {
        assert_eq!(
            compose_cpu_info("Intel(R) Xeon(R) E5-2680", 8),
            "Intel(R) Xeon(R) E5-2680 (8 cores)"
        );
        assert_eq!(compose_cpu_info("", 4), "4 cores");
    }

    #[test]
    fn certify_string_truncation_limits() {
        let oversized_args = "a".repeat(9000);
        let document = json!({
            "processes": [{
                "pid": 42, "ppid": 1, "user": "root", "cpu_pct": 1.5, "mem_mb": 10.0,
                "command": "daemon", "full_path": "/usr/bin/daemon",
                "args": oversized_args, "cgroup": "0::/", "fd_count": 4
            }]
        });

        let processes = parse_processes(&document);
        assert_eq!(processes[0].args.len(), 4000);
    }
}
