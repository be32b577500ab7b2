// [libs/domain/models/src/inventory.rs]
/*!
 * =================================================================
 * APARATO: INVENTORY CHILD CONTRACTS (V4.1)
 * CLASIFICACIÓN: DOMAIN MODELS (ESTRATO L2)
 * RESPONSABILIDAD: COLECCIONES HIJAS DEL HOST (REEMPLAZO ATÓMICO)
 *
 * Cada colección se reemplaza por completo en cada escaneo dentro de
 * la transacción del mapeador; ninguna fila sobrevive entre ciclos.
 * =================================================================
 */

use serde::{Deserialize, Serialize};

/// Servicio en escucha, derivado de la sección `listeners`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub name: String,
    pub port: i64,
    pub protocol: String,
    pub bind_address: String,
    pub state: String,
    pub pid: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Mount {
    pub device: String,
    pub mountpoint: String,
    pub filesystem: String,
    pub size_mb: i64,
    pub used_mb: i64,
    pub use_pct: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkInterface {
    pub name: String,
    pub ip: String,
    pub mac: String,
    pub state: String,
    pub mtu: i64,
    pub rx_bytes: i64,
    pub tx_bytes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DockerContainer {
    pub container_id: String,
    pub name: String,
    pub image: String,
    pub state: String,
    /// Mapeos de puertos serializados tal como los reporta el demonio.
    pub ports: String,
    pub networks: String,
    /// Variables de entorno ya enmascaradas por el recolector.
    pub env: String,
    pub volumes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CronEntry {
    pub cron_user: String,
    pub schedule: String,
    pub command: String,
    /// crontab de usuario, /etc/crontab o fragmento de /etc/cron.d.
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemdUnit {
    pub name: String,
    pub unit_type: String,
    pub active_state: String,
    pub sub_state: String,
    pub main_pid: Option<i64>,
    pub memory_mb: Option<i64>,
    pub cpu_seconds: Option<i64>,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SslCertificate {
    pub path: String,
    pub subject: String,
    pub issuer: String,
    pub valid_from: String,
    pub valid_to: String,
    pub is_expired: bool,
    pub days_left: i64,
    pub san_domains: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LvmVolume {
    pub volume_group: String,
    pub logical_volume: String,
    pub device_path: String,
    pub size_mb: i64,
    /// Enriquecido por el mapeador uniendo contra mounts por device path.
    pub mountpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserAccount {
    pub username: String,
    pub uid: i64,
    pub gid: i64,
    pub shell: String,
    pub home_dir: String,
    pub has_login: bool,
    pub groups: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessRecord {
    pub pid: i64,
    pub ppid: i64,
    pub process_user: String,
    pub cpu_pct: f64,
    pub mem_mb: f64,
    pub command: String,
    pub full_path: String,
    pub args: String,
    pub cgroup: String,
    pub fd_count: Option<i64>,
}

/// Línea de log retenida de la colección más reciente.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerLogEntry {
    pub source: String,
    pub severity: String,
    pub line: String,
}

/// Conteos devueltos por el mapeador tras una transacción exitosa.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MapCounts {
    pub services: usize,
    pub mounts: usize,
    pub interfaces: usize,
    pub containers: usize,
    pub cron_entries: usize,
    pub systemd_units: usize,
    pub certificates: usize,
    pub lvm_volumes: usize,
    pub user_accounts: usize,
    pub processes: usize,
    pub log_entries: usize,
}
