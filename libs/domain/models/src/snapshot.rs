// [libs/domain/models/src/snapshot.rs]
/*!
 * =================================================================
 * APARATO: SNAPSHOT & DIFF CONTRACTS (V4.3 - CHECKSUM SEALED)
 * CLASIFICACIÓN: DOMAIN MODELS (ESTRATO L2)
 * RESPONSABILIDAD: HISTORIA DIRECCIONADA POR CONTENIDO Y EVENTOS TIPADOS
 *
 * # Mathematical Proof (Checksum Law):
 * Para dos snapshots consecutivos s1, s2 del mismo host:
 * checksum(s1) == checksum(s2) implica cero DiffEvents entre ambos.
 * El checksum cubre el subconjunto estable del documento (los procesos
 * quedan excluidos por volatilidad).
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Registro inmutable del subconjunto estable del inventario de un host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub host_id: String,
    /// Monótono y denso por host: 1, 2, 3…
    pub scan_number: i64,
    pub document: Value,
    /// SHA-256 hex de la serialización canónica sin procesos.
    pub checksum: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Removed,
    Modified,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Added => "added",
            ChangeType::Removed => "removed",
            ChangeType::Modified => "modified",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    // El orden de declaración fija el sort: critical < warning < info.
    Critical,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }

    pub fn parse(label: &str) -> Severity {
        match label {
            "critical" => Severity::Critical,
            "warning" => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

/// Categorías comparables del documento estable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffCategory {
    Services,
    Mounts,
    Containers,
    SystemdUnits,
    CronEntries,
    Certificates,
    UserAccounts,
    Interfaces,
    ServerMeta,
}

impl DiffCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiffCategory::Services => "services",
            DiffCategory::Mounts => "mounts",
            DiffCategory::Containers => "containers",
            DiffCategory::SystemdUnits => "systemd_units",
            DiffCategory::CronEntries => "cron_entries",
            DiffCategory::Certificates => "certificates",
            DiffCategory::UserAccounts => "user_accounts",
            DiffCategory::Interfaces => "interfaces",
            DiffCategory::ServerMeta => "server_meta",
        }
    }

    pub fn parse(label: &str) -> Option<DiffCategory> {
        match label {
            "services" => Some(DiffCategory::Services),
            "mounts" => Some(DiffCategory::Mounts),
            "containers" => Some(DiffCategory::Containers),
            "systemd_units" => Some(DiffCategory::SystemdUnits),
            "cron_entries" => Some(DiffCategory::CronEntries),
            "certificates" => Some(DiffCategory::Certificates),
            "user_accounts" => Some(DiffCategory::UserAccounts),
            "interfaces" => Some(DiffCategory::Interfaces),
            "server_meta" => Some(DiffCategory::ServerMeta),
            _ => None,
        }
    }
}

/// Cambio tipado {added|removed|modified} entre dos snapshots consecutivos.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffEvent {
    pub id: String,
    pub host_id: String,
    pub snapshot_id: String,
    pub category: DiffCategory,
    pub change_type: ChangeType,
    /// Determinista por categoría: service "name:port:protocol",
    /// mount "mountpoint", user "username:uid".
    pub item_key: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub severity: Severity,
    pub acknowledged: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    /**
     * El orden derivado debe colocar critical antes que warning antes
     * que info (llave de ordenamiento de las vistas de alerta).
     */
    #[test]
    fn certify_severity_sort_key() {
        let mut severities = vec![Severity::Info, Severity::Critical, Severity::Warning];
        severities.sort();
        assert_eq!(
            severities,
            vec![Severity::Critical, Severity::Warning, Severity::Info]
        );
    }

    #[test]
    fn certify_category_labels_round_trip() {
        for category in [
            DiffCategory::Services,
            DiffCategory::Mounts,
            DiffCategory::Containers,
            DiffCategory::SystemdUnits,
            DiffCategory::CronEntries,
            DiffCategory::Certificates,
            DiffCategory::UserAccounts,
            DiffCategory::Interfaces,
            DiffCategory::ServerMeta,
        ] {
            assert_eq!(DiffCategory::parse(category.as_str()), Some(category));
        }
    }
}
