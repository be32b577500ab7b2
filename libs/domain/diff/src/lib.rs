// [libs/domain/diff/src/lib.rs]
/*!
 * =================================================================
 * APARATO: SNAPSHOT DIFF ENGINE (V4.6 - THREE WAY SEALED)
 * CLASIFICACIÓN: DOMAIN ENGINE (ESTRATO L2)
 * RESPONSABILIDAD: COMPARACIÓN TIPADA ENTRE SNAPSHOTS CONSECUTIVOS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. CHECKSUM LAW: el checksum estable excluye 'processes'; igualdad
 *    de checksums implica cero eventos de diff.
 * 2. KEYED COMPARE: added (llave solo en nuevo), removed (solo en
 *    viejo), modified (misma llave, JSON canónico distinto).
 * 3. SEVERITY TABLE: mapeo determinista por categoría y tipo de
 *    cambio, con umbrales de disco en 90/95.
 * 4. META SENTINEL: deriva un evento sintético 'meta:<campos>' cuando
 *    el server_meta cambia; warning si OS o kernel mutaron.
 * =================================================================
 */

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use sysmap_core_document::{canonical_json, checksum, safe_bool, safe_int, safe_str};
use sysmap_domain_models::snapshot::{ChangeType, DiffCategory, Severity};

/// Evento candidato, previo a persistencia (sin ids ni host).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiffDraft {
    pub category: DiffCategory,
    pub change_type: ChangeType,
    pub item_key: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub severity: Severity,
}

/// Categorías comparables del documento estable con su llave de sección.
const COMPARED_SECTIONS: &[(DiffCategory, &str)] = &[
    (DiffCategory::Services, "services"),
    (DiffCategory::Mounts, "mounts"),
    (DiffCategory::Containers, "containers"),
    (DiffCategory::SystemdUnits, "systemd_units"),
    (DiffCategory::CronEntries, "cron_entries"),
    (DiffCategory::Certificates, "certificates"),
    (DiffCategory::UserAccounts, "user_accounts"),
    (DiffCategory::Interfaces, "interfaces"),
];

// ------------------------------------------------------------------
// CHECKSUM ESTABLE
// ------------------------------------------------------------------

/**
 * SHA-256 del documento estable excluyendo la sección volátil
 * 'processes'. Determinista ante reordenamiento de llaves.
 */
pub fn stable_checksum(stable_document: &Value) -> String {
    let mut pruned_document = stable_document.clone();
    if let Some(document_object) = pruned_document.as_object_mut() {
        document_object.remove("processes");
    }
    checksum(&pruned_document)
}

// ------------------------------------------------------------------
// LLAVES DE ITEM POR CATEGORÍA
// ------------------------------------------------------------------

/// Llave determinista por categoría; estable ante reordenamientos.
pub fn item_key_for(category: DiffCategory, entry: &Value) -> String {
    match category {
        DiffCategory::Services => format!(
            "{}:{}:{}",
            safe_str(entry.get("name")),
            safe_int(entry.get("port"), 0),
            safe_str(entry.get("protocol")),
        ),
        DiffCategory::Mounts => safe_str(entry.get("mountpoint")),
        DiffCategory::Containers => safe_str(entry.get("name")),
        DiffCategory::SystemdUnits => safe_str(entry.get("name")),
        DiffCategory::CronEntries => format!(
            "{}:{}:{}",
            safe_str(entry.get("user")),
            safe_str(entry.get("schedule")),
            safe_str(entry.get("command")),
        ),
        DiffCategory::Certificates => safe_str(entry.get("path")),
        DiffCategory::UserAccounts => format!(
            "{}:{}",
            safe_str(entry.get("username")),
            safe_int(entry.get("uid"), -1),
        ),
        DiffCategory::Interfaces => safe_str(entry.get("name")),
        DiffCategory::ServerMeta => "meta".to_string(),
    }
}

// ------------------------------------------------------------------
// COMPARACIÓN A TRES VÍAS
// ------------------------------------------------------------------

/**
 * Computa los eventos de diff entre dos documentos estables.
 *
 * El llamador debe cortocircuitar antes por igualdad de checksums;
 * esta función asume que los documentos difieren en algo.
 */
pub fn compute_diffs(old_document: &Value, new_document: &Value) -> Vec<DiffDraft> {
    let mut drafts = Vec::new();

    for (category, section_key) in COMPARED_SECTIONS {
        let old_items = keyed_section(*category, old_document.get(*section_key));
        let new_items = keyed_section(*category, new_document.get(*section_key));

        // ADDED: llave presente en nuevo, ausente en viejo.
        for (item_key, new_entry) in &new_items {
            if !old_items.contains_key(item_key) {
                drafts.push(DiffDraft {
                    category: *category,
                    change_type: ChangeType::Added,
                    item_key: item_key.clone(),
                    old_value: None,
                    new_value: Some(new_entry.clone()),
                    severity: severity_for(*category, ChangeType::Added, None, Some(new_entry)),
                });
            }
        }

        // REMOVED: llave presente en viejo, ausente en nuevo.
        for (item_key, old_entry) in &old_items {
            if !new_items.contains_key(item_key) {
                drafts.push(DiffDraft {
                    category: *category,
                    change_type: ChangeType::Removed,
                    item_key: item_key.clone(),
                    old_value: Some(old_entry.clone()),
                    new_value: None,
                    severity: severity_for(*category, ChangeType::Removed, Some(old_entry), None),
                });
            }
        }

        // MODIFIED: misma llave, forma canónica distinta.
        for (item_key, new_entry) in &new_items {
            if let Some(old_entry) = old_items.get(item_key) {
                if canonical_json(old_entry) != canonical_json(new_entry) {
                    drafts.push(DiffDraft {
                        category: *category,
                        change_type: ChangeType::Modified,
                        item_key: item_key.clone(),
                        old_value: Some(old_entry.clone()),
                        new_value: Some(new_entry.clone()),
                        severity: severity_for(
                            *category,
                            ChangeType::Modified,
                            Some(old_entry),
                            Some(new_entry),
                        ),
                    });
                }
            }
        }
    }

    if let Some(meta_event) = server_meta_event(old_document, new_document) {
        drafts.push(meta_event);
    }

    drafts
}

/// Sección indexada por llave de item. BTreeMap fija el orden de
/// emisión de eventos, útil para pruebas deterministas.
fn keyed_section(category: DiffCategory, section: Option<&Value>) -> BTreeMap<String, Value> {
    let mut keyed_items = BTreeMap::new();

    if let Some(Value::Array(items)) = section {
        for entry in items {
            let item_key = item_key_for(category, entry);
            if !item_key.is_empty() && item_key != ":0:" {
                keyed_items.insert(item_key, entry.clone());
            }
        }
    }

    keyed_items
}

// ------------------------------------------------------------------
// EVENTO SINTÉTICO DE SERVER META
// ------------------------------------------------------------------

const META_FIELDS: &[&str] = &["hostname", "os", "kernel", "cpu", "memory_mb"];

fn server_meta_event(old_document: &Value, new_document: &Value) -> Option<DiffDraft> {
    let old_meta = old_document.get("server_meta")?;
    let new_meta = new_document.get("server_meta")?;

    let changed_fields: Vec<&str> = META_FIELDS
        .iter()
        .filter(|field| {
            canonical_json(old_meta.get(**field).unwrap_or(&Value::Null))
                != canonical_json(new_meta.get(**field).unwrap_or(&Value::Null))
        })
        .copied()
        .collect();

    if changed_fields.is_empty() {
        return None;
    }

    // OS o kernel mutando es señal seria; el resto es informativo.
    let severity = if changed_fields.contains(&"os") || changed_fields.contains(&"kernel") {
        Severity::Warning
    } else {
        Severity::Info
    };

    Some(DiffDraft {
        category: DiffCategory::ServerMeta,
        change_type: ChangeType::Modified,
        item_key: format!("meta:{}", changed_fields.join(",")),
        old_value: Some(old_meta.clone()),
        new_value: Some(new_meta.clone()),
        severity,
    })
}

// ------------------------------------------------------------------
// TABLA DE SEVERIDADES
// ------------------------------------------------------------------

fn severity_for(
    category: DiffCategory,
    change_type: ChangeType,
    old_value: Option<&Value>,
    new_value: Option<&Value>,
) -> Severity {
    match (category, change_type) {
        (DiffCategory::UserAccounts, ChangeType::Added | ChangeType::Removed) => Severity::Warning,

        (DiffCategory::Certificates, ChangeType::Removed) => Severity::Critical,
        (DiffCategory::Certificates, ChangeType::Modified) => {
            let expired_now = new_value
                .map(|entry| safe_bool(entry.get("is_expired")))
                .unwrap_or(false);
            if expired_now { Severity::Critical } else { Severity::Warning }
        }

        (DiffCategory::Services, ChangeType::Added | ChangeType::Removed) => Severity::Warning,

        (DiffCategory::SystemdUnits, ChangeType::Modified) => {
            let failed_now = new_value
                .map(|entry| safe_str(entry.get("active_state")) == "failed")
                .unwrap_or(false);
            if failed_now { Severity::Critical } else { Severity::Warning }
        }
        (DiffCategory::SystemdUnits, _) => Severity::Warning,

        (DiffCategory::Containers, _) => Severity::Warning,

        (DiffCategory::Mounts, ChangeType::Added | ChangeType::Removed) => Severity::Warning,
        (DiffCategory::Mounts, ChangeType::Modified) => {
            let use_pct = new_value
                .or(old_value)
                .map(|entry| safe_int(entry.get("use_pct"), -1))
                .unwrap_or(-1);
            if use_pct >= 95 {
                Severity::Critical
            } else if use_pct >= 90 {
                Severity::Warning
            } else {
                Severity::Info
            }
        }

        _ => Severity::Info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_document() -> Value {
        json!({
            "services": [{"name": "sshd", "port": 22, "protocol": "tcp"}],
            "mounts": [{"mountpoint": "/", "device": "/dev/sda1", "use_pct": 40, "size_mb": 100000, "used_mb": 40000}],
            "containers": [],
            "systemd_units": [{"name": "sshd.service", "active_state": "active", "sub_state": "running", "enabled": true}],
            "cron_entries": [],
            "certificates": [],
            "user_accounts": [{"username": "root", "uid": 0}],
            "interfaces": [{"name": "eth0", "ip": "10.0.0.5"}],
            "processes": [{"pid": 1, "command": "systemd", "cpu_pct": 0.1}],
            "process_count": 120,
            "server_meta": {"hostname": "h1", "os": "Debian 12", "kernel": "6.1.0", "cpu": "Xeon x4", "memory_mb": 16000}
        })
    }

    /**
     * LEY DEL CHECKSUM: documentos idénticos salvo procesos deben
     * sellar igual; un cambio estable debe romper el sello.
     */
    #[test]
    fn certify_checksum_excludes_processes() {
        let first = base_document();

        let mut second = base_document();
        second["processes"] = json!([{"pid": 999, "command": "stress", "cpu_pct": 99.0}]);
        assert_eq!(stable_checksum(&first), stable_checksum(&second));

        let mut third = base_document();
        third["services"] = json!([{"name": "sshd", "port": 2222, "protocol": "tcp"}]);
        assert_ne!(stable_checksum(&first), stable_checksum(&third));
    }

    /**
     * Escenario de referencia: un listener nginx:80/tcp aparece en el
     * segundo escaneo. Exactamente un evento services/added con llave
     * "nginx:80:tcp" y severidad warning.
     */
    #[test]
    fn certify_service_added_scenario() {
        let old_document = base_document();
        let mut new_document = base_document();
        new_document["services"] = json!([
            {"name": "sshd", "port": 22, "protocol": "tcp"},
            {"name": "nginx", "port": 80, "protocol": "tcp"}
        ]);

        let drafts = compute_diffs(&old_document, &new_document);
        assert_eq!(drafts.len(), 1);

        let event = &drafts[0];
        assert_eq!(event.category, DiffCategory::Services);
        assert_eq!(event.change_type, ChangeType::Added);
        assert_eq!(event.item_key, "nginx:80:tcp");
        assert_eq!(event.severity, Severity::Warning);
        assert!(event.old_value.is_none());
    }

    #[test]
    fn certify_identical_documents_yield_zero_events() {
        assert!(compute_diffs(&base_document(), &base_document()).is_empty());
    }

    /**
     * Umbral de disco: exactamente 90 produce warning y exactamente 95
     * produce critical.
     */
    #[test]
    fn certify_disk_usage_boundaries() {
        for (use_pct, expected) in [
            (89, Severity::Info),
            (90, Severity::Warning),
            (94, Severity::Warning),
            (95, Severity::Critical),
            (99, Severity::Critical),
        ] {
            let old_document = base_document();
            let mut new_document = base_document();
            new_document["mounts"] = json!([
                {"mountpoint": "/", "device": "/dev/sda1", "use_pct": use_pct, "size_mb": 100000, "used_mb": 90000}
            ]);

            let drafts = compute_diffs(&old_document, &new_document);
            assert_eq!(drafts.len(), 1, "use_pct={}", use_pct);
            assert_eq!(drafts[0].severity, expected, "use_pct={}", use_pct);
        }
    }

    /// Montaje modificado sin use_pct parseable cae a info.
    #[test]
    fn certify_mount_modified_without_use_pct() {
        let old_document = base_document();
        let mut new_document = base_document();
        new_document["mounts"] = json!([
            {"mountpoint": "/", "device": "/dev/sdb1", "size_mb": 100000, "used_mb": 40000}
        ]);

        let drafts = compute_diffs(&old_document, &new_document);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].severity, Severity::Info);
    }

    #[test]
    fn certify_certificate_severities() {
        // Removido → critical.
        let mut old_document = base_document();
        old_document["certificates"] = json!([
            {"path": "/etc/ssl/a.pem", "is_expired": false, "days_left": 100, "valid_to": "2027-01-01"}
        ]);
        let new_document = base_document();

        let drafts = compute_diffs(&old_document, &new_document);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].change_type, ChangeType::Removed);
        assert_eq!(drafts[0].severity, Severity::Critical);

        // Modificado a expirado → critical; modificado vigente → warning.
        let mut newer_document = base_document();
        newer_document["certificates"] = json!([
            {"path": "/etc/ssl/a.pem", "is_expired": true, "days_left": 0, "valid_to": "2027-01-01"}
        ]);
        let drafts = compute_diffs(&old_document, &newer_document);
        assert_eq!(drafts[0].severity, Severity::Critical);

        let mut renewed_document = base_document();
        renewed_document["certificates"] = json!([
            {"path": "/etc/ssl/a.pem", "is_expired": false, "days_left": 364, "valid_to": "2028-01-01"}
        ]);
        let drafts = compute_diffs(&old_document, &renewed_document);
        assert_eq!(drafts[0].severity, Severity::Warning);
    }

    #[test]
    fn certify_systemd_failed_transition() {
        let old_document = base_document();
        let mut new_document = base_document();
        new_document["systemd_units"] = json!([
            {"name": "sshd.service", "active_state": "failed", "sub_state": "failed", "enabled": true}
        ]);

        let drafts = compute_diffs(&old_document, &new_document);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].severity, Severity::Critical);

        // Modificación sin caída a failed → warning.
        let mut restarted_document = base_document();
        restarted_document["systemd_units"] = json!([
            {"name": "sshd.service", "active_state": "active", "sub_state": "reloading", "enabled": true}
        ]);
        let drafts = compute_diffs(&old_document, &restarted_document);
        assert_eq!(drafts[0].severity, Severity::Warning);
    }

    #[test]
    fn certify_user_account_changes_warn() {
        let old_document = base_document();
        let mut new_document = base_document();
        new_document["user_accounts"] = json!([
            {"username": "root", "uid": 0},
            {"username": "intruder", "uid": 1001}
        ]);

        let drafts = compute_diffs(&old_document, &new_document);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].item_key, "intruder:1001");
        assert_eq!(drafts[0].severity, Severity::Warning);
    }

    /**
     * El server_meta cambiado emite un único evento sintético con los
     * campos mutados en la llave; kernel cambiado eleva a warning.
     */
    #[test]
    fn certify_server_meta_sentinel() {
        let old_document = base_document();
        let mut new_document = base_document();
        new_document["server_meta"]["kernel"] = json!("6.6.0");
        new_document["server_meta"]["memory_mb"] = json!(32000);

        let drafts = compute_diffs(&old_document, &new_document);
        assert_eq!(drafts.len(), 1);

        let meta_event = &drafts[0];
        assert_eq!(meta_event.category, DiffCategory::ServerMeta);
        assert_eq!(meta_event.item_key, "meta:kernel,memory_mb");
        assert_eq!(meta_event.severity, Severity::Warning);

        // Solo memoria: info.
        let mut memory_only = base_document();
        memory_only["server_meta"]["memory_mb"] = json!(32000);
        let drafts = compute_diffs(&old_document, &memory_only);
        assert_eq!(drafts[0].severity, Severity::Info);
        assert_eq!(drafts[0].item_key, "meta:memory_mb");
    }

    #[test]
    fn certify_mount_item_key_is_mountpoint() {
        let entry = json!({"mountpoint": "/var", "device": "/dev/sdb1"});
        assert_eq!(item_key_for(DiffCategory::Mounts, &entry), "/var");
    }
}
