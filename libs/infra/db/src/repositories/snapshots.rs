// [libs/infra/db/src/repositories/snapshots.rs]
/*!
 * =================================================================
 * APARATO: SNAPSHOT HISTORY REPOSITORY (V5.5 - DENSE NUMBERING)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: HISTORIA APPEND-ONLY Y EMISIÓN DE EVENTOS DE DIFF
 *
 * # Mathematical Proof (Dense Monotonicity):
 * El índice único (host_id, scan_number) y la asignación
 * newScanNumber = prior + 1 garantizan numeración densa y monótona
 * por host. Una colisión de numeración es un bug de concurrencia y
 * aflora como SnapshotCollision, jamás se absorbe.
 * =================================================================
 */

use libsql::params;
use serde_json::{json, Value};
use tracing::{info, instrument};
use uuid::Uuid;

use sysmap_core_document::{safe_float, safe_int};
use sysmap_domain_diff::{compute_diffs, stable_checksum, DiffDraft};
use sysmap_domain_models::snapshot::{ChangeType, DiffCategory, DiffEvent, Severity, Snapshot};

use crate::errors::DbError;
use crate::repositories::{
    bool_at, hosts::HostRepository, int_at, now_stamp, opt_text_at, stamp_at, text_at,
};
use crate::DbClient;

/// Tope de procesos retenidos en el documento estable.
const STABLE_PROCESS_CAP: usize = 50;

/// Veredicto de una pasada de snapshot-and-diff.
#[derive(Debug, Clone)]
pub struct SnapshotOutcome {
    pub snapshot_id: String,
    pub scan_number: i64,
    pub diff_count: usize,
    pub is_first_scan: bool,
    /// Eventos emitidos, para el motor de reglas y el córtex.
    pub diffs: Vec<DiffDraft>,
}

pub struct SnapshotRepository {
    database_client: DbClient,
}

impl SnapshotRepository {
    pub fn new(client: DbClient) -> Self {
        Self { database_client: client }
    }

    /**
     * Construye el documento estable, sella el snapshot y emite los
     * eventos de diff contra el snapshot previo.
     */
    #[instrument(skip(self), fields(host = %host_id))]
    pub async fn snapshot_and_diff(&self, host_id: &str) -> Result<SnapshotOutcome, DbError> {
        let stable_document = self.build_stable_document(host_id).await?;
        let document_checksum = stable_checksum(&stable_document);

        let connection = self.database_client.get_connection()?;

        // SNAPSHOT PREVIO (numeración más alta).
        let mut prior_rows = connection
            .query(
                "SELECT id, scan_number, document, checksum FROM snapshots
                 WHERE host_id = ?1 ORDER BY scan_number DESC LIMIT 1",
                params![host_id],
            )
            .await?;

        let prior_snapshot = prior_rows.next().await?.map(|row| {
            (
                text_at(&row, 0),
                int_at(&row, 1),
                opt_text_at(&row, 2)
                    .and_then(|document_text| serde_json::from_str::<Value>(&document_text).ok())
                    .unwrap_or(Value::Null),
                text_at(&row, 3),
            )
        });

        let new_scan_number = prior_snapshot.as_ref().map(|(_, number, _, _)| number + 1).unwrap_or(1);
        let snapshot_id = Uuid::new_v4().to_string();

        let inserted_rows = connection
            .execute(
                "INSERT OR IGNORE INTO snapshots (id, host_id, scan_number, document, checksum, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    snapshot_id.clone(),
                    host_id,
                    new_scan_number,
                    stable_document.to_string(),
                    document_checksum.clone(),
                    now_stamp()
                ],
            )
            .await?;

        if inserted_rows == 0 {
            return Err(DbError::SnapshotCollision(new_scan_number));
        }

        // PRIMER ESCANEO: historia inaugurada, cero eventos.
        let Some((_, _, prior_document, prior_checksum)) = prior_snapshot else {
            info!("📸 [SNAPSHOT]: Host {} history inaugurated at scan 1.", host_id);
            return Ok(SnapshotOutcome {
                snapshot_id,
                scan_number: 1,
                diff_count: 0,
                is_first_scan: true,
                diffs: Vec::new(),
            });
        };

        // LEY DEL CHECKSUM: igualdad implica cero eventos.
        if prior_checksum == document_checksum {
            return Ok(SnapshotOutcome {
                snapshot_id,
                scan_number: new_scan_number,
                diff_count: 0,
                is_first_scan: false,
                diffs: Vec::new(),
            });
        }

        let diff_drafts = compute_diffs(&prior_document, &stable_document);
        self.persist_diff_events(host_id, &snapshot_id, &diff_drafts).await?;

        info!(
            "📸 [SNAPSHOT]: Host {} scan {} sealed with {} diff events.",
            host_id, new_scan_number, diff_drafts.len()
        );

        Ok(SnapshotOutcome {
            snapshot_id,
            scan_number: new_scan_number,
            diff_count: diff_drafts.len(),
            is_first_scan: false,
            diffs: diff_drafts,
        })
    }

    /// Emisión en un único lote de escritura.
    async fn persist_diff_events(
        &self,
        host_id: &str,
        snapshot_id: &str,
        drafts: &[DiffDraft],
    ) -> Result<(), DbError> {
        if drafts.is_empty() {
            return Ok(());
        }

        let connection = self.database_client.get_connection()?;
        let transaction = connection.transaction().await?;

        for draft in drafts {
            transaction
                .execute(
                    "INSERT INTO diff_events (id, host_id, snapshot_id, category, change_type,
                                              item_key, old_value, new_value, severity, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        Uuid::new_v4().to_string(),
                        host_id,
                        snapshot_id,
                        draft.category.as_str(),
                        draft.change_type.as_str(),
                        draft.item_key.clone(),
                        draft.old_value.as_ref().map(Value::to_string),
                        draft.new_value.as_ref().map(Value::to_string),
                        draft.severity.as_str(),
                        now_stamp()
                    ],
                )
                .await?;
        }

        transaction.commit().await?;
        Ok(())
    }

    // --------------------------------------------------------------
    // DOCUMENTO ESTABLE
    // --------------------------------------------------------------

    /**
     * Proyección estable del inventario actual. Los campos volátiles
     * (pids de servicio, contadores de interfaz, days_left) quedan
     * fuera para que el checksum no derive a diario sin cambios reales.
     */
    pub async fn build_stable_document(&self, host_id: &str) -> Result<Value, DbError> {
        let host_repository = HostRepository::new(self.database_client.clone());

        let host = host_repository.get(host_id).await?;
        let services = host_repository.services_of(host_id).await?;
        let mounts = host_repository.mounts_of(host_id).await?;
        let systemd_units = host_repository.systemd_units_of(host_id).await?;
        let certificates = host_repository.certificates_of(host_id).await?;

        // Certificados: validTo serializado ISO; days_left excluido.
        let stable_certificates: Vec<Value> = certificates
            .iter()
            .map(|certificate| {
                json!({
                    "path": certificate["path"],
                    "subject": certificate["subject"],
                    "issuer": certificate["issuer"],
                    "valid_from": certificate["valid_from"],
                    "valid_to": certificate["valid_to"],
                    "is_expired": certificate["is_expired"],
                })
            })
            .collect();

        let connection = self.database_client.get_connection()?;

        // Contenedores: identidad por nombre; estado e imagen cuentan.
        let mut container_rows = connection
            .query(
                "SELECT name, image, state, ports FROM containers WHERE host_id = ?1 ORDER BY name",
                params![host_id],
            )
            .await?;
        let mut containers = Vec::new();
        while let Some(row) = container_rows.next().await? {
            containers.push(json!({
                "name": text_at(&row, 0),
                "image": text_at(&row, 1),
                "state": text_at(&row, 2),
                "ports": text_at(&row, 3),
            }));
        }

        let mut cron_rows = connection
            .query(
                "SELECT cron_user, schedule, command, source FROM cron_entries
                 WHERE host_id = ?1 ORDER BY cron_user, command",
                params![host_id],
            )
            .await?;
        let mut cron_entries = Vec::new();
        while let Some(row) = cron_rows.next().await? {
            cron_entries.push(json!({
                "user": text_at(&row, 0),
                "schedule": text_at(&row, 1),
                "command": text_at(&row, 2),
                "source": text_at(&row, 3),
            }));
        }

        let mut user_rows = connection
            .query(
                "SELECT username, uid, gid, shell, home_dir, has_login FROM user_accounts
                 WHERE host_id = ?1 ORDER BY uid",
                params![host_id],
            )
            .await?;
        let mut user_accounts = Vec::new();
        while let Some(row) = user_rows.next().await? {
            user_accounts.push(json!({
                "username": text_at(&row, 0),
                "uid": int_at(&row, 1),
                "gid": int_at(&row, 2),
                "shell": text_at(&row, 3),
                "home_dir": text_at(&row, 4),
                "has_login": int_at(&row, 5) != 0,
            }));
        }

        let mut interface_rows = connection
            .query(
                "SELECT name, ip, mac, state, mtu FROM interfaces
                 WHERE host_id = ?1 ORDER BY name",
                params![host_id],
            )
            .await?;
        let mut interfaces = Vec::new();
        while let Some(row) = interface_rows.next().await? {
            interfaces.push(json!({
                "name": text_at(&row, 0),
                "ip": text_at(&row, 1),
                "mac": text_at(&row, 2),
                "state": text_at(&row, 3),
                "mtu": int_at(&row, 4),
            }));
        }

        // Procesos: top-50 por CPU + conteo total (excluidos del checksum).
        let all_processes = host_repository.processes_of(host_id).await?;
        let process_count = all_processes.len();
        let top_processes: Vec<Value> = all_processes
            .into_iter()
            .take(STABLE_PROCESS_CAP)
            .map(|process| {
                json!({
                    "pid": safe_int(process.get("pid"), 0),
                    "command": process["command"],
                    "user": process["user"],
                    "cpu_pct": safe_float(process.get("cpu_pct"), 0.0),
                    "mem_mb": safe_float(process.get("mem_mb"), 0.0),
                })
            })
            .collect();

        Ok(json!({
            "services": services,
            "mounts": mounts,
            "containers": containers,
            "systemd_units": systemd_units,
            "cron_entries": cron_entries,
            "certificates": stable_certificates,
            "user_accounts": user_accounts,
            "interfaces": interfaces,
            "processes": top_processes,
            "process_count": process_count,
            "server_meta": {
                "hostname": host.hostname,
                "os": host.os_info,
                "kernel": host.kernel_info,
                "cpu": host.cpu_info,
                "memory_mb": host.memory_mb,
            },
        }))
    }

    // --------------------------------------------------------------
    // LECTURAS DE HISTORIA
    // --------------------------------------------------------------

    pub async fn latest_snapshot(&self, host_id: &str) -> Result<Option<Snapshot>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT id, host_id, scan_number, document, checksum, created_at
                 FROM snapshots WHERE host_id = ?1 ORDER BY scan_number DESC LIMIT 1",
                params![host_id],
            )
            .await?;

        Ok(rows.next().await?.map(|row| Snapshot {
            id: text_at(&row, 0),
            host_id: text_at(&row, 1),
            scan_number: int_at(&row, 2),
            document: opt_text_at(&row, 3)
                .and_then(|document_text| serde_json::from_str(&document_text).ok())
                .unwrap_or(Value::Null),
            checksum: text_at(&row, 4),
            created_at: stamp_at(&row, 5).unwrap_or_else(chrono::Utc::now),
        }))
    }

    pub async fn events_for_snapshot(&self, snapshot_id: &str) -> Result<Vec<DiffEvent>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT id, host_id, snapshot_id, category, change_type, item_key,
                        old_value, new_value, severity, acknowledged, created_at
                 FROM diff_events WHERE snapshot_id = ?1 ORDER BY item_key",
                params![snapshot_id],
            )
            .await?;

        let mut events = Vec::new();
        while let Some(row) = rows.next().await? {
            let Some(category) = DiffCategory::parse(&text_at(&row, 3)) else {
                continue;
            };

            events.push(DiffEvent {
                id: text_at(&row, 0),
                host_id: text_at(&row, 1),
                snapshot_id: text_at(&row, 2),
                category,
                change_type: match text_at(&row, 4).as_str() {
                    "added" => ChangeType::Added,
                    "removed" => ChangeType::Removed,
                    _ => ChangeType::Modified,
                },
                item_key: text_at(&row, 5),
                old_value: opt_text_at(&row, 6)
                    .and_then(|value_text| serde_json::from_str(&value_text).ok()),
                new_value: opt_text_at(&row, 7)
                    .and_then(|value_text| serde_json::from_str(&value_text).ok()),
                severity: Severity::parse(&text_at(&row, 8)),
                acknowledged: bool_at(&row, 9),
                created_at: stamp_at(&row, 10).unwrap_or_else(chrono::Utc::now),
            });
        }
        Ok(events)
    }

    pub async fn latest_scan_number(&self, host_id: &str) -> Result<Option<i64>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT MAX(scan_number) FROM snapshots WHERE host_id = ?1",
                params![host_id],
            )
            .await?;

        Ok(rows.next().await?.and_then(|row| {
            match row.get_value(0) {
                Ok(libsql::Value::Integer(number)) => Some(number),
                _ => None,
            }
        }))
    }

    pub async fn diff_count_for_snapshot(&self, snapshot_id: &str) -> Result<i64, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT COUNT(*) FROM diff_events WHERE snapshot_id = ?1",
                params![snapshot_id],
            )
            .await?;

        Ok(rows.next().await?.map(|row| int_at(&row, 0)).unwrap_or(0))
    }
}
