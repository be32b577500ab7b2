// [libs/infra/db/src/repositories/network.rs]
/*!
 * APARATO: NETWORK SCAN REPOSITORY
 * RESPONSABILIDAD: Registros de descubrimiento de subred con
 * programación opcional y recuperación de corridas obsoletas.
 */

use chrono::Utc;
use libsql::params;
use serde_json::Value;
use tracing::{instrument, warn};
use uuid::Uuid;

use sysmap_domain_models::jobs::{NetworkScan, NetworkScanStatus};

use crate::errors::DbError;
use crate::repositories::{int_at, now_stamp, opt_text_at, stamp_at, stamp_of, text_at};
use crate::DbClient;

pub struct NetworkScanRepository {
    database_client: DbClient,
}

impl NetworkScanRepository {
    pub fn new(client: DbClient) -> Self {
        Self { database_client: client }
    }

    pub async fn create(&self, subnet: &str, schedule: Option<&str>) -> Result<String, DbError> {
        let connection = self.database_client.get_connection()?;
        let scan_id = Uuid::new_v4().to_string();

        connection
            .execute(
                "INSERT INTO network_scans (id, subnet, schedule, status, updated_at)
                 VALUES (?1, ?2, ?3, 'idle', ?4)",
                params![scan_id.clone(), subnet, schedule, now_stamp()],
            )
            .await?;
        Ok(scan_id)
    }

    pub async fn get(&self, scan_id: &str) -> Result<Option<NetworkScan>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(&format!("SELECT {} FROM network_scans WHERE id = ?1", SCAN_COLUMNS), params![scan_id])
            .await?;

        Ok(rows.next().await?.map(|row| scan_from_row(&row)))
    }

    /// Descubrimientos con expresión de programación no nula.
    pub async fn list_scheduled(&self) -> Result<Vec<NetworkScan>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!(
                    "SELECT {} FROM network_scans
                     WHERE schedule IS NOT NULL AND schedule != ''",
                    SCAN_COLUMNS
                ),
                (),
            )
            .await?;

        let mut scans = Vec::new();
        while let Some(row) = rows.next().await? {
            scans.push(scan_from_row(&row));
        }
        Ok(scans)
    }

    pub async fn mark_running(&self, scan_id: &str) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                "UPDATE network_scans SET status = 'running', started_at = ?2,
                                          last_error = NULL, updated_at = ?2
                 WHERE id = ?1",
                params![scan_id, now_stamp()],
            )
            .await?;
        Ok(())
    }

    pub async fn mark_completed(
        &self,
        scan_id: &str,
        hosts_found: i64,
        results: &Value,
    ) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                "UPDATE network_scans SET status = 'completed', finished_at = ?2,
                                          hosts_found = ?3, results = ?4, updated_at = ?2
                 WHERE id = ?1",
                params![scan_id, now_stamp(), hosts_found, results.to_string()],
            )
            .await?;
        Ok(())
    }

    pub async fn mark_failed(&self, scan_id: &str, error_message: &str) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                "UPDATE network_scans SET status = 'failed', finished_at = ?2,
                                          last_error = ?3, updated_at = ?2
                 WHERE id = ?1",
                params![
                    scan_id,
                    now_stamp(),
                    error_message.chars().take(2000).collect::<String>()
                ],
            )
            .await?;
        Ok(())
    }

    /**
     * Recuperación de obsoletos: corridas 'running' más allá del
     * umbral pasan a 'failed'.
     */
    #[instrument(skip(self))]
    pub async fn force_stale_to_failed(
        &self,
        stale_threshold_minutes: i64,
    ) -> Result<usize, DbError> {
        let connection = self.database_client.get_connection()?;
        let threshold_stamp =
            stamp_of(Utc::now() - chrono::Duration::minutes(stale_threshold_minutes));

        let failed_rows = connection
            .execute(
                "UPDATE network_scans SET status = 'failed',
                                          last_error = 'scan timeout', updated_at = ?2
                 WHERE status = 'running' AND updated_at < ?1",
                params![threshold_stamp, now_stamp()],
            )
            .await? as usize;

        if failed_rows > 0 {
            warn!("💀 [NETSCAN]: Forced {} stale network scans to failed.", failed_rows);
        }
        Ok(failed_rows)
    }
}

const SCAN_COLUMNS: &str = "id, subnet, schedule, status, started_at, finished_at, \
                            last_error, hosts_found, results, updated_at";

fn scan_from_row(row: &libsql::Row) -> NetworkScan {
    NetworkScan {
        id: text_at(row, 0),
        subnet: text_at(row, 1),
        schedule: opt_text_at(row, 2),
        status: NetworkScanStatus::parse(&text_at(row, 3)),
        started_at: stamp_at(row, 4),
        finished_at: stamp_at(row, 5),
        last_error: opt_text_at(row, 6),
        hosts_found: int_at(row, 7),
        results: opt_text_at(row, 8).and_then(|results_text| serde_json::from_str(&results_text).ok()),
        updated_at: stamp_at(row, 9),
    }
}
