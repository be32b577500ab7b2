// [libs/infra/db/src/repositories/edges.rs]
/*!
 * =================================================================
 * APARATO: CONNECTION EDGE REPOSITORY (V5.2 - WHOLESALE REPLACE)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: PERSISTENCIA DEL GRAFO DE LLAMADAS POR HOST
 *
 * Las aristas salientes de un host se reemplazan al por mayor en cada
 * pasada del correlador. La llave única (source, ip, port, process)
 * absorbe duplicados tardíos con INSERT OR IGNORE.
 * =================================================================
 */

use libsql::params;
use tracing::{debug, instrument};
use uuid::Uuid;

use sysmap_domain_models::topology::{ConnectionEdge, DetectionMethod, EdgeDraft};

use crate::errors::DbError;
use crate::repositories::{bool_at, int_at, opt_text_at, text_at};
use crate::DbClient;

pub struct EdgeRepository {
    database_client: DbClient,
}

impl EdgeRepository {
    pub fn new(client: DbClient) -> Self {
        Self { database_client: client }
    }

    /**
     * Reemplaza las aristas salientes del host. Devuelve el total
     * efectivamente insertado.
     */
    #[instrument(skip(self, drafts), fields(host = %source_host_id, drafts = drafts.len()))]
    pub async fn replace_for_host(
        &self,
        source_host_id: &str,
        drafts: &[EdgeDraft],
    ) -> Result<usize, DbError> {
        let connection = self.database_client.get_connection()?;
        let transaction = connection.transaction().await?;

        transaction
            .execute(
                "DELETE FROM connection_edges WHERE source_host_id = ?1",
                params![source_host_id],
            )
            .await?;

        let mut inserted_total = 0usize;

        for draft in drafts {
            // La columna usa '' (no NULL) para que la unicidad absorba
            // duplicados sin proceso origen.
            let source_process = draft.source_process.clone().unwrap_or_default();

            inserted_total += transaction
                .execute(
                    "INSERT OR IGNORE INTO connection_edges
                         (id, source_host_id, target_host_id, target_ip, target_port,
                          source_process, detection_method, details, is_external)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        Uuid::new_v4().to_string(),
                        source_host_id,
                        draft.target_host_id.clone(),
                        draft.target_ip.clone(),
                        draft.target_port,
                        source_process,
                        draft.detection_method.as_str(),
                        draft.details.clone(),
                        draft.is_external() as i64
                    ],
                )
                .await? as usize;
        }

        transaction.commit().await?;

        debug!("🕸️ [EDGES]: Host {} now owns {} outgoing edges.", source_host_id, inserted_total);
        Ok(inserted_total)
    }

    pub async fn edges_of(&self, source_host_id: &str) -> Result<Vec<ConnectionEdge>, DbError> {
        let connection = self.database_client.get_connection()?;

        let mut rows = connection
            .query(
                "SELECT id, source_host_id, target_host_id, target_ip, target_port,
                        source_process, detection_method, details, is_external
                 FROM connection_edges WHERE source_host_id = ?1
                 ORDER BY target_ip, target_port",
                params![source_host_id],
            )
            .await?;

        let mut edges = Vec::new();
        while let Some(row) = rows.next().await? {
            edges.push(ConnectionEdge {
                id: text_at(&row, 0),
                source_host_id: text_at(&row, 1),
                target_host_id: opt_text_at(&row, 2),
                target_ip: text_at(&row, 3),
                target_port: int_at(&row, 4),
                source_process: opt_text_at(&row, 5),
                detection_method: DetectionMethod::parse(&text_at(&row, 6))
                    .unwrap_or(DetectionMethod::Socket),
                details: text_at(&row, 7),
                is_external: bool_at(&row, 8),
            });
        }
        Ok(edges)
    }
}
