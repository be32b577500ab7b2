// [libs/infra/db/src/repositories/audit.rs]
/*!
 * APARATO: AUDIT TRAIL REPOSITORY
 * RESPONSABILIDAD: Rastro de auditoría de toda ruta de escritura,
 * identificando principal y desenlace.
 */

use libsql::params;
use tracing::instrument;
use uuid::Uuid;

use crate::errors::DbError;
use crate::repositories::now_stamp;
use crate::DbClient;

pub struct AuditRepository {
    database_client: DbClient,
}

impl AuditRepository {
    pub fn new(client: DbClient) -> Self {
        Self { database_client: client }
    }

    /**
     * Registra una entrada. El rastro jamás aborta la operación que lo
     * origina: el llamador decide si ignora el error.
     */
    #[instrument(skip(self, detail))]
    pub async fn record(
        &self,
        principal: &str,
        action: &str,
        subject: &str,
        outcome: &str,
        detail: Option<&str>,
    ) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;

        connection
            .execute(
                "INSERT INTO audit_log (id, principal, action, subject, outcome, detail, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    Uuid::new_v4().to_string(),
                    principal,
                    action,
                    subject,
                    outcome,
                    detail.map(|text| text.chars().take(2000).collect::<String>()),
                    now_stamp()
                ],
            )
            .await?;
        Ok(())
    }
}
