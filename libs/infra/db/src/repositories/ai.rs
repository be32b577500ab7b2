// [libs/infra/db/src/repositories/ai.rs]
/*!
 * =================================================================
 * APARATO: AI ANALYSIS & LOCK REPOSITORY (V5.5 - CAS GUARDED)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: CONFIGURACIÓN LLM, CANDADO DE ESCRITOR Y ANÁLISIS
 *
 * # Mathematical Proof (Single Writer CAS):
 * La adquisición es un UPDATE condicional sobre la fila singleton:
 * exige lock_running=0 O un lease vencido (> 45 min). Exactamente un
 * worker observa filas_afectadas=1; el resto recibe LOCK_BUSY con el
 * holder actual. La liberación en arranque cubre el crash del worker.
 * =================================================================
 */

use chrono::Utc;
use libsql::params;
use serde_json::Value;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use sysmap_domain_models::ai::{AiAnalysis, AiPurpose, LlmProviderKind, LlmSettings};

use crate::errors::DbError;
use crate::repositories::{bool_at, float_at, int_at, now_stamp, opt_text_at, stamp_at, stamp_of, text_at};
use crate::DbClient;

pub struct AiRepository {
    database_client: DbClient,
}

impl AiRepository {
    pub fn new(client: DbClient) -> Self {
        Self { database_client: client }
    }

    // --------------------------------------------------------------
    // CONFIGURACIÓN SINGLETON
    // --------------------------------------------------------------

    /**
     * Garantiza la existencia de la fila singleton; la primera
     * aparición toma los valores bootstrap del entorno.
     */
    pub async fn ensure_settings(&self, bootstrap: &LlmSettings) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;

        connection
            .execute(
                "INSERT OR IGNORE INTO llm_settings
                     (id, provider, endpoint, api_credential, model, enabled,
                      summaries_enabled, anomaly_enabled, log_analysis_enabled,
                      temperature, max_tokens, context_tokens, timeout_secs)
                 VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    bootstrap.provider.as_str(),
                    bootstrap.endpoint.clone(),
                    bootstrap.api_credential.clone(),
                    bootstrap.model.clone(),
                    bootstrap.enabled as i64,
                    bootstrap.summaries_enabled as i64,
                    bootstrap.anomaly_enabled as i64,
                    bootstrap.log_analysis_enabled as i64,
                    bootstrap.temperature,
                    bootstrap.max_tokens,
                    bootstrap.context_tokens,
                    bootstrap.timeout_secs as i64
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn load_settings(&self) -> Result<LlmSettings, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT provider, endpoint, api_credential, model, enabled,
                        summaries_enabled, anomaly_enabled, log_analysis_enabled,
                        temperature, max_tokens, context_tokens, timeout_secs,
                        lock_running, lock_holder_host_id, lock_updated_at
                 FROM llm_settings WHERE id = 1",
                (),
            )
            .await?;

        let row = rows.next().await?.ok_or(DbError::LlmSettingsAbsent)?;

        Ok(LlmSettings {
            provider: LlmProviderKind::parse(&text_at(&row, 0))
                .unwrap_or(LlmProviderKind::Ollama),
            endpoint: text_at(&row, 1),
            api_credential: opt_text_at(&row, 2),
            model: text_at(&row, 3),
            enabled: bool_at(&row, 4),
            summaries_enabled: bool_at(&row, 5),
            anomaly_enabled: bool_at(&row, 6),
            log_analysis_enabled: bool_at(&row, 7),
            temperature: float_at(&row, 8),
            max_tokens: int_at(&row, 9),
            context_tokens: int_at(&row, 10),
            timeout_secs: int_at(&row, 11).max(1) as u64,
            lock_running: bool_at(&row, 12),
            lock_holder_host_id: opt_text_at(&row, 13),
            lock_updated_at: stamp_at(&row, 14),
        })
    }

    // --------------------------------------------------------------
    // CANDADO DE ESCRITOR ÚNICO
    // --------------------------------------------------------------

    /**
     * CAS de adquisición. Recupera en el acto los leases vencidos.
     *
     * # Errors:
     * `DbError::InferenceLockBusy` con el holder cuando el candado
     * pertenece a otro worker dentro del lease.
     */
    #[instrument(skip(self))]
    pub async fn acquire_lock(&self, holder_host_id: &str) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        let stale_threshold = stamp_of(
            Utc::now() - chrono::Duration::minutes(LlmSettings::LOCK_STALE_MINUTES),
        );

        let acquired_rows = connection
            .execute(
                "UPDATE llm_settings
                 SET lock_running = 1, lock_holder_host_id = ?1, lock_updated_at = ?2
                 WHERE id = 1
                   AND (lock_running = 0
                        OR lock_updated_at IS NULL
                        OR lock_updated_at < ?3)",
                params![holder_host_id, now_stamp(), stale_threshold],
            )
            .await?;

        if acquired_rows == 0 {
            let current_holder = self
                .load_settings()
                .await?
                .lock_holder_host_id
                .unwrap_or_else(|| "unknown".into());
            return Err(DbError::InferenceLockBusy(current_holder));
        }

        info!("🔒 [CORTEX_LOCK]: Acquired for host {}.", holder_host_id);
        Ok(())
    }

    /// Liberación del holder legítimo; un holder ajeno la ignora.
    pub async fn release_lock(&self, holder_host_id: &str) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;

        let released_rows = connection
            .execute(
                "UPDATE llm_settings
                 SET lock_running = 0, lock_holder_host_id = NULL, lock_updated_at = ?2
                 WHERE id = 1 AND lock_holder_host_id = ?1",
                params![holder_host_id, now_stamp()],
            )
            .await?;

        if released_rows == 0 {
            warn!("🔓 [CORTEX_LOCK]: Release by {} ignored (not the holder).", holder_host_id);
        }
        Ok(())
    }

    /**
     * Recuperación de arranque: un orquestador que renace libera
     * cualquier candado que un worker muerto dejara en pie.
     */
    pub async fn force_release_lock(&self) -> Result<bool, DbError> {
        let connection = self.database_client.get_connection()?;

        let released_rows = connection
            .execute(
                "UPDATE llm_settings
                 SET lock_running = 0, lock_holder_host_id = NULL, lock_updated_at = ?1
                 WHERE id = 1 AND lock_running = 1",
                params![now_stamp()],
            )
            .await?;

        if released_rows > 0 {
            warn!("🔓 [CORTEX_LOCK]: Crash-recovery release executed at startup.");
        }
        Ok(released_rows > 0)
    }

    /// Refresco del lease durante operaciones largas (process map).
    pub async fn touch_lock(&self, holder_host_id: &str) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                "UPDATE llm_settings SET lock_updated_at = ?2
                 WHERE id = 1 AND lock_holder_host_id = ?1 AND lock_running = 1",
                params![holder_host_id, now_stamp()],
            )
            .await?;
        Ok(())
    }

    // --------------------------------------------------------------
    // ANÁLISIS PERSISTIDOS
    // --------------------------------------------------------------

    /**
     * Persiste un análisis reemplazando la fila previa del mismo
     * (host, propósito): delete-then-insert, a lo sumo una fila viva.
     */
    #[instrument(skip(self, document, raw_prompt, raw_response), fields(host = %host_id, purpose = purpose.as_str()))]
    pub async fn save_analysis(
        &self,
        host_id: &str,
        purpose: AiPurpose,
        document: &Value,
        raw_prompt: &str,
        raw_response: &str,
        model_used: &str,
        duration_ms: i64,
    ) -> Result<String, DbError> {
        let connection = self.database_client.get_connection()?;
        let transaction = connection.transaction().await?;

        transaction
            .execute(
                "DELETE FROM ai_analyses WHERE host_id = ?1 AND purpose = ?2",
                params![host_id, purpose.as_str()],
            )
            .await?;

        let analysis_id = Uuid::new_v4().to_string();
        transaction
            .execute(
                "INSERT INTO ai_analyses (id, host_id, purpose, document, raw_prompt,
                                          raw_response, model_used, duration_ms, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    analysis_id.clone(),
                    host_id,
                    purpose.as_str(),
                    document.to_string(),
                    raw_prompt,
                    raw_response,
                    model_used,
                    duration_ms,
                    now_stamp()
                ],
            )
            .await?;

        transaction.commit().await?;
        Ok(analysis_id)
    }

    /// Marca temporal del último análisis (compuerta de 24 h del
    /// análisis de logs).
    pub async fn last_analysis_at(
        &self,
        host_id: &str,
        purpose: AiPurpose,
    ) -> Result<Option<chrono::DateTime<Utc>>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT created_at FROM ai_analyses
                 WHERE host_id = ?1 AND purpose = ?2
                 ORDER BY created_at DESC LIMIT 1",
                params![host_id, purpose.as_str()],
            )
            .await?;

        Ok(rows.next().await?.and_then(|row| stamp_at(&row, 0)))
    }

    pub async fn load_analysis(
        &self,
        host_id: &str,
        purpose: AiPurpose,
    ) -> Result<Option<AiAnalysis>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT id, host_id, purpose, document, raw_prompt, raw_response,
                        model_used, duration_ms, created_at
                 FROM ai_analyses WHERE host_id = ?1 AND purpose = ?2",
                params![host_id, purpose.as_str()],
            )
            .await?;

        Ok(rows.next().await?.map(|row| AiAnalysis {
            id: text_at(&row, 0),
            host_id: text_at(&row, 1),
            purpose: AiPurpose::parse(&text_at(&row, 2)).unwrap_or(purpose),
            document: opt_text_at(&row, 3)
                .and_then(|document_text| serde_json::from_str(&document_text).ok())
                .unwrap_or(Value::Null),
            raw_prompt: text_at(&row, 4),
            raw_response: text_at(&row, 5),
            model_used: text_at(&row, 6),
            duration_ms: int_at(&row, 7),
            created_at: stamp_at(&row, 8).unwrap_or_else(Utc::now),
        }))
    }
}
