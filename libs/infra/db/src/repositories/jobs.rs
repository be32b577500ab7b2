// [libs/infra/db/src/repositories/jobs.rs]
/*!
 * =================================================================
 * APARATO: DURABLE JOB QUEUE REPOSITORY (V5.6 - AT LEAST ONCE)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: COLAS DURABLES CON RESERVA ATÓMICA Y BACKOFF
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. IDENTITY LAW: el id 'queue:<target>' y el rechazo de duplicados
 *    vivos impiden que un disparo programado y uno manual coincidan.
 * 2. ATOMIC CLAIM: la reserva es un UPDATE condicional sobre
 *    status='queued'; la semántica es al-menos-una-vez y los jobs son
 *    idempotentes frente a re-ejecución.
 * 3. BACKOFF: fallo retriable re-encola con base * 2^(attempt-1);
 *    agotado el presupuesto la fila pasa a 'dead' para el post-mortem.
 * 4. RATE GATE: server-scan respeta 10 arranques por ventana de 60 s.
 * =================================================================
 */

use chrono::Utc;
use libsql::params;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use sysmap_domain_models::jobs::{JobProgress, JobRecord, JobStatus, QueueName};

use crate::errors::DbError;
use crate::repositories::{int_at, now_stamp, opt_text_at, stamp_at, stamp_of, text_at};
use crate::DbClient;

/// Minutos tras los cuales un job 'active' huérfano se considera zombi.
const ZOMBIE_THRESHOLD_MINUTES: i64 = 30;

pub struct JobRepository {
    database_client: DbClient,
}

impl JobRepository {
    pub fn new(client: DbClient) -> Self {
        Self { database_client: client }
    }

    // --------------------------------------------------------------
    // ENCOLADO
    // --------------------------------------------------------------

    /**
     * Encola un job con identidad determinista.
     *
     * # Errors:
     * `DbError::DuplicateActiveJob` si ya existe un job vivo (queued o
     * active) para el mismo objetivo.
     */
    #[instrument(skip(self, payload))]
    pub async fn enqueue(
        &self,
        queue: QueueName,
        target_identifier: &str,
        payload: Value,
    ) -> Result<String, DbError> {
        let connection = self.database_client.get_connection()?;
        let job_id = JobRecord::compose_id(queue, target_identifier);

        // 1. RECHAZO DE DUPLICADO VIVO.
        let mut live_rows = connection
            .query(
                "SELECT status FROM jobs WHERE id = ?1 AND status IN ('queued', 'active')",
                params![job_id.clone()],
            )
            .await?;

        if live_rows.next().await?.is_some() {
            return Err(DbError::DuplicateActiveJob(job_id));
        }

        // 2. LA HISTORIA TERMINAL DEL MISMO OBJETIVO SE RECICLA.
        connection
            .execute(
                "DELETE FROM jobs WHERE id = ?1 AND status IN ('completed', 'failed', 'dead')",
                params![job_id.clone()],
            )
            .await?;

        let policy = queue.policy();
        connection
            .execute(
                "INSERT INTO jobs (id, queue, payload, status, attempt, max_attempts,
                                   next_attempt_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 'queued', 0, ?4, ?5, ?5, ?5)",
                params![
                    job_id.clone(),
                    queue.as_str(),
                    payload.to_string(),
                    (policy.max_retries + 1) as i64,
                    now_stamp()
                ],
            )
            .await?;

        info!("📬 [QUEUE]: Job {} enqueued on {}.", job_id, queue.as_str());
        Ok(job_id)
    }

    // --------------------------------------------------------------
    // RESERVA ATÓMICA
    // --------------------------------------------------------------

    /**
     * Reserva el job más antiguo listo de la cola. `None` cuando la
     * cola está vacía o la compuerta de ritmo está cerrada.
     */
    pub async fn claim_next(&self, queue: QueueName) -> Result<Option<JobRecord>, DbError> {
        let connection = self.database_client.get_connection()?;

        // COMPUERTA DE RITMO.
        if let Some(rate_limit) = queue.policy().rate_limit {
            let window_start = stamp_of(
                Utc::now() - chrono::Duration::seconds(rate_limit.window_secs as i64),
            );
            let mut rate_rows = connection
                .query(
                    "SELECT COUNT(*) FROM jobs WHERE queue = ?1 AND started_at >= ?2",
                    params![queue.as_str(), window_start],
                )
                .await?;
            let started_in_window =
                rate_rows.next().await?.map(|row| int_at(&row, 0)).unwrap_or(0);

            if started_in_window >= rate_limit.max_jobs as i64 {
                debug!("⏳ [QUEUE]: Rate gate closed for {} ({} in window).", queue.as_str(), started_in_window);
                return Ok(None);
            }
        }

        // Dos vueltas cubren la carrera entre la selección y el CAS.
        for _claim_round in 0..2 {
            let mut candidate_rows = connection
                .query(
                    "SELECT id FROM jobs
                     WHERE queue = ?1 AND status = 'queued' AND next_attempt_at <= ?2
                     ORDER BY created_at ASC LIMIT 1",
                    params![queue.as_str(), now_stamp()],
                )
                .await?;

            let Some(candidate_row) = candidate_rows.next().await? else {
                return Ok(None);
            };
            let candidate_id = text_at(&candidate_row, 0);

            let claimed_rows = connection
                .execute(
                    "UPDATE jobs
                     SET status = 'active', attempt = attempt + 1,
                         started_at = ?2, updated_at = ?2
                     WHERE id = ?1 AND status = 'queued'",
                    params![candidate_id.clone(), now_stamp()],
                )
                .await?;

            if claimed_rows == 1 {
                return Ok(Some(self.get(&candidate_id).await?));
            }
            // Otro worker ganó el CAS; segunda vuelta.
        }

        Ok(None)
    }

    pub async fn get(&self, job_id: &str) -> Result<JobRecord, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(&format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS), params![job_id])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(job_from_row(&row)),
            None => Err(DbError::JobNotFound),
        }
    }

    // --------------------------------------------------------------
    // PROGRESO Y CIERRE
    // --------------------------------------------------------------

    /// Registro de progreso observable por llamadores externos.
    pub async fn update_progress(
        &self,
        job_id: &str,
        progress: &JobProgress,
    ) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                "UPDATE jobs SET progress = ?2, updated_at = ?3 WHERE id = ?1",
                params![
                    job_id,
                    serde_json::to_string(progress)
                        .map_err(|fault| DbError::MappingError(fault.to_string()))?,
                    now_stamp()
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn complete(&self, job_id: &str) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                "UPDATE jobs SET status = 'completed', finished_at = ?2, updated_at = ?2
                 WHERE id = ?1",
                params![job_id, now_stamp()],
            )
            .await?;
        Ok(())
    }

    /**
     * Cierre fallido. Con presupuesto restante re-encola con backoff
     * exponencial; agotado, la fila muere para el post-mortem.
     */
    #[instrument(skip(self, failure_reason))]
    pub async fn fail(&self, job_id: &str, failure_reason: &str) -> Result<JobStatus, DbError> {
        let job = self.get(job_id).await?;
        let connection = self.database_client.get_connection()?;

        // Motivo verbatim, primeros 2000 caracteres.
        let truncated_reason: String = failure_reason.chars().take(2000).collect();

        if job.attempt >= job.max_attempts {
            connection
                .execute(
                    "UPDATE jobs SET status = 'dead', failure_reason = ?2,
                                     finished_at = ?3, updated_at = ?3
                     WHERE id = ?1",
                    params![job_id, truncated_reason, now_stamp()],
                )
                .await?;

            warn!("⚰️ [QUEUE]: Job {} exhausted its attempt budget.", job_id);
            return Ok(JobStatus::Dead);
        }

        let policy = job.queue.policy();
        let backoff_secs =
            policy.backoff_base_secs.saturating_mul(1u64 << (job.attempt.saturating_sub(1)));
        let next_attempt_stamp =
            stamp_of(Utc::now() + chrono::Duration::seconds(backoff_secs as i64));

        connection
            .execute(
                "UPDATE jobs SET status = 'queued', failure_reason = ?2,
                                 next_attempt_at = ?3, updated_at = ?4
                 WHERE id = ?1",
                params![job_id, truncated_reason, next_attempt_stamp, now_stamp()],
            )
            .await?;

        info!("🔁 [QUEUE]: Job {} requeued with {}s backoff.", job_id, backoff_secs);
        Ok(JobStatus::Queued)
    }

    /**
     * Cierre permanente sin consumo de reintentos: los fallos no
     * retriables (auth, DNS, documento malformado) matan el job en el
     * acto sin importar el presupuesto restante.
     */
    pub async fn fail_permanently(&self, job_id: &str, failure_reason: &str) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;

        connection
            .execute(
                "UPDATE jobs SET status = 'dead', failure_reason = ?2,
                                 finished_at = ?3, updated_at = ?3
                 WHERE id = ?1",
                params![
                    job_id,
                    failure_reason.chars().take(2000).collect::<String>(),
                    now_stamp()
                ],
            )
            .await?;

        warn!("⚰️ [QUEUE]: Job {} terminated permanently (non-retriable fault).", job_id);
        Ok(())
    }

    // --------------------------------------------------------------
    // RECUPERACIÓN Y SALUD
    // --------------------------------------------------------------

    /**
     * Re-encola jobs 'active' huérfanos (worker muerto). Corre en el
     * arranque del orquestador y en el tick de recuperación.
     */
    pub async fn recover_zombies(&self) -> Result<usize, DbError> {
        let connection = self.database_client.get_connection()?;
        let zombie_threshold =
            stamp_of(Utc::now() - chrono::Duration::minutes(ZOMBIE_THRESHOLD_MINUTES));

        let recovered_rows = connection
            .execute(
                "UPDATE jobs SET status = 'queued', next_attempt_at = ?2, updated_at = ?2
                 WHERE status = 'active' AND updated_at < ?1",
                params![zombie_threshold, now_stamp()],
            )
            .await? as usize;

        if recovered_rows > 0 {
            warn!("💀 [QUEUE]: Recovered {} zombie jobs back to queued.", recovered_rows);
        }
        Ok(recovered_rows)
    }

    /// Fallos de las últimas 24 h (agregación de salud del scheduler).
    pub async fn failure_count_last_24h(&self) -> Result<i64, DbError> {
        let connection = self.database_client.get_connection()?;
        let window_start = stamp_of(Utc::now() - chrono::Duration::hours(24));

        let mut rows = connection
            .query(
                "SELECT COUNT(*) FROM jobs
                 WHERE status IN ('failed', 'dead') AND updated_at >= ?1",
                params![window_start],
            )
            .await?;

        Ok(rows.next().await?.map(|row| int_at(&row, 0)).unwrap_or(0))
    }

    pub async fn active_count(&self, queue: QueueName) -> Result<i64, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT COUNT(*) FROM jobs WHERE queue = ?1 AND status = 'active'",
                params![queue.as_str()],
            )
            .await?;

        Ok(rows.next().await?.map(|row| int_at(&row, 0)).unwrap_or(0))
    }
}

const JOB_COLUMNS: &str = "id, queue, payload, status, attempt, max_attempts, \
                           next_attempt_at, progress, failure_reason, created_at, \
                           started_at, finished_at";

fn job_from_row(row: &libsql::Row) -> JobRecord {
    JobRecord {
        id: text_at(row, 0),
        queue: QueueName::parse(&text_at(row, 1)).unwrap_or(QueueName::ServerScan),
        payload: opt_text_at(row, 2)
            .and_then(|payload_text| serde_json::from_str(&payload_text).ok())
            .unwrap_or(Value::Null),
        status: JobStatus::parse(&text_at(row, 3)),
        attempt: int_at(row, 4).max(0) as u32,
        max_attempts: int_at(row, 5).max(1) as u32,
        next_attempt_at: stamp_at(row, 6),
        progress: opt_text_at(row, 7)
            .and_then(|progress_text| serde_json::from_str(&progress_text).ok()),
        failure_reason: opt_text_at(row, 8),
        created_at: stamp_at(row, 9).unwrap_or_else(Utc::now),
        started_at: stamp_at(row, 10),
        finished_at: stamp_at(row, 11),
    }
}
