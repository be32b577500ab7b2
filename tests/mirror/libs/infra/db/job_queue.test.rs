// [tests/mirror/libs/infra/db/job_queue.test.rs]
/*!
 * =================================================================
 * APARATO: CERTIFICADOR DE COLA DURABLE (V1.1)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L3-MIRROR
 * RESPONSABILIDAD: AUDITORÍA DE RESERVA ATÓMICA, BACKOFF Y ZOMBIES
 *
 * # Mathematical Proof (Identity Law):
 * El id 'queue:<target>' con rechazo de duplicados vivos garantiza
 * que un disparo programado y uno manual jamás coexistan para el
 * mismo host en las tablas activas.
 * =================================================================
 */

use serde_json::json;

use sysmap_domain_models::jobs::{JobStatus, QueueName};
use sysmap_infra_db::repositories::JobRepository;
use sysmap_infra_db::{DbClient, DbError};

async fn age_column(client: &DbClient, job_id: &str, column: &str, minutes_ago: i64) {
    let connection = client.get_connection().unwrap();
    let past_stamp = (chrono::Utc::now() - chrono::Duration::minutes(minutes_ago))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string();

    connection
        .execute(
            &format!("UPDATE jobs SET {} = ?2 WHERE id = ?1", column),
            libsql::params![job_id, past_stamp],
        )
        .await
        .unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    /**
     * Identidad, reserva atómica, backoff exponencial hasta la muerte
     * del job y reciclaje del objetivo terminal.
     */
    #[tokio::test]
    async fn certify_queue_identity_and_backoff() {
        println!("\n📬 [INICIO]: Auditoría de Cola Durable V1.1...");

        let database_client =
            DbClient::connect("file:job_queue_test?mode=memory&cache=shared", None)
                .await
                .unwrap();
        let job_repository = JobRepository::new(database_client.clone());

        // --- 1. IDENTIDAD: el duplicado vivo se rechaza ---
        let job_id = job_repository
            .enqueue(QueueName::ServerScan, "host-1", json!({"host_id": "host-1"}))
            .await
            .unwrap();
        assert_eq!(job_id, "server-scan:host-1");

        let duplicate_verdict = job_repository
            .enqueue(QueueName::ServerScan, "host-1", json!({"host_id": "host-1"}))
            .await;
        assert!(matches!(duplicate_verdict, Err(DbError::DuplicateActiveJob(_))));

        // --- 2. RESERVA ATÓMICA ---
        let claimed_job = job_repository
            .claim_next(QueueName::ServerScan)
            .await
            .unwrap()
            .expect("the queued job must be claimable");
        assert_eq!(claimed_job.id, job_id);
        assert_eq!(claimed_job.status, JobStatus::Active);
        assert_eq!(claimed_job.attempt, 1);
        assert_eq!(claimed_job.max_attempts, 3);

        assert!(job_repository.claim_next(QueueName::ServerScan).await.unwrap().is_none());

        // --- 3. BACKOFF: el fallo re-encola hacia el futuro ---
        let after_first_failure = job_repository
            .fail(&job_id, "connection refused by target")
            .await
            .unwrap();
        assert_eq!(after_first_failure, JobStatus::Queued);

        // La compuerta temporal mantiene el job invisible.
        assert!(job_repository.claim_next(QueueName::ServerScan).await.unwrap().is_none());

        // Avanzamos el reloj del job y agotamos el presupuesto.
        age_column(&database_client, &job_id, "next_attempt_at", 5).await;
        let second_claim = job_repository.claim_next(QueueName::ServerScan).await.unwrap().unwrap();
        assert_eq!(second_claim.attempt, 2);
        job_repository.fail(&job_id, "connection refused again").await.unwrap();

        age_column(&database_client, &job_id, "next_attempt_at", 5).await;
        let third_claim = job_repository.claim_next(QueueName::ServerScan).await.unwrap().unwrap();
        assert_eq!(third_claim.attempt, 3);

        let terminal_verdict = job_repository.fail(&job_id, "still refused").await.unwrap();
        assert_eq!(terminal_verdict, JobStatus::Dead);

        let dead_job = job_repository.get(&job_id).await.unwrap();
        assert_eq!(dead_job.failure_reason.as_deref(), Some("still refused"));

        // --- 4. RECICLAJE: el objetivo terminal vuelve a encolarse ---
        let recycled_id = job_repository
            .enqueue(QueueName::ServerScan, "host-1", json!({"host_id": "host-1"}))
            .await
            .unwrap();
        assert_eq!(recycled_id, job_id);

        println!("✅ [VEREDICTO]: Identidad y backoff certificados.");
    }

    /**
     * El motivo de fallo se captura verbatim con tope de 2000
     * caracteres, y el cierre permanente ignora el presupuesto.
     */
    #[tokio::test]
    async fn certify_failure_capture_and_permanent_death() {
        let database_client =
            DbClient::connect("file:job_perm_test?mode=memory&cache=shared", None)
                .await
                .unwrap();
        let job_repository = JobRepository::new(database_client.clone());

        let job_id = job_repository
            .enqueue(QueueName::NetworkScan, "10.0.0.0/24", json!({"subnet": "10.0.0.0/24"}))
            .await
            .unwrap();
        job_repository.claim_next(QueueName::NetworkScan).await.unwrap().unwrap();

        let oversized_reason = "x".repeat(5000);
        job_repository.fail_permanently(&job_id, &oversized_reason).await.unwrap();

        let dead_job = job_repository.get(&job_id).await.unwrap();
        assert_eq!(dead_job.status, JobStatus::Dead);
        assert_eq!(dead_job.failure_reason.unwrap().len(), 2000);
    }

    /**
     * Jobs 'active' huérfanos vuelven a la cola en la recuperación.
     */
    #[tokio::test]
    async fn certify_zombie_recovery() {
        let database_client =
            DbClient::connect("file:job_zombie_test?mode=memory&cache=shared", None)
                .await
                .unwrap();
        let job_repository = JobRepository::new(database_client.clone());

        let job_id = job_repository
            .enqueue(QueueName::ProcessMap, "host-9", json!({"host_id": "host-9"}))
            .await
            .unwrap();
        job_repository.claim_next(QueueName::ProcessMap).await.unwrap().unwrap();

        // Sin envejecer, nada que recuperar.
        assert_eq!(job_repository.recover_zombies().await.unwrap(), 0);

        age_column(&database_client, &job_id, "updated_at", 31).await;
        assert_eq!(job_repository.recover_zombies().await.unwrap(), 1);

        let recovered_job = job_repository.get(&job_id).await.unwrap();
        assert_eq!(recovered_job.status, JobStatus::Queued);
    }

    /**
     * Compuerta de ritmo de server-scan: 10 arranques por ventana.
     */
    #[tokio::test]
    async fn certify_rate_gate() {
        let database_client =
            DbClient::connect("file:job_rate_test?mode=memory&cache=shared", None)
                .await
                .unwrap();
        let job_repository = JobRepository::new(database_client.clone());

        for target_index in 0..11 {
            job_repository
                .enqueue(
                    QueueName::ServerScan,
                    &format!("host-{}", target_index),
                    json!({"host_id": format!("host-{}", target_index)}),
                )
                .await
                .unwrap();
        }

        let mut claimed_count = 0;
        while job_repository.claim_next(QueueName::ServerScan).await.unwrap().is_some() {
            claimed_count += 1;
        }

        // El undécimo job queda retenido por la compuerta.
        assert_eq!(claimed_count, 10);
    }
}
