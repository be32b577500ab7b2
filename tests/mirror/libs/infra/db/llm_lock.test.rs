// [tests/mirror/libs/infra/db/llm_lock.test.rs]
/*!
 * =================================================================
 * APARATO: CERTIFICADOR DEL CANDADO DE ESCRITOR ÚNICO (V1.1)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L3-MIRROR
 * RESPONSABILIDAD: AUDITORÍA CAS, LEASE DE 45 MIN Y PHOENIX RELEASE
 *
 * # Mathematical Proof (Single Writer):
 * El UPDATE condicional sobre la fila singleton admite exactamente un
 * ganador; el perdedor recibe el holder actual. Un lease con más de
 * 45 minutos es recuperable por el siguiente adquirente.
 * =================================================================
 */

use sysmap_domain_models::ai::{LlmProviderKind, LlmSettings};
use sysmap_infra_db::repositories::AiRepository;
use sysmap_infra_db::{DbClient, DbError};

fn bootstrap_settings() -> LlmSettings {
    LlmSettings {
        provider: LlmProviderKind::Ollama,
        endpoint: "http://127.0.0.1:11434".into(),
        api_credential: None,
        model: "qwen2.5:7b".into(),
        enabled: true,
        summaries_enabled: true,
        anomaly_enabled: true,
        log_analysis_enabled: true,
        temperature: 0.2,
        max_tokens: 2048,
        context_tokens: 8192,
        timeout_secs: 300,
        lock_running: false,
        lock_holder_host_id: None,
        lock_updated_at: None,
    }
}

async fn age_lock(client: &DbClient, minutes_ago: i64) {
    let connection = client.get_connection().unwrap();
    let past_stamp = (chrono::Utc::now() - chrono::Duration::minutes(minutes_ago))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string();

    connection
        .execute(
            "UPDATE llm_settings SET lock_updated_at = ?1 WHERE id = 1",
            libsql::params![past_stamp],
        )
        .await
        .unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    /**
     * CAS: un ganador, un perdedor con holder; liberación solo por el
     * dueño legítimo.
     */
    #[tokio::test]
    async fn certify_cas_mutual_exclusion() {
        println!("\n🔒 [INICIO]: Auditoría del Candado de Escritor Único V1.1...");

        let database_client =
            DbClient::connect("file:llm_lock_test?mode=memory&cache=shared", None)
                .await
                .unwrap();
        let ai_repository = AiRepository::new(database_client.clone());
        ai_repository.ensure_settings(&bootstrap_settings()).await.unwrap();

        // Ganador único.
        ai_repository.acquire_lock("host-a").await.unwrap();

        // El contendiente recibe al holder.
        match ai_repository.acquire_lock("host-b").await {
            Err(DbError::InferenceLockBusy(holder)) => assert_eq!(holder, "host-a"),
            _ => panic!("expected LOCK_BUSY with the current holder"),
        }

        // La liberación ajena se ignora; el candado sigue en pie.
        ai_repository.release_lock("host-b").await.unwrap();
        assert!(ai_repository.load_settings().await.unwrap().lock_running);

        // El dueño legítimo libera y el contendiente entra.
        ai_repository.release_lock("host-a").await.unwrap();
        ai_repository.acquire_lock("host-b").await.unwrap();

        println!("✅ [VEREDICTO]: Exclusión mutua CAS certificada.");
    }

    /**
     * A lo sumo una fila por (host, propósito): la segunda escritura
     * reemplaza la primera (delete-then-insert).
     */
    #[tokio::test]
    async fn certify_analysis_single_row_per_purpose() {
        let database_client =
            DbClient::connect("file:llm_analysis_test?mode=memory&cache=shared", None)
                .await
                .unwrap();
        let ai_repository = AiRepository::new(database_client.clone());
        ai_repository.ensure_settings(&bootstrap_settings()).await.unwrap();

        use sysmap_domain_models::ai::AiPurpose;
        let first_document = serde_json::json!({"purpose": "edge proxy"});
        let second_document = serde_json::json!({"purpose": "database host"});

        ai_repository
            .save_analysis("host-a", AiPurpose::ServerSummary, &first_document, "p1", "r1", "m", 10)
            .await
            .unwrap();
        ai_repository
            .save_analysis("host-a", AiPurpose::ServerSummary, &second_document, "p2", "r2", "m", 20)
            .await
            .unwrap();

        let surviving_analysis = ai_repository
            .load_analysis("host-a", AiPurpose::ServerSummary)
            .await
            .unwrap()
            .expect("one analysis must survive");
        assert_eq!(surviving_analysis.document["purpose"], "database host");
        assert_eq!(surviving_analysis.duration_ms, 20);

        // Conteo duro: exactamente una fila viva.
        let connection = database_client.get_connection().unwrap();
        let mut rows = connection
            .query(
                "SELECT COUNT(*) FROM ai_analyses WHERE host_id = 'host-a' AND purpose = 'server_summary'",
                (),
            )
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert!(matches!(row.get_value(0).unwrap(), libsql::Value::Integer(1)));
    }

    /**
     * Lease de 45 minutos: 44 min sigue firme, 46 min es recuperable.
     */
    #[tokio::test]
    async fn certify_stale_lease_reclaim() {
        let database_client =
            DbClient::connect("file:llm_lease_test?mode=memory&cache=shared", None)
                .await
                .unwrap();
        let ai_repository = AiRepository::new(database_client.clone());
        ai_repository.ensure_settings(&bootstrap_settings()).await.unwrap();

        ai_repository.acquire_lock("host-a").await.unwrap();

        // Dentro del lease: el candado resiste.
        age_lock(&database_client, 44).await;
        assert!(matches!(
            ai_repository.acquire_lock("host-b").await,
            Err(DbError::InferenceLockBusy(_))
        ));

        // Lease vencido: el siguiente adquirente lo reclama.
        age_lock(&database_client, 46).await;
        ai_repository.acquire_lock("host-b").await.unwrap();

        let settings = ai_repository.load_settings().await.unwrap();
        assert_eq!(settings.lock_holder_host_id.as_deref(), Some("host-b"));
    }

    /**
     * Phoenix release: el arranque libera cualquier candado huérfano y
     * el refresco de lease solo obedece al dueño.
     */
    #[tokio::test]
    async fn certify_startup_release_and_touch() {
        let database_client =
            DbClient::connect("file:llm_phoenix_test?mode=memory&cache=shared", None)
                .await
                .unwrap();
        let ai_repository = AiRepository::new(database_client.clone());
        ai_repository.ensure_settings(&bootstrap_settings()).await.unwrap();

        // Sin candado en pie, la liberación forzada es un no-op.
        assert!(!ai_repository.force_release_lock().await.unwrap());

        ai_repository.acquire_lock("host-a").await.unwrap();

        // El refresco del dueño mueve el lease; el ajeno no.
        age_lock(&database_client, 40).await;
        ai_repository.touch_lock("host-a").await.unwrap();
        assert!(matches!(
            ai_repository.acquire_lock("host-b").await,
            Err(DbError::InferenceLockBusy(_))
        ));

        // El renacer del orquestador barre el candado huérfano.
        assert!(ai_repository.force_release_lock().await.unwrap());
        assert!(!ai_repository.load_settings().await.unwrap().lock_running);
    }
}
