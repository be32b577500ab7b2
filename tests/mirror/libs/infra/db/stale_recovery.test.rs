// [tests/mirror/libs/infra/db/stale_recovery.test.rs]
/*!
 * =================================================================
 * APARATO: CERTIFICADOR DE RECUPERACIÓN DE OBSOLETOS (V1.0)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L3-MIRROR
 * RESPONSABILIDAD: AUDITORÍA DEL TICK DE RECUPERACIÓN (30 MIN)
 *
 * Un host clavado en 'scanning' o un descubrimiento clavado en
 * 'running' más allá del umbral debe caer a su estado terminal con
 * el mensaje "scan timeout"; los que siguen dentro de la ventana
 * permanecen intactos.
 * =================================================================
 */

use sysmap_domain_models::host::{HostStatus, SshAuthMethod};
use sysmap_domain_models::jobs::NetworkScanStatus;
use sysmap_infra_db::repositories::hosts::HostRegistration;
use sysmap_infra_db::repositories::{HostRepository, NetworkScanRepository};
use sysmap_infra_db::DbClient;

async fn age_row(client: &DbClient, table: &str, row_id: &str, minutes_ago: i64) {
    let connection = client.get_connection().unwrap();
    let past_stamp = (chrono::Utc::now() - chrono::Duration::minutes(minutes_ago))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string();

    connection
        .execute(
            &format!("UPDATE {} SET updated_at = ?2 WHERE id = ?1", table),
            libsql::params![row_id, past_stamp],
        )
        .await
        .unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    /**
     * Host en 'scanning' con 31 minutos de antigüedad: tras el tick,
     * status=error y last_scan_error contiene "scan timeout".
     */
    #[tokio::test]
    async fn certify_stale_host_forced_to_error() {
        let database_client =
            DbClient::connect("file:stale_host_test?mode=memory&cache=shared", None)
                .await
                .unwrap();
        let host_repository = HostRepository::new(database_client.clone());

        let stuck_host_id = host_repository
            .register(HostRegistration {
                ip: "10.0.0.40".into(),
                ssh_port: 22,
                ssh_user: "root".into(),
                auth_method: SshAuthMethod::Password,
                encrypted_password: Some("{}".into()),
                encrypted_private_key: None,
                scan_schedule: None,
                allow_sudo: false,
            })
            .await
            .unwrap();

        let healthy_host_id = host_repository
            .register(HostRegistration {
                ip: "10.0.0.41".into(),
                ssh_port: 22,
                ssh_user: "root".into(),
                auth_method: SshAuthMethod::Password,
                encrypted_password: Some("{}".into()),
                encrypted_private_key: None,
                scan_schedule: None,
                allow_sudo: false,
            })
            .await
            .unwrap();

        host_repository.begin_scan(&stuck_host_id).await.unwrap();
        host_repository.begin_scan(&healthy_host_id).await.unwrap();

        // Solo el primero envejece más allá del umbral.
        age_row(&database_client, "hosts", &stuck_host_id, 31).await;

        let recovered_ids = host_repository.force_stale_to_error(30).await.unwrap();
        assert_eq!(recovered_ids, vec![stuck_host_id.clone()]);

        let stuck_host = host_repository.get(&stuck_host_id).await.unwrap();
        assert_eq!(stuck_host.status, HostStatus::Error);
        assert!(stuck_host.last_scan_error.unwrap().contains("scan timeout"));

        let healthy_host = host_repository.get(&healthy_host_id).await.unwrap();
        assert_eq!(healthy_host.status, HostStatus::Scanning);
    }

    /**
     * Descubrimiento en 'running' más allá del umbral cae a failed.
     */
    #[tokio::test]
    async fn certify_stale_network_scan_forced_to_failed() {
        let database_client =
            DbClient::connect("file:stale_net_test?mode=memory&cache=shared", None)
                .await
                .unwrap();
        let network_repository = NetworkScanRepository::new(database_client.clone());

        let scan_id = network_repository.create("10.0.0.0/24", Some("0 3 * * *")).await.unwrap();
        network_repository.mark_running(&scan_id).await.unwrap();

        // Dentro de la ventana: intacto.
        assert_eq!(network_repository.force_stale_to_failed(30).await.unwrap(), 0);

        age_row(&database_client, "network_scans", &scan_id, 31).await;
        assert_eq!(network_repository.force_stale_to_failed(30).await.unwrap(), 1);

        let recovered_scan = network_repository.get(&scan_id).await.unwrap().unwrap();
        assert_eq!(recovered_scan.status, NetworkScanStatus::Failed);
        assert!(recovered_scan.last_error.unwrap().contains("scan timeout"));

        // La agenda del descubrimiento sigue visible para el scheduler.
        let scheduled = network_repository.list_scheduled().await.unwrap();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].subnet, "10.0.0.0/24");
    }
}
