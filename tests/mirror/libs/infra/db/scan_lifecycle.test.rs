// [tests/mirror/libs/infra/db/scan_lifecycle.test.rs]
/*!
 * =================================================================
 * APARATO: CERTIFICADOR DE CICLO DE VIDA DE ESCANEO (V1.2)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L3-MIRROR
 * RESPONSABILIDAD: AUDITORÍA MAPEO -> SNAPSHOT -> DIFF -> REGLAS
 *
 * # Mathematical Proof (Checksum Law):
 * El test certifica que mapear dos veces el mismo documento deja la
 * base en el mismo estado observable: el snapshot consecutivo sella
 * con el mismo checksum y produce cero eventos de diff, mientras la
 * numeración permanece densa y monótona.
 * =================================================================
 */

use serde_json::json;

use sysmap_domain_models::host::{HostStatus, SshAuthMethod};
use sysmap_domain_models::snapshot::{ChangeType, DiffCategory, Severity};
use sysmap_domain_rules::EvaluationContext;
use sysmap_domain_topology::{correlate_document, HostIndex};
use sysmap_infra_db::repositories::hosts::HostRegistration;
use sysmap_infra_db::repositories::{
    EdgeRepository, HostRepository, InventoryMapper, RuleRepository, SnapshotRepository,
};
use sysmap_infra_db::DbClient;

fn gather_document(with_nginx_listener: bool) -> serde_json::Value {
    let mut listeners = vec![json!({
        "process": "sshd", "port": 22, "protocol": "tcp",
        "bind": "0.0.0.0", "state": "LISTEN", "pid": 612
    })];
    if with_nginx_listener {
        listeners.push(json!({
            "process": "nginx", "port": 80, "protocol": "tcp",
            "bind": "0.0.0.0", "state": "LISTEN", "pid": 900
        }));
    }

    json!({
        "_meta": {"version": "5.2.0", "collector_host": "h1", "start_epoch_ms": 1},
        "os": {
            "hostname": "h1", "os_name": "Debian GNU/Linux 12", "kernel": "6.1.0-18-amd64",
            "cpu_model": "Intel Xeon", "cpu_cores": 4, "memory_mb": 16000, "uptime_secs": 1000
        },
        "listeners": listeners,
        "mounts": [
            {"device": "/dev/sda1", "mountpoint": "/", "fs": "ext4",
             "size_mb": 100000, "used_mb": 40000, "use_pct": 40}
        ],
        "user_accounts": [
            {"username": "root", "uid": 0, "gid": 0, "shell": "/bin/bash",
             "home_dir": "/root", "has_login": true, "groups": "root"}
        ],
        "ssl_certificates": [
            {"path": "/etc/ssl/site.pem", "subject": "CN=site", "issuer": "CN=ca",
             "valid_from": "Jan 1 2026", "valid_to": "Aug 4 2026",
             "is_expired": false, "days_left": 3, "san_domains": "site.example"}
        ],
        "systemd_units": [
            {"name": "sshd.service", "active_state": "active", "sub_state": "running",
             "enabled": true, "main_pid": 612, "memory_mb": 12, "cpu_sec": 3}
        ],
        "processes": [
            {"pid": 612, "ppid": 1, "user": "root", "cpu_pct": 0.3, "mem_mb": 11.5,
             "command": "sshd", "full_path": "/usr/sbin/sshd", "args": "sshd -D",
             "cgroup": "0::/system.slice/ssh.service", "fd_count": 8}
        ],
        "_meta_end": {"end_epoch_ms": 2}
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /**
     * Ciclo completo: escaneo frío, idempotencia del mapeador, alta de
     * servicio con su evento exacto, reglas con enfriamiento y grafo
     * de llamadas con deduplicación por llave única.
     */
    #[tokio::test]
    async fn certify_scan_lifecycle_end_to_end() {
        println!("\n🗄️  [INICIO]: Auditoría del Ciclo de Vida de Escaneo V1.2...");

        let database_client =
            DbClient::connect("file:scan_lifecycle_test?mode=memory&cache=shared", None)
                .await
                .expect("in-memory ignition must succeed");

        let host_repository = HostRepository::new(database_client.clone());
        let inventory_mapper = InventoryMapper::new(database_client.clone());
        let snapshot_repository = SnapshotRepository::new(database_client.clone());
        let rule_repository = RuleRepository::new(database_client.clone());
        let edge_repository = EdgeRepository::new(database_client.clone());

        // --- 1. ESCANEO FRÍO DE UN HOST FRESCO ---
        let host_id = host_repository
            .register(HostRegistration {
                ip: "10.0.0.5".into(),
                ssh_port: 22,
                ssh_user: "root".into(),
                auth_method: SshAuthMethod::Password,
                encrypted_password: Some("{\"nonce\":\"\",\"auth_tag\":\"\",\"body\":\"\"}".into()),
                encrypted_private_key: None,
                scan_schedule: None,
                allow_sudo: false,
            })
            .await
            .expect("registration must succeed");

        let first_document = gather_document(false);
        let first_counts = inventory_mapper
            .map_document(&host_id, &first_document)
            .await
            .expect("first mapping must succeed");
        assert_eq!(first_counts.services, 1);
        assert_eq!(first_counts.mounts, 1);

        let host_after_scan = host_repository.get(&host_id).await.unwrap();
        assert_eq!(host_after_scan.status, HostStatus::Online);
        assert_eq!(host_after_scan.hostname.as_deref(), Some("h1"));
        assert!(host_after_scan.last_scan_error.is_none());
        assert!(host_after_scan.last_scan_at.is_some());

        let first_outcome = snapshot_repository.snapshot_and_diff(&host_id).await.unwrap();
        assert!(first_outcome.is_first_scan);
        assert_eq!(first_outcome.scan_number, 1);
        assert_eq!(first_outcome.diff_count, 0);

        // --- 2. IDEMPOTENCIA: mismo documento, cero eventos ---
        inventory_mapper.map_document(&host_id, &first_document).await.unwrap();
        let repeat_outcome = snapshot_repository.snapshot_and_diff(&host_id).await.unwrap();
        assert!(!repeat_outcome.is_first_scan);
        assert_eq!(repeat_outcome.scan_number, 2);
        assert_eq!(repeat_outcome.diff_count, 0);

        // --- 3. ALTA DE SERVICIO: exactamente un evento tipado ---
        let second_document = gather_document(true);
        inventory_mapper.map_document(&host_id, &second_document).await.unwrap();
        let change_outcome = snapshot_repository.snapshot_and_diff(&host_id).await.unwrap();

        assert_eq!(change_outcome.scan_number, 3);
        assert_eq!(change_outcome.diff_count, 1);

        let service_event = &change_outcome.diffs[0];
        assert_eq!(service_event.category, DiffCategory::Services);
        assert_eq!(service_event.change_type, ChangeType::Added);
        assert_eq!(service_event.item_key, "nginx:80:tcp");
        assert_eq!(service_event.severity, Severity::Warning);

        // Invariante de historia: el evento referencia el snapshot del
        // mismo host y la numeración queda densa.
        let persisted_events = snapshot_repository
            .events_for_snapshot(&change_outcome.snapshot_id)
            .await
            .unwrap();
        assert_eq!(persisted_events.len(), 1);
        assert_eq!(persisted_events[0].host_id, host_id);
        assert_eq!(persisted_events[0].item_key, "nginx:80:tcp");

        let latest_snapshot = snapshot_repository.latest_snapshot(&host_id).await.unwrap().unwrap();
        assert_eq!(latest_snapshot.scan_number, 3);
        assert_eq!(latest_snapshot.id, change_outcome.snapshot_id);
        assert_eq!(
            snapshot_repository.latest_scan_number(&host_id).await.unwrap(),
            Some(3)
        );
        assert_eq!(
            snapshot_repository
                .diff_count_for_snapshot(&change_outcome.snapshot_id)
                .await
                .unwrap(),
            1
        );

        // --- 4. REGLAS: SSL por expirar dispara, "Service removed" no ---
        let seeded_rules = rule_repository.seed_defaults_once().await.unwrap();
        assert_eq!(seeded_rules, 8);
        // La segunda siembra es un no-op sellado.
        assert_eq!(rule_repository.seed_defaults_once().await.unwrap(), 0);

        let evaluation_context = EvaluationContext {
            diffs: change_outcome.diffs.clone(),
            certificates: host_repository.certificates_of(&host_id).await.unwrap(),
            mounts: host_repository.mounts_of(&host_id).await.unwrap(),
            systemd_units: host_repository.systemd_units_of(&host_id).await.unwrap(),
            service_names: host_repository.service_names_of(&host_id).await.unwrap(),
        };

        let emitted_alerts = rule_repository
            .evaluate_and_emit(&host_id, "h1", &evaluation_context)
            .await
            .unwrap();
        assert_eq!(emitted_alerts, 1, "only the SSL-expiring rule must fire");

        let alerts = rule_repository.alerts_of(&host_id).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert_eq!(alerts[0].category, "ssl");

        // Enfriamiento: la re-evaluación inmediata no emite nada nuevo.
        let cooled_alerts = rule_repository
            .evaluate_and_emit(&host_id, "h1", &evaluation_context)
            .await
            .unwrap();
        assert_eq!(cooled_alerts, 0);

        // Avisos en vivo: el certificado con 3 días restantes aparece
        // porque existe al menos una regla ssl habilitada.
        let warnings = rule_repository.live_warnings_for(&evaluation_context).await.unwrap();
        assert!(warnings.iter().any(|warning| warning.kind == "ssl"));

        // --- 5. GRAFO: correlación pura + reemplazo con unicidad ---
        let mut host_index = HostIndex::new();
        for (indexed_id, indexed_ip, indexed_hostname) in
            host_repository.host_index().await.unwrap()
        {
            host_index.register(&indexed_id, &indexed_ip, indexed_hostname.as_deref());
        }

        let topology_document = json!({
            "sockets": [
                {"local": "10.0.0.5:40000", "peer": "10.0.0.9:5432", "process": "app", "pid": 7},
                {"local": "10.0.0.5:40001", "peer": "10.0.0.9:5432", "process": "app", "pid": 7}
            ]
        });
        let edge_drafts = correlate_document(&topology_document, &host_index);
        assert_eq!(edge_drafts.len(), 1, "dedup key must collapse the twin socket");

        let stored_edges = edge_repository.replace_for_host(&host_id, &edge_drafts).await.unwrap();
        assert_eq!(stored_edges, 1);

        let persisted_edges = edge_repository.edges_of(&host_id).await.unwrap();
        assert_eq!(persisted_edges.len(), 1);
        assert_eq!(persisted_edges[0].target_ip, "10.0.0.9");
        assert!(persisted_edges[0].is_external, "10.0.0.9 is outside the inventory");

        println!("✅ [VEREDICTO]: Ciclo de vida de escaneo certificado.");
    }
}
