// [libs/infra/db/src/schema.rs]
/**
 * =================================================================
 * APARATO: INVENTORY DATABASE SCHEMA (V5.4 - HISTORY STRATA)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: GOBERNANZA ESTRUCTURAL E IDEMPOTENCIA TOTAL
 *
 * VISION HIPER-HOLÍSTICA:
 * 1. SOLIDIFICACIÓN: tablas base del inventario, historia y colas.
 * 2. EVOLUCIÓN: mutaciones de columna tolerantes a duplicado para
 *    migraciones en caliente.
 * 3. ENDURECIMIENTO: índices únicos que sostienen las leyes del
 *    dominio (ip de host, numeración de snapshots, aristas, jobs).
 * =================================================================
 */

use anyhow::{Context, Result};
use libsql::Connection;
use tracing::{debug, info, instrument, warn};

/**
 * ESTRATO 1: SOLIDIFICACIÓN (Génesis de Tablas)
 */
const INVENTORY_TABLES: &[(&str, &str)] = &[
    ("TABLE_HOSTS", r#"
        CREATE TABLE IF NOT EXISTS hosts (
            id TEXT PRIMARY KEY,
            ip TEXT NOT NULL UNIQUE,
            hostname TEXT,
            os_info TEXT,
            kernel_info TEXT,
            cpu_info TEXT,
            memory_mb INTEGER,
            ssh_port INTEGER DEFAULT 22,
            ssh_user TEXT,
            auth_method TEXT DEFAULT 'password',
            encrypted_password TEXT,
            encrypted_private_key TEXT,
            allow_sudo INTEGER DEFAULT 0,
            scan_schedule TEXT,
            status TEXT DEFAULT 'discovered',
            last_scan_at DATETIME,
            last_scan_error TEXT,
            raw_scan_data TEXT,
            ai_purpose TEXT,
            ai_tags TEXT,
            ai_summary TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_SERVICES", r#"
        CREATE TABLE IF NOT EXISTS services (
            id TEXT PRIMARY KEY,
            host_id TEXT NOT NULL,
            name TEXT NOT NULL,
            port INTEGER NOT NULL,
            protocol TEXT NOT NULL,
            bind_address TEXT,
            state TEXT,
            pid INTEGER
        );
    "#),
    ("TABLE_MOUNTS", r#"
        CREATE TABLE IF NOT EXISTS mounts (
            id TEXT PRIMARY KEY,
            host_id TEXT NOT NULL,
            device TEXT,
            mountpoint TEXT NOT NULL,
            filesystem TEXT,
            size_mb INTEGER DEFAULT 0,
            used_mb INTEGER DEFAULT 0,
            use_pct INTEGER
        );
    "#),
    ("TABLE_INTERFACES", r#"
        CREATE TABLE IF NOT EXISTS interfaces (
            id TEXT PRIMARY KEY,
            host_id TEXT NOT NULL,
            name TEXT NOT NULL,
            ip TEXT,
            mac TEXT,
            state TEXT,
            mtu INTEGER DEFAULT 0,
            rx_bytes INTEGER DEFAULT 0,
            tx_bytes INTEGER DEFAULT 0
        );
    "#),
    ("TABLE_CONTAINERS", r#"
        CREATE TABLE IF NOT EXISTS containers (
            id TEXT PRIMARY KEY,
            host_id TEXT NOT NULL,
            container_id TEXT,
            name TEXT NOT NULL,
            image TEXT,
            state TEXT,
            ports TEXT,
            networks TEXT,
            env TEXT,
            volumes TEXT
        );
    "#),
    ("TABLE_CRON_ENTRIES", r#"
        CREATE TABLE IF NOT EXISTS cron_entries (
            id TEXT PRIMARY KEY,
            host_id TEXT NOT NULL,
            cron_user TEXT,
            schedule TEXT,
            command TEXT,
            source TEXT
        );
    "#),
    ("TABLE_SYSTEMD_UNITS", r#"
        CREATE TABLE IF NOT EXISTS systemd_units (
            id TEXT PRIMARY KEY,
            host_id TEXT NOT NULL,
            name TEXT NOT NULL,
            unit_type TEXT DEFAULT 'service',
            active_state TEXT,
            sub_state TEXT,
            main_pid INTEGER,
            memory_mb INTEGER,
            cpu_seconds INTEGER,
            enabled INTEGER DEFAULT 0
        );
    "#),
    ("TABLE_SSL_CERTIFICATES", r#"
        CREATE TABLE IF NOT EXISTS ssl_certificates (
            id TEXT PRIMARY KEY,
            host_id TEXT NOT NULL,
            path TEXT NOT NULL,
            subject TEXT,
            issuer TEXT,
            valid_from TEXT,
            valid_to TEXT,
            is_expired INTEGER DEFAULT 0,
            days_left INTEGER DEFAULT 0,
            san_domains TEXT
        );
    "#),
    ("TABLE_LVM_VOLUMES", r#"
        CREATE TABLE IF NOT EXISTS lvm_volumes (
            id TEXT PRIMARY KEY,
            host_id TEXT NOT NULL,
            volume_group TEXT,
            logical_volume TEXT,
            device_path TEXT,
            size_mb INTEGER DEFAULT 0,
            mountpoint TEXT
        );
    "#),
    ("TABLE_USER_ACCOUNTS", r#"
        CREATE TABLE IF NOT EXISTS user_accounts (
            id TEXT PRIMARY KEY,
            host_id TEXT NOT NULL,
            username TEXT NOT NULL,
            uid INTEGER NOT NULL,
            gid INTEGER DEFAULT 0,
            shell TEXT,
            home_dir TEXT,
            has_login INTEGER DEFAULT 0,
            groups_list TEXT
        );
    "#),
    ("TABLE_PROCESSES", r#"
        CREATE TABLE IF NOT EXISTS processes (
            id TEXT PRIMARY KEY,
            host_id TEXT NOT NULL,
            pid INTEGER NOT NULL,
            ppid INTEGER DEFAULT 0,
            process_user TEXT,
            cpu_pct REAL DEFAULT 0,
            mem_mb REAL DEFAULT 0,
            command TEXT,
            full_path TEXT,
            args TEXT,
            cgroup TEXT,
            fd_count INTEGER
        );
    "#),
    ("TABLE_SERVER_LOG_ENTRIES", r#"
        CREATE TABLE IF NOT EXISTS server_log_entries (
            id TEXT PRIMARY KEY,
            host_id TEXT NOT NULL,
            source TEXT,
            severity TEXT,
            line TEXT,
            collected_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_SNAPSHOTS", r#"
        CREATE TABLE IF NOT EXISTS snapshots (
            id TEXT PRIMARY KEY,
            host_id TEXT NOT NULL,
            scan_number INTEGER NOT NULL,
            document TEXT NOT NULL,
            checksum TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_DIFF_EVENTS", r#"
        CREATE TABLE IF NOT EXISTS diff_events (
            id TEXT PRIMARY KEY,
            host_id TEXT NOT NULL,
            snapshot_id TEXT NOT NULL,
            category TEXT NOT NULL,
            change_type TEXT NOT NULL,
            item_key TEXT NOT NULL,
            old_value TEXT,
            new_value TEXT,
            severity TEXT NOT NULL,
            acknowledged INTEGER DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_CONNECTION_EDGES", r#"
        CREATE TABLE IF NOT EXISTS connection_edges (
            id TEXT PRIMARY KEY,
            source_host_id TEXT NOT NULL,
            target_host_id TEXT,
            target_ip TEXT NOT NULL,
            target_port INTEGER NOT NULL,
            source_process TEXT NOT NULL DEFAULT '',
            detection_method TEXT NOT NULL,
            details TEXT,
            is_external INTEGER DEFAULT 0
        );
    "#),
    ("TABLE_ALERT_RULES", r#"
        CREATE TABLE IF NOT EXISTS alert_rules (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            category TEXT,
            condition_json TEXT NOT NULL,
            severity TEXT NOT NULL,
            enabled INTEGER DEFAULT 1,
            scope_host_id TEXT,
            cooldown_minutes INTEGER DEFAULT 60,
            last_triggered_at DATETIME
        );
    "#),
    ("TABLE_ALERTS", r#"
        CREATE TABLE IF NOT EXISTS alerts (
            id TEXT PRIMARY KEY,
            rule_id TEXT,
            host_id TEXT,
            title TEXT NOT NULL,
            message TEXT,
            severity TEXT NOT NULL,
            category TEXT,
            metadata TEXT,
            resolved INTEGER DEFAULT 0,
            resolved_at DATETIME,
            resolved_by TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_AI_ANALYSES", r#"
        CREATE TABLE IF NOT EXISTS ai_analyses (
            id TEXT PRIMARY KEY,
            host_id TEXT NOT NULL,
            purpose TEXT NOT NULL,
            document TEXT,
            raw_prompt TEXT,
            raw_response TEXT,
            model_used TEXT,
            duration_ms INTEGER DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_LLM_SETTINGS", r#"
        CREATE TABLE IF NOT EXISTS llm_settings (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            provider TEXT NOT NULL DEFAULT 'ollama',
            endpoint TEXT NOT NULL DEFAULT 'http://127.0.0.1:11434',
            api_credential TEXT,
            model TEXT NOT NULL DEFAULT 'qwen2.5:7b',
            enabled INTEGER DEFAULT 0,
            summaries_enabled INTEGER DEFAULT 1,
            anomaly_enabled INTEGER DEFAULT 1,
            log_analysis_enabled INTEGER DEFAULT 1,
            temperature REAL DEFAULT 0.2,
            max_tokens INTEGER DEFAULT 2048,
            context_tokens INTEGER DEFAULT 8192,
            timeout_secs INTEGER DEFAULT 300,
            lock_running INTEGER DEFAULT 0,
            lock_holder_host_id TEXT,
            lock_updated_at DATETIME
        );
    "#),
    ("TABLE_JOBS", r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id TEXT PRIMARY KEY,
            queue TEXT NOT NULL,
            payload TEXT NOT NULL,
            status TEXT DEFAULT 'queued',
            attempt INTEGER DEFAULT 0,
            max_attempts INTEGER DEFAULT 1,
            next_attempt_at DATETIME,
            progress TEXT,
            failure_reason TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            started_at DATETIME,
            finished_at DATETIME,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_NETWORK_SCANS", r#"
        CREATE TABLE IF NOT EXISTS network_scans (
            id TEXT PRIMARY KEY,
            subnet TEXT NOT NULL,
            schedule TEXT,
            status TEXT DEFAULT 'idle',
            started_at DATETIME,
            finished_at DATETIME,
            last_error TEXT,
            hosts_found INTEGER DEFAULT 0,
            results TEXT,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_AUDIT_LOG", r#"
        CREATE TABLE IF NOT EXISTS audit_log (
            id TEXT PRIMARY KEY,
            principal TEXT NOT NULL,
            action TEXT NOT NULL,
            subject TEXT,
            outcome TEXT NOT NULL,
            detail TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_SYSTEM_STATE", r#"
        CREATE TABLE IF NOT EXISTS system_state (
            key TEXT PRIMARY KEY,
            value_text TEXT,
            value_int INTEGER,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
];

/**
 * ESTRATO 2: EVOLUCIÓN (Mutaciones de Columna)
 */
const EVOLUTIONARY_STRATA: &[(&str, &str)] = &[
    ("HOST_ALLOW_SUDO", "ALTER TABLE hosts ADD COLUMN allow_sudo INTEGER DEFAULT 0"),
    ("HOST_AI_FIELDS", "ALTER TABLE hosts ADD COLUMN ai_summary TEXT"),
    ("JOB_PROGRESS", "ALTER TABLE jobs ADD COLUMN progress TEXT"),
    ("NETSCAN_RESULTS", "ALTER TABLE network_scans ADD COLUMN results TEXT"),
];

/**
 * ESTRATO 3: ENDURECIMIENTO (Índices y Leyes de Unicidad)
 */
const ACCELERATION_INDEXES: &[(&str, &str)] = &[
    ("IDX_HOSTS_STATUS", "CREATE INDEX IF NOT EXISTS idx_hosts_status ON hosts(status);"),
    ("IDX_SERVICES_IDENTITY", "CREATE UNIQUE INDEX IF NOT EXISTS idx_services_identity ON services(host_id, name, port, protocol);"),
    ("IDX_CHILDREN_HOST", "CREATE INDEX IF NOT EXISTS idx_mounts_host ON mounts(host_id);"),
    ("IDX_SNAPSHOT_NUMBERING", "CREATE UNIQUE INDEX IF NOT EXISTS idx_snapshot_numbering ON snapshots(host_id, scan_number);"),
    ("IDX_DIFFS_HOST", "CREATE INDEX IF NOT EXISTS idx_diffs_host ON diff_events(host_id, created_at);"),
    ("IDX_EDGE_IDENTITY", "CREATE UNIQUE INDEX IF NOT EXISTS idx_edge_identity ON connection_edges(source_host_id, target_ip, target_port, source_process);"),
    ("IDX_AI_PURPOSE", "CREATE INDEX IF NOT EXISTS idx_ai_purpose ON ai_analyses(host_id, purpose);"),
    ("IDX_JOBS_QUEUE", "CREATE INDEX IF NOT EXISTS idx_jobs_queue ON jobs(queue, status, next_attempt_at);"),
    ("IDX_ALERTS_HOST", "CREATE INDEX IF NOT EXISTS idx_alerts_host ON alerts(host_id, resolved);"),
    ("IDX_LOGS_HOST", "CREATE INDEX IF NOT EXISTS idx_logs_host ON server_log_entries(host_id);"),
];

/**
 * Ejecuta la secuencia maestra de sincronización del esquema.
 *
 * # Errors:
 * Retorna error si alguna tabla base falla en solidificarse.
 */
#[instrument(skip(database_connection))]
pub async fn apply_full_inventory_schema(database_connection: &Connection) -> Result<()> {
    info!("🏗️ [SCHEMA_ENGINE]: Initiating structural synchronization V5.4...");

    solidify_base_strata(database_connection).await?;
    execute_evolutionary_repair(database_connection).await?;
    harden_access_layer(database_connection).await?;

    info!("✅ [SCHEMA_ENGINE]: Inventory Ledger V5.4 level and certified.");
    Ok(())
}

async fn solidify_base_strata(db: &Connection) -> Result<()> {
    for (identifier, sql) in INVENTORY_TABLES {
        debug!("  ↳ Solidifying: {}", identifier);
        db.execute(*sql, ()).await
            .with_context(|| format!("CRITICAL_SOLIDIFICATION_FAULT: {}", identifier))?;
    }
    Ok(())
}

async fn execute_evolutionary_repair(db: &Connection) -> Result<()> {
    for (identifier, sql) in EVOLUTIONARY_STRATA {
        match db.execute(*sql, ()).await {
            Ok(_) => debug!("  🟢 [REPAIR_OK]: Applied evolutionary stratum {}", identifier),
            Err(repair_fault) => {
                let message = repair_fault.to_string();
                if message.contains("duplicate column name") {
                    debug!("  ⚪ [REPAIR_SKIP]: {} already level.", identifier);
                } else {
                    warn!("  ⚠️ [REPAIR_BYPASS]: {} check incomplete: {}", identifier, message);
                }
            }
        }
    }
    Ok(())
}

async fn harden_access_layer(db: &Connection) -> Result<()> {
    for (identifier, sql) in ACCELERATION_INDEXES {
        debug!("  ↳ Hardening: {}", identifier);
        db.execute(*sql, ()).await
            .with_context(|| format!("CRITICAL_HARDENING_FAULT: {}", identifier))?;
    }
    Ok(())
}
