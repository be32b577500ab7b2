// [apps/orchestrator/src/services/scheduler.rs]
/*!
 * =================================================================
 * APARATO: CRON SCHEDULER SERVICE (V5.5 - THREE TICK DAEMON)
 * CLASIFICACIÓN: BACKGROUND INFRASTRUCTURE (ESTRATO L4)
 * RESPONSABILIDAD: SINCRONIZACIÓN DE AGENDAS, RECUPERACIÓN Y SALUD
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. ENQUEUE ONLY: los callbacks de cron jamás tocan hosts remotos;
 *    su único efecto es depositar jobs en las colas durables.
 * 2. SYNC 60s: registra agendas nuevas, retira las desaparecidas y
 *    salta expresiones inválidas con diagnóstico.
 * 3. STALE 5min: hosts en 'scanning' > 30 min pasan a error con
 *    "scan timeout"; descubrimientos en 'running' > 30 min caen a
 *    failed; los jobs zombi vuelven a la cola.
 * 4. HEALTH 15min: fallos de 24 h y agendas próximas al rastro de
 *    auditoría para introspección.
 * =================================================================
 */

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use croner::Cron;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use sysmap_domain_models::host::HostStatus;
use sysmap_domain_models::jobs::QueueName;
use sysmap_infra_db::DbError;

use crate::state::AppState;

/// Umbral de obsolescencia de escaneos en vuelo (minutos).
const STALE_SCAN_THRESHOLD_MINUTES: i64 = 30;

/// Registro vivo de una agenda cron.
struct ScheduleRegistration {
    expression: String,
    parsed_cron: Cron,
    next_fire_at: DateTime<Utc>,
}

pub struct SchedulerService;

impl SchedulerService {
    /// Lanza los tres daemons periódicos sobre el runtime.
    pub fn spawn_all(application_state: AppState) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(Self::schedule_sync_loop(application_state.clone())),
            tokio::spawn(Self::stale_recovery_loop(application_state.clone())),
            tokio::spawn(Self::health_aggregation_loop(application_state)),
        ]
    }

    // --------------------------------------------------------------
    // TICK 1: SINCRONIZACIÓN DE AGENDAS (60 s)
    // --------------------------------------------------------------

    async fn schedule_sync_loop(application_state: AppState) {
        let mut sync_ticker = interval(Duration::from_secs(60));
        let mut registrations: HashMap<String, ScheduleRegistration> = HashMap::new();

        info!("🗓️ [SCHEDULER]: Schedule sync daemon initiated (60s cadence).");

        loop {
            sync_ticker.tick().await;

            if let Err(sync_fault) =
                Self::sync_and_fire(&application_state, &mut registrations).await
            {
                error!("❌ [SCHEDULER]: Sync tick collapsed: {}. Next tick retries.", sync_fault);
            }
        }
    }

    async fn sync_and_fire(
        application_state: &AppState,
        registrations: &mut HashMap<String, ScheduleRegistration>,
    ) -> Result<(), DbError> {
        let now = Utc::now();

        // 1. CONJUNTO DESEADO: hosts con agenda + credenciales, y
        //    descubrimientos con agenda.
        let mut desired_schedules: HashMap<String, String> = HashMap::new();

        for host in application_state.hosts.list_scheduled().await? {
            if let Some(expression) = &host.scan_schedule {
                desired_schedules.insert(format!("host:{}", host.id), expression.clone());
            }
        }

        for network_scan in application_state.network.list_scheduled().await? {
            if let Some(expression) = &network_scan.schedule {
                desired_schedules.insert(
                    format!("net:{}|{}", network_scan.subnet, expression),
                    expression.clone(),
                );
            }
        }

        // 2. RETIRO DE AGENDAS DESAPARECIDAS.
        registrations.retain(|registration_key, _| {
            let keep = desired_schedules.contains_key(registration_key);
            if !keep {
                debug!("🗓️ [SCHEDULER]: Registration {} removed.", registration_key);
            }
            keep
        });

        // 3. ALTA DE AGENDAS NUEVAS (o con expresión mutada).
        for (registration_key, expression) in &desired_schedules {
            let needs_registration = registrations
                .get(registration_key)
                .map(|registration| registration.expression != *expression)
                .unwrap_or(true);

            if !needs_registration {
                continue;
            }

            match Cron::new(expression).parse() {
                Ok(parsed_cron) => {
                    let next_fire_at = match parsed_cron.find_next_occurrence(&now, false) {
                        Ok(next) => next,
                        Err(occurrence_fault) => {
                            warn!(
                                "🗓️ [SCHEDULER]: Expression '{}' has no next occurrence: {}. Skipped.",
                                expression, occurrence_fault
                            );
                            continue;
                        }
                    };

                    registrations.insert(
                        registration_key.clone(),
                        ScheduleRegistration {
                            expression: expression.clone(),
                            parsed_cron,
                            next_fire_at,
                        },
                    );
                    debug!("🗓️ [SCHEDULER]: Registered {} -> '{}'.", registration_key, expression);
                }
                Err(parse_fault) => {
                    // Expresión inválida: diagnóstico y salto, jamás pánico.
                    warn!(
                        "🗓️ [SCHEDULER]: Invalid cron expression '{}' for {}: {}. Skipped.",
                        expression, registration_key, parse_fault
                    );
                }
            }
        }

        // 4. DISPARO DE AGENDAS VENCIDAS.
        for (registration_key, registration) in registrations.iter_mut() {
            if registration.next_fire_at > now {
                continue;
            }

            Self::fire_registration(application_state, registration_key).await;

            registration.next_fire_at = registration
                .parsed_cron
                .find_next_occurrence(&now, false)
                .unwrap_or(now + chrono::Duration::minutes(1));
        }

        Ok(())
    }

    /// El cuerpo del callback SOLO encola; el trabajo real ocurre en
    /// los workers.
    async fn fire_registration(application_state: &AppState, registration_key: &str) {
        if let Some(host_id) = registration_key.strip_prefix("host:") {
            // Disparo saltado cuando el host sigue en 'scanning'.
            match application_state.hosts.get(host_id).await {
                Ok(host) if host.status == HostStatus::Scanning => {
                    debug!("🗓️ [SCHEDULER]: Host {} still scanning; trigger skipped.", host_id);
                    return;
                }
                Err(lookup_fault) => {
                    warn!("🗓️ [SCHEDULER]: Host {} lookup failed: {}.", host_id, lookup_fault);
                    return;
                }
                _ => {}
            }

            let enqueue_outcome = application_state
                .jobs
                .enqueue(
                    QueueName::ServerScan,
                    host_id,
                    json!({ "host_id": host_id, "principal": "scheduler" }),
                )
                .await;

            match enqueue_outcome {
                Ok(job_id) => {
                    let _ = application_state
                        .audit
                        .record("scheduler", "enqueue_server_scan", &job_id, "ok", None)
                        .await;
                }
                Err(DbError::DuplicateActiveJob(job_id)) => {
                    debug!("🗓️ [SCHEDULER]: Job {} already live; trigger absorbed.", job_id);
                }
                Err(enqueue_fault) => {
                    error!("❌ [SCHEDULER]: Enqueue for host {} failed: {}", host_id, enqueue_fault);
                }
            }
        } else if let Some(network_key) = registration_key.strip_prefix("net:") {
            let subnet = network_key.split('|').next().unwrap_or(network_key);

            let enqueue_outcome = application_state
                .jobs
                .enqueue(
                    QueueName::NetworkScan,
                    subnet,
                    json!({ "subnet": subnet, "principal": "scheduler" }),
                )
                .await;

            match enqueue_outcome {
                Ok(job_id) => {
                    let _ = application_state
                        .audit
                        .record("scheduler", "enqueue_network_scan", &job_id, "ok", None)
                        .await;
                }
                Err(DbError::DuplicateActiveJob(job_id)) => {
                    debug!("🗓️ [SCHEDULER]: Job {} already live; trigger absorbed.", job_id);
                }
                Err(enqueue_fault) => {
                    error!("❌ [SCHEDULER]: Enqueue for subnet {} failed: {}", subnet, enqueue_fault);
                }
            }
        }
    }

    // --------------------------------------------------------------
    // TICK 2: RECUPERACIÓN DE OBSOLETOS (5 min)
    // --------------------------------------------------------------

    async fn stale_recovery_loop(application_state: AppState) {
        let mut recovery_ticker = interval(Duration::from_secs(300));

        info!("💀 [SCHEDULER]: Stale recovery daemon initiated (5min cadence).");

        loop {
            recovery_ticker.tick().await;

            match application_state
                .hosts
                .force_stale_to_error(STALE_SCAN_THRESHOLD_MINUTES)
                .await
            {
                Ok(stale_hosts) if !stale_hosts.is_empty() => {
                    for stale_host_id in &stale_hosts {
                        let _ = application_state
                            .audit
                            .record("scheduler", "stale_scan_recovery", stale_host_id, "forced_error", None)
                            .await;
                    }
                }
                Ok(_) => {}
                Err(recovery_fault) => {
                    error!("❌ [SCHEDULER]: Host stale recovery collapsed: {}", recovery_fault)
                }
            }

            if let Err(recovery_fault) = application_state
                .network
                .force_stale_to_failed(STALE_SCAN_THRESHOLD_MINUTES)
                .await
            {
                error!("❌ [SCHEDULER]: Network stale recovery collapsed: {}", recovery_fault);
            }

            if let Err(recovery_fault) = application_state.jobs.recover_zombies().await {
                error!("❌ [SCHEDULER]: Zombie job recovery collapsed: {}", recovery_fault);
            }
        }
    }

    // --------------------------------------------------------------
    // TICK 3: AGREGACIÓN DE SALUD (15 min)
    // --------------------------------------------------------------

    async fn health_aggregation_loop(application_state: AppState) {
        let mut health_ticker = interval(Duration::from_secs(900));

        info!("🩺 [SCHEDULER]: Health aggregation daemon initiated (15min cadence).");

        loop {
            health_ticker.tick().await;

            let failures_24h = application_state
                .jobs
                .failure_count_last_24h()
                .await
                .unwrap_or(-1);
            let alerts_24h = application_state
                .rules
                .alert_count_last_24h()
                .await
                .unwrap_or(-1);
            let upcoming_schedules = application_state
                .hosts
                .list_scheduled()
                .await
                .map(|hosts| hosts.len())
                .unwrap_or(0);

            let health_digest = json!({
                "job_failures_24h": failures_24h,
                "alerts_24h": alerts_24h,
                "scheduled_hosts": upcoming_schedules,
            })
            .to_string();

            let _ = application_state
                .audit
                .record("scheduler", "health_aggregation", "fleet", "ok", Some(&health_digest))
                .await;

            info!("🩺 [SCHEDULER]: Health digest sealed: {}", health_digest);
        }
    }
}
