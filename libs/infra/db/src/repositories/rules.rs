// [libs/infra/db/src/repositories/rules.rs]
/*!
 * =================================================================
 * APARATO: RULE & ALERT REPOSITORY (V5.4 - COOLDOWN AUTHORITY)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: REGLAS ADMINISTRADAS, EVALUACIÓN Y EMISIÓN
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. SEED ONCE: la siembra del set por defecto se sella con la llave
 *    'alert_rules_seeded' en system_state; jamás se repite.
 * 2. PER-RULE RESILIENCE: el fallo de una regla se registra y la
 *    evaluación continúa con la siguiente.
 * 3. COOLDOWN LAW: dos alertas de la misma regla sobre el mismo host
 *    jamás nacen dentro de la ventana de enfriamiento.
 * =================================================================
 */

use chrono::Utc;
use libsql::params;
use serde_json::Value;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use sysmap_domain_models::rules::{Alert, AlertRule, RuleCondition, RuleScope};
use sysmap_domain_models::snapshot::Severity;
use sysmap_domain_rules::{
    default_rule_set, evaluate_condition, live_warnings, rule_applies, EnabledKinds,
    EvaluationContext, LiveWarning,
};

use crate::errors::DbError;
use crate::repositories::{bool_at, int_at, now_stamp, opt_text_at, stamp_at, text_at};
use crate::DbClient;

const SEED_MARKER_KEY: &str = "alert_rules_seeded";

pub struct RuleRepository {
    database_client: DbClient,
}

impl RuleRepository {
    pub fn new(client: DbClient) -> Self {
        Self { database_client: client }
    }

    // --------------------------------------------------------------
    // SIEMBRA
    // --------------------------------------------------------------

    /**
     * Siembra el set por defecto exactamente una vez en la vida del
     * despliegue (marcador durable, no conteo de filas: borrar todas
     * las reglas es una decisión del operador que se respeta).
     */
    #[instrument(skip(self))]
    pub async fn seed_defaults_once(&self) -> Result<usize, DbError> {
        let connection = self.database_client.get_connection()?;

        let mut marker_rows = connection
            .query("SELECT value_int FROM system_state WHERE key = ?1", params![SEED_MARKER_KEY])
            .await?;

        if marker_rows.next().await?.is_some() {
            return Ok(0);
        }

        let default_rules = default_rule_set();
        for rule in &default_rules {
            connection
                .execute(
                    "INSERT OR IGNORE INTO alert_rules
                         (id, name, description, category, condition_json, severity,
                          enabled, scope_host_id, cooldown_minutes)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8)",
                    params![
                        rule.id.clone(),
                        rule.name.clone(),
                        rule.description.clone(),
                        rule.category.clone(),
                        serde_json::to_string(&rule.condition)
                            .map_err(|fault| DbError::MappingError(fault.to_string()))?,
                        rule.severity.as_str(),
                        rule.enabled as i64,
                        rule.cooldown_minutes
                    ],
                )
                .await?;
        }

        connection
            .execute(
                "INSERT OR REPLACE INTO system_state (key, value_int, updated_at) VALUES (?1, 1, ?2)",
                params![SEED_MARKER_KEY, now_stamp()],
            )
            .await?;

        info!("🌱 [RULES]: Default rule set seeded ({} rules).", default_rules.len());
        Ok(default_rules.len())
    }

    // --------------------------------------------------------------
    // LECTURAS
    // --------------------------------------------------------------

    pub async fn list_rules(&self) -> Result<Vec<AlertRule>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT id, name, description, category, condition_json, severity,
                        enabled, scope_host_id, cooldown_minutes, last_triggered_at
                 FROM alert_rules ORDER BY name",
                (),
            )
            .await?;

        let mut rules = Vec::new();
        while let Some(row) = rows.next().await? {
            match rule_from_row(&row) {
                Ok(rule) => rules.push(rule),
                Err(mapping_fault) => {
                    // Una regla corrupta no debe tumbar la evaluación.
                    warn!("⚠️ [RULES]: Skipping unreadable rule: {}", mapping_fault);
                }
            }
        }
        Ok(rules)
    }

    // --------------------------------------------------------------
    // EVALUACIÓN Y EMISIÓN
    // --------------------------------------------------------------

    /**
     * Evalúa todas las reglas aplicables contra el contexto y emite
     * las alertas con su evidencia. Devuelve el total emitido.
     */
    #[instrument(skip(self, context), fields(host = %host_id))]
    pub async fn evaluate_and_emit(
        &self,
        host_id: &str,
        host_label: &str,
        context: &EvaluationContext,
    ) -> Result<usize, DbError> {
        let rules = self.list_rules().await?;
        let now = Utc::now();
        let mut emitted_count = 0usize;

        for rule in rules {
            // 1. COMPUERTAS: habilitación + alcance.
            if !rule_applies(&rule, host_id) {
                continue;
            }

            // 2. ENFRIAMIENTO.
            if rule.in_cooldown(now) {
                continue;
            }

            // 3. CONDICIÓN. El fallo de una regla no detiene el resto.
            let evidence = match evaluate_condition(&rule.condition, context) {
                Some(evidence) => evidence,
                None => continue,
            };

            match self.emit_rule_alert(host_id, host_label, &rule, evidence).await {
                Ok(()) => emitted_count += 1,
                Err(emission_fault) => {
                    error!(
                        "❌ [RULES]: Rule '{}' matched but emission collapsed: {}",
                        rule.name, emission_fault
                    );
                }
            }
        }

        Ok(emitted_count)
    }

    async fn emit_rule_alert(
        &self,
        host_id: &str,
        host_label: &str,
        rule: &AlertRule,
        evidence: Value,
    ) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;

        connection
            .execute(
                "INSERT INTO alerts (id, rule_id, host_id, title, message, severity,
                                     category, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    Uuid::new_v4().to_string(),
                    rule.id.clone(),
                    host_id,
                    format!("[{}] {}", host_label, rule.name),
                    rule.description.clone(),
                    rule.severity.as_str(),
                    rule.category.clone(),
                    evidence.to_string(),
                    now_stamp()
                ],
            )
            .await?;

        connection
            .execute(
                "UPDATE alert_rules SET last_triggered_at = ?2 WHERE id = ?1",
                params![rule.id.clone(), now_stamp()],
            )
            .await?;

        info!("🚨 [RULES]: Alert emitted for rule '{}' on {}.", rule.name, host_label);
        Ok(())
    }

    /**
     * Alerta directa (pipelines IA, escalamientos); sin regla asociada.
     */
    pub async fn emit_direct_alert(
        &self,
        host_id: Option<&str>,
        title: &str,
        message: &str,
        severity: Severity,
        category: &str,
        metadata: Value,
    ) -> Result<String, DbError> {
        let connection = self.database_client.get_connection()?;
        let alert_id = Uuid::new_v4().to_string();

        connection
            .execute(
                "INSERT INTO alerts (id, rule_id, host_id, title, message, severity,
                                     category, metadata, created_at)
                 VALUES (?1, NULL, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    alert_id.clone(),
                    host_id,
                    title,
                    message,
                    severity.as_str(),
                    category,
                    metadata.to_string(),
                    now_stamp()
                ],
            )
            .await?;

        Ok(alert_id)
    }

    /**
     * Avisos en vivo: evidencia actual ssl/systemd/disk filtrada por
     * las familias con al menos una regla habilitada. Solo lectura,
     * jamás escribe alertas.
     */
    pub async fn live_warnings_for(
        &self,
        context: &EvaluationContext,
    ) -> Result<Vec<LiveWarning>, DbError> {
        let rules = self.list_rules().await?;
        let enabled_kinds = EnabledKinds::from_rules(&rules);
        Ok(live_warnings(context, enabled_kinds))
    }

    pub async fn alerts_of(&self, host_id: &str) -> Result<Vec<Alert>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT id, rule_id, host_id, title, message, severity, category,
                        metadata, resolved, resolved_at, resolved_by, created_at
                 FROM alerts WHERE host_id = ?1 ORDER BY created_at DESC",
                params![host_id],
            )
            .await?;

        let mut alerts = Vec::new();
        while let Some(row) = rows.next().await? {
            alerts.push(Alert {
                id: text_at(&row, 0),
                rule_id: opt_text_at(&row, 1),
                host_id: opt_text_at(&row, 2),
                title: text_at(&row, 3),
                message: text_at(&row, 4),
                severity: Severity::parse(&text_at(&row, 5)),
                category: text_at(&row, 6),
                metadata: opt_text_at(&row, 7)
                    .and_then(|metadata_text| serde_json::from_str(&metadata_text).ok())
                    .unwrap_or(Value::Null),
                resolved: bool_at(&row, 8),
                resolved_at: stamp_at(&row, 9),
                resolved_by: opt_text_at(&row, 10),
                created_at: stamp_at(&row, 11).unwrap_or_else(Utc::now),
            });
        }
        Ok(alerts)
    }

    /// Conteo de alertas de las últimas 24 h (agregación de salud).
    pub async fn alert_count_last_24h(&self) -> Result<i64, DbError> {
        let connection = self.database_client.get_connection()?;
        let window_start = crate::repositories::stamp_of(Utc::now() - chrono::Duration::hours(24));

        let mut rows = connection
            .query("SELECT COUNT(*) FROM alerts WHERE created_at >= ?1", params![window_start])
            .await?;

        Ok(rows.next().await?.map(|row| int_at(&row, 0)).unwrap_or(0))
    }
}

fn rule_from_row(row: &libsql::Row) -> Result<AlertRule, DbError> {
    let condition: RuleCondition = serde_json::from_str(&text_at(row, 4))
        .map_err(|fault| DbError::MappingError(format!("condition_json: {}", fault)))?;

    Ok(AlertRule {
        id: text_at(row, 0),
        name: text_at(row, 1),
        description: text_at(row, 2),
        category: text_at(row, 3),
        condition,
        severity: Severity::parse(&text_at(row, 5)),
        enabled: bool_at(row, 6),
        scope: match opt_text_at(row, 7) {
            Some(scoped_host_id) => RuleScope::Host(scoped_host_id),
            None => RuleScope::Global,
        },
        cooldown_minutes: int_at(row, 8),
        last_triggered_at: stamp_at(row, 9),
    })
}
