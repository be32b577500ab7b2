// [libs/domain/models/src/rules.rs]
/*!
 * =================================================================
 * APARATO: ALERT RULE CONTRACTS (V4.2 - CONDITION TAGGED)
 * CLASIFICACIÓN: DOMAIN MODELS (ESTRATO L2)
 * RESPONSABILIDAD: CONDICIONES POLIMÓRFICAS Y EMISIÓN DE ALERTAS
 *
 * La condición es una variante etiquetada serde (tag = "kind") que
 * selecciona uno de los cinco evaluadores del motor de reglas.
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::snapshot::Severity;

/// Definición polimórfica de la condición de regla.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleCondition {
    /// daysLeft = 0 exige is_expired; daysLeft > 0 exige vigencia con
    /// margen restante <= umbral.
    SslExpiry { days_left: i64 },
    /// Coincide con montajes cuyo use_pct >= threshold.
    DiskUsage { threshold: i64 },
    /// Coincide con unidades en active_state == "failed".
    SystemdFailed {},
    /// Coincide cuando los diffs del contexto, filtrados por categoría y
    /// tipo de cambio, alcanzan el umbral.
    DiffCount {
        #[serde(skip_serializing_if = "Option::is_none")]
        category: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        change_type: Option<String>,
        threshold: i64,
    },
    /// Coincide cuando ningún servicio con ese nombre existe en el host.
    ServiceMissing { service_name: String },
}

/// Alcance de evaluación: todos los hosts o un host concreto.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleScope {
    Global,
    Host(String),
}

impl RuleScope {
    pub fn applies_to(&self, host_id: &str) -> bool {
        match self {
            RuleScope::Global => true,
            RuleScope::Host(scoped_host_id) => scoped_host_id == host_id,
        }
    }
}

/// Regla administrada por el operador.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub condition: RuleCondition,
    pub severity: Severity,
    pub enabled: bool,
    pub scope: RuleScope,
    pub cooldown_minutes: i64,
    pub last_triggered_at: Option<DateTime<Utc>>,
}

impl AlertRule {
    /// Ventana anti-tormenta: true si la regla sigue enfriándose.
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        match self.last_triggered_at {
            Some(last_fire) => {
                now.signed_duration_since(last_fire)
                    < chrono::Duration::minutes(self.cooldown_minutes)
            }
            None => false,
        }
    }
}

/// Alerta emitida; 'resolved' la saca de las vistas activas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub rule_id: Option<String>,
    pub host_id: Option<String>,
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub category: String,
    /// Sub-documento con la evidencia exacta de la coincidencia.
    pub metadata: Value,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn certify_condition_tagging() {
        let condition = RuleCondition::SslExpiry { days_left: 7 };
        let wire = serde_json::to_value(&condition).unwrap();
        assert_eq!(wire["kind"], "ssl_expiry");
        assert_eq!(wire["days_left"], 7);

        let recovered: RuleCondition = serde_json::from_value(wire).unwrap();
        assert_eq!(recovered, condition);
    }

    #[test]
    fn certify_diff_count_optional_filters() {
        let wire: RuleCondition = serde_json::from_str(
            r#"{"kind":"diff_count","threshold":5}"#
        ).unwrap();
        assert_eq!(
            wire,
            RuleCondition::DiffCount { category: None, change_type: None, threshold: 5 }
        );
    }

    #[test]
    fn certify_cooldown_window() {
        let now = Utc::now();
        let rule = AlertRule {
            id: "r1".into(),
            name: "SSL expiring".into(),
            description: String::new(),
            category: "ssl".into(),
            condition: RuleCondition::SslExpiry { days_left: 7 },
            severity: Severity::Critical,
            enabled: true,
            scope: RuleScope::Global,
            cooldown_minutes: 60,
            last_triggered_at: Some(now - Duration::minutes(30)),
        };

        assert!(rule.in_cooldown(now));

        let cooled_rule = AlertRule {
            last_triggered_at: Some(now - Duration::minutes(61)),
            ..rule
        };
        assert!(!cooled_rule.in_cooldown(now));
    }

    #[test]
    fn certify_scope_application() {
        assert!(RuleScope::Global.applies_to("h1"));
        assert!(RuleScope::Host("h1".into()).applies_to("h1"));
        assert!(!RuleScope::Host("h1".into()).applies_to("h2"));
    }
}
