// [libs/domain/rules/src/lib.rs]
/*!
 * =================================================================
 * APARATO: ALERT RULE ENGINE (V4.4 - COOLDOWN GATED)
 * CLASIFICACIÓN: DOMAIN ENGINE (ESTRATO L2)
 * RESPONSABILIDAD: EVALUACIÓN DE CONDICIONES Y AVISOS EN VIVO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. FIVE EVALUATORS: ssl_expiry, disk_usage, systemd_failed,
 *    diff_count y service_missing sobre el contexto fresco.
 * 2. EVIDENCE RICH: cada coincidencia devuelve el sub-documento de
 *    evidencia exacto que viaja en la metadata de la alerta.
 * 3. SEED ONCE: el set de reglas por defecto se siembra en el primer
 *    arranque y jamás se re-siembra.
 * 4. ANTI-SPAM GATE: los avisos en vivo solo se computan para las
 *    familias con al menos una regla habilitada.
 * =================================================================
 */

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use sysmap_core_document::{safe_bool, safe_int, safe_str};
use sysmap_domain_diff::DiffDraft;
use sysmap_domain_models::rules::{AlertRule, RuleCondition, RuleScope};
use sysmap_domain_models::snapshot::Severity;

// ------------------------------------------------------------------
// CONTEXTO DE EVALUACIÓN
// ------------------------------------------------------------------

/// Estado fresco del host contra el que corren las condiciones. Los
/// diffs solo están presentes cuando el escaneo produjo cambios.
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    pub diffs: Vec<DiffDraft>,
    pub certificates: Vec<Value>,
    pub mounts: Vec<Value>,
    pub systemd_units: Vec<Value>,
    pub service_names: HashSet<String>,
}

// ------------------------------------------------------------------
// EVALUADORES
// ------------------------------------------------------------------

/**
 * Corre una condición contra el contexto. `Some(evidence)` ante
 * coincidencia; la evidencia viaja en la metadata de la alerta.
 */
pub fn evaluate_condition(condition: &RuleCondition, context: &EvaluationContext) -> Option<Value> {
    match condition {
        RuleCondition::SslExpiry { days_left } => {
            let matched: Vec<Value> = context
                .certificates
                .iter()
                .filter(|certificate| {
                    let is_expired = safe_bool(certificate.get("is_expired"));
                    let remaining_days = safe_int(certificate.get("days_left"), i64::MAX);
                    if *days_left == 0 {
                        is_expired
                    } else {
                        !is_expired && remaining_days <= *days_left
                    }
                })
                .map(|certificate| {
                    json!({
                        "path": safe_str(certificate.get("path")),
                        "subject": safe_str(certificate.get("subject")),
                        "days_left": safe_int(certificate.get("days_left"), 0),
                        "is_expired": safe_bool(certificate.get("is_expired")),
                    })
                })
                .collect();

            (!matched.is_empty()).then(|| json!({ "certificates": matched }))
        }

        RuleCondition::DiskUsage { threshold } => {
            let matched: Vec<Value> = context
                .mounts
                .iter()
                .filter(|mount| safe_int(mount.get("use_pct"), -1) >= *threshold)
                .map(|mount| {
                    json!({
                        "mountpoint": safe_str(mount.get("mountpoint")),
                        "use_pct": safe_int(mount.get("use_pct"), -1),
                        "threshold": threshold,
                    })
                })
                .collect();

            (!matched.is_empty()).then(|| json!({ "mounts": matched }))
        }

        RuleCondition::SystemdFailed {} => {
            let matched: Vec<Value> = context
                .systemd_units
                .iter()
                .filter(|unit| safe_str(unit.get("active_state")) == "failed")
                .map(|unit| {
                    json!({
                        "unit": safe_str(unit.get("name")),
                        "sub_state": safe_str(unit.get("sub_state")),
                    })
                })
                .collect();

            (!matched.is_empty()).then(|| json!({ "units": matched }))
        }

        RuleCondition::DiffCount { category, change_type, threshold } => {
            let matching_count = context
                .diffs
                .iter()
                .filter(|diff| {
                    category
                        .as_deref()
                        .map_or(true, |wanted| diff.category.as_str() == wanted)
                        && change_type
                            .as_deref()
                            .map_or(true, |wanted| diff.change_type.as_str() == wanted)
                })
                .count() as i64;

            (matching_count >= *threshold).then(|| {
                json!({
                    "matching_diffs": matching_count,
                    "threshold": threshold,
                    "category": category,
                    "change_type": change_type,
                })
            })
        }

        RuleCondition::ServiceMissing { service_name } => {
            let service_present = context.service_names.contains(service_name);
            (!service_present).then(|| json!({ "missing_service": service_name }))
        }
    }
}

/// Compuertas previas a la condición: habilitación y alcance.
pub fn rule_applies(rule: &AlertRule, host_id: &str) -> bool {
    rule.enabled && rule.scope.applies_to(host_id)
}

// ------------------------------------------------------------------
// SET DE REGLAS SEMILLA
// ------------------------------------------------------------------

/**
 * Reglas por defecto del primer arranque. Los ids son deterministas
 * para que la siembra sea idempotente por unicidad de llave.
 */
pub fn default_rule_set() -> Vec<AlertRule> {
    let seed = |id: &str,
                name: &str,
                description: &str,
                category: &str,
                condition: RuleCondition,
                severity: Severity,
                cooldown_minutes: i64| AlertRule {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        category: category.to_string(),
        condition,
        severity,
        enabled: true,
        scope: RuleScope::Global,
        cooldown_minutes,
        last_triggered_at: None,
    };

    vec![
        seed(
            "seed-ssl-expiring",
            "SSL certificate expiring",
            "A certificate has seven days or fewer of validity remaining.",
            "ssl",
            RuleCondition::SslExpiry { days_left: 7 },
            Severity::Critical,
            1440,
        ),
        seed(
            "seed-ssl-expired",
            "SSL certificate expired",
            "A certificate has already expired.",
            "ssl",
            RuleCondition::SslExpiry { days_left: 0 },
            Severity::Critical,
            1440,
        ),
        seed(
            "seed-disk-90",
            "Disk usage above 90%",
            "A mount crossed the 90% occupancy threshold.",
            "disk",
            RuleCondition::DiskUsage { threshold: 90 },
            Severity::Critical,
            360,
        ),
        seed(
            "seed-disk-80",
            "Disk usage above 80%",
            "A mount crossed the 80% occupancy threshold.",
            "disk",
            RuleCondition::DiskUsage { threshold: 80 },
            Severity::Warning,
            720,
        ),
        seed(
            "seed-systemd-failed",
            "Systemd unit failed",
            "A systemd unit sits in active_state=failed.",
            "systemd",
            RuleCondition::SystemdFailed {},
            Severity::Critical,
            180,
        ),
        seed(
            "seed-new-user",
            "New user account",
            "A user account appeared since the previous scan.",
            "security",
            RuleCondition::DiffCount {
                category: Some("user_accounts".into()),
                change_type: Some("added".into()),
                threshold: 1,
            },
            Severity::Warning,
            60,
        ),
        seed(
            "seed-service-removed",
            "Service removed",
            "A listening service disappeared since the previous scan.",
            "services",
            RuleCondition::DiffCount {
                category: Some("services".into()),
                change_type: Some("removed".into()),
                threshold: 1,
            },
            Severity::Warning,
            60,
        ),
        seed(
            "seed-container-change",
            "Container change",
            "A container was added, removed or mutated since the previous scan.",
            "containers",
            RuleCondition::DiffCount {
                category: Some("containers".into()),
                change_type: None,
                threshold: 1,
            },
            Severity::Info,
            60,
        ),
    ]
}

// ------------------------------------------------------------------
// AVISOS EN VIVO (sin escritura de alertas)
// ------------------------------------------------------------------

/// Aviso efímero computado bajo demanda; jamás se persiste.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LiveWarning {
    pub kind: String,
    pub severity: Severity,
    pub message: String,
    pub evidence: Value,
}

/// Familias de regla con la compuerta anti-tormenta activa.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnabledKinds {
    pub ssl: bool,
    pub systemd: bool,
    pub disk: bool,
}

impl EnabledKinds {
    pub fn from_rules(rules: &[AlertRule]) -> Self {
        let mut kinds = EnabledKinds::default();
        for rule in rules.iter().filter(|rule| rule.enabled) {
            match rule.condition {
                RuleCondition::SslExpiry { .. } => kinds.ssl = true,
                RuleCondition::SystemdFailed {} => kinds.systemd = true,
                RuleCondition::DiskUsage { .. } => kinds.disk = true,
                _ => {}
            }
        }
        kinds
    }
}

/**
 * Evidencia actual ssl/systemd/disk filtrada por familias habilitadas,
 * ordenada critical < warning < info.
 */
pub fn live_warnings(context: &EvaluationContext, enabled_kinds: EnabledKinds) -> Vec<LiveWarning> {
    let mut warnings: Vec<LiveWarning> = Vec::new();

    if enabled_kinds.ssl {
        for certificate in &context.certificates {
            let remaining_days = safe_int(certificate.get("days_left"), i64::MAX);
            let is_expired = safe_bool(certificate.get("is_expired"));
            let certificate_path = safe_str(certificate.get("path"));

            if is_expired {
                warnings.push(LiveWarning {
                    kind: "ssl".into(),
                    severity: Severity::Critical,
                    message: format!("certificate {} has expired", certificate_path),
                    evidence: certificate.clone(),
                });
            } else if remaining_days <= 30 {
                warnings.push(LiveWarning {
                    kind: "ssl".into(),
                    severity: Severity::Warning,
                    message: format!(
                        "certificate {} expires in {} days",
                        certificate_path, remaining_days
                    ),
                    evidence: certificate.clone(),
                });
            }
        }
    }

    if enabled_kinds.systemd {
        for unit in &context.systemd_units {
            if safe_str(unit.get("active_state")) == "failed" {
                warnings.push(LiveWarning {
                    kind: "systemd".into(),
                    severity: Severity::Critical,
                    message: format!("unit {} is failed", safe_str(unit.get("name"))),
                    evidence: unit.clone(),
                });
            }
        }
    }

    if enabled_kinds.disk {
        for mount in &context.mounts {
            let use_pct = safe_int(mount.get("use_pct"), -1);
            let mountpoint = safe_str(mount.get("mountpoint"));

            if use_pct >= 95 {
                warnings.push(LiveWarning {
                    kind: "disk".into(),
                    severity: Severity::Critical,
                    message: format!("{} at {}% occupancy", mountpoint, use_pct),
                    evidence: mount.clone(),
                });
            } else if use_pct >= 90 {
                warnings.push(LiveWarning {
                    kind: "disk".into(),
                    severity: Severity::Warning,
                    message: format!("{} at {}% occupancy", mountpoint, use_pct),
                    evidence: mount.clone(),
                });
            }
        }
    }

    warnings.sort_by_key(|warning| warning.severity);
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sysmap_domain_models::snapshot::{ChangeType, DiffCategory};

    fn context_with_certificate(days_left: i64, is_expired: bool) -> EvaluationContext {
        EvaluationContext {
            certificates: vec![json!({
                "path": "/etc/ssl/site.pem",
                "subject": "CN=site",
                "days_left": days_left,
                "is_expired": is_expired
            })],
            ..Default::default()
        }
    }

    /**
     * Un certificado con 3 días de vigencia debe coincidir con la
     * regla de 7 días, y un certificado sano no.
     */
    #[test]
    fn certify_ssl_expiry_threshold() {
        let condition = RuleCondition::SslExpiry { days_left: 7 };

        assert!(evaluate_condition(&condition, &context_with_certificate(3, false)).is_some());
        assert!(evaluate_condition(&condition, &context_with_certificate(7, false)).is_some());
        assert!(evaluate_condition(&condition, &context_with_certificate(8, false)).is_none());
        // Expirado no coincide con el umbral genérico (lo cubre days_left=0).
        assert!(evaluate_condition(&condition, &context_with_certificate(0, true)).is_none());
    }

    /**
     * daysLeft=0 e isExpired=true dispara tanto la regla de umbral
     * cero como deja intacta la genérica (que exige vigencia).
     */
    #[test]
    fn certify_expired_certificate_rules() {
        let zero_condition = RuleCondition::SslExpiry { days_left: 0 };
        let generic_condition = RuleCondition::SslExpiry { days_left: 7 };
        let expired_context = context_with_certificate(0, true);

        assert!(evaluate_condition(&zero_condition, &expired_context).is_some());
        assert!(evaluate_condition(&generic_condition, &expired_context).is_none());
    }

    #[test]
    fn certify_disk_usage_condition() {
        let context = EvaluationContext {
            mounts: vec![
                json!({"mountpoint": "/", "use_pct": 91}),
                json!({"mountpoint": "/var", "use_pct": 50}),
            ],
            ..Default::default()
        };

        let evidence = evaluate_condition(&RuleCondition::DiskUsage { threshold: 90 }, &context)
            .expect("91% must match threshold 90");
        assert_eq!(evidence["mounts"].as_array().unwrap().len(), 1);

        assert!(evaluate_condition(&RuleCondition::DiskUsage { threshold: 92 }, &context).is_none());
    }

    #[test]
    fn certify_systemd_failed_condition() {
        let context = EvaluationContext {
            systemd_units: vec![
                json!({"name": "nginx.service", "active_state": "failed", "sub_state": "failed"}),
                json!({"name": "sshd.service", "active_state": "active", "sub_state": "running"}),
            ],
            ..Default::default()
        };

        let evidence =
            evaluate_condition(&RuleCondition::SystemdFailed {}, &context).expect("must match");
        assert_eq!(evidence["units"][0]["unit"], "nginx.service");
    }

    #[test]
    fn certify_diff_count_filters() {
        let context = EvaluationContext {
            diffs: vec![
                DiffDraft {
                    category: DiffCategory::Services,
                    change_type: ChangeType::Added,
                    item_key: "nginx:80:tcp".into(),
                    old_value: None,
                    new_value: Some(json!({})),
                    severity: Severity::Warning,
                },
                DiffDraft {
                    category: DiffCategory::Mounts,
                    change_type: ChangeType::Modified,
                    item_key: "/".into(),
                    old_value: Some(json!({})),
                    new_value: Some(json!({})),
                    severity: Severity::Info,
                },
            ],
            ..Default::default()
        };

        // "Service removed" no debe dispararse ante un added.
        let service_removed = RuleCondition::DiffCount {
            category: Some("services".into()),
            change_type: Some("removed".into()),
            threshold: 1,
        };
        assert!(evaluate_condition(&service_removed, &context).is_none());

        let any_two = RuleCondition::DiffCount { category: None, change_type: None, threshold: 2 };
        assert!(evaluate_condition(&any_two, &context).is_some());
    }

    #[test]
    fn certify_service_missing_condition() {
        let mut context = EvaluationContext::default();
        context.service_names.insert("sshd".into());

        let missing_nginx = RuleCondition::ServiceMissing { service_name: "nginx".into() };
        assert!(evaluate_condition(&missing_nginx, &context).is_some());

        let present_sshd = RuleCondition::ServiceMissing { service_name: "sshd".into() };
        assert!(evaluate_condition(&present_sshd, &context).is_none());
    }

    #[test]
    fn certify_default_seed_composition() {
        let rules = default_rule_set();
        assert_eq!(rules.len(), 8);
        assert!(rules.iter().all(|rule| rule.enabled));
        assert!(rules.iter().all(|rule| matches!(rule.scope, RuleScope::Global)));

        // Ids deterministas para siembra idempotente.
        let unique_ids: HashSet<&str> = rules.iter().map(|rule| rule.id.as_str()).collect();
        assert_eq!(unique_ids.len(), rules.len());
    }

    /**
     * Los avisos en vivo respetan la compuerta por familia y el orden
     * critical < warning < info.
     */
    #[test]
    fn certify_live_warnings_gate_and_sort() {
        let context = EvaluationContext {
            certificates: vec![json!({"path": "/etc/ssl/a.pem", "days_left": 10, "is_expired": false})],
            systemd_units: vec![json!({"name": "db.service", "active_state": "failed"})],
            mounts: vec![json!({"mountpoint": "/", "use_pct": 96})],
            ..Default::default()
        };

        let all_enabled = EnabledKinds { ssl: true, systemd: true, disk: true };
        let warnings = live_warnings(&context, all_enabled);
        assert_eq!(warnings.len(), 3);
        assert_eq!(warnings[0].severity, Severity::Critical);
        assert_eq!(warnings[2].severity, Severity::Warning);

        // Compuerta: sin reglas ssl habilitadas, nada de ssl.
        let no_ssl = EnabledKinds { ssl: false, systemd: true, disk: true };
        let warnings = live_warnings(&context, no_ssl);
        assert!(warnings.iter().all(|warning| warning.kind != "ssl"));
    }

    #[test]
    fn certify_enabled_kinds_extraction() {
        let rules = default_rule_set();
        let kinds = EnabledKinds::from_rules(&rules);
        assert!(kinds.ssl && kinds.systemd && kinds.disk);

        let kinds_empty = EnabledKinds::from_rules(&[]);
        assert!(!kinds_empty.ssl && !kinds_empty.systemd && !kinds_empty.disk);
    }
}
