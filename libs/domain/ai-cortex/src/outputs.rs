// [libs/domain/ai-cortex/src/outputs.rs]
/*!
 * =================================================================
 * APARATO: CORTEX OUTPUT CONTRACTS (V5.2 - CONSTRAINED SHAPES)
 * CLASIFICACIÓN: DOMAIN MODELS (ESTRATO L2)
 * RESPONSABILIDAD: SALIDAS TIPADAS DE LOS PIPELINES DE INFERENCIA
 *
 * Todas las salidas LLM se deserializan contra estos contratos; los
 * valores fuera de dominio colapsan al default conservador en vez de
 * abortar el pipeline.
 * =================================================================
 */

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------
// SERVER SUMMARY
// ------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSummary {
    /// Rol de una línea ("PostgreSQL primary", "edge proxy").
    pub purpose: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub summary: String,
}

// ------------------------------------------------------------------
// ANOMALY CHECK
// ------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FindingAssessment {
    #[default]
    Normal,
    Suspicious,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyFinding {
    pub title: String,
    #[serde(default)]
    pub assessment: FindingAssessment,
    #[serde(default)]
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyReport {
    #[serde(default)]
    pub overall_risk: RiskLevel,
    #[serde(default)]
    pub findings: Vec<AnomalyFinding>,
    #[serde(default)]
    pub summary: String,
}

impl AnomalyReport {
    /// Escalamiento a alerta: critical si el riesgo global o cualquier
    /// hallazgo es critical; warning ante riesgo high; None en el resto.
    pub fn alert_escalation(&self) -> Option<sysmap_domain_models::snapshot::Severity> {
        use sysmap_domain_models::snapshot::Severity;

        let any_critical_finding = self
            .findings
            .iter()
            .any(|finding| finding.assessment == FindingAssessment::Critical);

        if self.overall_risk == RiskLevel::Critical || any_critical_finding {
            Some(Severity::Critical)
        } else if self.overall_risk == RiskLevel::High {
            Some(Severity::Warning)
        } else {
            None
        }
    }
}

// ------------------------------------------------------------------
// LOG ANALYSIS
// ------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Healthy,
    Degraded,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogAnalysisReport {
    /// 0 (colapsado) a 100 (impecable).
    #[serde(default)]
    pub status_score: u8,
    #[serde(default)]
    pub status: HealthStatus,
    #[serde(default)]
    pub summary: Vec<String>,
    #[serde(default)]
    pub findings: Vec<AnomalyFinding>,
}

impl LogAnalysisReport {
    pub const MAX_FINDINGS: usize = 8;

    /// Recorta los hallazgos al tope del contrato.
    pub fn clamp(mut self) -> Self {
        self.findings.truncate(Self::MAX_FINDINGS);
        self.status_score = self.status_score.min(100);
        self
    }
}

// ------------------------------------------------------------------
// RUNBOOK
// ------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunbookPriority {
    // El orden de declaración fija el sort: critical < important < routine.
    Critical,
    Important,
    #[default]
    Routine,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunbookSection {
    pub title: String,
    #[serde(default)]
    pub priority: RunbookPriority,
    #[serde(default)]
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunbookDocument {
    #[serde(default)]
    pub sections: Vec<RunbookSection>,
}

impl RunbookDocument {
    /// Orden de entrega: critical → important → routine.
    pub fn sorted(mut self) -> Self {
        self.sections.sort_by_key(|section| section.priority);
        self
    }
}

// ------------------------------------------------------------------
// PROCESS MAP TREE
// ------------------------------------------------------------------

/// Tipos de nodo del árbol de configuración por proceso.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeNodeType {
    ConfigFile,
    Port,
    Path,
    Directory,
    Vhost,
    Upstream,
    Connection,
    Volume,
    Parameter,
    User,
    Module,
    Database,
    Log,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessTreeNode {
    #[serde(rename = "type")]
    pub node_type: TreeNodeType,
    pub value: String,
    #[serde(default)]
    pub children: Vec<ProcessTreeNode>,
}

impl ProcessTreeNode {
    pub fn leaf(node_type: TreeNodeType, value: impl Into<String>) -> Self {
        Self { node_type, value: value.into(), children: Vec::new() }
    }

    /// Conteo total de nodos del árbol (incluida la raíz).
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(ProcessTreeNode::node_count).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sysmap_domain_models::snapshot::Severity;

    #[test]
    fn certify_anomaly_escalation_matrix() {
        let report = |overall_risk, assessment| AnomalyReport {
            overall_risk,
            findings: vec![AnomalyFinding {
                title: "t".into(),
                assessment,
                detail: String::new(),
            }],
            summary: String::new(),
        };

        assert_eq!(
            report(RiskLevel::Critical, FindingAssessment::Normal).alert_escalation(),
            Some(Severity::Critical)
        );
        assert_eq!(
            report(RiskLevel::Low, FindingAssessment::Critical).alert_escalation(),
            Some(Severity::Critical)
        );
        assert_eq!(
            report(RiskLevel::High, FindingAssessment::Normal).alert_escalation(),
            Some(Severity::Warning)
        );
        assert_eq!(report(RiskLevel::Medium, FindingAssessment::Suspicious).alert_escalation(), None);
    }

    #[test]
    fn certify_log_report_clamping() {
        let report = LogAnalysisReport {
            status_score: 150,
            status: HealthStatus::Degraded,
            summary: vec![],
            findings: (0..12)
                .map(|index| AnomalyFinding {
                    title: format!("finding {}", index),
                    assessment: FindingAssessment::Normal,
                    detail: String::new(),
                })
                .collect(),
        }
        .clamp();

        assert_eq!(report.findings.len(), LogAnalysisReport::MAX_FINDINGS);
        assert_eq!(report.status_score, 100);
    }

    #[test]
    fn certify_runbook_priority_sort() {
        let document = RunbookDocument {
            sections: vec![
                RunbookSection { title: "backups".into(), priority: RunbookPriority::Routine, steps: vec![] },
                RunbookSection { title: "restore db".into(), priority: RunbookPriority::Critical, steps: vec![] },
                RunbookSection { title: "rotate certs".into(), priority: RunbookPriority::Important, steps: vec![] },
            ],
        }
        .sorted();

        assert_eq!(document.sections[0].priority, RunbookPriority::Critical);
        assert_eq!(document.sections[1].priority, RunbookPriority::Important);
        assert_eq!(document.sections[2].priority, RunbookPriority::Routine);
    }

    #[test]
    fn certify_tree_wire_shape() {
        let tree = ProcessTreeNode {
            node_type: TreeNodeType::ConfigFile,
            value: "/etc/nginx/nginx.conf".into(),
            children: vec![
                ProcessTreeNode::leaf(TreeNodeType::Port, "443"),
                ProcessTreeNode::leaf(TreeNodeType::Upstream, "10.0.0.8:9000"),
            ],
        };

        let wire = serde_json::to_value(&tree).unwrap();
        assert_eq!(wire["type"], "config_file");
        assert_eq!(wire["children"][0]["type"], "port");
        assert_eq!(tree.node_count(), 3);

        let recovered: ProcessTreeNode = serde_json::from_value(wire).unwrap();
        assert_eq!(recovered.node_count(), 3);
    }
}
