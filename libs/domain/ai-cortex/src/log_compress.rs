// [libs/domain/ai-cortex/src/log_compress.rs]
/*!
 * APARATO: LOG COMPRESSION FILTER
 * RESPONSABILIDAD: Compresión de logs a ~2 KB reteniendo solo líneas
 * sintomáticas antes de alimentar el análisis de inferencia.
 */

use once_cell::sync::Lazy;
use regex::Regex;

/// Presupuesto objetivo del material comprimido (~2 KB).
pub const COMPRESSED_BUDGET_BYTES: usize = 2048;

static SYMPTOM_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)error|fail|warn|crit|oom|panic|kill|denied|segfault").unwrap()
});

/**
 * Retiene las líneas sintomáticas hasta agotar el presupuesto. Las
 * más recientes (finales) tienen prioridad: el colapso suele estar al
 * final del log.
 */
pub fn compress_logs(log_lines: &[String]) -> String {
    let mut retained_reversed: Vec<&str> = Vec::new();
    let mut consumed_bytes = 0usize;

    for line in log_lines.iter().rev() {
        if !SYMPTOM_PATTERN.is_match(line) {
            continue;
        }

        let line_cost = line.len() + 1;
        if consumed_bytes + line_cost > COMPRESSED_BUDGET_BYTES {
            break;
        }

        consumed_bytes += line_cost;
        retained_reversed.push(line.as_str());
    }

    retained_reversed.reverse();
    retained_reversed.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certify_symptom_filtering() {
        let lines = vec![
            "Jan 01 service started cleanly".to_string(),
            "Jan 01 ERROR: connection refused".to_string(),
            "Jan 01 routine housekeeping".to_string(),
            "Jan 01 kernel: Out of memory: Kill process 412 (oom)".to_string(),
        ];

        let compressed = compress_logs(&lines);
        assert!(compressed.contains("ERROR: connection refused"));
        assert!(compressed.contains("Out of memory"));
        assert!(!compressed.contains("started cleanly"));
        assert!(!compressed.contains("housekeeping"));
    }

    #[test]
    fn certify_budget_respected_and_recency_preferred() {
        let lines: Vec<String> = (0..200)
            .map(|index| format!("line {index} with an error marker and some padding text"))
            .collect();

        let compressed = compress_logs(&lines);
        assert!(compressed.len() <= COMPRESSED_BUDGET_BYTES);
        // Las líneas finales (más recientes) sobreviven.
        assert!(compressed.contains("line 199"));
        assert!(!compressed.contains("line 0 "));
    }

    #[test]
    fn certify_empty_input() {
        assert!(compress_logs(&[]).is_empty());
    }
}
