// [libs/infra/db/src/repositories/mod.rs]
/*!
 * =================================================================
 * APARATO: REPOSITORY REGISTRY (V5.2)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: REGISTRO DE REPOSITORIOS Y HELPERS DE FILA
 *
 * Los timestamps se escriben SIEMPRE en formato "%Y-%m-%d %H:%M:%S"
 * UTC (paridad con CURRENT_TIMESTAMP de SQLite) para que las
 * comparaciones lexicográficas en SQL sean correctas.
 * =================================================================
 */

pub mod audit;
pub mod hosts;
pub mod inventory;
pub mod snapshots;
pub mod edges;
pub mod rules;
pub mod ai;
pub mod jobs;
pub mod network;

pub use audit::AuditRepository;
pub use hosts::HostRepository;
pub use inventory::InventoryMapper;
pub use snapshots::{SnapshotOutcome, SnapshotRepository};
pub use edges::EdgeRepository;
pub use rules::RuleRepository;
pub use ai::AiRepository;
pub use jobs::JobRepository;
pub use network::NetworkScanRepository;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use libsql::Row;

/// Formato de paridad con CURRENT_TIMESTAMP de SQLite.
const STAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub(crate) fn now_stamp() -> String {
    Utc::now().format(STAMP_FORMAT).to_string()
}

pub(crate) fn stamp_of(instant: DateTime<Utc>) -> String {
    instant.format(STAMP_FORMAT).to_string()
}

pub(crate) fn parse_stamp(text: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(text, STAMP_FORMAT)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

// ------------------------------------------------------------------
// HELPERS DE LECTURA DE FILA
// ------------------------------------------------------------------

pub(crate) fn text_at(row: &Row, index: i32) -> String {
    match row.get_value(index) {
        Ok(libsql::Value::Text(text)) => text,
        Ok(libsql::Value::Integer(number)) => number.to_string(),
        Ok(libsql::Value::Real(number)) => number.to_string(),
        _ => String::new(),
    }
}

pub(crate) fn opt_text_at(row: &Row, index: i32) -> Option<String> {
    match row.get_value(index) {
        Ok(libsql::Value::Text(text)) if !text.is_empty() => Some(text),
        _ => None,
    }
}

pub(crate) fn int_at(row: &Row, index: i32) -> i64 {
    match row.get_value(index) {
        Ok(libsql::Value::Integer(number)) => number,
        Ok(libsql::Value::Real(number)) => number as i64,
        Ok(libsql::Value::Text(text)) => text.parse().unwrap_or(0),
        _ => 0,
    }
}

pub(crate) fn opt_int_at(row: &Row, index: i32) -> Option<i64> {
    match row.get_value(index) {
        Ok(libsql::Value::Integer(number)) => Some(number),
        Ok(libsql::Value::Real(number)) => Some(number as i64),
        _ => None,
    }
}

pub(crate) fn float_at(row: &Row, index: i32) -> f64 {
    match row.get_value(index) {
        Ok(libsql::Value::Real(number)) => number,
        Ok(libsql::Value::Integer(number)) => number as f64,
        Ok(libsql::Value::Text(text)) => text.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

pub(crate) fn bool_at(row: &Row, index: i32) -> bool {
    int_at(row, index) != 0
}

pub(crate) fn stamp_at(row: &Row, index: i32) -> Option<DateTime<Utc>> {
    opt_text_at(row, index).and_then(|text| parse_stamp(&text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certify_stamp_round_trip() {
        let now = Utc::now();
        let stamped = stamp_of(now);
        let recovered = parse_stamp(&stamped).expect("stamp must parse");
        // Paridad al segundo (el formato descarta sub-segundos).
        assert_eq!(recovered.timestamp(), now.timestamp());
    }

    /// El formato debe ordenar lexicográficamente igual que el tiempo.
    #[test]
    fn certify_stamp_lexicographic_order() {
        let earlier = stamp_of(Utc::now() - chrono::Duration::minutes(31));
        let later = now_stamp();
        assert!(earlier < later);
    }
}
