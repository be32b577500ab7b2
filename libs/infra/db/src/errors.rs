// [libs/infra/db/src/errors.rs]
/*!
 * =================================================================
 * APARATO: DATABASE ERROR CATALOG (V5.2 - INVENTORY SOBERANO)
 * CLASIFICACIÓN: INFRASTRUCTURE CORE (ESTRATO L3)
 * RESPONSABILIDAD: CATALOGACIÓN SEMÁNTICA DE FALLOS DE PERSISTENCIA
 * =================================================================
 */

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    /// Error de enlace físico o de URL con el motor libSQL.
    #[error("[L3_DB_NET_FAULT]: DATABASE_UPLINK_SEVERED -> {0}")]
    ConnectionError(String),

    /// Fallo de configuración del entorno (variables vacías o malformadas).
    #[error("[L3_DB_CONFIG_FAULT]: STRATEGIC_ENV_VOID -> {0}")]
    ConfigurationError(String),

    /// Error de sintaxis o ejecución devuelto por el motor libSQL.
    #[error("[L3_DB_QUERY_FAULT]: SQL_QUERY_REJECTED -> {0}")]
    QueryError(#[from] libsql::Error),

    /// Fallo en la transformación de tipos entre SQLite y el dominio.
    #[error("[L3_DB_MAPPING_FAULT]: DATA_MAPPING_VIOLATION -> {0}")]
    MappingError(String),

    /// La transacción del mapeador venció su plazo blando.
    #[error("[L3_DB_FAULT]: TRANSACTION_DEADLINE_EXCEEDED after {0}s")]
    DeadlineExceeded(u64),

    // --- ESTRATO DE INVENTARIO ---

    #[error("[L3_INVENTORY_FAULT]: HOST_NOT_FOUND")]
    HostNotFound,

    /// El documento recolectado carece de la sección 'os' obligatoria.
    #[error("[L3_INVENTORY_FAULT]: DOCUMENT_MALFORMED -> missing mandatory 'os' section")]
    MalformedDocument,

    /// Otro worker mantiene el host en 'scanning'.
    #[error("[L3_INVENTORY_FAULT]: SCAN_IN_PROGRESS")]
    ScanInProgress,

    // --- ESTRATO DE HISTORIA ---

    /// Colisión de (host, scan_number): bug de numeración, jamás se absorbe.
    #[error("[L3_SNAPSHOT_FAULT]: SNAPSHOT_NUMBER_COLLISION at scan {0}")]
    SnapshotCollision(i64),

    // --- ESTRATO DE COLAS ---

    #[error("[L3_JOB_FAULT]: JOB_NOT_FOUND")]
    JobNotFound,

    /// Ya existe un job vivo con la misma identidad de objetivo.
    #[error("[L3_JOB_FAULT]: DUPLICATE_ACTIVE_JOB -> {0}")]
    DuplicateActiveJob(String),

    // --- ESTRATO DE INFERENCIA ---

    /// El candado de escritor único pertenece a otro worker.
    #[error("[L3_CORTEX_GATE]: INFERENCE_LOCK_BUSY -> held for host {0}")]
    InferenceLockBusy(String),

    #[error("[L3_CORTEX_GATE]: LLM_SETTINGS_ABSENT")]
    LlmSettingsAbsent,
}
