// [libs/infra/db/src/lib.rs]
/*!
 * =================================================================
 * APARATO: INVENTORY PERSISTENCE INDEX (V5.0)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: PUNTO DE MONTAJE DEL ADAPTADOR DE PERSISTENCIA
 * =================================================================
 */

pub mod client;
pub mod errors;
pub mod schema;
pub mod repositories;

pub use client::DbClient;
pub use errors::DbError;
