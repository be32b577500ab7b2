// [libs/domain/gather/src/lib.rs]
/*!
 * =================================================================
 * APARATO: GATHER SCRIPT FORGE INDEX (V5.0)
 * CLASIFICACIÓN: DOMAIN GENERATORS (ESTRATO L2)
 * RESPONSABILIDAD: PUNTO DE MONTAJE DE LOS GENERADORES DE SCRIPT
 *
 * # Mathematical Proof (Determinism):
 * generate_gather_script(opts) es una función pura de sus opciones:
 * generaciones repetidas con las mismas opciones producen salida
 * byte-idéntica. Ningún reloj ni aleatoriedad participa en el forjado;
 * las marcas de tiempo las emite el host remoto en ejecución.
 * =================================================================
 */

pub mod script;
pub mod discovery;

pub use script::{generate_gather_script, GatherScriptOptions, GATHER_SCRIPT_VERSION};
pub use discovery::{
    discovery_command_for, generate_config_discovery_script, ConfigDiscoveryOptions,
};
