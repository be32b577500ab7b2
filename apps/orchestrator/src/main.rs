// [apps/orchestrator/src/main.rs]
/*!
 * =================================================================
 * APARATO: ORCHESTRATOR MAIN ENTRY POINT (V5.1 - INVENTORY MASTER)
 * CLASIFICACIÓN: APPLICATION SHELL (ESTRATO L3)
 * RESPONSABILIDAD: BOOTSTRAP DE INFRAESTRUCTURA E IGNICIÓN SEGURA
 *
 * # Mathematical Proof (Deterministic Ignition):
 * La certificación de la bóveda y la liberación de candados huérfanos
 * ocurren ANTES de levantar scheduler y workers, previniendo estados
 * de carrera donde un worker arranque con una llave maestra inválida
 * o contra un candado de inferencia fantasma.
 * =================================================================
 */

use dotenvy::dotenv;
use sysmap_orchestrator::prelude::*;
use sysmap_shared_watchtower::init_tracing;
use tracing::{error, info};

/**
 * Punto de ignición supremo del binario del orquestador.
 */
fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. CARGA DE ENTORNO SOBERANO
    dotenv().ok();

    // 2. INICIALIZACIÓN DE OBSERVABILIDAD NEURAL (WATCHTOWER)
    init_tracing("sysmap_orchestrator");

    // 3. RUNTIME SOBERANO CON PILA AMPLIADA (documentos de 10 MB en vuelo)
    let runtime_orchestrator = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_stack_size(4 * 1024 * 1024)
        .build()?;

    runtime_orchestrator.block_on(async {
        info!("🛰️  [COMMAND_CENTER]: Global ignition sequence starting...");

        // 4. ADQUISICIÓN DE COORDENADAS TÁCTICAS
        let runtime_config = match RuntimeConfig::from_env() {
            Ok(config) => config,
            Err(config_fault) => {
                error!("❌ [COMMAND_CENTER]: Environment incomplete: {}", config_fault);
                std::process::exit(1);
            }
        };

        // 5. IGNICIÓN DEL KERNEL
        match OrchestratorKernel::ignite(runtime_config).await {
            Ok(kernel) => kernel.launch_sovereign_operations().await,
            Err(ignition_fault) => {
                error!("❌ [COMMAND_CENTER]: Ignition collapsed: {}", ignition_fault);
                std::process::exit(1);
            }
        }
    });

    Ok(())
}
