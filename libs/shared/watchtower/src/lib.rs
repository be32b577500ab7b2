// [libs/shared/watchtower/src/lib.rs]
/*!
 * =================================================================
 * APARATO: WATCHTOWER NEURAL OBSERVER (V3.2 - INVENTORY TUNED)
 * CLASIFICACIÓN: SHARED UTILITY (ESTRATO L4/L6)
 * RESPONSABILIDAD: GESTIÓN DE TELEMETRÍA, TRAZADO Y CAPTURA DE PÁNICOS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. NOISE GATING: Silencia los estratos de infraestructura ruidosos
 *    (russh, hyper, reqwest, libsql) priorizando el rastro de dominio.
 * 2. PHOENIX SHIELD: Hook de pánico con detección de estrato y volcado
 *    forense del payload antes de la defunción del proceso.
 * 3. DUAL MODE: Logs interactivos en desarrollo, JSON plano en
 *    producción para la ingesta del Panóptico.
 * =================================================================
 */

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as formatting_layer, EnvFilter};
use tracing::{error, info};
use std::panic;

/// Inicializa el sistema de trazas Watchtower con blindaje de pánicos.
///
/// # Comportamiento:
/// - Desarrollo: logs compactos con resaltado y sin target.
/// - Producción: estructura JSON plana para ingesta centralizada.
///
/// # Errors:
/// Provoca pánico si otro suscriptor global ya fue inicializado en el runtime.
pub fn init_tracing(service_nominal_identifier: &str) {
    // 1. FILTRO DINÁMICO: dominio en primer plano, infraestructura en sordina.
    let environmental_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            format!(
                "{}={level},russh=warn,hyper=warn,reqwest=warn,libsql=error",
                service_nominal_identifier,
                level = if cfg!(debug_assertions) { "debug" } else { "info" }
            ).into()
        });

    let is_production_strata = !cfg!(debug_assertions);

    // 2. ARQUITECTURA DE SUSCRIPCIÓN (Dual Mode)
    if is_production_strata {
        tracing_subscriber::registry()
            .with(environmental_filter)
            .with(formatting_layer::layer().json().flatten_event(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(environmental_filter)
            .with(formatting_layer::layer().compact().with_target(false))
            .init();
    }

    // 3. PROTOCOLO PHOENIX SHIELD (Global Panic Hook)
    // Captura colapsos en hilos secundarios (workers de escaneo) antes
    // de la terminación del proceso.
    let service_id_snapshot = service_nominal_identifier.to_string();

    panic::set_hook(Box::new(move |panic_metadata| {
        let panic_location = panic_metadata.location()
            .map(|location| format!("{}:{}:{}", location.file(), location.line(), location.column()))
            .unwrap_or_else(|| "UNKNOWN_STRATA_COORDINATES".to_string());

        let panic_payload_message = panic_metadata.payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| panic_metadata.payload().downcast_ref::<String>().map(|s| s.as_str()))
            .unwrap_or("UNDEFINED_KERNEL_COLLAPSE_PAYLOAD");

        error!(
            target: "panic_monitor",
            service = %service_id_snapshot,
            estrato = %panic_location,
            "🔥 [CRITICAL_PANIC]: Thread terminated abruptly. Analysis: {}",
            panic_payload_message
        );
    }));

    info!(
        "👁️  [WATCHTOWER_ONLINE]: Observability strata levelized for [{}]. Phoenix Shield ACTIVE.",
        service_nominal_identifier
    );
}
