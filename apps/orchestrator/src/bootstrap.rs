// [apps/orchestrator/src/bootstrap.rs]
/*!
 * =================================================================
 * APARATO: SYSTEM BOOTSTRAP (V5.3 - PRE-FLIGHT CERTIFICATION)
 * CLASIFICACIÓN: APPLICATION SHELL (ESTRATO L3)
 * RESPONSABILIDAD: CERTIFICACIÓN PRE-OPERATIVA DEL DESPLIEGUE
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. VAULT SELF-TEST: la bóveda sella y abre material aleatorio; el
 *    fallo detiene el proceso antes de tocar un solo host.
 * 2. PHOENIX RECOVERY: libera el candado de inferencia huérfano y
 *    re-encola los jobs que un worker muerto dejó en 'active'.
 * 3. SEED ONCE: siembra el set de reglas por defecto exactamente una
 *    vez en la vida del despliegue.
 * =================================================================
 */

use tracing::{info, instrument, warn};

use crate::state::AppState;

/// Autoridad de arranque del sistema.
pub struct Bootstrap;

impl Bootstrap {
    /**
     * Ejecuta la certificación pre-operativa completa. Bloqueante por
     * diseño: scheduler y workers no existen hasta que esto retorna.
     *
     * # Errors:
     * Cualquier fallo aborta la ignición; el proceso no debe operar a
     * medio certificar.
     */
    #[instrument(skip_all)]
    pub async fn execute_preflight_certification(state: &AppState) -> anyhow::Result<()> {
        info!("🩺 [BOOTSTRAP]: Initiating pre-flight certification V5.3...");

        // 1. AUTODIAGNÓSTICO DE LA BÓVEDA (halt ante fallo)
        state.vault.self_test()?;
        info!("🔐 [BOOTSTRAP]: Vault round-trip certified.");

        // 2. SINGLETON LLM + RECUPERACIÓN DEL CANDADO
        state.ai.ensure_settings(&state.config.llm_bootstrap).await?;
        if state.ai.force_release_lock().await? {
            warn!("🔓 [BOOTSTRAP]: Orphaned inference lock released.");
        }

        // 3. RE-ENCOLADO DE JOBS ZOMBI (worker muerto con job en vuelo)
        let recovered_jobs = state.jobs.recover_zombies().await?;
        if recovered_jobs > 0 {
            warn!("💀 [BOOTSTRAP]: {} zombie jobs requeued.", recovered_jobs);
        }

        // 4. SIEMBRA ÚNICA DEL SET DE REGLAS
        let seeded_rules = state.rules.seed_defaults_once().await?;
        if seeded_rules > 0 {
            info!("🌱 [BOOTSTRAP]: Default alert rules installed ({}).", seeded_rules);
        }

        let _ = state
            .audit
            .record("system", "bootstrap", "orchestrator", "ok", None)
            .await;

        info!("✅ [BOOTSTRAP]: All strata level. Operational mode authorized.");
        Ok(())
    }
}
