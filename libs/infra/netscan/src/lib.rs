// [libs/infra/netscan/src/lib.rs]
/*!
 * =================================================================
 * APARATO: NETWORK DISCOVERY ADAPTER (V3.2 - TWO PHASE)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: INVOCACIÓN DEL ESCÁNER EXTERNO Y PARSEO XML
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. PHASE ONE: barrido rápido de hosts y puertos top sobre el CIDR.
 * 2. PHASE TWO: detección de versión de servicio y OS restringida a
 *    los hosts vivos de la fase 1, solo cuando son ≤ 50.
 * 3. TOLERANT PARSER: consume la forma <host state="up"> con
 *    <address>, <hostname> opcional, <port> con <state> y <service>;
 *    los bloques <hosthint> se ignoran por diseño.
 * =================================================================
 */

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{info, instrument, warn};

pub mod xml;

pub use xml::parse_scan_xml;

/// Plazo global de una pasada de descubrimiento (10 minutos).
pub const DISCOVERY_DEADLINE_SECS: u64 = 600;
/// Tope de hosts vivos que habilita la fase 2.
pub const PHASE_TWO_HOST_CAP: usize = 50;

#[derive(Error, Debug)]
pub enum NetScanError {
    #[error("[L3_NETSCAN_FAULT]: BINARY_LAUNCH_FAILURE -> {0}")]
    Launch(String),

    #[error("[L3_NETSCAN_FAULT]: SCAN_DEADLINE_EXCEEDED after {0}s")]
    Deadline(u64),

    #[error("[L3_NETSCAN_FAULT]: SCANNER_EXIT_{0}")]
    NonZeroExit(i32),

    #[error("[L3_NETSCAN_FAULT]: XML_MALFORMED -> {0}")]
    Xml(String),
}

/// Puerto abierto observado en un host descubierto.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscoveredPort {
    pub port: u16,
    pub protocol: String,
    pub state: String,
    pub service: Option<String>,
}

/// Host vivo reportado por el escáner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscoveredHost {
    pub ip: String,
    pub hostname: Option<String>,
    pub os_guess: Option<String>,
    pub ports: Vec<DiscoveredPort>,
}

pub struct NetworkScanner {
    binary_path: String,
}

impl NetworkScanner {
    pub fn new(binary_path: impl Into<String>) -> Self {
        Self { binary_path: binary_path.into() }
    }

    /**
     * Ejecuta el protocolo de dos fases sobre la subred.
     *
     * # Errors:
     * Fallos de lanzamiento, plazo vencido, salida no-cero o XML
     * malformado. La fase 2 es opcional: su fallo degrada a los
     * resultados de fase 1 con un warning.
     */
    #[instrument(skip(self), fields(subnet = %subnet_cidr))]
    pub async fn discover(&self, subnet_cidr: &str) -> Result<Vec<DiscoveredHost>, NetScanError> {
        // FASE 1: hosts vivos + puertos top, sin resolución DNS.
        let phase_one_xml = self
            .run_scanner(&["-T4", "-n", "--top-ports", "100", subnet_cidr])
            .await?;

        let alive_hosts = parse_scan_xml(&phase_one_xml)?;

        if alive_hosts.is_empty() {
            info!("📡 [NETSCAN]: Subnet {} reported no live hosts.", subnet_cidr);
            return Ok(Vec::new());
        }

        // FASE 2: versión de servicio + OS, solo con ≤ 50 vivos.
        if alive_hosts.len() > PHASE_TWO_HOST_CAP {
            warn!(
                "📡 [NETSCAN]: {} live hosts exceed the deep-probe cap ({}); returning phase-1 data.",
                alive_hosts.len(),
                PHASE_TWO_HOST_CAP
            );
            return Ok(alive_hosts);
        }

        let target_ips: Vec<String> =
            alive_hosts.iter().map(|host| host.ip.clone()).collect();

        let mut phase_two_args: Vec<&str> = vec!["-sV", "-O", "--top-ports", "100", "-n"];
        let ip_refs: Vec<&str> = target_ips.iter().map(String::as_str).collect();
        phase_two_args.extend(ip_refs);

        match self.run_scanner(&phase_two_args).await.and_then(|xml| parse_scan_xml(&xml)) {
            Ok(enriched_hosts) if !enriched_hosts.is_empty() => Ok(enriched_hosts),
            Ok(_) => Ok(alive_hosts),
            Err(phase_two_fault) => {
                warn!("📡 [NETSCAN]: Phase-2 probe degraded: {}. Keeping phase-1 data.", phase_two_fault);
                Ok(alive_hosts)
            }
        }
    }

    async fn run_scanner(&self, arguments: &[&str]) -> Result<String, NetScanError> {
        let mut full_arguments: Vec<&str> = vec!["-oX", "-"];
        full_arguments.extend_from_slice(arguments);

        let scanner_invocation = Command::new(&self.binary_path)
            .args(&full_arguments)
            .kill_on_drop(true)
            .output();

        let output = timeout(Duration::from_secs(DISCOVERY_DEADLINE_SECS), scanner_invocation)
            .await
            .map_err(|_| NetScanError::Deadline(DISCOVERY_DEADLINE_SECS))?
            .map_err(|launch_fault| NetScanError::Launch(launch_fault.to_string()))?;

        if !output.status.success() {
            return Err(NetScanError::NonZeroExit(output.status.code().unwrap_or(-1)));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
