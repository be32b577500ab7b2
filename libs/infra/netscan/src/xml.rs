// [libs/infra/netscan/src/xml.rs]
/*!
 * APARATO: SCANNER XML PARSER
 * RESPONSABILIDAD: Parseo tolerante del XML del escáner externo.
 *
 * Forma consumida: <host state="up"> con <address addrtype="ipv4">,
 * <hostname> opcional, cero o más <port> con <state> y <service
 * name=…> opcional, y <osmatch name=…> opcional. Los bloques
 * <hosthint> se ignoran.
 */

use roxmltree::{Document, Node};

use crate::{DiscoveredHost, DiscoveredPort, NetScanError};

/**
 * Parsea el documento XML completo a la lista de hosts vivos.
 *
 * # Errors:
 * `NetScanError::Xml` ante documento malformado; los hosts sin
 * dirección IPv4 se descartan en silencio.
 */
pub fn parse_scan_xml(xml_body: &str) -> Result<Vec<DiscoveredHost>, NetScanError> {
    let document =
        Document::parse(xml_body).map_err(|parse_fault| NetScanError::Xml(parse_fault.to_string()))?;

    let mut discovered_hosts = Vec::new();

    for host_node in document
        .descendants()
        .filter(|node| node.has_tag_name("host"))
    {
        // <hosthint> comparte hijos con <host>; solo el bloque real
        // lleva <status state="up">.
        let is_up = host_node
            .children()
            .find(|child| child.has_tag_name("status"))
            .and_then(|status| status.attribute("state"))
            .map(|state| state == "up")
            .unwrap_or(false);

        if !is_up {
            continue;
        }

        let Some(ip_address) = ipv4_address_of(&host_node) else {
            continue;
        };

        let hostname = host_node
            .descendants()
            .find(|node| node.has_tag_name("hostname"))
            .and_then(|node| node.attribute("name"))
            .map(str::to_string);

        let os_guess = host_node
            .descendants()
            .find(|node| node.has_tag_name("osmatch"))
            .and_then(|node| node.attribute("name"))
            .map(str::to_string);

        let ports = host_node
            .descendants()
            .filter(|node| node.has_tag_name("port"))
            .filter_map(|port_node| parse_port(&port_node))
            .collect();

        discovered_hosts.push(DiscoveredHost { ip: ip_address, hostname, os_guess, ports });
    }

    Ok(discovered_hosts)
}

fn ipv4_address_of(host_node: &Node<'_, '_>) -> Option<String> {
    host_node
        .children()
        .filter(|child| child.has_tag_name("address"))
        .find(|address| {
            address
                .attribute("addrtype")
                .map(|kind| kind == "ipv4")
                .unwrap_or(true)
        })
        .and_then(|address| address.attribute("addr"))
        .map(str::to_string)
}

fn parse_port(port_node: &Node<'_, '_>) -> Option<DiscoveredPort> {
    let port_number: u16 = port_node.attribute("portid")?.parse().ok()?;
    let protocol = port_node.attribute("protocol").unwrap_or("tcp").to_string();

    let state = port_node
        .children()
        .find(|child| child.has_tag_name("state"))
        .and_then(|state| state.attribute("state"))
        .unwrap_or("unknown")
        .to_string();

    // Solo puertos efectivamente abiertos aportan al inventario.
    if state != "open" {
        return None;
    }

    let service = port_node
        .children()
        .find(|child| child.has_tag_name("service"))
        .and_then(|service| service.attribute("name"))
        .map(str::to_string);

    Some(DiscoveredPort { port: port_number, protocol, state, service })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_XML: &str = r#"<?xml version="1.0"?>
<nmaprun scanner="nmap">
  <hosthint><status state="up"/><address addr="10.0.0.99" addrtype="ipv4"/></hosthint>
  <host>
    <status state="up"/>
    <address addr="10.0.0.5" addrtype="ipv4"/>
    <address addr="AA:BB:CC:DD:EE:FF" addrtype="mac"/>
    <hostnames><hostname name="web01" type="PTR"/></hostnames>
    <ports>
      <port protocol="tcp" portid="22"><state state="open"/><service name="ssh"/></port>
      <port protocol="tcp" portid="80"><state state="open"/><service name="http"/></port>
      <port protocol="tcp" portid="443"><state state="closed"/></port>
    </ports>
    <os><osmatch name="Linux 5.X" accuracy="96"/></os>
  </host>
  <host>
    <status state="down"/>
    <address addr="10.0.0.6" addrtype="ipv4"/>
  </host>
</nmaprun>"#;

    #[test]
    fn certify_sample_parse() {
        let hosts = parse_scan_xml(SAMPLE_XML).expect("sample must parse");
        assert_eq!(hosts.len(), 1);

        let host = &hosts[0];
        assert_eq!(host.ip, "10.0.0.5");
        assert_eq!(host.hostname.as_deref(), Some("web01"));
        assert_eq!(host.os_guess.as_deref(), Some("Linux 5.X"));

        // Solo los puertos abiertos sobreviven.
        assert_eq!(host.ports.len(), 2);
        assert_eq!(host.ports[0].port, 22);
        assert_eq!(host.ports[0].service.as_deref(), Some("ssh"));
    }

    /// El bloque <hosthint> jamás produce un host (10.0.0.99 no existe
    /// como <host> real).
    #[test]
    fn certify_hosthint_ignored() {
        let hosts = parse_scan_xml(SAMPLE_XML).unwrap();
        assert!(hosts.iter().all(|host| host.ip != "10.0.0.99"));
    }

    #[test]
    fn certify_malformed_xml_surfaces() {
        assert!(matches!(parse_scan_xml("<nmaprun><host>"), Err(NetScanError::Xml(_))));
    }

    #[test]
    fn certify_empty_run_yields_no_hosts() {
        let hosts = parse_scan_xml("<nmaprun></nmaprun>").unwrap();
        assert!(hosts.is_empty());
    }
}
