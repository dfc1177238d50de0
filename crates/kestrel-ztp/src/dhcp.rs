//! DHCP configuration rendering
//!
//! A server configuration is a scope header plus one lease stanza per device,
//! accumulated in inventory order. Stanzas come in four variants (XR/NX ×
//! IPv4/IPv6) because the two device families consume different DHCP options
//! and the two address families use different identifier forms.

use crate::error::Result;
use crate::template::TemplateSet;
use kestrel_common::DeviceKind;
use serde::Serialize;

pub const DHCP4_CONF_TEMPLATE: &str = "dhcpd.conf";
pub const DHCP6_CONF_TEMPLATE: &str = "dhcpd6.conf";

/// Parameters for one per-device lease stanza. Fields a variant does not use
/// stay empty and the template ignores them.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HostStanza {
    pub host_name: String,
    pub client_id: String,
    pub fixed_address: String,
    pub fqdn: String,
    /// URL of the OS image served by this server (XR only).
    pub boot_file: String,
    /// URL or TFTP path of the boot script.
    pub script_file: String,
}

/// Parameters for the top-level DHCP server configuration of one address
/// family. Scalars come from the deployment environment, `hosts` is the
/// accumulated stanza block.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DhcpScope {
    pub server_ip: String,
    pub domain: String,
    pub name_servers: String,
    pub subnet: String,
    pub netmask: String,
    pub hosts: String,
}

impl TemplateSet {
    /// Render one per-device lease stanza.
    pub fn host_stanza(
        &self,
        kind: DeviceKind,
        is_ipv6: bool,
        params: &HostStanza,
    ) -> Result<String> {
        let name = match (kind, is_ipv6) {
            (DeviceKind::IosXr, false) => "dhcp-host-xr.conf",
            (DeviceKind::NxOs, false) => "dhcp-host-nx.conf",
            (DeviceKind::IosXr, true) => "dhcp6-host-xr.conf",
            (DeviceKind::NxOs, true) => "dhcp6-host-nx.conf",
        };
        self.render(name, params)
    }

    /// Render the top-level server configuration for one address family.
    pub fn dhcp_conf(&self, is_ipv6: bool, scope: &DhcpScope) -> Result<String> {
        let name = if is_ipv6 {
            DHCP6_CONF_TEMPLATE
        } else {
            DHCP4_CONF_TEMPLATE
        };
        self.render(name, scope)
    }
}

/// Derive the DHCP client identifier for a device serial.
///
/// IPv4 accepts the raw serial as an opaque identifier. IPv6 requires a
/// structured DUID, synthesized as `00:02:00:00:00:09:` followed by each
/// serial byte as two uppercase hex digits and a trailing `00`. Downstream
/// DHCP clients match on this exact token shape, so the per-character
/// encoding must not change.
pub fn client_id(serial: &str, is_ipv6: bool) -> String {
    if !is_ipv6 {
        return serial.to_string();
    }
    let mut id = String::from("00:02:00:00:00:09:");
    for byte in serial.bytes() {
        id.push_str(&format!("{:02X}:", byte));
    }
    id.push_str("00");
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::bundled_templates_dir;

    fn templates() -> TemplateSet {
        TemplateSet::from_dir(bundled_templates_dir())
    }

    #[test]
    fn test_client_id_v4_is_raw_serial() {
        assert_eq!(client_id("FXS001", false), "FXS001");
    }

    #[test]
    fn test_client_id_v6_duid_shape() {
        // 'F'=0x46 'X'=0x58 'S'=0x53 '0'=0x30 '0'=0x30 '1'=0x31
        assert_eq!(
            client_id("FXS001", true),
            "00:02:00:00:00:09:46:58:53:30:30:31:00"
        );
    }

    #[test]
    fn test_client_id_v6_empty_serial() {
        assert_eq!(client_id("", true), "00:02:00:00:00:09:00");
    }

    #[test]
    fn test_xr_v4_stanza() {
        let stanza = templates()
            .host_stanza(
                DeviceKind::IosXr,
                false,
                &HostStanza {
                    host_name: "xr1".to_string(),
                    client_id: "FXS001".to_string(),
                    fixed_address: "192.168.1.10".to_string(),
                    fqdn: "xr1.ztp.local".to_string(),
                    boot_file: "http://192.0.2.1:8080/images/xr-img".to_string(),
                    script_file: "http://192.0.2.1:8080/scripts/FXS001.sh".to_string(),
                },
            )
            .unwrap();

        assert!(stanza.contains("host xr1 {"));
        assert!(stanza.contains("option dhcp-client-identifier \"FXS001\";"));
        assert!(stanza.contains("fixed-address 192.168.1.10;"));
        assert!(stanza.contains("xr1.ztp.local"));
        assert!(stanza.contains("http://192.0.2.1:8080/scripts/FXS001.sh"));
    }

    #[test]
    fn test_nx_v4_stanza_uses_tftp_path() {
        let stanza = templates()
            .host_stanza(
                DeviceKind::NxOs,
                false,
                &HostStanza {
                    host_name: "nx1".to_string(),
                    client_id: "FXS002".to_string(),
                    fixed_address: "192.168.1.11".to_string(),
                    script_file: "/tftboot/public/scripts/FXS002.py".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(stanza.contains("host nx1 {"));
        assert!(stanza.contains("/tftboot/public/scripts/FXS002.py"));
        // the NX stanza carries no FQDN option
        assert!(!stanza.contains("fqdn"));
    }

    #[test]
    fn test_v6_stanza_uses_duid_identifier() {
        let stanza = templates()
            .host_stanza(
                DeviceKind::IosXr,
                true,
                &HostStanza {
                    host_name: "xr6".to_string(),
                    client_id: client_id("FXS010", true),
                    fixed_address: "2001:db8::10".to_string(),
                    fqdn: "xr6.ztp.local".to_string(),
                    script_file: "http://[2001:db8::1]:8080/configs/c1.conf".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(stanza.contains("host-identifier option dhcp6.client-id"));
        assert!(stanza.contains("00:02:00:00:00:09:"));
        assert!(stanza.contains("fixed-address6 2001:db8::10;"));
    }

    #[test]
    fn test_dhcp_conf_embeds_hosts_block() {
        let t = templates();
        let stanza = t
            .host_stanza(
                DeviceKind::NxOs,
                false,
                &HostStanza {
                    host_name: "nx1".to_string(),
                    client_id: "FXS002".to_string(),
                    fixed_address: "192.168.1.11".to_string(),
                    script_file: "/tftboot/public/scripts/FXS002.py".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();

        let conf = t
            .dhcp_conf(
                false,
                &DhcpScope {
                    server_ip: "192.0.2.1".to_string(),
                    domain: "ztp.local".to_string(),
                    name_servers: "192.0.2.53".to_string(),
                    subnet: "192.168.1.0".to_string(),
                    netmask: "255.255.255.0".to_string(),
                    hosts: stanza.clone(),
                },
            )
            .unwrap();

        assert!(conf.contains("option domain-name \"ztp.local\";"));
        assert!(conf.contains("subnet 192.168.1.0 netmask 255.255.255.0"));
        assert!(conf.contains(&stanza));
    }

    #[test]
    fn test_dhcp_conf_with_blank_server_address() {
        // No usable interface still yields a syntactically complete file.
        let conf = templates()
            .dhcp_conf(
                true,
                &DhcpScope {
                    domain: "ztp.local".to_string(),
                    name_servers: "2001:db8::53".to_string(),
                    subnet: "2001:db8::".to_string(),
                    netmask: "64".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(conf.contains("subnet6 2001:db8::/64"));
    }
}
