//! DHCP regeneration pipeline
//!
//! The orchestrator of the system: reads the full device inventory, rebuilds
//! every boot script, accumulates per-device lease stanzas and writes the
//! DHCPv4 and DHCPv6 server configurations, then reloads the daemons.
//!
//! Regeneration is a full rebuild and runs on a background worker (see
//! `regen`). Nothing here fails: every step error is logged, forwarded to the
//! event sink and swallowed, so one bad device or an unwritable path degrades
//! the output instead of stopping the run.

use std::sync::Arc;

use kestrel_common::{Device, DeviceKind};
use kestrel_ztp::{client_id, DhcpScope, HostStanza, TemplateSet};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, DhcpScopeConfig};
use crate::net::InterfaceResolver;
use crate::notify::EventSink;
use crate::scripts::ScriptWriter;
use crate::store::InventoryStore;

pub struct DhcpGenerator {
    store: Arc<dyn InventoryStore>,
    resolver: Arc<dyn InterfaceResolver>,
    templates: Arc<TemplateSet>,
    scripts: Arc<ScriptWriter>,
    events: Arc<dyn EventSink>,
    config: Arc<AppConfig>,
}

impl DhcpGenerator {
    pub fn new(
        store: Arc<dyn InventoryStore>,
        resolver: Arc<dyn InterfaceResolver>,
        templates: Arc<TemplateSet>,
        scripts: Arc<ScriptWriter>,
        events: Arc<dyn EventSink>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            store,
            resolver,
            templates,
            scripts,
            events,
            config,
        }
    }

    /// Run one full regeneration pass. Infallible by design; see module docs.
    pub async fn generate(&self) {
        info!("regenerating DHCP configuration and boot scripts");

        let devices = match self.store.list_devices().await {
            Ok(devices) => devices,
            Err(e) => {
                error!(error = %e, "cannot read device inventory, skipping regeneration");
                self.events
                    .send_event(&format!("dhcp regeneration: cannot read inventory: {}", e))
                    .await;
                return;
            }
        };

        let server_v4 = self.local_address(false);
        let server_v6 = self.local_address(true);

        if let Err(e) = self.scripts.remove_all().await {
            warn!(error = %e, "cannot clear scripts directory before rebuild");
        }

        let mut hosts_v4 = String::new();
        let mut hosts_v6 = String::new();

        for device in &devices {
            let is_v6 = device.fixed_ip_is_v6();
            self.scripts.generate_for_device(device, is_v6).await;

            let params =
                self.host_params(device, is_v6, server_v4.as_deref(), server_v6.as_deref());
            match self.templates.host_stanza(device.device_type, is_v6, &params) {
                Ok(stanza) => {
                    if is_v6 {
                        hosts_v6.push_str(&stanza);
                    } else {
                        hosts_v4.push_str(&stanza);
                    }
                }
                Err(e) => {
                    error!(serial = %device.serial, error = %e, "cannot render host stanza");
                    self.events
                        .send_event(&format!(
                            "dhcp regeneration: host stanza for {}: {}",
                            device.serial, e
                        ))
                        .await;
                }
            }
        }

        self.write_family(false, server_v4.as_deref().unwrap_or(""), &hosts_v4)
            .await;
        self.write_family(true, server_v6.as_deref().unwrap_or(""), &hosts_v6)
            .await;

        debug!(devices = devices.len(), "regeneration pass complete");
    }

    fn local_address(&self, is_v6: bool) -> Option<String> {
        let resolved = if is_v6 {
            self.resolver.first_ipv6().map(|a| a.map(|a| a.to_string()))
        } else {
            self.resolver.first_ipv4().map(|a| a.map(|a| a.to_string()))
        };
        match resolved {
            Ok(Some(addr)) => Some(addr),
            Ok(None) => {
                warn!(
                    family = if is_v6 { "IPv6" } else { "IPv4" },
                    "local address unknown, server configuration will carry a blank address"
                );
                None
            }
            Err(e) => {
                warn!(error = %e, "cannot enumerate local addresses");
                None
            }
        }
    }

    /// Lease-stanza parameters for one device.
    fn host_params(
        &self,
        device: &Device,
        is_v6: bool,
        server_v4: Option<&str>,
        server_v6: Option<&str>,
    ) -> HostStanza {
        let port = self.config.web_port;
        let image_url = device
            .image
            .as_ref()
            .map(|i| i.location_url.clone())
            .unwrap_or_default();
        let config_url = device
            .config
            .as_ref()
            .map(|c| c.location_url.clone())
            .unwrap_or_default();

        let mut params = HostStanza {
            host_name: device.hostname.clone(),
            client_id: client_id(&device.serial, is_v6),
            fixed_address: device.fixed_ip.clone(),
            ..Default::default()
        };

        match (device.device_type, is_v6) {
            (DeviceKind::IosXr, false) => {
                let server = server_v4.unwrap_or("");
                params.fqdn = format!("{}.{}", device.hostname, self.config.dhcp4.domain);
                params.boot_file = format!("http://{}:{}{}", server, port, image_url);
                params.script_file =
                    format!("http://{}:{}/scripts/{}.sh", server, port, device.serial);
            }
            (DeviceKind::IosXr, true) => {
                let server = server_v6.unwrap_or("");
                // The v6 stanza advertises the config URL as its script file
                // and builds the FQDN from the IPv4 domain; devices in the
                // field consume these exact option values.
                params.fqdn = format!("{}.{}", device.hostname, self.config.dhcp4.domain);
                params.boot_file = format!("http://[{}]:{}{}", server, port, image_url);
                params.script_file = format!("http://[{}]:{}{}", server, port, config_url);
            }
            (DeviceKind::NxOs, _) => {
                params.script_file = format!("/tftboot/public/scripts/{}.py", device.serial);
            }
        }

        params
    }

    /// Render, write and activate the server configuration for one family.
    async fn write_family(&self, is_v6: bool, server_ip: &str, hosts: &str) {
        let family = if is_v6 { "DHCPv6" } else { "DHCPv4" };
        let scope_config: &DhcpScopeConfig = if is_v6 {
            &self.config.dhcp6
        } else {
            &self.config.dhcp4
        };

        let scope = DhcpScope {
            server_ip: server_ip.to_string(),
            domain: scope_config.domain.clone(),
            name_servers: scope_config.name_servers.clone(),
            subnet: scope_config.subnet.clone(),
            netmask: scope_config.netmask.clone(),
            hosts: hosts.to_string(),
        };

        let rendered = match self.templates.dhcp_conf(is_v6, &scope) {
            Ok(rendered) => rendered,
            Err(e) => {
                error!(family, error = %e, "cannot render server configuration");
                self.events
                    .send_event(&format!("dhcp regeneration: {} template: {}", family, e))
                    .await;
                return;
            }
        };

        if let Err(e) = tokio::fs::write(&scope_config.config_path, rendered).await {
            error!(
                family,
                path = %scope_config.config_path.display(),
                error = %e,
                "cannot write server configuration"
            );
            self.events
                .send_event(&format!(
                    "dhcp regeneration: writing {}: {}",
                    scope_config.config_path.display(),
                    e
                ))
                .await;
        }

        info!(family, command = %scope_config.reload_command, "reloading DHCP service");
        match Command::new("bash")
            .arg("-c")
            .arg(&scope_config.reload_command)
            .output()
            .await
        {
            Ok(output) => {
                if !output.stdout.is_empty() {
                    debug!(
                        family,
                        output = %String::from_utf8_lossy(&output.stdout),
                        "reload command output"
                    );
                }
                if !output.status.success() {
                    warn!(family, status = %output.status, "reload command exited nonzero");
                }
            }
            Err(e) => warn!(family, error = %e, "cannot run reload command"),
        }
    }
}
