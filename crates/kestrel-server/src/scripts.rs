//! Boot script writer
//!
//! Renders the per-device boot script through `kestrel-ztp` and persists it
//! under the public scripts directory, keyed by serial: `<serial>.sh` for
//! IOS-XR, `<serial>.py` for NX-OS.

use std::path::PathBuf;
use std::sync::Arc;

use kestrel_common::{Device, DeviceKind};
use kestrel_ztp::{NxScriptParams, TemplateSet, XrScriptParams};
use tokio::fs;
use tracing::{debug, warn};

use crate::net::InterfaceResolver;

pub struct ScriptWriter {
    templates: Arc<TemplateSet>,
    resolver: Arc<dyn InterfaceResolver>,
    scripts_dir: PathBuf,
    web_port: u16,
}

impl ScriptWriter {
    pub fn new(
        templates: Arc<TemplateSet>,
        resolver: Arc<dyn InterfaceResolver>,
        scripts_dir: PathBuf,
        web_port: u16,
    ) -> Self {
        Self {
            templates,
            resolver,
            scripts_dir,
            web_port,
        }
    }

    /// Render and persist the boot script for one device.
    ///
    /// Never propagates failure: an unknown local address skips just this
    /// device, and template or filesystem errors are logged so the pipeline
    /// can continue with the remaining devices.
    pub async fn generate_for_device(&self, device: &Device, is_ipv6: bool) {
        if let Err(e) = self.try_generate(device, is_ipv6).await {
            warn!(serial = %device.serial, error = %e, "failed to generate boot script");
        }
    }

    async fn try_generate(&self, device: &Device, is_ipv6: bool) -> anyhow::Result<()> {
        let Some(server_ip) = self.server_ip(is_ipv6)? else {
            warn!(
                serial = %device.serial,
                "local address unknown, cannot build boot script"
            );
            return Ok(());
        };

        let (body, file_name) = match device.device_type {
            DeviceKind::IosXr => {
                let params = XrScriptParams {
                    server_url: server_url(&server_ip, is_ipv6, self.web_port),
                    config_url: device
                        .config
                        .as_ref()
                        .map(|c| c.location_url.clone())
                        .unwrap_or_default(),
                };
                (
                    self.templates.xr_script(&params)?,
                    format!("{}.sh", device.serial),
                )
            }
            DeviceKind::NxOs => {
                let params = NxScriptParams {
                    server_ip,
                    image_name: device
                        .image
                        .as_ref()
                        .map(|i| i.name.clone())
                        .unwrap_or_default(),
                    config_name: device
                        .config
                        .as_ref()
                        .map(|c| format!("{}.conf", c.name))
                        .unwrap_or_default(),
                };
                (
                    self.templates.nx_script(&params)?,
                    format!("{}.py", device.serial),
                )
            }
        };

        let path = self.scripts_dir.join(&file_name);
        fs::write(&path, body).await?;
        debug!(path = %path.display(), "wrote boot script");
        Ok(())
    }

    /// Delete every file in the scripts directory. Regeneration is a full
    /// rebuild, so stale scripts must not survive it.
    pub async fn remove_all(&self) -> std::io::Result<()> {
        let mut entries = fs::read_dir(&self.scripts_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                fs::remove_dir_all(&path).await?;
            } else {
                fs::remove_file(&path).await?;
            }
        }
        Ok(())
    }

    fn server_ip(&self, is_ipv6: bool) -> anyhow::Result<Option<String>> {
        if is_ipv6 {
            Ok(self.resolver.first_ipv6()?.map(|a| a.to_string()))
        } else {
            Ok(self.resolver.first_ipv4()?.map(|a| a.to_string()))
        }
    }
}

/// Base URL of this server as seen from a booting device.
fn server_url(ip: &str, is_ipv6: bool, port: u16) -> String {
    if is_ipv6 {
        format!("http://[{}]:{}", ip, port)
    } else {
        format!("http://{}:{}", ip, port)
    }
}
