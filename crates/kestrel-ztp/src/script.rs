//! Per-device boot script rendering
//!
//! Two script flavors exist, one per device family:
//!
//! - IOS-XR devices fetch a shell script over DHCP option 67 and run it under
//!   the ZTP helper; it downloads and applies the day-0 configuration.
//! - NX-OS devices run a POAP python script that pulls both the OS image and
//!   the day-0 configuration from this server.

use crate::error::Result;
use crate::template::TemplateSet;
use serde::Serialize;

pub const XR_SCRIPT_TEMPLATE: &str = "ztp-xr.sh";
pub const NX_SCRIPT_TEMPLATE: &str = "poap-nx.py";

/// Parameters for the IOS-XR ZTP shell script.
#[derive(Debug, Clone, Default, Serialize)]
pub struct XrScriptParams {
    /// Base URL of this server, e.g. `http://192.0.2.1:8080`.
    pub server_url: String,
    /// Server-relative URL of the device's day-0 configuration.
    pub config_url: String,
}

/// Parameters for the NX-OS POAP python script.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NxScriptParams {
    /// Address of this server, no scheme or port.
    pub server_ip: String,
    /// Name of the OS image file to install.
    pub image_name: String,
    /// Name of the day-0 configuration file, `.conf` suffix included.
    pub config_name: String,
}

impl TemplateSet {
    /// Render the IOS-XR ZTP bootstrap script.
    pub fn xr_script(&self, params: &XrScriptParams) -> Result<String> {
        self.render(XR_SCRIPT_TEMPLATE, params)
    }

    /// Render the NX-OS POAP bootstrap script.
    pub fn nx_script(&self, params: &NxScriptParams) -> Result<String> {
        self.render(NX_SCRIPT_TEMPLATE, params)
    }
}
