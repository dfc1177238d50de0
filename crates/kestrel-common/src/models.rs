use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv6Addr};

/// The two supported network operating systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceKind {
    #[serde(rename = "iOS-XR")]
    IosXr,
    #[serde(rename = "NX-OS")]
    NxOs,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 2] = [DeviceKind::IosXr, DeviceKind::NxOs];

    /// Machine-readable name used in the store and over the API.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::IosXr => "iOS-XR",
            DeviceKind::NxOs => "NX-OS",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "iOS-XR" => Some(DeviceKind::IosXr),
            "NX-OS" => Some(DeviceKind::NxOs),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device lifecycle status
///
/// Boot sequence order: `Installing image` → `Running day 0 config` →
/// `Running init script` → `Provisioned`. `Reachable`/`Unreachable` come from
/// the liveness probe and are not ordered relative to the boot sequence.
/// The order is advisory; any artifact fetch can move the status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceStatus {
    #[serde(rename = "Installing image")]
    InstallingImage,
    #[serde(rename = "Running day 0 config")]
    RunningDayZeroConfig,
    #[serde(rename = "Running init script")]
    RunningInitScript,
    #[serde(rename = "Provisioned")]
    Provisioned,
    #[serde(rename = "Reachable")]
    Reachable,
    #[serde(rename = "Unreachable")]
    Unreachable,
}

impl DeviceStatus {
    /// Exact status string as stored and notified.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::InstallingImage => "Installing image",
            DeviceStatus::RunningDayZeroConfig => "Running day 0 config",
            DeviceStatus::RunningInitScript => "Running init script",
            DeviceStatus::Provisioned => "Provisioned",
            DeviceStatus::Reachable => "Reachable",
            DeviceStatus::Unreachable => "Unreachable",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered network device.
///
/// `serial`, `hostname` and `fixed_ip` are each unique across the inventory;
/// the store enforces this on insert and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub serial: String,
    pub hostname: String,
    /// IPv4 or IPv6 address literal the DHCP server will hand out.
    pub fixed_ip: String,
    pub device_type: DeviceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Image>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<DeviceConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DeviceStatus>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Device {
    pub fn new(
        serial: impl Into<String>,
        hostname: impl Into<String>,
        fixed_ip: impl Into<String>,
        device_type: DeviceKind,
    ) -> Self {
        let now = Utc::now();
        Self {
            serial: serial.into(),
            hostname: hostname.into(),
            fixed_ip: fixed_ip.into(),
            device_type,
            image: None,
            config: None,
            status: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the fixed address is an IPv6 literal. Anything that does not
    /// parse as IPv6 (including junk) is treated as IPv4.
    pub fn fixed_ip_is_v6(&self) -> bool {
        self.fixed_ip.parse::<Ipv6Addr>().is_ok()
    }

    pub fn parsed_ip(&self) -> Option<IpAddr> {
        self.fixed_ip.parse().ok()
    }
}

/// A named day-0 configuration blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub name: String,
    pub device_type: DeviceKind,
    /// Opaque CLI configuration text applied by the device on first boot.
    #[serde(default)]
    pub configuration: String,
    /// Server-relative URL the generated file is served from.
    #[serde(default)]
    pub location_url: String,
}

/// An OS image available for installation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub name: String,
    pub device_type: DeviceKind,
    #[serde(default)]
    pub location_url: String,
}

/// Device type reference data, seeded once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceType {
    pub name: String,
}

/// Global settings singleton. Writes replace the whole record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Chat room that receives provisioning notifications.
    #[serde(default)]
    pub chat_room_id: String,
    /// Endpoint that receives operational error events.
    #[serde(default)]
    pub event_bus_url: String,
}

/// Image/config reassignment for an existing device, keyed by hostname.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceUpdateRequest {
    pub hostname: String,
    #[serde(default)]
    pub image: Option<Image>,
    #[serde(default)]
    pub config: Option<DeviceConfig>,
}

/// Self-report from a device that finished applying its day-0 config.
#[derive(Debug, Clone, Deserialize)]
pub struct ProvisionedReport {
    pub serial: String,
}

/// Structured error body returned by every failing API call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
