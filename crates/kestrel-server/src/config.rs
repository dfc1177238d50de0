//! Environment-sourced configuration
//!
//! All deployment scalars come from `KESTREL_*` environment variables with
//! workable defaults. The DHCP scalars exist once per address family.

use std::env;
use std::path::{Path, PathBuf};

/// DHCP scope scalars for one address family.
#[derive(Debug, Clone)]
pub struct DhcpScopeConfig {
    pub domain: String,
    pub name_servers: String,
    pub subnet: String,
    /// Dotted netmask for IPv4, prefix length for IPv6.
    pub netmask: String,
    /// Where the rendered server configuration is written.
    pub config_path: PathBuf,
    /// Shell command that reloads the DHCP daemon after a write.
    pub reload_command: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub web_port: u16,
    /// Root of the artifact tree served to devices
    /// (`configs/`, `images/`, `scripts/` live underneath).
    pub public_dir: PathBuf,
    pub templates_dir: PathBuf,
    pub database_path: PathBuf,
    pub dhcp4: DhcpScopeConfig,
    pub dhcp6: DhcpScopeConfig,
    pub chat_base_url: String,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl AppConfig {
    pub fn from_env() -> Self {
        let web_port = env::var("KESTREL_WEB_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080);

        let data_dir = PathBuf::from(env_or("KESTREL_DATA_DIR", "/var/lib/kestrel"));

        Self {
            web_port,
            public_dir: env::var("KESTREL_PUBLIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("public")),
            templates_dir: env::var("KESTREL_TEMPLATES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_templates_dir()),
            database_path: data_dir.join("kestrel.redb"),
            dhcp4: DhcpScopeConfig {
                domain: env_or("KESTREL_DHCP_DOMAIN", "ztp.local"),
                name_servers: env_or("KESTREL_DHCP_NAMESERVERS", "8.8.8.8"),
                subnet: env_or("KESTREL_DHCP_SUBNET", "192.168.1.0"),
                netmask: env_or("KESTREL_DHCP_NETMASK", "255.255.255.0"),
                config_path: env_or("KESTREL_DHCP_CONFIG_PATH", "/etc/dhcp/dhcpd.conf").into(),
                reload_command: env_or("KESTREL_DHCP_RELOAD_CMD", "systemctl restart dhcpd"),
            },
            dhcp6: DhcpScopeConfig {
                domain: env_or("KESTREL_DHCP6_DOMAIN", "ztp.local"),
                name_servers: env_or("KESTREL_DHCP6_NAMESERVERS", "2001:4860:4860::8888"),
                subnet: env_or("KESTREL_DHCP6_SUBNET", "2001:db8::"),
                netmask: env_or("KESTREL_DHCP6_NETMASK", "64"),
                config_path: env_or("KESTREL_DHCP6_CONFIG_PATH", "/etc/dhcp/dhcpd6.conf").into(),
                reload_command: env_or("KESTREL_DHCP6_RELOAD_CMD", "systemctl restart dhcpd6"),
            },
            chat_base_url: env_or("KESTREL_CHAT_BASE_URL", "https://webexapis.com"),
        }
    }

    pub fn configs_dir(&self) -> PathBuf {
        self.public_dir.join("configs")
    }

    pub fn images_dir(&self) -> PathBuf {
        self.public_dir.join("images")
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.public_dir.join("scripts")
    }
}

/// Prefer an installed template directory, fall back to the set bundled with
/// the rendering crate.
fn default_templates_dir() -> PathBuf {
    let preferred = Path::new("/opt/kestrel/templates");
    if preferred.exists() {
        preferred.to_path_buf()
    } else {
        kestrel_ztp::bundled_templates_dir()
    }
}
