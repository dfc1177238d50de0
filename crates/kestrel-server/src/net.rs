//! Local address discovery
//!
//! Generated artifacts embed this server's own address so that booting
//! devices can reach back. Discovery shells out to `ip -j addr show` and
//! takes the first non-loopback address of the requested family, in
//! interface order. "No address" is a valid answer, not an error; the
//! pipeline produces blank-address output rather than aborting.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::process::Command;

use anyhow::Result;

/// Resolves this host's own addresses. Trait-shaped so the pipeline can be
/// exercised with a fixed implementation.
pub trait InterfaceResolver: Send + Sync {
    fn first_ipv4(&self) -> Result<Option<Ipv4Addr>>;
    fn first_ipv6(&self) -> Result<Option<Ipv6Addr>>;
}

/// Resolver backed by the host's real interface table.
pub struct SystemResolver;

impl SystemResolver {
    fn first_of_family(flag: &str) -> Result<Option<String>> {
        // `ip -j -4 addr show` returns JSON like:
        // [{"ifname":"lo","addr_info":[{"local":"127.0.0.1","scope":"host",...}]},
        //  {"ifname":"eth0","addr_info":[{"local":"10.7.1.37","scope":"global",...}]}]
        let output = Command::new("ip").args(["-j", flag, "addr", "show"]).output()?;

        if !output.status.success() {
            anyhow::bail!("'ip {} addr show' exited with {}", flag, output.status);
        }

        let json: serde_json::Value = serde_json::from_slice(&output.stdout)?;
        Ok(first_addr_in(&json))
    }
}

impl InterfaceResolver for SystemResolver {
    fn first_ipv4(&self) -> Result<Option<Ipv4Addr>> {
        Ok(Self::first_of_family("-4")?.and_then(|s| s.parse().ok()))
    }

    fn first_ipv6(&self) -> Result<Option<Ipv6Addr>> {
        Ok(Self::first_of_family("-6")?.and_then(|s| s.parse().ok()))
    }
}

/// Pull the first non-loopback address out of `ip -j addr show` output.
fn first_addr_in(json: &serde_json::Value) -> Option<String> {
    for iface in json.as_array()? {
        if iface["link_type"].as_str() == Some("loopback") {
            continue;
        }
        let Some(addrs) = iface["addr_info"].as_array() else {
            continue;
        };
        for info in addrs {
            // "host" scope is the loopback address family-equivalent
            if info["scope"].as_str() == Some("host") {
                continue;
            }
            if let Some(local) = info["local"].as_str() {
                return Some(local.to_string());
            }
        }
    }
    None
}

/// Resolver returning preconfigured addresses. Used by tests.
pub struct FixedResolver {
    pub ipv4: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
}

impl InterfaceResolver for FixedResolver {
    fn first_ipv4(&self) -> Result<Option<Ipv4Addr>> {
        Ok(self.ipv4)
    }

    fn first_ipv6(&self) -> Result<Option<Ipv6Addr>> {
        Ok(self.ipv6)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_skips_loopback_interface() {
        let json = json!([
            {
                "ifname": "lo",
                "link_type": "loopback",
                "addr_info": [{"local": "127.0.0.1", "scope": "host"}]
            },
            {
                "ifname": "eth0",
                "link_type": "ether",
                "addr_info": [{"local": "10.7.1.37", "scope": "global"}]
            }
        ]);
        assert_eq!(first_addr_in(&json), Some("10.7.1.37".to_string()));
    }

    #[test]
    fn test_no_usable_address_is_none() {
        let json = json!([
            {
                "ifname": "lo",
                "link_type": "loopback",
                "addr_info": [{"local": "::1", "scope": "host"}]
            }
        ]);
        assert_eq!(first_addr_in(&json), None);
        assert_eq!(first_addr_in(&json!([])), None);
    }

    #[test]
    fn test_first_interface_wins() {
        let json = json!([
            {
                "ifname": "eth0",
                "link_type": "ether",
                "addr_info": [{"local": "10.0.0.1", "scope": "global"}]
            },
            {
                "ifname": "eth1",
                "link_type": "ether",
                "addr_info": [{"local": "10.0.0.2", "scope": "global"}]
            }
        ]);
        assert_eq!(first_addr_in(&json), Some("10.0.0.1".to_string()));
    }

    #[test]
    fn test_fixed_resolver() {
        let resolver = FixedResolver {
            ipv4: Some("192.0.2.1".parse().unwrap()),
            ipv6: None,
        };
        assert_eq!(
            resolver.first_ipv4().unwrap(),
            Some("192.0.2.1".parse().unwrap())
        );
        assert_eq!(resolver.first_ipv6().unwrap(), None);
    }
}
