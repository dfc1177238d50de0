//! Kestrel artifact rendering
//!
//! This crate renders the text artifacts a booting device consumes:
//!
//! - per-device boot scripts (IOS-XR ZTP shell, NX-OS POAP python)
//! - per-device DHCP lease stanzas (XR/NX × IPv4/IPv6)
//! - the top-level DHCPv4 and DHCPv6 server configurations
//!
//! All artifacts come from file templates loaded out of a template
//! directory; rendering never HTML-escapes, so quoted strings survive
//! byte-for-byte into shell and python output.
//!
//! # Example
//!
//! ```
//! use kestrel_ztp::{bundled_templates_dir, TemplateSet, XrScriptParams};
//!
//! let templates = TemplateSet::from_dir(bundled_templates_dir());
//! let script = templates.xr_script(&XrScriptParams {
//!     server_url: "http://192.0.2.1:8080".to_string(),
//!     config_url: "/configs/c1.conf".to_string(),
//! }).unwrap();
//!
//! assert!(script.contains("/configs/c1.conf"));
//! ```

pub mod dhcp;
pub mod error;
pub mod script;
pub mod template;

pub use dhcp::{client_id, DhcpScope, HostStanza};
pub use error::{Result, ZtpError};
pub use script::{NxScriptParams, XrScriptParams};
pub use template::{bundled_templates_dir, TemplateSet};
