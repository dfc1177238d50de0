//! Device reachability probe
//!
//! Pings a device's fixed address once and records the outcome as
//! `Reachable` or `Unreachable`, notifying the chat room when the status
//! actually changes. Matching devices by their fixed address is a known
//! limitation: NAT or proxies between server and device break the
//! correlation.

use std::sync::Arc;

use kestrel_common::{Device, DeviceStatus};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::notify::ChatSink;
use crate::store::InventoryStore;

/// Probe one device and persist the result.
pub async fn probe_device(
    store: Arc<dyn InventoryStore>,
    chat: Arc<dyn ChatSink>,
    device: Device,
) {
    let replied = ping_once(&device.fixed_ip, device.fixed_ip_is_v6()).await;
    let target = if replied {
        DeviceStatus::Reachable
    } else {
        DeviceStatus::Unreachable
    };

    debug!(serial = %device.serial, replied, "probe finished");

    if device.status.as_ref() == Some(&target) {
        return;
    }

    let mut updated = device.clone();
    updated.status = Some(target.clone());
    updated.updated_at = chrono::Utc::now();
    if let Err(e) = store.update_device(&updated).await {
        warn!(serial = %device.serial, error = %e, "cannot record probe result");
        return;
    }

    let text = match target {
        DeviceStatus::Reachable => format!(
            "Device {} (serial {}) is reachable. Test succeeded.",
            device.hostname, device.serial
        ),
        _ => format!(
            "Device {} (serial {}) unreachable. Test failed.",
            device.hostname, device.serial
        ),
    };
    chat.send_message(&text).await;
}

async fn ping_once(address: &str, is_v6: bool) -> bool {
    let mut command = Command::new("ping");
    if is_v6 {
        command.arg("-6");
    }
    command.args(["-c", "1", "-W", "2"]).arg(address);
    matches!(command.output().await, Ok(output) if output.status.success())
}
