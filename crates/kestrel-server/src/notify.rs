//! Outbound notifications
//!
//! Two sinks exist: a chat room for provisioning progress and an event bus
//! for operational errors from background work. Both are gated on the
//! settings singleton, no-op quietly when unconfigured, and never surface
//! failure to their callers; a notification is best-effort by contract.
//!
//! The HTTP client tolerates self-signed certificates (lab chat deployments
//! rarely have real ones) but caps every call at 10 seconds so a dead
//! endpoint cannot pile up background tasks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use crate::net::InterfaceResolver;
use crate::store::InventoryStore;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Chat notification sink.
#[async_trait]
pub trait ChatSink: Send + Sync {
    /// Deliver a markdown message to the configured room. Best-effort.
    async fn send_message(&self, markdown: &str);
}

/// Operational event sink.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Report an operational error event. Best-effort.
    async fn send_event(&self, description: &str);
}

fn insecure_client() -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .timeout(REQUEST_TIMEOUT)
        .build()?)
}

/// Posts messages to a Webex-Teams-shaped chat API.
pub struct ChatClient {
    store: Arc<dyn InventoryStore>,
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ChatClient {
    /// Bearer token comes from `KESTREL_CHAT_TOKEN`; without it the client
    /// stays a silent no-op.
    pub fn new(store: Arc<dyn InventoryStore>, base_url: String) -> anyhow::Result<Self> {
        Ok(Self {
            store,
            http: insecure_client()?,
            base_url,
            token: std::env::var("KESTREL_CHAT_TOKEN")
                .ok()
                .filter(|t| !t.is_empty()),
        })
    }
}

#[async_trait]
impl ChatSink for ChatClient {
    async fn send_message(&self, markdown: &str) {
        let settings = match self.store.get_settings().await {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                debug!("no settings stored, dropping chat notification");
                return;
            }
            Err(e) => {
                warn!(error = %e, "cannot read settings, dropping chat notification");
                return;
            }
        };
        if settings.chat_room_id.is_empty() {
            debug!("no chat room configured, dropping notification");
            return;
        }
        let Some(token) = &self.token else {
            debug!("no chat token configured, dropping notification");
            return;
        };

        let payload = json!({
            "roomId": settings.chat_room_id,
            "markdown": markdown,
        });

        let result = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!("chat notification delivered");
            }
            Ok(response) => {
                warn!(status = %response.status(), "chat API rejected notification");
            }
            Err(e) => warn!(error = %e, "cannot reach chat API"),
        }
    }
}

/// Posts operational error events to the settings-configured event bus.
pub struct EventBusClient {
    store: Arc<dyn InventoryStore>,
    resolver: Arc<dyn InterfaceResolver>,
    http: reqwest::Client,
}

impl EventBusClient {
    pub fn new(
        store: Arc<dyn InventoryStore>,
        resolver: Arc<dyn InterfaceResolver>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            store,
            resolver,
            http: insecure_client()?,
        })
    }

    /// Source address reported with each event: first local IPv4, falling
    /// back to IPv6.
    fn source_address(&self) -> Option<String> {
        if let Ok(Some(addr)) = self.resolver.first_ipv4() {
            return Some(addr.to_string());
        }
        if let Ok(Some(addr)) = self.resolver.first_ipv6() {
            return Some(addr.to_string());
        }
        None
    }
}

#[async_trait]
impl EventSink for EventBusClient {
    async fn send_event(&self, description: &str) {
        let settings = match self.store.get_settings().await {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                debug!("no settings stored, dropping event");
                return;
            }
            Err(e) => {
                warn!(error = %e, "cannot read settings, dropping event");
                return;
            }
        };
        if settings.event_bus_url.is_empty() {
            debug!("no event bus configured, dropping event");
            return;
        }

        let Some(source) = self.source_address() else {
            warn!("no local address found, dropping event");
            return;
        };

        let payload = json!({
            "description": description,
            "source": source,
        });

        match self
            .http
            .post(&settings.event_bus_url)
            .json(&payload)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                debug!("event delivered");
            }
            Ok(response) => {
                warn!(status = %response.status(), "event bus rejected event");
            }
            Err(e) => warn!(error = %e, "cannot reach event bus"),
        }
    }
}

/// Sink that discards everything. Used where notifications are not wired up.
pub struct NullSink;

#[async_trait]
impl ChatSink for NullSink {
    async fn send_message(&self, _markdown: &str) {}
}

#[async_trait]
impl EventSink for NullSink {
    async fn send_event(&self, _description: &str) {}
}
