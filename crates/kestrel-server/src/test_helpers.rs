//! Test helpers
//!
//! Builders for a fully wired `AppState` on top of an in-memory store, a
//! fixed interface resolver and a recording chat sink, with every generated
//! artifact redirected into a temporary directory.

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kestrel_ztp::TemplateSet;
use tempfile::TempDir;

use crate::config::{AppConfig, DhcpScopeConfig};
use crate::dhcp::DhcpGenerator;
use crate::net::{FixedResolver, InterfaceResolver};
use crate::notify::{ChatSink, NullSink};
use crate::regen::RegenQueue;
use crate::scripts::ScriptWriter;
use crate::store::{InventoryStore, MemoryStore};
use crate::AppState;

/// Chat sink that records messages instead of sending them.
#[derive(Default)]
pub struct RecordingChat {
    messages: Mutex<Vec<String>>,
}

impl RecordingChat {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().expect("messages lock").clone()
    }
}

#[async_trait]
impl ChatSink for RecordingChat {
    async fn send_message(&self, markdown: &str) {
        self.messages
            .lock()
            .expect("messages lock")
            .push(markdown.to_string());
    }
}

pub struct TestContext {
    pub state: AppState,
    pub store: Arc<dyn InventoryStore>,
    pub chat: Arc<RecordingChat>,
    pub config: Arc<AppConfig>,
    /// Owns every path in `config`; dropping it removes them.
    pub tmp: TempDir,
}

/// Configuration rooted in a temporary directory. Reload commands are the
/// shell no-op so regeneration runs end to end without touching a daemon.
pub fn test_config(tmp: &TempDir) -> AppConfig {
    let public_dir = tmp.path().join("public");
    AppConfig {
        web_port: 8080,
        public_dir: public_dir.clone(),
        templates_dir: kestrel_ztp::bundled_templates_dir(),
        database_path: tmp.path().join("kestrel.redb"),
        dhcp4: DhcpScopeConfig {
            domain: "ztp.local".to_string(),
            name_servers: "192.0.2.53".to_string(),
            subnet: "192.168.1.0".to_string(),
            netmask: "255.255.255.0".to_string(),
            config_path: tmp.path().join("dhcpd.conf"),
            reload_command: "true".to_string(),
        },
        dhcp6: DhcpScopeConfig {
            domain: "ztp.local".to_string(),
            name_servers: "2001:db8::53".to_string(),
            subnet: "2001:db8::".to_string(),
            netmask: "64".to_string(),
            config_path: tmp.path().join("dhcpd6.conf"),
            reload_command: "true".to_string(),
        },
        chat_base_url: "https://chat.invalid".to_string(),
    }
}

/// Fully wired state: in-memory store with seeded device types, fixed
/// resolver (IPv4 only), recording chat sink, live regeneration queue.
pub async fn create_test_context() -> TestContext {
    let tmp = tempfile::tempdir().expect("tempdir");
    let config = Arc::new(test_config(&tmp));
    for dir in [
        config.configs_dir(),
        config.images_dir(),
        config.scripts_dir(),
    ] {
        std::fs::create_dir_all(&dir).expect("create artifact dirs");
    }

    let store: Arc<dyn InventoryStore> = Arc::new(MemoryStore::new());
    crate::seed_device_types(store.as_ref())
        .await
        .expect("seed device types");

    let resolver: Arc<dyn InterfaceResolver> = Arc::new(FixedResolver {
        ipv4: Some(Ipv4Addr::new(192, 0, 2, 1)),
        ipv6: None,
    });
    let templates = Arc::new(TemplateSet::from_dir(&config.templates_dir));
    let scripts = Arc::new(ScriptWriter::new(
        templates.clone(),
        resolver.clone(),
        config.scripts_dir(),
        config.web_port,
    ));
    let generator = Arc::new(DhcpGenerator::new(
        store.clone(),
        resolver,
        templates,
        scripts,
        Arc::new(NullSink),
        config.clone(),
    ));
    let regen = {
        let generator = generator.clone();
        RegenQueue::spawn(move || {
            let generator = generator.clone();
            async move { generator.generate().await }
        })
    };

    let chat = Arc::new(RecordingChat::default());

    let state = AppState {
        store: store.clone(),
        chat: chat.clone(),
        regen,
        config: config.clone(),
    };

    TestContext {
        state,
        store,
        chat,
        config,
        tmp,
    }
}

/// Router over a test context's state.
pub fn test_router(ctx: &TestContext) -> axum::Router {
    crate::api::router(ctx.state.clone())
}
