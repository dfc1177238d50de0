//! Kestrel server
//!
//! Composition root: wires the inventory store, interface resolver, template
//! set, script writer, DHCP generator, notification clients and HTTP API
//! together and runs the server. Every component is constructed here and
//! passed down by reference; no module reaches for ambient global state.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use kestrel_common::{DeviceKind, DeviceType};
use kestrel_ztp::TemplateSet;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub mod api;
pub mod config;
pub mod dhcp;
pub mod net;
pub mod notify;
pub mod probe;
pub mod regen;
pub mod scripts;
pub mod store;

// Test-state builders, shared with integration tests
pub mod test_helpers;

use crate::config::AppConfig;
use crate::dhcp::DhcpGenerator;
use crate::net::{InterfaceResolver, SystemResolver};
use crate::notify::{ChatClient, ChatSink, EventBusClient, EventSink};
use crate::regen::RegenQueue;
use crate::scripts::ScriptWriter;
use crate::store::{InventoryStore, MemoryStore, RedbStore, StoreError};

/// Application state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn InventoryStore>,
    pub chat: Arc<dyn ChatSink>,
    pub regen: RegenQueue,
    pub config: Arc<AppConfig>,
}

pub async fn run() -> anyhow::Result<()> {
    let config = Arc::new(AppConfig::from_env());

    // Embedded database, with an in-memory fallback so the API stays usable
    // when the data directory is missing or read-only.
    if let Some(parent) = config.database_path.parent() {
        let _ = tokio::fs::create_dir_all(parent).await;
    }
    let store: Arc<dyn InventoryStore> = match RedbStore::open(&config.database_path) {
        Ok(store) => {
            info!(path = %config.database_path.display(), "opened inventory database");
            Arc::new(store)
        }
        Err(e) => {
            warn!(
                path = %config.database_path.display(),
                error = %e,
                "cannot open inventory database, falling back to in-memory store"
            );
            Arc::new(MemoryStore::new())
        }
    };

    for dir in [
        config.configs_dir(),
        config.images_dir(),
        config.scripts_dir(),
    ] {
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;
    }

    seed_device_types(store.as_ref()).await?;

    let resolver: Arc<dyn InterfaceResolver> = Arc::new(SystemResolver);
    let templates = Arc::new(TemplateSet::from_dir(&config.templates_dir));
    let chat: Arc<dyn ChatSink> =
        Arc::new(ChatClient::new(store.clone(), config.chat_base_url.clone())?);
    let events: Arc<dyn EventSink> =
        Arc::new(EventBusClient::new(store.clone(), resolver.clone())?);

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
        events,
        config.clone(),
    ));

    let regen = {
        let generator = generator.clone();
        RegenQueue::spawn(move || {
            let generator = generator.clone();
            async move { generator.generate().await }
        })
    };
    // Bring generated artifacts in line with the stored inventory on boot
    regen.request();

    let state = AppState {
        store,
        chat,
        regen,
        config: config.clone(),
    };

    let app = api::router(state).layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.web_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!(
        "kestrel listening on http://{}",
        listener.local_addr().context("local address")?
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    info!("shutdown complete");
    Ok(())
}

/// Seed the device type reference data on first start.
pub async fn seed_device_types(store: &dyn InventoryStore) -> Result<(), StoreError> {
    let existing = store.list_device_types().await?;
    if !existing.is_empty() {
        return Ok(());
    }
    for kind in DeviceKind::ALL {
        store
            .put_device_type(&DeviceType {
                name: kind.as_str().to_string(),
            })
            .await?;
    }
    info!("seeded device type reference data");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        info!("received ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("received SIGTERM");
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
