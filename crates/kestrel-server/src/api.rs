//! JSON API and artifact serving
//!
//! CRUD for devices, day-0 configs, images and settings, plus the three
//! artifact-serving routes booting devices hit. Artifact fetches double as
//! lifecycle signals: the requester's source address is matched against
//! device fixed IPs and the device status moves to the status implied by
//! what it just downloaded. That correlation breaks behind NAT or proxies;
//! it is kept because devices in the field rely on the current behavior.
//!
//! Error policy: request handlers fail fast with a structured
//! `{error, message}` body; side effects of a successful file read (status
//! update, notification) never block the file response.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use axum::extract::{ConnectInfo, DefaultBodyLimit, Json, Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::Router;
use chrono::Utc;
use kestrel_common::{
    Device, DeviceConfig, DeviceKind, DeviceStatus, DeviceUpdateRequest, ErrorResponse, Image,
    ProvisionedReport, Settings,
};
use tracing::{debug, warn};

use crate::notify::ChatSink;
use crate::store::{InventoryStore, StoreError};
use crate::AppState;

/// Uploaded images can be multi-hundred-megabyte OS blobs.
const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/devices",
            get(list_devices)
                .post(create_device)
                .put(update_device)
                .delete(delete_device),
        )
        .route("/api/devices/types", get(list_device_types))
        .route("/api/devices/provisioned", put(device_provisioned))
        .route("/api/devices/{serial}/probe", post(start_probe))
        .route("/api/configs", get(list_configs).post(create_config))
        .route("/api/images", get(list_images).post(create_image))
        .route("/api/settings", get(get_settings).post(put_settings))
        .route("/configs/{name}", get(serve_config_file))
        .route("/images/{name}", get(serve_image_file))
        .route("/scripts/{name}", get(serve_script_file))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

fn error_response(status: StatusCode, error: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.into(),
        }),
    )
        .into_response()
}

fn bad_request(message: impl Into<String>) -> Response {
    error_response(StatusCode::BAD_REQUEST, "invalid_request", message)
}

fn store_error(err: StoreError) -> Response {
    match &err {
        StoreError::NotFound(_) => {
            error_response(StatusCode::NOT_FOUND, "not_found", err.to_string())
        }
        StoreError::AlreadyExists(_) => {
            error_response(StatusCode::BAD_REQUEST, "conflict", err.to_string())
        }
        _ => {
            warn!(error = %err, "inventory store failure");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage", err.to_string())
        }
    }
}

/// Notifications are detached from the request cycle.
fn notify(state: &AppState, text: String) {
    let chat = state.chat.clone();
    tokio::spawn(async move {
        chat.send_message(&text).await;
    });
}

/// Artifact names come from the URL; keep them inside their directory.
fn valid_artifact_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('/') && !name.contains('\\') && !name.contains("..")
}

// === Devices ===

async fn list_devices(State(state): State<AppState>) -> Response {
    match state.store.list_devices().await {
        Ok(devices) => Json(devices).into_response(),
        Err(e) => store_error(e),
    }
}

async fn create_device(State(state): State<AppState>, Json(mut device): Json<Device>) -> Response {
    if device.serial.is_empty() || device.hostname.is_empty() || device.fixed_ip.is_empty() {
        return bad_request("serial, hostname and fixed IP are required");
    }
    if device.fixed_ip.parse::<IpAddr>().is_err() {
        return bad_request(format!("'{}' is not a valid IP address", device.fixed_ip));
    }

    let now = Utc::now();
    device.created_at = now;
    device.updated_at = now;

    if let Err(e) = state.store.insert_device(&device).await {
        return store_error(e);
    }

    state.regen.request();
    notify(
        &state,
        format!("New device configuration added for {}", device.serial),
    );
    (StatusCode::CREATED, "ok").into_response()
}

async fn update_device(
    State(state): State<AppState>,
    Json(request): Json<DeviceUpdateRequest>,
) -> Response {
    let device = match state.store.get_device_by_hostname(&request.hostname).await {
        Ok(Some(device)) => device,
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                "not_found",
                format!("no device with hostname {}", request.hostname),
            );
        }
        Err(e) => return store_error(e),
    };

    let mut updated = device;
    updated.image = request.image;
    updated.config = request.config;
    updated.updated_at = Utc::now();

    if let Err(e) = state.store.update_device(&updated).await {
        return store_error(e);
    }

    state.regen.request();
    notify(&state, format!("Device {} updated.", updated.serial));
    "ok".into_response()
}

async fn delete_device(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(serial) = params.get("serial") else {
        return bad_request("serial parameter not found");
    };

    if let Err(e) = state.store.delete_device(serial).await {
        return store_error(e);
    }

    state.regen.request();
    notify(&state, format!("Device {} removed.", serial));
    "ok".into_response()
}

async fn list_device_types(State(state): State<AppState>) -> Response {
    match state.store.list_device_types().await {
        Ok(types) => Json(types).into_response(),
        Err(e) => store_error(e),
    }
}

/// A device calls this after it finished applying its day-0 configuration.
async fn device_provisioned(
    State(state): State<AppState>,
    Json(report): Json<ProvisionedReport>,
) -> Response {
    match state.store.get_device(&report.serial).await {
        Ok(Some(device)) => {
            if device.status != Some(DeviceStatus::Provisioned) {
                let mut updated = device;
                updated.status = Some(DeviceStatus::Provisioned);
                updated.updated_at = Utc::now();
                if let Err(e) = state.store.update_device(&updated).await {
                    warn!(serial = %report.serial, error = %e, "cannot record provisioned status");
                }
            }
        }
        Ok(None) => {
            debug!(serial = %report.serial, "provisioned report for unknown device");
        }
        Err(e) => return store_error(e),
    }

    notify(
        &state,
        format!("Device {} provisioned successfully.", report.serial),
    );
    "ok".into_response()
}

async fn start_probe(State(state): State<AppState>, Path(serial): Path<String>) -> Response {
    match state.store.get_device(&serial).await {
        Ok(Some(device)) => {
            tokio::spawn(crate::probe::probe_device(
                state.store.clone(),
                state.chat.clone(),
                device,
            ));
            (StatusCode::ACCEPTED, "ok").into_response()
        }
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("no device with serial {}", serial),
        ),
        Err(e) => store_error(e),
    }
}

// === Day-0 Configs ===

async fn list_configs(State(state): State<AppState>) -> Response {
    match state.store.list_configs().await {
        Ok(configs) => Json(configs).into_response(),
        Err(e) => store_error(e),
    }
}

async fn create_config(
    State(state): State<AppState>,
    Json(mut config): Json<DeviceConfig>,
) -> Response {
    if !valid_artifact_name(&config.name) {
        return bad_request("configuration name is required and must be a plain file name");
    }

    config.location_url = format!("/configs/{}.conf", config.name);

    if let Err(e) = state.store.insert_config(&config).await {
        return store_error(e);
    }

    let path = state.config.configs_dir().join(format!("{}.conf", config.name));
    if let Err(e) = tokio::fs::write(&path, config.configuration.as_bytes()).await {
        warn!(path = %path.display(), error = %e, "cannot write day-0 config file");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "io", e.to_string());
    }

    (StatusCode::CREATED, "ok").into_response()
}

// === Images ===

async fn list_images(State(state): State<AppState>) -> Response {
    match state.store.list_images().await {
        Ok(images) => Json(images).into_response(),
        Err(e) => store_error(e),
    }
}

async fn create_image(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut name = String::new();
    let mut device_type: Option<DeviceKind> = None;
    let mut data: Option<axum::body::Bytes> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return bad_request(format!("malformed upload: {}", e)),
        };
        match field.name() {
            Some("name") => match field.text().await {
                Ok(value) => name = value,
                Err(e) => return bad_request(format!("malformed upload: {}", e)),
            },
            Some("deviceType") => match field.text().await {
                Ok(value) => device_type = DeviceKind::from_name(&value),
                Err(e) => return bad_request(format!("malformed upload: {}", e)),
            },
            Some("file") => match field.bytes().await {
                Ok(bytes) => data = Some(bytes),
                Err(e) => return bad_request(format!("malformed upload: {}", e)),
            },
            _ => {}
        }
    }

    if name.is_empty() {
        return bad_request("Device type and image name are required");
    }
    if !valid_artifact_name(&name) {
        return bad_request("image name must be a plain file name");
    }
    let Some(device_type) = device_type else {
        return bad_request("Invalid device type selected");
    };
    let Some(data) = data else {
        return bad_request("image file is required");
    };

    let image = Image {
        name: name.clone(),
        device_type,
        location_url: format!("/images/{}", name),
    };
    if let Err(e) = state.store.insert_image(&image).await {
        return store_error(e);
    }

    let path = state.config.images_dir().join(&name);
    if let Err(e) = tokio::fs::write(&path, &data).await {
        warn!(path = %path.display(), error = %e, "cannot write image file");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "io", e.to_string());
    }

    (StatusCode::CREATED, "ok").into_response()
}

// === Settings ===

async fn get_settings(State(state): State<AppState>) -> Response {
    match state.store.get_settings().await {
        Ok(settings) => Json(settings.unwrap_or_default()).into_response(),
        Err(e) => store_error(e),
    }
}

async fn put_settings(State(state): State<AppState>, Json(settings): Json<Settings>) -> Response {
    if let Err(e) = state.store.put_settings(&settings).await {
        return store_error(e);
    }

    notify(
        &state,
        format!(
            "Settings changed. Chat room: {}, event bus: {}",
            settings.chat_room_id, settings.event_bus_url
        ),
    );
    "ok".into_response()
}

// === Artifact Serving ===

async fn serve_config_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Response {
    let path = state.config.configs_dir().join(&name);
    serve_artifact(
        &state,
        &name,
        path,
        peer.ip(),
        DeviceStatus::RunningDayZeroConfig,
        |device| {
            format!(
                "Device {} (serial {}) is running day 0 config {}",
                device.hostname, device.serial, name
            )
        },
    )
    .await
}

async fn serve_image_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Response {
    let path = state.config.images_dir().join(&name);
    serve_artifact(
        &state,
        &name,
        path,
        peer.ip(),
        DeviceStatus::InstallingImage,
        |device| {
            format!(
                "Device {} (serial {}) is installing image {}",
                device.hostname, device.serial, name
            )
        },
    )
    .await
}

async fn serve_script_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Response {
    let path = state.config.scripts_dir().join(&name);
    serve_artifact(
        &state,
        &name,
        path,
        peer.ip(),
        DeviceStatus::RunningInitScript,
        |device| {
            format!(
                "Device {} (serial {}) is running init script {}",
                device.hostname, device.serial, name
            )
        },
    )
    .await
}

/// Read and return an artifact, flipping the requesting device's status as a
/// side effect. The file response never waits on inventory availability.
async fn serve_artifact<F>(
    state: &AppState,
    name: &str,
    path: PathBuf,
    peer: IpAddr,
    target: DeviceStatus,
    message: F,
) -> Response
where
    F: FnOnce(&Device) -> String,
{
    if !valid_artifact_name(name) {
        return bad_request("artifact name must be a plain file name");
    }

    let content = match tokio::fs::read(&path).await {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read artifact");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "io", e.to_string());
        }
    };

    mark_fetched(state, peer, target, message).await;

    content.into_response()
}

/// Correlate the requester with a device and move its status, notifying on
/// the transition. Only an actual change notifies; repeated fetches at the
/// same status stay quiet.
async fn mark_fetched<F>(state: &AppState, peer: IpAddr, target: DeviceStatus, message: F)
where
    F: FnOnce(&Device) -> String,
{
    let ip = peer.to_string();
    match state.store.get_device_by_ip(&ip).await {
        Ok(Some(device)) if device.status.as_ref() != Some(&target) => {
            let mut updated = device.clone();
            updated.status = Some(target.clone());
            updated.updated_at = Utc::now();
            match state.store.update_device(&updated).await {
                Ok(()) => {
                    debug!(serial = %device.serial, status = %target, "device status updated on artifact fetch");
                    notify(state, message(&device));
                }
                Err(e) => {
                    warn!(serial = %device.serial, error = %e, "cannot update device status");
                }
            }
        }
        Ok(Some(_)) => {}
        Ok(None) => debug!(peer = %ip, "no device registered for requester address"),
        Err(e) => debug!(peer = %ip, error = %e, "device lookup failed during artifact fetch"),
    }
}
