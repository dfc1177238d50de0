//! Storage backends for the device inventory
//!
//! This module provides the `InventoryStore` trait and two implementations:
//! - `MemoryStore` - in-memory storage for tests and degraded operation
//! - `RedbStore` - embedded database for normal deployments
//!
//! Uniqueness of device identity fields (serial, hostname, fixed IP) and of
//! config/image names is enforced here, inside a single transaction or lock
//! scope, so no caller ever needs a separate existence check before insert.

mod memory;
mod redb_store;

pub use memory::MemoryStore;
pub use redb_store::RedbStore;

use async_trait::async_trait;
use kestrel_common::{Device, DeviceConfig, DeviceType, Image, Settings};
use thiserror::Error;

/// Errors from storage operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    /// Message is operator-facing and names the conflicting field.
    #[error("{0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Storage backend trait for the device inventory
///
/// The trait is object-safe and used as `Arc<dyn InventoryStore>`. Listing
/// order is whatever the backend yields; callers must not depend on it, but
/// both backends iterate in key order so repeated scans are stable.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    // === Device Operations ===

    async fn list_devices(&self) -> Result<Vec<Device>>;

    async fn get_device(&self, serial: &str) -> Result<Option<Device>>;

    /// Look up a device by its fixed address. Used to correlate artifact
    /// fetches with devices via the requester's source IP.
    async fn get_device_by_ip(&self, ip: &str) -> Result<Option<Device>>;

    async fn get_device_by_hostname(&self, hostname: &str) -> Result<Option<Device>>;

    /// Insert a new device. Fails with `AlreadyExists` and leaves the store
    /// untouched when the serial, hostname or fixed IP is already taken.
    async fn insert_device(&self, device: &Device) -> Result<()>;

    /// Replace an existing device record, keyed by serial. Hostname and
    /// fixed IP must not collide with any other record.
    async fn update_device(&self, device: &Device) -> Result<()>;

    async fn delete_device(&self, serial: &str) -> Result<()>;

    // === Day-0 Config Operations ===

    async fn list_configs(&self) -> Result<Vec<DeviceConfig>>;

    async fn get_config(&self, name: &str) -> Result<Option<DeviceConfig>>;

    async fn insert_config(&self, config: &DeviceConfig) -> Result<()>;

    // === Image Operations ===

    async fn list_images(&self) -> Result<Vec<Image>>;

    async fn get_image(&self, name: &str) -> Result<Option<Image>>;

    async fn insert_image(&self, image: &Image) -> Result<()>;

    // === Device Type Reference Data ===

    async fn list_device_types(&self) -> Result<Vec<DeviceType>>;

    async fn put_device_type(&self, device_type: &DeviceType) -> Result<()>;

    // === Settings Singleton ===

    async fn get_settings(&self) -> Result<Option<Settings>>;

    /// Replace the settings record wholesale.
    async fn put_settings(&self, settings: &Settings) -> Result<()>;
}

/// Which identity field of `candidate` collides with `existing`, if any.
/// Checked in the order the API reports conflicts: hostname, serial, fixed IP.
pub(crate) fn identity_conflict(existing: &Device, candidate: &Device) -> Option<String> {
    if existing.hostname == candidate.hostname {
        return Some(format!("Hostname {} already in use", candidate.hostname));
    }
    if existing.serial == candidate.serial {
        return Some(format!("Serial {} already in use", candidate.serial));
    }
    if existing.fixed_ip == candidate.fixed_ip {
        return Some(format!("Fixed IP {} already in use", candidate.fixed_ip));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_common::{DeviceKind, DeviceStatus};
    use std::sync::Arc;

    fn device(serial: &str, hostname: &str, ip: &str) -> Device {
        Device::new(serial, hostname, ip, DeviceKind::IosXr)
    }

    async fn exercise_device_crud(store: Arc<dyn InventoryStore>) {
        let d1 = device("FXS001", "xr1", "192.168.1.10");
        store.insert_device(&d1).await.unwrap();

        let by_serial = store.get_device("FXS001").await.unwrap().unwrap();
        assert_eq!(by_serial.hostname, "xr1");

        let by_ip = store.get_device_by_ip("192.168.1.10").await.unwrap().unwrap();
        assert_eq!(by_ip.serial, "FXS001");

        let by_hostname = store.get_device_by_hostname("xr1").await.unwrap().unwrap();
        assert_eq!(by_hostname.serial, "FXS001");

        let mut updated = by_serial.clone();
        updated.status = Some(DeviceStatus::InstallingImage);
        store.update_device(&updated).await.unwrap();
        let reread = store.get_device("FXS001").await.unwrap().unwrap();
        assert_eq!(reread.status, Some(DeviceStatus::InstallingImage));

        assert_eq!(store.list_devices().await.unwrap().len(), 1);

        store.delete_device("FXS001").await.unwrap();
        assert!(store.get_device("FXS001").await.unwrap().is_none());
        assert!(store.get_device_by_ip("192.168.1.10").await.unwrap().is_none());
    }

    async fn exercise_uniqueness(store: Arc<dyn InventoryStore>) {
        store
            .insert_device(&device("FXS001", "xr1", "192.168.1.10"))
            .await
            .unwrap();

        // Same serial, everything else fresh
        let err = store
            .insert_device(&device("FXS001", "xr2", "192.168.1.11"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
        assert!(err.to_string().contains("Serial FXS001"));

        // Same hostname
        let err = store
            .insert_device(&device("FXS002", "xr1", "192.168.1.11"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Hostname xr1"));

        // Same fixed IP
        let err = store
            .insert_device(&device("FXS002", "xr2", "192.168.1.10"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Fixed IP 192.168.1.10"));

        // None of the rejected inserts mutated the store
        assert_eq!(store.list_devices().await.unwrap().len(), 1);

        // Updating a record into another record's identity is also rejected
        store
            .insert_device(&device("FXS002", "xr2", "192.168.1.11"))
            .await
            .unwrap();
        let mut clash = store.get_device("FXS002").await.unwrap().unwrap();
        clash.fixed_ip = "192.168.1.10".to_string();
        assert!(store.update_device(&clash).await.is_err());
    }

    async fn exercise_settings(store: Arc<dyn InventoryStore>) {
        assert!(store.get_settings().await.unwrap().is_none());

        let first = Settings {
            chat_room_id: "room-1".to_string(),
            event_bus_url: String::new(),
        };
        store.put_settings(&first).await.unwrap();

        // Replace-all: the second write fully supersedes the first
        let second = Settings {
            chat_room_id: String::new(),
            event_bus_url: "https://events.example".to_string(),
        };
        store.put_settings(&second).await.unwrap();

        let current = store.get_settings().await.unwrap().unwrap();
        assert_eq!(current, second);
    }

    #[tokio::test]
    async fn test_memory_store_device_crud() {
        exercise_device_crud(Arc::new(MemoryStore::new())).await;
    }

    #[tokio::test]
    async fn test_redb_store_device_crud() {
        let tmp = tempfile::tempdir().unwrap();
        let store = RedbStore::open(tmp.path().join("test.redb")).unwrap();
        exercise_device_crud(Arc::new(store)).await;
    }

    #[tokio::test]
    async fn test_memory_store_uniqueness() {
        exercise_uniqueness(Arc::new(MemoryStore::new())).await;
    }

    #[tokio::test]
    async fn test_redb_store_uniqueness() {
        let tmp = tempfile::tempdir().unwrap();
        let store = RedbStore::open(tmp.path().join("test.redb")).unwrap();
        exercise_uniqueness(Arc::new(store)).await;
    }

    #[tokio::test]
    async fn test_memory_store_settings() {
        exercise_settings(Arc::new(MemoryStore::new())).await;
    }

    #[tokio::test]
    async fn test_redb_store_settings() {
        let tmp = tempfile::tempdir().unwrap();
        let store = RedbStore::open(tmp.path().join("test.redb")).unwrap();
        exercise_settings(Arc::new(store)).await;
    }

    #[tokio::test]
    async fn test_list_devices_is_sorted_by_serial() {
        let store = MemoryStore::new();
        store
            .insert_device(&device("FXS002", "b", "10.0.0.2"))
            .await
            .unwrap();
        store
            .insert_device(&device("FXS001", "a", "10.0.0.1"))
            .await
            .unwrap();

        let serials: Vec<String> = store
            .list_devices()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.serial)
            .collect();
        assert_eq!(serials, vec!["FXS001", "FXS002"]);
    }
}
