//! In-memory storage backend
//!
//! Used by tests and as the degraded-mode fallback when the database file
//! cannot be opened. `BTreeMap` keeps listing order stable across scans,
//! which the regeneration pipeline relies on for reproducible output.

use super::{identity_conflict, InventoryStore, Result, StoreError};
use async_trait::async_trait;
use kestrel_common::{Device, DeviceConfig, DeviceType, Image, Settings};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// In-memory storage backend
pub struct MemoryStore {
    devices: RwLock<BTreeMap<String, Device>>,
    configs: RwLock<BTreeMap<String, DeviceConfig>>,
    images: RwLock<BTreeMap<String, Image>>,
    device_types: RwLock<BTreeMap<String, DeviceType>>,
    settings: RwLock<Option<Settings>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            devices: RwLock::new(BTreeMap::new()),
            configs: RwLock::new(BTreeMap::new()),
            images: RwLock::new(BTreeMap::new()),
            device_types: RwLock::new(BTreeMap::new()),
            settings: RwLock::new(None),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Database(format!("lock poisoned: {}", e))
}

#[async_trait]
impl InventoryStore for MemoryStore {
    // === Device Operations ===

    async fn list_devices(&self) -> Result<Vec<Device>> {
        let guard = self.devices.read().map_err(poisoned)?;
        Ok(guard.values().cloned().collect())
    }

    async fn get_device(&self, serial: &str) -> Result<Option<Device>> {
        let guard = self.devices.read().map_err(poisoned)?;
        Ok(guard.get(serial).cloned())
    }

    async fn get_device_by_ip(&self, ip: &str) -> Result<Option<Device>> {
        let guard = self.devices.read().map_err(poisoned)?;
        Ok(guard.values().find(|d| d.fixed_ip == ip).cloned())
    }

    async fn get_device_by_hostname(&self, hostname: &str) -> Result<Option<Device>> {
        let guard = self.devices.read().map_err(poisoned)?;
        Ok(guard.values().find(|d| d.hostname == hostname).cloned())
    }

    async fn insert_device(&self, device: &Device) -> Result<()> {
        // Check and insert under one write lock so a concurrent registration
        // of the same identity cannot slip between them.
        let mut guard = self.devices.write().map_err(poisoned)?;
        for existing in guard.values() {
            if let Some(conflict) = identity_conflict(existing, device) {
                return Err(StoreError::AlreadyExists(conflict));
            }
        }
        guard.insert(device.serial.clone(), device.clone());
        Ok(())
    }

    async fn update_device(&self, device: &Device) -> Result<()> {
        let mut guard = self.devices.write().map_err(poisoned)?;
        if !guard.contains_key(&device.serial) {
            return Err(StoreError::NotFound(format!("device {}", device.serial)));
        }
        for (serial, existing) in guard.iter() {
            if serial == &device.serial {
                continue;
            }
            if let Some(conflict) = identity_conflict(existing, device) {
                return Err(StoreError::AlreadyExists(conflict));
            }
        }
        guard.insert(device.serial.clone(), device.clone());
        Ok(())
    }

    async fn delete_device(&self, serial: &str) -> Result<()> {
        let mut guard = self.devices.write().map_err(poisoned)?;
        guard
            .remove(serial)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("device {}", serial)))
    }

    // === Day-0 Config Operations ===

    async fn list_configs(&self) -> Result<Vec<DeviceConfig>> {
        let guard = self.configs.read().map_err(poisoned)?;
        Ok(guard.values().cloned().collect())
    }

    async fn get_config(&self, name: &str) -> Result<Option<DeviceConfig>> {
        let guard = self.configs.read().map_err(poisoned)?;
        Ok(guard.get(name).cloned())
    }

    async fn insert_config(&self, config: &DeviceConfig) -> Result<()> {
        let mut guard = self.configs.write().map_err(poisoned)?;
        if guard.contains_key(&config.name) {
            return Err(StoreError::AlreadyExists(format!(
                "Configuration name {} already in use",
                config.name
            )));
        }
        guard.insert(config.name.clone(), config.clone());
        Ok(())
    }

    // === Image Operations ===

    async fn list_images(&self) -> Result<Vec<Image>> {
        let guard = self.images.read().map_err(poisoned)?;
        Ok(guard.values().cloned().collect())
    }

    async fn get_image(&self, name: &str) -> Result<Option<Image>> {
        let guard = self.images.read().map_err(poisoned)?;
        Ok(guard.get(name).cloned())
    }

    async fn insert_image(&self, image: &Image) -> Result<()> {
        let mut guard = self.images.write().map_err(poisoned)?;
        if guard.contains_key(&image.name) {
            return Err(StoreError::AlreadyExists(format!(
                "Image name {} already in use",
                image.name
            )));
        }
        guard.insert(image.name.clone(), image.clone());
        Ok(())
    }

    // === Device Type Reference Data ===

    async fn list_device_types(&self) -> Result<Vec<DeviceType>> {
        let guard = self.device_types.read().map_err(poisoned)?;
        Ok(guard.values().cloned().collect())
    }

    async fn put_device_type(&self, device_type: &DeviceType) -> Result<()> {
        let mut guard = self.device_types.write().map_err(poisoned)?;
        guard.insert(device_type.name.clone(), device_type.clone());
        Ok(())
    }

    // === Settings Singleton ===

    async fn get_settings(&self) -> Result<Option<Settings>> {
        let guard = self.settings.read().map_err(poisoned)?;
        Ok(guard.clone())
    }

    async fn put_settings(&self, settings: &Settings) -> Result<()> {
        let mut guard = self.settings.write().map_err(poisoned)?;
        *guard = Some(settings.clone());
        Ok(())
    }
}
