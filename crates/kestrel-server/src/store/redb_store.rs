//! Embedded database backend
//!
//! Records are stored as JSON blobs keyed by their natural identifier
//! (serial for devices, name for configs/images/types). Write transactions
//! are serialized by the engine, which is what makes the check-then-insert
//! inside `insert_device`/`update_device` atomic.

use super::{identity_conflict, InventoryStore, Result, StoreError};
use async_trait::async_trait;
use kestrel_common::{Device, DeviceConfig, DeviceType, Image, Settings};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

const DEVICE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("devices");
const CONFIG_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("configs");
const IMAGE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("images");
const DEVICE_TYPE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("device_types");
const SETTINGS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("settings");

/// The settings record is a singleton under a fixed key.
const SETTINGS_KEY: &str = "settings";

fn db_err<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Database(e.to_string())
}

fn ser_err<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Serialization(e.to_string())
}

/// Embedded database backend
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open or create the database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::create(path).map_err(db_err)?;

        // Create all tables up front so reads never race table creation.
        let write_txn = db.begin_write().map_err(db_err)?;
        write_txn.open_table(DEVICE_TABLE).map_err(db_err)?;
        write_txn.open_table(CONFIG_TABLE).map_err(db_err)?;
        write_txn.open_table(IMAGE_TABLE).map_err(db_err)?;
        write_txn.open_table(DEVICE_TYPE_TABLE).map_err(db_err)?;
        write_txn.open_table(SETTINGS_TABLE).map_err(db_err)?;
        write_txn.commit().map_err(db_err)?;

        Ok(Self { db })
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
    ) -> Result<Option<T>> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(table).map_err(db_err)?;
        match table.get(key).map_err(db_err)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value()).map_err(ser_err)?)),
            None => Ok(None),
        }
    }

    fn list_json<T: DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
    ) -> Result<Vec<T>> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(table).map_err(db_err)?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(db_err)? {
            let (_, value) = entry.map_err(db_err)?;
            results.push(serde_json::from_slice(value.value()).map_err(ser_err)?);
        }
        Ok(results)
    }

    fn put_json<T: Serialize>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
        value: &T,
    ) -> Result<()> {
        let bytes = serde_json::to_vec(value).map_err(ser_err)?;
        let write_txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = write_txn.open_table(table).map_err(db_err)?;
            table.insert(key, bytes.as_slice()).map_err(db_err)?;
        }
        write_txn.commit().map_err(db_err)?;
        Ok(())
    }

    /// Insert only when the key is absent; the caller supplies the conflict
    /// message. Runs entirely inside one write transaction.
    fn insert_json_unique<T: Serialize>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        key: &str,
        value: &T,
        conflict: String,
    ) -> Result<()> {
        let bytes = serde_json::to_vec(value).map_err(ser_err)?;
        let write_txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = write_txn.open_table(table).map_err(db_err)?;
            if table.get(key).map_err(db_err)?.is_some() {
                return Err(StoreError::AlreadyExists(conflict));
            }
            table.insert(key, bytes.as_slice()).map_err(db_err)?;
        }
        write_txn.commit().map_err(db_err)?;
        Ok(())
    }
}

#[async_trait]
impl InventoryStore for RedbStore {
    // === Device Operations ===

    async fn list_devices(&self) -> Result<Vec<Device>> {
        self.list_json(DEVICE_TABLE)
    }

    async fn get_device(&self, serial: &str) -> Result<Option<Device>> {
        self.get_json(DEVICE_TABLE, serial)
    }

    async fn get_device_by_ip(&self, ip: &str) -> Result<Option<Device>> {
        let devices = self.list_devices().await?;
        Ok(devices.into_iter().find(|d| d.fixed_ip == ip))
    }

    async fn get_device_by_hostname(&self, hostname: &str) -> Result<Option<Device>> {
        let devices = self.list_devices().await?;
        Ok(devices.into_iter().find(|d| d.hostname == hostname))
    }

    async fn insert_device(&self, device: &Device) -> Result<()> {
        let bytes = serde_json::to_vec(device).map_err(ser_err)?;
        let write_txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = write_txn.open_table(DEVICE_TABLE).map_err(db_err)?;
            // Identity scan and insert share the write transaction, so a
            // concurrent registration of the same identity serializes behind
            // this one and then fails its own scan.
            for entry in table.iter().map_err(db_err)? {
                let (_, value) = entry.map_err(db_err)?;
                let existing: Device =
                    serde_json::from_slice(value.value()).map_err(ser_err)?;
                if let Some(conflict) = identity_conflict(&existing, device) {
                    return Err(StoreError::AlreadyExists(conflict));
                }
            }
            table
                .insert(device.serial.as_str(), bytes.as_slice())
                .map_err(db_err)?;
        }
        write_txn.commit().map_err(db_err)?;
        Ok(())
    }

    async fn update_device(&self, device: &Device) -> Result<()> {
        let bytes = serde_json::to_vec(device).map_err(ser_err)?;
        let write_txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = write_txn.open_table(DEVICE_TABLE).map_err(db_err)?;
            if table.get(device.serial.as_str()).map_err(db_err)?.is_none() {
                return Err(StoreError::NotFound(format!("device {}", device.serial)));
            }
            for entry in table.iter().map_err(db_err)? {
                let (key, value) = entry.map_err(db_err)?;
                if key.value() == device.serial {
                    continue;
                }
                let existing: Device =
                    serde_json::from_slice(value.value()).map_err(ser_err)?;
                if let Some(conflict) = identity_conflict(&existing, device) {
                    return Err(StoreError::AlreadyExists(conflict));
                }
            }
            table
                .insert(device.serial.as_str(), bytes.as_slice())
                .map_err(db_err)?;
        }
        write_txn.commit().map_err(db_err)?;
        Ok(())
    }

    async fn delete_device(&self, serial: &str) -> Result<()> {
        let write_txn = self.db.begin_write().map_err(db_err)?;
        let removed = {
            let mut table = write_txn.open_table(DEVICE_TABLE).map_err(db_err)?;
            let was_present = table.remove(serial).map_err(db_err)?.is_some();
            was_present
        };
        write_txn.commit().map_err(db_err)?;
        if removed {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("device {}", serial)))
        }
    }

    // === Day-0 Config Operations ===

    async fn list_configs(&self) -> Result<Vec<DeviceConfig>> {
        self.list_json(CONFIG_TABLE)
    }

    async fn get_config(&self, name: &str) -> Result<Option<DeviceConfig>> {
        self.get_json(CONFIG_TABLE, name)
    }

    async fn insert_config(&self, config: &DeviceConfig) -> Result<()> {
        self.insert_json_unique(
            CONFIG_TABLE,
            &config.name,
            config,
            format!("Configuration name {} already in use", config.name),
        )
    }

    // === Image Operations ===

    async fn list_images(&self) -> Result<Vec<Image>> {
        self.list_json(IMAGE_TABLE)
    }

    async fn get_image(&self, name: &str) -> Result<Option<Image>> {
        self.get_json(IMAGE_TABLE, name)
    }

    async fn insert_image(&self, image: &Image) -> Result<()> {
        self.insert_json_unique(
            IMAGE_TABLE,
            &image.name,
            image,
            format!("Image name {} already in use", image.name),
        )
    }

    // === Device Type Reference Data ===

    async fn list_device_types(&self) -> Result<Vec<DeviceType>> {
        self.list_json(DEVICE_TYPE_TABLE)
    }

    async fn put_device_type(&self, device_type: &DeviceType) -> Result<()> {
        self.put_json(DEVICE_TYPE_TABLE, &device_type.name, device_type)
    }

    // === Settings Singleton ===

    async fn get_settings(&self) -> Result<Option<Settings>> {
        self.get_json(SETTINGS_TABLE, SETTINGS_KEY)
    }

    async fn put_settings(&self, settings: &Settings) -> Result<()> {
        self.put_json(SETTINGS_TABLE, SETTINGS_KEY, settings)
    }
}
