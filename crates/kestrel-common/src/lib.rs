//! Shared data model for kestrel.

pub mod models;

pub use models::{
    Device, DeviceConfig, DeviceKind, DeviceStatus, DeviceType, DeviceUpdateRequest,
    ErrorResponse, Image, ProvisionedReport, Settings,
};
