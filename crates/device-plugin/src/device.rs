//! Device model and inventory providers

use std::fmt::Debug;

use crate::api;

/// Health of a single advertised device
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum DeviceHealth {
    #[display("Healthy")]
    Healthy,
    #[display("Unhealthy")]
    Unhealthy,
}

impl DeviceHealth {
    /// wire value expected by the kubelet
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceHealth::Healthy => api::HEALTHY,
            DeviceHealth::Unhealthy => api::UNHEALTHY,
        }
    }
}

/// A device advertised to the kubelet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: String,
    pub health: DeviceHealth,
}

impl Device {
    pub fn new(id: impl Into<String>, health: DeviceHealth) -> Self {
        Self {
            id: id.into(),
            health,
        }
    }
}

impl From<&Device> for api::Device {
    fn from(device: &Device) -> Self {
        api::Device {
            id: device.id.clone(),
            health: device.health.as_str().to_string(),
            topology: None,
        }
    }
}

/// Source of the device set reported on every advertiser tick.
///
/// A live health monitor implements this over a synchronized store; the
/// advertiser and allocator only ever read a snapshot.
pub trait DeviceInventory: Send + Sync + Debug {
    /// full current device set
    fn snapshot(&self) -> Vec<Device>;

    /// whether `id` is part of the current device set
    fn contains(&self, id: &str) -> bool {
        self.snapshot().iter().any(|device| device.id == id)
    }
}

/// Fixed single-device inventory, always healthy
#[derive(Debug, Clone)]
pub struct StaticInventory {
    device: Device,
}

impl StaticInventory {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device: Device::new(device_id, DeviceHealth::Healthy),
        }
    }
}

impl DeviceInventory for StaticInventory {
    fn snapshot(&self) -> Vec<Device> {
        vec![self.device.clone()]
    }

    fn contains(&self, id: &str) -> bool {
        self.device.id == id
    }
}
