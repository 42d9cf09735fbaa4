//! Device registry
//!
//! In-memory map from device id to [`DeviceInfo`]. Lives for the process
//! lifetime; devices are never deleted. Connection status is derived when
//! the registry is read: a device whose `lastSeen` is older than the stale
//! threshold reads as disconnected without any background timer.

use chrono::Duration;
use robridge_common::{Clock, DeviceInfo, DeviceStatus, EventBus, RealtimeEvent};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

/// Firmware version assumed when a device does not report one
pub const DEFAULT_FIRMWARE_VERSION: &str = "1.0.0";

/// Storage behind the registry
///
/// All methods are synchronous; read-modify-write happens inside
/// [`DeviceStore::update`] under the store's own lock.
pub trait DeviceStore: Send + Sync {
    fn get(&self, device_id: &str) -> Option<DeviceInfo>;

    /// Insert or replace
    fn put(&self, device: DeviceInfo);

    fn list(&self) -> Vec<DeviceInfo>;

    /// Apply `f` to an existing device and return the updated copy
    fn update(&self, device_id: &str, f: &mut dyn FnMut(&mut DeviceInfo)) -> Option<DeviceInfo>;

    /// Insert `device` unless its id is taken
    ///
    /// Returns the stored device and whether it was inserted.
    fn insert_if_absent(&self, device: DeviceInfo) -> (DeviceInfo, bool);
}

/// `RwLock<HashMap>` device store
#[derive(Debug, Default)]
pub struct InMemoryDeviceStore {
    devices: RwLock<HashMap<String, DeviceInfo>>,
}

impl InMemoryDeviceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeviceStore for InMemoryDeviceStore {
    fn get(&self, device_id: &str) -> Option<DeviceInfo> {
        let devices = self.devices.read().unwrap_or_else(PoisonError::into_inner);
        devices.get(device_id).cloned()
    }

    fn put(&self, device: DeviceInfo) {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        devices.insert(device.device_id.clone(), device);
    }

    fn list(&self) -> Vec<DeviceInfo> {
        let devices = self.devices.read().unwrap_or_else(PoisonError::into_inner);
        devices.values().cloned().collect()
    }

    fn update(&self, device_id: &str, f: &mut dyn FnMut(&mut DeviceInfo)) -> Option<DeviceInfo> {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        let device = devices.get_mut(device_id)?;
        f(device);
        Some(device.clone())
    }

    fn insert_if_absent(&self, device: DeviceInfo) -> (DeviceInfo, bool) {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        match devices.get(&device.device_id) {
            Some(existing) => (existing.clone(), false),
            None => {
                devices.insert(device.device_id.clone(), device.clone());
                (device, true)
            }
        }
    }
}

/// Registration request as sent by device firmware
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub device_id: String,
    pub device_name: Option<String>,
    pub ip_address: Option<String>,
    pub firmware_version: Option<String>,
    /// Explicit capability flag; derived from the name when absent
    pub ai_capable: Option<bool>,
}

/// Legacy capability rule: the device name mentions "AI"
pub fn name_implies_ai(device_name: &str) -> bool {
    device_name.to_ascii_lowercase().contains("ai")
}

/// Name given to devices that register without one
pub fn default_device_name(device_id: &str) -> String {
    format!("ESP32-{}", device_id)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Registry of known scanners
pub struct DeviceRegistry {
    store: Arc<dyn DeviceStore>,
    clock: Arc<dyn Clock>,
    stale_after: Duration,
    events: EventBus,
}

impl DeviceRegistry {
    pub fn new(
        store: Arc<dyn DeviceStore>,
        clock: Arc<dyn Clock>,
        stale_after: Duration,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            clock,
            stale_after,
            events,
        }
    }

    /// Register or re-register a device
    ///
    /// A re-registration overwrites name, IP, firmware and capability, and
    /// keeps the scan counter. Broadcasts `esp32_device_connected`.
    pub fn register(&self, registration: Registration) -> DeviceInfo {
        let now = self.clock.now();
        let Registration {
            device_id,
            device_name,
            ip_address,
            firmware_version,
            ai_capable,
        } = registration;

        let device_name = non_blank(device_name).unwrap_or_else(|| default_device_name(&device_id));
        let firmware_version =
            non_blank(firmware_version).unwrap_or_else(|| DEFAULT_FIRMWARE_VERSION.to_string());
        let ai_capable = ai_capable.unwrap_or_else(|| name_implies_ai(&device_name));

        let fresh = DeviceInfo {
            device_id: device_id.clone(),
            device_name: device_name.clone(),
            ip_address: ip_address.clone(),
            firmware_version: firmware_version.clone(),
            status: DeviceStatus::Connected,
            last_seen: now,
            total_scans: 0,
            ai_capable,
        };

        let (mut device, created) = self.store.insert_if_absent(fresh);
        if !created {
            let updated = self.store.update(&device_id, &mut |d: &mut DeviceInfo| {
                d.device_name = device_name.clone();
                d.ip_address = ip_address.clone();
                d.firmware_version = firmware_version.clone();
                d.ai_capable = ai_capable;
                d.status = DeviceStatus::Connected;
                d.last_seen = now;
            });
            if let Some(updated) = updated {
                device = updated;
            }
        }

        info!(
            device_id = %device.device_id,
            device_name = %device.device_name,
            ai_capable = device.ai_capable,
            created,
            "ESP32 device registered"
        );

        self.events
            .emit_lossy(RealtimeEvent::DeviceConnected(device.clone()));
        device
    }

    /// Refresh `lastSeen` for a known device
    pub fn touch(&self, device_id: &str) -> Option<DeviceInfo> {
        let now = self.clock.now();
        self.store.update(device_id, &mut |d: &mut DeviceInfo| {
            d.last_seen = now;
            d.status = DeviceStatus::Connected;
        })
    }

    /// Refresh a known device or create a minimal record for an unknown one
    ///
    /// Returns the device and whether it was created.
    pub fn touch_or_register(&self, device_id: &str, ip_address: Option<String>) -> (DeviceInfo, bool) {
        if let Some(device) = self.touch(device_id) {
            return (device, false);
        }

        let device_name = default_device_name(device_id);
        let minimal = DeviceInfo {
            device_id: device_id.to_string(),
            ai_capable: name_implies_ai(&device_name),
            device_name,
            ip_address,
            firmware_version: DEFAULT_FIRMWARE_VERSION.to_string(),
            status: DeviceStatus::Connected,
            last_seen: self.clock.now(),
            total_scans: 0,
        };

        let (device, created) = self.store.insert_if_absent(minimal);
        if created {
            info!(device_id = %device_id, "New ESP32 device registered by ping");
            (device, true)
        } else {
            // Registered concurrently between the two steps
            (self.touch(device_id).unwrap_or(device), false)
        }
    }

    /// Count one accepted scan against a device
    pub fn record_scan(&self, device_id: &str) -> Option<DeviceInfo> {
        let now = self.clock.now();
        let device = self.store.update(device_id, &mut |d: &mut DeviceInfo| {
            d.total_scans += 1;
            d.last_seen = now;
            d.status = DeviceStatus::Connected;
        });
        if let Some(device) = &device {
            debug!(device_id = %device_id, total_scans = device.total_scans, "Scan counted");
        }
        device
    }

    pub fn get(&self, device_id: &str) -> Option<DeviceInfo> {
        self.store.get(device_id).map(|d| self.with_derived_status(d))
    }

    /// All devices sorted by id, status derived from `lastSeen`
    pub fn list(&self) -> Vec<DeviceInfo> {
        let mut devices: Vec<DeviceInfo> = self
            .store
            .list()
            .into_iter()
            .map(|d| self.with_derived_status(d))
            .collect();
        devices.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        devices
    }

    fn with_derived_status(&self, mut device: DeviceInfo) -> DeviceInfo {
        if self.clock.now() - device.last_seen > self.stale_after {
            device.status = DeviceStatus::Disconnected;
        }
        device
    }
}
