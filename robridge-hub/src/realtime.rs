//! Realtime broadcaster
//!
//! Owns the latest-scan slot and publishes scan lifecycle events on the
//! [`EventBus`]. Delivery is fire-and-forget: there is no acknowledgement and
//! no replay beyond the latest scan handed to newly connected clients.

use robridge_common::{DeviceInfo, EventBus, RealtimeEvent, ScanRecord};
use std::sync::{PoisonError, RwLock};
use tokio::sync::broadcast;

pub struct Broadcaster {
    events: EventBus,
    latest: RwLock<Option<ScanRecord>>,
}

impl Broadcaster {
    pub fn new(events: EventBus) -> Self {
        Self {
            events,
            latest: RwLock::new(None),
        }
    }

    /// Store `record` as the latest scan and announce it
    ///
    /// Emits `esp32_barcode_scan` then `esp32_scan_processed` with the same
    /// payload. The slot lock is held across both emits so the pairs of two
    /// concurrent scans never interleave.
    pub fn publish_scan(&self, record: &ScanRecord) {
        let mut latest = self.latest.write().unwrap_or_else(PoisonError::into_inner);
        *latest = Some(record.clone());
        self.events
            .emit_lossy(RealtimeEvent::BarcodeScan(record.clone()));
        self.events
            .emit_lossy(RealtimeEvent::ScanProcessed(record.clone()));
    }

    /// Most recent scan, if any
    pub fn latest(&self) -> Option<ScanRecord> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Events sent to a client right after it connects
    pub fn seed(&self, devices: Vec<DeviceInfo>) -> Vec<RealtimeEvent> {
        let mut seed = vec![RealtimeEvent::DevicesUpdate(devices)];
        if let Some(scan) = self.latest() {
            seed.push(RealtimeEvent::BarcodeScan(scan));
        }
        seed
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.events.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.subscriber_count()
    }
}
