//! Realtime event types and the in-process event bus
//!
//! Every event pushed to dashboards is a [`RealtimeEvent`]. On the wire each
//! one becomes a single text frame of the form
//! `{"event": "<name>", "data": <payload>}`.

use crate::models::{DeviceInfo, ScanRecord};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events fanned out to connected dashboards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum RealtimeEvent {
    /// Full device list, sent to a client right after it connects
    #[serde(rename = "esp32_devices_update")]
    DevicesUpdate(Vec<DeviceInfo>),

    /// A device registered (or re-registered)
    #[serde(rename = "esp32_device_connected")]
    DeviceConnected(DeviceInfo),

    /// A scan was accepted
    #[serde(rename = "esp32_barcode_scan")]
    BarcodeScan(ScanRecord),

    /// A scan finished processing; payload identical to the matching
    /// `esp32_barcode_scan`
    #[serde(rename = "esp32_scan_processed")]
    ScanProcessed(ScanRecord),
}

impl RealtimeEvent {
    /// Wire name of the event
    pub fn event_type(&self) -> &'static str {
        match self {
            RealtimeEvent::DevicesUpdate(_) => "esp32_devices_update",
            RealtimeEvent::DeviceConnected(_) => "esp32_device_connected",
            RealtimeEvent::BarcodeScan(_) => "esp32_barcode_scan",
            RealtimeEvent::ScanProcessed(_) => "esp32_scan_processed",
        }
    }

    /// Serialize into a WebSocket text frame body
    pub fn to_frame(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse a WebSocket text frame body
    pub fn from_frame(frame: &str) -> serde_json::Result<Self> {
        serde_json::from_str(frame)
    }
}

/// Central event distribution for the hub
///
/// Wraps a bounded `tokio::broadcast` channel. Publishing never blocks; a
/// subscriber that falls more than `capacity` events behind receives
/// `RecvError::Lagged` and skips ahead.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RealtimeEvent>,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: RealtimeEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
