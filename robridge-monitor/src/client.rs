//! WebSocket client for the hub's `/ws` feed
//!
//! Scan events are forwarded to the reassembler as raw field maps since a
//! fragment may lack fields a full [`robridge_common::ScanRecord`] requires.
//! Device events are decoded into typed [`DeviceInfo`] values.

use crate::reassembler::ScanFragment;
use crate::runner::ReassemblerHandle;
use crate::MonitorError;
use futures::StreamExt;
use robridge_common::DeviceInfo;
use serde::Deserialize;
use serde_json::Value;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

const EVENT_DEVICES_UPDATE: &str = "esp32_devices_update";
const EVENT_DEVICE_CONNECTED: &str = "esp32_device_connected";
const EVENT_BARCODE_SCAN: &str = "esp32_barcode_scan";
const EVENT_SCAN_PROCESSED: &str = "esp32_scan_processed";

/// Device news for the display
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceUpdate {
    List(Vec<DeviceInfo>),
    Connected(DeviceInfo),
}

/// A decoded frame
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Device(DeviceUpdate),
    Scan(ScanFragment),
}

#[derive(Deserialize)]
struct Frame {
    event: String,
    #[serde(default)]
    data: Value,
}

/// Decode one text frame; `Ok(None)` for events this client does not handle
pub fn parse_frame(text: &str) -> Result<Option<Incoming>, MonitorError> {
    let Frame { event, data } = serde_json::from_str(text)?;

    let incoming = match event.as_str() {
        EVENT_DEVICES_UPDATE => Incoming::Device(DeviceUpdate::List(serde_json::from_value(data)?)),
        EVENT_DEVICE_CONNECTED => {
            Incoming::Device(DeviceUpdate::Connected(serde_json::from_value(data)?))
        }
        EVENT_BARCODE_SCAN | EVENT_SCAN_PROCESSED => match data {
            Value::Object(fields) => Incoming::Scan(ScanFragment::new(event, fields)),
            _ => return Ok(None),
        },
        _ => return Ok(None),
    };
    Ok(Some(incoming))
}

/// Read one connection until the hub closes it
///
/// Scan fragments go to `handle`; device updates to `on_device`.
pub async fn pump(
    url: &str,
    handle: &ReassemblerHandle,
    mut on_device: impl FnMut(DeviceUpdate),
) -> Result<(), MonitorError> {
    let (mut socket, _) = connect_async(url).await.map_err(|e| MonitorError::Connect {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    info!(url = %url, "Connected to hub");

    while let Some(message) = socket.next().await {
        let message = message.map_err(|e| MonitorError::Stream(e.to_string()))?;
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        match parse_frame(&text) {
            Ok(Some(Incoming::Scan(fragment))) => handle.submit(fragment).await?,
            Ok(Some(Incoming::Device(update))) => on_device(update),
            Ok(None) => debug!("Ignoring unhandled event"),
            Err(e) => warn!(error = %e, "Ignoring malformed frame"),
        }
    }

    info!(url = %url, "Hub closed the connection");
    Ok(())
}
