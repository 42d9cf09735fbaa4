//! Monitor client against a local WebSocket feed
//!
//! The stand-in hub sends the same frame sequence a real hub emits for one
//! scan: device list on connect, then a partial fragment followed by the
//! processed event.

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::Response,
    routing::get,
    Router,
};
use robridge_monitor::client::{self, DeviceUpdate};
use robridge_monitor::{runner, ReassemblerConfig};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

fn frames() -> Vec<Value> {
    vec![
        json!({
            "event": "esp32_devices_update",
            "data": [{
                "deviceId": "cam-1",
                "deviceName": "Dock Scanner",
                "firmwareVersion": "1.0.0",
                "status": "connected",
                "lastSeen": "2024-05-01T10:00:00Z",
                "totalScans": 0,
                "aiCapable": false
            }]
        }),
        json!({
            "event": "esp32_barcode_scan",
            "data": {
                "barcodeData": "4006381333931",
                "deviceName": "Dock Scanner",
                "aiAnalysis": { "title": "Pencil", "category": "Stationery" }
            }
        }),
        json!({ "event": "rack_update", "data": {} }),
        json!({
            "event": "esp32_scan_processed",
            "data": {
                "deviceName": "Dock Scanner",
                "scanType": "EAN13",
                "aiAnalysis": null
            }
        }),
    ]
}

async fn feed(ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(|mut socket: WebSocket| async move {
        for frame in frames() {
            if socket.send(Message::Text(frame.to_string())).await.is_err() {
                return;
            }
        }
        let _ = socket.send(Message::Close(None)).await;
    })
}

async fn spawn_feed() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, Router::new().route("/ws", get(feed)))
            .await
            .unwrap();
    });
    format!("ws://{}/ws", addr)
}

#[tokio::test]
async fn test_pump_reassembles_one_scan() {
    let url = spawn_feed().await;
    let config = ReassemblerConfig {
        quiet_period: Duration::from_millis(50),
        cooldown: Duration::from_millis(200),
        ..ReassemblerConfig::default()
    };
    let (handle, _task) = runner::spawn(config);
    let mut promotions = handle.promotions();

    let updates = Arc::new(Mutex::new(Vec::new()));
    let seen = updates.clone();
    client::pump(&url, &handle, move |update| seen.lock().unwrap().push(update))
        .await
        .expect("Pump should end cleanly");

    tokio::time::timeout(Duration::from_secs(5), promotions.changed())
        .await
        .expect("Timed out waiting for promotion")
        .unwrap();
    let scan = promotions.borrow_and_update().clone().unwrap();

    assert_eq!(scan.sequence, 1);
    assert_eq!(scan.barcode_data(), Some("4006381333931"));
    assert_eq!(scan.scan_type(), Some("EAN13"));
    assert_eq!(scan.title(), Some("Pencil"));
    assert_eq!(scan.fields["source"], "ESP32");
    assert_eq!(scan.fields["eventType"], "esp32_scan_processed");

    let updates = updates.lock().unwrap();
    assert_eq!(updates.len(), 1);
    assert!(matches!(&updates[0], DeviceUpdate::List(devices) if devices[0].device_id == "cam-1"));
}

#[tokio::test]
async fn test_pump_reports_unreachable_hub() {
    let (handle, _task) = runner::spawn(ReassemblerConfig::default());
    let err = client::pump("ws://127.0.0.1:9/ws", &handle, |_| {})
        .await
        .unwrap_err();
    assert!(err.to_string().starts_with("Failed to connect to ws://127.0.0.1:9/ws"));
}
