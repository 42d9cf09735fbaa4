//! End-to-end tests over real sockets
//!
//! - WebSocket feed: seed on connect, live scan events
//! - HTTP AI client against a local stand-in service

use axum::{http::StatusCode, routing::post, Json, Router};
use futures::StreamExt;
use robridge_common::{DeviceTimestamp, RealtimeEvent, SystemClock};
use robridge_hub::enrichment::{
    AnalysisRequest, AnalysisService, EnrichmentError, HttpAnalysisService,
};
use robridge_hub::{build_router, AppState, HubConfig};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

/// Serve `app` on an ephemeral local port
async fn spawn_server(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr.to_string()
}

/// Hub whose AI service points at a closed port
async fn spawn_hub() -> (String, AppState) {
    let db = robridge_common::db::init_database("sqlite::memory:")
        .await
        .unwrap();
    let analysis = HttpAnalysisService::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
    let state = AppState::new(
        db,
        &HubConfig::default(),
        Arc::new(analysis),
        Arc::new(SystemClock),
    );
    let addr = spawn_server(build_router(state.clone())).await;
    (addr, state)
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn next_event(ws: &mut WsStream) -> RealtimeEvent {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("Timed out waiting for event")
            .expect("Stream ended")
            .expect("WebSocket error");
        if let Message::Text(text) = message {
            return RealtimeEvent::from_frame(&text).expect("Should parse event frame");
        }
    }
}

async fn post_json(client: &reqwest::Client, url: String, body: Value) -> Value {
    client
        .post(url)
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_websocket_seed_and_live_scan() {
    let (addr, state) = spawn_hub().await;
    let client = reqwest::Client::new();

    post_json(
        &client,
        format!("http://{}/api/esp32/register", addr),
        json!({ "deviceId": "cam-1", "deviceName": "Dock Scanner" }),
    )
    .await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
        .await
        .expect("Should connect");

    match next_event(&mut ws).await {
        RealtimeEvent::DevicesUpdate(devices) => {
            assert_eq!(devices.len(), 1);
            assert_eq!(devices[0].device_id, "cam-1");
        }
        other => panic!("Expected device list first, got {:?}", other),
    }

    // Wait until the connection's subscription is live
    for _ in 0..50 {
        if state.broadcaster.subscriber_count() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let response = post_json(
        &client,
        format!("http://{}/api/esp32/scan/cam-1", addr),
        json!({ "barcodeData": "4006381333931", "scanType": "EAN13" }),
    )
    .await;
    assert_eq!(response["success"], true);

    let scanned = match next_event(&mut ws).await {
        RealtimeEvent::BarcodeScan(record) => record,
        other => panic!("Expected barcode scan, got {:?}", other),
    };
    let processed = match next_event(&mut ws).await {
        RealtimeEvent::ScanProcessed(record) => record,
        other => panic!("Expected scan processed, got {:?}", other),
    };
    assert_eq!(scanned, processed);
    assert_eq!(scanned.id, response["scanId"].as_str().unwrap());
    assert!(scanned.ai_analysis.fallback);

    // A late joiner is seeded with the latest scan
    let (mut late, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
        .await
        .unwrap();
    assert!(matches!(next_event(&mut late).await, RealtimeEvent::DevicesUpdate(_)));
    match next_event(&mut late).await {
        RealtimeEvent::BarcodeScan(record) => assert_eq!(record.id, scanned.id),
        other => panic!("Expected latest scan, got {:?}", other),
    }
}

#[tokio::test]
async fn test_http_analysis_service_posts_to_scan_endpoint() {
    let ai = Router::new().route(
        "/api/esp32/scan",
        post(|Json(body): Json<Value>| async move {
            Json(json!({
                "success": true,
                "title": format!("Echo {}", body["barcodeData"].as_str().unwrap_or_default()),
                "category": "Beverage",
                "description": body["deviceName"],
                "confidence": 0.93
            }))
        }),
    );
    let addr = spawn_server(ai).await;

    let service = HttpAnalysisService::new(&format!("http://{}/", addr), Duration::from_secs(2)).unwrap();
    let analysis = service
        .analyze(&AnalysisRequest {
            barcode_data: "3057640257773".to_string(),
            device_id: "cam-1".to_string(),
            device_name: "Dock Scanner".to_string(),
            scan_type: "ESP32_SCAN".to_string(),
            timestamp: DeviceTimestamp::Millis(1_700_000_000_000),
        })
        .await
        .expect("Should analyze");

    assert_eq!(analysis.title, "Echo 3057640257773");
    assert_eq!(analysis.category, "Beverage");
    assert_eq!(analysis.description, "Dock Scanner");
    assert_eq!(analysis.extra["confidence"], json!(0.93));
}

#[tokio::test]
async fn test_http_analysis_service_error_status() {
    let ai = Router::new().route(
        "/api/esp32/scan",
        post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "model loading") }),
    );
    let addr = spawn_server(ai).await;

    let service = HttpAnalysisService::new(&format!("http://{}", addr), Duration::from_secs(2)).unwrap();
    let err = service
        .analyze(&AnalysisRequest {
            barcode_data: "1".to_string(),
            device_id: "cam-1".to_string(),
            device_name: "Dock Scanner".to_string(),
            scan_type: "ESP32_SCAN".to_string(),
            timestamp: DeviceTimestamp::Millis(0),
        })
        .await
        .unwrap_err();

    match err {
        EnrichmentError::Status { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "model loading");
        }
        other => panic!("Unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_http_analysis_service_unreachable() {
    let service = HttpAnalysisService::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
    let err = service
        .analyze(&AnalysisRequest {
            barcode_data: "1".to_string(),
            device_id: "cam-1".to_string(),
            device_name: "Dock Scanner".to_string(),
            scan_type: "ESP32_SCAN".to_string(),
            timestamp: DeviceTimestamp::Millis(0),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EnrichmentError::Transport(_)));
}

#[tokio::test]
async fn test_http_analysis_service_accepts_null_fields() {
    let ai = Router::new().route(
        "/api/esp32/scan",
        post(|| async {
            Json(json!({
                "success": true,
                "title": "Oat Bar",
                "category": "Snacks",
                "description": null,
                "country": "US"
            }))
        }),
    );
    let addr = spawn_server(ai).await;

    let service = HttpAnalysisService::new(&format!("http://{}", addr), Duration::from_secs(2)).unwrap();
    let analysis = service
        .analyze(&AnalysisRequest {
            barcode_data: "5000112637922".to_string(),
            device_id: "cam-1".to_string(),
            device_name: "Dock Scanner".to_string(),
            scan_type: "ESP32_SCAN".to_string(),
            timestamp: DeviceTimestamp::Millis(0),
        })
        .await
        .expect("Null optional fields should still decode");

    assert_eq!(analysis.title, "Oat Bar");
    assert_eq!(analysis.category, "Snacks");
    assert_eq!(analysis.description, "");
    assert_eq!(analysis.country.as_deref(), Some("US"));
    assert!(!analysis.fallback);
}
