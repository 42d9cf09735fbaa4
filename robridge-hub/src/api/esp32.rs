//! ESP32 device endpoints: registration, heartbeat, scan submission

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::pipeline::{PipelineError, ScanRequest};
use crate::registry::Registration;
use crate::{ApiError, ApiResult, AppState};

/// Body of `POST /api/esp32/register`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub device_id: Option<String>,
    pub device_name: Option<String>,
    pub ip_address: Option<String>,
    pub firmware_version: Option<String>,
    pub ai_capable: Option<bool>,
}

/// POST /api/esp32/register
pub async fn register_device(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = body?;

    let device_id = request
        .device_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("deviceId is required".to_string()))?;

    let device = state.registry.register(Registration {
        device_id,
        device_name: request.device_name,
        ip_address: request.ip_address,
        firmware_version: request.firmware_version,
        ai_capable: request.ai_capable,
    });

    Ok(Json(json!({
        "success": true,
        "message": "Device registered successfully",
        "deviceId": device.device_id,
    })))
}

/// POST /api/esp32/ping/:deviceId
///
/// Heartbeat for registered devices only.
pub async fn ping_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let device = state
        .registry
        .touch(&device_id)
        .ok_or_else(|| ApiError::NotFound("Device not found".to_string()))?;

    debug!(device_id = %device_id, "Ping");
    Ok(Json(json!({
        "success": true,
        "timestamp": device.last_seen,
    })))
}

/// GET /api/esp32/ping/:deviceId
///
/// Heartbeat that registers unknown devices on the fly.
pub async fn ping_device_get(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
) -> Json<Value> {
    let ip_address = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string());

    let (device, created) = state.registry.touch_or_register(&device_id, ip_address);

    let mut body = json!({
        "success": true,
        "timestamp": device.last_seen,
        "method": "GET",
    });
    if created {
        body["message"] = json!("Device registered");
    }
    Json(body)
}

/// GET /api/esp32/scan
///
/// Describes the scan submission endpoint for firmware developers.
pub async fn describe_scan_endpoint() -> Json<Value> {
    Json(json!({
        "message": "ESP32 Barcode Scan Endpoint",
        "method": "POST",
        "url": "/api/esp32/scan/:deviceId",
        "description": "Send barcode scan data from ESP32 device",
        "requiredParams": {
            "deviceId": "Device identifier (in URL path)"
        },
        "requiredBody": {
            "barcodeData": "The scanned barcode or QR code data",
            "scanType": "Type of scan (optional)",
            "imageData": "Base64 image data (optional)",
            "timestamp": "Scan timestamp (optional)"
        },
        "example": {
            "url": "/api/esp32/scan/my-device-001",
            "method": "POST",
            "body": {
                "barcodeData": "1234567890123",
                "scanType": "barcode",
                "timestamp": chrono::Utc::now().timestamp_millis()
            }
        }
    }))
}

/// POST /api/esp32/scan/:deviceId
///
/// Unknown devices get 404 before the body is looked at. The pipeline pass
/// runs on its own task so it completes even if the client disconnects.
pub async fn submit_scan(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    body: Result<Json<ScanRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    if state.registry.get(&device_id).is_none() {
        return Err(ApiError::NotFound("Device not registered".to_string()));
    }

    let Json(request) = body?;

    let pipeline = state.pipeline.clone();
    let task_device_id = device_id.clone();
    let outcome = tokio::spawn(async move { pipeline.ingest(&task_device_id, request).await })
        .await
        .map_err(|e| {
            error!(device_id = %device_id, error = %e, "Scan task failed");
            state.internal_error("Failed to process scan", e)
        })?;

    let record = outcome.map_err(|e| match e {
        PipelineError::DeviceNotRegistered(_) => ApiError::NotFound(e.to_string()),
        PipelineError::MissingBarcode => ApiError::BadRequest(e.to_string()),
    })?;

    Ok(Json(json!({
        "success": true,
        "message": "Barcode scan received and processed with AI",
        "scanId": record.id,
        "aiAnalysis": record.ai_analysis,
    })))
}

/// GET /api/esp32/devices
pub async fn list_devices(State(state): State<AppState>) -> Json<Value> {
    let devices = state.registry.list();
    Json(json!({
        "success": true,
        "totalDevices": devices.len(),
        "devices": devices,
    }))
}

/// GET /api/esp32/latest-scan
pub async fn latest_scan(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "success": true,
        "scan": state.broadcaster.latest(),
    }))
}
