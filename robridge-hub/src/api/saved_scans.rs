//! Saved scan endpoints

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    Json,
};
use chrono::{DateTime, Utc};
use robridge_common::SavedScan;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::db::{NewSavedScan, SaveOutcome};
use crate::{ApiError, ApiResult, AppState};

/// Only scans from this source may be saved (compared case-insensitively)
pub const SAVEABLE_SOURCE: &str = "ESP32";

/// Body of `POST /api/save-scan`
#[derive(Debug, Deserialize)]
pub struct SaveScanRequest {
    pub barcode_data: Option<String>,
    pub barcode_type: Option<String>,
    pub source: Option<String>,
    pub product_name: Option<String>,
    pub category: Option<String>,
    pub price: Option<f64>,
    pub description: Option<String>,
    pub metadata: Option<Value>,
}

/// Saved scan as listed to dashboards
///
/// `created_at` and `scanned_at` repeat `saved_at` for older dashboard builds.
#[derive(Debug, Serialize)]
pub struct SavedScanView {
    #[serde(flatten)]
    pub scan: SavedScan,
    pub created_at: DateTime<Utc>,
    pub scanned_at: DateTime<Utc>,
}

impl From<SavedScan> for SavedScanView {
    fn from(scan: SavedScan) -> Self {
        Self {
            created_at: scan.saved_at,
            scanned_at: scan.saved_at,
            scan,
        }
    }
}

/// POST /api/save-scan
///
/// A duplicate within the window is answered with 200 and
/// `{success: false, duplicate: true}`.
pub async fn save_scan(
    State(state): State<AppState>,
    body: Result<Json<SaveScanRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = body?;

    let barcode_data = request
        .barcode_data
        .filter(|b| !b.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Barcode data is required".to_string()))?;

    let source = request.source.unwrap_or_default();
    if !source.eq_ignore_ascii_case(SAVEABLE_SOURCE) {
        return Err(ApiError::BadRequest(
            "Only ESP32 source scans can be saved.".to_string(),
        ));
    }

    let outcome = state
        .saved_scans
        .save(&NewSavedScan {
            barcode_data,
            barcode_type: request.barcode_type,
            source,
            product_name: request.product_name,
            category: request.category,
            price: request.price,
            description: request.description,
            metadata: request.metadata,
        })
        .await
        .map_err(|e| state.internal_error("Failed to save scan", e))?;

    let body = match outcome {
        SaveOutcome::Saved { id } => json!({
            "success": true,
            "message": "Scan saved successfully",
            "savedId": id,
        }),
        SaveOutcome::Duplicate {
            last_saved,
            minutes_ago,
        } => json!({
            "success": false,
            "duplicate": true,
            "lastSaved": last_saved,
            "error": format!(
                "This barcode was already saved {:.1} minutes ago. Please wait before saving again.",
                minutes_ago
            ),
        }),
    };

    Ok(Json(body))
}

/// GET /api/saved-scans
pub async fn list_saved_scans(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let scans = state
        .saved_scans
        .list()
        .await
        .map_err(|e| state.internal_error("Failed to fetch saved scans", e))?;

    let views: Vec<SavedScanView> = scans.into_iter().map(SavedScanView::from).collect();
    Ok(Json(json!({
        "success": true,
        "savedScans": views,
    })))
}

/// DELETE /api/saved-scans/:id
pub async fn delete_saved_scan(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<Value>> {
    let Path(id) = id.map_err(|e| ApiError::BadRequest(format!("Invalid saved scan id: {}", e)))?;

    let removed = state
        .saved_scans
        .delete(id)
        .await
        .map_err(|e| state.internal_error("Failed to delete saved scan", e))?;

    if !removed {
        return Err(ApiError::NotFound("Saved scan not found".to_string()));
    }

    Ok(Json(json!({
        "success": true,
        "message": "Saved scan deleted successfully",
        "deletedId": id,
    })))
}

/// DELETE /api/saved-scans
pub async fn clear_saved_scans(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let removed = state
        .saved_scans
        .clear()
        .await
        .map_err(|e| state.internal_error("Failed to clear saved scans", e))?;

    Ok(Json(json!({
        "success": true,
        "message": "All saved scans cleared successfully",
        "deletedCount": removed,
    })))
}
