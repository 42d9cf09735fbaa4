//! Scan history endpoints

use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::scans;
use crate::{ApiError, ApiResult, AppState};

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;

/// Query parameters for `GET /api/barcodes/scanned`
#[derive(Debug, Default, Deserialize)]
pub struct ScannedQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub source: Option<String>,
}

/// GET /api/barcodes/scanned
pub async fn list_scanned(
    State(state): State<AppState>,
    query: Result<Query<ScannedQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = query.offset.unwrap_or(0).max(0);
    let source = query.source.as_deref().filter(|s| !s.is_empty());

    let barcodes = scans::list_scans(&state.db, limit, offset, source)
        .await
        .map_err(|e| state.internal_error("Failed to fetch scanned barcodes", e))?;

    Ok(Json(json!({
        "success": true,
        "total": barcodes.len(),
        "limit": limit,
        "offset": offset,
        "barcodes": barcodes,
    })))
}

/// GET /api/barcodes/lookup/:barcode
///
/// Newest history row for a barcode, shaped for the device display.
pub async fn lookup_barcode(
    State(state): State<AppState>,
    Path(barcode): Path<String>,
) -> ApiResult<Json<Value>> {
    let row = scans::lookup_latest(&state.db, &barcode)
        .await
        .map_err(|e| state.internal_error("Database lookup failed", e))?;

    let Some(row) = row else {
        return Ok(Json(json!({
            "success": false,
            "message": "Barcode not found in database",
            "product": null,
        })));
    };

    let details = row
        .metadata
        .as_ref()
        .and_then(|m| m.get("productDetails").or_else(|| m.get("description")))
        .and_then(Value::as_str)
        .unwrap_or("No details available")
        .to_string();
    let category = row.category.clone().unwrap_or_else(|| "Unknown".to_string());
    let price = if row.price > 0.0 {
        format!("${}", row.price)
    } else {
        "Price not available".to_string()
    };

    Ok(Json(json!({
        "success": true,
        "product": {
            "barcode": row.barcode_data,
            "name": row.product_name.as_deref().unwrap_or("Unknown Product"),
            "type": category,
            "details": details,
            "price": price,
            "category": category,
            "location": format!("X:{}, Y:{}, Z:{}", row.location_x, row.location_y, row.location_z),
            "foundInDatabase": true,
            "lastScanned": row.created_at,
        }
    })))
}

/// GET /api/barcodes/stats
pub async fn barcode_stats(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let stats = scans::stats(&state.db)
        .await
        .map_err(|e| state.internal_error("Failed to fetch statistics", e))?;

    Ok(Json(json!({
        "success": true,
        "stats": stats,
    })))
}

/// DELETE /api/barcodes/:id
pub async fn delete_scanned(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<Value>> {
    let Path(id) = id.map_err(|e| ApiError::BadRequest(format!("Invalid barcode id: {}", e)))?;

    let removed = scans::delete_scan(&state.db, id)
        .await
        .map_err(|e| state.internal_error("Failed to delete barcode", e))?;

    if !removed {
        return Err(ApiError::NotFound("Barcode not found".to_string()));
    }

    Ok(Json(json!({
        "success": true,
        "message": "Barcode deleted successfully",
        "deletedId": id,
    })))
}
