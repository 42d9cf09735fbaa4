//! robridge-hub library
//!
//! HTTP and WebSocket backend for ESP32 barcode scanners and the dashboards
//! that watch them.

use axum::Router;
use robridge_common::{Clock, EventBus};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod api;
pub mod config;
pub mod db;
pub mod enrichment;
pub mod error;
pub mod pipeline;
pub mod realtime;
pub mod registry;

pub use config::HubConfig;
pub use error::{ApiError, ApiResult};

use db::SavedScanStore;
use enrichment::{AnalysisService, EnrichmentGateway};
use pipeline::ScanPipeline;
use realtime::Broadcaster;
use registry::{DeviceRegistry, InMemoryDeviceStore};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub registry: Arc<DeviceRegistry>,
    pub pipeline: Arc<ScanPipeline>,
    pub broadcaster: Arc<Broadcaster>,
    pub saved_scans: Arc<SavedScanStore>,
    /// Include error causes in 500 responses
    pub expose_error_details: bool,
}

impl AppState {
    /// Wire up every component around one database pool and clock
    pub fn new(
        db: SqlitePool,
        config: &HubConfig,
        analysis: Arc<dyn AnalysisService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let events = EventBus::new(config.event_bus_capacity);

        let registry = Arc::new(DeviceRegistry::new(
            Arc::new(InMemoryDeviceStore::new()),
            clock.clone(),
            to_chrono(config.device_stale_after),
            events.clone(),
        ));
        let broadcaster = Arc::new(Broadcaster::new(events));
        let pipeline = Arc::new(ScanPipeline::new(
            registry.clone(),
            EnrichmentGateway::new(analysis, config.ai_policy),
            db.clone(),
            broadcaster.clone(),
            clock.clone(),
        ));
        let saved_scans = Arc::new(SavedScanStore::new(
            db.clone(),
            clock,
            to_chrono(config.saved_dedup_window),
        ));

        Self {
            db,
            registry,
            pipeline,
            broadcaster,
            saved_scans,
            expose_error_details: config.is_development(),
        }
    }

    /// 500 error carrying `cause` only in development mode
    pub fn internal_error(&self, message: &str, cause: impl std::fmt::Display) -> ApiError {
        ApiError::internal(message, cause, self.expose_error_details)
    }
}

fn to_chrono(duration: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(36_500))
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{delete, get, post};

    let esp32 = Router::new()
        .route("/api/esp32/register", post(api::register_device))
        .route(
            "/api/esp32/ping/:device_id",
            post(api::ping_device).get(api::ping_device_get),
        )
        .route("/api/esp32/scan", get(api::describe_scan_endpoint))
        .route("/api/esp32/scan/:device_id", post(api::submit_scan))
        .route("/api/esp32/devices", get(api::list_devices))
        .route("/api/esp32/latest-scan", get(api::latest_scan));

    let saved = Router::new()
        .route("/api/save-scan", post(api::save_scan))
        .route(
            "/api/saved-scans",
            get(api::list_saved_scans).delete(api::clear_saved_scans),
        )
        .route("/api/saved-scans/:id", delete(api::delete_saved_scan));

    let history = Router::new()
        .route("/api/barcodes/scanned", get(api::list_scanned))
        .route("/api/barcodes/lookup/:barcode", get(api::lookup_barcode))
        .route("/api/barcodes/stats", get(api::barcode_stats))
        .route("/api/barcodes/:id", delete(api::delete_scanned));

    Router::new()
        .merge(esp32)
        .merge(saved)
        .merge(history)
        .route("/ws", get(api::ws_handler))
        .route("/api/buildinfo", get(api::get_build_info))
        .merge(api::health_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
