//! Scan ingestion pipeline
//!
//! One pass per accepted scan: validate, count the scan against its device,
//! enrich, assemble the [`ScanRecord`], persist best-effort, then publish to
//! dashboards. Validation happens before any state changes.

use crate::db::scans::{self, NewScan};
use crate::enrichment::EnrichmentGateway;
use crate::realtime::Broadcaster;
use crate::registry::DeviceRegistry;
use robridge_common::{Clock, DeviceInfo, DeviceTimestamp, ScanRecord};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

/// Scan type recorded when the device sent none
pub const DEFAULT_SCAN_TYPE: &str = "unknown";

/// Body of `POST /api/esp32/scan/:deviceId`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    pub barcode_data: Option<String>,
    pub scan_type: Option<String>,
    pub image_data: Option<String>,
    pub timestamp: Option<DeviceTimestamp>,

    // Present when the device ran its own product analysis
    pub source: Option<String>,
    pub product_name: Option<String>,
    pub product_type: Option<String>,
    pub product_details: Option<String>,
    pub product_category: Option<String>,
}

/// Scans rejected before any state change
#[derive(Debug, Error, PartialEq)]
pub enum PipelineError {
    #[error("Device not registered")]
    DeviceNotRegistered(String),

    #[error("barcodeData is required")]
    MissingBarcode,
}

/// Runs the ingestion steps for one scan at a time
pub struct ScanPipeline {
    registry: Arc<DeviceRegistry>,
    gateway: EnrichmentGateway,
    db: SqlitePool,
    broadcaster: Arc<Broadcaster>,
    clock: Arc<dyn Clock>,
}

impl ScanPipeline {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        gateway: EnrichmentGateway,
        db: SqlitePool,
        broadcaster: Arc<Broadcaster>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            gateway,
            db,
            broadcaster,
            clock,
        }
    }

    /// Process one scan end to end
    pub async fn ingest(
        &self,
        device_id: &str,
        request: ScanRequest,
    ) -> Result<ScanRecord, PipelineError> {
        if self.registry.get(device_id).is_none() {
            return Err(PipelineError::DeviceNotRegistered(device_id.to_string()));
        }

        let barcode_data = match request.barcode_data.as_deref() {
            Some(data) if !data.trim().is_empty() => data.to_string(),
            _ => return Err(PipelineError::MissingBarcode),
        };

        let device = self
            .registry
            .record_scan(device_id)
            .ok_or_else(|| PipelineError::DeviceNotRegistered(device_id.to_string()))?;

        info!(
            device_id = %device_id,
            device_name = %device.device_name,
            barcode = %barcode_data,
            "ESP32 scan received"
        );

        let ai_analysis = self.gateway.enrich(&device, &request).await;

        let received_at = self.clock.now();
        let record = ScanRecord {
            id: ScanRecord::make_id(received_at, device_id),
            device_id: device_id.to_string(),
            device_name: device.device_name.clone(),
            barcode_data,
            scan_type: request
                .scan_type
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SCAN_TYPE.to_string()),
            image_data: request.image_data,
            timestamp: request
                .timestamp
                .unwrap_or_else(|| DeviceTimestamp::from_instant(received_at)),
            received_at,
            processed: true,
            ai_analysis,
        };

        self.persist(&device, &record).await;

        self.broadcaster.publish_scan(&record);
        info!(scan_id = %record.id, subscribers = self.broadcaster.subscriber_count(), "Scan broadcast");

        Ok(record)
    }

    async fn persist(&self, device: &DeviceInfo, record: &ScanRecord) {
        let analysis = &record.ai_analysis;
        let row = NewScan {
            barcode_data: record.barcode_data.clone(),
            barcode_type: Some(record.scan_type.clone()),
            source: scans::ESP32_SOURCE.to_string(),
            product_name: Some(analysis.title.clone()),
            product_id: Some(record.barcode_data.clone()),
            price: 0.0,
            location: (0.0, 0.0, 0.0),
            category: Some(analysis.category.clone()),
            metadata: json!({
                "deviceName": device.device_name,
                "deviceId": device.device_id,
                "scanType": record.scan_type,
                "timestamp": record.timestamp,
                "aiAnalysis": analysis,
                "description": analysis.description,
                "country": analysis.country,
            }),
        };

        match scans::insert_scan(&self.db, &row, record.received_at).await {
            Ok((id, barcode_id)) => {
                info!(scan_id = %record.id, row_id = id, barcode_id = %barcode_id, "Scan saved to database");
            }
            Err(e) => {
                error!(scan_id = %record.id, error = %e, "Failed to save scan to database");
            }
        }
    }
}
