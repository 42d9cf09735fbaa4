//! AI enrichment gateway
//!
//! Attaches an [`AiAnalysis`] to every accepted scan. The gateway never
//! fails: device-supplied analysis is adopted as is, the capability policy
//! may short-circuit to a basic payload, and any failure of the external
//! service is replaced by a deterministic fallback.

use crate::pipeline::ScanRequest;
use async_trait::async_trait;
use robridge_common::config::AiPolicy;
use robridge_common::models::{SOURCE_BASIC_SCAN, SOURCE_ESP32_AI};
use robridge_common::{AiAnalysis, DeviceInfo, DeviceTimestamp};
use serde::Serialize;
use serde_json::Map;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// `source` value firmware sends when it already ran its own analysis
pub const DEVICE_ANALYSIS_SOURCE: &str = "ai_analysis";

/// Scan type reported to the AI service when the device sent none
const DEFAULT_AI_SCAN_TYPE: &str = "ESP32_SCAN";

/// Body of `POST {AI_SERVER_URL}/api/esp32/scan`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub barcode_data: String,
    pub device_id: String,
    pub device_name: String,
    pub scan_type: String,
    pub timestamp: DeviceTimestamp,
}

/// Why the AI service produced no usable analysis
#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("AI service request failed: {0}")]
    Transport(String),

    #[error("AI service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("AI service returned a malformed analysis: {0}")]
    Malformed(String),
}

/// External product analysis
#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AiAnalysis, EnrichmentError>;
}

/// reqwest client for the hosted AI service
pub struct HttpAnalysisService {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAnalysisService {
    /// `base_url` is the service root; requests go to `{base_url}/api/esp32/scan`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, EnrichmentError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EnrichmentError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/api/esp32/scan", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AnalysisService for HttpAnalysisService {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AiAnalysis, EnrichmentError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| EnrichmentError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EnrichmentError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| EnrichmentError::Malformed(e.to_string()))?;

        if !value.is_object() {
            return Err(EnrichmentError::Malformed("expected a JSON object".to_string()));
        }

        serde_json::from_value(value).map_err(|e| EnrichmentError::Malformed(e.to_string()))
    }
}

/// First `n` characters of `s`
fn prefix_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Placeholder used whenever the AI service cannot answer
pub fn fallback_analysis(barcode_data: &str, device_id: &str) -> AiAnalysis {
    AiAnalysis {
        success: true,
        title: format!("Product {}", prefix_chars(barcode_data, 20)),
        category: "Scanned Product".to_string(),
        description: "Product scanned successfully. AI analysis is currently unavailable."
            .to_string(),
        description_short: Some(format!("Scanned: {}", prefix_chars(barcode_data, 30))),
        country: Some("Unknown".to_string()),
        barcode: Some(barcode_data.to_string()),
        device_id: Some(device_id.to_string()),
        source: None,
        fallback: true,
        extra: Map::new(),
    }
}

/// Payload for devices that are not enriched under the capability policy
pub fn basic_scan_analysis(barcode_data: &str, device: &DeviceInfo) -> AiAnalysis {
    AiAnalysis {
        success: true,
        title: format!("Product {}", prefix_chars(barcode_data, 20)),
        category: "Scanned Product".to_string(),
        description: format!(
            "Basic scan from {}. AI analysis is not enabled for this device.",
            device.device_name
        ),
        description_short: Some(format!("Scanned: {}", prefix_chars(barcode_data, 30))),
        country: Some("Unknown".to_string()),
        barcode: Some(barcode_data.to_string()),
        device_id: Some(device.device_id.clone()),
        source: Some(SOURCE_BASIC_SCAN.to_string()),
        fallback: false,
        extra: Map::new(),
    }
}

/// Adopt analysis the device computed itself
///
/// Returns `None` unless the request is tagged `source = "ai_analysis"` and
/// carries a non-empty product name.
pub fn device_reported_analysis(request: &ScanRequest, device_id: &str) -> Option<AiAnalysis> {
    if request.source.as_deref() != Some(DEVICE_ANALYSIS_SOURCE) {
        return None;
    }
    let name = non_blank(request.product_name.as_deref())?;
    let product_type = non_blank(request.product_type.as_deref());

    let category = non_blank(request.product_category.as_deref())
        .or(product_type)
        .unwrap_or("Scanned Product");
    let description = non_blank(request.product_details.as_deref())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Product: {}", name));

    Some(AiAnalysis {
        success: true,
        title: name.to_string(),
        category: category.to_string(),
        description,
        description_short: Some(format!("{} - {}", name, product_type.unwrap_or("Product"))),
        country: Some("Unknown".to_string()),
        barcode: request.barcode_data.clone(),
        device_id: Some(device_id.to_string()),
        source: Some(SOURCE_ESP32_AI.to_string()),
        fallback: false,
        extra: Map::new(),
    })
}

/// Chooses and runs the enrichment path for one scan
#[derive(Clone)]
pub struct EnrichmentGateway {
    service: Arc<dyn AnalysisService>,
    policy: AiPolicy,
}

impl EnrichmentGateway {
    pub fn new(service: Arc<dyn AnalysisService>, policy: AiPolicy) -> Self {
        Self { service, policy }
    }

    /// Produce the analysis for a validated scan; never fails
    pub async fn enrich(&self, device: &DeviceInfo, request: &ScanRequest) -> AiAnalysis {
        let barcode = request.barcode_data.as_deref().unwrap_or_default();

        if let Some(analysis) = device_reported_analysis(request, &device.device_id) {
            info!(device_id = %device.device_id, barcode = %barcode, "Using device-supplied analysis");
            return analysis;
        }

        if self.policy == AiPolicy::Capability && !device.ai_capable {
            debug!(device_id = %device.device_id, "Device not AI-capable, skipping enrichment");
            return basic_scan_analysis(barcode, device);
        }

        let ai_request = AnalysisRequest {
            barcode_data: barcode.to_string(),
            device_id: device.device_id.clone(),
            device_name: device.device_name.clone(),
            scan_type: non_blank(request.scan_type.as_deref())
                .unwrap_or(DEFAULT_AI_SCAN_TYPE)
                .to_string(),
            timestamp: request
                .timestamp
                .clone()
                .unwrap_or_else(|| DeviceTimestamp::Millis(chrono::Utc::now().timestamp_millis())),
        };

        match self.service.analyze(&ai_request).await {
            Ok(analysis) => {
                info!(device_id = %device.device_id, barcode = %barcode, title = %analysis.title, "AI analysis completed");
                analysis
            }
            Err(e) => {
                warn!(device_id = %device.device_id, barcode = %barcode, error = %e, "AI analysis unavailable, using fallback");
                fallback_analysis(barcode, &device.device_id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use robridge_common::DeviceStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingService {
        calls: AtomicUsize,
        result: fn() -> Result<AiAnalysis, EnrichmentError>,
    }

    #[async_trait]
    impl AnalysisService for CountingService {
        async fn analyze(&self, _request: &AnalysisRequest) -> Result<AiAnalysis, EnrichmentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.result)()
        }
    }

    fn failing() -> Result<AiAnalysis, EnrichmentError> {
        Err(EnrichmentError::Transport("connection refused".to_string()))
    }

    fn succeeding() -> Result<AiAnalysis, EnrichmentError> {
        Ok(AiAnalysis {
            title: "Oat Bar".to_string(),
            ..fallback_analysis("x", "y")
        })
    }

    fn device(name: &str, ai_capable: bool) -> DeviceInfo {
        DeviceInfo {
            device_id: "cam-1".to_string(),
            device_name: name.to_string(),
            ip_address: None,
            firmware_version: "1.0.0".to_string(),
            status: DeviceStatus::Connected,
            last_seen: chrono::Utc::now(),
            total_scans: 0,
            ai_capable,
        }
    }

    fn scan(barcode: &str) -> ScanRequest {
        ScanRequest {
            barcode_data: Some(barcode.to_string()),
            ..Default::default()
        }
    }

    fn gateway(
        result: fn() -> Result<AiAnalysis, EnrichmentError>,
        policy: AiPolicy,
    ) -> (EnrichmentGateway, Arc<CountingService>) {
        let service = Arc::new(CountingService {
            calls: AtomicUsize::new(0),
            result,
        });
        (EnrichmentGateway::new(service.clone(), policy), service)
    }

    #[test]
    fn test_fallback_truncates_by_characters() {
        let barcode = "ÄÖÜ".repeat(15);
        let analysis = fallback_analysis(&barcode, "cam-1");

        assert!(analysis.fallback);
        let title_prefix: String = barcode.chars().take(20).collect();
        assert_eq!(analysis.title, format!("Product {}", title_prefix));
        assert_eq!(
            analysis.description_short.as_deref().unwrap().chars().count(),
            "Scanned: ".len() + 30
        );
        assert_eq!(analysis.country.as_deref(), Some("Unknown"));
    }

    #[test]
    fn test_fallback_short_barcode_kept_whole() {
        let analysis = fallback_analysis("1234567890123", "cam-1");
        assert_eq!(analysis.title, "Product 1234567890123");
        assert_eq!(analysis.description_short.as_deref(), Some("Scanned: 1234567890123"));
    }

    #[test]
    fn test_device_reported_analysis_mapping() {
        let request = ScanRequest {
            barcode_data: Some("555".to_string()),
            source: Some("ai_analysis".to_string()),
            product_name: Some("Green Tea".to_string()),
            product_type: Some("Beverage".to_string()),
            ..Default::default()
        };

        let analysis = device_reported_analysis(&request, "cam-1").unwrap();
        assert_eq!(analysis.title, "Green Tea");
        assert_eq!(analysis.category, "Beverage");
        assert_eq!(analysis.description, "Product: Green Tea");
        assert_eq!(analysis.description_short.as_deref(), Some("Green Tea - Beverage"));
        assert_eq!(analysis.source.as_deref(), Some("esp32_ai"));
    }

    #[test]
    fn test_device_reported_analysis_requires_name() {
        let request = ScanRequest {
            barcode_data: Some("555".to_string()),
            source: Some("ai_analysis".to_string()),
            product_name: Some(String::new()),
            ..Default::default()
        };
        assert!(device_reported_analysis(&request, "cam-1").is_none());
    }

    #[tokio::test]
    async fn test_device_analysis_skips_service() {
        let (gateway, service) = gateway(succeeding, AiPolicy::Always);
        let request = ScanRequest {
            barcode_data: Some("555".to_string()),
            source: Some("ai_analysis".to_string()),
            product_name: Some("Green Tea".to_string()),
            product_category: Some("Drinks".to_string()),
            product_details: Some("Loose leaf".to_string()),
            ..Default::default()
        };

        let analysis = gateway.enrich(&device("Scanner", false), &request).await;
        assert_eq!(analysis.category, "Drinks");
        assert_eq!(analysis.description, "Loose leaf");
        assert_eq!(analysis.description_short.as_deref(), Some("Green Tea - Product"));
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_service_failure_gives_fallback() {
        let (gateway, service) = gateway(failing, AiPolicy::Always);
        let analysis = gateway.enrich(&device("Scanner", false), &scan("1234567890123")).await;

        assert!(analysis.fallback);
        assert!(analysis.title.starts_with("Product 1234567890123"));
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_service_result_is_used() {
        let (gateway, _service) = gateway(succeeding, AiPolicy::Always);
        let analysis = gateway.enrich(&device("Scanner", false), &scan("1")).await;
        assert_eq!(analysis.title, "Oat Bar");
    }

    #[tokio::test]
    async fn test_capability_policy_gates_service() {
        let (gateway, service) = gateway(succeeding, AiPolicy::Capability);

        let basic = gateway.enrich(&device("Dock Scanner", false), &scan("42")).await;
        assert_eq!(basic.source.as_deref(), Some("basic_scan"));
        assert!(!basic.fallback);
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);

        let enriched = gateway.enrich(&device("RobridgeAI", true), &scan("42")).await;
        assert_eq!(enriched.title, "Oat Bar");
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        let service = HttpAnalysisService::new("http://localhost:8000/", Duration::from_secs(1)).unwrap();
        assert_eq!(service.endpoint(), "http://localhost:8000/api/esp32/scan");
    }
}
