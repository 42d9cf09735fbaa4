//! Domain models shared between the hub and dashboard clients
//!
//! JSON field names follow the wire contract the ESP32 firmware and the
//! dashboards already speak (camelCase, with a few snake_case analysis
//! fields).

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Analysis source tag for results computed on the device itself
pub const SOURCE_ESP32_AI: &str = "esp32_ai";

/// Analysis source tag for devices enriched without the AI service
pub const SOURCE_BASIC_SCAN: &str = "basic_scan";

/// Connection status of a scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Connected,
    Disconnected,
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceStatus::Connected => write!(f, "connected"),
            DeviceStatus::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// A registered ESP32-class barcode scanner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub device_id: String,
    pub device_name: String,
    #[serde(default)]
    pub ip_address: Option<String>,
    pub firmware_version: String,
    pub status: DeviceStatus,
    pub last_seen: DateTime<Utc>,
    pub total_scans: u64,
    /// Whether scans from this device go through AI enrichment when the
    /// hub runs the capability policy
    #[serde(default)]
    pub ai_capable: bool,
}

/// Timestamp as reported by a device
///
/// Firmware sends either epoch milliseconds or a preformatted string; both
/// are carried through unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeviceTimestamp {
    Millis(i64),
    Text(String),
}

impl DeviceTimestamp {
    /// RFC 3339 rendering of a server-side instant
    pub fn from_instant(at: DateTime<Utc>) -> Self {
        DeviceTimestamp::Text(at.to_rfc3339())
    }
}

impl std::fmt::Display for DeviceTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceTimestamp::Millis(ms) => write!(f, "{}", ms),
            DeviceTimestamp::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Product metadata attached to every accepted scan
///
/// Either a genuine AI result, a device-computed result
/// (`source = "esp32_ai"`), a basic placeholder (`source = "basic_scan"`) or a
/// synthesized fallback (`fallback = true`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiAnalysis {
    #[serde(default = "default_success", deserialize_with = "lenient_success")]
    pub success: bool,
    pub title: String,
    #[serde(default = "default_category", deserialize_with = "lenient_category")]
    pub category: String,
    #[serde(default, deserialize_with = "lenient")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub description_short: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,
    #[serde(
        rename = "deviceId",
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub device_id: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "is_false")]
    pub fallback: bool,
    /// Fields returned by the AI service that have no dedicated slot
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_success() -> bool {
    true
}

fn default_category() -> String {
    "Scanned Product".to_string()
}

fn is_false(value: &bool) -> bool {
    !*value
}

// Only `title` is mandatory in an analysis. Other fields that arrive as
// null or with the wrong JSON type decode to their defaults.
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

fn lenient_success<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Value::deserialize(deserializer)?
        .as_bool()
        .unwrap_or_else(default_success))
}

fn lenient_category<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Value::deserialize(deserializer)?
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(default_category))
}

/// One accepted barcode scan, as broadcast and returned to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    /// `scan_<unix-millis>_<deviceId>`
    pub id: String,
    pub device_id: String,
    pub device_name: String,
    pub barcode_data: String,
    pub scan_type: String,
    pub image_data: Option<String>,
    pub timestamp: DeviceTimestamp,
    pub received_at: DateTime<Utc>,
    pub processed: bool,
    pub ai_analysis: AiAnalysis,
}

impl ScanRecord {
    /// Build the scan id for a device at a given instant
    pub fn make_id(received_at: DateTime<Utc>, device_id: &str) -> String {
        format!("scan_{}_{}", received_at.timestamp_millis(), device_id)
    }
}

/// A user-confirmed scan kept in the `saved_scans` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedScan {
    pub id: i64,
    pub barcode_data: String,
    pub barcode_type: Option<String>,
    pub source: String,
    pub product_name: Option<String>,
    pub category: Option<String>,
    pub price: f64,
    pub description: Option<String>,
    pub metadata: Option<Value>,
    pub saved_at: DateTime<Utc>,
}

/// One row of the append-only `barcodes` scan history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredScan {
    pub id: i64,
    /// `SCAN_<unix-millis>_<random>`
    pub barcode_id: String,
    pub barcode_data: String,
    pub barcode_type: Option<String>,
    pub source: String,
    pub product_name: Option<String>,
    pub product_id: Option<String>,
    pub price: f64,
    pub location_x: f64,
    pub location_y: f64,
    pub location_z: f64,
    pub category: Option<String>,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}
