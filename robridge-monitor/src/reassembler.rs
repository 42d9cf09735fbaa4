//! Client scan reassembler
//!
//! The hub may announce one physical scan through several events, and a
//! firmware build may send fields piecemeal. The reassembler merges those
//! fragments into one buffer and only promotes it to "latest scan" once it
//! is complete and the stream has gone quiet.
//!
//! ```text
//!   Idle ──event──▶ Buffering{check_at} ──deadline, complete──▶ Cooldown{until}
//!                     │  ▲      │                                  │
//!                     │  └event─┘ deadline, incomplete:            │ deadline
//!                     │           Buffering{None}                  ▼
//!                     └──────────────── reset() ───────────────▶ Idle
//! ```
//!
//! The machine is driven by explicit calls carrying `now`; see
//! [`crate::runner`] for the tokio driver.

use serde_json::{Map, Value};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Source stamped on promoted scans; the hub only saves this source
pub const PROMOTED_SOURCE: &str = "ESP32";

/// Which events count as ESP32 scans
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFilter {
    /// Substrings matched against `deviceName`
    pub device_name_markers: Vec<String>,
    /// Exact `source` values
    pub sources: Vec<String>,
}

impl Default for SourceFilter {
    fn default() -> Self {
        Self {
            device_name_markers: ["Scanner", "RobridgeAI", "Robridge", "ESP32-"]
                .into_iter()
                .map(String::from)
                .collect(),
            sources: ["esp32", "esp32_basic", "ESP32_LIVE_SCANNER"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl SourceFilter {
    pub fn matches(&self, fields: &Map<String, Value>) -> bool {
        let by_name = fields
            .get("deviceName")
            .and_then(Value::as_str)
            .is_some_and(|name| self.device_name_markers.iter().any(|m| name.contains(m.as_str())));
        let by_source = fields
            .get("source")
            .and_then(Value::as_str)
            .is_some_and(|source| self.sources.iter().any(|s| s == source));
        by_name || by_source
    }
}

/// Timing and filtering knobs
#[derive(Debug, Clone, PartialEq)]
pub struct ReassemblerConfig {
    /// Wait after the last merge before checking completeness
    pub quiet_period: Duration,
    /// Lock-out after a promotion
    pub cooldown: Duration,
    pub filter: SourceFilter,
}

impl Default for ReassemblerConfig {
    fn default() -> Self {
        Self {
            quiet_period: Duration::from_millis(500),
            cooldown: Duration::from_millis(2000),
            filter: SourceFilter::default(),
        }
    }
}

/// One scan event's payload as received from the hub
#[derive(Debug, Clone, PartialEq)]
pub struct ScanFragment {
    /// Event name, e.g. `esp32_barcode_scan`
    pub event: String,
    pub fields: Map<String, Value>,
}

impl ScanFragment {
    pub fn new(event: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            event: event.into(),
            fields,
        }
    }
}

/// A complete scan handed to the display
#[derive(Debug, Clone, PartialEq)]
pub struct PromotedScan {
    /// 1 for the first promotion of this reassembler, then increasing
    pub sequence: u64,
    pub fields: Map<String, Value>,
}

impl PromotedScan {
    fn text(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn barcode_data(&self) -> Option<&str> {
        self.text("barcodeData")
    }

    pub fn device_name(&self) -> Option<&str> {
        self.text("deviceName")
    }

    pub fn scan_type(&self) -> Option<&str> {
        self.text("scanType")
    }

    /// Product title from the attached analysis, if any
    pub fn title(&self) -> Option<&str> {
        self.fields
            .get("aiAnalysis")
            .and_then(|a| a.get("title"))
            .and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// Collecting fragments; `check_at` is the pending completeness check
    Buffering { check_at: Option<Instant> },
    /// A scan was just promoted; fragments merge but are not promoted
    Cooldown { until: Instant },
}

pub struct Reassembler {
    config: ReassemblerConfig,
    buffer: Map<String, Value>,
    phase: Phase,
    promotions: u64,
}

impl Reassembler {
    pub fn new(config: ReassemblerConfig) -> Self {
        Self {
            config,
            buffer: Map::new(),
            phase: Phase::Idle,
            promotions: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn buffer(&self) -> &Map<String, Value> {
        &self.buffer
    }

    /// Next instant at which [`Reassembler::on_deadline`] has work to do
    pub fn deadline(&self) -> Option<Instant> {
        match self.phase {
            Phase::Idle => None,
            Phase::Buffering { check_at } => check_at,
            Phase::Cooldown { until } => Some(until),
        }
    }

    /// Merge a fragment; returns false if the source filter rejected it
    pub fn on_event(&mut self, fragment: ScanFragment, now: Instant) -> bool {
        if !self.config.filter.matches(&fragment.fields) {
            debug!(event = %fragment.event, "Skipping non-ESP32 scan event");
            return false;
        }

        let previous_analysis = self.buffer.remove("aiAnalysis");
        for (key, value) in fragment.fields {
            self.buffer.insert(key, value);
        }
        // A fragment without analysis never erases one already buffered
        let incoming_missing = self.buffer.get("aiAnalysis").map_or(true, Value::is_null);
        if incoming_missing {
            if let Some(analysis) = previous_analysis.filter(|a| !a.is_null()) {
                self.buffer.insert("aiAnalysis".to_string(), analysis);
            }
        }
        self.buffer
            .insert("eventType".to_string(), Value::String(fragment.event));

        if !matches!(self.phase, Phase::Cooldown { .. }) {
            self.phase = Phase::Buffering {
                check_at: Some(now + self.config.quiet_period),
            };
        }
        true
    }

    /// Run whatever the current deadline calls for
    ///
    /// Returns the promoted scan when the quiet-period check finds the buffer
    /// complete. Calls before the deadline are no-ops.
    pub fn on_deadline(&mut self, now: Instant) -> Option<PromotedScan> {
        match self.phase {
            Phase::Buffering { check_at: Some(at) } if now >= at => {
                if !is_complete(&self.buffer) {
                    debug!("Buffered scan incomplete, waiting for more fields");
                    self.phase = Phase::Buffering { check_at: None };
                    return None;
                }
                self.promotions += 1;
                let scan = PromotedScan {
                    sequence: self.promotions,
                    fields: promoted_fields(&self.buffer),
                };
                info!(
                    sequence = scan.sequence,
                    barcode = scan.barcode_data().unwrap_or_default(),
                    "Scan promoted"
                );
                self.phase = Phase::Cooldown {
                    until: now + self.config.cooldown,
                };
                Some(scan)
            }
            Phase::Cooldown { until } if now >= until => {
                self.reset();
                None
            }
            _ => None,
        }
    }

    /// Drop the buffer and return to Idle
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.phase = Phase::Idle;
    }
}

fn non_blank(fields: &Map<String, Value>, key: &str) -> bool {
    fields
        .get(key)
        .and_then(Value::as_str)
        .is_some_and(|v| !v.trim().is_empty())
}

/// Barcode, device name and scan type all present
pub fn is_complete(fields: &Map<String, Value>) -> bool {
    non_blank(fields, "barcodeData") && non_blank(fields, "deviceName") && non_blank(fields, "scanType")
}

fn promoted_fields(buffer: &Map<String, Value>) -> Map<String, Value> {
    let mut fields = buffer.clone();
    fields.insert(
        "source".to_string(),
        Value::String(PROMOTED_SOURCE.to_string()),
    );
    let has_timestamp = fields.get("timestamp").is_some_and(|t| !t.is_null());
    if !has_timestamp {
        fields.insert(
            "timestamp".to_string(),
            Value::from(robridge_common::time::unix_millis(robridge_common::time::now())),
        );
    }
    fields
}
