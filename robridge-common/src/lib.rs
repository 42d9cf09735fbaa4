//! # Robridge Common Library
//!
//! Shared code for the Robridge hub and its dashboard clients:
//! - Domain models (devices, scan records, AI analysis payloads, saved scans)
//! - Realtime event types and the EventBus
//! - Clock abstraction for time-dependent rules
//! - Configuration loading
//! - Database schema bootstrap (behind the `sqlx` feature)

pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod events;
pub mod models;
pub mod time;

pub use error::{Error, Result};
pub use events::{EventBus, RealtimeEvent};
pub use models::{
    AiAnalysis, DeviceInfo, DeviceStatus, DeviceTimestamp, SavedScan, ScanRecord, StoredScan,
};
pub use time::{Clock, ManualClock, SystemClock};
