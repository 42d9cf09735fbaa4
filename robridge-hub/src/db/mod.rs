//! Persistence adapter
//!
//! - `scans`: append-only history of every accepted scan (`barcodes` table)
//! - `saved_scans`: user-confirmed scans with duplicate suppression

pub mod saved_scans;
pub mod scans;

pub use saved_scans::{NewSavedScan, SaveOutcome, SavedScanStore};
pub use scans::{NewScan, ScanStats};
