//! robridge-monitor library
//!
//! Dashboard-side view of the hub's realtime feed: a WebSocket client, the
//! scan reassembler state machine and its tokio runner.

use thiserror::Error;

pub mod client;
pub mod reassembler;
pub mod runner;

pub use reassembler::{PromotedScan, Reassembler, ReassemblerConfig, ScanFragment, SourceFilter};
pub use runner::ReassemblerHandle;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Failed to connect to {url}: {message}")]
    Connect { url: String, message: String },

    #[error("WebSocket error: {0}")]
    Stream(String),

    #[error("Malformed event frame: {0}")]
    Frame(#[from] serde_json::Error),

    #[error("Reassembler runner stopped")]
    RunnerStopped,
}
