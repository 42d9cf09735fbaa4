//! HTTP API handlers for robridge-hub

pub mod barcodes;
pub mod buildinfo;
pub mod esp32;
pub mod health;
pub mod saved_scans;
pub mod ws;

pub use barcodes::{barcode_stats, delete_scanned, list_scanned, lookup_barcode};
pub use buildinfo::get_build_info;
pub use esp32::{
    describe_scan_endpoint, latest_scan, list_devices, ping_device, ping_device_get,
    register_device, submit_scan,
};
pub use health::health_routes;
pub use saved_scans::{clear_saved_scans, delete_saved_scan, list_saved_scans, save_scan};
pub use ws::ws_handler;
