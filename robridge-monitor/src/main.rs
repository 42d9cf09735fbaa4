//! robridge-monitor - terminal view of the hub's live scans
//!
//! Connects to the hub's WebSocket feed, reassembles scan events and prints
//! each promoted scan as one JSON line on stdout. Logs go to stderr.

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use robridge_monitor::client::{self, DeviceUpdate};
use robridge_monitor::{runner, PromotedScan, ReassemblerConfig, SourceFilter};
use serde_json::Value;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for robridge-monitor
#[derive(Parser, Debug)]
#[command(name = "robridge-monitor")]
#[command(about = "Live scan monitor for a Robridge hub")]
#[command(version)]
struct Args {
    /// Hub WebSocket URL
    #[arg(long, env = "ROBRIDGE_WS_URL", default_value = "ws://127.0.0.1:3001/ws")]
    url: String,

    /// Quiet period before a buffered scan is checked (milliseconds)
    #[arg(long, default_value_t = 500)]
    quiet_ms: u64,

    /// Lock-out after a promotion (milliseconds)
    #[arg(long, default_value_t = 2000)]
    cooldown_ms: u64,

    /// Delay between reconnection attempts (seconds)
    #[arg(long, default_value_t = 3)]
    reconnect_secs: u64,

    /// Extra accepted `source` values, besides the built-in ESP32 ones
    #[arg(long = "accept-source")]
    accept_sources: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "robridge_monitor=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!(
        "Starting Robridge Monitor (robridge-monitor) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let mut filter = SourceFilter::default();
    filter.sources.extend(args.accept_sources);
    let config = ReassemblerConfig {
        quiet_period: Duration::from_millis(args.quiet_ms),
        cooldown: Duration::from_millis(args.cooldown_ms),
        filter,
    };
    info!(
        url = %args.url,
        quiet_ms = args.quiet_ms,
        cooldown_ms = args.cooldown_ms,
        "Monitor configured"
    );

    let (handle, _runner) = runner::spawn(config);

    let mut promotions = handle.promotions();
    tokio::spawn(async move {
        while promotions.changed().await.is_ok() {
            let scan = promotions.borrow_and_update().clone();
            if let Some(scan) = scan {
                print_scan(&scan);
            }
        }
    });

    let reconnect = Duration::from_secs(args.reconnect_secs);
    loop {
        tokio::select! {
            result = client::pump(&args.url, &handle, log_device_update) => {
                if let Err(e) = result {
                    error!(error = %e, "Connection failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }

        warn!("Reconnecting in {}s", reconnect.as_secs());
        tokio::select! {
            _ = tokio::time::sleep(reconnect) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    Ok(())
}

fn log_device_update(update: DeviceUpdate) {
    match update {
        DeviceUpdate::List(devices) => {
            info!(count = devices.len(), "Device list received");
            for device in devices {
                info!(
                    device_id = %device.device_id,
                    device_name = %device.device_name,
                    status = %device.status,
                    total_scans = device.total_scans,
                    "Device"
                );
            }
        }
        DeviceUpdate::Connected(device) => {
            info!(
                device_id = %device.device_id,
                device_name = %device.device_name,
                "Device connected"
            );
        }
    }
}

fn print_scan(scan: &PromotedScan) {
    info!(
        sequence = scan.sequence,
        barcode = scan.barcode_data().unwrap_or_default(),
        device = scan.device_name().unwrap_or_default(),
        title = scan.title().unwrap_or("-"),
        "Latest scan"
    );
    println!("{}", Value::Object(scan.fields.clone()));
}
