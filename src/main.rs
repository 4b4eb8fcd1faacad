//! # Tide Calendar Application Entry Point
//!
//! Loads the station list, starts tracking every station, and writes each property
//! change as one JSON line on stdout until interrupted with Ctrl-C.
//!
//! Usage: `tide-calendar [--config <path>]`

use std::env;
use std::sync::Arc;

use tide_calendar_lib::adapter::TideCalendarAdapter;
use tide_calendar_lib::config::{Config, DEFAULT_CONFIG_PATH};
use tide_calendar_lib::station::StationSettings;
use tide_calendar_lib::tide_data::NoaaClient;
use tide_calendar_lib::timezone;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Value following `--config`, or the default path.
fn config_path(args: impl IntoIterator<Item = String>) -> String {
    let mut args = args.into_iter().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return path;
            }
        } else if let Some(path) = arg.strip_prefix("--config=") {
            return path.to_string();
        }
    }
    DEFAULT_CONFIG_PATH.to_string()
}

/// Main application entry point.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load_from_path(config_path(env::args()));

    // Build the abbreviation table before any station needs it
    timezone::init();

    let source = Arc::new(NoaaClient::new(&config.api)?);
    let (notifier, mut changes) = mpsc::unbounded_channel();
    let mut adapter = TideCalendarAdapter::new(source, StationSettings::from(&config), notifier);

    let added = adapter.start_pairing(&config.stations).await;
    if added.is_empty() {
        warn!("no stations are being tracked");
    }
    for device_id in &added {
        if let Some(description) = adapter.describe(device_id).await {
            info!(device = %device_id, "{}", serde_json::to_string(&description)?);
        }
    }

    // One listener for the whole run so a Ctrl-C between iterations is not lost
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            Some(change) = changes.recv() => {
                println!("{}", serde_json::to_string(&change)?);
            }
            _ = &mut ctrl_c => {
                info!("shutting down");
                break;
            }
        }
    }

    adapter.shutdown().await;
    Ok(())
}
