//! phonescan - find Cisco IP phones on the wire
//!
//! Listens for LLDP on every capture device, asks each phone found for its
//! identity and prints one record per phone.

mod config;
mod output;
mod service;

use anyhow::{Context, Result};
use clap::Parser;
use futures_util::StreamExt;
use phonescan_discovery::DiscoverySession;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::output::{OutputFormat, Printer};

#[derive(Parser, Debug)]
#[command(name = "phonescan")]
#[command(about = "Discover Cisco IP phones via LLDP")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "phonescan.toml")]
    config: PathBuf,

    /// Seconds to listen on each device
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Forward proxy for phone web service requests
    #[arg(short, long)]
    proxy: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout carries only records
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("phonescan v{}", env!("CARGO_PKG_VERSION"));

    let mut config = config::load_config(&args.config)?;

    if let Some(timeout) = args.timeout {
        config.discovery.timeout_secs = timeout;
    }
    if let Some(proxy) = args.proxy {
        config.discovery.proxy = Some(proxy);
    }

    info!(
        timeout_secs = config.discovery.timeout_secs,
        proxy = config.discovery.proxy.as_deref().unwrap_or("none"),
        capture_unit = config.capture_service.unit.as_deref().unwrap_or("none"),
        "Configuration loaded"
    );

    let session = DiscoverySession::new(config.to_session_config())
        .context("Failed to set up discovery")?
        .with_capture_service(service::from_config(&config.capture_service));

    let mut phones = session.discover().await.context("Discovery failed")?;
    let mut printer = Printer::new(args.format, std::io::stdout());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            phone = phones.next() => match phone {
                Some(phone) => printer.phone(&phone)?,
                None => break,
            },
            _ = &mut ctrl_c, if !interrupted => {
                warn!("Interrupted, cancelling scan");
                interrupted = true;
                phones.cancel();
            }
        }
    }

    let count = printer.finish()?;
    let summary = phones.finish().await?;
    info!(
        phones = count,
        devices = summary.devices,
        probed = summary.probed,
        skipped = summary.skipped,
        open_failures = summary.open_failures,
        timeouts = summary.timeouts,
        rejected_frames = summary.rejected_frames,
        query_failures = summary.query_failures,
        cancelled = summary.cancelled,
        "Discovery finished"
    );

    Ok(())
}
