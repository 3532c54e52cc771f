//! Device Integration Service (`devsrv`)
//!
//! Starts one listener per enabled device and bridges instrument traffic to
//! the analyzer boundary until interrupted.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use devsrv::aggregate::ResultAggregator;
use devsrv::analyzer::{Analyzer, LogAnalyzer};
use devsrv::config::AppConfig;
use devsrv::server::{SerialDeviceServer, TcpDeviceServer};
use devsrv::strategy::{DeviceHandler, DeviceStrategy};

#[derive(Parser, Debug)]
#[command(name = "devsrv", about = "Laboratory device integration service")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "devsrv.yaml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = AppConfig::load(&args.config)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(
        service = %config.service.name,
        devices = config.devices.len(),
        "starting device integration service"
    );

    let analyzer: Arc<dyn Analyzer> = Arc::new(LogAnalyzer);
    let aggregator = ResultAggregator::new(
        analyzer.clone(),
        Duration::from_millis(config.service.result_debounce_ms),
    );
    let strategy = DeviceStrategy::new(analyzer, aggregator, config.hl7.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut servers = Vec::new();
    for device in config.enabled_devices() {
        match strategy.choose_device_handler(device) {
            Ok(DeviceHandler::Tcp(handler)) => {
                let server = TcpDeviceServer::new(device.clone(), handler, shutdown_rx.clone());
                servers.push(tokio::spawn(server.run()));
            }
            Ok(DeviceHandler::Serial(handler)) => {
                let server = SerialDeviceServer::new(device.clone(), handler, shutdown_rx.clone());
                servers.push(tokio::spawn(server.run()));
            }
            Err(e) => warn!(device = %device.name, error = %e, "skipping device"),
        }
    }
    if servers.is_empty() {
        warn!("no enabled devices configured");
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    for server in servers {
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "device server failed"),
            Err(e) => error!(error = %e, "device server task failed to join"),
        }
    }
    info!("device integration service stopped");
    Ok(())
}
