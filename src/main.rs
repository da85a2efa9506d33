use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use colored::*;

use grid_sync::{server, telemetry, ServerConfig};

#[derive(Parser)]
#[command(name = "grid-sync")]
#[command(about = "Real-time anchor synchronization server", version)]
#[command(after_help = "Environment:
   GRID_HOST                  address to bind (default ::)
   GRID_PORT / PORT           port to bind (default 8080)
   GRID_STATUS_REFRESH_SECS   status page refresh interval (default 5)
   GRID_LOG                   log filter when RUST_LOG is unset
   GRID_LOG_DIR               write daily-rolling log files here

Endpoints:
   GET  /                 status page, or WebSocket upgrade
   GET  /ws               WebSocket upgrade
   GET  /getAllAnchors    list every anchor
   GET  /clearAllAnchors  remove every anchor
   POST /setAnchor        add or move one anchor")]
struct Cli {
    /// Address to bind (overrides GRID_HOST)
    #[arg(long)]
    host: Option<IpAddr>,

    /// Port to bind (overrides GRID_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory for log files (overrides GRID_LOG_DIR)
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ServerConfig::from_env()?;
    if let Some(host) = cli.host {
        config = config.with_host(host);
    }
    if let Some(port) = cli.port {
        config = config.with_port(port);
    }
    if let Some(dir) = cli.log_dir {
        config = config.with_log_dir(dir);
    }

    let _log_guard = telemetry::init(&config)?;

    println!(
        "{}",
        format!("🌐 Starting anchor sync server on {}...", config.bind_addr())
            .cyan()
            .bold()
    );
    server::start(config).await
}
