use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_LOG_FILTER: &str = "grid_sync=info,tower_http=info";

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to listen on (default: `::`)
    pub host: IpAddr,

    /// Port to listen on (default: 8080)
    pub port: u16,

    /// How often the status page refreshes itself
    pub status_refresh: Duration,

    /// `tracing` filter used when `RUST_LOG` is not set
    pub log_filter: String,

    /// Directory for daily-rolling log files (optional)
    pub log_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            status_refresh: Duration::from_secs(5),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            log_dir: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables (and `.env` if present)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key/value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup("GRID_HOST") {
            config.host = host
                .parse()
                .with_context(|| format!("GRID_HOST is not an IP address: {host}"))?;
        }

        if let Some(port) = lookup("GRID_PORT").or_else(|| lookup("PORT")) {
            config.port = port
                .parse()
                .with_context(|| format!("invalid port: {port}"))?;
        }

        if let Some(secs) = lookup("GRID_STATUS_REFRESH_SECS") {
            let secs: u64 = secs
                .parse()
                .with_context(|| format!("GRID_STATUS_REFRESH_SECS is not a number: {secs}"))?;
            config.status_refresh = Duration::from_secs(secs.max(1));
        }

        if let Some(filter) = lookup("GRID_LOG").filter(|f| !f.trim().is_empty()) {
            config.log_filter = filter;
        }

        config.log_dir = lookup("GRID_LOG_DIR")
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from);

        Ok(config)
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }
}
