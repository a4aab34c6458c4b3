use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

/// Process configuration. Every flag can also be set from the environment
/// (or a `.env` file). Quotas and bot signatures are compiled in.
#[derive(Debug, Clone, Parser)]
#[command(name = "silverball-gate", version, about)]
pub struct Config {
    /// Server bind address
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3000")]
    pub bind_addr: SocketAddr,

    /// Base URL of the web application behind the gate
    #[arg(long, env = "UPSTREAM_URL", default_value = "http://127.0.0.1:8080")]
    pub upstream_url: String,

    /// Upstream request timeout in seconds
    #[arg(long = "upstream-timeout-secs", env = "UPSTREAM_TIMEOUT", default_value_t = 30)]
    pub upstream_timeout_secs: u64,

    /// Expired rate window sweep interval in seconds
    #[arg(long = "cleanup-interval-secs", env = "CLEANUP_INTERVAL", default_value_t = 60)]
    pub cleanup_interval_secs: u64,

    /// Log level used when RUST_LOG is not set
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Enable per-request HTTP tracing
    #[arg(long, env = "ENABLE_TRACING", default_value_t = true, action = clap::ArgAction::Set)]
    pub enable_tracing: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            upstream_url: "http://127.0.0.1:8080".to_string(),
            upstream_timeout_secs: 30,
            cleanup_interval_secs: 60,
            log_level: "info".to_string(),
            enable_tracing: true,
        }
    }
}

impl Config {
    /// Load configuration from command line arguments and environment variables
    pub fn load() -> Self {
        Config::parse()
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}
