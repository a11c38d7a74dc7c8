//! Daemon configuration.
//!
//! Every option can come from the command line or from a `STACKDB_*`
//! environment variable. Endpoints accept `host:port` or the short `:port`
//! form, which binds all interfaces.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug, Clone)]
#[command(name = "stackdbd", about = "Durable named LIFO stacks over HTTP and binary RPC")]
pub struct ServerConfig {
    /// Plain HTTP (REST) endpoint.
    #[arg(long, env = "STACKDB_HTTP")]
    pub http: Option<String>,

    /// Binary RPC endpoint (TCP).
    #[arg(long, env = "STACKDB_RPC")]
    pub rpc: Option<String>,

    /// Binary RPC carried over HTTP.
    #[arg(long = "http-rpc", env = "STACKDB_HTTP_RPC")]
    pub http_rpc: Option<String>,

    /// Root directory holding one file per stack.
    #[arg(long, env = "STACKDB_ROOT", default_value = "./db")]
    pub root: PathBuf,

    /// Idle time after which an open stack file is closed.
    #[arg(
        long = "keep-alive",
        env = "STACKDB_KEEP_ALIVE",
        default_value = "10s",
        value_parser = humantime::parse_duration
    )]
    pub keep_alive: Duration,

    /// Discard log output.
    #[arg(long, env = "STACKDB_SILENT")]
    pub silent: bool,
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.http.is_none() && self.rpc.is_none() && self.http_rpc.is_none() {
            anyhow::bail!("No endpoint configured: set at least one of --http, --rpc, --http-rpc");
        }
        if self.keep_alive.is_zero() {
            anyhow::bail!("--keep-alive must be greater than zero");
        }
        Ok(())
    }

    /// Log filter: `off` when silent, otherwise `RUST_LOG` or `info`.
    pub fn env_filter(&self) -> EnvFilter {
        if self.silent {
            return EnvFilter::new("off");
        }
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Expands the `:port` shorthand into a bindable address.
pub fn bind_address(endpoint: &str) -> String {
    if endpoint.starts_with(':') {
        format!("0.0.0.0{}", endpoint)
    } else {
        endpoint.to_string()
    }
}
