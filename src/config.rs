//! Process configuration
//!
//! Every flag can also be supplied through the environment so the relay
//! can run under a process manager without a wrapper script.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

use crate::error::{RelayError, Result};

/// Where the upstream sales stream lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTarget {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl UpstreamTarget {
    /// Validate and build a target
    pub fn new(host: impl Into<String>, port: u16, tls: bool) -> Result<Self> {
        let host = host.into();
        let host = host.trim();
        if host.is_empty() {
            return Err(RelayError::Config("upstream host is empty".to_string()));
        }
        if host.contains("://") || host.contains('/') || host.chars().any(char::is_whitespace) {
            return Err(RelayError::Config(format!(
                "upstream host must be a bare host name, got '{}'",
                host
            )));
        }
        if port == 0 {
            return Err(RelayError::Config("upstream port must be non-zero".to_string()));
        }
        Ok(Self {
            host: host.to_string(),
            port,
            tls,
        })
    }

    /// Plaintext targets use `http`, TLS targets `https`
    pub fn uri(&self) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

impl std::fmt::Display for UpstreamTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "ventas-relay")]
#[command(about = "Relays the upstream sales stream to WebSocket sessions")]
pub struct RelayConfig {
    /// Address the WebSocket/HTTP server binds to
    #[arg(long, env = "VENTAS_RELAY_BIND", default_value = "0.0.0.0:8080")]
    pub bind: SocketAddr,

    /// Upstream gRPC host
    #[arg(long, env = "GRPC_VENTAS_HOST", default_value = "localhost")]
    pub upstream_host: String,

    /// Upstream gRPC port
    #[arg(long, env = "GRPC_VENTAS_PORT", default_value = "9090")]
    pub upstream_port: u16,

    /// Use TLS for the upstream channel (plaintext otherwise)
    #[arg(long, env = "GRPC_VENTAS_TLS")]
    pub upstream_tls: bool,

    /// Upstream connect timeout in ms
    #[arg(long, env = "GRPC_VENTAS_CONNECT_TIMEOUT_MS", default_value = "5000")]
    pub connect_timeout_ms: u64,

    /// Delay between the error frame and the policy-violation close, in ms
    #[arg(long, env = "VENTAS_RELAY_ERROR_GRACE_MS", default_value = "100")]
    pub error_grace_ms: u64,

    /// Allowed Origin patterns for the WebSocket upgrade ('*' is a wildcard).
    /// Empty allows any origin.
    #[arg(
        long = "allowed-origin",
        env = "VENTAS_RELAY_ALLOWED_ORIGINS",
        value_delimiter = ','
    )]
    pub allowed_origins: Vec<String>,

    /// Emit logs as JSON
    #[arg(long, env = "VENTAS_RELAY_LOG_JSON")]
    pub log_json: bool,
}

impl RelayConfig {
    pub fn upstream_target(&self) -> Result<UpstreamTarget> {
        UpstreamTarget::new(&self.upstream_host, self.upstream_port, self.upstream_tls)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn error_grace(&self) -> Duration {
        Duration::from_millis(self.error_grace_ms)
    }
}
