//! Server configuration from environment variables.
//!
//! # Environment Variables
//!
//! - `LINGOCAST_BIND`: listen address. Default: `0.0.0.0:8080`
//! - `LINGOCAST_SECRET`: shared secret signing broadcaster tokens
//! - `LINGOCAST_PASSWORD`: password the `/auth` endpoint exchanges for a token
//! - `LINGOCAST_LANGUAGES`: comma-separated language codes. Default: `es,en,ro`
//! - `LINGOCAST_BROADCASTER_TIMEOUT_SECS`: silence window before a
//!   broadcaster slot is freed. Default: `30`
//! - `LINGOCAST_OUTBOUND_QUEUE`: per-connection outbound queue depth.
//!   Default: `256`

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::warn;

/// Default silence window, three missed 10s heartbeats.
const DEFAULT_BROADCASTER_TIMEOUT_SECS: u64 = 30;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP server listens on.
    pub bind: SocketAddr,
    /// Shared secret for signing and verifying broadcaster tokens.
    pub secret: String,
    /// Password exchanged for a broadcaster token at `/auth`.
    pub password: String,
    /// Supported language codes, one relay slot each.
    pub languages: Vec<String>,
    /// Silence window before a broadcaster slot is freed.
    pub broadcaster_timeout: Duration,
    /// Per-connection outbound queue depth.
    pub outbound_queue: usize,
}

impl ServerConfig {
    /// Load configuration from the environment.
    ///
    /// Missing credentials fall back to development defaults with a
    /// loud warning; deployments must set both.
    pub fn from_env() -> Result<Self> {
        let bind = std::env::var("LINGOCAST_BIND")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .context("invalid LINGOCAST_BIND address")?;

        let secret = std::env::var("LINGOCAST_SECRET").unwrap_or_else(|_| {
            warn!("LINGOCAST_SECRET not set, using insecure development secret");
            "lingocast-dev-secret".to_string()
        });
        let password = std::env::var("LINGOCAST_PASSWORD").unwrap_or_else(|_| {
            warn!("LINGOCAST_PASSWORD not set, using insecure development password");
            "lingocast-dev-password".to_string()
        });

        let languages = std::env::var("LINGOCAST_LANGUAGES")
            .unwrap_or_else(|_| "es,en,ro".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();
        anyhow::ensure!(!languages.is_empty(), "LINGOCAST_LANGUAGES is empty");

        let broadcaster_timeout = std::env::var("LINGOCAST_BROADCASTER_TIMEOUT_SECS")
            .ok()
            .map(|s| s.parse::<u64>())
            .transpose()
            .context("invalid LINGOCAST_BROADCASTER_TIMEOUT_SECS")?
            .unwrap_or(DEFAULT_BROADCASTER_TIMEOUT_SECS);

        let outbound_queue = std::env::var("LINGOCAST_OUTBOUND_QUEUE")
            .ok()
            .map(|s| s.parse::<usize>())
            .transpose()
            .context("invalid LINGOCAST_OUTBOUND_QUEUE")?
            .unwrap_or(256);

        Ok(Self {
            bind,
            secret,
            password,
            languages,
            broadcaster_timeout: Duration::from_secs(broadcaster_timeout),
            outbound_queue,
        })
    }
}
