//! Configuration for the tic-tac-two client.
//!
//! Sources, lowest precedence first:
//! - built-in defaults,
//! - an optional TOML file,
//! - environment variables:
//!   - `TICTACTWO_SERVER_ADDR`       (default: "127.0.0.1:8080")
//!   - `TICTACTWO_RECONNECT_DELAY_MS` (default: 3000)
//!   - `TICTACTWO_HEARTBEAT_MS`      (default: 2000, both directions)
//!   - `TICTACTWO_NOTICE_TTL_MS`     (default: 4000)
//!   - `TICTACTWO_CONNECT_TIMEOUT_MS` (default: 5000)
//!
//! CLI flags are applied on top by the binary.

use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Broker address (`host:port`).
    pub server_addr: String,

    /// Fixed delay between reconnection attempts.
    pub reconnect_delay_ms: u64,

    /// Outgoing heartbeat interval; 0 disables.
    pub heartbeat_outgoing_ms: u64,

    /// Expected incoming heartbeat interval; 0 disables the watchdog.
    pub heartbeat_incoming_ms: u64,

    /// Deadline for opening a transport and completing the handshake;
    /// 0 waits forever.
    pub connect_timeout_ms: u64,

    /// How long a transient user notice stays visible.
    pub notice_ttl_ms: u64,

    /// Buffer size of each broadcast event channel.
    pub event_channel_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:8080".to_string(),
            reconnect_delay_ms: 3000,
            heartbeat_outgoing_ms: 2000,
            heartbeat_incoming_ms: 2000,
            connect_timeout_ms: 5000,
            notice_ttl_ms: 4000,
            event_channel_capacity: 256,
        }
    }
}

/// Timing knobs for a [`ConnectionManager`](crate::connection::ConnectionManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub reconnect_delay: Duration,
    pub heartbeat_outgoing: Duration,
    pub heartbeat_incoming: Duration,
    pub connect_timeout: Duration,
    pub event_channel_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ClientConfig::default().connection()
    }
}

impl ClientConfig {
    /// Load defaults, then `path` (if given), then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Parse a TOML file. Missing keys fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ClientError::Config(e.to_string()))
    }

    /// Override fields from `TICTACTWO_*` environment variables.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|key| env::var(key).ok())
    }

    fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(addr) = lookup("TICTACTWO_SERVER_ADDR") {
            self.server_addr = addr;
        }
        self.reconnect_delay_ms = read_env_or_default(
            &lookup,
            "TICTACTWO_RECONNECT_DELAY_MS",
            self.reconnect_delay_ms,
        )?;
        if let Some(heartbeat) = read_env(&lookup, "TICTACTWO_HEARTBEAT_MS")? {
            self.heartbeat_outgoing_ms = heartbeat;
            self.heartbeat_incoming_ms = heartbeat;
        }
        self.notice_ttl_ms =
            read_env_or_default(&lookup, "TICTACTWO_NOTICE_TTL_MS", self.notice_ttl_ms)?;
        self.connect_timeout_ms =
            read_env_or_default(&lookup, "TICTACTWO_CONNECT_TIMEOUT_MS", self.connect_timeout_ms)?;
        Ok(())
    }

    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            heartbeat_outgoing: Duration::from_millis(self.heartbeat_outgoing_ms),
            heartbeat_incoming: Duration::from_millis(self.heartbeat_incoming_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            event_channel_capacity: self.event_channel_capacity.max(1),
        }
    }

    pub fn notice_ttl(&self) -> Duration {
        Duration::from_millis(self.notice_ttl_ms)
    }
}

fn read_env<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(val) => val
            .parse::<T>()
            .map(Some)
            .map_err(|e| ClientError::Config(format!("{}: {}", key, e))),
        None => Ok(None),
    }
}

fn read_env_or_default<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    Ok(read_env(lookup, key)?.unwrap_or(default))
}
