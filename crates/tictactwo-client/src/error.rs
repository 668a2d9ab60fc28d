// crates/tictactwo-client/src/error.rs

use std::fmt;

use thiserror::Error;
use tictactwo_protocol::ProtocolError;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Operation attempted while the session is not live.
    #[error("not connected")]
    NotConnected,

    #[error("transport error: {0}")]
    Transport(String),

    /// The broker sent an `error` frame.
    #[error("broker error: {0}")]
    Broker(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    /// The background task behind a handle has stopped.
    #[error("client task has stopped")]
    Closed,
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Opaque classification reported on `SessionEvent::Error`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Opening the transport or the handshake failed.
    ConnectFailed,
    /// The transport closed or errored mid-session.
    Dropped,
    /// No inbound frame within the heartbeat window.
    HeartbeatTimeout,
    /// The broker reported an error.
    Broker,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportErrorKind::ConnectFailed => "connect_failed",
            TransportErrorKind::Dropped => "dropped",
            TransportErrorKind::HeartbeatTimeout => "heartbeat_timeout",
            TransportErrorKind::Broker => "broker_error",
        };
        f.write_str(name)
    }
}
