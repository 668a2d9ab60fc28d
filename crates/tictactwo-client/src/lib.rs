//! tictactwo-client
//!
//! Async client for the tic-tac-two broker:
//! - [`connection`] : session lifecycle, heartbeats, reconnects, topic routing
//! - [`transport`]  : the `Transport` / `Connector` seam and its TCP implementation
//! - [`memory`]     : an in-process transport for tests and embedding
//! - [`router`]     : dispatch of inbound bodies by `type` tag
//! - [`game`]       : the player-facing game client
//! - [`status`]     : fleet status monitoring
//! - [`config`]     : file / environment configuration

pub mod config;
pub mod connection;
pub mod error;
pub mod game;
pub mod memory;
pub mod router;
pub mod status;
pub mod transport;

pub use config::{ClientConfig, ConnectionConfig};
pub use connection::{
    ConnectionManager, Delivery, DeliverySink, SessionEvent, SubscriptionId, TransportStatus,
};
pub use error::{ClientError, Result, TransportErrorKind};
pub use game::{GameClient, GameCommand, GameEvent, GameHandle, GameView};
pub use memory::{MemoryBroker, MemoryConnector, MemoryRemote};
pub use router::{MessageRouter, RouteOutcome};
pub use status::{StatusBoard, StatusMonitor};
pub use transport::{Connector, Handshake, TcpConnector, Transport};
