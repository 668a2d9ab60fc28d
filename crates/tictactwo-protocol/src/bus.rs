//! Publish/subscribe bus frames and stream framing.
//!
//! Framing model (stream transport):
//!
//! ```text
//! [0..4] : payload length (u32 BE, at most MAX_FRAME_LEN)
//! [4..]  : payload, one JSON-encoded frame
//! ```
//!
//! Client frames: `connect`, `subscribe`, `unsubscribe`, `send`,
//! `heartbeat`, `disconnect`.
//! Server frames: `connected`, `message`, `error`, `heartbeat`.
//!
//! Game payloads travel as opaque strings inside `send` / `message`;
//! see [`crate::json_codec`] for those.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::json_codec::ProtocolError;

/// Size of the length prefix.
pub const FRAME_HEADER_LEN: usize = 4;

/// Largest accepted payload.
pub const MAX_FRAME_LEN: usize = 1 << 20;

/// Connection-purpose discriminant sent in the handshake.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPurpose {
    /// A player taking part in rooms.
    Player,
    /// Read-only status monitoring; never joins rooms.
    Monitoring,
}

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum ClientFrame {
    Connect {
        identity: String,
        purpose: ConnectionPurpose,
    },
    Subscribe {
        id: u64,
        topic: String,
    },
    Unsubscribe {
        id: u64,
    },
    Send {
        destination: String,
        body: String,
    },
    Heartbeat,
    Disconnect,
}

/// Frames sent by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum ServerFrame {
    Connected {
        session: String,
    },
    Message {
        subscription: u64,
        topic: String,
        body: String,
    },
    Error {
        message: String,
    },
    Heartbeat,
}

/// Append a length-prefixed frame to `out`.
pub fn encode_frame<T: Serialize>(frame: &T, out: &mut Vec<u8>) -> Result<(), ProtocolError> {
    let payload = serde_json::to_vec(frame)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(payload.len()));
    }
    out.reserve(FRAME_HEADER_LEN + payload.len());
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(&payload);
    Ok(())
}

/// Interpret a length prefix.
pub fn frame_len(header: [u8; FRAME_HEADER_LEN]) -> Result<usize, ProtocolError> {
    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }
    Ok(len)
}

/// Decode one frame payload (without its length prefix).
pub fn decode_frame<T: DeserializeOwned>(payload: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(payload)?)
}
