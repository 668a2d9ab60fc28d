//! JSON encoding/decoding for game messages.
//!
//! This module converts between:
//! - JSON bodies carried by bus `send` / `message` frames,
//! - the logical `tictactwo_core::OutboundCommand` / `InboundEvent`.
//!
//! Decoding is forward compatible: a body whose `type` tag this build
//! does not know decodes to `Ok(None)` rather than an error.

use serde_json::Value;
use thiserror::Error;
use tictactwo_core::{EventKind, GameStateSnapshot, InboundEvent, OutboundCommand};

use crate::wire_types::{
    CreateRoomRequest, JoinRoomRequest, UpdateGameStateRequest, WireEnvelope, WireGameState,
    DEST_CREATE_ROOM, DEST_JOIN_ROOM, DEST_UPDATE_GAME_STATE,
};

/// Errors that can arise when encoding/decoding a message or frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Malformed JSON, or a known tag with a payload of the wrong shape.
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    /// The body is not an object with a string `type` field.
    #[error("envelope has no type tag")]
    MissingTag,

    /// Frame length prefix exceeds the configured maximum.
    #[error("frame of {0} bytes exceeds the maximum frame size")]
    FrameTooLarge(usize),
}

/// A publish ready for the bus: destination plus JSON body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    pub destination: &'static str,
    pub body: String,
}

/// Encode an outbound command.
pub fn encode_command(cmd: &OutboundCommand) -> Result<Publish, ProtocolError> {
    let (destination, body) = match cmd {
        OutboundCommand::CreateRoom {
            identity,
            desired_room_id,
        } => (
            DEST_CREATE_ROOM,
            serde_json::to_string(&CreateRoomRequest {
                identity: identity.clone(),
                desired_room_id: desired_room_id.clone(),
            })?,
        ),
        OutboundCommand::JoinRoom { room_id } => (
            DEST_JOIN_ROOM,
            serde_json::to_string(&JoinRoomRequest {
                room_id: room_id.clone(),
            })?,
        ),
        OutboundCommand::UpdateGameState { room_id, state } => (
            DEST_UPDATE_GAME_STATE,
            serde_json::to_string(&UpdateGameStateRequest {
                room_id: room_id.clone(),
                game_state: WireGameState::from(&GameStateSnapshot::from(state)),
            })?,
        ),
    };
    Ok(Publish { destination, body })
}

/// Read the `type` tag of a body without decoding the payload.
pub fn envelope_tag(body: &str) -> Result<String, ProtocolError> {
    let value: Value = serde_json::from_str(body)?;
    tag_of(&value).map(str::to_string)
}

/// Decode an inbound body. Unknown tags yield `Ok(None)`.
pub fn decode_event(body: &str) -> Result<Option<InboundEvent>, ProtocolError> {
    let value: Value = serde_json::from_str(body)?;
    let known = EventKind::from_tag(tag_of(&value)?).is_some();
    if !known {
        return Ok(None);
    }
    let envelope: WireEnvelope = serde_json::from_value(value)?;
    Ok(Some(envelope.into()))
}

fn tag_of(value: &Value) -> Result<&str, ProtocolError> {
    value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingTag)
}
