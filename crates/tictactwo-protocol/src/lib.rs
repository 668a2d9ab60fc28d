//! tictactwo-protocol
//!
//! Wire-level encoding/decoding for the tic-tac-two client.
//!
//! This crate is responsible for turning logical game messages
//! (`tictactwo_core::OutboundCommand` / `InboundEvent`) into JSON and
//! back again, and for the bus frames that carry them.
//!
//! - [`wire_types`] : JSON shapes, topics and destinations
//! - [`json_codec`] : game payload encode/decode
//! - [`bus`]        : pub/sub frames and length-prefix framing

pub mod wire_types;
pub mod json_codec;
pub mod bus;

pub use json_codec::{
    ProtocolError,
    Publish,
    decode_event,
    encode_command,
    envelope_tag,
};

pub use bus::{ClientFrame, ConnectionPurpose, ServerFrame};
