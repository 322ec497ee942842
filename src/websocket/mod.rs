//! WebSocket client implementation conforming to RFC 6455.
//!
//! This module provides the upgrade handshake, frame encoding, incremental
//! frame decoding with message reassembly, and a connection type that drives
//! them over a byte stream.

mod codec;
mod connection;
mod error;
mod frame;
mod handshake;

#[cfg(test)]
mod testing;

pub use codec::{Decoded, FrameDecoder, FrameEncoder};
pub use connection::WebSocketClient;
pub use error::{HandshakeError, ProtocolError, WebSocketError};
pub use frame::{Frame, MAGIC_GUID, MAX_CONTROL_PAYLOAD, Opcode, apply_mask, encode, encode_with_mask};
pub use handshake::{
    ClientHandshake, Negotiated, WsUrl, accept_key, dial, generate_key, perform_handshake,
    read_response,
};
