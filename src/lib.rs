//! A WebSocket client speaking RFC 6455 over a single byte-stream connection.
//!
//! The crate performs the HTTP upgrade handshake, then encodes and decodes
//! frames with masking, every length encoding, fragmented messages and the
//! ping, pong and close control frames.

#![warn(clippy::dbg_macro, clippy::print_stdout)]
#![warn(missing_docs)]

/// Connection configuration
pub mod config;

/// WebSocket handshake, frame codec and connection
pub mod websocket;

pub use config::ClientConfig;
pub use websocket::{
    Decoded, Frame, FrameDecoder, FrameEncoder, HandshakeError, Opcode, ProtocolError,
    WebSocketClient, WebSocketError,
};
