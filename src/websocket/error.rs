//! Errors produced by the WebSocket client, its handshake and its frame codec.

use std::{io, time::Duration};

use thiserror::Error;

/// Top level error returned by every fallible client operation.
#[derive(Debug, Error)]
pub enum WebSocketError {
    /// Socket-level connect or read failure. Fatal to the connection.
    #[error("connection error: {0}")]
    Connection(#[source] io::Error),
    /// TCP connect did not complete within the configured timeout.
    #[error("connecting to {addr} timed out after {timeout:?}")]
    ConnectTimeout {
        /// Address that was being dialed
        addr: String,
        /// Timeout that elapsed
        timeout: Duration,
    },
    /// The HTTP upgrade was rejected or malformed.
    #[error(transparent)]
    Handshake(#[from] HandshakeError),
    /// A frame could not be fully written to the socket.
    #[error("failed to write frame: {0}")]
    Write(#[source] io::Error),
    /// The peer violated the framing protocol.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// Declared payload length does not fit in memory on this platform.
    #[error("frame payload of {0} bytes is too large")]
    FrameTooLarge(u64),
    /// The connection has already been closed.
    #[error("connection is closed")]
    Closed,
    /// Not enough bytes buffered to parse a full frame.
    #[error("incomplete WebSocket frame")]
    IncompleteFrame,
}

impl From<io::Error> for WebSocketError {
    fn from(err: io::Error) -> Self {
        WebSocketError::Connection(err)
    }
}

/// Failures of the HTTP upgrade exchange.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The URL could not be parsed or lacks a host.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    /// Only plain `ws://` is supported.
    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
    /// The server closed the stream before the header block ended.
    #[error("connection closed during handshake")]
    UnexpectedEof,
    /// The response header block exceeded the configured limit.
    #[error("handshake response exceeds {0} bytes")]
    ResponseTooLarge(usize),
    /// The first response line is not an HTTP status line.
    #[error("malformed status line: {0:?}")]
    MalformedStatusLine(String),
    /// The server answered with something other than `101`.
    #[error("expected 101 Switching Protocols, got {0}")]
    NotSwitchingProtocols(u16),
    /// No `Sec-WebSocket-Accept` header in the response.
    #[error("missing Sec-WebSocket-Accept header")]
    MissingAcceptHeader,
    /// The accept key does not match the one derived from our key.
    #[error("invalid Sec-WebSocket-Accept: expected {expected}, got {actual}")]
    InvalidAccept {
        /// Value derived from the request key
        expected: String,
        /// Value sent by the server
        actual: String,
    },
}

/// Framing protocol violations detected while decoding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// Opcode outside the RFC 6455 table.
    #[error("invalid opcode: {0:#x}")]
    InvalidOpcode(u8),
    /// A continuation frame arrived with no fragmented message open.
    #[error("continuation frame without a started message")]
    ContinuationNotStarted,
    /// The server masked a frame while strict masking is enabled.
    #[error("received a masked frame from server")]
    MaskedFrame,
}
