//! Incremental frame decoding with fragment reassembly, and client-side encoding.
//!
//! [`FrameDecoder`] owns every byte it has been handed but could not yet turn
//! into a frame, so callers only ever pass the newly arrived bytes. It also
//! implements `tokio_util::codec::Decoder`, and [`FrameEncoder`] implements
//! `Encoder<Frame>`, so both plug into `FramedRead` / `FramedWrite`.

use super::error::{ProtocolError, WebSocketError};
use super::frame::{self, Frame, Opcode};
use bytes::{Buf, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// Outcome of a single [`FrameDecoder::decode`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete frame, or a fully reassembled fragmented message.
    Frame(Frame),
    /// A non-final fragment was consumed. The message is not finished but
    /// further buffered frames may already be decodable without more I/O.
    Fragment,
    /// The buffered bytes do not hold a whole frame; read more from the socket.
    NeedMoreData,
}

#[derive(Debug, Default)]
enum Reassembly {
    #[default]
    Idle,
    Accumulating { opcode: Opcode, buffer: BytesMut },
}

/// Stateful decoder fed with raw bytes in arbitrary-sized chunks.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Unconsumed tail of everything passed to `decode` so far
    pending: BytesMut,
    /// Fragmented message in progress
    reassembly: Reassembly,
    /// Reject frames carrying a masking key
    strict_masking: bool,
}

impl FrameDecoder {
    /// Create a new, empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail with [`ProtocolError::MaskedFrame`] on masked input frames.
    pub fn strict_masking(mut self, enabled: bool) -> Self {
        self.strict_masking = enabled;
        self
    }

    /// Bytes retained from previous calls that do not form a full frame yet.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Retain `data` without attempting to decode it.
    pub fn feed(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
    }

    /// Whether a fragmented message is currently being accumulated.
    pub fn in_message(&self) -> bool {
        matches!(self.reassembly, Reassembly::Accumulating { .. })
    }

    /// Drop buffered bytes and any partially reassembled message.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.reassembly = Reassembly::Idle;
    }

    /// Append `data` to the retained bytes and try to decode one frame.
    ///
    /// At most one wire frame is consumed per call. When several frames
    /// arrived together, keep calling with an empty slice until
    /// [`Decoded::NeedMoreData`] is returned.
    pub fn decode(&mut self, data: &[u8]) -> Result<Decoded, WebSocketError> {
        self.pending.extend_from_slice(data);

        let (frame, consumed) = match Frame::parse(&self.pending) {
            Ok(parsed) => parsed,
            Err(WebSocketError::IncompleteFrame) => return Ok(Decoded::NeedMoreData),
            Err(err) => return Err(err),
        };
        self.pending.advance(consumed);

        log::trace!(
            "decoded {:?} frame: fin={} masked={} len={}",
            frame.opcode,
            frame.fin,
            frame.masked,
            frame.payload.len()
        );

        if self.strict_masking && frame.masked {
            return Err(ProtocolError::MaskedFrame.into());
        }

        self.reassemble(frame)
    }

    fn reassemble(&mut self, frame: Frame) -> Result<Decoded, WebSocketError> {
        match frame.opcode {
            Opcode::Continuation => {
                let Reassembly::Accumulating { opcode, buffer } = &mut self.reassembly else {
                    log::warn!("continuation frame received with no message in progress");
                    return Err(ProtocolError::ContinuationNotStarted.into());
                };

                buffer.extend_from_slice(&frame.payload);
                if !frame.fin {
                    return Ok(Decoded::Fragment);
                }

                let opcode = *opcode;
                let payload = std::mem::take(buffer).to_vec();
                self.reassembly = Reassembly::Idle;

                Ok(Decoded::Frame(Frame {
                    opcode,
                    payload,
                    masked: frame.masked,
                    fin: true,
                    fragmented: true,
                }))
            }
            Opcode::Text | Opcode::Binary => {
                // A new data frame always abandons whatever was being accumulated.
                self.reassembly = Reassembly::Idle;
                if frame.fin {
                    return Ok(Decoded::Frame(frame));
                }
                self.reassembly = Reassembly::Accumulating {
                    opcode: frame.opcode,
                    buffer: BytesMut::from(&frame.payload[..]),
                };
                Ok(Decoded::Fragment)
            }
            Opcode::Close | Opcode::Ping | Opcode::Pong => Ok(Decoded::Frame(frame)),
        }
    }

    fn next_frame(&mut self, mut data: &[u8]) -> Result<Option<Frame>, WebSocketError> {
        loop {
            match FrameDecoder::decode(self, data)? {
                Decoded::Frame(frame) => return Ok(Some(frame)),
                Decoded::Fragment => data = &[],
                Decoded::NeedMoreData => return Ok(None),
            }
        }
    }
}

impl Decoder for FrameDecoder {
    type Item = Frame;
    type Error = WebSocketError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Take ownership of everything; the decoder keeps the unconsumed tail.
        let incoming = src.split();
        self.next_frame(&incoming)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match Decoder::decode(self, src)? {
            Some(frame) => Ok(Some(frame)),
            None if self.pending.is_empty() => Ok(None),
            None => Err(WebSocketError::Connection(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream ended in the middle of a frame",
            ))),
        }
    }
}

/// Client-side frame encoder. Masks every frame unless told otherwise.
#[derive(Debug, Clone)]
pub struct FrameEncoder {
    masked: bool,
}

impl FrameEncoder {
    /// Create an encoder that masks outgoing frames, as clients must.
    pub fn new() -> Self {
        FrameEncoder { masked: true }
    }

    /// Create an encoder that never masks.
    pub fn unmasked() -> Self {
        FrameEncoder { masked: false }
    }
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder<Frame> for FrameEncoder {
    type Error = WebSocketError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let encoded = frame::encode(&frame.payload, frame.opcode, self.masked, frame.fin);
        dst.extend_from_slice(&encoded);
        Ok(())
    }
}
