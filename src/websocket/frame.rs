//! WebSocket frame parsing and encoding conforming to RFC 6455.

use super::error::{ProtocolError, WebSocketError};

/// GUID appended to the client key when deriving `Sec-WebSocket-Accept`.
pub const MAGIC_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Largest payload allowed in a control frame (ping, pong, close).
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// WebSocket opcodes as defined in RFC 6455 Section 5.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Opcode {
    /// Continuation frame (0x0)
    Continuation = 0x0,
    /// Text data frame (0x1)
    #[default]
    Text = 0x1,
    /// Binary data frame (0x2)
    Binary = 0x2,
    /// Connection close frame (0x8)
    Close = 0x8,
    /// Ping frame (0x9)
    Ping = 0x9,
    /// Pong frame (0xA)
    Pong = 0xA,
}

impl Opcode {
    /// Parse opcode from the low nibble of the first header byte.
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        match value {
            0x0 => Ok(Opcode::Continuation),
            0x1 => Ok(Opcode::Text),
            0x2 => Ok(Opcode::Binary),
            0x8 => Ok(Opcode::Close),
            0x9 => Ok(Opcode::Ping),
            0xA => Ok(Opcode::Pong),
            _ => Err(ProtocolError::InvalidOpcode(value)),
        }
    }

    /// Check if this is a control frame opcode.
    pub fn is_control(&self) -> bool {
        matches!(self, Opcode::Close | Opcode::Ping | Opcode::Pong)
    }

    /// Check if this opcode may open a fragmented message.
    pub fn is_message_start(&self) -> bool {
        matches!(self, Opcode::Text | Opcode::Binary)
    }
}

/// One decoded (and, for fragmented messages, reassembled) frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Semantic type of the payload
    pub opcode: Opcode,
    /// Unmasked payload bytes
    pub payload: Vec<u8>,
    /// Whether the frame carried a masking key on the wire
    pub masked: bool,
    /// FIN bit: this is the final frame of a message
    pub fin: bool,
    /// Set only when the frame was reassembled from two or more wire frames
    pub fragmented: bool,
}

impl Frame {
    /// Create a final, unfragmented frame with the given opcode and payload.
    pub fn new(opcode: Opcode, payload: impl Into<Vec<u8>>) -> Self {
        Frame {
            opcode,
            payload: payload.into(),
            masked: false,
            fin: true,
            fragmented: false,
        }
    }

    /// Create a text frame.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(Opcode::Text, text.into().into_bytes())
    }

    /// Create a binary frame.
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self::new(Opcode::Binary, data)
    }

    /// Create a close frame with optional status code and reason.
    ///
    /// A reason can only travel after a status code, so `reason` is ignored
    /// when `code` is `None`.
    pub fn close(code: Option<u16>, reason: Option<&str>) -> Self {
        let mut payload = Vec::new();
        if let Some(code) = code {
            payload.extend_from_slice(&code.to_be_bytes());
            if let Some(reason) = reason {
                payload.extend_from_slice(reason.as_bytes());
            }
        }
        Self::new(Opcode::Close, payload)
    }

    /// Parse a single wire frame from the start of `data`.
    ///
    /// Returns the frame and the number of bytes consumed, or
    /// `Err(WebSocketError::IncompleteFrame)` if `data` does not yet hold the
    /// whole frame. Reserved bits are ignored and masking is accepted in
    /// either direction.
    ///
    /// ```text
    ///  0                   1                   2                   3
    ///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
    /// +-+-+-+-+-------+-+-------------+-------------------------------+
    /// |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
    /// |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
    /// |N|V|V|V|       |S|             |   (if payload len==126/127)   |
    /// | |1|2|3|       |K|             |                               |
    /// +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
    /// |     Extended payload length continued, if payload len == 127  |
    /// + - - - - - - - - - - - - - - - +-------------------------------+
    /// |                               |Masking-key, if MASK set to 1  |
    /// +-------------------------------+-------------------------------+
    /// | Masking-key (continued)       |          Payload Data         |
    /// +-------------------------------- - - - - - - - - - - - - - - - +
    /// ```
    pub fn parse(data: &[u8]) -> Result<(Self, usize), WebSocketError> {
        if data.len() < 2 {
            return Err(WebSocketError::IncompleteFrame);
        }

        let byte1 = data[0];
        let fin = (byte1 & 0b1000_0000) != 0;
        let opcode = Opcode::from_u8(byte1 & 0b0000_1111)?;

        let byte2 = data[1];
        let masked = (byte2 & 0b1000_0000) != 0;
        let mut payload_len = (byte2 & 0b0111_1111) as u64;

        let mut offset = 2;
        if payload_len == 126 {
            if data.len() < offset + 2 {
                return Err(WebSocketError::IncompleteFrame);
            }
            payload_len = u16::from_be_bytes([data[offset], data[offset + 1]]) as u64;
            offset += 2;
        } else if payload_len == 127 {
            let Some(ext) = data.get(offset..offset + 8) else {
                return Err(WebSocketError::IncompleteFrame);
            };
            let mut be = [0u8; 8];
            be.copy_from_slice(ext);
            payload_len = u64::from_be_bytes(be);
            offset += 8;
        }

        let payload_len =
            usize::try_from(payload_len).map_err(|_| WebSocketError::FrameTooLarge(payload_len))?;

        let masking_key = if masked {
            let Some(key) = data.get(offset..offset + 4) else {
                return Err(WebSocketError::IncompleteFrame);
            };
            offset += 4;
            Some([key[0], key[1], key[2], key[3]])
        } else {
            None
        };

        let end = offset
            .checked_add(payload_len)
            .ok_or(WebSocketError::FrameTooLarge(payload_len as u64))?;
        if data.len() < end {
            return Err(WebSocketError::IncompleteFrame);
        }

        let mut payload = data[offset..end].to_vec();
        if let Some(mask) = masking_key {
            apply_mask(&mut payload, &mask);
        }

        Ok((
            Frame {
                opcode,
                payload,
                masked,
                fin,
                fragmented: false,
            },
            end,
        ))
    }

    /// Parse close frame payload into status code and reason.
    pub fn close_reason(&self) -> Option<(u16, String)> {
        if self.opcode != Opcode::Close || self.payload.len() < 2 {
            return None;
        }
        let code = u16::from_be_bytes([self.payload[0], self.payload[1]]);
        let reason = String::from_utf8_lossy(&self.payload[2..]).into_owned();
        Some((code, reason))
    }

    /// Check if this is a text frame.
    pub fn is_text(&self) -> bool {
        self.opcode == Opcode::Text
    }

    /// Check if this is a binary frame.
    pub fn is_binary(&self) -> bool {
        self.opcode == Opcode::Binary
    }

    /// Check if this is a close frame.
    pub fn is_close(&self) -> bool {
        self.opcode == Opcode::Close
    }

    /// Get the payload as UTF-8 text.
    /// Returns None if the frame is not a text frame or contains invalid UTF-8.
    pub fn payload_as_text(&self) -> Option<&str> {
        if !self.is_text() {
            return None;
        }
        std::str::from_utf8(&self.payload).ok()
    }
}

/// Serialize one wire frame.
///
/// When `masked` is set a fresh 4-byte key is drawn from a uniformly random
/// `u32`. Never fails: the length field widens to 16 or 64 bits as needed.
pub fn encode(payload: &[u8], opcode: Opcode, masked: bool, fin: bool) -> Vec<u8> {
    let mask = masked.then(|| rand::random::<u32>().to_be_bytes());
    encode_with_mask(payload, opcode, fin, mask)
}

/// Serialize one wire frame with an explicit masking key.
pub fn encode_with_mask(payload: &[u8], opcode: Opcode, fin: bool, mask: Option<[u8; 4]>) -> Vec<u8> {
    let payload_len = payload.len();
    let mut frame = Vec::with_capacity(payload_len + 14);

    let mut byte1 = opcode as u8;
    if fin {
        byte1 |= 0b1000_0000;
    }
    frame.push(byte1);

    let mut byte2 = if mask.is_some() {
        0b1000_0000
    } else {
        0b0000_0000
    };

    if payload_len <= 125 {
        byte2 |= payload_len as u8;
        frame.push(byte2);
    } else if payload_len <= 0xFFFF {
        byte2 |= 126;
        frame.push(byte2);
        frame.extend_from_slice(&(payload_len as u16).to_be_bytes());
    } else {
        byte2 |= 127;
        frame.push(byte2);
        frame.extend_from_slice(&(payload_len as u64).to_be_bytes());
    }

    match mask {
        Some(masking_key) => {
            frame.extend_from_slice(&masking_key);
            let start = frame.len();
            frame.extend_from_slice(payload);
            apply_mask(&mut frame[start..], &masking_key);
        }
        None => frame.extend_from_slice(payload),
    }

    frame
}

/// Apply XOR mask to payload data per RFC 6455 Section 5.3.
///
/// Applying the same mask twice yields the original data.
pub fn apply_mask(payload: &mut [u8], mask: &[u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}
