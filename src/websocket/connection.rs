//! Connection controller tying the handshake, the codec and a socket together.
//!
//! A [`WebSocketClient`] is `OPEN` once its handshake succeeded and becomes
//! `CLOSED` after [`WebSocketClient::close`], a close frame from the peer, a
//! read failure, or end of stream. There is no way back from `CLOSED`.

use super::codec::{Decoded, FrameDecoder, FrameEncoder};
use super::error::WebSocketError;
use super::frame::{Frame, MAX_CONTROL_PAYLOAD, Opcode};
use super::handshake::{ClientHandshake, WsUrl, dial, perform_handshake};
use crate::config::ClientConfig;
use bytes::BytesMut;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::Encoder;

/// A client-side WebSocket connection over any byte stream.
///
/// # Examples
///
/// ```no_run
/// use ws_client::{Opcode, WebSocketClient};
///
/// # async fn run() -> Result<(), ws_client::WebSocketError> {
/// let mut client = WebSocketClient::connect("ws://localhost:1122/").await?;
/// client.send(b"hello", Opcode::Text).await?;
/// for frame in client.receive(true).await? {
///     println!("{:?}: {:?}", frame.opcode, frame.payload_as_text());
/// }
/// client.close();
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct WebSocketClient<S = TcpStream> {
    /// `None` once the connection is closed
    stream: Option<S>,
    decoder: FrameDecoder,
    encoder: FrameEncoder,
    config: ClientConfig,
    handshake: String,
    /// Decode error held back so frames decoded before it are delivered first
    failure: Option<WebSocketError>,
}

impl WebSocketClient<TcpStream> {
    /// Connect to a `ws://` URL with the default configuration.
    pub async fn connect(url: &str) -> Result<Self, WebSocketError> {
        Self::connect_with_config(url, ClientConfig::default()).await
    }

    /// Connect to a `ws://` URL.
    ///
    /// Opens the TCP connection, performs the upgrade handshake and returns an
    /// open connection. Nothing stays open if any step fails.
    pub async fn connect_with_config(
        url: &str,
        config: ClientConfig,
    ) -> Result<Self, WebSocketError> {
        let url = WsUrl::parse(url)?;
        let stream = dial(&url, &config).await?;
        Self::upgrade(stream, url, config).await
    }
}

impl<S> WebSocketClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Perform the handshake for `url` over an already connected stream.
    pub async fn from_stream(
        stream: S,
        url: &str,
        config: ClientConfig,
    ) -> Result<Self, WebSocketError> {
        let url = WsUrl::parse(url)?;
        Self::upgrade(stream, url, config).await
    }

    async fn upgrade(stream: S, url: WsUrl, config: ClientConfig) -> Result<Self, WebSocketError> {
        let handshake = ClientHandshake::new(url, config.get_origin());
        let negotiated = perform_handshake(stream, &handshake, &config).await?;
        log::debug!(
            "WebSocket connection to {} is open",
            handshake.url().host_header()
        );

        let mut decoder = FrameDecoder::new().strict_masking(config.is_strict_masking());
        // Frame bytes that arrived together with the response headers.
        decoder.feed(&negotiated.leftover);

        Ok(WebSocketClient {
            stream: Some(negotiated.stream),
            decoder,
            encoder: FrameEncoder::new(),
            config,
            handshake: negotiated.response,
            failure: None,
        })
    }

    /// Raw response header text received during the handshake.
    pub fn handshake(&self) -> &str {
        &self.handshake
    }

    /// Whether the connection has been closed.
    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// Active configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Change how long a non-blocking [`receive`](Self::receive) waits for data.
    pub fn set_poll_timeout(&mut self, timeout: Duration) {
        self.config = self.config.clone().poll_timeout(timeout);
    }

    /// Send a complete message as a single masked frame.
    pub async fn send(&mut self, payload: &[u8], opcode: Opcode) -> Result<(), WebSocketError> {
        self.send_frame(payload, opcode, true).await
    }

    /// Send a UTF-8 text message.
    pub async fn send_text(&mut self, text: &str) -> Result<(), WebSocketError> {
        self.send(text.as_bytes(), Opcode::Text).await
    }

    /// Send one masked frame with an explicit FIN bit.
    ///
    /// Streams a message as a text or binary frame with `fin = false`
    /// followed by continuation frames, the last one with `fin = true`.
    pub async fn send_frame(
        &mut self,
        payload: &[u8],
        opcode: Opcode,
        fin: bool,
    ) -> Result<(), WebSocketError> {
        let stream = self.stream.as_mut().ok_or(WebSocketError::Closed)?;

        let frame = Frame {
            opcode,
            payload: payload.to_vec(),
            masked: true,
            fin,
            fragmented: false,
        };
        let mut buffer = BytesMut::new();
        self.encoder.encode(frame, &mut buffer)?;
        log::trace!("sending {opcode:?} frame: fin={fin} len={}", payload.len());

        let written = match stream.write_all(&buffer).await {
            Ok(()) => stream.flush().await,
            Err(err) => Err(err),
        };
        if let Err(err) = written {
            log::debug!("WebSocket write failed: {err}");
            self.close();
            return Err(WebSocketError::Write(err));
        }
        Ok(())
    }

    /// Send a close frame with an optional status code and reason, then close.
    pub async fn send_close(
        &mut self,
        code: Option<u16>,
        reason: Option<&str>,
    ) -> Result<(), WebSocketError> {
        let frame = Frame::close(code, reason);
        let result = self.send(&frame.payload, Opcode::Close).await;
        self.close();
        result
    }

    /// Receive every frame that can be fully decoded.
    ///
    /// Pings are answered with a pong and a close frame is acknowledged and
    /// closes the connection; both frames are still returned. With
    /// `blocking` set this waits until at least one frame is available.
    /// Otherwise it waits at most the configured poll timeout and may return
    /// an empty list. End of stream closes the connection and yields an
    /// empty list.
    ///
    /// A decode error closes the connection. Frames decoded before it in
    /// the same call are returned first and the error is reported by the
    /// next call.
    pub async fn receive(&mut self, blocking: bool) -> Result<Vec<Frame>, WebSocketError> {
        if let Some(err) = self.failure.take() {
            return Err(err);
        }
        if self.is_closed() {
            return Err(WebSocketError::Closed);
        }

        let mut frames = Vec::new();
        self.drain(&[], &mut frames).await?;
        if !frames.is_empty() {
            return Ok(frames);
        }

        let mut buf = vec![0u8; self.config.get_read_buffer_size()];
        loop {
            let read = match self.read_chunk(&mut buf, blocking).await? {
                Some(0) => {
                    log::debug!("WebSocket peer closed the stream");
                    self.close();
                    return Ok(frames);
                }
                Some(n) => n,
                None => 0,
            };

            self.drain(&buf[..read], &mut frames).await?;
            if !frames.is_empty() || !blocking {
                return Ok(frames);
            }
        }
    }

    /// Mark the connection closed, drop buffered bytes and release the socket.
    ///
    /// Calling it again has no effect.
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            log::debug!("WebSocket connection closed");
        }
        self.decoder.reset();
    }

    /// Read one chunk. `None` means the poll window elapsed without data.
    async fn read_chunk(
        &mut self,
        buf: &mut [u8],
        blocking: bool,
    ) -> Result<Option<usize>, WebSocketError> {
        let stream = self.stream.as_mut().ok_or(WebSocketError::Closed)?;

        let result = if blocking {
            stream.read(buf).await
        } else {
            match tokio::time::timeout(self.config.get_poll_timeout(), stream.read(buf)).await {
                Ok(result) => result,
                Err(_) => return Ok(None),
            }
        };

        match result {
            Ok(n) => Ok(Some(n)),
            Err(err) => {
                log::debug!("WebSocket read failed: {err}");
                self.close();
                Err(WebSocketError::Connection(err))
            }
        }
    }

    /// Feed `data` to the decoder and collect every frame it yields.
    async fn drain(&mut self, data: &[u8], frames: &mut Vec<Frame>) -> Result<(), WebSocketError> {
        let mut data = data;
        while !self.is_closed() {
            let decoded = match self.decoder.decode(data) {
                Ok(decoded) => decoded,
                Err(err) => {
                    log::warn!("Closing WebSocket connection after decode error: {err}");
                    self.close();
                    if frames.is_empty() {
                        return Err(err);
                    }
                    self.failure = Some(err);
                    return Ok(());
                }
            };
            match decoded {
                Decoded::Frame(frame) => {
                    self.auto_reply(&frame).await;
                    frames.push(frame);
                }
                Decoded::Fragment => {}
                Decoded::NeedMoreData => break,
            }
            data = &[];
        }
        Ok(())
    }

    /// Answer pings and acknowledge close frames. Send failures are logged only.
    async fn auto_reply(&mut self, frame: &Frame) {
        match frame.opcode {
            Opcode::Ping => {
                let len = frame.payload.len().min(MAX_CONTROL_PAYLOAD);
                if let Err(err) = self.send(&frame.payload[..len], Opcode::Pong).await {
                    log::warn!("Failed to answer ping: {err}");
                }
            }
            Opcode::Close if !self.is_closed() => {
                if let Some((code, reason)) = frame.close_reason() {
                    log::debug!("Peer sent close: {code} {reason:?}");
                }
                if let Err(err) = self.send(&[], Opcode::Close).await {
                    log::warn!("Failed to acknowledge close: {err}");
                }
                self.close();
            }
            _ => {}
        }
    }
}
