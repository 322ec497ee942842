//! Client side of the HTTP upgrade handshake (RFC 6455 Section 4).
//!
//! ```http
//! GET /chat HTTP/1.1
//! Host: server.example.com
//! Upgrade: websocket
//! Connection: Upgrade
//! Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==
//! Origin: http://localhost
//! Sec-WebSocket-Version: 13
//! ```
//!
//! The response is kept as raw header text. Validation requires a `101`
//! status and a `Sec-WebSocket-Accept` value equal to
//! `base64(SHA1(key + GUID))`.

use super::error::{HandshakeError, WebSocketError};
use super::frame::MAGIC_GUID;
use crate::config::ClientConfig;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use bytes::BytesMut;
use http::{StatusCode, Uri, header};
use sha1::{Digest, Sha1};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Compute the `Sec-WebSocket-Accept` value for a client key.
///
/// ```
/// use ws_client::websocket::accept_key;
///
/// assert_eq!(accept_key("dGhlIHNhbXBsZSBub25jZQ=="), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(MAGIC_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Generate a `Sec-WebSocket-Key`: 16 random bytes, base64 encoded.
pub fn generate_key() -> String {
    BASE64.encode(rand::random::<[u8; 16]>())
}

/// Target of a `ws://` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsUrl {
    /// Host name or IP address, IPv6 literals keep their brackets
    pub host: String,
    /// TCP port, 80 when absent
    pub port: u16,
    /// Request target including any query, `/` when absent
    pub path: String,
}

impl WsUrl {
    /// Parse a `ws://host[:port][/path]` URL.
    pub fn parse(url: &str) -> Result<Self, HandshakeError> {
        let uri: Uri = url
            .parse()
            .map_err(|err: http::uri::InvalidUri| HandshakeError::InvalidUrl(err.to_string()))?;

        match uri.scheme_str() {
            Some(scheme) if scheme.eq_ignore_ascii_case("ws") => {}
            Some(scheme) => return Err(HandshakeError::UnsupportedScheme(scheme.to_string())),
            None => return Err(HandshakeError::InvalidUrl("missing scheme".into())),
        }

        let host = match uri.host() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => return Err(HandshakeError::InvalidUrl("missing host".into())),
        };

        let target = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("");
        let path = if target.is_empty() {
            "/".to_string()
        } else if target.starts_with('/') {
            target.to_string()
        } else {
            format!("/{target}")
        };

        Ok(WsUrl {
            host,
            port: uri.port_u16().unwrap_or(80),
            path,
        })
    }

    /// Value for the `Host` header.
    pub fn host_header(&self) -> String {
        if self.port == 80 {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Host suitable for dialing, without IPv6 brackets.
    pub fn dial_host(&self) -> &str {
        self.host.trim_start_matches('[').trim_end_matches(']')
    }
}

/// One client handshake attempt: the target, the key and the request it sends.
#[derive(Debug, Clone)]
pub struct ClientHandshake {
    url: WsUrl,
    key: String,
    origin: String,
}

impl ClientHandshake {
    /// Prepare a handshake with a freshly generated key.
    pub fn new(url: WsUrl, origin: impl Into<String>) -> Self {
        Self::with_key(url, origin, generate_key())
    }

    /// Prepare a handshake with a caller-supplied key.
    pub fn with_key(url: WsUrl, origin: impl Into<String>, key: impl Into<String>) -> Self {
        ClientHandshake {
            url,
            key: key.into(),
            origin: origin.into(),
        }
    }

    /// The `Sec-WebSocket-Key` sent with the request.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The target URL.
    pub fn url(&self) -> &WsUrl {
        &self.url
    }

    /// The HTTP upgrade request.
    pub fn request_bytes(&self) -> Vec<u8> {
        format!(
            "GET {} HTTP/1.1\r\n\
             Host: {}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {}\r\n\
             Origin: {}\r\n\
             Sec-WebSocket-Version: 13\r\n\
             \r\n",
            self.url.path,
            self.url.host_header(),
            self.key,
            self.origin
        )
        .into_bytes()
    }

    /// Check the raw response header text against this handshake's key.
    pub fn validate(&self, response: &str) -> Result<(), HandshakeError> {
        let mut lines = response.lines();

        let status_line = lines.next().unwrap_or_default();
        let status = status_line
            .split_whitespace()
            .nth(1)
            .and_then(|code| code.parse::<u16>().ok())
            .filter(|_| status_line.starts_with("HTTP/"))
            .ok_or_else(|| HandshakeError::MalformedStatusLine(status_line.to_string()))?;
        if status != StatusCode::SWITCHING_PROTOCOLS.as_u16() {
            return Err(HandshakeError::NotSwitchingProtocols(status));
        }

        let accept = lines
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| {
                name.trim()
                    .eq_ignore_ascii_case(header::SEC_WEBSOCKET_ACCEPT.as_str())
            })
            .map(|(_, value)| value.trim())
            .ok_or(HandshakeError::MissingAcceptHeader)?;

        let expected = accept_key(&self.key);
        if accept != expected {
            return Err(HandshakeError::InvalidAccept {
                expected,
                actual: accept.to_string(),
            });
        }
        Ok(())
    }
}

/// Result of a successful upgrade.
#[derive(Debug)]
pub struct Negotiated<S> {
    /// The upgraded stream
    pub stream: S,
    /// Raw response header block, terminating empty line included
    pub response: String,
    /// Bytes read past the header block; already frame data
    pub leftover: BytesMut,
}

/// Open the TCP connection for `url`, bounded by the configured connect timeout.
pub async fn dial(url: &WsUrl, config: &ClientConfig) -> Result<TcpStream, WebSocketError> {
    let addr = format!("{}:{}", url.host, url.port);
    let timeout: Duration = config.get_connect_timeout();
    log::trace!("Opening TCP connection to {addr}");

    match tokio::time::timeout(timeout, TcpStream::connect((url.dial_host(), url.port))).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(err)) => {
            log::debug!("Connecting to {addr} failed: {err}");
            Err(WebSocketError::Connection(err))
        }
        Err(_) => Err(WebSocketError::ConnectTimeout { addr, timeout }),
    }
}

/// Send the upgrade request over `stream` and validate the server's answer.
pub async fn perform_handshake<S>(
    stream: S,
    handshake: &ClientHandshake,
    config: &ClientConfig,
) -> Result<Negotiated<S>, WebSocketError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut stream = stream;
    log::trace!("Sending ws handshake for {}", handshake.url().path);
    stream
        .write_all(&handshake.request_bytes())
        .await
        .map_err(WebSocketError::Connection)?;
    stream.flush().await.map_err(WebSocketError::Connection)?;

    log::trace!("Waiting for ws handshake response");
    let mut reader = BufReader::new(stream);
    let response = read_response(&mut reader, config.get_max_handshake_size()).await?;
    log::trace!("Ws handshake response is received: {response:?}");

    handshake.validate(&response)?;

    let leftover = BytesMut::from(reader.buffer());
    Ok(Negotiated {
        stream: reader.into_inner(),
        response,
        leftover,
    })
}

/// Read response lines until an empty line (`\r\n` or `\n`) ends the header block.
pub async fn read_response<R>(reader: &mut R, max_size: usize) -> Result<String, WebSocketError>
where
    R: AsyncBufRead + Unpin,
{
    let mut response = String::new();
    loop {
        let read = reader
            .read_line(&mut response)
            .await
            .map_err(WebSocketError::Connection)?;
        if read == 0 {
            return Err(HandshakeError::UnexpectedEof.into());
        }
        if response.len() > max_size {
            return Err(HandshakeError::ResponseTooLarge(max_size).into());
        }
        let line = &response[response.len() - read..];
        if line == "\r\n" || line == "\n" {
            return Ok(response);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::testing::{handshake_response, read_request, serve_handshake};
    use tokio::io::{AsyncReadExt, duplex};

    fn url(s: &str) -> WsUrl {
        WsUrl::parse(s).unwrap()
    }

    #[test]
    fn test_accept_key_rfc_example() {
        assert_eq!(
            accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn test_generated_key_is_16_bytes() {
        let key = generate_key();
        assert_eq!(BASE64.decode(&key).unwrap().len(), 16);
        assert_ne!(key, generate_key());
    }

    #[test]
    fn test_parse_url_defaults() {
        let parsed = url("ws://localhost");
        assert_eq!(parsed.host, "localhost");
        assert_eq!(parsed.port, 80);
        assert_eq!(parsed.path, "/");
        assert_eq!(parsed.host_header(), "localhost");
    }

    #[test]
    fn test_parse_url_with_port_path_and_query() {
        let parsed = url("ws://example.com:1122/chat/room?id=7");
        assert_eq!(parsed.host, "example.com");
        assert_eq!(parsed.port, 1122);
        assert_eq!(parsed.path, "/chat/room?id=7");
        assert_eq!(parsed.host_header(), "example.com:1122");
    }

    #[test]
    fn test_parse_url_ipv6() {
        let parsed = url("ws://[::1]:9001/");
        assert_eq!(parsed.dial_host(), "::1");
        assert_eq!(parsed.port, 9001);
    }

    #[test]
    fn test_parse_url_rejections() {
        assert!(matches!(
            WsUrl::parse("wss://example.com/"),
            Err(HandshakeError::UnsupportedScheme(s)) if s == "wss"
        ));
        assert!(matches!(
            WsUrl::parse("/just/a/path"),
            Err(HandshakeError::InvalidUrl(_))
        ));
        assert!(matches!(
            WsUrl::parse("not a url"),
            Err(HandshakeError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_request_shape() {
        let handshake =
            ClientHandshake::with_key(url("ws://host:8080/echo"), "http://localhost", "abc");
        let request = String::from_utf8(handshake.request_bytes()).unwrap();
        assert_eq!(
            request,
            "GET /echo HTTP/1.1\r\n\
             Host: host:8080\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: abc\r\n\
             Origin: http://localhost\r\n\
             Sec-WebSocket-Version: 13\r\n\
             \r\n"
        );
    }

    #[test]
    fn test_validate_accepts_matching_key() {
        let handshake = ClientHandshake::with_key(url("ws://h/"), "o", "dGhlIHNhbXBsZSBub25jZQ==");
        let response = "HTTP/1.1 101 Switching Protocols\r\n\
                        Upgrade: websocket\r\n\
                        Connection: Upgrade\r\n\
                        sec-websocket-accept:  s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\
                        \r\n";
        handshake.validate(response).unwrap();
    }

    #[test]
    fn test_validate_rejections() {
        let handshake = ClientHandshake::with_key(url("ws://h/"), "o", "dGhlIHNhbXBsZSBub25jZQ==");

        let wrong = "HTTP/1.1 101 Switching Protocols\r\nSec-WebSocket-Accept: bogus\r\n\r\n";
        assert!(matches!(
            handshake.validate(wrong),
            Err(HandshakeError::InvalidAccept { actual, .. }) if actual == "bogus"
        ));

        let missing = "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\n\r\n";
        assert!(matches!(
            handshake.validate(missing),
            Err(HandshakeError::MissingAcceptHeader)
        ));

        let not_found =
            "HTTP/1.1 404 Not Found\r\nSec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n";
        assert!(matches!(
            handshake.validate(not_found),
            Err(HandshakeError::NotSwitchingProtocols(404))
        ));

        assert!(matches!(
            handshake.validate("garbage\r\n\r\n"),
            Err(HandshakeError::MalformedStatusLine(_))
        ));
    }

    #[tokio::test]
    async fn test_perform_handshake_keeps_leftover_bytes() {
        let (client, mut server) = duplex(4096);
        let server_task = tokio::spawn(async move {
            serve_handshake(&mut server, &[0x81, 0x02, b'h', b'i']).await;
            server
        });

        let handshake = ClientHandshake::new(url("ws://localhost:1122/"), "http://localhost");
        let negotiated = perform_handshake(client, &handshake, &ClientConfig::default())
            .await
            .unwrap();

        assert!(negotiated.response.starts_with("HTTP/1.1 101"));
        assert!(negotiated.response.ends_with("\r\n\r\n"));
        assert!(negotiated.response.contains(&accept_key(handshake.key())));
        assert_eq!(&negotiated.leftover[..], &[0x81, 0x02, b'h', b'i']);
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_perform_handshake_rejects_bad_accept() {
        let (client, mut server) = duplex(4096);
        let server_task = tokio::spawn(async move {
            read_request(&mut server).await;
            server
                .write_all(handshake_response("not-the-right-key").as_bytes())
                .await
                .unwrap();
            server
        });

        let handshake = ClientHandshake::new(url("ws://localhost/"), "http://localhost");
        let err = perform_handshake(client, &handshake, &ClientConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WebSocketError::Handshake(HandshakeError::InvalidAccept { .. })
        ));

        // The client half was dropped with the error.
        let mut server = server_task.await.unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(server.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_read_response_eof() {
        let (client, mut server) = duplex(1024);
        server.write_all(b"HTTP/1.1 101 Switching").await.unwrap();
        drop(server);

        let mut reader = BufReader::new(client);
        let err = read_response(&mut reader, 1024).await.unwrap_err();
        assert!(matches!(
            err,
            WebSocketError::Handshake(HandshakeError::UnexpectedEof)
        ));
    }

    #[tokio::test]
    async fn test_read_response_accepts_bare_newlines() {
        let (client, mut server) = duplex(1024);
        server
            .write_all(b"HTTP/1.1 101 Switching Protocols\nUpgrade: websocket\n\nrest")
            .await
            .unwrap();

        let mut reader = BufReader::new(client);
        let response = read_response(&mut reader, 1024).await.unwrap();
        assert_eq!(response, "HTTP/1.1 101 Switching Protocols\nUpgrade: websocket\n\n");
        assert_eq!(reader.buffer(), b"rest");
    }

    #[tokio::test]
    async fn test_read_response_too_large() {
        let (client, mut server) = duplex(4096);
        server.write_all(b"HTTP/1.1 101 Switching Protocols\r\n").await.unwrap();
        server.write_all(&[b'x'; 200]).await.unwrap();
        server.write_all(b"\r\n\r\n").await.unwrap();

        let mut reader = BufReader::new(client);
        let err = read_response(&mut reader, 64).await.unwrap_err();
        assert!(matches!(
            err,
            WebSocketError::Handshake(HandshakeError::ResponseTooLarge(64))
        ));
    }
}
