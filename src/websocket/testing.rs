//! Test helpers acting as the server end of a mock socket.

use super::codec::{Decoded, FrameDecoder};
use super::frame::Frame;
use super::handshake::accept_key;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Read an HTTP request head, up to and including the blank line.
pub(crate) async fn read_request<S: AsyncRead + Unpin>(stream: &mut S) -> String {
    let mut request = Vec::new();
    let mut byte = [0u8; 1];
    while !request.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).await.unwrap();
        assert_ne!(n, 0, "client closed before finishing the request");
        request.push(byte[0]);
    }
    String::from_utf8(request).unwrap()
}

/// Extract the `Sec-WebSocket-Key` value from a request head.
pub(crate) fn request_key(request: &str) -> &str {
    request
        .lines()
        .find_map(|line| line.strip_prefix("Sec-WebSocket-Key: "))
        .unwrap()
}

/// A `101` response carrying the given accept value.
pub(crate) fn handshake_response(accept: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\
         \r\n"
    )
}

/// Answer a client handshake correctly, followed by `extra` bytes in the same write.
pub(crate) async fn serve_handshake<S>(stream: &mut S, extra: &[u8]) -> String
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = read_request(stream).await;
    let mut response = handshake_response(&accept_key(request_key(&request))).into_bytes();
    response.extend_from_slice(extra);
    stream.write_all(&response).await.unwrap();
    request
}

/// Read frames written by the client until `count` have been decoded.
pub(crate) async fn read_frames<S: AsyncRead + Unpin>(stream: &mut S, count: usize) -> Vec<Frame> {
    let mut decoder = FrameDecoder::new();
    let mut frames = Vec::new();
    let mut buf = vec![0u8; 4096];
    let mut input = 0;
    loop {
        loop {
            match decoder.decode(&buf[..input]).unwrap() {
                Decoded::Frame(frame) => frames.push(frame),
                Decoded::Fragment => {}
                Decoded::NeedMoreData => break,
            }
            input = 0;
            if frames.len() == count {
                return frames;
            }
        }
        input = stream.read(&mut buf).await.unwrap();
        assert_ne!(input, 0, "client closed after {} frames", frames.len());
    }
}
