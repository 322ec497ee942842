//! Client configuration.

use std::time::Duration;

/// Tunables for [`WebSocketClient`](crate::WebSocketClient) connections.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use ws_client::ClientConfig;
///
/// let config = ClientConfig::new()
///     .connect_timeout(Duration::from_secs(3))
///     .poll_timeout(Duration::from_millis(10))
///     .origin("http://example.com");
/// assert_eq!(config.get_origin(), "http://example.com");
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    connect_timeout: Duration,
    poll_timeout: Duration,
    read_buffer_size: usize,
    origin: String,
    max_handshake_size: usize,
    strict_masking: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            connect_timeout: Duration::from_secs(10),
            poll_timeout: Duration::from_millis(50),
            read_buffer_size: 64 * 1024,
            origin: "http://localhost".to_string(),
            max_handshake_size: 16 * 1024,
            strict_masking: false,
        }
    }
}

impl ClientConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Time allowed for the TCP connect to complete.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// How long a non-blocking `receive` waits for data before giving up.
    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Maximum number of bytes requested from the socket per read.
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    /// Value of the `Origin` header sent with the upgrade request.
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Upper bound on the size of the handshake response header block.
    pub fn max_handshake_size(mut self, size: usize) -> Self {
        self.max_handshake_size = size;
        self
    }

    /// Reject masked frames from the server instead of accepting them.
    pub fn strict_masking(mut self, enabled: bool) -> Self {
        self.strict_masking = enabled;
        self
    }

    /// Get the connect timeout.
    pub fn get_connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Get the non-blocking receive wait window.
    pub fn get_poll_timeout(&self) -> Duration {
        self.poll_timeout
    }

    /// Get the per-read buffer size.
    pub fn get_read_buffer_size(&self) -> usize {
        self.read_buffer_size
    }

    /// Get the `Origin` header value.
    pub fn get_origin(&self) -> &str {
        &self.origin
    }

    /// Get the handshake response size limit.
    pub fn get_max_handshake_size(&self) -> usize {
        self.max_handshake_size
    }

    /// Whether masked server frames are rejected.
    pub fn is_strict_masking(&self) -> bool {
        self.strict_masking
    }
}
