//! TCP client for the gallery server.
//!
//! This module provides `Client`, an async client that connects to the server,
//! sends function-call envelopes and waits for the reply envelope with
//! automatic timeout handling.

use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::time::timeout;

use crate::config::{ConfigError, ServerConfig};
use crate::envelope::{self, Envelope, EnvelopeError};
use crate::ipc::framing::{write_frame, FrameError, FrameReader};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Client-side error types.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The configuration cannot frame messages safely.
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Failed to connect to the server.
    #[error("Connection failed: {0}")]
    ConnectionFailed(#[source] std::io::Error),

    /// Request timed out waiting for a reply.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Framing error while sending or receiving.
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// The reply was not a valid envelope.
    #[error("Invalid reply: {0}")]
    Envelope(#[from] EnvelopeError),

    /// The server closed the connection, or an earlier request on it failed.
    #[error("Connection closed by server")]
    ConnectionClosed,

    /// I/O error during communication.
    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused => {
                ClientError::ConnectionFailed(err)
            }
            _ => ClientError::Io(err),
        }
    }
}

/// Connection to a gallery server.
///
/// Requests are sent one at a time; each call writes one frame and waits for
/// exactly one reply frame. Replies carry no request id, so once a request
/// fails or times out the stream can no longer be matched up and every later
/// call returns `ClientError::ConnectionClosed`.
///
/// # Example
///
/// ```ignore
/// use panda_core::ipc::Client;
/// use serde_json::json;
///
/// let mut client = Client::connect("localhost:5577", &config).await?;
/// let reply = client.call("fetch_gallery", json!({"offset": 10})).await?;
/// println!("{}", reply.data);
/// ```
pub struct Client {
    /// Frame reader for incoming replies.
    reader: FrameReader<OwnedReadHalf>,
    /// Writer for outgoing requests.
    writer: OwnedWriteHalf,
    /// Identity, versions and framing constants.
    config: ServerConfig,
    /// Request timeout duration.
    timeout: Duration,
    /// Set once a request fails mid-exchange.
    broken: bool,
}

impl Client {
    /// Connect to the server at `addr`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if `config` fails validation, and
    /// `ClientError::ConnectionFailed` if the address cannot be resolved or
    /// the connection is refused.
    pub async fn connect<A: ToSocketAddrs>(
        addr: A,
        config: &ServerConfig,
    ) -> Result<Self, ClientError> {
        config.validate()?;
        let stream = TcpStream::connect(addr)
            .await
            .map_err(ClientError::ConnectionFailed)?;
        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            reader: FrameReader::new(read_half, config),
            writer: write_half,
            config: config.clone(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            broken: false,
        })
    }

    /// Connect with automatic retry and exponential backoff.
    ///
    /// Retries with delays of 100ms, 200ms, 400ms, etc. At least one attempt
    /// is always made.
    ///
    /// # Errors
    ///
    /// Returns the last connection error if all attempts fail.
    pub async fn connect_with_retry<A>(
        addr: A,
        config: &ServerConfig,
        max_attempts: u32,
    ) -> Result<Self, ClientError>
    where
        A: ToSocketAddrs + Clone,
    {
        let mut attempt = 1;
        loop {
            match Self::connect(addr.clone(), config).await {
                Ok(client) => return Ok(client),
                Err(e @ ClientError::Config(_)) => return Err(e),
                Err(e) if attempt >= max_attempts => return Err(e),
                Err(e) => {
                    tracing::debug!("Connect attempt {} failed: {}", attempt, e);
                    // Exponential backoff: 100ms, 200ms, 400ms, ...
                    let delay = Duration::from_millis(100 * (1 << (attempt - 1).min(10)));
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Set the request timeout duration.
    ///
    /// Default is 30 seconds.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Call a server function and wait for its reply.
    ///
    /// The request envelope's data is `{"fname": <name>, "data": <params>}`.
    pub async fn call(
        &mut self,
        fname: &str,
        params: Value,
    ) -> Result<Envelope<'static>, ClientError> {
        self.send(&json!({ "fname": fname, "data": params })).await
    }

    /// Send arbitrary envelope data and wait for the reply envelope.
    pub async fn send(&mut self, data: &Value) -> Result<Envelope<'static>, ClientError> {
        if self.broken {
            return Err(ClientError::ConnectionClosed);
        }
        let request = envelope::encode_value(data, &self.config);

        let result = match timeout(self.timeout, self.send_receive(&request)).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout(self.timeout)),
        };
        if let Err(e) = &result {
            tracing::debug!("Request failed, closing connection: {}", e);
            self.broken = true;
        }
        result
    }

    /// Whether a failed request has put the connection out of sync.
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Send a request and receive the reply (internal, no timeout).
    async fn send_receive(&mut self, request: &[u8]) -> Result<Envelope<'static>, ClientError> {
        write_frame(&mut self.writer, request, &self.config.terminator).await?;

        let frame = self
            .reader
            .read_frame()
            .await?
            .ok_or(ClientError::ConnectionClosed)?;

        Ok(envelope::decode(&frame)?)
    }
}
