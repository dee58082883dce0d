//! Listener and per-connection request loop.
//!
//! Each accepted connection runs in its own tokio task. Frames on one
//! connection are handled strictly in order: a frame is read, decoded,
//! handled and answered before the next one is read. Errors end only the
//! connection they happened on.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, ServerConfig};
use crate::envelope::{self, Envelope, EnvelopeError};
use crate::ipc::framing::{write_frame, FrameError, FrameReader};
use crate::message::{CoreMessage, MessageError};

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Turns a decoded request into a reply.
///
/// Business failures belong in the reply as an attached error. Returning
/// `Err` means the handler built an invalid message; the connection is
/// dropped and nothing is sent.
pub trait RequestHandler: Send + Sync + 'static {
    fn handle(&self, request: Envelope<'static>) -> Result<CoreMessage, MessageError>;
}

/// Why a connection was torn down.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Framing or socket failure.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// The client sent something that is not an envelope.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// A reply could not be built. Never sent to the client.
    #[error("Contract violation: {0}")]
    Contract(#[from] MessageError),
}

impl ConnectionError {
    /// Protocol errors come from untrusted input; contract violations are bugs.
    pub fn is_protocol_error(&self) -> bool {
        match self {
            ConnectionError::Frame(_) | ConnectionError::Envelope(_) => true,
            ConnectionError::Contract(_) => false,
        }
    }
}

/// Serve requests on one connection until the peer disconnects.
pub async fn serve_connection<S, H>(
    stream: S,
    config: &ServerConfig,
    handler: &H,
) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    H: RequestHandler + ?Sized,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut frames = FrameReader::new(read_half, config);

    while let Some(frame) = frames.read_frame().await? {
        let request = envelope::decode(&frame)?;
        debug!(
            "Request from {} (protocol {})",
            request.identity,
            request.protocol_version()
        );

        let reply = handler.handle(request)?;
        let bytes = envelope::encode(&reply, config)?;
        write_frame(&mut write_half, &bytes, &config.terminator).await?;
    }

    Ok(())
}

/// TCP server running one task per client connection.
pub struct Server<H> {
    config: Arc<ServerConfig>,
    handler: Arc<H>,
}

impl<H: RequestHandler> Server<H> {
    /// Create a server after checking `config` can frame messages safely.
    pub fn new(config: ServerConfig, handler: H) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            handler: Arc::new(handler),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind a listener on the configured host and port.
    pub async fn bind(&self) -> std::io::Result<TcpListener> {
        let listener = TcpListener::bind(self.config.address()).await?;
        info!("Listening on {}", listener.local_addr()?);
        Ok(listener)
    }

    /// Accept connections forever.
    pub async fn run(&self, listener: TcpListener) {
        self.run_until(listener, std::future::pending()).await
    }

    /// Accept connections until `shutdown` completes.
    ///
    /// With a client limit, the accept loop waits for a free slot before
    /// accepting, so excess clients queue in the listen backlog. Connection
    /// tasks already running are left to finish on their own.
    pub async fn run_until<F>(&self, listener: TcpListener, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let slots = self.config.client_limit.map(|n| Arc::new(Semaphore::new(n)));
        tokio::pin!(shutdown);

        loop {
            let permit = match &slots {
                Some(slots) => tokio::select! {
                    permit = Arc::clone(slots).acquire_owned() => match permit {
                        Ok(permit) => Some(permit),
                        Err(_) => break,
                    },
                    _ = &mut shutdown => break,
                },
                None => None,
            };

            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = &mut shutdown => break,
            };
            let (stream, peer) = match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    // EMFILE and friends persist; back off before retrying.
                    warn!("Failed to accept connection: {}", e);
                    if backoff_after_accept_error(shutdown.as_mut()).await {
                        break;
                    }
                    continue;
                }
            };

            let config = Arc::clone(&self.config);
            let handler = Arc::clone(&self.handler);
            tokio::spawn(async move {
                let _permit = permit;
                handle_client(stream, peer, &config, &*handler).await;
            });
        }

        info!("Server stopped accepting connections");
    }
}

/// Wait out [`ACCEPT_BACKOFF`]. Returns `true` if `shutdown` fired meanwhile.
async fn backoff_after_accept_error<F>(shutdown: Pin<&mut F>) -> bool
where
    F: Future<Output = ()>,
{
    tokio::select! {
        _ = tokio::time::sleep(ACCEPT_BACKOFF) => false,
        _ = shutdown => true,
    }
}

async fn handle_client<S, H>(stream: S, peer: SocketAddr, config: &ServerConfig, handler: &H)
where
    S: AsyncRead + AsyncWrite + Unpin,
    H: RequestHandler,
{
    debug!("Client connected: {}", peer);
    match serve_connection(stream, config, handler).await {
        Ok(()) => debug!("Client disconnected: {}", peer),
        Err(e) if e.is_protocol_error() => warn!("Dropping client {}: {}", peer, e),
        Err(e) => error!("Aborting request from {}: {}", peer, e),
    }
}
