//! Process-wide server configuration.
//!
//! Everything here is read once at startup and shared read-only (behind an
//! `Arc`) by the listener and every connection task. Nothing is reloaded.
//!
//! # Environment
//!
//! `ServerConfig::from_env()` starts from the defaults and applies:
//!
//! | Variable             | Field         |
//! |----------------------|---------------|
//! | `PANDA_SERVER_NAME`  | `identity`    |
//! | `PANDA_HOST`         | `host`        |
//! | `PANDA_PORT`         | `port`        |
//! | `PANDA_CLIENT_LIMIT` | `client_limit`|
//!
//! `PANDA_CLIENT_LIMIT` accepts a positive integer, or `none` / `unlimited` /
//! an empty string for no limit. `0` is rejected rather than read as
//! "unlimited" or "accept nobody".

use thiserror::Error;

/// Server name sent as the envelope identity.
pub const SERVER_NAME: &str = "server";

/// Protocol version sent in every envelope.
pub const PROTOCOL_VERSION: &str = "0.0.1";

/// Database schema version sent in every envelope.
pub const SCHEMA_VERSION: u32 = 0;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 5577;

/// Bytes requested per socket read.
pub const CHUNK_SIZE: usize = 1024;

/// Marker written after every frame.
pub const TERMINATOR: &[u8] = b"end";

/// Maximum buffered frame size (100MB) before the connection is dropped.
pub const MAX_FRAME_SIZE: usize = 100 * 1024 * 1024;

/// Words that appear outside string literals in JSON text.
const JSON_KEYWORDS: [&str; 3] = ["true", "false", "null"];

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable could not be parsed.
    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv {
        /// Variable name
        var: &'static str,
        /// Raw value
        value: String,
    },

    /// A client limit of zero would never accept a connection.
    #[error("Client limit must be at least 1 (use no limit instead of 0)")]
    ZeroClientLimit,

    /// Chunk size must be non-zero.
    #[error("Chunk size must be greater than zero")]
    ZeroChunkSize,

    /// The terminator could collide with encoded JSON.
    #[error("Terminator {0:?} cannot delimit JSON frames")]
    UnsafeTerminator(String),
}

/// Read-only settings consumed by the codec, framing and listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Server name placed in every envelope.
    pub identity: String,
    /// Protocol version placed in every envelope.
    pub protocol_version: String,
    /// Schema version placed in every envelope (rendered as a string).
    pub schema_version: u32,
    /// Listen / connect host.
    pub host: String,
    /// Listen / connect port.
    pub port: u16,
    /// Maximum concurrently handled connections. `None` means unlimited.
    pub client_limit: Option<usize>,
    /// Bytes requested per socket read.
    pub chunk_size: usize,
    /// Frame terminator.
    pub terminator: Vec<u8>,
    /// Largest frame accepted before the connection is dropped.
    pub max_frame_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            identity: SERVER_NAME.to_string(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            schema_version: SCHEMA_VERSION,
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            client_limit: None,
            chunk_size: CHUNK_SIZE,
            terminator: TERMINATOR.to_vec(),
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

impl ServerConfig {
    /// Build a configuration from the defaults plus environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`ServerConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(name) = lookup("PANDA_SERVER_NAME") {
            tracing::info!("Using server name from PANDA_SERVER_NAME: {}", name);
            config.identity = name;
        }

        if let Some(host) = lookup("PANDA_HOST") {
            tracing::info!("Using host from PANDA_HOST: {}", host);
            config.host = host;
        }

        if let Some(port) = lookup("PANDA_PORT") {
            config.port = port.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: "PANDA_PORT",
                value: port.clone(),
            })?;
            tracing::info!("Using port from PANDA_PORT: {}", config.port);
        }

        if let Some(limit) = lookup("PANDA_CLIENT_LIMIT") {
            config.client_limit = parse_client_limit(&limit)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check invariants the transport and codec rely on.
    ///
    /// The terminator must be at least two lowercase ASCII letters and must
    /// not occur inside a JSON keyword. The encoder escapes every other
    /// place it could appear.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client_limit == Some(0) {
            return Err(ConfigError::ZeroClientLimit);
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }

        let terminator = String::from_utf8_lossy(&self.terminator).into_owned();
        let lowercase = self.terminator.iter().all(u8::is_ascii_lowercase);
        let in_keyword = JSON_KEYWORDS.iter().any(|kw| kw.contains(&*terminator));
        if self.terminator.len() < 2 || !lowercase || in_keyword {
            return Err(ConfigError::UnsafeTerminator(terminator));
        }

        Ok(())
    }

    /// Schema version as it appears in the envelope.
    pub fn schema_version_string(&self) -> String {
        self.schema_version.to_string()
    }

    /// `host:port` for binding or connecting.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parse `PANDA_CLIENT_LIMIT`. Absence of a limit is explicit, never zero.
fn parse_client_limit(raw: &str) -> Result<Option<usize>, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("none")
        || trimmed.eq_ignore_ascii_case("unlimited")
    {
        tracing::info!("No client limit configured");
        return Ok(None);
    }

    match trimmed.parse::<usize>() {
        Ok(0) => Err(ConfigError::ZeroClientLimit),
        Ok(n) => {
            tracing::info!("Client limit: {}", n);
            Ok(Some(n))
        }
        Err(_) => Err(ConfigError::InvalidEnv {
            var: "PANDA_CLIENT_LIMIT",
            value: raw.to_string(),
        }),
    }
}
