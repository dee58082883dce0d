//! Socket transport between gallery clients and the server.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐            TCP              ┌─────────────────────┐
//! │     Client      │  ◄────────────────────────► │  Server (listener)  │
//! │                 │   JSON envelope + "end"     │  one task per conn  │
//! └─────────────────┘                             └─────────────────────┘
//! ```
//!
//! # Protocol
//!
//! Every message in either direction is one envelope followed by the
//! terminator, read back in 1024-byte chunks:
//!
//! ```text
//! {"identity":"server","version":["0.0.1","0"],"data":{"fname":"fetch_gallery","data":{}}}end
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use panda_core::config::ServerConfig;
//! use panda_core::ipc::Client;
//! use serde_json::json;
//!
//! let config = ServerConfig::default();
//! let mut client = Client::connect(&config.address(), &config).await?;
//! let reply = client.call("fetch_gallery", json!({"offset": 0})).await?;
//! ```

mod client;
mod framing;
mod server;

pub use client::{Client, ClientError};
pub use framing::{write_frame, FrameError, FrameReader};
pub use server::{serve_connection, ConnectionError, RequestHandler, Server};
