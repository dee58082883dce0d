//! Panda Core Library
//!
//! Message encoding and wire framing for the gallery manager server:
//!
//! - `message` - Typed server results and how they reduce to JSON
//! - `envelope` - Versioned `{identity, version, data}` wrapper and its codec
//! - `ipc` - Terminator-framed TCP transport, server and client
//! - `interface` - The gallery functions clients can call
//! - `db` - What the gallery data layer must provide
//! - `config` - Process-wide read-only settings
//!
//! # Example
//!
//! ```ignore
//! use panda_core::config::ServerConfig;
//! use panda_core::envelope;
//! use panda_core::message::CoreMessage;
//!
//! let config = ServerConfig::default();
//! let bytes = envelope::encode(&CoreMessage::remark("hello"), &config)?;
//! // {"identity":"server","version":["0.0.1","0"],"data":"hello"}
//! ```

pub mod config;
pub mod db;
pub mod envelope;
pub mod interface;
pub mod ipc;
pub mod message;
