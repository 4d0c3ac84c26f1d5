//! # Nuntius
//!
//! An asynchronous client core for Redis-compatible servers speaking the
//! RESP3 wire protocol.
//!
//! The crate has two tightly coupled halves:
//!
//! - An incremental RESP3 **codec**: a [`Decoder`] that accepts arbitrary
//!   byte chunks and emits fully-formed [`Value`]s (including out-of-band
//!   push frames and attribute decorations), and a symmetrical [`Encoder`]
//!   that serializes values and commands back to the wire.
//! - A **session** built on one long-lived TCP connection: commands from any
//!   number of callers are multiplexed onto the wire, replies are correlated
//!   back in FIFO order, push frames are routed to listeners, and every
//!   command is bounded by a deadline.
//!
//! Higher layers compose typed command helpers, TLS/Unix transports, and
//! reconnect policies on top of the generic [`Client::send`] entry point;
//! none of that lives here.
//!
//! ## Example
//!
//! ```no_run
//! use nuntius::{Client, Config, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::new(Config::default())?;
//!     client.connect().await?;
//!     let pong = client.send("PING", []).await?;
//!     assert_eq!(pong.as_str(), Some("PONG"));
//!     client.close().await;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/nuntius/0.1.0")]
#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    rust_2018_idioms,
    trivial_casts,
    trivial_numeric_casts,
    unused_lifetimes,
    unused_qualifications
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::should_implement_trait, // from_str, as_ref naming on Value
    clippy::type_complexity         // oneshot resolver types in the session
)]

// ─────────────────────────────────────────────────────────────────────────────
// Modules
// ─────────────────────────────────────────────────────────────────────────────

/// Client handle, session actor, configuration, and TCP transport.
pub mod client;
/// Error types and result alias.
pub mod error;
/// RESP3 protocol implementation: value model, decoder, encoder.
pub mod protocol;

// ─────────────────────────────────────────────────────────────────────────────
// Common Re-exports
// ─────────────────────────────────────────────────────────────────────────────

pub use client::{Client, Config, ConnectionState, RequestId, Ticket};
pub use error::{ConfigError, DecodeError, Error, ProtocolError, Result, TransportError};
pub use protocol::{decode, CommandArg, Decoder, Encoder, Output, Value};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Crate version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default server port.
pub const DEFAULT_PORT: u16 = 6379;

/// Default bound for connect + handshake, in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;

/// Default per-command bound from submit to resolution, in milliseconds.
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 5_000;

/// Maximum accepted blob payload size (512 MiB).
pub const MAX_BLOB_SIZE: usize = 512 * 1024 * 1024;

/// Maximum accepted aggregate element count.
pub const MAX_AGGREGATE_LEN: usize = 1_024 * 1024;
