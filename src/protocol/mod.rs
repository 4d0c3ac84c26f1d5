//! RESP3 protocol implementation.
//!
//! This module implements the RESP3 wire protocol as a client consumes it:
//! an incremental decoder that survives arbitrary chunk boundaries, and an
//! encoder for values and command frames.

mod decoder;
mod encoder;
mod value;

pub use decoder::{decode, Decoder, Output};
pub use encoder::{write_value, CommandArg, Encoder};
pub use value::{Pairs, Value};

/// CRLF terminator bytes.
pub const CRLF: &[u8] = b"\r\n";

/// The protocol version requested during the handshake.
pub const PROTOCOL_VERSION: u8 = 3;

/// Type markers for RESP3.
pub mod markers {
    /// Simple string: +
    pub const SIMPLE_STRING: u8 = b'+';
    /// Error: -
    pub const ERROR: u8 = b'-';
    /// Integer: :
    pub const INTEGER: u8 = b':';
    /// Blob string: $
    pub const BLOB_STRING: u8 = b'$';
    /// Array: *
    pub const ARRAY: u8 = b'*';
    /// Null: _
    pub const NULL: u8 = b'_';
    /// Boolean: #
    pub const BOOLEAN: u8 = b'#';
    /// Double: ,
    pub const DOUBLE: u8 = b',';
    /// Big number: (
    pub const BIG_NUMBER: u8 = b'(';
    /// Blob error: !
    pub const BLOB_ERROR: u8 = b'!';
    /// Verbatim string: =
    pub const VERBATIM_STRING: u8 = b'=';
    /// Map: %
    pub const MAP: u8 = b'%';
    /// Set: ~
    pub const SET: u8 = b'~';
    /// Attributes: |
    pub const ATTRIBUTES: u8 = b'|';
    /// Push: >
    pub const PUSH: u8 = b'>';
}
