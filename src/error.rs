//! Error types for nuntius.
//!
//! The taxonomy mirrors the layers of the client core: transport causes,
//! protocol/decode failures, server-reported errors, and session-level
//! outcomes. Leaf errors are `Clone` so a single teardown cause can be
//! fanned out to every in-flight request.

use thiserror::Error;

/// Result type alias for nuntius operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for nuntius.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Transport-level failure (connect, read, write, close).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Protocol violation outside the decode path (e.g. handshake).
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Fatal decode failure, with the byte offset where it happened.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Error reply (`-…`) from the server, failing only its own request.
    #[error("server error: {}{message}", fmt_code(.code))]
    Server {
        /// Uppercase token prefix of the reply, when present (e.g. `ERR`).
        code: Option<String>,
        /// Remainder of the reply text.
        message: String,
    },

    /// Blob error reply (`!…`) from the server.
    #[error("server blob error: {}{message}", fmt_code(.code))]
    ServerBlob {
        /// Uppercase token prefix of the reply, when present.
        code: Option<String>,
        /// Remainder of the reply text (lossy UTF-8).
        message: String,
    },

    /// A command was submitted without a connected, handshaken session.
    #[error("connection required")]
    ConnectionRequired,

    /// The per-command deadline fired before the reply arrived.
    #[error("command timed out")]
    CommandTimeout,

    /// The command was cancelled by the caller.
    #[error("command cancelled")]
    CommandCancelled,

    /// A non-push reply arrived with no pending request to claim it.
    #[error("unsolicited reply")]
    UnsolicitedReply,

    /// Rejected configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

fn fmt_code(code: &Option<String>) -> String {
    match code {
        Some(c) => format!("{c} "),
        None => String::new(),
    }
}

/// Transport-level causes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The peer refused the connection.
    #[error("connection refused")]
    Refused,

    /// The connection was reset by the peer.
    #[error("connection reset")]
    Reset,

    /// The connection closed (locally or by the peer).
    #[error("connection closed")]
    Closed,

    /// Connect or handshake did not finish within `connect_timeout`.
    #[error("connect timed out")]
    Timeout,

    /// Hostname resolution failed.
    #[error("address resolution failed: {0}")]
    Resolution(String),

    /// A write to the stream failed.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// The operation is not legal in the current connection state.
    #[error("invalid connection state: {0}")]
    InvalidState(&'static str),

    /// Any other I/O failure.
    #[error("I/O error: {0}")]
    Io(String),
}

impl TransportError {
    /// Map an I/O error onto the transport taxonomy.
    pub fn from_io(err: &std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::ConnectionRefused => TransportError::Refused,
            ErrorKind::ConnectionReset | ErrorKind::BrokenPipe => TransportError::Reset,
            ErrorKind::ConnectionAborted | ErrorKind::UnexpectedEof => TransportError::Closed,
            ErrorKind::TimedOut => TransportError::Timeout,
            _ => TransportError::Io(err.to_string()),
        }
    }
}

/// Protocol-level failure kinds raised by the decoder and handshake.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A byte that is not a RESP3 type prefix where one was expected.
    #[error("unexpected type prefix: {0:?}")]
    UnexpectedPrefix(char),

    /// A blob payload was not followed by a literal CRLF.
    #[error("blob not terminated by CRLF")]
    BlobUnterminated,

    /// A negative or oversized length header.
    #[error("invalid length: {0}")]
    InvalidLength(i64),

    /// An integer or double line that does not parse.
    #[error("invalid numeric: {0}")]
    InvalidNumeric(String),

    /// A boolean body other than `t` or `f`.
    #[error("invalid boolean")]
    InvalidBoolean,

    /// A null (`_`) line with a non-empty body.
    #[error("invalid null body")]
    InvalidNull,

    /// The `HELLO 3` exchange did not succeed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// Input ended inside a value (one-shot decoding only; the streaming
    /// decoder reports this as "need more" instead).
    #[error("incomplete value")]
    Incomplete,
}

/// A fatal decode failure: the protocol violation plus the absolute offset
/// of bytes consumed by the decoder when it was detected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} (at byte {offset})")]
pub struct DecodeError {
    /// Total bytes the decoder had consumed when the error was raised.
    pub offset: u64,
    /// The specific protocol violation.
    pub kind: ProtocolError,
}

/// Rejected configuration values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Port outside `[1, 65535]`.
    #[error("invalid port: {0}")]
    InvalidPort(u32),

    /// A zero timeout.
    #[error("invalid {name} timeout: must be positive")]
    InvalidTimeout {
        /// Which timeout was rejected (`connect` or `command`).
        name: &'static str,
    },

    /// URL scheme outside `{redis, rediss}`.
    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    /// A URL that does not match `redis[s]://[user[:pass]@]host[:port][/db]`.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// A database index that does not parse as a non-negative integer.
    #[error("invalid database index: {0}")]
    InvalidDatabase(String),
}

impl Error {
    /// Returns true if the failure came from the transport layer.
    #[inline]
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// Returns true if the server itself reported the error
    /// (the command reached the server and was rejected).
    #[inline]
    pub fn is_server_error(&self) -> bool {
        matches!(self, Error::Server { .. } | Error::ServerBlob { .. })
    }

    /// Returns true if this error tore down the whole session rather than
    /// failing a single request.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Decode(_) | Error::UnsolicitedReply | Error::Transport(TransportError::Closed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_display() {
        let err = Error::Server {
            code: Some("WRONGTYPE".to_string()),
            message: "Operation against a key holding the wrong kind of value".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "server error: WRONGTYPE Operation against a key holding the wrong kind of value"
        );

        let bare = Error::Server {
            code: None,
            message: "something odd".to_string(),
        };
        assert_eq!(bare.to_string(), "server error: something odd");
    }

    #[test]
    fn test_decode_error_carries_offset() {
        let err = DecodeError {
            offset: 17,
            kind: ProtocolError::BlobUnterminated,
        };
        assert_eq!(err.to_string(), "blob not terminated by CRLF (at byte 17)");
    }

    #[test]
    fn test_io_error_mapping() {
        use std::io::{Error as IoError, ErrorKind};
        assert_eq!(
            TransportError::from_io(&IoError::new(ErrorKind::ConnectionRefused, "refused")),
            TransportError::Refused
        );
        assert_eq!(
            TransportError::from_io(&IoError::new(ErrorKind::ConnectionReset, "reset")),
            TransportError::Reset
        );
        assert_eq!(
            TransportError::from_io(&IoError::new(ErrorKind::TimedOut, "slow")),
            TransportError::Timeout
        );
    }

    #[test]
    fn test_classification() {
        let server = Error::Server {
            code: Some("ERR".to_string()),
            message: "boom".to_string(),
        };
        assert!(server.is_server_error());
        assert!(!server.is_fatal());

        let decode = Error::Decode(DecodeError {
            offset: 0,
            kind: ProtocolError::InvalidBoolean,
        });
        assert!(decode.is_fatal());
    }
}
