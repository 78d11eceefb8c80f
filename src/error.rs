//! Error types
//!
//! Two layers:
//! * [`WireError`] covers everything that can go wrong while talking to the
//!   server (I/O, protocol, authentication, server-reported errors, pool state).
//! * [`Error`] is what `open_pool` and `validate` return. Every variant names the
//!   operation that produced it and keeps the underlying cause as its `source()`.

use std::io;
use thiserror::Error;

/// Result alias for pool construction and validation
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Result alias for wire-level operations
pub type WireResult<T> = std::result::Result<T, WireError>;

/// Startup failure
///
/// All variants are terminal: none of them is retried internally, and no usable
/// pool exists once one has been returned.
#[derive(Debug, Error)]
pub enum Error {
    /// The connection string could not be parsed
    #[error("{op}: invalid connection string: {reason}")]
    ConfigParse {
        /// Operation that failed
        op: &'static str,
        /// What was wrong with the input
        reason: String,
    },

    /// The pool could not be built (unreachable host, authentication failure, ...)
    #[error("{op}: {source}")]
    PoolConstruction {
        /// Operation that failed
        op: &'static str,
        /// Underlying cause
        #[source]
        source: WireError,
    },

    /// An encoding setting does not have the one accepted value
    #[error("{op}: {name:?} is {got:?}, want {want:?}")]
    UnsupportedEncoding {
        /// Operation that failed
        op: &'static str,
        /// Setting name
        name: String,
        /// Value reported by the server
        got: String,
        /// Required value
        want: &'static str,
    },

    /// A locale setting is outside the accepted set
    #[error("{op}: {name:?} is {got:?}")]
    UnsupportedLocale {
        /// Operation that failed
        op: &'static str,
        /// Setting name
        name: String,
        /// Value reported by the server
        got: String,
    },

    /// The settings query failed or its row stream broke
    #[error("{op}: {source}")]
    ValidationIo {
        /// Operation that failed
        op: &'static str,
        /// Underlying cause
        #[source]
        source: WireError,
    },
}

impl Error {
    /// Name of the operation that produced this error
    pub fn op(&self) -> &'static str {
        match self {
            Self::ConfigParse { op, .. }
            | Self::PoolConstruction { op, .. }
            | Self::UnsupportedEncoding { op, .. }
            | Self::UnsupportedLocale { op, .. }
            | Self::ValidationIo { op, .. } => op,
        }
    }

    /// True when the server was reached but reported unacceptable settings
    pub fn is_misconfigured_server(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedEncoding { .. } | Self::UnsupportedLocale { .. }
        )
    }

    /// Short label for metrics
    pub(crate) fn category(&self) -> &'static str {
        match self {
            Self::ConfigParse { .. } => "config_parse",
            Self::PoolConstruction { .. } => "pool_construction",
            Self::UnsupportedEncoding { .. } => "unsupported_encoding",
            Self::UnsupportedLocale { .. } => "unsupported_locale",
            Self::ValidationIo { .. } => "validation_io",
        }
    }
}

/// Wire-level error
#[derive(Debug, Error)]
pub enum WireError {
    /// I/O error on the socket
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Malformed or unexpected protocol traffic
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Authentication rejected or unsupported
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Error reported by the server in an ErrorResponse
    #[error("server error: {0}")]
    Server(String),

    /// Server closed the connection
    #[error("connection closed")]
    ConnectionClosed,

    /// Connection state machine violation
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// Connection is already running a query
    #[error("connection busy: {0}")]
    ConnectionBusy(String),

    /// A row value could not be read as requested
    #[error("decode error: {0}")]
    Decode(String),

    /// The pool has been closed
    #[error("pool is closed")]
    PoolClosed,
}

impl WireError {
    /// Short label for metrics
    pub(crate) fn category(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Protocol(_) => "protocol",
            Self::Authentication(_) => "authentication",
            Self::Server(_) => "server",
            Self::ConnectionClosed => "connection_closed",
            Self::InvalidState { .. } => "invalid_state",
            Self::ConnectionBusy(_) => "connection_busy",
            Self::Decode(_) => "decode",
            Self::PoolClosed => "pool_closed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_encoding_error_message() {
        let err = Error::UnsupportedEncoding {
            op: "validate",
            name: "server_encoding".into(),
            got: "LATIN1".into(),
            want: "UTF8",
        };
        assert_eq!(
            err.to_string(),
            r#"validate: "server_encoding" is "LATIN1", want "UTF8""#
        );
        assert!(err.is_misconfigured_server());
        assert_eq!(err.op(), "validate");
    }

    #[test]
    fn test_construction_error_keeps_source() {
        let err = Error::PoolConstruction {
            op: "open_pool",
            source: WireError::Io(io::Error::new(io::ErrorKind::ConnectionRefused, "refused")),
        };
        assert!(!err.is_misconfigured_server());
        let source = err.source().expect("source");
        assert!(source.to_string().contains("refused"));
        assert!(err.to_string().starts_with("open_pool: "));
    }

    #[test]
    fn test_categories() {
        let err = Error::ValidationIo {
            op: "validate",
            source: WireError::ConnectionClosed,
        };
        assert_eq!(err.category(), "validation_io");
        assert_eq!(WireError::PoolClosed.category(), "pool_closed");
    }
}
