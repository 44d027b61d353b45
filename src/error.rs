//! Error types for ovpn-mgmt.
use std::{io, string::FromUtf8Error};

use thiserror::Error;

/// A convenient result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that may occur while talking to a management interface.
#[derive(Debug, Error)]
pub enum Error {
    /// The management endpoint could not be reached.
    #[error("cannot connect to management interface at {endpoint}: {source}")]
    Connect {
        /// Address that was dialled.
        endpoint: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The password challenge was not observed or the password was rejected.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// No terminator line arrived within the configured timeout.
    #[error("timed out waiting for a reply")]
    Timeout,
    /// The stream closed mid-reply or carried something unexpected.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// A structured report was malformed.
    #[error("cannot parse {line:?}: {reason}")]
    Parse {
        /// The offending line, terminator removed.
        line: String,
        /// What was wrong with it.
        reason: &'static str,
    },
    /// The daemon answered `ERROR: <message>`.
    #[error("management interface error: {0}")]
    Remote(String),
    /// A caller-side argument was rejected before anything was sent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// A received line was not valid UTF-8.
    #[error("utf-8 error: {0}")]
    Utf8(#[from] FromUtf8Error),
}

impl Error {
    pub(crate) fn parse(line: &str, reason: &'static str) -> Self {
        Error::Parse { line: line.to_string(), reason }
    }

    /// Whether the session must be closed and reopened after this error.
    ///
    /// A timed-out or truncated reply leaves unread bytes on the stream, so
    /// the next reply can no longer be framed reliably.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Timeout | Error::Protocol(_) | Error::Io(_) | Error::Utf8(_))
    }
}
