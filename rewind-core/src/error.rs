//! Error and Result types.

use std::error::Error as StdError;
use std::io;

/// A specialized `Result` type for rewind.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A generic error that represents all the ways a method can fail inside of
/// the proxy core.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Error communicating with either leg of the connection.
    #[error("{0}")]
    Io(#[from] io::Error),

    /// Unexpected or invalid data was encountered on the wire. This means we
    /// received a packet we were not expecting or in a shape we did not
    /// understand; the offending connection is terminated, the process keeps
    /// running.
    #[error("{0}")]
    Protocol(Box<str>),

    /// The peer asked for a protocol feature the engine does not handle
    /// (`LOCAL_INFILE`, `sha256_password`, `COM_CHANGE_USER`, an unknown
    /// SASL mechanism, ...). Fatal for the connection only.
    #[error("unsupported protocol feature: {0}")]
    UnsupportedFeature(Box<str>),

    /// An error occurred during a TLS upgrade.
    #[error("error during TLS upgrade: {0}")]
    Tls(#[source] Box<dyn StdError + Send + Sync>),

    /// The shutdown token fired before or instead of wire progress.
    #[error("connection closed by shutdown signal")]
    Closed,

    /// Replay found no stored mock for a request that has no synthetic
    /// fallback.
    #[error("no recorded mock matched the request: {0}")]
    NoMockMatched(Box<str>),
}

impl Error {
    /// EOF on a stream read, before a full frame was assembled.
    pub(crate) fn short_read(expected: usize, got: usize) -> Self {
        Error::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("short read: expected {expected} bytes, got {got}"),
        ))
    }

    /// Clean EOF means the peer closed between frames.
    pub fn is_eof(&self) -> bool {
        matches!(self, Error::Io(err) if err.kind() == io::ErrorKind::UnexpectedEof)
    }
}

macro_rules! err_protocol {
    ($expr:expr) => {
        $crate::error::Error::Protocol($expr.into())
    };

    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::Error::Protocol(format!($fmt, $($arg)*).into())
    };
}
