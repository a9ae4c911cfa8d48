//! Error types reported by the client.

use std::fmt;
use std::io;
use std::sync::Arc;

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure details reported by the server in a FAILURE message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerFailure {
    /// Failure code, e.g. `Neo.ClientError.Statement.SyntaxError`.
    pub code: String,
    /// Human-readable description of the failure.
    pub message: String,
}

impl fmt::Display for ServerFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Errors arising from any client operation.
///
/// Errors are cheap to clone: a terminal stream failure is reported again on
/// every subsequent observation of the stream.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The server agreed to none of the proposed protocol versions.
    #[error("could not agree on a protocol version")]
    ProtocolNegotiationFailed,
    /// The server sent bytes that violate the protocol.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    /// An unknown marker byte was found while decoding a value.
    #[error("invalid value marker 0x{0:02X}")]
    InvalidValueMarker(u8),
    /// The input ended in the middle of an encoded value or chunk.
    #[error("unexpected end of input")]
    UnexpectedEndOfInput,
    /// A map key was not a string.
    #[error("map keys must be strings")]
    InvalidMapKeyType,
    /// A structure had more fields than the encoding can carry.
    #[error("too many fields in structure")]
    StructOverflow,

    /// The connection is closed or has failed terminally.
    #[error("session ended")]
    SessionEnded,
    /// The session was reset while this request was in flight.
    #[error("session reset")]
    SessionReset,
    /// The request pipeline is full.
    #[error("too many requests in flight")]
    SessionBusy,
    /// The server rejected the supplied credentials.
    #[error("invalid credentials")]
    InvalidCredentials,
    /// The credentials were accepted but have expired and must be changed.
    #[error("credentials have expired")]
    CredentialsExpired,
    /// The statement failed to evaluate on the server.
    #[error("statement evaluation failed ({0})")]
    StatementEvaluationFailed(ServerFailure),

    /// An I/O error on the underlying transport.
    #[error("connection I/O error: {0}")]
    Io(Arc<io::Error>),
    /// The server does not offer TLS on this endpoint.
    #[error("server does not support TLS")]
    NoServerTlsSupport,
    /// The server's TLS identity could not be verified.
    #[error("TLS verification failed")]
    TlsVerificationFailed,
    /// The host name could not be resolved.
    #[error("unknown host '{0}'")]
    UnknownHost(String),
    /// The server actively refused the connection.
    #[error("connection refused by '{0}'")]
    ConnectionRefused(String),

    /// No execution plan was returned with the result summary.
    #[error("no plan available")]
    NoPlanAvailable,
    /// The result summary has not been received yet.
    #[error("no results available")]
    NoResultsAvailable,

    /// The connection URL could not be parsed.
    #[error("invalid connection URL: {0}")]
    InvalidUrl(String),
    /// An argument was invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// An index was out of range.
    #[error("out of range: {0}")]
    OutOfRange(&'static str),
    /// The requested feature is not supported.
    #[error("not supported: {0}")]
    NotSupported(&'static str),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        // An EOF in the middle of a read is a malformed stream, not a socket
        // failure.
        if err.kind() == io::ErrorKind::UnexpectedEof {
            return Error::UnexpectedEndOfInput;
        }
        Error::Io(Arc::new(err))
    }
}

impl Error {
    pub(crate) fn violation<S: AsRef<str>>(what: S) -> Self {
        Error::ProtocolViolation(what.as_ref().to_string())
    }

    /// True when the error leaves the connection unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ProtocolNegotiationFailed
                | Error::ProtocolViolation(_)
                | Error::InvalidValueMarker(_)
                | Error::UnexpectedEndOfInput
                | Error::SessionEnded
                | Error::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_failure_display() {
        let err = Error::StatementEvaluationFailed(ServerFailure {
            code: "Neo.ClientError.Statement.SyntaxError".to_string(),
            message: "Invalid input".to_string(),
        });
        let rendered = err.to_string();
        assert!(rendered.contains("Neo.ClientError.Statement.SyntaxError"));
        assert!(rendered.contains("Invalid input"));
    }

    #[test]
    fn unexpected_eof_is_not_an_io_error() {
        let err: Error = io::Error::new(io::ErrorKind::UnexpectedEof, "eof").into();
        assert!(matches!(err, Error::UnexpectedEndOfInput));
        let err: Error = io::Error::new(io::ErrorKind::BrokenPipe, "gone").into();
        assert!(matches!(err, Error::Io(_)));
    }
}
