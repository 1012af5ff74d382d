//! Error types for the driver.
//!
//! Every fallible operation in the crate returns [`Result`]. The variants of
//! [`Error`] are deliberately flat: each one names a distinct failure
//! situation rather than wrapping a hierarchy.

use thiserror::Error;

use crate::reql::datum::Datum;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors reported by the driver.
#[derive(Debug, Error)]
pub enum Error {
    /// A socket read, write, connect or close failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A malformed frame, bad JSON, an unknown response or error code, or an
    /// attempt to run a second reader loop on one connection.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server rejected the handshake.
    #[error("server rejected connection: {0}")]
    Auth(String),

    /// A response wait elapsed before anything arrived.
    #[error("operation timed out")]
    Timeout,

    /// The connection (or the query's token) is closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// A cursor was advanced past the end of its stream.
    #[error("no more data")]
    NoMoreData,

    /// A datum accessor was used on the wrong variant.
    #[error("{accessor}: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The accessor that was called.
        accessor: &'static str,
        /// The variant the accessor needs.
        expected: &'static str,
        /// The variant the datum actually holds.
        actual: &'static str,
    },

    /// The server answered with an error response.
    #[error("{kind}: {message}")]
    Server {
        kind: ServerErrorKind,
        message: String,
        /// The `b` field of the response, when the server sent one.
        backtrace: Option<Datum>,
    },

    /// Client-side misuse: running a query with free variables, consuming a
    /// single-value cursor twice, and the like.
    #[error("driver error: {0}")]
    Driver(String),
}

/// Classification of a server-reported error.
///
/// `Client` and `Compile` come straight from the response kind; the rest
/// split RUNTIME_ERROR by its error-kind code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerErrorKind {
    Client,
    Compile,
    Internal,
    ResourceLimit,
    QueryLogic,
    NonExistence,
    OpFailed,
    OpIndeterminate,
    User,
    Permission,
    Runtime,
}

impl ServerErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ServerErrorKind::Client => "ReqlDriverError",
            ServerErrorKind::Compile => "ReqlCompileError",
            ServerErrorKind::Internal => "ReqlInternalError",
            ServerErrorKind::ResourceLimit => "ReqlResourceLimitError",
            ServerErrorKind::QueryLogic => "ReqlQueryLogicError",
            ServerErrorKind::NonExistence => "ReqlNonExistenceError",
            ServerErrorKind::OpFailed => "ReqlOpFailedError",
            ServerErrorKind::OpIndeterminate => "ReqlOpIndeterminateError",
            ServerErrorKind::User => "ReqlUserError",
            ServerErrorKind::Permission => "ReqlPermissionError",
            ServerErrorKind::Runtime => "ReqlRuntimeError",
        }
    }
}

impl std::fmt::Display for ServerErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
