//! Shared error model for cross-crate APIs.

use thiserror::Error;

/// Unified result type used by all public interfaces in `embercache`.
pub type EmberResult<T> = Result<T, EmberError>;

/// Error categories shared by the storage engine, journal, and wire server.
///
/// Malformed framing surfaces as an I/O-level error that drops the connection, and journal
/// corruption is reported through the recovery result rather than raised, so neither needs a
/// variant here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EmberError {
    /// SET with NX refused because a live entry already holds the key.
    #[error("key already exists")]
    KeyExists,

    /// Counter arithmetic on a value that is not a signed 64-bit integer, or overflow.
    #[error("value is not an integer or out of range")]
    NotAnInteger,

    /// Command issued on an unauthenticated connection.
    #[error("NOAUTH Authentication required")]
    Unauthorized,

    /// Configuration is invalid for the requested operation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// Filesystem or socket I/O failed.
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for EmberError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}
