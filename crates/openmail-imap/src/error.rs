//! Error types for the IMAP library.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during IMAP operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error during network operations. The caller may reconnect.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS handshake or encryption error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Response parsing error. The command fails; the session stays usable.
    #[error("Parse error at position {position}: {message}")]
    Parse {
        /// Byte position where the error occurred.
        position: usize,
        /// Description of what went wrong.
        message: String,
    },

    /// Authentication rejected. Terminal for the current credentials.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Server returned NO for a command.
    #[error("Server returned NO: {0}")]
    No(String),

    /// Server returned BAD for a command.
    #[error("Server returned BAD: {0}")]
    Bad(String),

    /// Server said BYE or the session is logged out. The session is unusable.
    #[error("Session logged out: {0}")]
    LoggedOut(String),

    /// Operation timed out. The session transitions to disconnected.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Protocol violation or unexpected server data.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Command issued in the wrong session state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Caller input rejected before reaching the wire (bad sequence set,
    /// empty or oversized folder name, unsupported mark, …).
    #[error("Validation error: {0}")]
    Validation(String),

    /// The requested message, attachment or folder does not exist.
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True when the session cannot be used after this error.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::LoggedOut(_) | Self::Timeout(_))
    }
}
