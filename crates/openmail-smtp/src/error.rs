//! Error types for the SMTP library.

use thiserror::Error;

/// Errors that can occur during SMTP operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error during network operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS handshake or encryption error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Authentication rejected.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Server rejected a command.
    #[error("SMTP error {code}: {message}")]
    Smtp {
        /// Reply code.
        code: u16,
        /// Server text.
        message: String,
    },

    /// The server lacks a required extension.
    #[error("Server does not support {0}")]
    NotSupported(String),

    /// Malformed server reply.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Caller input rejected before reaching the wire.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Message construction failed.
    #[error("MIME error: {0}")]
    Mime(#[from] openmail_mime::Error),
}

impl Error {
    pub(crate) fn smtp(code: u16, message: impl Into<String>) -> Self {
        Self::Smtp {
            code,
            message: message.into(),
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
