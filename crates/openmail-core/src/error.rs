//! Error types for the core library.

use thiserror::Error;

/// Errors that can occur in facade operations.
#[derive(Debug, Error)]
pub enum Error {
    /// IMAP operation failed.
    #[error("IMAP error: {0}")]
    Imap(#[from] openmail_imap::Error),

    /// SMTP operation failed.
    #[error("SMTP error: {0}")]
    Smtp(#[from] openmail_smtp::Error),

    /// Account configuration problem (unknown domain, missing host).
    #[error("Account error: {0}")]
    Account(String),

    /// Secret store failure.
    #[error("Secret store error: {0}")]
    Secrets(#[from] crate::secrets::SecretError),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
