//! # openmail-core
//!
//! Per-account facade for the openmail client: composes one
//! [`openmail_imap::Session`] and one [`openmail_smtp::SmtpSession`],
//! derives server endpoints from the address domain, and defines the
//! secret-store interface the application wires in.
//!
//! ## Quick start
//!
//! ```ignore
//! use openmail_core::{Account, OpenMail};
//! use openmail_smtp::{EmailToSend, Sender};
//!
//! let account = Account::new("user@gmail.com", "app-password")?;
//! let mut mail = OpenMail::new(account);
//! mail.connect().await?;
//!
//! mail.search_emails(Some("INBOX"), "ALL").await?;
//! let page = mail.get_emails(0, 10).await?;
//!
//! mail.send_email(&EmailToSend::new(
//!     Sender::Address("user@gmail.com".into()),
//!     "friend@example.com",
//!     "hi",
//!     "hello",
//! ))
//! .await?;
//!
//! mail.disconnect().await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod account;
mod error;
mod facade;
pub mod secrets;

pub use account::{Account, IMAP_PORT, SMTP_PORT};
pub use error::{Error, Result};
pub use facade::OpenMail;
pub use secrets::{
    KeyringSecretStore, SecretError, SecretKey, SecretKind, SecretRecord, SecretResult,
    SecretStore,
};

// Re-exports so facade callers need only this crate
pub use openmail_imap::{
    AttachmentInfo, EmailFlags, EmailSummary, EmailWithContent, MailEvent, MailboxPage,
    SearchCriteria, SearchQuery,
};
pub use openmail_smtp::{EmailAttachment, EmailToSend, Sender};
