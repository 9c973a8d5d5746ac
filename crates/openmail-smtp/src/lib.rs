//! # openmail-smtp
//!
//! SMTP submission client for the openmail client: STARTTLS on port
//! 587, AUTH PLAIN, and a composition layer that assembles outgoing
//! MIME (inline images, attachments with a 25 MiB cap, recipient
//! flattening) on top of `openmail-mime`.
//!
//! ## Quick start
//!
//! ```ignore
//! use openmail_smtp::{EmailToSend, Sender, SmtpConfig, SmtpSession};
//!
//! let config = SmtpConfig::new("smtp.gmail.com")
//!     .credentials("user@gmail.com", "app-password");
//! let mut session = SmtpSession::connect(config).await?;
//!
//! let email = EmailToSend::new(
//!     Sender::Address("user@gmail.com".into()),
//!     "friend@example.com",
//!     "hi",
//!     "<p>hello</p>",
//! );
//! session.send_email(&email).await?;
//! session.logout().await?;
//! ```
//!
//! Inline `<img src="data:image/png;base64,…">` images in the body are
//! rewritten to `cid:` references with the bytes attached as
//! `multipart/related` parts; `reply_email`/`forward_email` add the
//! `Re: `/`Fwd: ` prefix and `In-Reply-To`/`References` headers from
//! the original message's uid.
//!
//! ## Type-state protocol client
//!
//! The underlying [`Client`] encodes the SMTP phase in its type:
//! `Connected → Authenticated → MailTransaction → RecipientAdded →
//! Data`, with each transition consuming the client. Out-of-order
//! commands (RCPT before MAIL, DATA with no recipient) do not compile.
//! [`SmtpSession`] drives the machine and parks the client in the
//! authenticated state between sends.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
mod session;
pub mod types;

pub use connection::{
    Authenticated, Client, Connected, Data, MailTransaction, RecipientAdded, SmtpStream, connect,
};
pub use error::{Error, Result};
pub use session::{
    EmailAttachment, EmailToSend, MAX_ATTACHMENT_SIZE, SUBMISSION_PORT, Sender, SmtpConfig,
    SmtpSession,
};
pub use types::{Address, Extension, Reply, ServerInfo};
