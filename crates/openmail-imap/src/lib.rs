//! # openmail-imap
//!
//! IMAP4rev2 (RFC 9051) session manager for the openmail client: a
//! runtime state machine over a TLS connection, a background IDLE
//! monitor that yields the socket to foreground commands, and a parser
//! layer that turns FETCH responses into a typed model.
//!
//! ## Quick start
//!
//! ```ignore
//! use openmail_imap::{Session, SessionConfig};
//!
//! let config = SessionConfig::new("imap.gmail.com", 993)
//!     .credentials("user@gmail.com", "app-password");
//! let mut session = Session::connect(config).await?;
//!
//! session.search_emails(Some("INBOX"), "ALL").await?;
//! let page = session.get_emails(0, 10).await?;
//! for email in &page.emails {
//!     println!("{} {}", email.uid, email.subject);
//! }
//!
//! // Background IDLE with observer events
//! let mut events = session.take_events().unwrap();
//! session.idle().await?;
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! ```
//!
//! ## Command dispatch and IDLE
//!
//! Every command goes through one dispatcher. When the IDLE monitor is
//! active, the dispatcher suspends IDLE (`DONE` + tagged OK) before the
//! command is written; the monitor re-enters IDLE after a short
//! activation delay, so the wire always shows `DONE`, the command, then
//! one `IDLE`, never interleaved traffic.
//!
//! ## State machine
//!
//! ```text
//! Disconnected ── login ──▶ Authenticated ◀── close ── Selected
//!                                │    └── select/examine ──▶ ▲
//!                                └──────── logout / BYE ──▶ LoggedOut
//! ```
//!
//! IDLE is a sub-state of `Selected` (always the readonly INBOX).
//!
//! ## Modules
//!
//! - [`codec`]: modified UTF-7 folder names, IMAP dates
//! - [`command`]: command builders and serialisation
//! - [`connection`]: streams, framing, the session, IDLE
//! - [`message`]: pure functions over parsed FETCH output
//! - [`parser`]: sans-I/O response parser
//! - [`search`]: search criteria and query generation
//! - [`types`]: flags, folders, sequence sets, email models

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod codec;
pub mod command;
pub mod connection;
mod error;
pub mod message;
pub mod parser;
pub mod search;
pub mod types;

pub use connection::{
    COMMAND_TIMEOUT, IDLE_ACTIVATION_DELAY, IDLE_TIMEOUT, MailEvent, Session, SessionConfig,
    SessionState, WAIT_RESPONSE_TIMEOUT,
};
pub use error::{Error, Result};
pub use search::{SearchCriteria, SearchQuery};
pub use types::{
    AttachmentInfo, EmailFlags, EmailSummary, EmailWithContent, Flag, Flags, Folder, MailboxPage,
    Mark, SequenceSet, SpecialUse,
};

/// IMAP protocol version targeted.
pub const IMAP_VERSION: &str = "IMAP4rev2";
