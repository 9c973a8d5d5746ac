//! # openmail-mime
//!
//! MIME plumbing for the openmail client: transfer encodings, RFC 2047
//! headers, content types, HTML-to-text reduction for previews, and the
//! outbound message builder used by the SMTP layer.
//!
//! ## Decoding leniency
//!
//! The decoders here feed message bodies fetched from IMAP servers.
//! Truncated base64 padding and stray quoted-printable escapes are
//! recovered by truncating to a valid prefix rather than failing; see
//! [`encoding::decode_base64_lossy`] and
//! [`encoding::decode_quoted_printable`].
//!
//! ## Building outbound mail
//!
//! ```ignore
//! use openmail_mime::{MessageBuilder, OutgoingAttachment};
//!
//! let message = MessageBuilder::new()
//!     .from("Alice <alice@example.com>")
//!     .to("bob@example.com")
//!     .subject("Report")
//!     .html_body("<p>See attached.</p>")
//!     .attachment(OutgoingAttachment {
//!         filename: "report.pdf".into(),
//!         mime_type: "application/pdf".into(),
//!         data: pdf_bytes,
//!     })
//!     .build()?;
//! ```
//!
//! Inline `<img src="data:image/png;base64,…">` references in the HTML
//! body are rewritten to `cid:` references with the decoded bytes
//! attached as `multipart/related` image parts.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod builder;
mod content_type;
mod error;
mod header;
mod html;

pub mod encoding;

pub use builder::{MessageBuilder, OutgoingAttachment};
pub use content_type::ContentType;
pub use error::{Error, Result};
pub use header::Headers;
pub use html::html_to_text;
