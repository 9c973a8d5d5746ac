//! High-level send/reply/forward session.
//!
//! Wraps the protocol client with message composition: MIME assembly
//! via `openmail-mime`, inline `data:` image rewriting, the attachment
//! size cap, and recipient flattening.

use openmail_mime::encoding::decode_base64_lossy;
use openmail_mime::{MessageBuilder, OutgoingAttachment};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::info;

use crate::connection::{Authenticated, Client, SmtpStream, connect};
use crate::error::{Error, Result};
use crate::types::Address;

/// Maximum attachment size, pre-encoding (25 MiB).
pub const MAX_ATTACHMENT_SIZE: usize = 25 * 1024 * 1024;

/// Default submission port (STARTTLS).
pub const SUBMISSION_PORT: u16 = 587;

/// Configuration for an SMTP session.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// Server hostname.
    pub host: String,
    /// Server port (587 for submission).
    pub port: u16,
    /// Login username.
    pub username: String,
    /// Login password.
    pub password: String,
}

impl SmtpConfig {
    /// Creates a configuration for the submission port.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: SUBMISSION_PORT,
            username: String::new(),
            password: String::new(),
        }
    }

    /// Sets the credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }
}

/// Message sender: bare address or display name plus address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sender {
    /// Just an address.
    Address(String),
    /// Display name and address.
    Named {
        /// Display name.
        name: String,
        /// Address.
        address: String,
    },
}

impl Sender {
    /// Header form: `Name <addr>` or the bare address.
    #[must_use]
    pub fn display(&self) -> String {
        match self {
            Self::Address(address) => address.clone(),
            Self::Named { name, address } => format!("{name} <{address}>"),
        }
    }

    /// Envelope address.
    #[must_use]
    pub fn address(&self) -> &str {
        match self {
            Self::Address(address) | Self::Named { address, .. } => address,
        }
    }
}

/// An attachment in one of the accepted input forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailAttachment {
    /// A local file; filename and MIME type derive from the path.
    Path(String),
    /// A `data:<mime>;base64,<payload>` URI with an explicit name.
    DataUri {
        /// Filename shown to the recipient.
        name: String,
        /// The data URI.
        uri: String,
    },
    /// Raw bytes.
    Raw {
        /// Filename shown to the recipient.
        name: String,
        /// MIME type.
        mime_type: String,
        /// File content.
        data: Vec<u8>,
    },
}

/// An email to send, reply with, or forward.
#[derive(Debug, Clone)]
pub struct EmailToSend {
    /// Sender (header and envelope).
    pub sender: Sender,
    /// `To` recipients.
    pub receivers: Vec<String>,
    /// `Cc` recipients.
    pub cc: Vec<String>,
    /// `Bcc` recipients (envelope only).
    pub bcc: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Body; HTML allowed.
    pub body: String,
    /// UID of the original message, required for reply/forward.
    pub uid: Option<u32>,
    /// Extra headers (`In-Reply-To`, `References`, …).
    pub metadata: Vec<(String, String)>,
    /// Attachments.
    pub attachments: Vec<EmailAttachment>,
}

impl EmailToSend {
    /// Creates a bare message.
    #[must_use]
    pub fn new(
        sender: Sender,
        receiver: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            sender,
            receivers: vec![receiver.into()],
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: subject.into(),
            body: body.into(),
            uid: None,
            metadata: Vec::new(),
            attachments: Vec::new(),
        }
    }
}

/// A per-account SMTP session.
///
/// Holds the type-state client parked in its authenticated state
/// between sends. A failed transaction consumes the connection (its
/// protocol state is unknown after a rejected exchange); further sends
/// then fail until the session is reconnected.
pub struct SmtpSession<S = SmtpStream> {
    client: Option<Client<S, Authenticated>>,
}

impl SmtpSession<SmtpStream> {
    /// Connects via STARTTLS and authenticates.
    ///
    /// # Errors
    ///
    /// Returns `Auth` for rejected credentials, transport errors
    /// otherwise.
    pub async fn connect(config: SmtpConfig) -> Result<Self> {
        let stream = connect(&config.host, config.port).await?;
        let client = Client::from_stream(stream).await?;
        let client = client.ehlo(&config.host).await?;
        let client = client.starttls(&config.host).await?;
        let client = client
            .auth_plain(&config.username, &config.password)
            .await?;
        info!(host = %config.host, "SMTP session established");
        Ok(Self {
            client: Some(client),
        })
    }
}

impl<S> SmtpSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Builds a session over an already-authenticated client (tests).
    #[must_use]
    pub fn from_client(client: Client<S, Authenticated>) -> Self {
        Self {
            client: Some(client),
        }
    }

    /// Sends a message.
    ///
    /// # Errors
    ///
    /// `Validation` for oversized attachments or empty recipients;
    /// server rejections otherwise. A server rejection mid-transaction
    /// drops the connection.
    pub async fn send_email(&mut self, email: &EmailToSend) -> Result<()> {
        let attachments = resolve_attachments(&email.attachments).await?;
        let (from, recipients, message) = compose(email, attachments)?;
        let (first, rest) = recipients
            .split_first()
            .ok_or_else(|| Error::Validation("No recipients".to_string()))?;

        let client = self.client.take().ok_or_else(|| {
            Error::Protocol("SMTP connection is gone; reconnect the session".to_string())
        })?;

        // Walk the transaction states; any error consumes the client
        let transaction = client.mail_from(&from).await?;
        let mut recipients_state = transaction.rcpt_to(first).await?;
        for recipient in rest {
            recipients_state = recipients_state.rcpt_to(recipient).await?;
        }
        let payload = recipients_state.data().await?;
        let client = payload.send_message(&message).await?;

        self.client = Some(client);
        Ok(())
    }

    /// Replies to a message: `Re: ` subject, `In-Reply-To`/`References`
    /// threading headers. Requires `uid`.
    ///
    /// # Errors
    ///
    /// `Validation` when `uid` is missing.
    pub async fn reply_email(&mut self, email: &EmailToSend) -> Result<()> {
        let threaded = thread_for(email, "Re: ")?;
        self.send_email(&threaded).await
    }

    /// Forwards a message: `Fwd: ` subject, threading headers.
    /// Requires `uid`.
    ///
    /// # Errors
    ///
    /// `Validation` when `uid` is missing.
    pub async fn forward_email(&mut self, email: &EmailToSend) -> Result<()> {
        let threaded = thread_for(email, "Fwd: ")?;
        self.send_email(&threaded).await
    }

    /// Ends the session with QUIT.
    ///
    /// # Errors
    ///
    /// Transport errors other than a server that hung up first.
    pub async fn logout(self) -> Result<()> {
        match self.client {
            Some(client) => client.quit().await,
            None => Ok(()),
        }
    }
}

/// Applies the reply/forward subject prefix and threading headers.
fn thread_for(email: &EmailToSend, prefix: &str) -> Result<EmailToSend> {
    let uid = email.uid.ok_or_else(|| {
        Error::Validation("Reply and forward require the original message uid".to_string())
    })?;

    let mut threaded = email.clone();
    threaded.subject = format!("{prefix}{}", email.subject);
    threaded
        .metadata
        .push(("In-Reply-To".to_string(), uid.to_string()));
    threaded
        .metadata
        .push(("References".to_string(), uid.to_string()));
    Ok(threaded)
}

/// Builds the wire message and envelope.
fn compose(
    email: &EmailToSend,
    attachments: Vec<OutgoingAttachment>,
) -> Result<(Address, Vec<Address>, Vec<u8>)> {
    for attachment in &attachments {
        if attachment.data.len() > MAX_ATTACHMENT_SIZE {
            return Err(Error::Validation(format!(
                "Attachment {:?} exceeds {} MiB",
                attachment.filename,
                MAX_ATTACHMENT_SIZE / (1024 * 1024)
            )));
        }
    }

    let mut builder = MessageBuilder::new()
        .from(email.sender.display())
        .subject(&email.subject)
        .html_body(&email.body);
    for receiver in &email.receivers {
        builder = builder.to(receiver.trim());
    }
    for cc in &email.cc {
        builder = builder.cc(cc.trim());
    }
    for (name, value) in &email.metadata {
        builder = builder.header(name, value);
    }
    for attachment in attachments {
        builder = builder.attachment(attachment);
    }
    let message = builder.build()?;

    let from = Address::new(email.sender.address())?;

    // Envelope list: To, Cc and Bcc, all trimmed
    let mut recipients = Vec::new();
    for addr in email
        .receivers
        .iter()
        .chain(&email.cc)
        .chain(&email.bcc)
    {
        recipients.push(Address::new(addr.trim())?);
    }

    Ok((from, recipients, message))
}

/// Loads attachments into memory.
async fn resolve_attachments(
    attachments: &[EmailAttachment],
) -> Result<Vec<OutgoingAttachment>> {
    let mut resolved = Vec::with_capacity(attachments.len());

    for attachment in attachments {
        resolved.push(match attachment {
            EmailAttachment::Raw {
                name,
                mime_type,
                data,
            } => OutgoingAttachment {
                filename: name.clone(),
                mime_type: mime_type.clone(),
                data: data.clone(),
            },
            EmailAttachment::DataUri { name, uri } => {
                let (mime_type, payload) = parse_data_uri(uri)?;
                OutgoingAttachment {
                    filename: name.clone(),
                    mime_type,
                    data: payload,
                }
            }
            EmailAttachment::Path(path) => {
                let data = tokio::fs::read(path).await?;
                let filename = std::path::Path::new(path)
                    .file_name()
                    .map_or_else(|| path.clone(), |n| n.to_string_lossy().into_owned());
                OutgoingAttachment {
                    mime_type: mime_type_for(&filename).to_string(),
                    filename,
                    data,
                }
            }
        });
    }

    Ok(resolved)
}

/// Splits `data:<mime>;base64,<payload>`.
fn parse_data_uri(uri: &str) -> Result<(String, Vec<u8>)> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| Error::Validation(format!("Not a data URI: {uri:?}")))?;
    let (mime_type, payload) = rest
        .split_once(";base64,")
        .ok_or_else(|| Error::Validation("Data URI must be base64".to_string()))?;
    Ok((mime_type.to_string(), decode_base64_lossy(payload)))
}

/// MIME type from a filename extension.
fn mime_type_for(filename: &str) -> &'static str {
    match filename.rsplit('.').next().unwrap_or("").to_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        "zip" => "application/zip",
        "json" => "application/json",
        "csv" => "text/csv",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn email() -> EmailToSend {
        EmailToSend::new(
            Sender::Address("a@x.com".to_string()),
            "b@y.com",
            "hello",
            "<p>hi</p>",
        )
    }

    #[test]
    fn compose_flattens_recipients() {
        let mut email = email();
        email.cc = vec![" c@y.com ".to_string()];
        email.bcc = vec!["d@y.com".to_string()];

        let (from, recipients, message) = compose(&email, Vec::new()).unwrap();
        assert_eq!(from.as_str(), "a@x.com");
        let addrs: Vec<&str> = recipients.iter().map(Address::as_str).collect();
        assert_eq!(addrs, vec!["b@y.com", "c@y.com", "d@y.com"]);

        // Bcc never appears in the headers
        let text = String::from_utf8_lossy(&message);
        assert!(!text.contains("d@y.com"));
        assert!(text.contains("Cc: c@y.com"));
    }

    #[test]
    fn compose_named_sender() {
        let mut email = email();
        email.sender = Sender::Named {
            name: "Alice".to_string(),
            address: "a@x.com".to_string(),
        };
        let (from, _, message) = compose(&email, Vec::new()).unwrap();
        assert_eq!(from.as_str(), "a@x.com");
        assert!(String::from_utf8_lossy(&message).contains("From: Alice <a@x.com>"));
    }

    #[test]
    fn oversized_attachment_rejected() {
        let attachment = OutgoingAttachment {
            filename: "big.bin".to_string(),
            mime_type: "application/octet-stream".to_string(),
            data: vec![0u8; MAX_ATTACHMENT_SIZE + 1],
        };
        let result = compose(&email(), vec![attachment]);
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn attachment_at_limit_accepted() {
        let attachment = OutgoingAttachment {
            filename: "ok.bin".to_string(),
            mime_type: "application/octet-stream".to_string(),
            data: vec![0u8; 1024],
        };
        assert!(compose(&email(), vec![attachment]).is_ok());
    }

    #[test]
    fn thread_for_requires_uid() {
        assert!(matches!(
            thread_for(&email(), "Re: "),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn reply_prefix_and_threading_headers() {
        let mut email = email();
        email.uid = Some(42);
        let threaded = thread_for(&email, "Re: ").unwrap();
        assert_eq!(threaded.subject, "Re: hello");
        assert!(
            threaded
                .metadata
                .contains(&("In-Reply-To".to_string(), "42".to_string()))
        );
        assert!(
            threaded
                .metadata
                .contains(&("References".to_string(), "42".to_string()))
        );
    }

    #[test]
    fn forward_prefix() {
        let mut email = email();
        email.uid = Some(7);
        let threaded = thread_for(&email, "Fwd: ").unwrap();
        assert_eq!(threaded.subject, "Fwd: hello");
    }

    #[test]
    fn data_uri_parsing() {
        let (mime, data) = parse_data_uri("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(data, b"hello");
    }

    #[test]
    fn data_uri_rejects_non_base64_form() {
        assert!(parse_data_uri("data:text/plain,hello").is_err());
        assert!(parse_data_uri("http://x/y.png").is_err());
    }

    #[test]
    fn mime_type_lookup() {
        assert_eq!(mime_type_for("a.png"), "image/png");
        assert_eq!(mime_type_for("report.PDF"), "application/pdf");
        assert_eq!(mime_type_for("unknown.xyz"), "application/octet-stream");
    }

    #[tokio::test]
    async fn resolve_raw_and_data_uri() {
        let resolved = resolve_attachments(&[
            EmailAttachment::Raw {
                name: "a.txt".to_string(),
                mime_type: "text/plain".to_string(),
                data: b"abc".to_vec(),
            },
            EmailAttachment::DataUri {
                name: "b.png".to_string(),
                uri: "data:image/png;base64,aGVsbG8=".to_string(),
            },
        ])
        .await
        .unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[1].mime_type, "image/png");
        assert_eq!(resolved[1].data, b"hello");
    }

    #[test]
    fn inline_data_image_rewritten_in_message() {
        let mut email = email();
        email.body =
            "<img src=\"data:image/png;base64,aGVsbG8=\">".to_string();
        let (_, _, message) = compose(&email, Vec::new()).unwrap();
        let text = String::from_utf8_lossy(&message);
        assert!(text.contains("multipart/related"));
        assert!(text.contains("Content-ID: <image0>"));
    }
}
