//! Outbound RFC 5322 message assembly.
//!
//! Builds the wire form of an outgoing email: headers, an HTML body with
//! inline `data:` images rewritten to `cid:` references, and base64
//! attachment parts. The resulting bytes are handed to the SMTP DATA
//! phase unchanged.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

use crate::content_type::ContentType;
use crate::encoding::{decode_base64_lossy, encode_base64};
use crate::error::{Error, Result};
use crate::header::Headers;

/// A file attachment for an outgoing message.
#[derive(Debug, Clone)]
pub struct OutgoingAttachment {
    /// Filename shown to the recipient.
    pub filename: String,
    /// MIME type (e.g. `application/pdf`).
    pub mime_type: String,
    /// Raw (not yet encoded) file bytes.
    pub data: Vec<u8>,
}

/// An inline image extracted from the HTML body.
#[derive(Debug, Clone)]
struct InlinePart {
    cid: String,
    mime_type: String,
    data: Vec<u8>,
}

/// Monotonic counter feeding boundary and Message-ID generation.
static UNIQUE: AtomicU64 = AtomicU64::new(0);

fn unique_token() -> String {
    let n = UNIQUE.fetch_add(1, Ordering::Relaxed);
    let ts = Utc::now().timestamp_micros();
    format!("{ts:x}.{n:x}")
}

/// Builder for outgoing MIME messages.
#[derive(Debug, Default)]
pub struct MessageBuilder {
    from: Option<String>,
    to: Vec<String>,
    cc: Vec<String>,
    subject: String,
    body_html: String,
    extra_headers: Headers,
    attachments: Vec<OutgoingAttachment>,
}

impl MessageBuilder {
    /// Creates a new empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the `From` header value (already display-formatted).
    #[must_use]
    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Adds a `To` recipient.
    #[must_use]
    pub fn to(mut self, to: impl Into<String>) -> Self {
        self.to.push(to.into());
        self
    }

    /// Adds a `Cc` recipient.
    #[must_use]
    pub fn cc(mut self, cc: impl Into<String>) -> Self {
        self.cc.push(cc.into());
        self
    }

    /// Sets the subject, RFC 2047-encoding it when needed.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Sets the HTML body.
    #[must_use]
    pub fn html_body(mut self, body: impl Into<String>) -> Self {
        self.body_html = body.into();
        self
    }

    /// Adds an arbitrary header (used for `In-Reply-To`/`References`).
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.add(name, value);
        self
    }

    /// Adds a file attachment.
    #[must_use]
    pub fn attachment(mut self, attachment: OutgoingAttachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Assembles the message into wire bytes.
    ///
    /// # Errors
    ///
    /// Returns an error when `From` or all recipients are missing.
    pub fn build(self) -> Result<Vec<u8>> {
        let from = self
            .from
            .ok_or_else(|| Error::MissingField("From".to_string()))?;
        if self.to.is_empty() {
            return Err(Error::MissingField("To".to_string()));
        }

        let (body, inline_parts) = extract_inline_images(&self.body_html);

        let mut headers = Headers::new();
        headers.add("From", from);
        headers.add("To", self.to.join(", "));
        if !self.cc.is_empty() {
            headers.add("Cc", self.cc.join(", "));
        }
        headers.add_encoded("Subject", &self.subject);
        headers.add("Date", Utc::now().format("%a, %d %b %Y %H:%M:%S +0000").to_string());
        headers.add("Message-ID", format!("<{}@openmail>", unique_token()));
        headers.add("MIME-Version", "1.0");
        for (name, value) in self.extra_headers.iter() {
            headers.add(name, value);
        }

        let html_part = render_html_part(&body);

        // Inline images group with the body under multipart/related;
        // attachments wrap the result under multipart/mixed.
        let content = if inline_parts.is_empty() {
            html_part
        } else {
            let boundary = format!("related-{}", unique_token());
            let mut parts = vec![html_part];
            for part in &inline_parts {
                parts.push(render_inline_part(part));
            }
            render_multipart("related", &boundary, &parts)
        };

        let message = if self.attachments.is_empty() {
            prepend_headers(&headers, &content)
        } else {
            let boundary = format!("mixed-{}", unique_token());
            let mut parts = vec![content];
            for attachment in &self.attachments {
                parts.push(render_attachment_part(attachment));
            }
            prepend_headers(&headers, &render_multipart("mixed", &boundary, &parts))
        };

        Ok(message)
    }
}

/// A rendered MIME entity: its own headers plus encoded body.
#[derive(Debug, Clone)]
struct Entity {
    headers: String,
    body: Vec<u8>,
}

fn render_html_part(body: &str) -> Entity {
    let mut headers = String::new();
    let _ = write!(
        headers,
        "Content-Type: {}\r\nContent-Transfer-Encoding: base64\r\n",
        ContentType::text_html()
    );
    Entity {
        headers,
        body: wrap_base64(body.as_bytes()),
    }
}

fn render_inline_part(part: &InlinePart) -> Entity {
    let mut headers = String::new();
    let _ = write!(
        headers,
        "Content-Type: {}\r\nContent-Transfer-Encoding: base64\r\nContent-ID: <{}>\r\nContent-Disposition: inline; filename=\"{}\"\r\n",
        part.mime_type, part.cid, part.cid
    );
    Entity {
        headers,
        body: wrap_base64(&part.data),
    }
}

fn render_attachment_part(attachment: &OutgoingAttachment) -> Entity {
    let mut headers = String::new();
    let _ = write!(
        headers,
        "Content-Type: {}; name=\"{}\"\r\nContent-Transfer-Encoding: base64\r\nContent-Disposition: attachment; filename=\"{}\"\r\n",
        attachment.mime_type, attachment.filename, attachment.filename
    );
    Entity {
        headers,
        body: wrap_base64(&attachment.data),
    }
}

fn render_multipart(subtype: &str, boundary: &str, parts: &[Entity]) -> Entity {
    let mut headers = String::new();
    let _ = write!(
        headers,
        "Content-Type: multipart/{subtype}; boundary=\"{boundary}\"\r\n"
    );

    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(part.headers.as_bytes());
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(&part.body);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

    Entity { headers, body }
}

fn prepend_headers(headers: &Headers, entity: &Entity) -> Vec<u8> {
    let mut message = Vec::new();
    message.extend_from_slice(headers.to_string().as_bytes());
    message.extend_from_slice(entity.headers.as_bytes());
    message.extend_from_slice(b"\r\n");
    message.extend_from_slice(&entity.body);
    message
}

/// Base64-encodes data with 76-column line wrapping.
fn wrap_base64(data: &[u8]) -> Vec<u8> {
    let encoded = encode_base64(data);
    let mut out = Vec::with_capacity(encoded.len() + encoded.len() / 76 * 2);
    for chunk in encoded.as_bytes().chunks(76) {
        out.extend_from_slice(chunk);
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// Rewrites `src="data:image/<ext>;base64,<payload>"` occurrences to
/// `src="cid:imageN"` and collects the decoded payloads.
fn extract_inline_images(html: &str) -> (String, Vec<InlinePart>) {
    const MARKER: &str = "src=\"data:image/";

    let mut body = String::with_capacity(html.len());
    let mut parts = Vec::new();
    let mut rest = html;
    let mut index = 0usize;

    while let Some(pos) = rest.find(MARKER) {
        let (before, after) = rest.split_at(pos);
        body.push_str(before);

        let after_marker = &after[MARKER.len()..];

        // <ext>;base64,<payload>"
        let Some((ext, tail)) = after_marker.split_once(";base64,") else {
            body.push_str(MARKER);
            rest = after_marker;
            continue;
        };
        let Some((payload, remaining)) = tail.split_once('"') else {
            body.push_str(MARKER);
            rest = after_marker;
            continue;
        };

        let cid = format!("image{index}");
        index += 1;
        let _ = write!(body, "src=\"cid:{cid}\"");
        parts.push(InlinePart {
            cid,
            mime_type: format!("image/{ext}"),
            data: decode_base64_lossy(payload),
        });
        rest = remaining;
    }

    body.push_str(rest);
    (body, parts)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const PNG_B64: &str = "iVBORw0KGgoAAAANSUhEUgAAAAUA";

    fn as_text(bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).into_owned()
    }

    #[test]
    fn build_requires_from() {
        let result = MessageBuilder::new().to("a@example.com").build();
        assert!(result.is_err());
    }

    #[test]
    fn build_requires_recipient() {
        let result = MessageBuilder::new().from("a@example.com").build();
        assert!(result.is_err());
    }

    #[test]
    fn plain_message_headers() {
        let bytes = MessageBuilder::new()
            .from("a@example.com")
            .to("b@example.com")
            .subject("hi")
            .html_body("x")
            .build()
            .unwrap();
        let text = as_text(&bytes);
        assert!(text.contains("From: a@example.com\r\n"));
        assert!(text.contains("To: b@example.com\r\n"));
        assert!(text.contains("Subject: hi\r\n"));
        assert!(text.contains("MIME-Version: 1.0\r\n"));
        assert!(text.contains("Content-Type: text/html"));
    }

    #[test]
    fn metadata_headers_carried() {
        let bytes = MessageBuilder::new()
            .from("a@example.com")
            .to("b@example.com")
            .subject("re")
            .html_body("x")
            .header("In-Reply-To", "42")
            .header("References", "42")
            .build()
            .unwrap();
        let text = as_text(&bytes);
        assert!(text.contains("In-Reply-To: 42\r\n"));
        assert!(text.contains("References: 42\r\n"));
    }

    #[test]
    fn inline_image_becomes_cid() {
        let html = format!("<img src=\"data:image/png;base64,{PNG_B64}\">");
        let bytes = MessageBuilder::new()
            .from("a@example.com")
            .to("b@example.com")
            .subject("img")
            .html_body(html)
            .build()
            .unwrap();
        let text = as_text(&bytes);
        assert!(text.contains("multipart/related"));
        assert!(text.contains("Content-ID: <image0>"));
        // The data URI itself must be gone from the body
        let body_b64 = encode_base64(b"<img src=\"cid:image0\">");
        assert!(text.contains(&body_b64[..20]));
    }

    #[test]
    fn two_inline_images_numbered() {
        let html = format!(
            "<img src=\"data:image/png;base64,{PNG_B64}\"><img src=\"data:image/gif;base64,{PNG_B64}\">"
        );
        let (body, parts) = extract_inline_images(&html);
        assert_eq!(parts.len(), 2);
        assert!(body.contains("cid:image0"));
        assert!(body.contains("cid:image1"));
        assert_eq!(parts[1].mime_type, "image/gif");
    }

    #[test]
    fn attachment_part_disposition() {
        let bytes = MessageBuilder::new()
            .from("a@example.com")
            .to("b@example.com")
            .subject("doc")
            .html_body("see attached")
            .attachment(OutgoingAttachment {
                filename: "report.pdf".to_string(),
                mime_type: "application/pdf".to_string(),
                data: vec![1, 2, 3],
            })
            .build()
            .unwrap();
        let text = as_text(&bytes);
        assert!(text.contains("multipart/mixed"));
        assert!(text.contains("Content-Disposition: attachment; filename=\"report.pdf\""));
    }

    #[test]
    fn non_ascii_subject_encoded() {
        let bytes = MessageBuilder::new()
            .from("a@example.com")
            .to("b@example.com")
            .subject("Çöp")
            .html_body("x")
            .build()
            .unwrap();
        let text = as_text(&bytes);
        assert!(text.contains("Subject: =?utf-8?B?"));
    }
}
