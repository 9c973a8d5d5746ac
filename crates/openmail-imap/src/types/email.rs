//! Email domain models produced by fetch operations.

use serde::{Deserialize, Serialize};

/// Attachment metadata, optionally with downloaded content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentInfo {
    /// Filename as declared by the sender.
    pub name: String,
    /// Size of the encoded part in bytes, when the server reported one.
    pub size: u32,
    /// MIME type (e.g. `application/pdf`).
    pub mime_type: String,
    /// Content-ID for inline parts, angle brackets stripped.
    pub cid: Option<String>,
    /// Base64 content; only present after an explicit download.
    pub data: Option<String>,
}

/// Summary of a message as shown in a list view.
///
/// Attachment bodies are never fetched for summaries, only their
/// metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailSummary {
    /// Message UID in its folder.
    pub uid: u32,
    /// Decoded `From` header.
    pub sender: String,
    /// Decoded `To` header.
    pub receiver: String,
    /// `Date` header as sent.
    pub date: String,
    /// Decoded subject.
    pub subject: String,
    /// Body preview, at most 100 characters.
    pub body_short: String,
    /// Flag names (`\`-prefixed for system flags).
    pub flags: Vec<String>,
    /// Attachment metadata.
    pub attachments: Vec<AttachmentInfo>,
}

/// A message with its full body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailWithContent {
    /// Message UID in its folder.
    pub uid: u32,
    /// Decoded `From` header.
    pub sender: String,
    /// Decoded `To` header.
    pub receiver: String,
    /// `Date` header as sent.
    pub date: String,
    /// Decoded subject.
    pub subject: String,
    /// Full body; HTML when available, with `cid:` references already
    /// resolved to `data:` URIs.
    pub body: String,
    /// Flag names.
    pub flags: Vec<String>,
    /// Attachment metadata (bodies not included).
    pub attachments: Vec<AttachmentInfo>,
    /// `Message-ID` header.
    pub message_id: String,
    /// `In-Reply-To` header.
    pub in_reply_to: String,
    /// `References` header.
    pub references: String,
}

/// One page of a folder listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MailboxPage {
    /// Folder the page was read from.
    pub folder: String,
    /// Summaries for the requested page, newest first.
    pub emails: Vec<EmailSummary>,
    /// Total (unpaged) number of matches.
    pub total: usize,
}

/// Flags attached to a single message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailFlags {
    /// Message UID.
    pub uid: u32,
    /// Flag names.
    pub flags: Vec<String>,
}

/// Session-scoped cache of the last `UID SEARCH`.
///
/// `uids` stays sorted descending (newest first); `get_emails` offsets
/// index into this list. Recreated on every search, dropped on folder
/// re-select and logout.
#[derive(Debug, Clone, Default)]
pub struct SearchedEmails {
    /// Folder the search ran in (decoded form).
    pub folder: String,
    /// The query string that was sent.
    pub query: String,
    /// Matching UIDs, sorted descending.
    pub uids: Vec<u32>,
}

impl SearchedEmails {
    /// Largest UID in the result, if any.
    #[must_use]
    pub fn max_uid(&self) -> Option<u32> {
        self.uids.first().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn searched_emails_max_uid() {
        let searched = SearchedEmails {
            folder: "INBOX".to_string(),
            query: "ALL".to_string(),
            uids: vec![9, 7, 3],
        };
        assert_eq!(searched.max_uid(), Some(9));
        assert_eq!(SearchedEmails::default().max_uid(), None);
    }
}
