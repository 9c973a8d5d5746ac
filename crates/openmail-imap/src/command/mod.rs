//! IMAP command builder and serialisation.
//!
//! Folder names are modified-UTF-7 encoded and always double-quoted on
//! the wire; in-memory names stay unquoted UTF-8. `DONE` is the only
//! command serialised without a tag.

mod tag;

pub use tag::TagGenerator;

use crate::codec::encode_modified_utf7;
use crate::types::{Flag, SequenceSet};

/// Items requested from a UID FETCH.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchItem {
    /// Message flags.
    Flags,
    /// Message UID.
    Uid,
    /// Message size in octets.
    Rfc822Size,
    /// MIME structure.
    BodyStructure,
    /// Selected header fields, fetched with PEEK.
    HeaderFields(Vec<String>),
    /// A body section.
    BodySection {
        /// Part number (`"1.2"`) or special section; `None` is the whole body.
        section: Option<String>,
        /// Use BODY.PEEK to avoid setting `\Seen`.
        peek: bool,
        /// Partial fetch `<start.length>`.
        partial: Option<(u32, u32)>,
    },
}

/// An IMAP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// CAPABILITY command.
    Capability,
    /// LOGIN with literal credentials.
    Login {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
    /// AUTHENTICATE with an initial SASL response (RFC 4959 SASL-IR).
    Authenticate {
        /// Mechanism name (e.g. `PLAIN`).
        mechanism: String,
        /// Base64 initial response.
        initial_response: String,
    },
    /// ENABLE a capability (e.g. `UTF8=ACCEPT`).
    Enable {
        /// Capability to enable.
        capability: String,
    },
    /// LOGOUT command.
    Logout,
    /// SELECT (read-write) or EXAMINE (read-only) a folder.
    Select {
        /// Folder path (decoded form).
        folder: String,
        /// Use EXAMINE instead of SELECT.
        readonly: bool,
    },
    /// CLOSE the selected folder.
    Close,
    /// LIST folders.
    List {
        /// Reference name.
        reference: String,
        /// Mailbox pattern.
        pattern: String,
    },
    /// CREATE a folder.
    Create {
        /// Folder path.
        folder: String,
    },
    /// DELETE a folder.
    Delete {
        /// Folder path.
        folder: String,
    },
    /// RENAME a folder.
    Rename {
        /// Current path.
        from: String,
        /// New path.
        to: String,
    },
    /// EXPUNGE deleted messages.
    Expunge,
    /// UID SEARCH with a prebuilt query.
    UidSearch {
        /// RFC 9051 search program.
        query: String,
    },
    /// UID FETCH.
    UidFetch {
        /// Sequence set.
        set: SequenceSet,
        /// Items to fetch.
        items: Vec<FetchItem>,
    },
    /// UID STORE +FLAGS / -FLAGS.
    UidStore {
        /// Sequence set.
        set: SequenceSet,
        /// Add (`+FLAGS`) when true, remove (`-FLAGS`) otherwise.
        add: bool,
        /// Flags to store.
        flags: Vec<Flag>,
    },
    /// UID COPY to another folder.
    UidCopy {
        /// Sequence set.
        set: SequenceSet,
        /// Destination folder path.
        folder: String,
    },
    /// UID MOVE to another folder.
    UidMove {
        /// Sequence set.
        set: SequenceSet,
        /// Destination folder path.
        folder: String,
    },
    /// Enter IDLE.
    Idle,
    /// Leave IDLE (sent without a tag).
    Done,
}

impl Command {
    /// Serialises the command to wire bytes with the given tag.
    #[must_use]
    pub fn serialize(&self, tag: &str) -> Vec<u8> {
        let mut buf = Vec::new();

        if !matches!(self, Self::Done) {
            buf.extend_from_slice(tag.as_bytes());
            buf.push(b' ');
        }

        match self {
            Self::Capability => buf.extend_from_slice(b"CAPABILITY"),
            Self::Logout => buf.extend_from_slice(b"LOGOUT"),
            Self::Close => buf.extend_from_slice(b"CLOSE"),
            Self::Expunge => buf.extend_from_slice(b"EXPUNGE"),
            Self::Idle => buf.extend_from_slice(b"IDLE"),
            Self::Done => buf.extend_from_slice(b"DONE"),

            Self::Login { username, password } => {
                buf.extend_from_slice(b"LOGIN ");
                write_astring(&mut buf, username);
                buf.push(b' ');
                write_astring(&mut buf, password);
            }

            Self::Authenticate {
                mechanism,
                initial_response,
            } => {
                buf.extend_from_slice(b"AUTHENTICATE ");
                buf.extend_from_slice(mechanism.as_bytes());
                buf.push(b' ');
                buf.extend_from_slice(initial_response.as_bytes());
            }

            Self::Enable { capability } => {
                buf.extend_from_slice(b"ENABLE ");
                buf.extend_from_slice(capability.as_bytes());
            }

            Self::Select { folder, readonly } => {
                buf.extend_from_slice(if *readonly { b"EXAMINE " } else { b"SELECT " });
                write_folder(&mut buf, folder);
            }

            Self::List { reference, pattern } => {
                buf.extend_from_slice(b"LIST ");
                write_quoted(&mut buf, reference);
                buf.push(b' ');
                write_quoted(&mut buf, pattern);
            }

            Self::Create { folder } => {
                buf.extend_from_slice(b"CREATE ");
                write_folder(&mut buf, folder);
            }

            Self::Delete { folder } => {
                buf.extend_from_slice(b"DELETE ");
                write_folder(&mut buf, folder);
            }

            Self::Rename { from, to } => {
                buf.extend_from_slice(b"RENAME ");
                write_folder(&mut buf, from);
                buf.push(b' ');
                write_folder(&mut buf, to);
            }

            Self::UidSearch { query } => {
                buf.extend_from_slice(b"UID SEARCH ");
                buf.extend_from_slice(query.as_bytes());
            }

            Self::UidFetch { set, items } => {
                buf.extend_from_slice(b"UID FETCH ");
                buf.extend_from_slice(set.to_string().as_bytes());
                buf.push(b' ');
                write_fetch_items(&mut buf, items);
            }

            Self::UidStore { set, add, flags } => {
                buf.extend_from_slice(b"UID STORE ");
                buf.extend_from_slice(set.to_string().as_bytes());
                buf.extend_from_slice(if *add { b" +FLAGS (" } else { b" -FLAGS (" });
                for (i, flag) in flags.iter().enumerate() {
                    if i > 0 {
                        buf.push(b' ');
                    }
                    buf.extend_from_slice(flag.as_str().as_bytes());
                }
                buf.push(b')');
            }

            Self::UidCopy { set, folder } => {
                buf.extend_from_slice(b"UID COPY ");
                buf.extend_from_slice(set.to_string().as_bytes());
                buf.push(b' ');
                write_folder(&mut buf, folder);
            }

            Self::UidMove { set, folder } => {
                buf.extend_from_slice(b"UID MOVE ");
                buf.extend_from_slice(set.to_string().as_bytes());
                buf.push(b' ');
                write_folder(&mut buf, folder);
            }
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }
}

/// Writes an astring: bare atom when safe, quoted otherwise.
fn write_astring(buf: &mut Vec<u8>, s: &str) {
    if s.is_empty() || s.bytes().any(needs_quoting) {
        write_quoted(buf, s);
    } else {
        buf.extend_from_slice(s.as_bytes());
    }
}

/// Writes a quoted string, escaping `"` and `\`.
fn write_quoted(buf: &mut Vec<u8>, s: &str) {
    buf.push(b'"');
    for b in s.bytes() {
        if b == b'"' || b == b'\\' {
            buf.push(b'\\');
        }
        buf.push(b);
    }
    buf.push(b'"');
}

/// Writes a folder name: modified UTF-7 encoded, always quoted.
fn write_folder(buf: &mut Vec<u8>, folder: &str) {
    write_quoted(buf, &encode_modified_utf7(folder));
}

const fn needs_quoting(b: u8) -> bool {
    matches!(b, b' ' | b'"' | b'\\' | b'(' | b')' | b'{' | b'%' | b'*') || b < 0x20 || b == 0x7F
}

fn write_fetch_items(buf: &mut Vec<u8>, items: &[FetchItem]) {
    buf.push(b'(');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            buf.push(b' ');
        }
        match item {
            FetchItem::Flags => buf.extend_from_slice(b"FLAGS"),
            FetchItem::Uid => buf.extend_from_slice(b"UID"),
            FetchItem::Rfc822Size => buf.extend_from_slice(b"RFC822.SIZE"),
            FetchItem::BodyStructure => buf.extend_from_slice(b"BODYSTRUCTURE"),
            FetchItem::HeaderFields(fields) => {
                buf.extend_from_slice(b"BODY.PEEK[HEADER.FIELDS (");
                buf.extend_from_slice(fields.join(" ").as_bytes());
                buf.extend_from_slice(b")]");
            }
            FetchItem::BodySection {
                section,
                peek,
                partial,
            } => {
                buf.extend_from_slice(if *peek { b"BODY.PEEK[" } else { b"BODY[" });
                if let Some(s) = section {
                    buf.extend_from_slice(s.as_bytes());
                }
                buf.push(b']');
                if let Some((start, len)) = partial {
                    buf.extend_from_slice(format!("<{start}.{len}>").as_bytes());
                }
            }
        }
    }
    buf.push(b')');
}
