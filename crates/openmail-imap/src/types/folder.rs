//! Folder (mailbox) types and special-use handling.

use crate::codec::decode_modified_utf7;

/// Maximum accepted folder name length.
pub const MAX_FOLDER_NAME_LEN: usize = 1024;

/// RFC 6154 special-use roles (plus `Inbox` and RFC 8457 `Important`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialUse {
    /// The inbox; always the literal `INBOX` mailbox.
    Inbox,
    /// All messages (virtual mailbox).
    All,
    /// Archived messages.
    Archive,
    /// Draft messages.
    Drafts,
    /// Flagged/starred messages (virtual mailbox).
    Flagged,
    /// Junk/spam messages.
    Junk,
    /// Sent messages.
    Sent,
    /// Deleted messages.
    Trash,
    /// Important messages (RFC 8457).
    Important,
}

impl SpecialUse {
    /// Parses a LIST attribute into a special-use role.
    #[must_use]
    pub fn parse(attribute: &str) -> Option<Self> {
        match attribute.to_uppercase().as_str() {
            "\\INBOX" => Some(Self::Inbox),
            "\\ALL" => Some(Self::All),
            "\\ARCHIVE" => Some(Self::Archive),
            "\\DRAFTS" => Some(Self::Drafts),
            "\\FLAGGED" => Some(Self::Flagged),
            "\\JUNK" | "\\SPAM" => Some(Self::Junk),
            "\\SENT" => Some(Self::Sent),
            "\\TRASH" => Some(Self::Trash),
            "\\IMPORTANT" => Some(Self::Important),
            _ => None,
        }
    }

    /// Standard display name, Inbox capitalised.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Inbox => "Inbox",
            Self::All => "All",
            Self::Archive => "Archive",
            Self::Drafts => "Drafts",
            Self::Flagged => "Flagged",
            Self::Junk => "Junk",
            Self::Sent => "Sent",
            Self::Trash => "Trash",
            Self::Important => "Important",
        }
    }
}

/// Non-role attributes from a LIST response that matter to the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FolderAttribute {
    /// Mailbox cannot be selected.
    NoSelect,
    /// Mailbox has children.
    HasChildren,
    /// Mailbox has no children.
    HasNoChildren,
    /// Special-use role.
    Role(SpecialUse),
    /// Anything else, kept verbatim.
    Other(String),
}

impl FolderAttribute {
    /// Parses a single LIST attribute.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if let Some(role) = SpecialUse::parse(s) {
            return Self::Role(role);
        }
        match s.to_uppercase().as_str() {
            "\\NOSELECT" => Self::NoSelect,
            "\\HASCHILDREN" => Self::HasChildren,
            "\\HASNOCHILDREN" => Self::HasNoChildren,
            _ => Self::Other(s.to_string()),
        }
    }
}

/// A folder as decoded from a LIST response.
///
/// Names are stored unquoted UTF-8; the modified UTF-7 wire form never
/// leaves the transport layer. Hierarchy delimiters are normalised to
/// `/` (Yandex reports `|`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    /// Decoded hierarchical path with `/` separators.
    pub path: String,
    /// Attributes from the LIST response.
    pub attributes: Vec<FolderAttribute>,
    /// Delimiter the server reported, if any.
    pub delimiter: Option<char>,
}

impl Folder {
    /// Builds a folder from raw LIST data.
    #[must_use]
    pub fn from_list(raw_name: &str, delimiter: Option<char>, attributes: Vec<FolderAttribute>) -> Self {
        let decoded = decode_modified_utf7(raw_name);
        let path = match delimiter {
            Some(d) if d != '/' => decoded.replace(d, "/"),
            _ => decoded,
        };
        Self {
            path,
            attributes,
            delimiter,
        }
    }

    /// Leaf name of the folder.
    #[must_use]
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// True when the folder cannot be selected.
    #[must_use]
    pub fn is_selectable(&self) -> bool {
        !self
            .attributes
            .iter()
            .any(|a| matches!(a, FolderAttribute::NoSelect))
    }

    /// Returns the special-use role carried in the LIST attributes.
    ///
    /// The literal `INBOX` path maps to `Inbox` even without an
    /// attribute, which most servers do not send for it.
    #[must_use]
    pub fn role(&self) -> Option<SpecialUse> {
        if self.path.eq_ignore_ascii_case("INBOX") {
            return Some(SpecialUse::Inbox);
        }
        self.attributes.iter().find_map(|a| match a {
            FolderAttribute::Role(role) => Some(*role),
            _ => None,
        })
    }

    /// Display name: `"<StandardName>:<ServerPath>"` for special-use
    /// folders when `tagged` is requested, the decoded path otherwise.
    #[must_use]
    pub fn tagged_name(&self, tagged: bool) -> String {
        if tagged && let Some(role) = self.role() {
            if role == SpecialUse::Inbox {
                return "Inbox".to_string();
            }
            return format!("{}:{}", role.name(), self.path);
        }
        self.path.clone()
    }
}

/// Validates a folder name for CREATE/RENAME and friends.
///
/// # Errors
///
/// Returns [`crate::Error::Validation`] when the name is empty or longer
/// than [`MAX_FOLDER_NAME_LEN`].
pub fn validate_folder_name(name: &str) -> crate::Result<()> {
    if name.trim().is_empty() {
        return Err(crate::Error::Validation(
            "Folder name cannot be empty".to_string(),
        ));
    }
    if name.len() > MAX_FOLDER_NAME_LEN {
        return Err(crate::Error::Validation(format!(
            "Folder name too long: {} chars (max {MAX_FOLDER_NAME_LEN})",
            name.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn special_use_parse_case_insensitive() {
        assert_eq!(SpecialUse::parse("\\Trash"), Some(SpecialUse::Trash));
        assert_eq!(SpecialUse::parse("\\TRASH"), Some(SpecialUse::Trash));
        assert_eq!(SpecialUse::parse("\\Spam"), Some(SpecialUse::Junk));
        assert_eq!(SpecialUse::parse("\\HasChildren"), None);
    }

    #[test]
    fn folder_decodes_utf7_name() {
        let folder = Folder::from_list("[Gmail]/&AMcA9g-p Kutusu", Some('/'), vec![]);
        assert_eq!(folder.path, "[Gmail]/Çöp Kutusu");
        assert_eq!(folder.name(), "Çöp Kutusu");
    }

    #[test]
    fn folder_normalises_pipe_delimiter() {
        let folder = Folder::from_list("Parent|Child", Some('|'), vec![]);
        assert_eq!(folder.path, "Parent/Child");
    }

    #[test]
    fn inbox_role_without_attribute() {
        let folder = Folder::from_list("INBOX", Some('/'), vec![]);
        assert_eq!(folder.role(), Some(SpecialUse::Inbox));
        assert_eq!(folder.tagged_name(true), "Inbox");
    }

    #[test]
    fn tagged_name_for_trash() {
        let folder = Folder::from_list(
            "[Gmail]/&AMcA9g-p Kutusu",
            Some('/'),
            vec![FolderAttribute::Role(SpecialUse::Trash)],
        );
        assert_eq!(folder.tagged_name(true), "Trash:[Gmail]/Çöp Kutusu");
        assert_eq!(folder.tagged_name(false), "[Gmail]/Çöp Kutusu");
    }

    #[test]
    fn noselect_not_selectable() {
        let folder = Folder::from_list("[Gmail]", Some('/'), vec![FolderAttribute::NoSelect]);
        assert!(!folder.is_selectable());
    }

    #[test]
    fn validate_rejects_empty() {
        assert!(validate_folder_name("").is_err());
        assert!(validate_folder_name("   ").is_err());
    }

    #[test]
    fn validate_rejects_oversized() {
        let name = "a".repeat(MAX_FOLDER_NAME_LEN + 1);
        assert!(validate_folder_name(&name).is_err());
    }

    #[test]
    fn validate_accepts_normal() {
        assert!(validate_folder_name("Projects/2024").is_ok());
    }
}
