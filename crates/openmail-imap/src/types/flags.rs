//! Message flags and user-facing marks.

use crate::error::{Error, Result};

/// Message flags.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Flag {
    /// Message has been read.
    Seen,
    /// Message has been answered.
    Answered,
    /// Message is flagged for special attention.
    Flagged,
    /// Message is marked for deletion.
    Deleted,
    /// Message is a draft.
    Draft,
    /// Custom keyword flag (no backslash prefix on the wire).
    Keyword(String),
}

impl Flag {
    /// Parses a flag string as it appears in FETCH/FLAGS responses.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "\\SEEN" => Self::Seen,
            "\\ANSWERED" => Self::Answered,
            "\\FLAGGED" => Self::Flagged,
            "\\DELETED" => Self::Deleted,
            "\\DRAFT" => Self::Draft,
            _ => Self::Keyword(s.to_string()),
        }
    }

    /// Returns the flag as an IMAP string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Seen => "\\Seen",
            Self::Answered => "\\Answered",
            Self::Flagged => "\\Flagged",
            Self::Deleted => "\\Deleted",
            Self::Draft => "\\Draft",
            Self::Keyword(s) => s,
        }
    }

    /// True for the system flags (backslash-prefixed on the wire).
    #[must_use]
    pub const fn is_system(&self) -> bool {
        !matches!(self, Self::Keyword(_))
    }
}

impl std::fmt::Display for Flag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Collection of message flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flags {
    flags: Vec<Flag>,
}

impl Flags {
    /// Creates an empty flags collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates flags from a vector.
    #[must_use]
    pub fn from_vec(flags: Vec<Flag>) -> Self {
        Self { flags }
    }

    /// Adds a flag if not already present.
    pub fn insert(&mut self, flag: Flag) {
        if !self.flags.contains(&flag) {
            self.flags.push(flag);
        }
    }

    /// Removes a flag.
    pub fn remove(&mut self, flag: &Flag) {
        self.flags.retain(|f| f != flag);
    }

    /// Returns true if the flag is present.
    #[must_use]
    pub fn contains(&self, flag: &Flag) -> bool {
        self.flags.contains(flag)
    }

    /// Returns true if the message has been seen.
    #[must_use]
    pub fn is_seen(&self) -> bool {
        self.contains(&Flag::Seen)
    }

    /// Returns true if the message has been answered.
    #[must_use]
    pub fn is_answered(&self) -> bool {
        self.contains(&Flag::Answered)
    }

    /// Returns an iterator over the flags.
    pub fn iter(&self) -> impl Iterator<Item = &Flag> {
        self.flags.iter()
    }

    /// Returns the number of flags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// Returns true if there are no flags.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

impl IntoIterator for Flags {
    type Item = Flag;
    type IntoIter = std::vec::IntoIter<Flag>;

    fn into_iter(self) -> Self::IntoIter {
        self.flags.into_iter()
    }
}

/// A user-facing mark resolved to a flag plus add/remove direction.
///
/// Accepts `"seen"`, `"\Seen"`, and the `un`-prefixed removal forms
/// (`"unseen"`). Only marks a client is allowed to toggle resolve;
/// anything else is a validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mark {
    /// Flag named by the mark.
    pub flag: Flag,
    /// True when the mark removes the flag (`-FLAGS`).
    pub remove: bool,
}

impl Mark {
    /// Parses a mark string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for unsupported marks.
    pub fn parse(mark: &str) -> Result<Self> {
        let normalized = mark.trim().trim_start_matches('\\').to_lowercase();

        let (name, remove) = normalized
            .strip_prefix("un")
            .map_or((normalized.as_str(), false), |rest| (rest, true));

        // Deletion goes through delete_email, not a mark; drafts are
        // server-managed. Only the user-toggleable flags resolve.
        let flag = match name {
            "seen" => Flag::Seen,
            "answered" => Flag::Answered,
            "flagged" => Flag::Flagged,
            _ => return Err(Error::Validation(format!("Unsupported mark: {mark}"))),
        };

        Ok(Self { flag, remove })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parse_system_flags() {
        assert_eq!(Flag::parse("\\Seen"), Flag::Seen);
        assert_eq!(Flag::parse("\\SEEN"), Flag::Seen);
        assert_eq!(Flag::parse("\\Answered"), Flag::Answered);
        assert_eq!(Flag::parse("\\Deleted"), Flag::Deleted);
    }

    #[test]
    fn parse_keyword() {
        assert_eq!(
            Flag::parse("$Important"),
            Flag::Keyword("$Important".to_string())
        );
    }

    #[test]
    fn keyword_is_not_system() {
        assert!(Flag::Seen.is_system());
        assert!(!Flag::Keyword("x".to_string()).is_system());
    }

    #[test]
    fn flags_insert_unique() {
        let mut flags = Flags::new();
        flags.insert(Flag::Seen);
        flags.insert(Flag::Seen);
        assert_eq!(flags.len(), 1);
    }

    #[test]
    fn flags_remove() {
        let mut flags = Flags::from_vec(vec![Flag::Seen, Flag::Answered]);
        flags.remove(&Flag::Seen);
        assert!(!flags.is_seen());
        assert!(flags.is_answered());
    }

    #[test]
    fn mark_parse_plain() {
        let mark = Mark::parse("seen").unwrap();
        assert_eq!(mark.flag, Flag::Seen);
        assert!(!mark.remove);
    }

    #[test]
    fn mark_parse_backslash_form() {
        let mark = Mark::parse("\\Flagged").unwrap();
        assert_eq!(mark.flag, Flag::Flagged);
        assert!(!mark.remove);
    }

    #[test]
    fn mark_parse_un_prefix() {
        let mark = Mark::parse("unseen").unwrap();
        assert_eq!(mark.flag, Flag::Seen);
        assert!(mark.remove);
    }

    #[test]
    fn mark_parse_unsupported() {
        assert!(Mark::parse("spam").is_err());
        assert!(Mark::parse("deleted").is_err());
    }
}
