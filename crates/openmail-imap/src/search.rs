//! Search criteria and RFC 9051 query generation.
//!
//! Multi-valued address fields are emitted as balanced binary `OR`
//! trees so deep nesting never degenerates into a right-leaning chain
//! the server has to recurse through; n values always produce exactly
//! n−1 `OR` nodes.

use crate::codec::to_imap_date;
use crate::error::Result;

/// Structured search criteria. All fields optional; empty criteria
/// searches `ALL`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchCriteria {
    /// `FROM` matches (OR-ed together when more than one).
    pub senders: Vec<String>,
    /// `TO` matches.
    pub receivers: Vec<String>,
    /// `CC` matches.
    pub cc: Vec<String>,
    /// `BCC` matches.
    pub bcc: Vec<String>,
    /// `SUBJECT` substring.
    pub subject: Option<String>,
    /// `SINCE` date, ISO form (`YYYY-MM-DD`).
    pub since: Option<String>,
    /// `BEFORE` date, ISO form.
    pub before: Option<String>,
    /// Body/header text that must be present.
    pub include: Option<String>,
    /// Body/header text that must be absent.
    pub exclude: Option<String>,
    /// Flags that must be set.
    pub included_flags: Vec<String>,
    /// Flags that must not be set.
    pub excluded_flags: Vec<String>,
    /// Require attachments.
    ///
    /// Server-side approximation: emits `TEXT "ATTACHMENT"`, which also
    /// matches the word in body text. Callers needing exactness
    /// post-filter fetched pages on BODYSTRUCTURE.
    pub has_attachments: bool,
    /// Minimum size in octets (`LARGER`).
    pub larger_than: Option<u32>,
    /// Maximum size in octets (`SMALLER`).
    pub smaller_than: Option<u32>,
}

/// A search input: structured criteria, free text, or everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchQuery {
    /// Match every message.
    All,
    /// Free text, emitted as `TEXT "…"`.
    Text(String),
    /// Structured criteria.
    Criteria(SearchCriteria),
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self::All
    }
}

impl From<SearchCriteria> for SearchQuery {
    fn from(criteria: SearchCriteria) -> Self {
        Self::Criteria(criteria)
    }
}

impl From<&str> for SearchQuery {
    fn from(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("ALL") {
            Self::All
        } else {
            Self::Text(trimmed.to_string())
        }
    }
}

impl SearchQuery {
    /// Builds the RFC 9051 search program.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed dates.
    pub fn build(&self) -> Result<String> {
        match self {
            Self::All => Ok("ALL".to_string()),
            Self::Text(text) => Ok(format!("TEXT {}", quote(text))),
            Self::Criteria(criteria) => criteria.build(),
        }
    }
}

impl SearchCriteria {
    /// Builds the RFC 9051 search program; empty criteria yield `ALL`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed `since`/`before` dates.
    pub fn build(&self) -> Result<String> {
        let mut parts: Vec<String> = Vec::new();

        push_address_field(&mut parts, "FROM", &self.senders);
        push_address_field(&mut parts, "TO", &self.receivers);
        push_address_field(&mut parts, "CC", &self.cc);
        push_address_field(&mut parts, "BCC", &self.bcc);

        if let Some(subject) = non_empty(&self.subject) {
            parts.push(format!("(SUBJECT {})", quote(subject)));
        }
        if let Some(since) = non_empty(&self.since) {
            parts.push(format!("(SINCE {})", to_imap_date(since)?));
        }
        if let Some(before) = non_empty(&self.before) {
            parts.push(format!("(BEFORE {})", to_imap_date(before)?));
        }
        if let Some(include) = non_empty(&self.include) {
            parts.push(format!("(TEXT {})", quote(include)));
        }
        if let Some(exclude) = non_empty(&self.exclude) {
            parts.push(format!("(NOT TEXT {})", quote(exclude)));
        }

        for flag in &self.included_flags {
            parts.push(flag_term(flag, false));
        }
        for flag in &self.excluded_flags {
            parts.push(flag_term(flag, true));
        }

        if self.has_attachments {
            parts.push("(TEXT \"ATTACHMENT\")".to_string());
        }
        if let Some(larger) = self.larger_than.filter(|&n| n > 0) {
            parts.push(format!("(LARGER {larger})"));
        }
        if let Some(smaller) = self.smaller_than.filter(|&n| n > 0) {
            parts.push(format!("(SMALLER {smaller})"));
        }

        if parts.is_empty() {
            return Ok("ALL".to_string());
        }
        Ok(parts.join(" "))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

/// Emits one address criterion, OR-ing multiple values as a balanced
/// binary tree.
fn push_address_field(parts: &mut Vec<String>, key: &str, values: &[String]) {
    let values: Vec<&str> = values
        .iter()
        .map(String::as_str)
        .filter(|v| !v.trim().is_empty())
        .collect();

    match values.as_slice() {
        [] => {}
        [single] => parts.push(format!("({key} {})", quote(single))),
        many => parts.push(format!("({})", or_tree(key, many))),
    }
}

/// Builds `OR (left) (right)` recursively, splitting at the midpoint.
fn or_tree(key: &str, values: &[&str]) -> String {
    if let [single] = values {
        return format!("{key} {}", quote(single));
    }
    let mid = values.len() / 2;
    format!(
        "OR ({}) ({})",
        or_tree(key, &values[..mid]),
        or_tree(key, &values[mid..])
    )
}

/// Emits a flag criterion: bare for system flags (`SEEN`, `UNSEEN` when
/// excluded), `KEYWORD`/`UNKEYWORD` for custom flags. System flags are
/// recognised with or without the backslash prefix.
fn flag_term(flag: &str, excluded: bool) -> String {
    let name = flag.trim_start_matches('\\').to_uppercase();
    let is_system = matches!(
        name.as_str(),
        "SEEN" | "ANSWERED" | "FLAGGED" | "DELETED" | "DRAFT"
    );

    if is_system {
        if excluded {
            format!("UN{name}")
        } else {
            name
        }
    } else if excluded {
        format!("UNKEYWORD {flag}")
    } else {
        format!("KEYWORD {flag}")
    }
}

/// Quotes a search value, escaping embedded quotes and backslashes.
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_criteria_is_all() {
        assert_eq!(SearchCriteria::default().build().unwrap(), "ALL");
    }

    #[test]
    fn free_text_becomes_text_term() {
        let query = SearchQuery::from("invoice");
        assert_eq!(query.build().unwrap(), "TEXT \"invoice\"");
    }

    #[test]
    fn all_string_stays_all() {
        assert_eq!(SearchQuery::from("ALL").build().unwrap(), "ALL");
        assert_eq!(SearchQuery::from("  ").build().unwrap(), "ALL");
    }

    #[test]
    fn single_sender() {
        let criteria = SearchCriteria {
            senders: vec!["a@example.com".to_string()],
            ..Default::default()
        };
        assert_eq!(criteria.build().unwrap(), "(FROM \"a@example.com\")");
    }

    #[test]
    fn two_senders_one_or() {
        let criteria = SearchCriteria {
            senders: vec!["a@x.com".to_string(), "b@x.com".to_string()],
            ..Default::default()
        };
        let query = criteria.build().unwrap();
        assert_eq!(query, "(OR (FROM \"a@x.com\") (FROM \"b@x.com\"))");
    }

    #[test]
    fn or_token_count_is_n_minus_one() {
        for n in 2..=8 {
            let criteria = SearchCriteria {
                senders: (0..n).map(|i| format!("s{i}@x.com")).collect(),
                ..Default::default()
            };
            let query = criteria.build().unwrap();
            let count = query.matches("OR ").count();
            assert_eq!(count, n - 1, "n={n}: {query}");
        }
    }

    #[test]
    fn three_senders_balanced_shape() {
        let criteria = SearchCriteria {
            senders: vec!["a@x".to_string(), "b@x".to_string(), "c@x".to_string()],
            ..Default::default()
        };
        assert_eq!(
            criteria.build().unwrap(),
            "(OR (FROM \"a@x\") (OR (FROM \"b@x\") (FROM \"c@x\")))"
        );
    }

    #[test]
    fn dates_reformatted() {
        let criteria = SearchCriteria {
            since: Some("2024-01-05".to_string()),
            before: Some("2024-02-01".to_string()),
            ..Default::default()
        };
        assert_eq!(
            criteria.build().unwrap(),
            "(SINCE 05-Jan-2024) (BEFORE 01-Feb-2024)"
        );
    }

    #[test]
    fn invalid_date_rejected() {
        let criteria = SearchCriteria {
            since: Some("garbage".to_string()),
            ..Default::default()
        };
        assert!(criteria.build().is_err());
    }

    #[test]
    fn include_and_exclude_text() {
        let criteria = SearchCriteria {
            include: Some("hello".to_string()),
            exclude: Some("spam".to_string()),
            ..Default::default()
        };
        assert_eq!(
            criteria.build().unwrap(),
            "(TEXT \"hello\") (NOT TEXT \"spam\")"
        );
    }

    #[test]
    fn system_flags_bare() {
        let criteria = SearchCriteria {
            included_flags: vec!["\\Seen".to_string(), "Flagged".to_string()],
            ..Default::default()
        };
        assert_eq!(criteria.build().unwrap(), "SEEN FLAGGED");
    }

    #[test]
    fn excluded_system_flag_gets_un_prefix() {
        let criteria = SearchCriteria {
            excluded_flags: vec!["\\Seen".to_string()],
            ..Default::default()
        };
        assert_eq!(criteria.build().unwrap(), "UNSEEN");
    }

    #[test]
    fn custom_flags_use_keyword() {
        let criteria = SearchCriteria {
            included_flags: vec!["$Work".to_string()],
            excluded_flags: vec!["$Junk".to_string()],
            ..Default::default()
        };
        assert_eq!(criteria.build().unwrap(), "KEYWORD $Work UNKEYWORD $Junk");
    }

    #[test]
    fn attachments_approximation() {
        let criteria = SearchCriteria {
            has_attachments: true,
            ..Default::default()
        };
        assert_eq!(criteria.build().unwrap(), "(TEXT \"ATTACHMENT\")");
    }

    #[test]
    fn size_bounds() {
        let criteria = SearchCriteria {
            larger_than: Some(1024),
            smaller_than: Some(4096),
            ..Default::default()
        };
        assert_eq!(criteria.build().unwrap(), "(LARGER 1024) (SMALLER 4096)");
    }

    #[test]
    fn quote_escapes_embedded_quotes() {
        let criteria = SearchCriteria {
            subject: Some("say \"hi\"".to_string()),
            ..Default::default()
        };
        assert_eq!(
            criteria.build().unwrap(),
            "(SUBJECT \"say \\\"hi\\\"\")"
        );
    }
}
