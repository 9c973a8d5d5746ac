//! RFC 5322 header handling.

use std::fmt;

use crate::encoding::{decode_rfc2047, encode_rfc2047};

/// An ordered collection of email headers.
///
/// Lookup is case-insensitive; insertion order is preserved so that
/// serialised messages keep a stable header layout.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Appends a header value.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Sets a header value, replacing any existing values with the same name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.entries
            .retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.entries.push((name, value.into()));
    }

    /// Gets the first value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Gets the first value for a header, decoded per RFC 2047.
    #[must_use]
    pub fn get_decoded(&self, name: &str) -> Option<String> {
        self.get(name)
            .map(|v| decode_rfc2047(v).unwrap_or_else(|_| v.to_string()))
    }

    /// Gets all values for a header.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Removes all values for a header.
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Returns an iterator over all `(name, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Returns true if no headers are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of header entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Parses headers from raw text.
    ///
    /// Folded continuation lines (leading space or tab) are joined with
    /// a single space. Parsing stops at the first empty line.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut headers = Self::new();
        let mut current: Option<(String, String)> = None;

        for line in text.lines() {
            if line.is_empty() {
                break;
            }

            if line.starts_with(' ') || line.starts_with('\t') {
                if let Some((_, value)) = current.as_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                continue;
            }

            if let Some((name, value)) = current.take() {
                headers.add(name, value.trim().to_string());
            }

            if let Some((name, value)) = line.split_once(':') {
                current = Some((name.trim().to_string(), value.trim().to_string()));
            }
        }

        if let Some((name, value)) = current {
            headers.add(name, value.trim().to_string());
        }

        headers
    }

    /// Appends a header with the value RFC 2047-encoded when needed.
    pub fn add_encoded(&mut self, name: impl Into<String>, value: &str) {
        self.add(name, encode_rfc2047(value, "utf-8"));
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.entries {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn add_and_get_case_insensitive() {
        let mut headers = Headers::new();
        headers.add("Subject", "Test");
        assert_eq!(headers.get("subject"), Some("Test"));
        assert_eq!(headers.get("SUBJECT"), Some("Test"));
    }

    #[test]
    fn set_replaces() {
        let mut headers = Headers::new();
        headers.add("To", "a@example.com");
        headers.add("To", "b@example.com");
        headers.set("To", "c@example.com");
        assert_eq!(headers.get_all("to"), vec!["c@example.com"]);
    }

    #[test]
    fn parse_simple() {
        let headers = Headers::parse("From: a@example.com\r\nSubject: Hi\r\n\r\nbody");
        assert_eq!(headers.get("from"), Some("a@example.com"));
        assert_eq!(headers.get("subject"), Some("Hi"));
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn parse_folded_continuation() {
        let headers = Headers::parse("Subject: a long\r\n subject line\r\n");
        assert_eq!(headers.get("subject"), Some("a long subject line"));
    }

    #[test]
    fn parse_stops_at_blank_line() {
        let headers = Headers::parse("From: a@example.com\r\n\r\nNot-A-Header: x\r\n");
        assert!(headers.get("not-a-header").is_none());
    }

    #[test]
    fn get_decoded_encoded_word() {
        let mut headers = Headers::new();
        headers.add("Subject", "=?utf-8?B?w4fDtnA=?=");
        assert_eq!(headers.get_decoded("subject").unwrap(), "Çöp");
    }

    #[test]
    fn display_serialises_crlf() {
        let mut headers = Headers::new();
        headers.add("From", "a@example.com");
        headers.add("To", "b@example.com");
        assert_eq!(
            headers.to_string(),
            "From: a@example.com\r\nTo: b@example.com\r\n"
        );
    }
}
