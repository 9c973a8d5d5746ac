//! MIME content type handling.

use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};

/// MIME content type with parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Main type (e.g., "text", "image", "multipart").
    pub main_type: String,
    /// Subtype (e.g., "plain", "html", "png").
    pub sub_type: String,
    /// Parameters (e.g., charset=utf-8, boundary=xxx, name=file.pdf).
    pub parameters: HashMap<String, String>,
}

impl ContentType {
    /// Creates a new content type.
    #[must_use]
    pub fn new(main_type: impl Into<String>, sub_type: impl Into<String>) -> Self {
        Self {
            main_type: main_type.into().to_lowercase(),
            sub_type: sub_type.into().to_lowercase(),
            parameters: HashMap::new(),
        }
    }

    /// Creates a `text/plain; charset=utf-8` content type.
    #[must_use]
    pub fn text_plain() -> Self {
        Self::new("text", "plain").with_parameter("charset", "utf-8")
    }

    /// Creates a `text/html; charset=utf-8` content type.
    #[must_use]
    pub fn text_html() -> Self {
        Self::new("text", "html").with_parameter("charset", "utf-8")
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters
            .insert(key.into().to_lowercase(), value.into());
        self
    }

    /// Parses a `Content-Type` header value.
    ///
    /// # Errors
    ///
    /// Returns an error when the value has no `type/subtype` shape.
    pub fn parse(value: &str) -> Result<Self> {
        let mut sections = value.split(';');
        let mime = sections
            .next()
            .ok_or_else(|| Error::InvalidContentType(value.to_string()))?;

        let (main_type, sub_type) = mime
            .trim()
            .split_once('/')
            .ok_or_else(|| Error::InvalidContentType(value.to_string()))?;

        let mut ct = Self::new(main_type.trim(), sub_type.trim());

        for section in sections {
            if let Some((key, val)) = section.split_once('=') {
                let val = val.trim().trim_matches('"');
                ct.parameters
                    .insert(key.trim().to_lowercase(), val.to_string());
            }
        }

        Ok(ct)
    }

    /// Returns `type/subtype` in lowercase.
    #[must_use]
    pub fn mime_type(&self) -> String {
        format!("{}/{}", self.main_type, self.sub_type)
    }

    /// Returns true for any `multipart/*` type.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.main_type == "multipart"
    }

    /// Returns the charset parameter, if present.
    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.parameters.get("charset").map(String::as_str)
    }

    /// Returns the boundary parameter, if present.
    #[must_use]
    pub fn boundary(&self) -> Option<&str> {
        self.parameters.get("boundary").map(String::as_str)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.main_type, self.sub_type)?;
        // Sorted for a stable serialisation
        let mut params: Vec<_> = self.parameters.iter().collect();
        params.sort();
        for (key, value) in params {
            write!(f, "; {key}=\"{value}\"")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple() {
        let ct = ContentType::parse("text/plain").unwrap();
        assert_eq!(ct.main_type, "text");
        assert_eq!(ct.sub_type, "plain");
    }

    #[test]
    fn parse_with_charset() {
        let ct = ContentType::parse("text/html; charset=UTF-8").unwrap();
        assert_eq!(ct.mime_type(), "text/html");
        assert_eq!(ct.charset(), Some("UTF-8"));
    }

    #[test]
    fn parse_quoted_boundary() {
        let ct = ContentType::parse("multipart/mixed; boundary=\"abc 123\"").unwrap();
        assert!(ct.is_multipart());
        assert_eq!(ct.boundary(), Some("abc 123"));
    }

    #[test]
    fn parse_rejects_no_slash() {
        assert!(ContentType::parse("garbage").is_err());
    }

    #[test]
    fn case_normalised() {
        let ct = ContentType::parse("Text/HTML").unwrap();
        assert_eq!(ct.mime_type(), "text/html");
    }

    #[test]
    fn display_round_trip() {
        let ct = ContentType::text_plain();
        let reparsed = ContentType::parse(&ct.to_string()).unwrap();
        assert_eq!(reparsed, ct);
    }
}
