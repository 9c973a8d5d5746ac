//! SMTP wire types: replies, extensions, envelope addresses.

use std::collections::HashSet;

use crate::error::{Error, Result};

/// Envelope address (`MAIL FROM`/`RCPT TO` argument).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Creates an address after basic shape validation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for anything that is not
    /// `local@domain`.
    pub fn new(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        let (local, domain) = addr
            .split_once('@')
            .ok_or_else(|| Error::Validation(format!("Address must contain @: {addr:?}")))?;
        if local.is_empty() || domain.is_empty() || domain.contains('@') {
            return Err(Error::Validation(format!("Malformed address: {addr:?}")));
        }
        Ok(Self(addr))
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An SMTP reply: code plus one or more text lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Three-digit reply code.
    pub code: u16,
    /// Text lines, continuation markers stripped.
    pub lines: Vec<String>,
}

impl Reply {
    /// True for 2xx replies.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// True for 3xx intermediate replies.
    #[must_use]
    pub const fn is_intermediate(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    /// All lines joined for error reporting.
    #[must_use]
    pub fn text(&self) -> String {
        self.lines.join(" ")
    }
}

/// Reply codes the client branches on.
pub mod codes {
    /// Service ready.
    pub const READY: u16 = 220;
    /// Service closing.
    pub const CLOSING: u16 = 221;
    /// Requested action completed.
    pub const OK: u16 = 250;
    /// Continue with authentication.
    pub const AUTH_CONTINUE: u16 = 334;
    /// Start mail input.
    pub const START_DATA: u16 = 354;
    /// Credentials rejected.
    pub const AUTH_FAILED: u16 = 535;
}

/// Extensions discovered from the EHLO response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Extension {
    /// STARTTLS upgrade.
    StartTls,
    /// AUTH with its mechanisms.
    Auth(Vec<String>),
    /// SIZE limit.
    Size(Option<usize>),
    /// 8BITMIME.
    EightBitMime,
    /// PIPELINING.
    Pipelining,
    /// SMTPUTF8.
    SmtpUtf8,
    /// Anything else, keyword only.
    Other(String),
}

impl Extension {
    /// Parses one EHLO response line.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let mut words = line.split_whitespace();
        let keyword = words.next().unwrap_or("").to_uppercase();

        match keyword.as_str() {
            "STARTTLS" => Self::StartTls,
            "AUTH" => Self::Auth(words.map(str::to_uppercase).collect()),
            "SIZE" => Self::Size(words.next().and_then(|s| s.parse().ok())),
            "8BITMIME" => Self::EightBitMime,
            "PIPELINING" => Self::Pipelining,
            "SMTPUTF8" => Self::SmtpUtf8,
            _ => Self::Other(keyword),
        }
    }
}

/// What the server told us about itself.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Extensions from the latest EHLO.
    pub extensions: HashSet<Extension>,
}

impl ServerInfo {
    /// True when STARTTLS was announced.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.extensions.contains(&Extension::StartTls)
    }

    /// True when AUTH PLAIN was announced.
    #[must_use]
    pub fn supports_auth_plain(&self) -> bool {
        self.extensions.iter().any(|ext| {
            matches!(ext, Extension::Auth(mechs) if mechs.iter().any(|m| m == "PLAIN"))
        })
    }
}
