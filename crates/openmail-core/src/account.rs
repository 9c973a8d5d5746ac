//! Account model with host auto-derivation.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default IMAP port (implicit TLS).
pub const IMAP_PORT: u16 = 993;

/// Default SMTP submission port (STARTTLS).
pub const SMTP_PORT: u16 = 587;

/// An email account: address, secret handle, and server endpoints.
///
/// Hosts are auto-derived from the address domain for the well-known
/// providers; anything else must supply them explicitly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Account {
    /// Email address (also the login username).
    pub address: String,
    /// Password or app password.
    pub password: String,
    /// IMAP hostname.
    pub imap_host: String,
    /// IMAP port.
    pub imap_port: u16,
    /// SMTP hostname.
    pub smtp_host: String,
    /// SMTP port.
    pub smtp_port: u16,
}

impl Account {
    /// Builds an account, deriving hosts from the address domain.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown domain; use
    /// [`Account::with_hosts`] for such providers.
    pub fn new(address: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        let address = address.into();
        let domain = address
            .rsplit_once('@')
            .map(|(_, domain)| domain.to_lowercase())
            .ok_or_else(|| Error::Account(format!("Not an email address: {address:?}")))?;

        let (imap_host, smtp_host) = match domain.as_str() {
            "gmail.com" => ("imap.gmail.com", "smtp.gmail.com"),
            "yahoo.com" => ("imap.mail.yahoo.com", "smtp.mail.yahoo.com"),
            "outlook.com" | "hotmail.com" => ("outlook.office365.com", "smtp-mail.outlook.com"),
            "yandex.com" => ("imap.yandex.com", "smtp.yandex.com"),
            other => {
                return Err(Error::Account(format!(
                    "No known servers for domain {other:?}; supply hosts explicitly"
                )));
            }
        };

        Ok(Self {
            address,
            password: password.into(),
            imap_host: imap_host.to_string(),
            imap_port: IMAP_PORT,
            smtp_host: smtp_host.to_string(),
            smtp_port: SMTP_PORT,
        })
    }

    /// Builds an account with explicit hosts.
    #[must_use]
    pub fn with_hosts(
        address: impl Into<String>,
        password: impl Into<String>,
        imap_host: impl Into<String>,
        smtp_host: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            password: password.into(),
            imap_host: imap_host.into(),
            imap_port: IMAP_PORT,
            smtp_host: smtp_host.into(),
            smtp_port: SMTP_PORT,
        }
    }
}
