//! SMTP command serialisation.

use crate::types::Address;

/// An SMTP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// EHLO greeting.
    Ehlo {
        /// Client hostname.
        hostname: String,
    },
    /// STARTTLS upgrade request.
    StartTls,
    /// AUTH with an initial response (RFC 4954).
    Auth {
        /// Mechanism name.
        mechanism: String,
        /// Base64 initial response.
        initial_response: String,
    },
    /// MAIL FROM.
    MailFrom {
        /// Envelope sender.
        from: Address,
    },
    /// RCPT TO.
    RcptTo {
        /// Envelope recipient.
        to: Address,
    },
    /// DATA.
    Data,
    /// RSET.
    Rset,
    /// QUIT.
    Quit,
}

impl Command {
    /// Serialises the command to wire bytes.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let line = match self {
            Self::Ehlo { hostname } => format!("EHLO {hostname}"),
            Self::StartTls => "STARTTLS".to_string(),
            Self::Auth {
                mechanism,
                initial_response,
            } => format!("AUTH {mechanism} {initial_response}"),
            Self::MailFrom { from } => format!("MAIL FROM:<{from}>"),
            Self::RcptTo { to } => format!("RCPT TO:<{to}>"),
            Self::Data => "DATA".to_string(),
            Self::Rset => "RSET".to_string(),
            Self::Quit => "QUIT".to_string(),
        };
        format!("{line}\r\n").into_bytes()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn ehlo() {
        let cmd = Command::Ehlo {
            hostname: "client.example.com".to_string(),
        };
        assert_eq!(cmd.serialize(), b"EHLO client.example.com\r\n");
    }

    #[test]
    fn mail_from_angle_brackets() {
        let cmd = Command::MailFrom {
            from: Address::new("a@b.com").unwrap(),
        };
        assert_eq!(cmd.serialize(), b"MAIL FROM:<a@b.com>\r\n");
    }

    #[test]
    fn rcpt_to() {
        let cmd = Command::RcptTo {
            to: Address::new("c@d.com").unwrap(),
        };
        assert_eq!(cmd.serialize(), b"RCPT TO:<c@d.com>\r\n");
    }

    #[test]
    fn auth_plain_with_initial_response() {
        let cmd = Command::Auth {
            mechanism: "PLAIN".to_string(),
            initial_response: "AHgAeQ==".to_string(),
        };
        assert_eq!(cmd.serialize(), b"AUTH PLAIN AHgAeQ==\r\n");
    }

    #[test]
    fn bare_commands() {
        assert_eq!(Command::Data.serialize(), b"DATA\r\n");
        assert_eq!(Command::Quit.serialize(), b"QUIT\r\n");
        assert_eq!(Command::Rset.serialize(), b"RSET\r\n");
        assert_eq!(Command::StartTls.serialize(), b"STARTTLS\r\n");
    }
}
