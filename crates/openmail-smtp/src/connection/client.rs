//! Type-state SMTP client.
//!
//! Protocol phases are encoded in the type: `rcpt_to` is simply not
//! callable before `mail_from` has succeeded, and `send_message`
//! requires at least one accepted recipient. Each transition consumes
//! the client and returns it in the next state; an error consumes the
//! connection, which matches SMTP's own rule that a failed exchange
//! leaves the transaction state unknown.
//!
//! The stream is generic so the whole machine runs against mock
//! streams in tests; only the STARTTLS upgrade is pinned to
//! [`SmtpStream`].

use std::marker::PhantomData;

use base64::Engine as _;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::{is_last_reply_line, parse_reply};
use crate::types::{Address, Extension, Reply, ServerInfo, codes};

use super::stream::SmtpStream;

/// Upper bound for one reply line.
const MAX_LINE_LENGTH: usize = 8192;

/// Type-state marker: greeting consumed, not authenticated.
#[derive(Debug)]
pub struct Connected;

/// Type-state marker: AUTH accepted.
#[derive(Debug)]
pub struct Authenticated;

/// Type-state marker: MAIL FROM accepted.
#[derive(Debug)]
pub struct MailTransaction;

/// Type-state marker: at least one RCPT TO accepted.
#[derive(Debug)]
pub struct RecipientAdded;

/// Type-state marker: DATA accepted, ready for the payload.
#[derive(Debug)]
pub struct Data;

/// SMTP client over a stream, parameterised by protocol state.
pub struct Client<S, State> {
    stream: S,
    buf: BytesMut,
    server: ServerInfo,
    _state: PhantomData<State>,
}

impl<S> Client<S, Connected>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an open stream and consumes the `220` greeting.
    ///
    /// # Errors
    ///
    /// Returns an error when the greeting is missing or negative.
    pub async fn from_stream(stream: S) -> Result<Self> {
        let mut client = Self {
            stream,
            buf: BytesMut::with_capacity(MAX_LINE_LENGTH),
            server: ServerInfo::default(),
            _state: PhantomData,
        };

        let greeting = client.read_reply().await?;
        if greeting.code != codes::READY {
            return Err(Error::smtp(greeting.code, greeting.text()));
        }
        Ok(client)
    }

    /// Sends EHLO and records the announced extensions.
    ///
    /// # Errors
    ///
    /// Returns an error when the server rejects the greeting.
    pub async fn ehlo(mut self, client_hostname: &str) -> Result<Self> {
        let reply = self
            .exchange(&Command::Ehlo {
                hostname: client_hostname.to_string(),
            })
            .await?;
        if !reply.is_success() {
            return Err(Error::smtp(reply.code, reply.text()));
        }

        // First line is the server greeting, the rest are extensions
        self.server.extensions = reply
            .lines
            .iter()
            .skip(1)
            .map(|line| Extension::parse(line))
            .collect();
        Ok(self)
    }

    /// Authenticates with AUTH PLAIN (`\0user\0pass`, base64).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] when credentials are rejected.
    pub async fn auth_plain(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<S, Authenticated>> {
        if !self.server.supports_auth_plain() {
            return Err(Error::NotSupported("AUTH PLAIN".to_string()));
        }

        let blob = format!("\0{username}\0{password}");
        let reply = self
            .exchange(&Command::Auth {
                mechanism: "PLAIN".to_string(),
                initial_response: base64::engine::general_purpose::STANDARD.encode(blob),
            })
            .await?;

        if !reply.is_success() {
            return Err(Error::Auth(reply.text()));
        }
        Ok(self.transition())
    }

    /// Starts a transaction without authenticating (open relays and
    /// local submission agents).
    ///
    /// # Errors
    ///
    /// Returns the server's rejection.
    pub async fn mail_from(mut self, from: &Address) -> Result<Client<S, MailTransaction>> {
        self.command_ok(&Command::MailFrom { from: from.clone() }).await?;
        Ok(self.transition())
    }
}

impl Client<SmtpStream, Connected> {
    /// Upgrades the connection with STARTTLS and re-issues EHLO.
    ///
    /// # Errors
    ///
    /// Returns an error when STARTTLS is unsupported or the handshake
    /// fails.
    pub async fn starttls(mut self, host: &str) -> Result<Self> {
        if !self.server.supports_starttls() {
            return Err(Error::NotSupported("STARTTLS".to_string()));
        }

        let reply = self.exchange(&Command::StartTls).await?;
        if reply.code != codes::READY {
            return Err(Error::smtp(reply.code, reply.text()));
        }

        let stream = self.stream.upgrade_to_tls(host).await?;
        let client = Self {
            stream,
            buf: BytesMut::with_capacity(MAX_LINE_LENGTH),
            server: ServerInfo::default(),
            _state: PhantomData,
        };
        client.ehlo(host).await
    }
}

impl<S> Client<S, Authenticated>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Starts a mail transaction.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection.
    pub async fn mail_from(mut self, from: &Address) -> Result<Client<S, MailTransaction>> {
        self.command_ok(&Command::MailFrom { from: from.clone() }).await?;
        Ok(self.transition())
    }
}

impl<S> Client<S, MailTransaction>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Adds the first recipient.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection.
    pub async fn rcpt_to(mut self, to: &Address) -> Result<Client<S, RecipientAdded>> {
        self.command_ok(&Command::RcptTo { to: to.clone() }).await?;
        Ok(self.transition())
    }

    /// Abandons the transaction.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection.
    pub async fn reset(mut self) -> Result<Client<S, Authenticated>> {
        self.command_ok(&Command::Rset).await?;
        Ok(self.transition())
    }
}

impl<S> Client<S, RecipientAdded>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Adds another recipient.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection.
    pub async fn rcpt_to(mut self, to: &Address) -> Result<Self> {
        self.command_ok(&Command::RcptTo { to: to.clone() }).await?;
        Ok(self)
    }

    /// Begins the message payload.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection.
    pub async fn data(mut self) -> Result<Client<S, Data>> {
        let reply = self.exchange(&Command::Data).await?;
        if reply.code != codes::START_DATA {
            return Err(Error::smtp(reply.code, reply.text()));
        }
        Ok(self.transition())
    }

    /// Abandons the transaction.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection.
    pub async fn reset(mut self) -> Result<Client<S, Authenticated>> {
        self.command_ok(&Command::Rset).await?;
        Ok(self.transition())
    }
}

impl<S> Client<S, Data>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Sends the payload dot-stuffed and terminates it; the session
    /// returns to the authenticated state, ready for the next
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns the server's rejection of the message.
    pub async fn send_message(mut self, message: &[u8]) -> Result<Client<S, Authenticated>> {
        self.write_dot_stuffed(message).await?;

        let reply = self.read_reply().await?;
        if !reply.is_success() {
            return Err(Error::smtp(reply.code, reply.text()));
        }

        debug!("Message accepted");
        Ok(self.transition())
    }

    /// Normalises line endings to CRLF and stuffs leading dots, then
    /// terminates with `.` (RFC 5321 §4.5.2).
    async fn write_dot_stuffed(&mut self, message: &[u8]) -> Result<()> {
        for line in message.split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.first() == Some(&b'.') {
                self.stream.write_all(b".").await?;
            }
            self.stream.write_all(line).await?;
            self.stream.write_all(b"\r\n").await?;
        }
        self.stream.write_all(b".\r\n").await?;
        self.stream.flush().await?;
        Ok(())
    }
}

// Shared plumbing, available in every state
impl<S, State> Client<S, State>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// What the last EHLO reported.
    #[must_use]
    pub const fn server_info(&self) -> &ServerInfo {
        &self.server
    }

    /// Sends QUIT. A server that hangs up first is fine.
    ///
    /// # Errors
    ///
    /// Returns transport errors other than a closed connection.
    pub async fn quit(mut self) -> Result<()> {
        self.stream.write_all(&Command::Quit.serialize()).await?;
        self.stream.flush().await?;
        match self.read_reply().await {
            Ok(reply) if reply.code == codes::CLOSING || reply.is_success() => Ok(()),
            Ok(reply) => Err(Error::smtp(reply.code, reply.text())),
            // Connection torn down after QUIT is acceptable
            Err(Error::Io(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Moves the connection into the next protocol state.
    fn transition<Next>(self) -> Client<S, Next> {
        Client {
            stream: self.stream,
            buf: self.buf,
            server: self.server,
            _state: PhantomData,
        }
    }

    /// Sends a command that must come back 2xx.
    async fn command_ok(&mut self, cmd: &Command) -> Result<()> {
        let reply = self.exchange(cmd).await?;
        if reply.is_success() {
            Ok(())
        } else {
            Err(Error::smtp(reply.code, reply.text()))
        }
    }

    async fn exchange(&mut self, cmd: &Command) -> Result<Reply> {
        self.stream.write_all(&cmd.serialize()).await?;
        self.stream.flush().await?;
        self.read_reply().await
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line().await?;
            if line.is_empty() {
                continue;
            }
            let last = is_last_reply_line(&line);
            lines.push(line);
            if last {
                break;
            }
        }
        parse_reply(&lines)
    }

    async fn read_line(&mut self) -> Result<String> {
        loop {
            if let Some(pos) = self.buf.windows(2).position(|w| w == b"\r\n") {
                let line = self.buf.split_to(pos + 2);
                let text = String::from_utf8_lossy(&line[..pos]).into_owned();
                return Ok(text);
            }
            if self.buf.len() > MAX_LINE_LENGTH {
                return Err(Error::Protocol("Reply line too long".to_string()));
            }
            let n = self.stream.read_buf(&mut self.buf).await?;
            if n == 0 {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed",
                )));
            }
        }
    }
}

impl<S, State: 'static> std::fmt::Debug for Client<S, State> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("state", &std::any::type_name::<State>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    #[tokio::test]
    async fn greeting_consumed() {
        let mock = Builder::new().read(b"220 smtp.example.com ESMTP\r\n").build();
        let client = Client::from_stream(mock).await.unwrap();
        assert!(!client.server_info().supports_starttls());
    }

    #[tokio::test]
    async fn negative_greeting_is_error() {
        let mock = Builder::new().read(b"554 go away\r\n").build();
        assert!(Client::from_stream(mock).await.is_err());
    }

    #[tokio::test]
    async fn ehlo_discovers_extensions() {
        let mock = Builder::new()
            .read(b"220 ready\r\n")
            .write(b"EHLO client.local\r\n")
            .read(b"250-smtp.example.com\r\n250-STARTTLS\r\n250 AUTH PLAIN LOGIN\r\n")
            .build();
        let client = Client::from_stream(mock).await.unwrap();
        let client = client.ehlo("client.local").await.unwrap();
        assert!(client.server_info().supports_starttls());
        assert!(client.server_info().supports_auth_plain());
    }

    #[tokio::test]
    async fn auth_plain_rejected_is_auth_error() {
        let mock = Builder::new()
            .read(b"220 ready\r\n")
            .write(b"EHLO client.local\r\n")
            .read(b"250-x\r\n250 AUTH PLAIN\r\n")
            .write(b"AUTH PLAIN AHUAcA==\r\n")
            .read(b"535 5.7.8 bad credentials\r\n")
            .build();
        let client = Client::from_stream(mock).await.unwrap();
        let client = client.ehlo("client.local").await.unwrap();
        let result = client.auth_plain("u", "p").await;
        assert!(matches!(result, Err(Error::Auth(_))));
    }

    #[tokio::test]
    async fn auth_without_announcement_not_supported() {
        let mock = Builder::new()
            .read(b"220 ready\r\n")
            .write(b"EHLO client.local\r\n")
            .read(b"250 smtp.example.com\r\n")
            .build();
        let client = Client::from_stream(mock).await.unwrap();
        let client = client.ehlo("client.local").await.unwrap();
        let result = client.auth_plain("u", "p").await;
        assert!(matches!(result, Err(Error::NotSupported(_))));
    }

    #[tokio::test]
    async fn full_transaction_walks_the_states() {
        let mock = Builder::new()
            .read(b"220 ready\r\n")
            .write(b"MAIL FROM:<a@x.com>\r\n")
            .read(b"250 OK\r\n")
            .write(b"RCPT TO:<b@y.com>\r\n")
            .read(b"250 OK\r\n")
            .write(b"RCPT TO:<c@z.com>\r\n")
            .read(b"250 OK\r\n")
            .write(b"DATA\r\n")
            .read(b"354 go ahead\r\n")
            .write(b"Subject: hi\r\n")
            .write(b"\r\n")
            .write(b"body\r\n")
            .write(b".\r\n")
            .read(b"250 queued\r\n")
            .build();

        let client = Client::from_stream(mock).await.unwrap();
        let transaction = client.mail_from(&addr("a@x.com")).await.unwrap();
        let recipients = transaction.rcpt_to(&addr("b@y.com")).await.unwrap();
        let recipients = recipients.rcpt_to(&addr("c@z.com")).await.unwrap();
        let data = recipients.data().await.unwrap();
        let _client = data
            .send_message(b"Subject: hi\r\n\r\nbody")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn dot_stuffing_applied() {
        let mock = Builder::new()
            .read(b"220 ready\r\n")
            .write(b"MAIL FROM:<a@x.com>\r\n")
            .read(b"250 OK\r\n")
            .write(b"RCPT TO:<b@y.com>\r\n")
            .read(b"250 OK\r\n")
            .write(b"DATA\r\n")
            .read(b"354 go\r\n")
            .write(b".")
            .write(b".leading dot\r\n")
            .write(b".\r\n")
            .read(b"250 OK\r\n")
            .build();

        let client = Client::from_stream(mock).await.unwrap();
        let data = client
            .mail_from(&addr("a@x.com"))
            .await
            .unwrap()
            .rcpt_to(&addr("b@y.com"))
            .await
            .unwrap()
            .data()
            .await
            .unwrap();
        let _client = data.send_message(b".leading dot").await.unwrap();
    }

    #[tokio::test]
    async fn rejected_recipient_is_smtp_error() {
        let mock = Builder::new()
            .read(b"220 ready\r\n")
            .write(b"MAIL FROM:<a@x.com>\r\n")
            .read(b"250 OK\r\n")
            .write(b"RCPT TO:<nobody@y.com>\r\n")
            .read(b"550 no such user\r\n")
            .build();

        let client = Client::from_stream(mock).await.unwrap();
        let transaction = client.mail_from(&addr("a@x.com")).await.unwrap();
        let result = transaction.rcpt_to(&addr("nobody@y.com")).await;
        assert!(matches!(result, Err(Error::Smtp { code: 550, .. })));
    }

    #[tokio::test]
    async fn reset_returns_to_authenticated() {
        let mock = Builder::new()
            .read(b"220 ready\r\n")
            .write(b"MAIL FROM:<a@x.com>\r\n")
            .read(b"250 OK\r\n")
            .write(b"RSET\r\n")
            .read(b"250 OK\r\n")
            .build();

        let client = Client::from_stream(mock).await.unwrap();
        let transaction = client.mail_from(&addr("a@x.com")).await.unwrap();
        let _client: Client<_, Authenticated> = transaction.reset().await.unwrap();
    }
}
