//! Framed I/O for the IMAP protocol.
//!
//! Responses are CRLF-terminated lines that may embed `{n}` literals;
//! a literal's payload can itself contain CRLF, so line splitting alone
//! is not enough. `read_response` returns one complete response: the
//! line plus every embedded literal.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// Read buffer growth increment.
const READ_CHUNK: usize = 8192;

/// Upper bound for a single response line.
const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Upper bound for a single literal payload.
const MAX_LITERAL_SIZE: usize = 64 * 1024 * 1024;

/// Framed connection for the IMAP protocol.
pub struct FramedStream<S> {
    stream: S,
    buf: BytesMut,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buf: BytesMut::with_capacity(READ_CHUNK),
        }
    }

    /// Reads one complete response: a CRLF-terminated line plus any
    /// embedded literals.
    ///
    /// # Errors
    ///
    /// Returns an error on connection loss, oversized input, or I/O
    /// failure.
    pub async fn read_response(&mut self) -> Result<Vec<u8>> {
        let mut response = Vec::new();

        loop {
            let line = self.read_line().await?;
            let literal_len = trailing_literal_len(&line);
            response.extend_from_slice(&line);

            match literal_len {
                None => break,
                Some(len) => {
                    if len > MAX_LITERAL_SIZE {
                        return Err(Error::Protocol(format!(
                            "literal too large: {len} bytes (max {MAX_LITERAL_SIZE})"
                        )));
                    }
                    self.fill_to(len).await?;
                    response.extend_from_slice(&self.buf[..len]);
                    self.buf.advance(len);
                    // The line continues after the literal
                }
            }
        }

        Ok(response)
    }

    /// Reads a single CRLF-terminated line (CRLF included).
    async fn read_line(&mut self) -> Result<Vec<u8>> {
        loop {
            if let Some(pos) = find_crlf(&self.buf) {
                let line = self.buf.split_to(pos + 2);
                return Ok(line.to_vec());
            }
            if self.buf.len() > MAX_LINE_LENGTH {
                return Err(Error::Protocol("line too long".to_string()));
            }
            self.fill_more().await?;
        }
    }

    /// Reads until the buffer holds at least `len` bytes.
    async fn fill_to(&mut self, len: usize) -> Result<()> {
        while self.buf.len() < len {
            self.fill_more().await?;
        }
        Ok(())
    }

    async fn fill_more(&mut self) -> Result<()> {
        let n = self.stream.read_buf(&mut self.buf).await?;
        if n == 0 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed",
            )));
        }
        Ok(())
    }

    /// Writes a serialised command and flushes.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    pub async fn write_command(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Reads responses until the tagged completion for `tag` arrives.
    ///
    /// Returns every response read, the tagged one last.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or protocol violations.
    pub async fn read_until_tagged(&mut self, tag: &str) -> Result<Vec<Vec<u8>>> {
        let mut responses = Vec::new();

        loop {
            let response = self.read_response().await?;
            let is_tagged = response.starts_with(tag.as_bytes())
                && response.get(tag.len()) == Some(&b' ');
            responses.push(response);
            if is_tagged {
                return Ok(responses);
            }
        }
    }
}

/// Finds the position of the first CRLF.
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Parses a literal length from the end of a line (`… {123}\r\n` or
/// `… {123+}\r\n`).
fn trailing_literal_len(line: &[u8]) -> Option<usize> {
    let line = line.strip_suffix(b"\r\n")?;
    let line = line.strip_suffix(b"}")?;
    let open = line.iter().rposition(|&b| b == b'{')?;

    let digits = &line[open + 1..];
    let digits = digits.strip_suffix(b"+").unwrap_or(digits);
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }

    std::str::from_utf8(digits).ok()?.parse().ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn crlf_position() {
        assert_eq!(find_crlf(b"hello\r\n"), Some(5));
        assert_eq!(find_crlf(b"\r\n"), Some(0));
        assert_eq!(find_crlf(b"none"), None);
        assert_eq!(find_crlf(b"cr only\r"), None);
    }

    #[test]
    fn literal_length_forms() {
        assert_eq!(trailing_literal_len(b"BODY {123}\r\n"), Some(123));
        assert_eq!(trailing_literal_len(b"BODY {123+}\r\n"), Some(123));
        assert_eq!(trailing_literal_len(b"{0}\r\n"), Some(0));
        assert_eq!(trailing_literal_len(b"no literal\r\n"), None);
        assert_eq!(trailing_literal_len(b"bad {12a}\r\n"), None);
        assert_eq!(trailing_literal_len(b"unterminated {12"), None);
    }

    #[tokio::test]
    async fn read_simple_line() {
        let mock = tokio_test::io::Builder::new().read(b"* OK ready\r\n").build();
        let mut framed = FramedStream::new(mock);
        assert_eq!(framed.read_response().await.unwrap(), b"* OK ready\r\n");
    }

    #[tokio::test]
    async fn read_response_with_literal() {
        let mock = tokio_test::io::Builder::new()
            .read(b"* 1 FETCH (BODY[1] {5}\r\n")
            .read(b"hello)\r\n")
            .build();
        let mut framed = FramedStream::new(mock);
        assert_eq!(
            framed.read_response().await.unwrap(),
            b"* 1 FETCH (BODY[1] {5}\r\nhello)\r\n"
        );
    }

    #[tokio::test]
    async fn read_response_literal_split_across_reads() {
        let mock = tokio_test::io::Builder::new()
            .read(b"* 1 FETCH (BODY[1] {10}\r\n")
            .read(b"hello")
            .read(b"world)\r\n")
            .build();
        let mut framed = FramedStream::new(mock);
        assert_eq!(
            framed.read_response().await.unwrap(),
            b"* 1 FETCH (BODY[1] {10}\r\nhelloworld)\r\n"
        );
    }

    #[tokio::test]
    async fn read_until_tagged_collects_untagged() {
        let mock = tokio_test::io::Builder::new()
            .read(b"* SEARCH 1 2\r\n")
            .read(b"A0001 OK SEARCH done\r\n")
            .build();
        let mut framed = FramedStream::new(mock);
        let responses = framed.read_until_tagged("A0001").await.unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[1], b"A0001 OK SEARCH done\r\n");
    }

    #[tokio::test]
    async fn tag_prefix_of_other_tag_not_matched() {
        let mock = tokio_test::io::Builder::new()
            .read(b"A00011 OK other\r\n")
            .read(b"A0001 OK mine\r\n")
            .build();
        let mut framed = FramedStream::new(mock);
        let responses = framed.read_until_tagged("A0001").await.unwrap();
        assert_eq!(responses.len(), 2);
    }

    #[tokio::test]
    async fn write_command_flushes() {
        let mock = tokio_test::io::Builder::new()
            .write(b"A0001 NOOP\r\n")
            .build();
        let mut framed = FramedStream::new(mock);
        framed.write_command(b"A0001 NOOP\r\n").await.unwrap();
    }

    #[tokio::test]
    async fn eof_is_error() {
        let mock = tokio_test::io::Builder::new().build();
        let mut framed = FramedStream::new(mock);
        assert!(framed.read_response().await.is_err());
    }

    #[tokio::test]
    async fn oversized_literal_rejected() {
        let header = format!("* 1 FETCH (BODY {{{}}}\r\n", MAX_LITERAL_SIZE + 1);
        let mock = tokio_test::io::Builder::new().read(header.as_bytes()).build();
        let mut framed = FramedStream::new(mock);
        assert!(framed.read_response().await.is_err());
    }
}
