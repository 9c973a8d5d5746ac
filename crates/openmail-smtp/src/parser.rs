//! SMTP reply parsing.
//!
//! Replies are one or more lines; `250-text` continues, `250 text`
//! ends. All lines of one reply carry the same code.

use crate::error::{Error, Result};
use crate::types::Reply;

/// True when a reply line terminates its reply (`code SP` rather than
/// `code -`).
#[must_use]
pub fn is_last_reply_line(line: &str) -> bool {
    line.len() < 4 || line.as_bytes().get(3) != Some(&b'-')
}

/// Parses collected reply lines into a [`Reply`].
///
/// # Errors
///
/// Returns a protocol error for empty input or a malformed code.
pub fn parse_reply(lines: &[String]) -> Result<Reply> {
    let first = lines
        .first()
        .ok_or_else(|| Error::Protocol("Empty reply".to_string()))?;

    let code: u16 = first
        .get(..3)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::Protocol(format!("Malformed reply line: {first:?}")))?;

    let mut text_lines = Vec::with_capacity(lines.len());
    for line in lines {
        let line_code: Option<u16> = line.get(..3).and_then(|s| s.parse().ok());
        if line_code != Some(code) {
            return Err(Error::Protocol(format!(
                "Reply code changed mid-reply: {line:?}"
            )));
        }
        text_lines.push(line.get(4..).unwrap_or("").to_string());
    }

    Ok(Reply {
        code,
        lines: text_lines,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn single_line_reply() {
        let reply = parse_reply(&["250 OK".to_string()]).unwrap();
        assert_eq!(reply.code, 250);
        assert_eq!(reply.lines, vec!["OK"]);
    }

    #[test]
    fn multi_line_reply() {
        let reply = parse_reply(&[
            "250-smtp.example.com".to_string(),
            "250-STARTTLS".to_string(),
            "250 SIZE 35882577".to_string(),
        ])
        .unwrap();
        assert_eq!(reply.code, 250);
        assert_eq!(reply.lines.len(), 3);
        assert_eq!(reply.lines[1], "STARTTLS");
    }

    #[test]
    fn last_line_detection() {
        assert!(!is_last_reply_line("250-more"));
        assert!(is_last_reply_line("250 done"));
        assert!(is_last_reply_line("250"));
    }

    #[test]
    fn code_change_is_error() {
        let result = parse_reply(&["250-a".to_string(), "500 b".to_string()]);
        assert!(result.is_err());
    }

    #[test]
    fn empty_reply_is_error() {
        assert!(parse_reply(&[]).is_err());
    }

    #[test]
    fn garbage_is_error() {
        assert!(parse_reply(&["nonsense".to_string()]).is_err());
    }
}
