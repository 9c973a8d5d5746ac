//! Response-level parsing: tagged status lines, untagged data, and
//! continuation requests.

use crate::error::{Error, Result};
use crate::types::{Flag, Flags, Folder, FolderAttribute, Status, Tag};

use super::fetch::{FetchData, parse_fetch_items};
use super::lexer::{Cursor, Token};

/// A parsed server response.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Tagged command completion.
    Tagged {
        /// The command tag.
        tag: Tag,
        /// Completion status.
        status: Status,
        /// Human-readable text (response code included verbatim).
        text: String,
    },
    /// Untagged server data.
    Untagged(Untagged),
    /// Continuation request (`+ …`).
    Continuation {
        /// Text after the `+`, if any.
        text: Option<String>,
    },
}

/// Untagged response payloads the client consumes.
#[derive(Debug, Clone, PartialEq)]
pub enum Untagged {
    /// `* OK/NO/BAD …` status.
    Status {
        /// Status keyword.
        status: Status,
        /// Response text.
        text: String,
    },
    /// `* BYE …`: the server is closing the connection.
    Bye {
        /// Server's parting text.
        text: String,
    },
    /// `* CAPABILITY …`.
    Capability(Vec<String>),
    /// `* LIST (attrs) "/" name`.
    List(Folder),
    /// `* SEARCH n n n`.
    Search(Vec<u32>),
    /// `* FLAGS (…)`: flags defined for the mailbox.
    MailboxFlags(Flags),
    /// `* <n> EXISTS`.
    Exists(u32),
    /// `* <n> RECENT`.
    Recent(u32),
    /// `* <n> EXPUNGE`.
    Expunge(u32),
    /// `* <n> FETCH (…)`.
    Fetch {
        /// Message sequence number.
        seq: u32,
        /// Fetched data items.
        items: Vec<FetchData>,
    },
    /// Anything the client has no use for, kept as raw text.
    Other(String),
}

/// Parses one complete response.
///
/// # Errors
///
/// Returns a parse error on malformed input.
pub fn parse_response(input: &[u8]) -> Result<Response> {
    let mut cur = Cursor::new(input);

    match cur.next_token()? {
        Token::Star => {
            cur.expect_space()?;
            parse_untagged(&mut cur).map(Response::Untagged)
        }
        Token::Plus => {
            cur.eat_space();
            let text = cur.rest_of_line();
            Ok(Response::Continuation {
                text: (!text.is_empty()).then_some(text),
            })
        }
        Token::Atom(tag) => {
            cur.expect_space()?;
            let keyword = cur.read_atom()?;
            let status = Status::parse(keyword)
                .ok_or_else(|| cur.error(format!("Invalid status keyword: {keyword}")))?;
            cur.eat_space();
            let text = cur.rest_of_line();
            Ok(Response::Tagged {
                tag: Tag::new(tag),
                status,
                text,
            })
        }
        other => Err(Error::Parse {
            position: 0,
            message: format!("Expected *, + or tag, got {other:?}"),
        }),
    }
}

fn parse_untagged(cur: &mut Cursor<'_>) -> Result<Untagged> {
    match cur.next_token()? {
        Token::Atom(keyword) => parse_keyword_data(cur, keyword),
        Token::Number(n) => {
            cur.expect_space()?;
            let keyword = cur.read_atom()?.to_uppercase();
            match keyword.as_str() {
                "EXISTS" => Ok(Untagged::Exists(n)),
                "RECENT" => Ok(Untagged::Recent(n)),
                "EXPUNGE" => Ok(Untagged::Expunge(n)),
                "FETCH" => {
                    cur.expect_space()?;
                    let items = parse_fetch_items(cur)?;
                    Ok(Untagged::Fetch { seq: n, items })
                }
                other => Err(cur.error(format!("Unknown message data: {other}"))),
            }
        }
        other => Err(cur.error(format!("Unexpected token in untagged response: {other:?}"))),
    }
}

fn parse_keyword_data(cur: &mut Cursor<'_>, keyword: &str) -> Result<Untagged> {
    match keyword.to_uppercase().as_str() {
        "OK" | "NO" | "BAD" => {
            // Status is derivable from the keyword we just matched
            let status = Status::parse(keyword).unwrap_or(Status::Ok);
            cur.eat_space();
            Ok(Untagged::Status {
                status,
                text: cur.rest_of_line(),
            })
        }
        "BYE" => {
            cur.eat_space();
            Ok(Untagged::Bye {
                text: cur.rest_of_line(),
            })
        }
        "CAPABILITY" => {
            let mut caps = Vec::new();
            loop {
                match cur.next_token()? {
                    Token::Space => {}
                    Token::Atom(cap) => caps.push(cap.to_string()),
                    Token::Crlf | Token::Eof => break,
                    other => return Err(cur.error(format!("Bad capability token: {other:?}"))),
                }
            }
            Ok(Untagged::Capability(caps))
        }
        "LIST" => {
            cur.expect_space()?;
            parse_list(cur).map(Untagged::List)
        }
        "SEARCH" => {
            let mut uids = Vec::new();
            loop {
                match cur.next_token()? {
                    Token::Space => {}
                    Token::Number(n) => uids.push(n),
                    Token::Crlf | Token::Eof => break,
                    other => return Err(cur.error(format!("Bad search token: {other:?}"))),
                }
            }
            Ok(Untagged::Search(uids))
        }
        "FLAGS" => {
            cur.expect_space()?;
            parse_flag_list(cur).map(Untagged::MailboxFlags)
        }
        _ => {
            // STATUS, NAMESPACE, ESEARCH and friends are not consumed
            // by this client; keep them readable for diagnostics.
            let rest = cur.rest_of_line();
            Ok(Untagged::Other(format!("{keyword}{rest}")))
        }
    }
}

/// Parses a parenthesised flag list.
pub fn parse_flag_list(cur: &mut Cursor<'_>) -> Result<Flags> {
    cur.expect_lparen()?;
    let mut flags = Flags::new();

    loop {
        match cur.next_token()? {
            Token::RParen => break,
            Token::Space => {}
            Token::Atom(s) => flags.insert(Flag::parse(s)),
            other => return Err(cur.error(format!("Bad flag token: {other:?}"))),
        }
    }

    Ok(flags)
}

/// Parses the remainder of a LIST response: `(attrs) delim name`.
fn parse_list(cur: &mut Cursor<'_>) -> Result<Folder> {
    cur.expect_lparen()?;
    let mut attributes = Vec::new();
    loop {
        match cur.next_token()? {
            Token::RParen => break,
            Token::Space => {}
            Token::Atom(s) => attributes.push(FolderAttribute::parse(s)),
            other => return Err(cur.error(format!("Bad LIST attribute: {other:?}"))),
        }
    }

    cur.expect_space()?;
    let delimiter = match cur.next_token()? {
        Token::Nil => None,
        Token::Quoted(s) => s.chars().next(),
        other => return Err(cur.error(format!("Bad LIST delimiter: {other:?}"))),
    };

    cur.expect_space()?;
    let name = cur.read_astring()?;

    Ok(Folder::from_list(&name, delimiter, attributes))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::SpecialUse;

    #[test]
    fn tagged_ok() {
        let response = parse_response(b"A0001 OK LOGIN completed\r\n").unwrap();
        match response {
            Response::Tagged { tag, status, text } => {
                assert_eq!(tag.as_str(), "A0001");
                assert_eq!(status, Status::Ok);
                assert_eq!(text, "LOGIN completed");
            }
            other => panic!("Expected tagged, got {other:?}"),
        }
    }

    #[test]
    fn tagged_no_keeps_server_text() {
        let response = parse_response(b"A0002 NO [AUTHENTICATIONFAILED] bad creds\r\n").unwrap();
        match response {
            Response::Tagged { status, text, .. } => {
                assert_eq!(status, Status::No);
                assert!(text.contains("bad creds"));
            }
            other => panic!("Expected tagged, got {other:?}"),
        }
    }

    #[test]
    fn continuation_idling() {
        let response = parse_response(b"+ idling\r\n").unwrap();
        assert_eq!(
            response,
            Response::Continuation {
                text: Some("idling".to_string())
            }
        );
    }

    #[test]
    fn untagged_exists() {
        let response = parse_response(b"* 23 EXISTS\r\n").unwrap();
        assert_eq!(response, Response::Untagged(Untagged::Exists(23)));
    }

    #[test]
    fn untagged_bye() {
        let response = parse_response(b"* BYE server shutting down\r\n").unwrap();
        match response {
            Response::Untagged(Untagged::Bye { text }) => {
                assert_eq!(text, "server shutting down");
            }
            other => panic!("Expected BYE, got {other:?}"),
        }
    }

    #[test]
    fn untagged_search() {
        let response = parse_response(b"* SEARCH 1 2 3 5 8\r\n").unwrap();
        assert_eq!(
            response,
            Response::Untagged(Untagged::Search(vec![1, 2, 3, 5, 8]))
        );
    }

    #[test]
    fn untagged_empty_search() {
        let response = parse_response(b"* SEARCH\r\n").unwrap();
        assert_eq!(response, Response::Untagged(Untagged::Search(vec![])));
    }

    #[test]
    fn untagged_capability() {
        let response = parse_response(b"* CAPABILITY IMAP4rev2 IDLE MOVE\r\n").unwrap();
        match response {
            Response::Untagged(Untagged::Capability(caps)) => {
                assert!(caps.contains(&"IDLE".to_string()));
                assert!(caps.contains(&"MOVE".to_string()));
            }
            other => panic!("Expected capability, got {other:?}"),
        }
    }

    #[test]
    fn untagged_list_with_special_use() {
        let response =
            parse_response(b"* LIST (\\HasNoChildren \\Trash) \"/\" \"[Gmail]/&AMcA9g-p Kutusu\"\r\n")
                .unwrap();
        match response {
            Response::Untagged(Untagged::List(folder)) => {
                assert_eq!(folder.path, "[Gmail]/Çöp Kutusu");
                assert_eq!(folder.role(), Some(SpecialUse::Trash));
            }
            other => panic!("Expected LIST, got {other:?}"),
        }
    }

    #[test]
    fn untagged_list_pipe_delimiter_normalised() {
        let response = parse_response(b"* LIST (\\HasNoChildren) \"|\" \"Parent|Child\"\r\n").unwrap();
        match response {
            Response::Untagged(Untagged::List(folder)) => {
                assert_eq!(folder.path, "Parent/Child");
            }
            other => panic!("Expected LIST, got {other:?}"),
        }
    }

    #[test]
    fn untagged_mailbox_flags() {
        let response = parse_response(b"* FLAGS (\\Answered \\Seen)\r\n").unwrap();
        match response {
            Response::Untagged(Untagged::MailboxFlags(flags)) => {
                assert!(flags.is_seen());
                assert!(flags.is_answered());
            }
            other => panic!("Expected FLAGS, got {other:?}"),
        }
    }

    #[test]
    fn unknown_untagged_kept_as_other() {
        let response = parse_response(b"* NAMESPACE ((\"\" \"/\")) NIL NIL\r\n").unwrap();
        assert!(matches!(response, Response::Untagged(Untagged::Other(_))));
    }

    #[test]
    fn untagged_fetch_flags_and_uid() {
        let response = parse_response(b"* 1 FETCH (UID 42 FLAGS (\\Seen))\r\n").unwrap();
        match response {
            Response::Untagged(Untagged::Fetch { seq, items }) => {
                assert_eq!(seq, 1);
                assert_eq!(items.len(), 2);
            }
            other => panic!("Expected FETCH, got {other:?}"),
        }
    }
}
