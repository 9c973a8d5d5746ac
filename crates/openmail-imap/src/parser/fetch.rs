//! FETCH data items and BODYSTRUCTURE parsing.
//!
//! BODYSTRUCTURE extension data is parsed far enough to recover
//! Content-Disposition (attachment and inline-part detection depends
//! on it) before the remainder of each part is skipped.

use crate::error::Result;
use crate::types::Flags;

use super::lexer::{Cursor, Token};
use super::response::parse_flag_list;

/// One data item from a FETCH response.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchData {
    /// UID item.
    Uid(u32),
    /// FLAGS item.
    Flags(Flags),
    /// RFC822.SIZE item.
    Rfc822Size(u32),
    /// INTERNALDATE item.
    InternalDate(String),
    /// BODY[section] payload.
    Body {
        /// Section specifier (`HEADER.FIELDS (…)`, `1.2`, empty for whole body).
        section: String,
        /// Payload bytes; `None` when the server sent NIL.
        data: Option<Vec<u8>>,
    },
    /// BODYSTRUCTURE item.
    BodyStructure(BodyStructure),
}

/// Content-Disposition of a MIME part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disposition {
    /// Disposition kind, uppercased (`ATTACHMENT`, `INLINE`).
    pub kind: String,
    /// Disposition parameters with uppercased keys (`FILENAME`, …).
    pub params: Vec<(String, String)>,
}

impl Disposition {
    /// Returns a parameter value by (case-insensitive) key.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// A message's MIME structure as reported by BODYSTRUCTURE.
#[derive(Debug, Clone, PartialEq)]
pub enum BodyStructure {
    /// A leaf part.
    Part {
        /// Media type, uppercased (`TEXT`, `IMAGE`, …).
        media_type: String,
        /// Media subtype, uppercased (`PLAIN`, `HTML`, `PNG`, …).
        media_subtype: String,
        /// Body parameters with uppercased keys (`CHARSET`, `NAME`, …).
        params: Vec<(String, String)>,
        /// Content-ID, angle brackets intact.
        content_id: Option<String>,
        /// Content-Transfer-Encoding, lowercased.
        encoding: String,
        /// Size of the encoded part in octets.
        size: u32,
        /// Line count, for `TEXT/*` parts.
        lines: Option<u32>,
        /// Content-Disposition, when present.
        disposition: Option<Disposition>,
    },
    /// A multipart container.
    Multipart {
        /// Child parts in order.
        parts: Vec<BodyStructure>,
        /// Multipart subtype, uppercased (`MIXED`, `ALTERNATIVE`, …).
        subtype: String,
        /// Content-Disposition, when present.
        disposition: Option<Disposition>,
    },
}

impl BodyStructure {
    /// Returns a body parameter by key for leaf parts.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        match self {
            Self::Part { params, .. } => params
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v.as_str()),
            Self::Multipart { .. } => None,
        }
    }
}

/// Parses the parenthesised item list of one FETCH response.
pub fn parse_fetch_items(cur: &mut Cursor<'_>) -> Result<Vec<FetchData>> {
    cur.expect_lparen()?;
    let mut items = Vec::new();

    loop {
        match cur.next_token()? {
            Token::RParen => break,
            Token::Space => {}
            Token::Atom(name) => match name.to_uppercase().as_str() {
                "UID" => {
                    cur.expect_space()?;
                    items.push(FetchData::Uid(cur.read_number()?));
                }
                "FLAGS" => {
                    cur.expect_space()?;
                    items.push(FetchData::Flags(parse_flag_list(cur)?));
                }
                "RFC822.SIZE" => {
                    cur.expect_space()?;
                    items.push(FetchData::Rfc822Size(cur.read_number()?));
                }
                "INTERNALDATE" => {
                    cur.expect_space()?;
                    let date = cur.read_astring()?;
                    items.push(FetchData::InternalDate(date));
                }
                "BODYSTRUCTURE" => {
                    cur.expect_space()?;
                    items.push(FetchData::BodyStructure(parse_body_structure(cur)?));
                }
                "BODY" => {
                    if cur.peek() == Some(b'[') {
                        items.push(parse_body_section(cur)?);
                    } else {
                        // BODY without a section is the non-extensible
                        // BODYSTRUCTURE form
                        cur.expect_space()?;
                        items.push(FetchData::BodyStructure(parse_body_structure(cur)?));
                    }
                }
                _ => skip_item_value(cur)?,
            },
            Token::Eof => break,
            _ => {}
        }
    }

    Ok(items)
}

/// Parses `[section]<origin> payload` after a BODY atom.
fn parse_body_section(cur: &mut Cursor<'_>) -> Result<FetchData> {
    cur.bump(); // '['
    let mut section = String::new();
    while let Some(b) = cur.peek() {
        if b == b']' {
            cur.bump();
            break;
        }
        section.push(b as char);
        cur.bump();
    }

    // Optional <origin>
    if cur.peek() == Some(b'<') {
        while let Some(b) = cur.bump() {
            if b == b'>' {
                break;
            }
        }
    }

    cur.eat_space();
    let data = match cur.next_token()? {
        Token::Literal(data) => Some(data),
        Token::Quoted(s) => Some(s.into_bytes()),
        Token::Nil => None,
        other => return Err(cur.error(format!("Bad BODY payload: {other:?}"))),
    };

    Ok(FetchData::Body { section, data })
}

/// Skips an unrecognised fetch item's value.
fn skip_item_value(cur: &mut Cursor<'_>) -> Result<()> {
    cur.eat_space();
    match cur.peek() {
        Some(b'(') => {
            cur.bump();
            cur.skip_to_close()
        }
        Some(b'{') => {
            let _ = cur.next_token()?;
            Ok(())
        }
        Some(b'"') => {
            let _ = cur.next_token()?;
            Ok(())
        }
        _ => {
            while let Some(b) = cur.peek() {
                if b == b' ' || b == b')' {
                    break;
                }
                cur.bump();
            }
            Ok(())
        }
    }
}

/// Parses a BODYSTRUCTURE value.
pub fn parse_body_structure(cur: &mut Cursor<'_>) -> Result<BodyStructure> {
    cur.expect_lparen()?;

    if cur.peek() == Some(b'(') {
        // Multipart: children until the subtype string
        let mut parts = Vec::new();
        while cur.peek() == Some(b'(') {
            parts.push(parse_body_structure(cur)?);
            cur.eat_space();
        }

        let subtype = cur.read_astring()?.to_uppercase();

        // Extensions: body-fld-param, then disposition
        let disposition = parse_multipart_extensions(cur)?;
        cur.skip_to_close()?;

        return Ok(BodyStructure::Multipart {
            parts,
            subtype,
            disposition,
        });
    }

    // Leaf part
    let media_type = cur.read_nstring()?.unwrap_or_default().to_uppercase();
    cur.expect_space()?;
    let media_subtype = cur.read_nstring()?.unwrap_or_default().to_uppercase();
    cur.expect_space()?;
    let params = parse_param_list(cur)?;
    cur.expect_space()?;
    let content_id = cur.read_nstring()?;
    cur.expect_space()?;
    let _description = cur.read_nstring()?;
    cur.expect_space()?;
    let encoding = cur.read_nstring()?.unwrap_or_default().to_lowercase();
    cur.expect_space()?;
    let size = cur.read_number()?;

    let lines = if media_type == "TEXT" && cur.peek() == Some(b' ') {
        cur.eat_space();
        Some(cur.read_number()?)
    } else if media_type == "MESSAGE" && media_subtype == "RFC822" {
        // body-type-msg carries envelope SP body SP lines before the
        // extension data
        skip_paren_group(cur)?;
        skip_paren_group(cur)?;
        cur.eat_space();
        if cur.peek().is_some_and(|b| b.is_ascii_digit()) {
            Some(cur.read_number()?)
        } else {
            None
        }
    } else {
        None
    };

    // Extensions: body-fld-md5, then disposition
    let disposition = parse_leaf_extensions(cur)?;
    cur.skip_to_close()?;

    Ok(BodyStructure::Part {
        media_type,
        media_subtype,
        params,
        content_id,
        encoding,
        size,
        lines,
        disposition,
    })
}

/// Skips an optional space-prefixed parenthesised group.
fn skip_paren_group(cur: &mut Cursor<'_>) -> Result<()> {
    cur.eat_space();
    if cur.peek() == Some(b'(') {
        cur.bump();
        cur.skip_to_close()?;
    }
    Ok(())
}

/// Leaf extension data `md5 dsp lang loc`; reads through `dsp`.
fn parse_leaf_extensions(cur: &mut Cursor<'_>) -> Result<Option<Disposition>> {
    if cur.peek() != Some(b' ') {
        return Ok(None);
    }
    cur.eat_space();

    let _md5 = cur.read_nstring()?;
    if cur.peek() != Some(b' ') {
        return Ok(None);
    }
    cur.eat_space();

    parse_disposition(cur)
}

/// Multipart extension data `param dsp lang loc`; reads through `dsp`.
fn parse_multipart_extensions(cur: &mut Cursor<'_>) -> Result<Option<Disposition>> {
    if cur.peek() != Some(b' ') {
        return Ok(None);
    }
    cur.eat_space();

    // body-fld-param: NIL or a key/value list
    match cur.peek() {
        Some(b'(') => {
            cur.bump();
            cur.skip_to_close()?;
        }
        _ => {
            let _ = cur.read_nstring()?;
        }
    }

    if cur.peek() != Some(b' ') {
        return Ok(None);
    }
    cur.eat_space();
    parse_disposition(cur)
}

/// Parses `NIL` or `("ATTACHMENT" ("FILENAME" "x"))`.
fn parse_disposition(cur: &mut Cursor<'_>) -> Result<Option<Disposition>> {
    match cur.next_token()? {
        Token::Nil => Ok(None),
        Token::LParen => {
            let kind = cur.read_astring()?.to_uppercase();
            cur.eat_space();
            let params = parse_param_list(cur)?;
            cur.expect_rparen()?;
            Ok(Some(Disposition { kind, params }))
        }
        other => Err(cur.error(format!("Bad disposition: {other:?}"))),
    }
}

/// Parses `NIL` or `("KEY" "value" …)` with keys uppercased.
fn parse_param_list(cur: &mut Cursor<'_>) -> Result<Vec<(String, String)>> {
    match cur.next_token()? {
        Token::Nil => Ok(Vec::new()),
        Token::LParen => {
            let mut params = Vec::new();
            loop {
                match cur.peek() {
                    Some(b')') => {
                        cur.bump();
                        break;
                    }
                    Some(b' ') => {
                        cur.bump();
                    }
                    _ => {
                        let key = cur.read_nstring()?.unwrap_or_default().to_uppercase();
                        cur.eat_space();
                        let value = cur.read_nstring()?.unwrap_or_default();
                        params.push((key, value));
                    }
                }
            }
            Ok(params)
        }
        other => Err(cur.error(format!("Bad parameter list: {other:?}"))),
    }
}
