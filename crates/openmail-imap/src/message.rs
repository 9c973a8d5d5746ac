//! Pure functions over parsed FETCH output.
//!
//! Everything here is stateless: the session hands in the `FetchData`
//! items the parser produced and gets back the typed model the UI
//! consumes. Part numbers are MIME section strings (`"1.2"`) suitable
//! for `BODY.PEEK[…]` fetches.

use openmail_mime::encoding::{decode_base64_lossy, decode_quoted_printable};
use openmail_mime::{Headers, html_to_text};

use crate::parser::{BodyStructure, FetchData};
use crate::types::AttachmentInfo;

/// Maximum preview length for `body_short`.
pub const PREVIEW_LIMIT: usize = 100;

/// One message's worth of fetch data.
#[derive(Debug, Clone)]
pub struct MessageGroup {
    /// The message UID.
    pub uid: u32,
    /// All items fetched for this UID.
    pub items: Vec<FetchData>,
}

/// Groups a multi-message fetch into per-UID groups, preserving the
/// order UIDs first appeared. Servers may split one message's data
/// across several FETCH responses; those merge.
#[must_use]
pub fn group_messages(fetches: Vec<Vec<FetchData>>) -> Vec<MessageGroup> {
    let mut groups: Vec<MessageGroup> = Vec::new();

    for items in fetches {
        let Some(uid) = get_uid(&items) else {
            continue;
        };
        if let Some(group) = groups.iter_mut().find(|g| g.uid == uid) {
            group.items.extend(items);
        } else {
            groups.push(MessageGroup { uid, items });
        }
    }

    groups
}

/// Extracts the UID item.
#[must_use]
pub fn get_uid(items: &[FetchData]) -> Option<u32> {
    items.iter().find_map(|item| match item {
        FetchData::Uid(uid) => Some(*uid),
        _ => None,
    })
}

/// Extracts flag names (`\`-prefixed for system flags).
#[must_use]
pub fn get_flags(items: &[FetchData]) -> Vec<String> {
    items
        .iter()
        .find_map(|item| match item {
            FetchData::Flags(flags) => {
                Some(flags.iter().map(|f| f.as_str().to_string()).collect())
            }
            _ => None,
        })
        .unwrap_or_default()
}

/// Extracts the RFC822.SIZE item.
#[must_use]
pub fn get_size(items: &[FetchData]) -> Option<u32> {
    items.iter().find_map(|item| match item {
        FetchData::Rfc822Size(size) => Some(*size),
        _ => None,
    })
}

/// Extracts the BODYSTRUCTURE item.
#[must_use]
pub fn get_bodystructure(items: &[FetchData]) -> Option<&BodyStructure> {
    items.iter().find_map(|item| match item {
        FetchData::BodyStructure(bs) => Some(bs),
        _ => None,
    })
}

/// Extracts the payload of a `BODY[section]` item.
#[must_use]
pub fn get_body_section<'a>(items: &'a [FetchData], section: &str) -> Option<&'a [u8]> {
    items.iter().find_map(|item| match item {
        FetchData::Body {
            section: s, data, ..
        } if s.eq_ignore_ascii_case(section) => data.as_deref(),
        _ => None,
    })
}

/// Decoded message headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageHeaders {
    /// Decoded `From`.
    pub sender: String,
    /// Decoded `To`.
    pub receiver: String,
    /// Decoded `Cc`.
    pub cc: String,
    /// `Date` as sent.
    pub date: String,
    /// Decoded `Subject`.
    pub subject: String,
    /// `Message-ID`.
    pub message_id: String,
    /// `In-Reply-To`.
    pub in_reply_to: String,
    /// `References`.
    pub references: String,
    /// `List-Unsubscribe`.
    pub list_unsubscribe: String,
}

/// Parses and decodes the `HEADER.FIELDS` payload of a fetch group.
///
/// RFC 2047 encoded-words are resolved; `Display Name <addr>` forms
/// come back as a single decoded string.
#[must_use]
pub fn get_headers(items: &[FetchData]) -> MessageHeaders {
    let Some(raw) = items.iter().find_map(|item| match item {
        FetchData::Body { section, data, .. }
            if section.to_uppercase().starts_with("HEADER") =>
        {
            data.as_deref()
        }
        _ => None,
    }) else {
        return MessageHeaders::default();
    };

    let headers = Headers::parse(&String::from_utf8_lossy(raw));
    let decoded = |name: &str| headers.get_decoded(name).unwrap_or_default();

    MessageHeaders {
        sender: decoded("From"),
        receiver: decoded("To"),
        cc: decoded("Cc"),
        date: headers.get("Date").unwrap_or_default().to_string(),
        subject: collapse_spaces(&decoded("Subject")),
        message_id: headers.get("Message-ID").unwrap_or_default().to_string(),
        in_reply_to: headers.get("In-Reply-To").unwrap_or_default().to_string(),
        references: headers.get("References").unwrap_or_default().to_string(),
        list_unsubscribe: headers
            .get("List-Unsubscribe")
            .unwrap_or_default()
            .to_string(),
    }
}

fn collapse_spaces(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_space && !out.is_empty() {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out.trim_end().to_string()
}

/// Selector for locating a MIME part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartSelector {
    /// Match by media type and subtype (`TEXT`, `HTML`).
    ContentType {
        /// Media type, case-insensitive.
        media_type: String,
        /// Media subtype, case-insensitive.
        media_subtype: String,
    },
    /// Match by declared filename (disposition or `NAME` parameter).
    Filename(String),
    /// Match by Content-ID (angle brackets optional).
    Cid(String),
}

impl PartSelector {
    /// `TEXT/HTML` selector.
    #[must_use]
    pub fn html() -> Self {
        Self::ContentType {
            media_type: "TEXT".to_string(),
            media_subtype: "HTML".to_string(),
        }
    }

    /// `TEXT/PLAIN` selector.
    #[must_use]
    pub fn plain() -> Self {
        Self::ContentType {
            media_type: "TEXT".to_string(),
            media_subtype: "PLAIN".to_string(),
        }
    }
}

/// A leaf part with its MIME section number.
#[derive(Debug, Clone)]
pub struct NumberedPart<'a> {
    /// MIME section number (`"1"`, `"1.2"`, …).
    pub number: String,
    /// The leaf's structure.
    pub part: &'a BodyStructure,
}

/// Flattens a BODYSTRUCTURE into numbered leaf parts, in order.
#[must_use]
pub fn numbered_parts(bs: &BodyStructure) -> Vec<NumberedPart<'_>> {
    let mut out = Vec::new();
    walk(bs, "", &mut out);
    out
}

fn walk<'a>(bs: &'a BodyStructure, prefix: &str, out: &mut Vec<NumberedPart<'a>>) {
    match bs {
        BodyStructure::Part { .. } => {
            let number = if prefix.is_empty() {
                "1".to_string()
            } else {
                prefix.to_string()
            };
            out.push(NumberedPart { number, part: bs });
        }
        BodyStructure::Multipart { parts, .. } => {
            for (i, child) in parts.iter().enumerate() {
                let number = if prefix.is_empty() {
                    format!("{}", i + 1)
                } else {
                    format!("{prefix}.{}", i + 1)
                };
                walk(child, &number, out);
            }
        }
    }
}

/// Finds the MIME part number matching a selector.
#[must_use]
pub fn find_part(bs: &BodyStructure, selector: &PartSelector) -> Option<String> {
    numbered_parts(bs)
        .into_iter()
        .find(|numbered| matches_selector(numbered.part, selector))
        .map(|numbered| numbered.number)
}

fn matches_selector(part: &BodyStructure, selector: &PartSelector) -> bool {
    let BodyStructure::Part {
        media_type,
        media_subtype,
        content_id,
        disposition,
        ..
    } = part
    else {
        return false;
    };

    match selector {
        PartSelector::ContentType {
            media_type: want_type,
            media_subtype: want_subtype,
        } => {
            media_type.eq_ignore_ascii_case(want_type)
                && media_subtype.eq_ignore_ascii_case(want_subtype)
        }
        PartSelector::Filename(name) => part_filename(part)
            .is_some_and(|f| f.eq_ignore_ascii_case(name.trim_matches('"'))),
        PartSelector::Cid(cid) => content_id
            .as_deref()
            .map(strip_angle_brackets)
            .is_some_and(|c| c.eq_ignore_ascii_case(strip_angle_brackets(cid)))
            || disposition
                .as_ref()
                .and_then(|d| d.param("filename"))
                .is_some_and(|f| f.contains(cid.trim_matches('"'))),
    }
}

fn strip_angle_brackets(s: &str) -> &str {
    s.trim_start_matches('<').trim_end_matches('>')
}

/// Filename of a leaf part: disposition `FILENAME` wins over the
/// body `NAME` parameter.
#[must_use]
pub fn part_filename(part: &BodyStructure) -> Option<&str> {
    let BodyStructure::Part { disposition, .. } = part else {
        return None;
    };
    disposition
        .as_ref()
        .and_then(|d| d.param("filename"))
        .or_else(|| part.param("name"))
}

/// Returns `(content_type, transfer_encoding)` for a part number.
#[must_use]
pub fn content_type_and_encoding(bs: &BodyStructure, number: &str) -> Option<(String, String)> {
    numbered_parts(bs)
        .into_iter()
        .find(|numbered| numbered.number == number)
        .and_then(|numbered| match numbered.part {
            BodyStructure::Part {
                media_type,
                media_subtype,
                encoding,
                ..
            } => Some((
                format!(
                    "{}/{}",
                    media_type.to_lowercase(),
                    media_subtype.to_lowercase()
                ),
                encoding.clone(),
            )),
            BodyStructure::Multipart { .. } => None,
        })
}

/// Lists attachment metadata: parts with an `ATTACHMENT` disposition,
/// or a filename without an inline disposition.
#[must_use]
pub fn attachment_list(bs: &BodyStructure) -> Vec<AttachmentInfo> {
    numbered_parts(bs)
        .into_iter()
        .filter(|numbered| is_attachment(numbered.part))
        .filter_map(|numbered| attachment_info(numbered.part))
        .collect()
}

/// Lists inline attachments (disposition `INLINE` with a Content-ID)
/// with their part numbers.
#[must_use]
pub fn inline_attachment_list(bs: &BodyStructure) -> Vec<(String, AttachmentInfo)> {
    numbered_parts(bs)
        .into_iter()
        .filter(|numbered| is_inline_attachment(numbered.part))
        .filter_map(|numbered| {
            attachment_info(numbered.part).map(|info| (numbered.number, info))
        })
        .collect()
}

fn is_attachment(part: &BodyStructure) -> bool {
    let BodyStructure::Part { disposition, .. } = part else {
        return false;
    };
    match disposition {
        Some(d) => d.kind == "ATTACHMENT",
        None => part_filename(part).is_some(),
    }
}

fn is_inline_attachment(part: &BodyStructure) -> bool {
    let BodyStructure::Part {
        disposition,
        content_id,
        ..
    } = part
    else {
        return false;
    };
    disposition.as_ref().is_some_and(|d| d.kind == "INLINE") && content_id.is_some()
}

fn attachment_info(part: &BodyStructure) -> Option<AttachmentInfo> {
    let BodyStructure::Part {
        media_type,
        media_subtype,
        content_id,
        size,
        ..
    } = part
    else {
        return None;
    };

    Some(AttachmentInfo {
        name: part_filename(part).unwrap_or_default().to_string(),
        size: *size,
        mime_type: format!(
            "{}/{}",
            media_type.to_lowercase(),
            media_subtype.to_lowercase()
        ),
        cid: content_id
            .as_deref()
            .map(|c| strip_angle_brackets(c).to_string()),
        data: None,
    })
}

/// Picks the body part for full content display: `text/html` first,
/// then `text/plain`, then part 1.
#[must_use]
pub fn content_body_part(bs: &BodyStructure) -> String {
    find_part(bs, &PartSelector::html())
        .or_else(|| find_part(bs, &PartSelector::plain()))
        .unwrap_or_else(|| "1".to_string())
}

/// Picks the body part for previews: `text/plain` first, then
/// `text/html`, then part 1.
#[must_use]
pub fn preview_body_part(bs: &BodyStructure) -> String {
    find_part(bs, &PartSelector::plain())
        .or_else(|| find_part(bs, &PartSelector::html()))
        .unwrap_or_else(|| "1".to_string())
}

/// Decodes body bytes per the transfer encoding.
///
/// `sanitize` strips HTML down to single-line text. Malformed input
/// never fails; decoding truncates to a valid prefix.
#[must_use]
pub fn decode_body(data: &[u8], encoding: &str, sanitize: bool) -> String {
    let text = String::from_utf8_lossy(data);
    let decoded = match encoding.to_lowercase().as_str() {
        "base64" => String::from_utf8_lossy(&decode_base64_lossy(&text)).into_owned(),
        "quoted-printable" => decode_quoted_printable(&text),
        _ => text.into_owned(),
    };

    if sanitize {
        html_to_text(&decoded)
    } else {
        decoded
    }
}

/// Truncates text to a character budget for `body_short`.
#[must_use]
pub fn preview_text(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    text.chars().take(limit).collect()
}

/// Replaces `cid:<id>` references in an HTML body with `data:` URIs.
///
/// `inline` pairs each Content-ID with its MIME type and base64 data.
#[must_use]
pub fn resolve_cid_references(body: &str, inline: &[(String, String, String)]) -> String {
    let mut out = body.to_string();
    for (cid, mime_type, data) in inline {
        let reference = format!("cid:{cid}");
        if out.contains(&reference) {
            out = out.replace(&reference, &format!("data:{mime_type};base64,{data}"));
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::parser::Disposition;
    use crate::types::{Flag, Flags};

    fn text_part(subtype: &str, encoding: &str) -> BodyStructure {
        BodyStructure::Part {
            media_type: "TEXT".to_string(),
            media_subtype: subtype.to_string(),
            params: vec![("CHARSET".to_string(), "utf-8".to_string())],
            content_id: None,
            encoding: encoding.to_string(),
            size: 10,
            lines: Some(1),
            disposition: None,
        }
    }

    fn pdf_attachment(name: &str) -> BodyStructure {
        BodyStructure::Part {
            media_type: "APPLICATION".to_string(),
            media_subtype: "PDF".to_string(),
            params: vec![("NAME".to_string(), name.to_string())],
            content_id: None,
            encoding: "base64".to_string(),
            size: 1000,
            lines: None,
            disposition: Some(Disposition {
                kind: "ATTACHMENT".to_string(),
                params: vec![("FILENAME".to_string(), name.to_string())],
            }),
        }
    }

    fn inline_png(cid: &str) -> BodyStructure {
        BodyStructure::Part {
            media_type: "IMAGE".to_string(),
            media_subtype: "PNG".to_string(),
            params: vec![],
            content_id: Some(format!("<{cid}>")),
            encoding: "base64".to_string(),
            size: 500,
            lines: None,
            disposition: Some(Disposition {
                kind: "INLINE".to_string(),
                params: vec![("FILENAME".to_string(), format!("{cid}.png"))],
            }),
        }
    }

    fn mixed() -> BodyStructure {
        BodyStructure::Multipart {
            parts: vec![
                BodyStructure::Multipart {
                    parts: vec![text_part("PLAIN", "7bit"), text_part("HTML", "quoted-printable")],
                    subtype: "ALTERNATIVE".to_string(),
                    disposition: None,
                },
                pdf_attachment("report.pdf"),
            ],
            subtype: "MIXED".to_string(),
            disposition: None,
        }
    }

    #[test]
    fn group_preserves_order_and_merges() {
        let groups = group_messages(vec![
            vec![FetchData::Uid(9), FetchData::Rfc822Size(1)],
            vec![FetchData::Uid(7), FetchData::Rfc822Size(2)],
            vec![FetchData::Uid(9), FetchData::Flags(Flags::from_vec(vec![Flag::Seen]))],
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].uid, 9);
        assert_eq!(groups[0].items.len(), 3);
        assert_eq!(groups[1].uid, 7);
    }

    #[test]
    fn group_skips_uidless_responses() {
        let groups = group_messages(vec![vec![FetchData::Rfc822Size(1)]]);
        assert!(groups.is_empty());
    }

    #[test]
    fn headers_decode_encoded_words() {
        let raw = b"From: =?utf-8?B?QWxpY2U=?= <alice@x.com>\r\nTo: bob@x.com\r\nSubject: =?utf-8?Q?H=C3=A9llo?=\r\nDate: Mon, 1 Jan 2024 00:00:00 +0000\r\n\r\n".to_vec();
        let items = vec![
            FetchData::Uid(1),
            FetchData::Body {
                section: "HEADER.FIELDS (FROM TO SUBJECT DATE)".to_string(),
                data: Some(raw),
            },
        ];
        let headers = get_headers(&items);
        assert_eq!(headers.sender, "Alice <alice@x.com>");
        assert_eq!(headers.receiver, "bob@x.com");
        assert_eq!(headers.subject, "Héllo");
        assert!(headers.date.starts_with("Mon, 1 Jan 2024"));
    }

    #[test]
    fn part_numbers_single_part() {
        let bs = text_part("PLAIN", "7bit");
        let parts = numbered_parts(&bs);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].number, "1");
    }

    #[test]
    fn part_numbers_nested() {
        let bs = mixed();
        let numbers: Vec<String> = numbered_parts(&bs).into_iter().map(|p| p.number).collect();
        assert_eq!(numbers, vec!["1.1", "1.2", "2"]);
    }

    #[test]
    fn find_html_part() {
        let bs = mixed();
        assert_eq!(find_part(&bs, &PartSelector::html()), Some("1.2".to_string()));
        assert_eq!(find_part(&bs, &PartSelector::plain()), Some("1.1".to_string()));
    }

    #[test]
    fn find_part_by_filename() {
        let bs = mixed();
        assert_eq!(
            find_part(&bs, &PartSelector::Filename("report.pdf".to_string())),
            Some("2".to_string())
        );
        assert_eq!(
            find_part(&bs, &PartSelector::Filename("\"report.pdf\"".to_string())),
            Some("2".to_string())
        );
    }

    #[test]
    fn find_part_by_cid() {
        let bs = BodyStructure::Multipart {
            parts: vec![text_part("HTML", "7bit"), inline_png("image0")],
            subtype: "RELATED".to_string(),
            disposition: None,
        };
        assert_eq!(
            find_part(&bs, &PartSelector::Cid("image0".to_string())),
            Some("2".to_string())
        );
        assert_eq!(
            find_part(&bs, &PartSelector::Cid("<image0>".to_string())),
            Some("2".to_string())
        );
    }

    #[test]
    fn content_type_and_encoding_lookup() {
        let bs = mixed();
        assert_eq!(
            content_type_and_encoding(&bs, "1.2"),
            Some(("text/html".to_string(), "quoted-printable".to_string()))
        );
        assert_eq!(
            content_type_and_encoding(&bs, "2"),
            Some(("application/pdf".to_string(), "base64".to_string()))
        );
        assert_eq!(content_type_and_encoding(&bs, "9"), None);
    }

    #[test]
    fn attachments_listed_inline_excluded() {
        let bs = BodyStructure::Multipart {
            parts: vec![
                text_part("HTML", "7bit"),
                inline_png("image0"),
                pdf_attachment("a.pdf"),
            ],
            subtype: "MIXED".to_string(),
            disposition: None,
        };
        let attachments = attachment_list(&bs);
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].name, "a.pdf");
        assert_eq!(attachments[0].mime_type, "application/pdf");

        let inline = inline_attachment_list(&bs);
        assert_eq!(inline.len(), 1);
        assert_eq!(inline[0].0, "2");
        assert_eq!(inline[0].1.cid.as_deref(), Some("image0"));
    }

    #[test]
    fn body_part_tie_break() {
        let bs = mixed();
        assert_eq!(content_body_part(&bs), "1.2");
        assert_eq!(preview_body_part(&bs), "1.1");
    }

    #[test]
    fn body_part_fallback_is_one() {
        let bs = pdf_attachment("only.pdf");
        assert_eq!(content_body_part(&bs), "1");
    }

    #[test]
    fn decode_body_base64() {
        assert_eq!(decode_body(b"aGVsbG8=", "base64", false), "hello");
    }

    #[test]
    fn decode_body_qp_sanitized() {
        let decoded = decode_body(b"<p>H=C3=A9llo</p>", "quoted-printable", true);
        assert_eq!(decoded, "Héllo");
    }

    #[test]
    fn decode_body_tolerates_bad_padding() {
        // Should not panic and should decode the valid prefix
        let decoded = decode_body(b"aGVsbG8", "base64", false);
        assert!(decoded.starts_with("hel"));
    }

    #[test]
    fn preview_truncation() {
        let long = "x".repeat(150);
        assert_eq!(preview_text(&long, PREVIEW_LIMIT).chars().count(), 100);
        assert_eq!(preview_text("short", PREVIEW_LIMIT), "short");
    }

    #[test]
    fn cid_resolution() {
        let body = "<img src=\"cid:image0\"> and <img src=\"cid:other\">";
        let resolved = resolve_cid_references(
            body,
            &[(
                "image0".to_string(),
                "image/png".to_string(),
                "AAAA".to_string(),
            )],
        );
        assert!(resolved.contains("data:image/png;base64,AAAA"));
        assert!(resolved.contains("cid:other"));
    }
}
