//! Wire codecs: modified UTF-7 folder names and IMAP date formatting.
//!
//! Modified UTF-7 (RFC 3501 §5.1.3) differs from regular UTF-7: the
//! shift character is `&`, the base64 alphabet uses `,` instead of `/`,
//! padding is stripped, and a literal ampersand is written `&-`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use chrono::NaiveDate;

use crate::error::{Error, Result};

/// Encodes a folder name into modified UTF-7.
///
/// Printable ASCII passes through; runs of anything else are base64
/// over their UTF-16BE encoding, `/` replaced by `,`, wrapped in
/// `&…-`. A bare `&` becomes `&-`.
#[must_use]
pub fn encode_modified_utf7(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut shifted: Vec<u16> = Vec::new();

    let flush = |shifted: &mut Vec<u16>, out: &mut String| {
        if shifted.is_empty() {
            return;
        }
        let mut bytes = Vec::with_capacity(shifted.len() * 2);
        for unit in shifted.drain(..) {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        out.push('&');
        out.push_str(&STANDARD_NO_PAD.encode(&bytes).replace('/', ","));
        out.push('-');
    };

    for c in input.chars() {
        if ('\u{20}'..='\u{7e}').contains(&c) {
            flush(&mut shifted, &mut out);
            if c == '&' {
                out.push_str("&-");
            } else {
                out.push(c);
            }
        } else {
            let mut units = [0u16; 2];
            shifted.extend_from_slice(c.encode_utf16(&mut units));
        }
    }
    flush(&mut shifted, &mut out);

    out
}

/// Decodes a modified UTF-7 folder name.
///
/// Tolerant of real-world deviations: `&-` yields a literal `&`, a
/// shift sequence that never terminates is kept verbatim, and invalid
/// base64 inside a sequence falls back to the raw text.
#[must_use]
pub fn decode_modified_utf7(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('&') {
        let (plain, tail) = rest.split_at(pos);
        out.push_str(plain);

        let tail = &tail[1..]; // past '&'
        let Some(end) = tail.find('-') else {
            // Unterminated shift; keep the raw text
            out.push('&');
            out.push_str(tail);
            return out;
        };

        let (encoded, remaining) = tail.split_at(end);
        if encoded.is_empty() {
            out.push('&');
        } else {
            match decode_shift(encoded) {
                Some(decoded) => out.push_str(&decoded),
                None => {
                    out.push('&');
                    out.push_str(encoded);
                    out.push('-');
                }
            }
        }
        rest = &remaining[1..]; // past '-'
    }

    out.push_str(rest);
    out
}

/// Decodes the base64 payload of one `&…-` sequence.
fn decode_shift(encoded: &str) -> Option<String> {
    let bytes = STANDARD_NO_PAD.decode(encoded.replace(',', "/")).ok()?;
    if bytes.len() % 2 != 0 {
        return None;
    }

    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();

    char::decode_utf16(units.into_iter())
        .collect::<std::result::Result<String, _>>()
        .ok()
}

/// Reformats an ISO date (`YYYY-MM-DD`) to the IMAP form (`DD-Mon-YYYY`).
///
/// # Errors
///
/// Returns [`Error::Validation`] when the input is not a valid ISO date.
pub fn to_imap_date(date: &str) -> Result<String> {
    let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|e| Error::Validation(format!("Invalid date {date:?}: {e}")))?;
    Ok(parsed.format("%d-%b-%Y").to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn ascii_passes_through() {
        assert_eq!(encode_modified_utf7("INBOX"), "INBOX");
        assert_eq!(decode_modified_utf7("INBOX"), "INBOX");
    }

    #[test]
    fn ampersand_escaped() {
        assert_eq!(encode_modified_utf7("A&B"), "A&-B");
        assert_eq!(decode_modified_utf7("A&-B"), "A&B");
    }

    #[test]
    fn turkish_trash_folder() {
        assert_eq!(encode_modified_utf7("Çöp Kutusu"), "&AMcA9g-p Kutusu");
        assert_eq!(decode_modified_utf7("&AMcA9g-p Kutusu"), "Çöp Kutusu");
    }

    #[test]
    fn japanese_round_trip() {
        let encoded = encode_modified_utf7("日本語");
        assert_eq!(encoded, "&ZeVnLIqe-");
        assert_eq!(decode_modified_utf7(&encoded), "日本語");
    }

    #[test]
    fn mixed_runs() {
        let original = "Entwürfe/Briefe";
        let encoded = encode_modified_utf7(original);
        assert_eq!(decode_modified_utf7(&encoded), original);
    }

    #[test]
    fn slash_in_base64_becomes_comma() {
        // U+FF10 FULLWIDTH DIGIT ZERO encodes with a '/' in plain base64
        let encoded = encode_modified_utf7("\u{ff10}");
        assert!(!encoded.contains('/'));
        assert_eq!(decode_modified_utf7(&encoded), "\u{ff10}");
    }

    #[test]
    fn unterminated_shift_kept_verbatim() {
        assert_eq!(decode_modified_utf7("Broken&AMc"), "Broken&AMc");
    }

    #[test]
    fn invalid_base64_kept_verbatim() {
        assert_eq!(decode_modified_utf7("&!!-x"), "&!!-x");
    }

    #[test]
    fn surrogate_pair_round_trip() {
        let original = "mail 📧 folder";
        assert_eq!(decode_modified_utf7(&encode_modified_utf7(original)), original);
    }

    #[test]
    fn imap_date_format() {
        assert_eq!(to_imap_date("1970-01-01").unwrap(), "01-Jan-1970");
        assert_eq!(to_imap_date("2024-12-31").unwrap(), "31-Dec-2024");
    }

    #[test]
    fn imap_date_rejects_invalid() {
        assert!(to_imap_date("not-a-date").is_err());
        assert!(to_imap_date("2024-13-01").is_err());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn round_trip_any_unicode(s in "\\PC*") {
                prop_assert_eq!(decode_modified_utf7(&encode_modified_utf7(&s)), s);
            }

            #[test]
            fn encoded_form_is_ascii(s in "\\PC*") {
                prop_assert!(encode_modified_utf7(&s).is_ascii());
            }
        }
    }
}
