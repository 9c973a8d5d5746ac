//! MIME encoding and decoding utilities.
//!
//! Base64, Quoted-Printable, and RFC 2047 encoded-word handling. The
//! decoders are deliberately lenient: mail in the wild regularly arrives
//! with truncated base64 padding or stray `=` sequences, and a body
//! decoder that refuses such input loses the whole message over a few
//! bytes. Malformed trailing data is truncated to the longest valid
//! prefix instead.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt::Write as _;

use crate::error::{Error, Result};

/// Encodes data as Base64.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decodes Base64 data strictly.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    STANDARD.decode(data).map_err(Into::into)
}

/// Decodes Base64 data, recovering from malformed trailing padding.
///
/// Whitespace is ignored. If the cleaned input length is not a multiple
/// of four, the trailing partial quantum is dropped and the remaining
/// prefix decoded. An input that fails even after truncation yields an
/// empty vector rather than an error.
#[must_use]
pub fn decode_base64_lossy(data: &str) -> Vec<u8> {
    let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();

    let valid_len = cleaned.len() - cleaned.len() % 4;
    let prefix = &cleaned[..valid_len];

    STANDARD
        .decode(prefix)
        .or_else(|_| {
            // Padding inside the prefix can still trip the decoder;
            // retry without any '=' characters.
            let unpadded: String = prefix.chars().filter(|&c| c != '=').collect();
            let len = unpadded.len() - unpadded.len() % 4;
            base64::engine::general_purpose::STANDARD_NO_PAD.decode(&unpadded[..len])
        })
        .unwrap_or_default()
}

/// Maximum line length for Quoted-Printable encoding.
const MAX_LINE_LENGTH: usize = 76;

/// Encodes text using Quoted-Printable encoding (RFC 2045).
#[must_use]
pub fn encode_quoted_printable(text: &str) -> String {
    let mut result = String::new();
    let mut line_length = 0;

    for byte in text.as_bytes() {
        if line_length >= MAX_LINE_LENGTH - 3 {
            result.push_str("=\r\n");
            line_length = 0;
        }

        match byte {
            // Printable ASCII except '=' passes through
            b'!'..=b'<' | b'>'..=b'~' => {
                result.push(*byte as char);
                line_length += 1;
            }
            b' ' => {
                if line_length >= MAX_LINE_LENGTH - 1 {
                    result.push_str("=20");
                    line_length += 3;
                } else {
                    result.push(' ');
                    line_length += 1;
                }
            }
            _ => {
                result.push('=');
                let _ = write!(result, "{byte:02X}");
                line_length += 3;
            }
        }
    }

    result
}

/// Decodes Quoted-Printable text (RFC 2045).
///
/// Lenient: an `=` followed by anything other than two hex digits or a
/// line break is kept literally, and a trailing `=` at end of input is
/// dropped. Bytes that do not form valid UTF-8 are replaced.
#[must_use]
pub fn decode_quoted_printable(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if b != b'=' {
            result.push(b);
            i += 1;
            continue;
        }

        // Soft line break: =\r\n or =\n
        if bytes.get(i + 1) == Some(&b'\r') && bytes.get(i + 2) == Some(&b'\n') {
            i += 3;
            continue;
        }
        if bytes.get(i + 1) == Some(&b'\n') {
            i += 2;
            continue;
        }

        match (bytes.get(i + 1), bytes.get(i + 2)) {
            (Some(&hi), Some(&lo)) if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() => {
                let hex = [hi, lo];
                // Both bytes checked as hex digits above
                if let Ok(s) = std::str::from_utf8(&hex)
                    && let Ok(byte) = u8::from_str_radix(s, 16)
                {
                    result.push(byte);
                }
                i += 3;
            }
            (None, _) => {
                // Dangling '=' at end of input, drop it
                i += 1;
            }
            _ => {
                // Not a valid escape, keep literally
                result.push(b'=');
                i += 1;
            }
        }
    }

    String::from_utf8_lossy(&result).into_owned()
}

/// Encodes a header value using RFC 2047 encoding.
///
/// Values that are pure ASCII without encoded-word trigger characters
/// are returned unchanged.
#[must_use]
pub fn encode_rfc2047(text: &str, charset: &str) -> String {
    if text.chars().all(|c| c.is_ascii() && c != '=' && c != '?') {
        return text.to_string();
    }

    let encoded = encode_base64(text.as_bytes());
    format!("=?{charset}?B?{encoded}?=")
}

/// Decodes a header value containing RFC 2047 encoded-words.
///
/// Multiple adjacent encoded-words are decoded in place; surrounding
/// plain text is preserved. Unknown charsets and malformed words are
/// left as-is.
///
/// # Errors
///
/// Returns an error only when an encoded-word declares an unsupported
/// encoding letter (anything other than `B` or `Q`).
pub fn decode_rfc2047(text: &str) -> Result<String> {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;
    let mut last_was_encoded = false;

    while let Some(start) = rest.find("=?") {
        let (plain, candidate) = rest.split_at(start);
        // Whitespace between two encoded-words is dropped per RFC 2047
        if !(last_was_encoded && plain.chars().all(char::is_whitespace)) {
            result.push_str(plain);
        }

        match split_encoded_word(candidate) {
            Some((charset, encoding, payload, remaining)) => {
                result.push_str(&decode_word(charset, encoding, payload)?);
                rest = remaining;
                last_was_encoded = true;
            }
            None => {
                // '=?' that does not open a well-formed word
                result.push_str("=?");
                rest = &candidate[2..];
                last_was_encoded = false;
            }
        }
    }

    result.push_str(rest);
    Ok(result)
}

/// Splits `=?charset?enc?payload?=rest` into its pieces.
fn split_encoded_word(s: &str) -> Option<(&str, &str, &str, &str)> {
    let inner = s.strip_prefix("=?")?;
    let (charset, inner) = inner.split_once('?')?;
    let (encoding, inner) = inner.split_once('?')?;
    let (payload, rest) = inner.split_once("?=")?;
    if charset.is_empty() || encoding.len() != 1 {
        return None;
    }
    Some((charset, encoding, payload, rest))
}

fn decode_word(charset: &str, encoding: &str, payload: &str) -> Result<String> {
    // Only UTF-8 and ASCII-compatible charsets are decoded; others pass
    // through after transfer decoding, which is correct for the common
    // us-ascii case and lossy-but-readable otherwise.
    let _ = charset;
    match encoding {
        "B" | "b" => Ok(String::from_utf8_lossy(&decode_base64_lossy(payload)).into_owned()),
        "Q" | "q" => {
            let with_spaces = payload.replace('_', " ");
            Ok(decode_quoted_printable(&with_spaces))
        }
        other => Err(Error::InvalidEncoding(format!(
            "Unknown encoded-word encoding: {other}"
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn base64_round_trip() {
        let data = b"Hello, World!";
        let encoded = encode_base64(data);
        assert_eq!(encoded, "SGVsbG8sIFdvcmxkIQ==");
        assert_eq!(decode_base64(&encoded).unwrap(), data);
    }

    #[test]
    fn base64_lossy_truncated_padding() {
        // "Hello" is "SGVsbG8="; with the padding gone the trailing
        // partial quantum is dropped
        let decoded = decode_base64_lossy("SGVsbG8");
        assert_eq!(decoded, b"Hel");
    }

    #[test]
    fn base64_lossy_whitespace() {
        let decoded = decode_base64_lossy("SGVs\r\nbG8s\r\nIFdvcmxkIQ==");
        assert_eq!(decoded, b"Hello, World!");
    }

    #[test]
    fn base64_lossy_garbage_is_empty() {
        assert!(decode_base64_lossy("!!!!").is_empty());
    }

    #[test]
    fn quoted_printable_encode_ascii() {
        assert_eq!(encode_quoted_printable("Hello, World!"), "Hello, World!");
    }

    #[test]
    fn quoted_printable_encode_non_ascii() {
        let encoded = encode_quoted_printable("Héllo");
        assert!(encoded.contains("=C3"));
    }

    #[test]
    fn quoted_printable_decode() {
        assert_eq!(decode_quoted_printable("H=C3=A9llo"), "Héllo");
    }

    #[test]
    fn quoted_printable_soft_line_break() {
        assert_eq!(decode_quoted_printable("Hello=\r\nWorld"), "HelloWorld");
        assert_eq!(decode_quoted_printable("Hello=\nWorld"), "HelloWorld");
    }

    #[test]
    fn quoted_printable_malformed_escape_kept() {
        assert_eq!(decode_quoted_printable("a=ZZb"), "a=ZZb");
    }

    #[test]
    fn quoted_printable_dangling_equals_dropped() {
        assert_eq!(decode_quoted_printable("trailing="), "trailing");
    }

    #[test]
    fn rfc2047_encode_plain() {
        assert_eq!(encode_rfc2047("Hello", "utf-8"), "Hello");
    }

    #[test]
    fn rfc2047_encode_non_ascii() {
        let encoded = encode_rfc2047("Héllo", "utf-8");
        assert!(encoded.starts_with("=?utf-8?B?"));
        assert!(encoded.ends_with("?="));
    }

    #[test]
    fn rfc2047_decode_base64_word() {
        assert_eq!(decode_rfc2047("=?utf-8?B?SMOpbGxv?=").unwrap(), "Héllo");
    }

    #[test]
    fn rfc2047_decode_q_word() {
        assert_eq!(decode_rfc2047("=?utf-8?Q?H=C3=A9llo?=").unwrap(), "Héllo");
    }

    #[test]
    fn rfc2047_decode_underscore_is_space() {
        assert_eq!(
            decode_rfc2047("=?utf-8?Q?Hello_World?=").unwrap(),
            "Hello World"
        );
    }

    #[test]
    fn rfc2047_decode_mixed_text() {
        assert_eq!(
            decode_rfc2047("Re: =?utf-8?B?w4fDtnA=?= Kutusu").unwrap(),
            "Re: Çöp Kutusu"
        );
    }

    #[test]
    fn rfc2047_adjacent_words_join() {
        assert_eq!(
            decode_rfc2047("=?utf-8?Q?Hello?= =?utf-8?Q?World?=").unwrap(),
            "HelloWorld"
        );
    }

    #[test]
    fn rfc2047_malformed_left_alone() {
        assert_eq!(decode_rfc2047("=?broken").unwrap(), "=?broken");
    }

    #[test]
    fn round_trip_encode_decode() {
        let original = "Çöp Kutusu — テスト";
        let encoded = encode_rfc2047(original, "utf-8");
        assert_eq!(decode_rfc2047(&encoded).unwrap(), original);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn base64_round_trips(data in prop::collection::vec(any::<u8>(), 0..256)) {
                let encoded = encode_base64(&data);
                prop_assert_eq!(decode_base64(&encoded).unwrap(), data.clone());
                prop_assert_eq!(decode_base64_lossy(&encoded), data);
            }

            #[test]
            fn quoted_printable_round_trips(s in "\\PC*") {
                let encoded = encode_quoted_printable(&s);
                prop_assert_eq!(decode_quoted_printable(&encoded), s);
            }

            #[test]
            fn rfc2047_round_trips(s in "[a-zA-Zàéöü日本 ]{0,40}") {
                let encoded = encode_rfc2047(&s, "utf-8");
                prop_assert_eq!(decode_rfc2047(&encoded).unwrap(), s);
            }

            #[test]
            fn lossy_base64_never_panics(s in "\\PC*") {
                let _ = decode_base64_lossy(&s);
            }
        }
    }
}
