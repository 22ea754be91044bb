//! Transfer-encoding and header-encoding decoders.
//!
//! The ingestion pipeline only reads mail, so this module carries the
//! decode half of MIME: Base64, Quoted-Printable, and RFC 2047 headers.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{Error, Result};

/// Decodes Base64 data, tolerating embedded whitespace and line breaks.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(cleaned).map_err(Into::into)
}

/// Decodes Quoted-Printable data (RFC 2045) into raw bytes.
///
/// Soft line breaks (`=` at end of line) are removed; `=XX` sequences are
/// decoded to their byte value.
///
/// # Errors
///
/// Returns an error if the input contains an invalid or truncated escape
/// sequence.
pub fn decode_quoted_printable(text: &str) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(text.len());
    let mut bytes = text.bytes().peekable();

    while let Some(b) = bytes.next() {
        if b != b'=' {
            result.push(b);
            continue;
        }

        // Soft line break: =\r\n or =\n
        match bytes.peek() {
            Some(b'\r') => {
                bytes.next();
                if bytes.peek() == Some(&b'\n') {
                    bytes.next();
                }
                continue;
            }
            Some(b'\n') => {
                bytes.next();
                continue;
            }
            _ => {}
        }

        let hi = bytes.next();
        let lo = bytes.next();
        match (hi, lo) {
            (Some(hi), Some(lo)) => {
                let hex = [hi, lo];
                let hex = std::str::from_utf8(&hex)
                    .map_err(|_| Error::InvalidEncoding("non-ASCII escape".to_string()))?;
                let byte = u8::from_str_radix(hex, 16)
                    .map_err(|e| Error::InvalidEncoding(format!("invalid hex: {e}")))?;
                result.push(byte);
            }
            _ => {
                return Err(Error::InvalidEncoding(
                    "incomplete escape sequence".to_string(),
                ));
            }
        }
    }

    Ok(result)
}

/// Decodes an RFC 2047 encoded-word header value.
///
/// Handles `=?charset?B?...?=` and `=?charset?Q?...?=` words, possibly
/// several per header; text outside encoded words passes through verbatim.
/// Values with no encoded words are returned unchanged.
///
/// # Errors
///
/// Returns an error if an encoded word carries an invalid payload.
pub fn decode_rfc2047(value: &str) -> Result<String> {
    if !value.contains("=?") {
        return Ok(value.to_string());
    }

    let mut out = String::new();
    let mut rest = value;

    while let Some(start) = rest.find("=?") {
        out.push_str(&rest[..start]);
        let word = &rest[start..];

        let Some((decoded, consumed)) = decode_encoded_word(word)? else {
            // Not actually an encoded word; emit the marker and move on.
            out.push_str("=?");
            rest = &word[2..];
            continue;
        };
        out.push_str(&decoded);
        rest = &word[consumed..];
        // Whitespace between adjacent encoded words is not significant.
        if rest.trim_start().starts_with("=?") {
            rest = rest.trim_start();
        }
    }

    out.push_str(rest);
    Ok(out)
}

/// Decodes one leading `=?charset?enc?text?=` word.
///
/// Returns the decoded text and the byte length consumed, or `None` when
/// the input does not form a complete encoded word.
fn decode_encoded_word(word: &str) -> Result<Option<(String, usize)>> {
    let inner = &word[2..];
    let Some(charset_end) = inner.find('?') else {
        return Ok(None);
    };
    let after_charset = &inner[charset_end + 1..];
    let Some(enc_end) = after_charset.find('?') else {
        return Ok(None);
    };
    let encoding = &after_charset[..enc_end];
    let after_enc = &after_charset[enc_end + 1..];
    let Some(text_end) = after_enc.find("?=") else {
        return Ok(None);
    };
    let payload = &after_enc[..text_end];

    let decoded = match encoding.to_ascii_uppercase().as_str() {
        "B" => String::from_utf8(decode_base64(payload)?)?,
        "Q" => {
            let with_spaces = payload.replace('_', " ");
            String::from_utf8(decode_quoted_printable(&with_spaces)?)?
        }
        other => {
            return Err(Error::InvalidEncoding(format!(
                "unknown encoded-word encoding {other:?}"
            )));
        }
    };

    // 2 for "=?", charset, '?', encoding, '?', payload, "?="
    let consumed = 2 + charset_end + 1 + enc_end + 1 + text_end + 2;
    Ok(Some((decoded, consumed)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_base64_with_line_breaks() {
        let encoded = "SGVsbG8s\r\nIFdvcmxk\r\nIQ==";
        assert_eq!(decode_base64(encoded).unwrap(), b"Hello, World!");
    }

    #[test]
    fn test_decode_base64_invalid() {
        assert!(decode_base64("not base64!!!").is_err());
    }

    #[test]
    fn test_decode_quoted_printable() {
        let decoded = decode_quoted_printable("Caf=C3=A9 time").unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), "Café time");
    }

    #[test]
    fn test_decode_quoted_printable_soft_break() {
        let decoded = decode_quoted_printable("long =\r\nline").unwrap();
        assert_eq!(decoded, b"long line");
    }

    #[test]
    fn test_decode_quoted_printable_truncated_escape() {
        assert!(decode_quoted_printable("oops=4").is_err());
    }

    #[test]
    fn test_decode_rfc2047_b_word() {
        let decoded = decode_rfc2047("=?utf-8?B?SGVsbG8=?=").unwrap();
        assert_eq!(decoded, "Hello");
    }

    #[test]
    fn test_decode_rfc2047_q_word_with_underscores() {
        let decoded = decode_rfc2047("=?utf-8?Q?Invoice_for_Unit_4B?=").unwrap();
        assert_eq!(decoded, "Invoice for Unit 4B");
    }

    #[test]
    fn test_decode_rfc2047_plain_passthrough() {
        assert_eq!(decode_rfc2047("Plain subject").unwrap(), "Plain subject");
    }

    #[test]
    fn test_decode_rfc2047_adjacent_words() {
        let decoded = decode_rfc2047("=?utf-8?B?SGVs?= =?utf-8?B?bG8=?=").unwrap();
        assert_eq!(decoded, "Hello");
    }
}
