//! Email header handling.

use std::collections::HashMap;

use crate::encoding::decode_rfc2047;
use crate::error::{Error, Result};

/// Collection of parsed email headers.
///
/// Lookup is case-insensitive; folded header lines (RFC 5322 continuation
/// lines) are unfolded during parsing.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    headers: HashMap<String, Vec<String>>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header value.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into().to_lowercase();
        self.headers.entry(name).or_default().push(value.into());
    }

    /// Gets the first value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_lowercase())
            .and_then(|v| v.first().map(String::as_str))
    }

    /// Gets the first value for a header with RFC 2047 encoded words decoded.
    ///
    /// Falls back to the raw value when decoding fails; a mis-encoded
    /// subject should not make a whole message unparseable.
    #[must_use]
    pub fn get_decoded(&self, name: &str) -> Option<String> {
        self.get(name)
            .map(|raw| decode_rfc2047(raw).unwrap_or_else(|_| raw.to_string()))
    }

    /// Returns true when no headers were parsed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Parses a raw header block.
    ///
    /// # Errors
    ///
    /// Returns an error if the block contains no valid `Name: value` line,
    /// which marks the input as not being an email message at all.
    pub fn parse(text: &str) -> Result<Self> {
        let mut headers = Self::new();
        let mut current_name: Option<String> = None;
        let mut current_value = String::new();

        for line in text.lines() {
            if line.is_empty() {
                break;
            }

            if line.starts_with(' ') || line.starts_with('\t') {
                // Continuation of the previous header.
                if current_name.is_some() {
                    current_value.push(' ');
                    current_value.push_str(line.trim());
                }
            } else {
                if let Some(name) = current_name.take() {
                    headers.add(name, current_value.trim().to_string());
                    current_value.clear();
                }

                if let Some((name, value)) = line.split_once(':') {
                    current_name = Some(name.trim().to_string());
                    current_value = value.trim().to_string();
                }
            }
        }

        if let Some(name) = current_name {
            headers.add(name, current_value.trim().to_string());
        }

        if headers.is_empty() {
            return Err(Error::InvalidHeader(
                "no header lines in header block".to_string(),
            ));
        }

        Ok(headers)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_case_insensitive_get() {
        let headers = Headers::parse(concat!(
            "From: sender@example.com\r\n",
            "Subject: Test Message\r\n",
        ))
        .unwrap();

        assert_eq!(headers.get("from"), Some("sender@example.com"));
        assert_eq!(headers.get("SUBJECT"), Some("Test Message"));
        assert_eq!(headers.get("to"), None);
    }

    #[test]
    fn test_parse_unfolds_continuation_lines() {
        let headers = Headers::parse(concat!(
            "Content-Type: multipart/mixed;\r\n",
            " boundary=\"frontier\"\r\n",
        ))
        .unwrap();

        assert_eq!(
            headers.get("content-type"),
            Some("multipart/mixed; boundary=\"frontier\"")
        );
    }

    #[test]
    fn test_parse_rejects_non_header_garbage() {
        assert!(Headers::parse("this is not an email").is_err());
    }

    #[test]
    fn test_get_decoded_subject() {
        let headers = Headers::parse("Subject: =?utf-8?B?SGVsbG8=?=\r\n").unwrap();
        assert_eq!(headers.get_decoded("subject"), Some("Hello".to_string()));
    }
}
