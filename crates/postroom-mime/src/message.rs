//! Parsed message structure and accessors.
//!
//! `Message::parse` is a pure transformation from raw message bytes to
//! structured metadata; it performs no I/O. Attachment content stays in its
//! encoded form until a caller asks for it, so metadata-only scans never
//! pay for decoding.

use chrono::{DateTime, Utc};

use crate::encoding::{decode_base64, decode_quoted_printable};
use crate::error::{Error, Result};
use crate::header::Headers;

/// Maximum multipart nesting depth.
const MAX_DEPTH: usize = 8;

/// Transfer encoding of a MIME part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7-bit ASCII (also the default).
    SevenBit,
    /// 8-bit binary.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses a transfer encoding from its header value.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::SevenBit,
        }
    }
}

/// Attachment metadata discovered during a scan.
///
/// Carries no content; bytes are extracted separately via
/// [`Message::attachment_bytes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentInfo {
    /// Attachment filename.
    pub filename: String,
    /// MIME content type.
    pub content_type: String,
    /// Estimated decoded size in bytes.
    pub size: u64,
}

/// One MIME part.
#[derive(Debug, Clone)]
pub struct Part {
    /// Part headers.
    pub headers: Headers,
    /// Raw (still transfer-encoded) part body.
    pub body: Vec<u8>,
    /// Child parts for multipart parts.
    pub children: Vec<Part>,
}

impl Part {
    /// Returns the MIME type (lowercased, parameters stripped).
    #[must_use]
    pub fn mime_type(&self) -> String {
        mime_type_of(&self.headers)
    }

    /// Returns the transfer encoding of this part.
    #[must_use]
    pub fn transfer_encoding(&self) -> TransferEncoding {
        self.headers
            .get("content-transfer-encoding")
            .map_or(TransferEncoding::SevenBit, TransferEncoding::parse)
    }

    /// Decodes the part body according to its transfer encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if the encoded payload is invalid.
    pub fn decode_body(&self) -> Result<Vec<u8>> {
        match self.transfer_encoding() {
            TransferEncoding::Base64 => decode_base64(&String::from_utf8_lossy(&self.body)),
            TransferEncoding::QuotedPrintable => {
                decode_quoted_printable(&String::from_utf8_lossy(&self.body))
            }
            _ => Ok(self.body.clone()),
        }
    }

    /// Returns the attachment filename, if this part is an attachment.
    ///
    /// A part counts as an attachment when its Content-Disposition is
    /// `attachment`, or when a filename/name parameter is present on a
    /// non-text disposition.
    #[must_use]
    pub fn attachment_filename(&self) -> Option<String> {
        let disposition = self.headers.get("content-disposition").unwrap_or("");
        let is_attachment = disposition.to_lowercase().starts_with("attachment");

        let filename = header_param(disposition, "filename").or_else(|| {
            self.headers
                .get("content-type")
                .and_then(|ct| header_param(ct, "name"))
        });

        match filename {
            Some(name) if is_attachment || !self.mime_type().starts_with("text/") => Some(name),
            _ if is_attachment => Some("unnamed".to_string()),
            _ => None,
        }
    }

    /// Estimates the decoded size without decoding.
    #[must_use]
    pub fn estimated_size(&self) -> u64 {
        match self.transfer_encoding() {
            TransferEncoding::Base64 => {
                let payload = self.body.iter().filter(|b| !b.is_ascii_whitespace());
                let padding = self
                    .body
                    .iter()
                    .rev()
                    .take_while(|&&b| b == b'=' || b.is_ascii_whitespace())
                    .filter(|&&b| b == b'=')
                    .count();
                ((payload.count() / 4) * 3).saturating_sub(padding) as u64
            }
            _ => self.body.len() as u64,
        }
    }
}

/// A parsed email message.
#[derive(Debug, Clone)]
pub struct Message {
    /// Top-level message headers.
    pub headers: Headers,
    /// Body of a single-part message (still transfer-encoded).
    pub body: Vec<u8>,
    /// Parts of a multipart message (empty for single-part).
    pub parts: Vec<Part>,
}

impl Message {
    /// Parses raw message bytes.
    ///
    /// # Errors
    ///
    /// Returns an error for input that is not an email message (empty
    /// bytes, no header block) or a multipart message whose declared
    /// boundary is missing or absent from the body.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        if raw.is_empty() {
            return Err(Error::Empty);
        }

        let (header_bytes, body) = split_header_block(raw);
        let headers = Headers::parse(&String::from_utf8_lossy(header_bytes))?;

        let parts = parse_subparts(&headers, body, 0)?;
        Ok(Self {
            headers,
            body: body.to_vec(),
            parts,
        })
    }

    /// Returns the decoded subject, if present and non-empty.
    #[must_use]
    pub fn subject(&self) -> Option<String> {
        self.headers
            .get_decoded("subject")
            .filter(|s| !s.is_empty())
    }

    /// Returns the Message-ID with surrounding angle brackets stripped.
    #[must_use]
    pub fn message_id(&self) -> Option<String> {
        self.headers.get("message-id").map(|id| {
            id.trim()
                .trim_start_matches('<')
                .trim_end_matches('>')
                .to_string()
        })
    }

    /// Returns display text for the sender.
    ///
    /// When the header resolves to an address list, the first entry wins.
    #[must_use]
    pub fn from_display(&self) -> Option<String> {
        self.headers.get_decoded("from").and_then(first_address)
    }

    /// Returns display text for the recipient (first address of the list).
    #[must_use]
    pub fn to_display(&self) -> Option<String> {
        self.headers.get_decoded("to").and_then(first_address)
    }

    /// Returns the parsed Date header in UTC.
    #[must_use]
    pub fn received_at(&self) -> Option<DateTime<Utc>> {
        self.headers
            .get("date")
            .and_then(|d| DateTime::parse_from_rfc2822(d.trim()).ok())
            .map(|d| d.with_timezone(&Utc))
    }

    /// Returns the complete plain-text body.
    ///
    /// Multipart messages yield the first `text/plain` part found
    /// depth-first; a single-part text message yields its decoded body.
    /// No truncation happens here.
    #[must_use]
    pub fn body_text(&self) -> String {
        if self.parts.is_empty() {
            let part = Part {
                headers: self.headers.clone(),
                body: self.body.clone(),
                children: Vec::new(),
            };
            if part.mime_type().starts_with("text/") {
                return decode_lossy(&part);
            }
            return String::new();
        }

        find_text_part(&self.parts)
            .map(decode_lossy)
            .unwrap_or_default()
    }

    /// Returns the first `max_chars` characters of the plain-text body,
    /// with control characters filtered out.
    #[must_use]
    pub fn preview(&self, max_chars: usize) -> String {
        let text = self.body_text();
        let cleaned: String = text
            .chars()
            .filter(|c| !c.is_control())
            .take(max_chars)
            .collect();
        cleaned.trim().to_string()
    }

    /// Scans for attachment metadata without decoding any content.
    #[must_use]
    pub fn attachments(&self) -> Vec<AttachmentInfo> {
        let mut found = Vec::new();
        collect_attachments(&self.parts, &mut found);
        found
    }

    /// Extracts and decodes one named attachment's bytes.
    ///
    /// Returns `Ok(None)` when no attachment with that filename exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the attachment payload fails to decode.
    pub fn attachment_bytes(&self, filename: &str) -> Result<Option<Vec<u8>>> {
        match find_attachment(&self.parts, filename) {
            Some(part) => part.decode_body().map(Some),
            None => Ok(None),
        }
    }
}

/// Splits raw bytes into the header block and the body at the first blank
/// line. Input with no blank line is all headers.
fn split_header_block(raw: &[u8]) -> (&[u8], &[u8]) {
    if let Some(idx) = find_subslice(raw, b"\r\n\r\n") {
        (&raw[..idx], &raw[idx + 4..])
    } else if let Some(idx) = find_subslice(raw, b"\n\n") {
        (&raw[..idx], &raw[idx + 2..])
    } else {
        (raw, &[][..])
    }
}

/// Parses the child parts of a multipart body, recursing into nested
/// multiparts up to [`MAX_DEPTH`].
fn parse_subparts(headers: &Headers, body: &[u8], depth: usize) -> Result<Vec<Part>> {
    let mime = mime_type_of(headers);
    if !mime.starts_with("multipart/") {
        return Ok(Vec::new());
    }
    if depth >= MAX_DEPTH {
        return Ok(Vec::new());
    }

    let content_type = headers.get("content-type").unwrap_or("");
    let boundary = header_param(content_type, "boundary").ok_or(Error::MissingBoundary)?;

    let sections = split_multipart(body, &boundary);
    if sections.is_empty() {
        return Err(Error::BoundaryNotFound(boundary));
    }

    let mut parts = Vec::with_capacity(sections.len());
    for section in sections {
        let (header_bytes, part_body) = split_header_block(section);
        let part_headers =
            Headers::parse(&String::from_utf8_lossy(header_bytes)).unwrap_or_default();
        let children = parse_subparts(&part_headers, part_body, depth + 1)?;
        parts.push(Part {
            headers: part_headers,
            body: trim_trailing_crlf(part_body).to_vec(),
            children,
        });
    }
    Ok(parts)
}

/// Splits a multipart body into sections between boundary delimiter lines.
///
/// Stops at the closing `--boundary--` line; a missing closing delimiter is
/// tolerated (the final section runs to end of input).
fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
    let delim = format!("--{boundary}");
    let delim = delim.as_bytes();

    let mut sections = Vec::new();
    let mut section_start: Option<usize> = None;
    let mut pos = 0;

    while pos < body.len() {
        let line_end = body[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(body.len(), |p| pos + p + 1);
        let line = trim_trailing_crlf(&body[pos..line_end]);

        if line.starts_with(delim) {
            if let Some(start) = section_start.take() {
                sections.push(&body[start..pos]);
            }
            if line[delim.len()..].starts_with(b"--") {
                // Closing delimiter.
                return sections;
            }
            section_start = Some(line_end);
        }
        pos = line_end;
    }

    if let Some(start) = section_start {
        sections.push(&body[start..]);
    }
    sections
}

/// Depth-first search for the first `text/plain` non-attachment part.
fn find_text_part(parts: &[Part]) -> Option<&Part> {
    for part in parts {
        if !part.children.is_empty() {
            if let Some(found) = find_text_part(&part.children) {
                return Some(found);
            }
        } else if part.mime_type() == "text/plain" && part.attachment_filename().is_none() {
            return Some(part);
        }
    }
    None
}

fn collect_attachments(parts: &[Part], found: &mut Vec<AttachmentInfo>) {
    for part in parts {
        if part.children.is_empty() {
            if let Some(filename) = part.attachment_filename() {
                found.push(AttachmentInfo {
                    filename,
                    content_type: part.mime_type(),
                    size: part.estimated_size(),
                });
            }
        } else {
            collect_attachments(&part.children, found);
        }
    }
}

fn find_attachment<'a>(parts: &'a [Part], filename: &str) -> Option<&'a Part> {
    for part in parts {
        if part.children.is_empty() {
            if part.attachment_filename().as_deref() == Some(filename) {
                return Some(part);
            }
        } else if let Some(found) = find_attachment(&part.children, filename) {
            return Some(found);
        }
    }
    None
}

fn decode_lossy(part: &Part) -> String {
    part.decode_body()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_else(|_| String::from_utf8_lossy(&part.body).into_owned())
}

/// Returns the MIME type of a header set (lowercased, no parameters).
fn mime_type_of(headers: &Headers) -> String {
    headers
        .get("content-type")
        .map_or_else(|| "text/plain".to_string(), |ct| {
            ct.split(';').next().unwrap_or("").trim().to_lowercase()
        })
}

/// Extracts a `key=value` parameter from a structured header value,
/// handling quoted and unquoted forms.
fn header_param(value: &str, key: &str) -> Option<String> {
    let lower = value.to_lowercase();
    let marker = format!("{key}=");
    let idx = lower.find(&marker)?;
    let rest = &value[idx + marker.len()..];

    if let Some(stripped) = rest.strip_prefix('"') {
        let end = stripped.find('"')?;
        Some(stripped[..end].to_string())
    } else {
        let end = rest
            .find(|c: char| c.is_whitespace() || c == ';')
            .unwrap_or(rest.len());
        Some(rest[..end].to_string())
    }
}

/// Takes the first entry of a comma-separated address list and renders it
/// for display: the name when present, otherwise the bare address.
fn first_address(list: String) -> Option<String> {
    let first = list.split(',').next()?.trim();
    if first.is_empty() {
        return None;
    }

    if let Some(open) = first.find('<') {
        let name = first[..open].trim().trim_matches('"').trim();
        if !name.is_empty() {
            return Some(name.to_string());
        }
        let addr = first[open + 1..].trim_end_matches('>').trim();
        return Some(addr.to_string());
    }

    Some(first.to_string())
}

fn trim_trailing_crlf(bytes: &[u8]) -> &[u8] {
    let mut end = bytes.len();
    while end > 0 && (bytes[end - 1] == b'\n' || bytes[end - 1] == b'\r') {
        end -= 1;
    }
    &bytes[..end]
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
