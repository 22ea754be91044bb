//! Stateful IMAP session.
//!
//! The protocol is session-bound and strictly sequenced: connect, select a
//! folder, search, fetch, then logout. One command is in flight at a time;
//! concurrent fetches for different purposes must use independent sessions.

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::{debug, trace};

use crate::config::{Config, Credentials};
use crate::error::{Error, Result};
use crate::types::{MailboxStatus, SearchCriteria, Uid};

/// Maximum response line length.
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Maximum literal size (bounds a single message body).
const MAX_LITERAL_SIZE: usize = 64 * 1024 * 1024;

/// One untagged response collected while a command ran.
#[derive(Debug)]
struct Untagged {
    /// Response text with literal markers left in place.
    text: String,
    /// Literal payloads in order of appearance.
    literals: Vec<Vec<u8>>,
}

/// An authenticated IMAP session over implicit TLS.
pub struct Session {
    reader: BufReader<TlsStream<TcpStream>>,
    write_buffer: BytesMut,
    tag_counter: u32,
    io_timeout: Duration,
}

impl Session {
    /// Connects, reads the server greeting, and authenticates.
    ///
    /// TCP + TLS establishment is bounded by `connect_timeout`; the
    /// greeting and LOGIN round-trip are bounded by `auth_timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectTimeout`] or [`Error::Auth`] on the
    /// respective phase failing, and transport errors otherwise.
    pub async fn connect(config: &Config, credentials: &Credentials) -> Result<Self> {
        debug!(host = %config.host, port = config.port, "connecting to mailbox");

        let stream = tokio::time::timeout(config.connect_timeout, async {
            let tcp = TcpStream::connect((config.host.as_str(), config.port)).await?;
            let connector = tls_connector();
            let server_name = ServerName::try_from(config.host.clone())?;
            Ok::<_, Error>(connector.connect(server_name, tcp).await?)
        })
        .await
        .map_err(|_| Error::ConnectTimeout(config.connect_timeout))??;

        let mut session = Self {
            reader: BufReader::new(stream),
            write_buffer: BytesMut::with_capacity(1024),
            tag_counter: 0,
            io_timeout: config.io_timeout,
        };

        tokio::time::timeout(config.auth_timeout, session.authenticate(credentials))
            .await
            .map_err(|_| Error::Auth("authentication timed out".to_string()))??;

        debug!(host = %config.host, "mailbox session established");
        Ok(session)
    }

    /// Selects a folder and returns its status.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Folder`] if the folder does not exist or access is
    /// denied.
    pub async fn select(&mut self, folder: &str) -> Result<MailboxStatus> {
        let responses = match self.command(&format!("SELECT {}", quote(folder))).await {
            Ok(responses) => responses,
            Err(Error::No(msg) | Error::Bad(msg)) => return Err(Error::Folder(msg)),
            Err(e) => return Err(e),
        };

        let mut status = MailboxStatus::default();
        for response in &responses {
            if let Some(count) = parse_count_response(&response.text, "EXISTS") {
                status.exists = count;
            }
            if let Some(count) = parse_count_response(&response.text, "RECENT") {
                status.recent = count;
            }
        }

        debug!(folder, exists = status.exists, "folder selected");
        Ok(status)
    }

    /// Searches the selected folder and returns matching UIDs.
    pub async fn uid_search(&mut self, criteria: SearchCriteria) -> Result<Vec<Uid>> {
        let responses = self
            .command(&format!("UID SEARCH {}", criteria.as_imap()))
            .await?;

        let mut uids = Vec::new();
        for response in &responses {
            if let Some(rest) = response.text.strip_prefix("SEARCH") {
                uids.extend(
                    rest.split_ascii_whitespace()
                        .filter_map(|n| n.parse::<u32>().ok())
                        .map(Uid),
                );
            }
        }

        debug!(criteria = criteria.as_imap(), count = uids.len(), "search complete");
        Ok(uids)
    }

    /// Fetches full raw bodies for the given UIDs in one pass.
    ///
    /// The whole operation runs under `timeout`; on expiry the partial
    /// result is discarded and [`Error::FetchTimeout`] is returned. The
    /// fetch uses BODY.PEEK so the `\Seen` flag is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FetchTimeout`] on deadline expiry, protocol errors
    /// otherwise.
    pub async fn uid_fetch_raw(
        &mut self,
        uids: &[Uid],
        timeout: Duration,
    ) -> Result<Vec<(Uid, Vec<u8>)>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }

        let set = uids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");

        let responses = tokio::time::timeout(
            timeout,
            self.command_inner(&format!("UID FETCH {set} (UID BODY.PEEK[])")),
        )
        .await
        .map_err(|_| Error::FetchTimeout(timeout))??;

        let mut messages = Vec::new();
        for mut response in responses {
            if !response.text.contains("FETCH") {
                continue;
            }
            let Some(uid) = parse_fetch_uid(&response.text) else {
                continue;
            };
            if response.literals.is_empty() {
                continue;
            }
            messages.push((uid, response.literals.swap_remove(0)));
        }

        debug!(requested = uids.len(), fetched = messages.len(), "fetch complete");
        Ok(messages)
    }

    /// Logs out and closes the session.
    ///
    /// Consumes the session; the connection is dropped regardless of
    /// whether the server acknowledged the LOGOUT.
    pub async fn logout(mut self) -> Result<()> {
        match self.command("LOGOUT").await {
            Ok(_) | Err(Error::Bye(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Reads the greeting and performs LOGIN.
    async fn authenticate(&mut self, credentials: &Credentials) -> Result<()> {
        let greeting = self.read_line().await?;
        trace!(%greeting, "server greeting");
        if !greeting.starts_with("* OK") && !greeting.starts_with("* PREAUTH") {
            return Err(Error::Protocol(format!("unexpected greeting: {greeting}")));
        }

        let command = format!(
            "LOGIN {} {}",
            quote(&credentials.username),
            quote(&credentials.password)
        );
        match self.command_inner(&command).await {
            Ok(_) => Ok(()),
            Err(Error::No(msg) | Error::Bad(msg)) => Err(Error::Auth(msg)),
            Err(e) => Err(e),
        }
    }

    /// Runs one command bounded by the session I/O timeout.
    async fn command(&mut self, command: &str) -> Result<Vec<Untagged>> {
        let timeout = self.io_timeout;
        tokio::time::timeout(timeout, self.command_inner(command))
            .await
            .map_err(|_| Error::Timeout(timeout))?
    }

    /// Sends one command and collects responses until the tagged status.
    async fn command_inner(&mut self, command: &str) -> Result<Vec<Untagged>> {
        let tag = self.next_tag();
        self.write_buffer.clear();
        self.write_buffer.extend_from_slice(tag.as_bytes());
        self.write_buffer.extend_from_slice(b" ");
        self.write_buffer.extend_from_slice(command.as_bytes());
        self.write_buffer.extend_from_slice(b"\r\n");

        let buffer = self.write_buffer.split().freeze();
        let stream = self.reader.get_mut();
        stream.write_all(&buffer).await?;
        stream.flush().await?;

        let mut untagged = Vec::new();
        loop {
            let line = self.read_line().await?;

            if let Some(rest) = line.strip_prefix(&tag) {
                let rest = rest.trim_start();
                if rest.starts_with("OK") {
                    return Ok(untagged);
                }
                if let Some(msg) = rest.strip_prefix("NO") {
                    return Err(Error::No(msg.trim().to_string()));
                }
                if let Some(msg) = rest.strip_prefix("BAD") {
                    return Err(Error::Bad(msg.trim().to_string()));
                }
                return Err(Error::Protocol(format!("unexpected status line: {line}")));
            }

            if let Some(rest) = line.strip_prefix("* ") {
                if let Some(msg) = rest.strip_prefix("BYE") {
                    return Err(Error::Bye(msg.trim().to_string()));
                }
                untagged.push(self.read_untagged(rest.to_string()).await?);
                continue;
            }

            if line.starts_with('+') {
                return Err(Error::Protocol(
                    "unexpected continuation request".to_string(),
                ));
            }

            trace!(%line, "ignoring unrecognized response line");
        }
    }

    /// Completes one untagged response, pulling in any literals.
    ///
    /// A line ending in `{n}` announces n bytes of literal data followed
    /// by the remainder of the response, which may itself announce
    /// another literal.
    async fn read_untagged(&mut self, first_line: String) -> Result<Untagged> {
        let mut response = Untagged {
            text: first_line,
            literals: Vec::new(),
        };

        while let Some(len) = parse_literal_length(&response.text) {
            if len > MAX_LITERAL_SIZE {
                return Err(Error::Protocol(format!(
                    "literal too large: {len} bytes (max {MAX_LITERAL_SIZE})"
                )));
            }
            let mut literal = vec![0u8; len];
            self.reader.read_exact(&mut literal).await?;
            response.literals.push(literal);

            let continuation = self.read_line().await?;
            response.text.push(' ');
            response.text.push_str(&continuation);
        }

        Ok(response)
    }

    /// Reads one CRLF-terminated line, without the terminator.
    async fn read_line(&mut self) -> Result<String> {
        let mut raw = Vec::new();
        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed",
                )));
            }

            if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                raw.extend_from_slice(&buf[..pos]);
                self.reader.consume(pos + 1);
                break;
            }

            let len = buf.len();
            raw.extend_from_slice(buf);
            self.reader.consume(len);

            if raw.len() > MAX_LINE_LENGTH {
                return Err(Error::Protocol("response line too long".to_string()));
            }
        }

        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    /// Generates the next command tag ("A0001", "A0002", ...).
    fn next_tag(&mut self) -> String {
        self.tag_counter += 1;
        format!("A{:04}", self.tag_counter)
    }
}

/// Creates a TLS connector with the webpki root store.
fn tls_connector() -> TlsConnector {
    let root_store = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

/// Quotes a string for use in a command, escaping backslash and quote.
fn quote(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Parses a trailing literal marker `{n}` or `{n+}` from a response line.
fn parse_literal_length(line: &str) -> Option<usize> {
    let line = line.trim_end();
    if !line.ends_with('}') {
        return None;
    }
    let open = line.rfind('{')?;
    let inner = &line[open + 1..line.len() - 1];
    inner.trim_end_matches('+').parse().ok()
}

/// Parses `<n> EXISTS` style untagged responses.
fn parse_count_response(text: &str, keyword: &str) -> Option<u32> {
    let mut parts = text.split_ascii_whitespace();
    let count = parts.next()?.parse().ok()?;
    (parts.next()? == keyword).then_some(count)
}

/// Extracts the UID attribute from a FETCH response line.
fn parse_fetch_uid(text: &str) -> Option<Uid> {
    let idx = text.find("UID ")?;
    let rest = &text[idx + 4..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    rest[..end].parse().ok().map(Uid)
}
