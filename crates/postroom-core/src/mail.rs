//! Mail source capability over the IMAP client.
//!
//! Every operation opens its own protocol session and closes it on every
//! exit path; sessions are never reused across retries or shared between
//! concurrent operations.

use std::time::Duration;

use postroom_imap::{Config, Credentials, SearchCriteria, Session, Uid};
use postroom_mime::Message;
use tracing::{debug, warn};

use crate::config::MailboxConfig;
use crate::error::{Error, Result};

/// One raw message pulled from the mailbox.
#[derive(Debug, Clone)]
pub struct RawMail {
    /// Server-assigned UID.
    pub uid: Uid,
    /// Raw message bytes.
    pub bytes: Vec<u8>,
}

/// Read access to the remote mailbox.
pub trait MailSource: Send + Sync {
    /// Fetches up to `limit` raw messages matching the criteria.
    fn fetch_batch(
        &self,
        criteria: SearchCriteria,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<RawMail>>> + Send;

    /// Scans the full mailbox for the message answering to `email_id`.
    ///
    /// The mailbox has no server-side index by external identity, so the
    /// scan matches candidates by UID or Message-ID, newest first, under
    /// its own deadline.
    fn find_message(&self, email_id: &str) -> impl Future<Output = Result<RawMail>> + Send;
}

/// [`MailSource`] implementation over a real IMAP mailbox.
#[derive(Debug, Clone)]
pub struct ImapMailSource {
    config: Config,
    credentials: Credentials,
    folder: String,
    fetch_timeout: Duration,
    single_fetch_timeout: Duration,
    scan_timeout: Duration,
}

impl ImapMailSource {
    /// Builds a mail source from the pipeline mailbox config.
    #[must_use]
    pub fn new(mailbox: &MailboxConfig) -> Self {
        Self {
            config: mailbox.to_imap_config(),
            credentials: mailbox.credentials(),
            folder: mailbox.folder.clone(),
            fetch_timeout: Duration::from_secs(mailbox.fetch_timeout_secs),
            single_fetch_timeout: Duration::from_secs(mailbox.single_fetch_timeout_secs),
            scan_timeout: Duration::from_secs(mailbox.scan_timeout_secs),
        }
    }

    async fn fetch_batch_inner(
        &self,
        session: &mut Session,
        criteria: SearchCriteria,
        limit: usize,
    ) -> Result<Vec<RawMail>> {
        session.select(&self.folder).await?;
        let mut uids = session.uid_search(criteria).await?;

        // Hard cap per pass; keep the newest UIDs when over it.
        if uids.len() > limit {
            uids = uids.split_off(uids.len() - limit);
        }

        let bodies = session.uid_fetch_raw(&uids, self.fetch_timeout).await?;
        Ok(bodies
            .into_iter()
            .map(|(uid, bytes)| RawMail { uid, bytes })
            .collect())
    }

    async fn find_message_inner(
        &self,
        session: &mut Session,
        email_id: &str,
    ) -> Result<RawMail> {
        session.select(&self.folder).await?;
        let uids = session.uid_search(SearchCriteria::All).await?;

        // Newest first: the target is usually recent mail.
        for uid in uids.into_iter().rev() {
            if uid_matches(uid, email_id) {
                let mut bodies = session
                    .uid_fetch_raw(&[uid], self.single_fetch_timeout)
                    .await?;
                if let Some((uid, bytes)) = bodies.pop() {
                    return Ok(RawMail { uid, bytes });
                }
                continue;
            }

            let mut bodies = session
                .uid_fetch_raw(&[uid], self.single_fetch_timeout)
                .await?;
            let Some((uid, bytes)) = bodies.pop() else {
                continue;
            };

            match Message::parse(&bytes) {
                Ok(parsed) if parsed.message_id().as_deref() == Some(email_id) => {
                    return Ok(RawMail { uid, bytes });
                }
                Ok(_) => {}
                Err(e) => {
                    // A malformed candidate cannot be the match target.
                    debug!(%uid, error = %e, "skipping unparseable message during scan");
                }
            }
        }

        Err(Error::MessageNotFound(email_id.to_string()))
    }
}

impl MailSource for ImapMailSource {
    async fn fetch_batch(&self, criteria: SearchCriteria, limit: usize) -> Result<Vec<RawMail>> {
        let mut session = Session::connect(&self.config, &self.credentials).await?;
        let result = self.fetch_batch_inner(&mut session, criteria, limit).await;

        // Close on every exit path; a failed logout is not worth failing
        // an otherwise successful fetch over.
        if let Err(e) = session.logout().await {
            warn!(error = %e, "mailbox logout failed");
        }
        result
    }

    async fn find_message(&self, email_id: &str) -> Result<RawMail> {
        let mut session = Session::connect(&self.config, &self.credentials).await?;

        // The scan phase carries its own deadline, distinct from the
        // connection timeout: it is O(mailbox size).
        let result = match tokio::time::timeout(
            self.scan_timeout,
            self.find_message_inner(&mut session, email_id),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Imap(postroom_imap::Error::FetchTimeout(
                self.scan_timeout,
            ))),
        };

        if let Err(e) = session.logout().await {
            warn!(error = %e, "mailbox logout failed");
        }
        result
    }
}

/// Whether a server UID answers to the external identity directly.
fn uid_matches(uid: Uid, email_id: &str) -> bool {
    email_id == uid.to_string() || email_id == format!("uid-{uid}")
}
