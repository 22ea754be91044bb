//! Object storage upload client.

use tracing::debug;

/// Errors from an attachment upload.
///
/// Upload errors are recorded inline in the per-attachment result set,
/// never allowed to abort a whole batch.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The request never produced a response.
    #[error("upload transport error: {0}")]
    Transport(String),

    /// The upload target rejected the request. Exceeding the per-account
    /// concurrency limit surfaces here as a rejection, not throttling.
    #[error("upload rejected with HTTP {0}")]
    Rejected(u16),

    /// The response carried no usable URL.
    #[error("upload response carried no url")]
    MissingUrl,

    /// The returned URL points at a placeholder domain: a synthetic
    /// result, not a durable upload.
    #[error("upload returned placeholder url: {0}")]
    PlaceholderUrl(String),
}

/// Object storage capability: bytes in, durable URL out.
pub trait ObjectStorage: Send + Sync {
    /// Uploads one attachment and returns its durable URL.
    fn upload(
        &self,
        bytes: Vec<u8>,
        filename: String,
        content_type: String,
    ) -> impl Future<Output = std::result::Result<String, UploadError>> + Send;
}

/// Validates an upload result URL: must be http(s) and must not point at
/// a placeholder domain.
#[must_use]
pub fn is_valid_upload_url(url: &str, placeholder_domains: &[String]) -> bool {
    url.starts_with("http") && !placeholder_domains.iter().any(|domain| url.contains(domain))
}

/// HTTP object storage client uploading via multipart form.
#[derive(Debug, Clone)]
pub struct HttpObjectStorage {
    client: reqwest::Client,
    endpoint: String,
    api_token: String,
    placeholder_domains: Vec<String>,
}

impl HttpObjectStorage {
    /// Creates a client for the given upload endpoint.
    #[must_use]
    pub fn new(
        endpoint: impl Into<String>,
        api_token: impl Into<String>,
        placeholder_domains: Vec<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_token: api_token.into(),
            placeholder_domains,
        }
    }
}

impl ObjectStorage for HttpObjectStorage {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        filename: String,
        content_type: String,
    ) -> std::result::Result<String, UploadError> {
        let size = bytes.len();
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename.clone())
            .mime_str(&content_type)
            .map_err(|e| UploadError::Transport(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Rejected(status.as_u16()));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;
        let url = body
            .get("url")
            .and_then(serde_json::Value::as_str)
            .ok_or(UploadError::MissingUrl)?;

        if !is_valid_upload_url(url, &self.placeholder_domains) {
            return Err(UploadError::PlaceholderUrl(url.to_string()));
        }

        debug!(filename, size, url, "attachment uploaded");
        Ok(url.to_string())
    }
}
