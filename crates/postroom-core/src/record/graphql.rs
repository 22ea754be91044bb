//! GraphQL client for the record store.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::{
    EmailStatus, EmailTrackingRecord, NewEmailRecord, RecordResult, RecordStore,
    RecordStoreError, Responder, StoredAttachment,
};

const FIND_BY_EMAIL_ID: &str = r"
query FindEmailTracking($emailId: String!) {
  emailTrackings(filters: { emailId: { eq: $emailId } }) {
    documentId
    emailId
    from
    to
    subject
    receivedDate
    status
    lastResponseBy
    lastResponseDate
    attachments {
      name
      url
      size
      mimeType
    }
  }
}";

const CREATE_EMAIL_TRACKING: &str = r"
mutation CreateEmailTracking($data: EmailTrackingInput!) {
  createEmailTracking(data: $data) {
    documentId
  }
}";

const UPDATE_EMAIL_TRACKING: &str = r"
mutation UpdateEmailTracking($documentId: ID!, $data: EmailTrackingInput!) {
  updateEmailTracking(documentId: $documentId, data: $data) {
    documentId
  }
}";

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

/// Record store client speaking GraphQL over HTTP.
#[derive(Debug, Clone)]
pub struct GraphqlRecordStore {
    client: reqwest::Client,
    endpoint: String,
    api_token: String,
}

impl GraphqlRecordStore {
    /// Creates a client for the given endpoint.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_token: api_token.into(),
        }
    }

    /// Executes one GraphQL document and returns the `data` value.
    async fn execute(&self, query: &str, variables: Value) -> RecordResult<Value> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|e| RecordStoreError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RecordStoreError::Status {
                status: status.as_u16(),
                message: message.chars().take(200).collect(),
            });
        }

        let envelope: GraphQlResponse = response
            .json()
            .await
            .map_err(|e| RecordStoreError::Transport(e.to_string()))?;

        if !envelope.errors.is_empty() {
            return Err(RecordStoreError::GraphQl(
                envelope.errors.into_iter().map(|e| e.message).collect(),
            ));
        }

        envelope
            .data
            .ok_or_else(|| RecordStoreError::MissingData("no data in response".to_string()))
    }
}

impl RecordStore for GraphqlRecordStore {
    async fn find_by_email_id(
        &self,
        email_id: &str,
    ) -> RecordResult<Option<EmailTrackingRecord>> {
        let data = self
            .execute(FIND_BY_EMAIL_ID, json!({ "emailId": email_id }))
            .await?;

        let records = data
            .get("emailTrackings")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                RecordStoreError::MissingData("emailTrackings not in response".to_string())
            })?;

        let Some(first) = records.first() else {
            return Ok(None);
        };

        let record: EmailTrackingRecord = serde_json::from_value(first.clone())
            .map_err(|e| RecordStoreError::MissingData(e.to_string()))?;
        debug!(email_id, document_id = %record.document_id, "found tracking record");
        Ok(Some(record))
    }

    async fn create(&self, record: &NewEmailRecord) -> RecordResult<String> {
        let data = serde_json::to_value(record)
            .map_err(|e| RecordStoreError::MissingData(e.to_string()))?;
        let response = self
            .execute(CREATE_EMAIL_TRACKING, json!({ "data": data }))
            .await?;

        let document_id = response
            .get("createEmailTracking")
            .and_then(|v| v.get("documentId"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                RecordStoreError::MissingData("createEmailTracking.documentId".to_string())
            })?;

        debug!(email_id = %record.email_id, document_id, "created tracking record");
        Ok(document_id.to_string())
    }

    async fn update_status(
        &self,
        document_id: &str,
        status: EmailStatus,
        last_response_by: Option<Responder>,
        last_response_date: Option<DateTime<Utc>>,
    ) -> RecordResult<()> {
        self.execute(
            UPDATE_EMAIL_TRACKING,
            json!({
                "documentId": document_id,
                "data": {
                    "status": status,
                    "lastResponseBy": last_response_by,
                    "lastResponseDate": last_response_date,
                }
            }),
        )
        .await?;

        debug!(document_id, status = status.as_str(), "updated record status");
        Ok(())
    }

    async fn set_attachments(
        &self,
        document_id: &str,
        attachments: &[StoredAttachment],
    ) -> RecordResult<()> {
        self.execute(
            UPDATE_EMAIL_TRACKING,
            json!({
                "documentId": document_id,
                "data": { "attachments": attachments }
            }),
        )
        .await?;

        debug!(document_id, count = attachments.len(), "updated record attachments");
        Ok(())
    }
}
