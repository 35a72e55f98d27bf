//! Thin HTTP client for the disposable-inbox service.
//!
//! Two operations: create an address, list messages for an address. Retry
//! policy is the caller's business — the signup worker polls `list_messages`
//! inside its own loop and never retries `create_address`.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Failure talking to the inbox service.
#[derive(Debug, Error)]
pub enum MailboxError {
    #[error("mailbox request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("mailbox service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("mailbox response carried no email address")]
    MissingAddress,
}

/// One message in a disposable inbox.
#[derive(Debug, Clone, Deserialize)]
pub struct InboxMessage {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Serialize)]
struct CreateAddressRequest<'a> {
    name: &'a str,
    domain: &'a str,
}

#[derive(Deserialize)]
struct CreateAddressResponse {
    #[serde(default)]
    email: Option<String>,
}

/// Client for the disposable-inbox HTTP API.
#[derive(Debug, Clone)]
pub struct MailboxClient {
    client: Client,
    base_url: String,
}

impl MailboxClient {
    /// Build a client against the given base URL.
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, MailboxError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create a disposable address `{local_part}@{domain}`.
    ///
    /// `POST {base}/api/emails {name, domain}` → `{email}`.
    pub async fn create_address(
        &self,
        local_part: &str,
        domain: &str,
    ) -> Result<String, MailboxError> {
        let url = format!("{}/api/emails", self.base_url);
        debug!(local_part = local_part, domain = domain, "mailbox_create_address");

        let response = self
            .client
            .post(&url)
            .json(&CreateAddressRequest {
                name: local_part,
                domain,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(MailboxError::Status { status, body });
        }

        let parsed: CreateAddressResponse = response.json().await?;
        match parsed.email {
            Some(email) if !email.is_empty() => Ok(email),
            _ => Err(MailboxError::MissingAddress),
        }
    }

    /// List all messages currently in the inbox for `email`.
    ///
    /// `GET {base}/api/emails/{email}/messages` → `[{subject, body}]`.
    pub async fn list_messages(&self, email: &str) -> Result<Vec<InboxMessage>, MailboxError> {
        let url = format!("{}/api/emails/{}/messages", self.base_url, email);
        debug!(email = email, "mailbox_list_messages");

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(MailboxError::Status { status, body });
        }

        Ok(response.json().await?)
    }
}
