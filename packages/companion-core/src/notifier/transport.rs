//! Delivery of timeline documents to subscribers.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

use crate::protocol_constants::{CLIENT_IDENTIFIER_HEADER, HTTP_TIMEOUT_SECS};

/// Errors raised while delivering a timeline.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// HTTP request to the subscriber failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Subscriber answered with a non-success status.
    #[error("subscriber rejected timeline with status {0}")]
    Rejected(u16),
}

/// Sends a timeline document to one subscriber.
#[async_trait]
pub trait TimelineTransport: Send + Sync {
    /// Delivers `body` to the subscriber reachable at `address` (a base URL).
    async fn deliver(&self, address: &str, body: &str) -> Result<(), NotifyError>;
}

/// POSTs timelines to `<address>/:/timeline`.
pub struct HttpTimelineTransport {
    client: Client,
    client_identifier: String,
}

impl HttpTimelineTransport {
    pub fn new(client: Client, client_identifier: String) -> Self {
        Self {
            client,
            client_identifier,
        }
    }
}

#[async_trait]
impl TimelineTransport for HttpTimelineTransport {
    async fn deliver(&self, address: &str, body: &str) -> Result<(), NotifyError> {
        let url = format!("{}/:/timeline", address.trim_end_matches('/'));
        log::trace!("[Notify] POST {} ({} bytes)", url, body.len());

        let res = self
            .client
            .post(&url)
            .header("Content-Type", "application/xml")
            .header(CLIENT_IDENTIFIER_HEADER, &self.client_identifier)
            .body(body.to_string())
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}
