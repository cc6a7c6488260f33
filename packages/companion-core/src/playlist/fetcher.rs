//! Retrieval of remote play queues from the media server.

use std::time::Duration;

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use reqwest::{Client, StatusCode};
use thiserror::Error;

use crate::protocol_constants::{CLIENT_IDENTIFIER_HEADER, HTTP_TIMEOUT_SECS, TOKEN_HEADER};
use crate::utils::get_xml_attr;

// ─────────────────────────────────────────────────────────────────────────────
// Error Types
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can occur while downloading a remote play queue.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Server refused our credentials.
    #[error("server rejected the access token")]
    Unauthorized,

    /// Server does not know the queue.
    #[error("play queue unavailable: {0}")]
    Unavailable(String),

    /// HTTP request to the server failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned a non-success status.
    #[error("HTTP error {0}")]
    HttpStatus(u16),

    /// Response body is not a play queue document.
    #[error("failed to parse play queue: {0}")]
    Parse(String),

    /// No server URL is configured.
    #[error("no media server configured")]
    NotConfigured,
}

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// One entry of a remote play queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteQueueItem {
    pub play_queue_item_id: String,
    /// Remote media id.
    pub rating_key: String,
}

/// Source of remote play queue contents.
#[async_trait]
pub trait PlayQueueFetcher: Send + Sync {
    /// Downloads the items of `queue_id` in queue order.
    async fn fetch_queue(&self, queue_id: &str) -> Result<Vec<RemoteQueueItem>, FetchError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Fetcher
// ─────────────────────────────────────────────────────────────────────────────

/// Fetches `/playQueues/<id>` from the configured media server.
pub struct HttpPlayQueueFetcher {
    client: Client,
    server_url: Option<String>,
    token: Option<String>,
    client_identifier: String,
}

impl HttpPlayQueueFetcher {
    pub fn new(
        client: Client,
        server_url: Option<String>,
        token: Option<String>,
        client_identifier: String,
    ) -> Self {
        Self {
            client,
            server_url: server_url.map(|url| url.trim_end_matches('/').to_string()),
            token,
            client_identifier,
        }
    }

    fn queue_url(&self, queue_id: &str) -> Result<String, FetchError> {
        let base = self.server_url.as_deref().ok_or(FetchError::NotConfigured)?;
        Ok(format!("{}/playQueues/{}", base, queue_id))
    }
}

#[async_trait]
impl PlayQueueFetcher for HttpPlayQueueFetcher {
    async fn fetch_queue(&self, queue_id: &str) -> Result<Vec<RemoteQueueItem>, FetchError> {
        let url = self.queue_url(queue_id)?;
        log::info!("[Playlist] Fetching play queue {}", url);

        let mut request = self
            .client
            .get(&url)
            .header("Accept", "application/xml")
            .header(CLIENT_IDENTIFIER_HEADER, &self.client_identifier)
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS));
        if let Some(token) = &self.token {
            request = request.header(TOKEN_HEADER, token);
        }

        let res = request.send().await?;
        match res.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(FetchError::Unauthorized)
            }
            StatusCode::NOT_FOUND => return Err(FetchError::Unavailable(queue_id.to_string())),
            status if !status.is_success() => return Err(FetchError::HttpStatus(status.as_u16())),
            _ => {}
        }

        let body = res.text().await?;
        let items = parse_play_queue_xml(&body)?;
        log::debug!("[Playlist] Play queue {} has {} item(s)", queue_id, items.len());
        Ok(items)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Parsing
// ─────────────────────────────────────────────────────────────────────────────

/// Parses a `MediaContainer` play queue document.
///
/// Any element carrying both `playQueueItemID` and `ratingKey` is an item;
/// the element name (`Track`, `Video`, ...) does not matter.
pub fn parse_play_queue_xml(xml: &str) -> Result<Vec<RemoteQueueItem>, FetchError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut items = Vec::new();
    let mut saw_container = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                if e.name().as_ref() == b"MediaContainer" {
                    saw_container = true;
                } else if let (Some(play_queue_item_id), Some(rating_key)) = (
                    get_xml_attr(e, b"playQueueItemID"),
                    get_xml_attr(e, b"ratingKey"),
                ) {
                    items.push(RemoteQueueItem {
                        play_queue_item_id,
                        rating_key,
                    });
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(FetchError::Parse(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if !saw_container {
        return Err(FetchError::Parse("missing MediaContainer".to_string()));
    }
    Ok(items)
}
