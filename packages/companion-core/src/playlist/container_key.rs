//! Parsing of controller container keys.
//!
//! A container key addresses a remote play queue, e.g.
//! `/playQueues/3045?own=1&repeat=0&window=200`. The queue id is the last
//! all-digit path segment; the first segment names the container type.

use std::collections::HashMap;
use std::str::FromStr;

use thiserror::Error;
use url::form_urlencoded;

/// Errors produced when a container key cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContainerKeyError {
    /// The key has no path segments.
    #[error("container key is empty")]
    Empty,

    /// No path segment is a numeric queue id.
    #[error("container key {0:?} has no numeric queue id")]
    MissingQueueId(String),
}

/// A parsed container key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerKey {
    /// First path segment (e.g. "playQueues").
    pub typus: String,
    /// Remote queue id.
    pub queue_id: String,
    /// Query parameters; repeated keys keep every value in order.
    pub query: HashMap<String, Vec<String>>,
}

impl FromStr for ContainerKey {
    type Err = ContainerKeyError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        parse_container_key(raw)
    }
}

/// Parses a container key into `(typus, queue_id, query)`.
///
/// Absolute URLs are accepted; scheme and authority are ignored.
pub fn parse_container_key(raw: &str) -> Result<ContainerKey, ContainerKeyError> {
    let without_fragment = raw.split('#').next().unwrap_or_default();
    let (path, query) = match without_fragment.split_once('?') {
        Some((path, query)) => (path, query),
        None => (without_fragment, ""),
    };
    let path = strip_authority(path);

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let typus = segments.first().ok_or(ContainerKeyError::Empty)?;

    let queue_id = segments
        .iter()
        .rev()
        .find(|s| s.bytes().all(|b| b.is_ascii_digit()))
        .ok_or_else(|| ContainerKeyError::MissingQueueId(raw.to_string()))?;

    Ok(ContainerKey {
        typus: typus.to_string(),
        queue_id: queue_id.to_string(),
        query: parse_query(query),
    })
}

fn strip_authority(path: &str) -> &str {
    match path.find("://") {
        Some(scheme_end) => {
            let rest = &path[scheme_end + 3..];
            rest.find('/').map(|i| &rest[i..]).unwrap_or("")
        }
        None => path,
    }
}

fn parse_query(query: &str) -> HashMap<String, Vec<String>> {
    let mut params: HashMap<String, Vec<String>> = HashMap::new();
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        params
            .entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }
    params
}
