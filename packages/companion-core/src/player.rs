//! Local player control surface.
//!
//! The coordinator never drives a decoder itself. It talks to the local player
//! through [`PlayerControl`], which the HTTP layer also uses as its command
//! sink for simple transport commands (pause, seek, ...).
//!
//! [`HeadlessPlayer`] is the implementation shipped with the standalone server:
//! it logs every command and keeps an in-memory model of the transport so
//! timelines sent to subscribers reflect what controllers asked for.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;

use crate::playlist::{PlaylistItem, PlaylistType};

/// Errors reported by the local player.
#[derive(Debug, Error)]
pub enum PlayerError {
    /// The player cannot accept commands right now.
    #[error("player unavailable: {0}")]
    Unavailable(String),

    /// Start position is outside the item list.
    #[error("start position {0} is out of range")]
    InvalidStart(usize),
}

/// Transport state reported in timelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayState {
    Playing,
    Paused,
    Stopped,
}

impl PlayState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
        }
    }
}

/// Snapshot of the local player.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub media_type: PlaylistType,
    pub state: PlayState,
    pub position: Duration,
    pub duration: Duration,
    /// Remote media id of the current item.
    pub remote_media_id: Option<String>,
    /// Remote queue item id of the current item.
    pub remote_queue_item_id: Option<String>,
}

impl PlayerState {
    /// A stopped player with nothing loaded.
    pub fn stopped(media_type: PlaylistType) -> Self {
        Self {
            media_type,
            state: PlayState::Stopped,
            position: Duration::ZERO,
            duration: Duration::ZERO,
            remote_media_id: None,
            remote_queue_item_id: None,
        }
    }
}

/// Commands accepted by the local player.
#[async_trait]
pub trait PlayerControl: Send + Sync {
    /// Replaces the player queue with `items` and starts playback.
    ///
    /// # Arguments
    /// * `typus` - Player queue the items belong to
    /// * `items` - Items in playback order
    /// * `start` - Index into `items` to start from
    /// * `offset` - Position inside the start item
    async fn play(
        &self,
        typus: PlaylistType,
        items: &[PlaylistItem],
        start: usize,
        offset: Duration,
    ) -> Result<(), PlayerError>;

    /// Empties the player queue of the given type.
    async fn clear(&self, typus: PlaylistType) -> Result<(), PlayerError>;

    /// Appends items to the end of the player queue.
    async fn append(&self, typus: PlaylistType, items: &[PlaylistItem]) -> Result<(), PlayerError>;

    async fn pause(&self) -> Result<(), PlayerError>;

    async fn resume(&self) -> Result<(), PlayerError>;

    async fn stop(&self) -> Result<(), PlayerError>;

    async fn skip_next(&self) -> Result<(), PlayerError>;

    async fn skip_previous(&self) -> Result<(), PlayerError>;

    /// Seeks inside the current item.
    async fn seek(&self, position: Duration) -> Result<(), PlayerError>;

    /// Returns the current player snapshot.
    async fn state(&self) -> Result<PlayerState, PlayerError>;
}

struct Transport {
    typus: PlaylistType,
    items: Vec<PlaylistItem>,
    index: Option<usize>,
    state: PlayState,
    /// Position at `anchor`.
    position: Duration,
    anchor: Instant,
}

impl Transport {
    fn current_position(&self) -> Duration {
        match self.state {
            PlayState::Playing => self.position + self.anchor.elapsed(),
            _ => self.position,
        }
    }

    fn restart_at(&mut self, position: Duration) {
        self.position = position;
        self.anchor = Instant::now();
    }
}

/// Player that logs commands and models the transport in memory.
pub struct HeadlessPlayer {
    transport: Mutex<Transport>,
}

impl HeadlessPlayer {
    pub fn new() -> Self {
        Self {
            transport: Mutex::new(Transport {
                typus: PlaylistType::Mixed,
                items: Vec::new(),
                index: None,
                state: PlayState::Stopped,
                position: Duration::ZERO,
                anchor: Instant::now(),
            }),
        }
    }
}

impl Default for HeadlessPlayer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlayerControl for HeadlessPlayer {
    async fn play(
        &self,
        typus: PlaylistType,
        items: &[PlaylistItem],
        start: usize,
        offset: Duration,
    ) -> Result<(), PlayerError> {
        if !items.is_empty() && start >= items.len() {
            return Err(PlayerError::InvalidStart(start));
        }
        let mut t = self.transport.lock();
        t.typus = typus;
        t.items = items.to_vec();
        if items.is_empty() {
            t.index = None;
            t.state = PlayState::Stopped;
            t.restart_at(Duration::ZERO);
            log::info!("[Player] Empty {} queue, nothing to play", typus.as_str());
            return Ok(());
        }
        t.index = Some(start);
        t.state = PlayState::Playing;
        t.restart_at(offset);
        log::info!(
            "[Player] Playing {} queue of {} item(s) from #{} at {}s",
            typus.as_str(),
            items.len(),
            start,
            offset.as_secs()
        );
        Ok(())
    }

    async fn clear(&self, typus: PlaylistType) -> Result<(), PlayerError> {
        let mut t = self.transport.lock();
        if t.typus == typus {
            t.items.clear();
            t.index = None;
            t.state = PlayState::Stopped;
            t.restart_at(Duration::ZERO);
        }
        log::debug!("[Player] Cleared {} queue", typus.as_str());
        Ok(())
    }

    async fn append(&self, typus: PlaylistType, items: &[PlaylistItem]) -> Result<(), PlayerError> {
        let mut t = self.transport.lock();
        if t.typus != typus {
            t.typus = typus;
            t.items.clear();
            t.index = None;
        }
        t.items.extend_from_slice(items);
        log::debug!(
            "[Player] Appended {} item(s) to {} queue",
            items.len(),
            typus.as_str()
        );
        Ok(())
    }

    async fn pause(&self) -> Result<(), PlayerError> {
        let mut t = self.transport.lock();
        if t.state == PlayState::Playing {
            let position = t.current_position();
            t.state = PlayState::Paused;
            t.restart_at(position);
            log::info!("[Player] Paused at {}s", position.as_secs());
        }
        Ok(())
    }

    async fn resume(&self) -> Result<(), PlayerError> {
        let mut t = self.transport.lock();
        if t.state == PlayState::Paused {
            let position = t.position;
            t.state = PlayState::Playing;
            t.restart_at(position);
            log::info!("[Player] Resumed at {}s", position.as_secs());
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), PlayerError> {
        let mut t = self.transport.lock();
        t.state = PlayState::Stopped;
        t.restart_at(Duration::ZERO);
        log::info!("[Player] Stopped");
        Ok(())
    }

    async fn skip_next(&self) -> Result<(), PlayerError> {
        let mut t = self.transport.lock();
        if let Some(index) = t.index {
            if index + 1 < t.items.len() {
                t.index = Some(index + 1);
                t.restart_at(Duration::ZERO);
                log::info!("[Player] Skipped to #{}", index + 1);
            }
        }
        Ok(())
    }

    async fn skip_previous(&self) -> Result<(), PlayerError> {
        let mut t = self.transport.lock();
        if let Some(index) = t.index {
            t.index = Some(index.saturating_sub(1));
            t.restart_at(Duration::ZERO);
            log::info!("[Player] Skipped back to #{}", index.saturating_sub(1));
        }
        Ok(())
    }

    async fn seek(&self, position: Duration) -> Result<(), PlayerError> {
        let mut t = self.transport.lock();
        if t.index.is_none() {
            return Err(PlayerError::Unavailable("nothing loaded".into()));
        }
        t.restart_at(position);
        log::info!("[Player] Seeked to {}s", position.as_secs());
        Ok(())
    }

    async fn state(&self) -> Result<PlayerState, PlayerError> {
        let t = self.transport.lock();
        let current = t.index.and_then(|i| t.items.get(i));
        Ok(PlayerState {
            media_type: t.typus,
            state: t.state,
            position: t.current_position(),
            duration: Duration::ZERO,
            remote_media_id: current.map(|item| item.remote_media_id.clone()),
            remote_queue_item_id: current.map(|item| item.remote_queue_item_id.clone()),
        })
    }
}
