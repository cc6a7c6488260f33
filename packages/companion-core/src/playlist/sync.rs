//! Task dispatch for playlist synchronization.
//!
//! [`PlaylistSync`] owns the local mirror and the identity of the remote queue
//! it reflects. The companion loop hands it one task per iteration; dispatch
//! never fails outward, it reports what happened as a [`SyncOutcome`].

use std::sync::Arc;

use thiserror::Error;

use crate::error::ErrorCode;
use crate::player::{PlayerControl, PlayerError};
use crate::playlist::container_key::{parse_container_key, ContainerKeyError};
use crate::playlist::fetcher::{FetchError, PlayQueueFetcher};
use crate::playlist::local::{resolve_start_item, LocalPlaylist, PlaylistItem, PlaylistType};
use crate::task_queue::{Task, TaskAction};
use crate::utils::convert_remote_time;

/// Errors raised while handling a playlist task. Logged, never propagated.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("task has no containerKey")]
    MissingContainerKey,

    #[error(transparent)]
    ContainerKey(#[from] ContainerKeyError),

    #[error("could not download play queue {queue_id}: {source}")]
    Fetch {
        queue_id: String,
        #[source]
        source: FetchError,
    },

    #[error("player rejected play queue: {0}")]
    Player(#[from] PlayerError),
}

impl ErrorCode for DispatchError {
    fn code(&self) -> &'static str {
        match self {
            Self::MissingContainerKey => "missing_container_key",
            Self::ContainerKey(_) => "invalid_container_key",
            Self::Fetch { source, .. } => source.code(),
            Self::Player(e) => e.code(),
        }
    }
}

/// Result of dispatching one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Action is not handled by this coordinator.
    Ignored,
    /// The queue is already mirrored; nothing changed.
    Duplicate,
    /// A new queue was loaded and playback started.
    Loaded { items: usize, start: usize },
    /// The task failed; carries the error code.
    Skipped(&'static str),
}

/// Mirrors remote play queues into the local player.
pub struct PlaylistSync {
    fetcher: Arc<dyn PlayQueueFetcher>,
    player: Arc<dyn PlayerControl>,
    playlist: Option<LocalPlaylist>,
    queue_id: Option<String>,
}

impl PlaylistSync {
    pub fn new(fetcher: Arc<dyn PlayQueueFetcher>, player: Arc<dyn PlayerControl>) -> Self {
        Self {
            fetcher,
            player,
            playlist: None,
            queue_id: None,
        }
    }

    /// Id of the remote queue currently mirrored.
    pub fn queue_id(&self) -> Option<&str> {
        self.queue_id.as_deref()
    }

    pub fn playlist(&self) -> Option<&LocalPlaylist> {
        self.playlist.as_ref()
    }

    /// Handles one task. Errors are logged and reported as `Skipped`.
    pub async fn dispatch(&mut self, task: Task) -> SyncOutcome {
        tracing::debug!(action = task.action.as_str(), "dispatch_task");
        match &task.action {
            TaskAction::Playlist => match self.sync_playlist(&task).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    log::error!("[Playlist] Skipping playlist task: {}", e);
                    SyncOutcome::Skipped(e.code())
                }
            },
            TaskAction::Unsupported(name) => {
                log::warn!("[Playlist] Ignoring unsupported task '{}'", name);
                SyncOutcome::Ignored
            }
        }
    }

    async fn sync_playlist(&mut self, task: &Task) -> Result<SyncOutcome, DispatchError> {
        let raw_key = task
            .get("containerKey")
            .ok_or(DispatchError::MissingContainerKey)?;
        let container = parse_container_key(raw_key)?;
        tracing::debug!(
            container = %container.typus,
            queue_id = %container.queue_id,
            query = ?container.query,
            "container_key"
        );
        let typus = PlaylistType::from_task_type(task.get("type"));

        if let Some(current) = &self.playlist {
            if current.typus() != typus {
                log::info!(
                    "[Playlist] Switching mirror from {} to {}",
                    current.typus().as_str(),
                    typus.as_str()
                );
                self.playlist = None;
                self.queue_id = None;
            }
        }
        let player = Arc::clone(&self.player);
        let playlist = self
            .playlist
            .get_or_insert_with(|| LocalPlaylist::new(typus, player));

        if self.queue_id.as_deref() == Some(container.queue_id.as_str()) {
            log::warn!(
                "[Playlist] Play queue {} is already mirrored, ignoring",
                container.queue_id
            );
            return Ok(SyncOutcome::Duplicate);
        }

        log::info!(
            "[Playlist] New {} play queue {} (was {:?})",
            typus.as_str(),
            container.queue_id,
            self.queue_id
        );
        self.queue_id = None;

        let remote = self
            .fetcher
            .fetch_queue(&container.queue_id)
            .await
            .map_err(|source| DispatchError::Fetch {
                queue_id: container.queue_id.clone(),
                source,
            })?;

        playlist.clear().await?;
        let items: Vec<PlaylistItem> = remote.into_iter().map(PlaylistItem::from).collect();
        let count = items.len();
        let start = resolve_start_item(task.get("key").unwrap_or_default());
        let offset = convert_remote_time(parse_offset(task.get("offset")));

        let position = playlist.play_all(items, &start, offset).await?;
        self.queue_id = Some(container.queue_id);
        log::info!(
            "[Playlist] Playing {} item(s) from #{} at {}s",
            count,
            position,
            offset.as_secs()
        );
        Ok(SyncOutcome::Loaded {
            items: count,
            start: position,
        })
    }
}

/// Parses the controller's offset (milliseconds). Missing or invalid is zero.
fn parse_offset(value: Option<&str>) -> i64 {
    let Some(value) = value.map(str::trim) else {
        return 0;
    };
    value
        .parse::<i64>()
        .ok()
        .or_else(|| value.parse::<f64>().ok().map(|v| v as i64))
        .unwrap_or(0)
}
