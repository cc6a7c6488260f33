//! Local mirror of a remote play queue.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::player::{PlayerControl, PlayerError};
use crate::playlist::fetcher::RemoteQueueItem;
use crate::protocol_constants::LIBRARY_METADATA_PREFIX;

/// Kind of local player queue a remote queue is mirrored into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaylistType {
    Music,
    Video,
    Mixed,
}

impl PlaylistType {
    /// Maps the controller's `type` parameter. Anything unrecognized is `Mixed`.
    pub fn from_task_type(value: Option<&str>) -> Self {
        match value.map(str::to_ascii_lowercase).as_deref() {
            Some("music") | Some("audio") => Self::Music,
            Some("video") => Self::Video,
            _ => Self::Mixed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Music => "music",
            Self::Video => "video",
            Self::Mixed => "mixed",
        }
    }

    /// Timeline `type` attribute this queue reports under.
    pub fn timeline_type(&self) -> &'static str {
        match self {
            Self::Music => "music",
            Self::Video | Self::Mixed => "video",
        }
    }
}

/// One entry of the local mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistItem {
    /// Id of the entry inside the remote queue.
    pub remote_queue_item_id: String,
    /// Remote media id (`ratingKey`).
    pub remote_media_id: String,
    /// Local library id, once the player has resolved one.
    pub local_media_id: Option<String>,
}

impl PlaylistItem {
    pub fn new(queue_item_id: impl Into<String>, media_id: impl Into<String>) -> Self {
        Self {
            remote_queue_item_id: queue_item_id.into(),
            remote_media_id: media_id.into(),
            local_media_id: None,
        }
    }
}

impl From<RemoteQueueItem> for PlaylistItem {
    fn from(item: RemoteQueueItem) -> Self {
        Self::new(item.play_queue_item_id, item.rating_key)
    }
}

/// Item a controller asked playback to start from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartItem {
    /// A remote media id taken from a `/library/metadata/<id>` key.
    RemoteMediaId(String),
    /// Any other key, kept verbatim.
    Unknown(String),
}

/// Resolves the controller's `key` parameter into a start item.
pub fn resolve_start_item(key: &str) -> StartItem {
    let id = key
        .strip_prefix(LIBRARY_METADATA_PREFIX)
        .and_then(|rest| rest.strip_prefix('/'))
        .map(|rest| rest.split(['/', '?']).next().unwrap_or_default());

    match id {
        Some(id) if !id.is_empty() => StartItem::RemoteMediaId(id.to_string()),
        _ => StartItem::Unknown(key.to_string()),
    }
}

/// Local playlist mirroring one remote queue.
///
/// Every mutation goes to the player first; the mirror only changes when the
/// player accepted the command.
pub struct LocalPlaylist {
    typus: PlaylistType,
    items: Vec<PlaylistItem>,
    player: Arc<dyn PlayerControl>,
}

impl LocalPlaylist {
    pub fn new(typus: PlaylistType, player: Arc<dyn PlayerControl>) -> Self {
        Self {
            typus,
            items: Vec::new(),
            player,
        }
    }

    pub fn typus(&self) -> PlaylistType {
        self.typus
    }

    pub fn items(&self) -> &[PlaylistItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Empties the mirror and the player queue.
    pub async fn clear(&mut self) -> Result<(), PlayerError> {
        self.player.clear(self.typus).await?;
        self.items.clear();
        Ok(())
    }

    /// Appends items to the mirror and the player queue.
    pub async fn append(&mut self, items: Vec<PlaylistItem>) -> Result<(), PlayerError> {
        self.player.append(self.typus, &items).await?;
        self.items.extend(items);
        Ok(())
    }

    /// Replaces the mirror contents without starting playback.
    pub async fn replace(&mut self, items: Vec<PlaylistItem>) -> Result<(), PlayerError> {
        self.clear().await?;
        self.append(items).await
    }

    /// Index of the start item, falling back to the first item.
    pub fn start_position(&self, start: &StartItem) -> usize {
        start_index(&self.items, start)
    }

    /// Loads `items` and starts playback at `start` and `offset`.
    ///
    /// Returns the index playback started from.
    pub async fn play_all(
        &mut self,
        items: Vec<PlaylistItem>,
        start: &StartItem,
        offset: Duration,
    ) -> Result<usize, PlayerError> {
        let position = start_index(&items, start);
        self.player
            .play(self.typus, &items, position, offset)
            .await?;
        self.items = items;
        Ok(position)
    }
}

fn start_index(items: &[PlaylistItem], start: &StartItem) -> usize {
    match start {
        StartItem::RemoteMediaId(id) => items
            .iter()
            .position(|item| &item.remote_media_id == id)
            .unwrap_or_else(|| {
                log::warn!(
                    "[Playlist] Start item {} not in queue, starting from the top",
                    id
                );
                0
            }),
        StartItem::Unknown(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingPlayer;

    fn items() -> Vec<PlaylistItem> {
        vec![
            PlaylistItem::new("1", "554"),
            PlaylistItem::new("2", "555"),
            PlaylistItem::new("3", "556"),
        ]
    }

    #[test]
    fn library_metadata_key_resolves_to_media_id() {
        assert_eq!(
            resolve_start_item("/library/metadata/555"),
            StartItem::RemoteMediaId("555".into())
        );
        assert_eq!(
            resolve_start_item("/library/metadata/555/children"),
            StartItem::RemoteMediaId("555".into())
        );
    }

    #[test]
    fn other_keys_are_kept_verbatim() {
        assert_eq!(resolve_start_item("/foo/9"), StartItem::Unknown("/foo/9".into()));
        assert_eq!(
            resolve_start_item("/library/metadata/"),
            StartItem::Unknown("/library/metadata/".into())
        );
        assert_eq!(resolve_start_item(""), StartItem::Unknown(String::new()));
    }

    #[test]
    fn task_type_mapping() {
        assert_eq!(PlaylistType::from_task_type(Some("music")), PlaylistType::Music);
        assert_eq!(PlaylistType::from_task_type(Some("Video")), PlaylistType::Video);
        assert_eq!(PlaylistType::from_task_type(Some("photo")), PlaylistType::Mixed);
        assert_eq!(PlaylistType::from_task_type(None), PlaylistType::Mixed);
        assert_eq!(PlaylistType::Mixed.timeline_type(), "video");
    }

    #[tokio::test]
    async fn play_all_starts_at_matching_item() {
        let player = Arc::new(RecordingPlayer::default());
        let mut playlist = LocalPlaylist::new(PlaylistType::Music, player.clone());

        let position = playlist
            .play_all(
                items(),
                &StartItem::RemoteMediaId("555".into()),
                Duration::from_secs(10),
            )
            .await
            .unwrap();

        assert_eq!(position, 1);
        assert_eq!(playlist.len(), 3);
        let plays = player.plays();
        assert_eq!(plays.len(), 1);
        assert_eq!(plays[0].start, 1);
        assert_eq!(plays[0].offset, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn unknown_start_falls_back_to_first_item() {
        let player = Arc::new(RecordingPlayer::default());
        let mut playlist = LocalPlaylist::new(PlaylistType::Video, player);

        let missing = playlist
            .play_all(items(), &StartItem::RemoteMediaId("999".into()), Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(missing, 0);

        let unknown = playlist
            .play_all(items(), &StartItem::Unknown("/foo".into()), Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(unknown, 0);
    }

    #[tokio::test]
    async fn failed_clear_keeps_mirror() {
        let player = Arc::new(RecordingPlayer::default());
        let mut playlist = LocalPlaylist::new(PlaylistType::Music, player.clone());
        playlist.replace(items()).await.unwrap();

        player.fail_commands(true);
        assert!(playlist.clear().await.is_err());
        assert_eq!(playlist.len(), 3);
    }

    #[tokio::test]
    async fn rejected_play_keeps_previous_mirror() {
        let player = Arc::new(RecordingPlayer::default());
        let mut playlist = LocalPlaylist::new(PlaylistType::Music, player.clone());

        player.fail_commands(true);
        let result = playlist
            .play_all(
                vec![PlaylistItem::new("9", "900")],
                &StartItem::Unknown(String::new()),
                Duration::ZERO,
            )
            .await;

        assert!(result.is_err());
        assert!(playlist.is_empty());
        assert!(player.plays().is_empty());

        player.fail_commands(false);
        playlist
            .play_all(items(), &StartItem::Unknown(String::new()), Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(playlist.len(), 3);
    }
}
