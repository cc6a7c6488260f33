//! Playlist synchronization.
//!
//! Controllers address a remote play queue by container key; this module
//! parses the key, downloads the queue and mirrors it into the local player.

pub mod container_key;
pub mod fetcher;
pub mod local;
pub mod sync;

pub use container_key::{parse_container_key, ContainerKey, ContainerKeyError};
pub use fetcher::{
    parse_play_queue_xml, FetchError, HttpPlayQueueFetcher, PlayQueueFetcher, RemoteQueueItem,
};
pub use local::{resolve_start_item, LocalPlaylist, PlaylistItem, PlaylistType, StartItem};
pub use sync::{DispatchError, PlaylistSync, SyncOutcome};
