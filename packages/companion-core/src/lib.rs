//! Companion Core - remote playback control for a local media player.
//!
//! This crate lets controller apps on the LAN drive a local player: it serves
//! the companion HTTP surface, announces the player over mDNS, mirrors remote
//! play queues into the local player and pushes timeline updates to every
//! subscriber.
//!
//! # Architecture
//!
//! - [`companion`]: The cooperative loop that multiplexes all subsystems
//! - [`lifecycle`]: Run / suspend / stop state shared with supervisors
//! - [`task_queue`]: Bounded hand-off from HTTP handlers to the loop
//! - [`playlist`]: Container key parsing, play queue fetching and sync
//! - [`notifier`]: Subscriber bookkeeping and timeline delivery
//! - [`registration`]: Client advertisement and server discovery
//! - [`api`]: HTTP listener, routes and bind retries
//! - [`player`]: The seam to the local media player
//!
//! # Abstraction Traits
//!
//! - [`PlayerControl`](player::PlayerControl): The local media player
//! - [`Registration`](registration::Registration): Discovery backend
//! - [`PlayQueueFetcher`](playlist::PlayQueueFetcher): Remote play queue source
//! - [`TimelineTransport`](notifier::TimelineTransport): Timeline delivery
//! - [`ListenerFactory`](api::ListenerFactory): HTTP listener creation
//!
//! [`bootstrap_companion`] wires the production implementations together.

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod companion;
pub mod error;
pub mod lifecycle;
pub mod notifier;
pub mod player;
pub mod playlist;
pub mod protocol_constants;
pub mod registration;
pub mod state;
pub mod task_queue;
pub mod utils;

#[cfg(test)]
mod test_support;

// Re-export commonly used types at the crate root
pub use error::{CompanionError, CompanionResult, ErrorCode};
pub use lifecycle::{LoopHandle, LoopState};
pub use state::{ClientInfo, CompanionConfig, LoopTiming};
pub use task_queue::{EnqueueError, Task, TaskAction, TaskQueue, TaskSender};

// Re-export collaborator seams
pub use api::{ListenerFactory, RequestListener, ServerError};
pub use notifier::{SubscriptionManager, TimelineTransport};
pub use player::{HeadlessPlayer, PlayState, PlayerControl, PlayerError, PlayerState};
pub use playlist::{PlayQueueFetcher, PlaylistSync, PlaylistType};
pub use registration::{Registration, ServerAddress};

// Re-export bootstrap types
pub use bootstrap::{bootstrap_companion, BootstrappedCompanion};
pub use companion::CompanionLoop;
