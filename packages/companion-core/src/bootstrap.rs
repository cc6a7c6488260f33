//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where the
//! companion's collaborators are instantiated and wired together. Embedders
//! supply the local player; everything else is built from [`CompanionConfig`].

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::task::JoinHandle;

use crate::api::{AppState, AxumListenerFactory};
use crate::companion::CompanionLoop;
use crate::error::{CompanionError, CompanionResult};
use crate::lifecycle::LoopHandle;
use crate::notifier::{HttpTimelineTransport, SubscriptionManager};
use crate::player::PlayerControl;
use crate::playlist::{HttpPlayQueueFetcher, PlaylistSync};
use crate::protocol_constants::HTTP_TIMEOUT_SECS;
use crate::registration::{MdnsRegistration, Registration, StaticRegistration};
use crate::state::CompanionConfig;
use crate::task_queue::{TaskQueue, TaskSender};

/// Container for the bootstrapped companion.
pub struct BootstrappedCompanion {
    /// The loop itself; consumed by [`spawn`](Self::spawn).
    pub companion: CompanionLoop,
    /// Supervisor handle for the loop.
    pub handle: LoopHandle,
    /// Producer side of the task queue, for embedders that enqueue directly.
    pub tasks: TaskSender,
    pub notifier: Arc<SubscriptionManager>,
    pub registration: Arc<dyn Registration>,
    pub config: Arc<CompanionConfig>,
}

impl BootstrappedCompanion {
    /// Spawns the loop on the current runtime.
    pub fn spawn(self) -> (LoopHandle, JoinHandle<()>) {
        let handle = self.handle.clone();
        let task = tokio::spawn(self.companion.run());
        (handle, task)
    }
}

fn create_http_client() -> CompanionResult<Client> {
    Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()
        .map_err(|e| CompanionError::Internal(format!("Failed to create HTTP client: {}", e)))
}

/// Bootstraps the companion with its dependencies.
///
/// Wiring order:
///
/// 1. Shared HTTP client
/// 2. Registration (mDNS or static, per config)
/// 3. Notifier (depends on player, HTTP client)
/// 4. Task queue and HTTP listener factory (depends on registration, notifier, player)
/// 5. Playlist sync (depends on HTTP client, player)
/// 6. Companion loop
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the HTTP client cannot
/// be created.
pub fn bootstrap_companion(
    config: CompanionConfig,
    player: Arc<dyn PlayerControl>,
) -> CompanionResult<BootstrappedCompanion> {
    config.validate().map_err(CompanionError::Configuration)?;
    let config = Arc::new(config);
    let http_client = create_http_client()?;

    let registration: Arc<dyn Registration> = if config.discovery_mdns {
        Arc::new(MdnsRegistration::new(&config))
    } else {
        Arc::new(StaticRegistration::new(config.static_servers.clone()))
    };
    registration.configure(config.client.clone());

    let notifier = Arc::new(SubscriptionManager::new(
        Arc::clone(&player),
        Arc::new(HttpTimelineTransport::new(
            http_client.clone(),
            config.client.machine_identifier.clone(),
        )),
        config.client.clone(),
        config.timing.notify_retry_delay(),
    ));

    let (tasks, queue) = TaskQueue::bounded(config.task_queue_capacity);
    let listener_factory = Arc::new(AxumListenerFactory::new(AppState::new(
        Arc::clone(&registration),
        Arc::clone(&notifier),
        Arc::clone(&player),
        Arc::clone(&config),
        tasks.clone(),
    )));

    let fetcher = Arc::new(HttpPlayQueueFetcher::new(
        http_client,
        config.server_url.clone(),
        config.server_token.clone(),
        config.client.machine_identifier.clone(),
    ));
    let playlist = PlaylistSync::new(fetcher, player);

    let companion = CompanionLoop::new(
        Arc::clone(&config),
        Arc::clone(&registration),
        Arc::clone(&notifier),
        listener_factory,
        queue,
        playlist,
    );
    let handle = companion.handle();

    log::info!(
        "[Bootstrap] Companion '{}' wired (HTTP {}, discovery {})",
        config.client.name,
        if config.enabled { "on" } else { "off" },
        if config.discovery_mdns { "mDNS" } else { "static" }
    );

    Ok(BootstrappedCompanion {
        companion,
        handle,
        tasks,
        notifier,
        registration,
        config,
    })
}
