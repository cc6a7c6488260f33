//! Shared test doubles for collaborator traits.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::api::{AppState, ListenerFactory, RequestListener, ServerError};
use crate::notifier::{NotifyError, SubscriptionManager, TimelineTransport};
use crate::player::{HeadlessPlayer, PlayerControl, PlayerError, PlayerState};
use crate::playlist::{FetchError, PlayQueueFetcher, PlaylistItem, PlaylistType, RemoteQueueItem};
use crate::registration::{Registration, RegistrationError, ServerAddress};
use crate::state::{ClientInfo, CompanionConfig};
use crate::task_queue::TaskQueue;

pub(crate) fn test_config() -> CompanionConfig {
    CompanionConfig {
        discovery_mdns: false,
        client: ClientInfo {
            name: "Test Player".into(),
            machine_identifier: "test-player-id".into(),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub(crate) fn test_app_state() -> (AppState, TaskQueue) {
    test_app_state_with(Arc::new(RecordingPlayer::default()), 8)
}

pub(crate) fn test_app_state_with(
    player: Arc<RecordingPlayer>,
    capacity: usize,
) -> (AppState, TaskQueue) {
    let config = test_config();
    let notifier = Arc::new(SubscriptionManager::new(
        player.clone(),
        Arc::new(MockTransport::default()),
        config.client.clone(),
        Duration::from_secs(1),
    ));
    let (tasks, queue) = TaskQueue::bounded(capacity);
    let state = AppState::new(
        Arc::new(MockRegistration::default()),
        notifier,
        player,
        Arc::new(config),
        tasks,
    );
    (state, queue)
}

// ─────────────────────────────────────────────────────────────────────────────
// Player
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub(crate) struct PlayCall {
    pub typus: PlaylistType,
    pub items: Vec<PlaylistItem>,
    pub start: usize,
    pub offset: Duration,
}

/// Headless player that records the commands it receives.
#[derive(Default)]
pub(crate) struct RecordingPlayer {
    inner: HeadlessPlayer,
    plays: Mutex<Vec<PlayCall>>,
    seeks: Mutex<Vec<Duration>>,
    clears: AtomicUsize,
    state_queries: AtomicUsize,
    fail: AtomicBool,
}

impl RecordingPlayer {
    pub fn plays(&self) -> Vec<PlayCall> {
        self.plays.lock().clone()
    }

    pub fn seeks(&self) -> Vec<Duration> {
        self.seeks.lock().clone()
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    pub fn state_queries(&self) -> usize {
        self.state_queries.load(Ordering::SeqCst)
    }

    /// Makes every queue command fail until reset.
    pub fn fail_commands(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), PlayerError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PlayerError::Unavailable("test failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl PlayerControl for RecordingPlayer {
    async fn play(
        &self,
        typus: PlaylistType,
        items: &[PlaylistItem],
        start: usize,
        offset: Duration,
    ) -> Result<(), PlayerError> {
        self.check()?;
        self.plays.lock().push(PlayCall {
            typus,
            items: items.to_vec(),
            start,
            offset,
        });
        self.inner.play(typus, items, start, offset).await
    }

    async fn clear(&self, typus: PlaylistType) -> Result<(), PlayerError> {
        self.check()?;
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.inner.clear(typus).await
    }

    async fn append(&self, typus: PlaylistType, items: &[PlaylistItem]) -> Result<(), PlayerError> {
        self.check()?;
        self.inner.append(typus, items).await
    }

    async fn pause(&self) -> Result<(), PlayerError> {
        self.inner.pause().await
    }

    async fn resume(&self) -> Result<(), PlayerError> {
        self.inner.resume().await
    }

    async fn stop(&self) -> Result<(), PlayerError> {
        self.inner.stop().await
    }

    async fn skip_next(&self) -> Result<(), PlayerError> {
        self.inner.skip_next().await
    }

    async fn skip_previous(&self) -> Result<(), PlayerError> {
        self.inner.skip_previous().await
    }

    async fn seek(&self, position: Duration) -> Result<(), PlayerError> {
        self.seeks.lock().push(position);
        self.inner.seek(position).await
    }

    async fn state(&self) -> Result<PlayerState, PlayerError> {
        self.state_queries.fetch_add(1, Ordering::SeqCst);
        self.inner.state().await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Fetcher
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub(crate) struct MockFetcher {
    items: Vec<RemoteQueueItem>,
    requests: Mutex<Vec<String>>,
    unauthorized: AtomicBool,
}

impl MockFetcher {
    pub fn with_items(items: Vec<RemoteQueueItem>) -> Self {
        Self {
            items,
            ..Default::default()
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    pub fn fail_with_unauthorized(&self, fail: bool) {
        self.unauthorized.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PlayQueueFetcher for MockFetcher {
    async fn fetch_queue(&self, queue_id: &str) -> Result<Vec<RemoteQueueItem>, FetchError> {
        self.requests.lock().push(queue_id.to_string());
        if self.unauthorized.load(Ordering::SeqCst) {
            return Err(FetchError::Unauthorized);
        }
        Ok(self.items.clone())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub(crate) struct MockTransport {
    failing: Mutex<HashSet<String>>,
    deliveries: Mutex<Vec<(String, String)>>,
}

impl MockTransport {
    pub fn fail_address(&self, address: &str) {
        self.failing.lock().insert(address.to_string());
    }

    /// Every attempted delivery as `(address, body)`.
    pub fn deliveries(&self) -> Vec<(String, String)> {
        self.deliveries.lock().clone()
    }
}

#[async_trait]
impl TimelineTransport for MockTransport {
    async fn deliver(&self, address: &str, body: &str) -> Result<(), NotifyError> {
        self.deliveries
            .lock()
            .push((address.to_string(), body.to_string()));
        if self.failing.lock().contains(address) {
            return Err(NotifyError::Rejected(500));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Registration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub(crate) struct MockRegistration {
    pub servers: Vec<ServerAddress>,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub checks: AtomicUsize,
    pub server_lists: AtomicUsize,
}

impl MockRegistration {
    pub fn with_servers(servers: Vec<ServerAddress>) -> Self {
        Self {
            servers,
            ..Default::default()
        }
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Registration for MockRegistration {
    fn configure(&self, _client: ClientInfo) {}

    async fn start_all(&self) -> Result<(), RegistrationError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_all(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    async fn check_client_registration(&self) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn server_list(&self) -> Vec<ServerAddress> {
        self.server_lists.fetch_add(1, Ordering::SeqCst);
        self.servers.clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Listener
// ─────────────────────────────────────────────────────────────────────────────

/// How a [`MockListener`] answers `handle_request`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ListenerScript {
    /// Every call serves a request immediately.
    AlwaysServe,
    /// Every call waits out the timeout without serving.
    Idle,
    /// First call panics, then idle.
    PanicOnce,
    /// First call reports the listener closed.
    CloseImmediately,
}

/// Counters shared between a factory, its listeners and the test.
#[derive(Default)]
pub(crate) struct ListenerStats {
    pub binds: AtomicUsize,
    pub handled: AtomicUsize,
    pub served: AtomicUsize,
    pub closes: AtomicUsize,
}

impl ListenerStats {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

pub(crate) struct MockListenerFactory {
    pub stats: Arc<ListenerStats>,
    /// Number of bind attempts that fail before one succeeds.
    failing_binds: usize,
    script: ListenerScript,
}

impl MockListenerFactory {
    pub fn new(script: ListenerScript) -> Self {
        Self {
            stats: Arc::new(ListenerStats::default()),
            failing_binds: 0,
            script,
        }
    }

    pub fn failing(failing_binds: usize, script: ListenerScript) -> Self {
        Self {
            failing_binds,
            ..Self::new(script)
        }
    }
}

#[async_trait]
impl ListenerFactory for MockListenerFactory {
    async fn bind(&self, addr: SocketAddr) -> Result<Box<dyn RequestListener>, ServerError> {
        let attempt = self.stats.binds.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failing_binds {
            return Err(ServerError::Bind {
                addr,
                source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
            });
        }
        Ok(Box::new(MockListener {
            addr,
            stats: Arc::clone(&self.stats),
            script: self.script,
        }))
    }
}

struct MockListener {
    addr: SocketAddr,
    stats: Arc<ListenerStats>,
    script: ListenerScript,
}

#[async_trait]
impl RequestListener for MockListener {
    async fn handle_request(&mut self, timeout: Duration) -> Result<bool, ServerError> {
        let call = self.stats.handled.fetch_add(1, Ordering::SeqCst);
        match self.script {
            ListenerScript::AlwaysServe => {
                self.stats.served.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
            ListenerScript::PanicOnce if call == 0 => panic!("listener fault"),
            ListenerScript::CloseImmediately if call == 0 => Err(ServerError::Closed),
            _ => {
                tokio::time::sleep(timeout).await;
                Ok(false)
            }
        }
    }

    async fn close(&mut self) {
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}
