//! Subscriber notification.
//!
//! The [`SubscriptionManager`] tracks two kinds of subscribers:
//!
//! - **Servers**: replaced wholesale every loop iteration from the
//!   registration's server list.
//! - **Controllers**: added and removed over HTTP, keyed by client identifier.
//!   A controller that fails [`MAX_SUBSCRIBER_FAILURES`] deliveries in a row is
//!   dropped.
//!
//! `notify()` renders the current timeline per subscriber and delivers it
//! concurrently. Each delivery is isolated: a failing subscriber only affects
//! its own state.

pub mod timeline;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::RwLock;
use tokio::time::Instant;

use crate::player::{PlayerControl, PlayerError};
use crate::protocol_constants::MAX_SUBSCRIBER_FAILURES;
use crate::registration::ServerAddress;
use crate::state::ClientInfo;

pub use timeline::render_timeline;
pub use transport::{HttpTimelineTransport, NotifyError, TimelineTransport};

/// Result of the most recent delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyResult {
    Delivered,
    Failed(String),
}

/// Which set a subscriber belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberKind {
    Server,
    Controller,
}

/// A remote endpoint receiving timelines.
#[derive(Debug, Clone)]
pub struct Subscriber {
    /// Key within its set: the base URL for servers, the client id for controllers.
    pub id: String,
    /// Base URL deliveries are sent to.
    pub address: String,
    pub kind: SubscriberKind,
    pub command_id: Option<String>,
    pub last_result: Option<NotifyResult>,
    failures: u32,
    last_payload: Option<String>,
    retry_at: Option<Instant>,
}

impl Subscriber {
    fn new(id: String, address: String, kind: SubscriberKind, command_id: Option<String>) -> Self {
        Self {
            id,
            address,
            kind,
            command_id,
            last_result: None,
            failures: 0,
            last_payload: None,
            retry_at: None,
        }
    }

    /// Consecutive failed deliveries.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    fn is_due(&self, payload: &str, now: Instant) -> bool {
        if self.last_payload.as_deref() == Some(payload) {
            return false;
        }
        self.retry_at.map_or(true, |at| now >= at)
    }
}

/// Summary of one `notify()` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotifyReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Controllers dropped after too many failures.
    pub removed: usize,
}

struct Delivery {
    kind: SubscriberKind,
    id: String,
    address: String,
    payload: String,
}

/// Tracks subscribers and pushes timelines to them.
pub struct SubscriptionManager {
    player: Arc<dyn PlayerControl>,
    transport: Arc<dyn TimelineTransport>,
    client: ClientInfo,
    servers: RwLock<Vec<Subscriber>>,
    controllers: RwLock<Vec<Subscriber>>,
    retry_delay: Duration,
}

impl SubscriptionManager {
    pub fn new(
        player: Arc<dyn PlayerControl>,
        transport: Arc<dyn TimelineTransport>,
        client: ClientInfo,
        retry_delay: Duration,
    ) -> Self {
        Self {
            player,
            transport,
            client,
            servers: RwLock::new(Vec::new()),
            controllers: RwLock::new(Vec::new()),
            retry_delay,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Subscriber Sets
    // ─────────────────────────────────────────────────────────────────────────

    /// Replaces the server set, keeping delivery state for servers still present.
    pub fn replace_servers(&self, servers: Vec<ServerAddress>) {
        let urls: Vec<String> = servers.iter().map(ServerAddress::base_url).collect();
        {
            let current = self.servers.read();
            if current.len() == urls.len() && current.iter().zip(&urls).all(|(s, u)| &s.id == u)
            {
                return;
            }
        }

        let mut current = self.servers.write();
        let next: Vec<Subscriber> = urls
            .into_iter()
            .map(|url| {
                current
                    .iter()
                    .find(|s| s.id == url)
                    .cloned()
                    .unwrap_or_else(|| {
                        log::debug!("[Notify] New server subscriber {}", url);
                        Subscriber::new(url.clone(), url, SubscriberKind::Server, None)
                    })
            })
            .collect();
        *current = next;
    }

    /// Adds or refreshes a controller subscription.
    pub fn add_subscriber(&self, client_id: &str, address: &str, command_id: Option<String>) {
        let mut controllers = self.controllers.write();
        match controllers.iter_mut().find(|s| s.id == client_id) {
            Some(existing) => {
                if existing.address != address {
                    existing.address = address.to_string();
                    existing.last_payload = None;
                }
                existing.command_id = command_id;
                existing.failures = 0;
                existing.retry_at = None;
            }
            None => {
                log::info!("[Notify] Controller {} subscribed at {}", client_id, address);
                controllers.push(Subscriber::new(
                    client_id.to_string(),
                    address.to_string(),
                    SubscriberKind::Controller,
                    command_id,
                ));
            }
        }
    }

    /// Removes a controller subscription. Returns whether it existed.
    pub fn remove_subscriber(&self, client_id: &str) -> bool {
        let mut controllers = self.controllers.write();
        let before = controllers.len();
        controllers.retain(|s| s.id != client_id);
        let removed = controllers.len() != before;
        if removed {
            log::info!("[Notify] Controller {} unsubscribed", client_id);
        }
        removed
    }

    /// Records the latest command id sent by a subscribed controller.
    pub fn update_command_id(&self, client_id: &str, command_id: &str) {
        if let Some(s) = self
            .controllers
            .write()
            .iter_mut()
            .find(|s| s.id == client_id)
        {
            s.command_id = Some(command_id.to_string());
        }
    }

    /// Snapshot of all subscribers, servers first.
    pub fn subscribers(&self) -> Vec<Subscriber> {
        let mut all = self.servers.read().clone();
        all.extend(self.controllers.read().iter().cloned());
        all
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Delivery
    // ─────────────────────────────────────────────────────────────────────────

    /// Renders the timeline for an on-demand poll.
    pub async fn current_timeline(&self, command_id: Option<&str>) -> Result<String, PlayerError> {
        let state = self.player.state().await?;
        Ok(render_timeline(&state, &self.client, command_id))
    }

    /// Delivers the current timeline to every due subscriber.
    pub async fn notify(&self) -> NotifyReport {
        let mut report = NotifyReport::default();
        if self.servers.read().is_empty() && self.controllers.read().is_empty() {
            return report;
        }

        let state = match self.player.state().await {
            Ok(state) => state,
            Err(e) => {
                log::warn!("[Notify] Player state unavailable: {}", e);
                return report;
            }
        };

        let now = Instant::now();
        let mut due = Vec::new();
        for subscriber in self.servers.read().iter().chain(self.controllers.read().iter()) {
            let payload = render_timeline(&state, &self.client, subscriber.command_id.as_deref());
            if subscriber.is_due(&payload, now) {
                due.push(Delivery {
                    kind: subscriber.kind,
                    id: subscriber.id.clone(),
                    address: subscriber.address.clone(),
                    payload,
                });
            }
        }
        if due.is_empty() {
            return report;
        }

        let transport = &self.transport;
        let results = join_all(
            due.iter()
                .map(|d| async move { transport.deliver(&d.address, &d.payload).await }),
        )
        .await;

        let now = Instant::now();
        for (delivery, result) in due.into_iter().zip(results) {
            report.attempted += 1;
            match &result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    log::debug!("[Notify] Delivery to {} failed: {}", delivery.address, e);
                }
            }
            if self.record(delivery, result, now) {
                report.removed += 1;
            }
        }

        tracing::debug!(
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failed,
            "notify_complete"
        );
        report
    }

    /// Applies a delivery result. Returns true if the subscriber was dropped.
    fn record(&self, delivery: Delivery, result: Result<(), NotifyError>, now: Instant) -> bool {
        let set = match delivery.kind {
            SubscriberKind::Server => &self.servers,
            SubscriberKind::Controller => &self.controllers,
        };
        let mut subscribers = set.write();
        // The set may have been replaced while delivering.
        let Some(index) = subscribers
            .iter()
            .position(|s| s.id == delivery.id && s.address == delivery.address)
        else {
            return false;
        };

        let subscriber = &mut subscribers[index];
        match result {
            Ok(()) => {
                subscriber.failures = 0;
                subscriber.retry_at = None;
                subscriber.last_payload = Some(delivery.payload);
                subscriber.last_result = Some(NotifyResult::Delivered);
                false
            }
            Err(e) => {
                subscriber.failures += 1;
                subscriber.retry_at = Some(now + self.retry_delay);
                subscriber.last_result = Some(NotifyResult::Failed(e.to_string()));
                if delivery.kind == SubscriberKind::Controller
                    && subscriber.failures >= MAX_SUBSCRIBER_FAILURES
                {
                    log::warn!(
                        "[Notify] Dropping controller {} after {} failed deliveries",
                        subscriber.id,
                        subscriber.failures
                    );
                    subscribers.remove(index);
                    return true;
                }
                false
            }
        }
    }
}
