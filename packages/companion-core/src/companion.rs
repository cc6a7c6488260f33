//! The companion loop.
//!
//! One cooperative loop owns the coordinator's mutable state and multiplexes:
//!
//! 1. servicing at most one HTTP request per iteration (bounded wait),
//! 2. a registration check every N served requests,
//! 3. refreshing the server subscriber set and notifying subscribers,
//! 4. dispatching at most one queued task,
//! 5. sleeping a short quantum.
//!
//! Every collaborator fault is contained: errors are logged values and panics
//! in request servicing, notification and dispatch are caught and logged.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;

use crate::api::{ListenerFactory, RequestListener, ServerError};
use crate::lifecycle::{wait_until_stopped, wait_while_suspended, LoopHandle};
use crate::notifier::{NotifyReport, SubscriptionManager};
use crate::playlist::{PlaylistSync, SyncOutcome};
use crate::registration::Registration;
use crate::state::CompanionConfig;
use crate::task_queue::TaskQueue;
use crate::utils::panic_message;

/// Counts served requests and signals every `every`-th one.
#[derive(Debug)]
struct RequestCounter {
    every: u32,
    served: u32,
}

impl RequestCounter {
    fn new(every: u32) -> Self {
        Self {
            every: every.max(1),
            served: 0,
        }
    }

    /// Records one served request. Returns true when a check is due.
    fn record(&mut self) -> bool {
        self.served += 1;
        if self.served >= self.every {
            self.served = 0;
            true
        } else {
            false
        }
    }
}

/// Coordinator multiplexing HTTP, registration, notification and dispatch.
pub struct CompanionLoop {
    config: Arc<CompanionConfig>,
    registration: Arc<dyn Registration>,
    notifier: Arc<SubscriptionManager>,
    listener_factory: Arc<dyn ListenerFactory>,
    tasks: TaskQueue,
    playlist: PlaylistSync,
    handle: LoopHandle,
}

impl CompanionLoop {
    pub fn new(
        config: Arc<CompanionConfig>,
        registration: Arc<dyn Registration>,
        notifier: Arc<SubscriptionManager>,
        listener_factory: Arc<dyn ListenerFactory>,
        tasks: TaskQueue,
        playlist: PlaylistSync,
    ) -> Self {
        Self {
            config,
            registration,
            notifier,
            listener_factory,
            tasks,
            playlist,
            handle: LoopHandle::new(),
        }
    }

    /// Handle used to suspend, resume and stop this loop.
    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    /// Runs until stopped through the [`LoopHandle`].
    pub async fn run(mut self) {
        log::info!(
            "[Companion] Starting companion loop for '{}'",
            self.config.client.name
        );
        let timing = self.config.timing.clone();
        let mut state_rx = self.handle.subscribe();

        let mut listener = self.start_listener().await;
        if let Err(e) = self.registration.start_all().await {
            log::warn!("[Companion] Registration unavailable: {}", e);
        }

        let mut counter = RequestCounter::new(timing.registration_check_every);
        while wait_while_suspended(&mut state_rx, timing.suspend_poll()).await {
            let mut listener_closed = false;
            if let Some(active) = listener.as_mut() {
                let outcome = AssertUnwindSafe(active.handle_request(timing.request_timeout()))
                    .catch_unwind()
                    .await;
                match outcome {
                    Ok(Ok(true)) => {
                        if counter.record() {
                            self.check_registration().await;
                        }
                    }
                    Ok(Ok(false)) => {}
                    Ok(Err(ServerError::Closed)) => listener_closed = true,
                    Ok(Err(e)) => log::warn!("[Companion] Error servicing request: {}", e),
                    Err(payload) => log::error!(
                        "[Companion] Panic while servicing request, continuing: {}",
                        panic_message(payload.as_ref())
                    ),
                }
            }
            if listener_closed {
                log::error!("[Companion] HTTP listener closed, continuing without HTTP");
                listener = None;
            }

            self.notify_subscribers().await;
            self.process_next_task().await;

            tokio::time::sleep(timing.quantum()).await;
        }

        self.registration.stop_all().await;
        if let Some(mut active) = listener.take() {
            active.close().await;
        }
        log::info!(
            "[Companion] Companion loop stopped after {} task(s)",
            self.tasks.completed()
        );
    }

    /// Binds the HTTP listener, retrying with a fixed backoff.
    ///
    /// Returns `None` when HTTP is disabled, every attempt failed, or a stop
    /// was requested during the backoff.
    async fn start_listener(&self) -> Option<Box<dyn RequestListener>> {
        if !self.config.enabled {
            log::info!("[Companion] HTTP listener disabled by configuration");
            return None;
        }

        let addr = self.config.bind_addr();
        let timing = &self.config.timing;
        let attempts = timing.bind_retries + 1;
        let mut state_rx = self.handle.subscribe();

        for attempt in 1..=attempts {
            match self.listener_factory.bind(addr).await {
                Ok(listener) => return Some(listener),
                Err(e) => log::warn!(
                    "[Companion] Unable to start HTTP listener (attempt {}/{}): {}",
                    attempt,
                    attempts,
                    e
                ),
            }
            if attempt == attempts {
                break;
            }

            log::info!(
                "[Companion] Retrying HTTP bind in {}ms",
                timing.bind_retry_delay_ms
            );
            let stopped = tokio::select! {
                _ = tokio::time::sleep(timing.bind_retry_delay()) => false,
                _ = wait_until_stopped(&mut state_rx) => true,
            };
            if stopped {
                log::info!("[Companion] Stop requested, abandoning HTTP startup");
                return None;
            }
        }

        log::error!(
            "[Companion] Giving up on HTTP listener on port {}, continuing without HTTP",
            addr.port()
        );
        None
    }

    /// Advisory registration check; never blocks beyond the configured timeout.
    async fn check_registration(&self) {
        let timeout = self.config.timing.registration_check_timeout();
        let registered = tokio::time::timeout(timeout, self.registration.check_client_registration())
            .await
            .unwrap_or(false);
        if registered {
            log::info!("[Companion] Client is still registered");
        } else {
            log::info!(
                "[Companion] Client is no longer registered, still listening on port {}",
                self.config.port
            );
        }
    }

    async fn notify_subscribers(&self) -> Option<NotifyReport> {
        let registration = &self.registration;
        let notifier = &self.notifier;
        let outcome = AssertUnwindSafe(async move {
            notifier.replace_servers(registration.server_list());
            notifier.notify().await
        })
        .catch_unwind()
        .await;

        match outcome {
            Ok(report) => {
                if report.failed > 0 {
                    log::debug!(
                        "[Companion] {} of {} timeline deliveries failed",
                        report.failed,
                        report.attempted
                    );
                }
                Some(report)
            }
            Err(payload) => {
                log::error!(
                    "[Companion] Panic while notifying subscribers, continuing: {}",
                    panic_message(payload.as_ref())
                );
                None
            }
        }
    }

    async fn process_next_task(&mut self) -> Option<SyncOutcome> {
        let task = self.tasks.try_pop()?;
        let outcome = AssertUnwindSafe(self.playlist.dispatch(task))
            .catch_unwind()
            .await;
        self.tasks.task_done();

        match outcome {
            Ok(outcome) => {
                tracing::debug!(?outcome, "task_done");
                Some(outcome)
            }
            Err(payload) => {
                log::error!(
                    "[Companion] Panic while dispatching task, continuing: {}",
                    panic_message(payload.as_ref())
                );
                None
            }
        }
    }
}
