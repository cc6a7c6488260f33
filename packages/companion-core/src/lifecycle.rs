//! Coordinator lifecycle control.
//!
//! The companion loop is driven by an external supervisor through a
//! [`LoopHandle`]. The handle owns a small state machine:
//!
//! ```text
//!   Running ──suspend──▶ Suspended
//!      ▲                    │
//!      └──────resume────────┘
//!   Running | Suspended ──stop──▶ Stopped (terminal)
//! ```
//!
//! A suspended loop idles cheaply but still observes `stop` within one poll
//! period.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Scheduling state of the companion loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Loop iterations run normally.
    Running,
    /// Loop idles until resumed or stopped.
    Suspended,
    /// Loop exits at the next check. Terminal.
    Stopped,
}

/// Supervisor handle for suspending, resuming and stopping the loop.
///
/// Cheap to clone; all clones drive the same loop.
#[derive(Clone)]
pub struct LoopHandle {
    tx: Arc<watch::Sender<LoopState>>,
}

impl LoopHandle {
    /// Creates a handle in the `Running` state.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(LoopState::Running);
        Self { tx: Arc::new(tx) }
    }

    /// Returns the current state.
    pub fn state(&self) -> LoopState {
        *self.tx.borrow()
    }

    /// Returns whether a stop has been requested.
    pub fn is_stopped(&self) -> bool {
        self.state() == LoopState::Stopped
    }

    /// Suspends a running loop.
    ///
    /// Returns `true` if the state changed. Ignored unless `Running`.
    pub fn suspend(&self) -> bool {
        self.transition(LoopState::Running, LoopState::Suspended)
    }

    /// Resumes a suspended loop.
    ///
    /// Returns `true` if the state changed. Ignored unless `Suspended`.
    pub fn resume(&self) -> bool {
        self.transition(LoopState::Suspended, LoopState::Running)
    }

    /// Requests the loop to stop.
    ///
    /// Returns `true` if this call performed the transition.
    pub fn stop(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == LoopState::Stopped {
                return false;
            }
            tracing::debug!(from = ?*state, "loop_stop_requested");
            *state = LoopState::Stopped;
            true
        })
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<LoopState> {
        self.tx.subscribe()
    }

    fn transition(&self, from: LoopState, to: LoopState) -> bool {
        self.tx.send_if_modified(|state| {
            if *state != from {
                return false;
            }
            *state = to;
            true
        })
    }
}

impl Default for LoopHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Blocks while the loop is suspended.
///
/// Returns `true` when the loop should run an iteration and `false` once it
/// has been stopped. The state is re-checked at least every `poll`.
pub(crate) async fn wait_while_suspended(
    rx: &mut watch::Receiver<LoopState>,
    poll: Duration,
) -> bool {
    let mut announced = false;
    loop {
        let state = *rx.borrow_and_update();
        match state {
            LoopState::Running => {
                if announced {
                    log::info!("[Companion] Resumed");
                }
                return true;
            }
            LoopState::Stopped => return false,
            LoopState::Suspended => {
                if !announced {
                    log::info!("[Companion] Suspended, waiting for resume");
                    announced = true;
                }
                match tokio::time::timeout(poll, rx.changed()).await {
                    Ok(Ok(())) | Err(_) => {}
                    // Every handle is gone; nobody can resume us.
                    Ok(Err(_)) => return false,
                }
            }
        }
    }
}

/// Resolves once the loop has been asked to stop.
pub(crate) async fn wait_until_stopped(rx: &mut watch::Receiver<LoopState>) {
    loop {
        if *rx.borrow_and_update() == LoopState::Stopped {
            return;
        }
        if rx.changed().await.is_err() {
            // No handle left to send a stop.
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_running() {
        let handle = LoopHandle::new();
        assert_eq!(handle.state(), LoopState::Running);
        assert!(!handle.is_stopped());
    }

    #[test]
    fn suspend_and_resume_round_trip() {
        let handle = LoopHandle::new();
        assert!(handle.suspend());
        assert_eq!(handle.state(), LoopState::Suspended);
        assert!(!handle.suspend());
        assert!(handle.resume());
        assert_eq!(handle.state(), LoopState::Running);
        assert!(!handle.resume());
    }

    #[test]
    fn stopped_is_terminal() {
        let handle = LoopHandle::new();
        assert!(handle.suspend());
        assert!(handle.stop());
        assert!(!handle.stop());
        assert!(!handle.resume());
        assert!(!handle.suspend());
        assert_eq!(handle.state(), LoopState::Stopped);
    }

    #[test]
    fn clones_share_state() {
        let handle = LoopHandle::new();
        let clone = handle.clone();
        clone.stop();
        assert!(handle.is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn suspended_wait_observes_stop() {
        let handle = LoopHandle::new();
        let mut rx = handle.subscribe();
        handle.suspend();

        let stopper = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            stopper.stop();
        });

        let runnable = wait_while_suspended(&mut rx, Duration::from_secs(1)).await;
        assert!(!runnable);
    }

    #[tokio::test(start_paused = true)]
    async fn suspended_wait_returns_on_resume() {
        let handle = LoopHandle::new();
        let mut rx = handle.subscribe();
        handle.suspend();

        let resumer = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            resumer.resume();
        });

        assert!(wait_while_suspended(&mut rx, Duration::from_secs(1)).await);
        assert_eq!(handle.state(), LoopState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_until_stopped_ignores_suspend() {
        let handle = LoopHandle::new();
        let mut rx = handle.subscribe();

        let driver = handle.clone();
        tokio::spawn(async move {
            driver.suspend();
            tokio::time::sleep(Duration::from_secs(1)).await;
            driver.resume();
            tokio::time::sleep(Duration::from_secs(1)).await;
            driver.stop();
        });

        wait_until_stopped(&mut rx).await;
        assert!(handle.is_stopped());
    }

    #[tokio::test]
    async fn running_wait_returns_immediately() {
        let handle = LoopHandle::new();
        let mut rx = handle.subscribe();
        assert!(wait_while_suspended(&mut rx, Duration::from_secs(1)).await);
    }
}
