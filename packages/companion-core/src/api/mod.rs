//! HTTP API layer.
//!
//! The companion loop does not run axum itself. It asks a [`ListenerFactory`]
//! for a [`RequestListener`] and then, once per iteration, waits a bounded
//! time for the listener to report a served request. The axum implementation
//! serves concurrently on its own task and reports each completed request
//! through a bounded channel.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::notifier::SubscriptionManager;
use crate::player::PlayerControl;
use crate::protocol_constants::SERVED_CHANNEL_CAPACITY;
use crate::registration::Registration;
use crate::state::CompanionConfig;
use crate::task_queue::TaskSender;

pub mod http;
pub mod response;

/// Errors that can occur when starting or running the HTTP listener.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to create or bind the listening socket.
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The server task has exited; no more requests will be served.
    #[error("HTTP server closed")]
    Closed,
}

/// Shared application state for the API layer.
///
/// Handlers stay thin and delegate to these collaborators.
#[derive(Clone)]
pub struct AppState {
    /// Announces this player; consulted by `/resources`.
    pub registration: Arc<dyn Registration>,
    /// Controller subscriptions and on-demand timelines.
    pub notifier: Arc<SubscriptionManager>,
    /// Command sink for direct transport commands.
    pub player: Arc<dyn PlayerControl>,
    pub config: Arc<CompanionConfig>,
    /// Producer side of the loop's task queue.
    pub tasks: TaskSender,
    served_tx: Option<mpsc::Sender<()>>,
}

impl AppState {
    pub fn new(
        registration: Arc<dyn Registration>,
        notifier: Arc<SubscriptionManager>,
        player: Arc<dyn PlayerControl>,
        config: Arc<CompanionConfig>,
        tasks: TaskSender,
    ) -> Self {
        Self {
            registration,
            notifier,
            player,
            config,
            tasks,
            served_tx: None,
        }
    }

    /// Returns a copy reporting served requests on `tx`.
    pub fn with_served_channel(&self, tx: mpsc::Sender<()>) -> Self {
        Self {
            served_tx: Some(tx),
            ..self.clone()
        }
    }

    /// Reports one completed request. Dropped silently if nobody is keeping up.
    pub(crate) fn mark_served(&self) {
        if let Some(tx) = &self.served_tx {
            let _ = tx.try_send(());
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Listener Traits
// ─────────────────────────────────────────────────────────────────────────────

/// A running HTTP listener, polled by the companion loop.
#[async_trait]
pub trait RequestListener: Send {
    /// Waits up to `timeout` for one request to be served.
    ///
    /// Returns `Ok(true)` if a request was served, `Ok(false)` on timeout and
    /// `Err(ServerError::Closed)` once the listener can no longer serve.
    async fn handle_request(&mut self, timeout: Duration) -> Result<bool, ServerError>;

    /// Stops serving and releases the socket.
    async fn close(&mut self);

    /// Address actually bound.
    fn local_addr(&self) -> SocketAddr;
}

/// Creates listeners bound to an address.
#[async_trait]
pub trait ListenerFactory: Send + Sync {
    async fn bind(&self, addr: SocketAddr) -> Result<Box<dyn RequestListener>, ServerError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Axum Listener
// ─────────────────────────────────────────────────────────────────────────────

/// Builds axum listeners over a shared [`AppState`].
pub struct AxumListenerFactory {
    state: AppState,
}

impl AxumListenerFactory {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl ListenerFactory for AxumListenerFactory {
    async fn bind(&self, addr: SocketAddr) -> Result<Box<dyn RequestListener>, ServerError> {
        let bind_err = |source| ServerError::Bind { addr, source };
        let std_listener = bind_reusable(addr).map_err(bind_err)?;
        let listener = tokio::net::TcpListener::from_std(std_listener).map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;

        let (served_tx, served_rx) = mpsc::channel(SERVED_CHANNEL_CAPACITY);
        let app = http::create_router(self.state.with_served_channel(served_tx));

        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();
        let server = tokio::spawn(async move {
            let result = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
            if let Err(e) = result {
                log::error!("[HTTP] Server error: {}", e);
            }
        });

        log::info!("[HTTP] Companion listening on http://{}", local_addr);
        Ok(Box::new(HttpListener {
            local_addr,
            served_rx,
            cancel,
            server: Some(server),
        }))
    }
}

/// Axum server running on a background task.
pub struct HttpListener {
    local_addr: SocketAddr,
    served_rx: mpsc::Receiver<()>,
    cancel: CancellationToken,
    server: Option<JoinHandle<()>>,
}

#[async_trait]
impl RequestListener for HttpListener {
    async fn handle_request(&mut self, timeout: Duration) -> Result<bool, ServerError> {
        match tokio::time::timeout(timeout, self.served_rx.recv()).await {
            Ok(Some(())) => Ok(true),
            Ok(None) => Err(ServerError::Closed),
            Err(_) => Ok(false),
        }
    }

    async fn close(&mut self) {
        self.cancel.cancel();
        if let Some(server) = self.server.take() {
            if tokio::time::timeout(Duration::from_secs(2), server)
                .await
                .is_err()
            {
                log::warn!("[HTTP] Server did not drain in time, abandoning connections");
            }
        }
        log::info!("[HTTP] Listener on {} closed", self.local_addr);
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for HttpListener {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Creates a non-blocking TCP listener with `SO_REUSEADDR` set.
fn bind_reusable(addr: SocketAddr) -> std::io::Result<std::net::TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;

    // SO_REUSEADDR - allows bind on rapid restarts
    if let Err(e) = socket.set_reuse_address(true) {
        log::warn!("[HTTP] Failed to set SO_REUSEADDR on {}: {}", addr, e);
    }
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    Ok(socket.into())
}
