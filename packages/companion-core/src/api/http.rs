//! HTTP route handlers.
//!
//! All handlers are thin - they delegate to the notifier, the player or the
//! task queue.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use axum::{
    extract::{connect_info::ConnectInfo, Path, Query, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::response::{api_success, xml_ack, xml_ok};
use crate::api::AppState;
use crate::error::{CompanionError, CompanionResult};
use crate::protocol_constants::{
    APP_NAME, CLIENT_IDENTIFIER_HEADER, PROTOCOL_CAPABILITIES, PROTOCOL_VERSION,
};
use crate::task_queue::Task;
use crate::utils::escape_attr;

static CLIENT_IDENTIFIER: HeaderName = HeaderName::from_static("x-plex-client-identifier");

/// Creates the companion router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/resources", get(resources))
        .route("/player/timeline/subscribe", get(subscribe))
        .route("/player/timeline/unsubscribe", get(unsubscribe))
        .route("/player/timeline/poll", get(poll_timeline))
        .route("/player/playback/playMedia", get(play_media))
        .route("/player/playback/{command}", get(playback_command))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn_with_state(state.clone(), record_served))
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Middleware
// ─────────────────────────────────────────────────────────────────────────────

/// Stamps the client identifier on every response and reports it as served.
async fn record_served(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&state.config.client.machine_identifier) {
        response
            .headers_mut()
            .insert(CLIENT_IDENTIFIER.clone(), value);
    }
    log::debug!("[HTTP] {} {} -> {}", method, path, response.status().as_u16());

    state.mark_served();
    response
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn client_identifier(headers: &HeaderMap) -> CompanionResult<String> {
    headers
        .get(CLIENT_IDENTIFIER_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            CompanionError::InvalidRequest(format!("missing {} header", CLIENT_IDENTIFIER_HEADER))
        })
}

fn subscriber_address(protocol: &str, ip: IpAddr, port: u16) -> String {
    match ip {
        IpAddr::V4(v4) => format!("{}://{}:{}", protocol, v4, port),
        IpAddr::V6(v6) => format!("{}://[{}]:{}", protocol, v6, port),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Liveness probe.
async fn health_check(State(state): State<AppState>) -> Response {
    api_success(json!({
        "status": "ok",
        "service": APP_NAME,
        "machineIdentifier": state.config.client.machine_identifier,
        "servers": state.registration.server_list().len(),
        "subscribers": state.notifier.subscribers().len(),
    }))
}

/// Describes this player to controllers.
async fn resources(State(state): State<AppState>) -> Response {
    let client = &state.config.client;
    xml_ok(format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?><MediaContainer>"#,
            r#"<Player title="{}" protocol="plex" protocolVersion="{}" protocolCapabilities="{}" "#,
            r#"machineIdentifier="{}" product="{}" version="{}" platform="{}" deviceClass="{}"/>"#,
            "</MediaContainer>"
        ),
        escape_attr(&client.name),
        PROTOCOL_VERSION,
        PROTOCOL_CAPABILITIES,
        escape_attr(&client.machine_identifier),
        escape_attr(&client.product),
        escape_attr(&client.version),
        std::env::consts::OS,
        escape_attr(&client.device_class),
    ))
}

async fn subscribe(
    State(state): State<AppState>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> CompanionResult<Response> {
    let client_id = client_identifier(&headers)?;
    let port = params
        .get("port")
        .and_then(|p| p.parse::<u16>().ok())
        .ok_or_else(|| CompanionError::InvalidRequest("missing or invalid port".into()))?;
    let protocol = params.get("protocol").map(String::as_str).unwrap_or("http");
    if protocol != "http" && protocol != "https" {
        return Err(CompanionError::InvalidRequest(format!(
            "unsupported protocol {}",
            protocol
        )));
    }

    let address = subscriber_address(protocol, remote_addr.ip(), port);
    state
        .notifier
        .add_subscriber(&client_id, &address, params.get("commandID").cloned());
    Ok(xml_ack())
}

async fn unsubscribe(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> CompanionResult<Response> {
    let client_id = client_identifier(&headers)?;
    state.notifier.remove_subscriber(&client_id);
    Ok(xml_ack())
}

/// Returns the current timeline immediately.
async fn poll_timeline(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> CompanionResult<Response> {
    let command_id = params.get("commandID").map(String::as_str);
    if let (Ok(client_id), Some(command_id)) = (client_identifier(&headers), command_id) {
        state.notifier.update_command_id(&client_id, command_id);
    }
    let timeline = state.notifier.current_timeline(command_id).await?;
    Ok(xml_ok(timeline))
}

/// Queues a play queue for the companion loop to mirror.
async fn play_media(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> CompanionResult<Response> {
    let Some(container_key) = params.get("containerKey").cloned() else {
        return Err(CompanionError::InvalidRequest("missing containerKey".into()));
    };
    if let (Ok(client_id), Some(command_id)) = (client_identifier(&headers), params.get("commandID")) {
        state.notifier.update_command_id(&client_id, command_id);
    }

    state.tasks.try_push(Task::playlist(params))?;
    log::info!("[HTTP] Queued playMedia for {}", container_key);
    Ok(xml_ack())
}

/// Forwards a transport command to the player.
async fn playback_command(
    State(state): State<AppState>,
    Path(command): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> CompanionResult<Response> {
    let player = &state.player;
    match command.as_str() {
        "play" => player.resume().await?,
        "pause" => player.pause().await?,
        "stop" => player.stop().await?,
        "skipNext" => player.skip_next().await?,
        "skipPrevious" => player.skip_previous().await?,
        "seekTo" => {
            let offset = params
                .get("offset")
                .and_then(|o| o.parse::<u64>().ok())
                .ok_or_else(|| CompanionError::InvalidRequest("missing or invalid offset".into()))?;
            player.seek(Duration::from_millis(offset)).await?
        }
        other => {
            return Err(CompanionError::InvalidRequest(format!(
                "unknown playback command {}",
                other
            )))
        }
    }
    log::debug!("[HTTP] Playback command {}", command);
    Ok(xml_ack())
}
