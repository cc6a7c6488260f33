//! Core configuration types.
//!
//! [`CompanionConfig`] is passed explicitly to every component at construction;
//! nothing in the crate reads settings from ambient global state.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol_constants::{
    APP_NAME, BIND_RETRY_COUNT, BIND_RETRY_DELAY_MS, DEFAULT_COMPANION_PORT, LOOP_QUANTUM_MS,
    NOTIFY_RETRY_DELAY_MS, REGISTRATION_CHECK_EVERY, REGISTRATION_CHECK_TIMEOUT_MS,
    REQUEST_TIMEOUT_MS, SUSPEND_POLL_MS, TASK_QUEUE_CAPACITY,
};
use crate::registration::ServerAddress;

/// Identity this player announces to controllers and servers.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ClientInfo {
    /// Human readable player name shown in controller apps.
    pub name: String,
    /// Stable unique identifier of this player.
    pub machine_identifier: String,
    /// Product name.
    pub product: String,
    /// Product version.
    pub version: String,
    /// Device class reported in `/resources` (e.g. "pc", "stb").
    pub device_class: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            name: format!("{} {}", APP_NAME, host),
            machine_identifier: uuid::Uuid::new_v4().to_string(),
            product: APP_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            device_class: "pc".to_string(),
        }
    }
}

/// Scheduling parameters of the companion loop.
///
/// Defaults come from [`protocol_constants`](crate::protocol_constants);
/// tests shrink them to keep virtual-time runs short.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoopTiming {
    /// Sleep between iterations (milliseconds).
    pub quantum_ms: u64,
    /// Bounded wait for one HTTP request per iteration (milliseconds).
    pub request_timeout_ms: u64,
    /// Poll period while suspended (milliseconds).
    pub suspend_poll_ms: u64,
    /// Serviced requests between registration checks.
    pub registration_check_every: u32,
    /// Upper bound for one registration check (milliseconds).
    pub registration_check_timeout_ms: u64,
    /// Bind retries after the first failed attempt.
    pub bind_retries: u32,
    /// Delay between bind attempts (milliseconds).
    pub bind_retry_delay_ms: u64,
    /// Minimum delay before retrying a failed subscriber (milliseconds).
    pub notify_retry_delay_ms: u64,
}

impl LoopTiming {
    pub fn quantum(&self) -> Duration {
        Duration::from_millis(self.quantum_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn suspend_poll(&self) -> Duration {
        Duration::from_millis(self.suspend_poll_ms)
    }

    pub fn registration_check_timeout(&self) -> Duration {
        Duration::from_millis(self.registration_check_timeout_ms)
    }

    pub fn bind_retry_delay(&self) -> Duration {
        Duration::from_millis(self.bind_retry_delay_ms)
    }

    pub fn notify_retry_delay(&self) -> Duration {
        Duration::from_millis(self.notify_retry_delay_ms)
    }
}

impl Default for LoopTiming {
    fn default() -> Self {
        Self {
            quantum_ms: LOOP_QUANTUM_MS,
            request_timeout_ms: REQUEST_TIMEOUT_MS,
            suspend_poll_ms: SUSPEND_POLL_MS,
            registration_check_every: REGISTRATION_CHECK_EVERY,
            registration_check_timeout_ms: REGISTRATION_CHECK_TIMEOUT_MS,
            bind_retries: BIND_RETRY_COUNT,
            bind_retry_delay_ms: BIND_RETRY_DELAY_MS,
            notify_retry_delay_ms: NOTIFY_RETRY_DELAY_MS,
        }
    }
}

/// Configuration for the companion coordinator.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CompanionConfig {
    // HTTP
    /// Start the HTTP listener. When false the loop still runs discovery and notify.
    pub enabled: bool,

    /// Port for the companion HTTP listener.
    pub port: u16,

    /// Address the HTTP listener binds to.
    pub bind_ip: IpAddr,

    /// Capacity of the task queue between HTTP and the loop.
    pub task_queue_capacity: usize,

    // Identity
    /// Identity announced to controllers.
    pub client: ClientInfo,

    // Remote server
    /// Base URL of the remote media server used to fetch play queues.
    pub server_url: Option<String>,

    /// Access token sent with play queue requests.
    pub server_token: Option<String>,

    /// Servers that always receive timeline notifications, regardless of discovery.
    pub static_servers: Vec<ServerAddress>,

    // Discovery
    /// Advertise this player and browse for servers over mDNS.
    pub discovery_mdns: bool,

    /// IP address advertised over mDNS (auto-detected when unset).
    pub advertise_ip: Option<IpAddr>,

    // Scheduling
    /// Loop scheduling parameters.
    pub timing: LoopTiming,
}

impl CompanionConfig {
    /// Socket address the HTTP listener binds to.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.task_queue_capacity == 0 {
            return Err("task_queue_capacity must be >= 1 (mpsc::channel panics on 0)".to_string());
        }
        if self.timing.quantum_ms == 0 {
            return Err("timing.quantum_ms must be >= 1".to_string());
        }
        if self.timing.suspend_poll_ms == 0 {
            return Err("timing.suspend_poll_ms must be >= 1".to_string());
        }
        if self.timing.registration_check_every == 0 {
            return Err("timing.registration_check_every must be >= 1".to_string());
        }
        if self.client.machine_identifier.is_empty() {
            return Err("client.machine_identifier must not be empty".to_string());
        }
        if let Some(url) = &self.server_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!("server_url must be an http(s) URL, got {}", url));
            }
        }
        Ok(())
    }
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: DEFAULT_COMPANION_PORT,
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            task_queue_capacity: TASK_QUEUE_CAPACITY,
            client: ClientInfo::default(),
            server_url: None,
            server_token: None,
            static_servers: Vec::new(),
            discovery_mdns: true,
            advertise_ip: None,
            timing: LoopTiming::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = CompanionConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.enabled);
        assert_eq!(config.port, DEFAULT_COMPANION_PORT);
        assert_eq!(config.task_queue_capacity, 100);
    }

    #[test]
    fn zero_queue_capacity_is_rejected() {
        let config = CompanionConfig {
            task_queue_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn non_http_server_url_is_rejected() {
        let config = CompanionConfig {
            server_url: Some("ftp://server".into()),
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().contains("server_url"));
    }

    #[test]
    fn default_client_identifiers_are_unique() {
        let a = ClientInfo::default();
        let b = ClientInfo::default();
        assert_ne!(a.machine_identifier, b.machine_identifier);
        assert!(a.name.starts_with(APP_NAME));
    }

    #[test]
    fn default_timing_matches_protocol_constants() {
        let timing = LoopTiming::default();
        assert_eq!(timing.quantum(), Duration::from_millis(10));
        assert_eq!(timing.request_timeout(), Duration::from_millis(950));
        assert_eq!(timing.registration_check_every, 100);
        assert_eq!(timing.bind_retries, 3);
    }

    #[test]
    fn bind_addr_combines_ip_and_port() {
        let config = CompanionConfig {
            port: 4000,
            ..Default::default()
        };
        assert_eq!(config.bind_addr().port(), 4000);
        assert!(config.bind_addr().ip().is_unspecified());
    }
}
