//! Client registration and server discovery.
//!
//! A [`Registration`] announces this player to the network and keeps the list
//! of media servers that should receive timeline notifications.

pub mod mdns;

use std::collections::HashSet;
use std::fmt;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol_constants::DEFAULT_SERVER_PORT;
use crate::state::ClientInfo;

pub use mdns::MdnsRegistration;

/// Errors raised while registering with the network.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// mDNS daemon could not be created or refused a registration.
    #[error("mDNS error: {0}")]
    Mdns(String),

    /// No LAN address could be determined for advertisement.
    #[error("no advertisable address: {0}")]
    NoAddress(String),
}

/// A media server that receives timeline notifications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerAddress {
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    /// Friendly name, when discovery provided one.
    #[serde(default)]
    pub name: Option<String>,
}

fn default_server_port() -> u16 {
    DEFAULT_SERVER_PORT
}

impl ServerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            name: None,
        }
    }

    /// Base URL used to reach the server's HTTP interface.
    pub fn base_url(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("http://[{}]:{}", self.host, self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({}:{})", name, self.host, self.port),
            None => write!(f, "{}:{}", self.host, self.port),
        }
    }
}

/// Announces this player and tracks known servers.
#[async_trait]
pub trait Registration: Send + Sync {
    /// Sets the identity announced by subsequent `start_all` calls.
    fn configure(&self, client: ClientInfo);

    /// Starts announcing and discovering.
    async fn start_all(&self) -> Result<(), RegistrationError>;

    /// Stops announcing and discovering. Safe to call more than once.
    async fn stop_all(&self);

    /// Returns whether this player is still announced.
    async fn check_client_registration(&self) -> bool;

    /// Servers that should receive timeline notifications.
    fn server_list(&self) -> Vec<ServerAddress>;
}

/// Removes duplicate host/port pairs, keeping the first occurrence.
pub(crate) fn dedup_servers(servers: impl IntoIterator<Item = ServerAddress>) -> Vec<ServerAddress> {
    let mut seen = HashSet::new();
    servers
        .into_iter()
        .filter(|s| seen.insert((s.host.clone(), s.port)))
        .collect()
}

/// Registration with a fixed server list and no network announcement.
pub struct StaticRegistration {
    servers: Vec<ServerAddress>,
    client: RwLock<Option<ClientInfo>>,
}

impl StaticRegistration {
    pub fn new(servers: Vec<ServerAddress>) -> Self {
        Self {
            servers: dedup_servers(servers),
            client: RwLock::new(None),
        }
    }
}

#[async_trait]
impl Registration for StaticRegistration {
    fn configure(&self, client: ClientInfo) {
        *self.client.write() = Some(client);
    }

    async fn start_all(&self) -> Result<(), RegistrationError> {
        let name = self
            .client
            .read()
            .as_ref()
            .map(|c| c.name.clone())
            .unwrap_or_default();
        log::info!(
            "[Registration] '{}' using {} static server(s), discovery disabled",
            name,
            self.servers.len()
        );
        Ok(())
    }

    async fn stop_all(&self) {
        log::debug!("[Registration] Static registration stopped");
    }

    async fn check_client_registration(&self) -> bool {
        self.client.read().is_some()
    }

    fn server_list(&self) -> Vec<ServerAddress> {
        self.servers.clone()
    }
}
