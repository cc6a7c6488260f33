//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use anyhow::{Context, Result};
use companion_core::{ClientInfo, CompanionConfig, ServerAddress};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Serve the companion HTTP API.
    pub http_enabled: bool,

    /// Port to bind the HTTP listener to.
    /// Override: `COMPANION_BIND_PORT`
    pub bind_port: u16,

    /// Address to bind the HTTP listener to.
    pub bind_ip: IpAddr,

    /// IP address advertised over mDNS.
    /// If not specified, auto-detection will be attempted.
    /// Override: `COMPANION_ADVERTISE_IP`
    pub advertise_ip: Option<IpAddr>,

    /// Player name shown in controller apps.
    /// Override: `COMPANION_NAME`
    pub name: Option<String>,

    /// Stable player identifier. A random one is generated when unset.
    /// Override: `COMPANION_MACHINE_ID`
    pub machine_identifier: Option<String>,

    /// Base URL of the media server play queues are fetched from.
    /// Override: `COMPANION_SERVER_URL`
    pub server_url: Option<String>,

    /// Access token for the media server.
    /// Override: `COMPANION_SERVER_TOKEN`
    pub server_token: Option<String>,

    /// Servers that always receive timeline updates.
    pub static_servers: Vec<ServerAddress>,

    /// Enable mDNS advertisement and server discovery.
    pub discovery_mdns: bool,

    /// Capacity of the task queue between HTTP and the loop.
    pub task_queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let core = CompanionConfig::default();
        Self {
            http_enabled: true,
            bind_port: core.port,
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            advertise_ip: None,
            name: None,
            machine_identifier: None,
            server_url: None,
            server_token: None,
            static_servers: Vec::new(),
            discovery_mdns: true,
            task_queue_capacity: core.task_queue_capacity,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn from_file(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("COMPANION_BIND_PORT").and_then(|v| v.parse().ok()) {
            self.bind_port = port;
        }

        if let Some(ip) = lookup("COMPANION_ADVERTISE_IP").and_then(|v| v.parse().ok()) {
            self.advertise_ip = Some(ip);
        }

        if let Some(name) = lookup("COMPANION_NAME") {
            self.name = Some(name);
        }

        if let Some(id) = lookup("COMPANION_MACHINE_ID") {
            self.machine_identifier = Some(id);
        }

        if let Some(url) = lookup("COMPANION_SERVER_URL") {
            self.server_url = Some(url);
        }

        if let Some(token) = lookup("COMPANION_SERVER_TOKEN") {
            self.server_token = Some(token);
        }

        // Note: COMPANION_LOG_LEVEL is handled by clap via #[arg(env = ...)] in main.rs
    }

    /// Converts to companion-core's config type.
    pub fn to_core_config(&self) -> CompanionConfig {
        let mut client = ClientInfo::default();
        if let Some(name) = &self.name {
            client.name = name.clone();
        }
        if let Some(id) = &self.machine_identifier {
            client.machine_identifier = id.clone();
        }

        CompanionConfig {
            enabled: self.http_enabled,
            port: self.bind_port,
            bind_ip: self.bind_ip,
            task_queue_capacity: self.task_queue_capacity,
            client,
            server_url: self.server_url.clone(),
            server_token: self.server_token.clone(),
            static_servers: self.static_servers.clone(),
            discovery_mdns: self.discovery_mdns,
            advertise_ip: self.advertise_ip,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn write_config(yaml: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }

    #[test]
    fn missing_path_uses_defaults() {
        let config = ServerConfig::from_file(None).unwrap();
        assert!(config.http_enabled);
        assert!(config.discovery_mdns);
        assert_eq!(config.bind_port, 3005);
    }

    #[test]
    fn yaml_values_override_defaults() {
        let file = write_config(
            r#"
bind_port: 4100
name: Living Room
discovery_mdns: false
server_url: http://10.0.0.2:32400
static_servers:
  - host: 10.0.0.2
  - host: 10.0.0.3
    port: 32401
"#,
        );
        let config = ServerConfig::from_file(Some(file.path())).unwrap();
        assert_eq!(config.bind_port, 4100);
        assert_eq!(config.name.as_deref(), Some("Living Room"));
        assert!(!config.discovery_mdns);
        assert_eq!(config.static_servers.len(), 2);
        assert_eq!(config.static_servers[0].port, 32400);
        assert_eq!(config.static_servers[1].port, 32401);
        assert_eq!(config.task_queue_capacity, 100);
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let file = write_config("bind_port: [not a port");
        let err = ServerConfig::from_file(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn unreadable_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.yaml");
        let err = ServerConfig::from_file(Some(&missing)).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn env_overrides_apply_and_ignore_garbage() {
        let env: HashMap<&str, &str> = [
            ("COMPANION_BIND_PORT", "not-a-port"),
            ("COMPANION_ADVERTISE_IP", "192.168.1.20"),
            ("COMPANION_SERVER_TOKEN", "secret"),
        ]
        .into_iter()
        .collect();

        let mut config = ServerConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.bind_port, 3005);
        assert_eq!(config.advertise_ip, Some("192.168.1.20".parse().unwrap()));
        assert_eq!(config.server_token.as_deref(), Some("secret"));
    }

    #[test]
    fn core_config_carries_identity() {
        let config = ServerConfig {
            name: Some("Kitchen".into()),
            machine_identifier: Some("kitchen-1".into()),
            http_enabled: false,
            ..Default::default()
        };
        let core = config.to_core_config();
        assert_eq!(core.client.name, "Kitchen");
        assert_eq!(core.client.machine_identifier, "kitchen-1");
        assert!(!core.enabled);
        assert!(core.validate().is_ok());
    }
}
