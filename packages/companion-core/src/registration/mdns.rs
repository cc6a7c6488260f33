//! mDNS/DNS-SD registration.
//!
//! Advertises this player as `_plexclient._tcp.local.` and browses for media
//! servers under `_plexmediasvr._tcp.local.`. Discovered servers are kept in a
//! cache that the companion loop reads every iteration.
//!
//! This is best-effort: a missing mDNS responder is logged and the static
//! server list keeps working.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use mdns_sd::{DaemonStatus, ResolvedService, ScopedIp, ServiceDaemon, ServiceEvent, ServiceInfo};
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use super::{dedup_servers, Registration, RegistrationError, ServerAddress};
use crate::protocol_constants::{
    CLIENT_SERVICE_TYPE, DEFAULT_SERVER_PORT, PROTOCOL_CAPABILITIES, PROTOCOL_VERSION,
    SERVER_SERVICE_TYPE,
};
use crate::state::{ClientInfo, CompanionConfig};

struct ActiveRegistration {
    daemon: ServiceDaemon,
    service_fullname: String,
    browse_cancel: CancellationToken,
}

/// Registration backed by the `mdns-sd` daemon.
pub struct MdnsRegistration {
    port: u16,
    advertise_ip: Option<IpAddr>,
    check_timeout: Duration,
    static_servers: Vec<ServerAddress>,
    client: RwLock<Option<ClientInfo>>,
    /// Discovered servers keyed by service fullname.
    discovered: Arc<DashMap<String, ServerAddress>>,
    active: Mutex<Option<ActiveRegistration>>,
}

impl MdnsRegistration {
    pub fn new(config: &CompanionConfig) -> Self {
        Self {
            port: config.port,
            advertise_ip: config.advertise_ip,
            check_timeout: config.timing.registration_check_timeout(),
            static_servers: config.static_servers.clone(),
            client: RwLock::new(None),
            discovered: Arc::new(DashMap::new()),
            active: Mutex::new(None),
        }
    }

    fn advertise_ip(&self) -> Result<IpAddr, RegistrationError> {
        match self.advertise_ip {
            Some(ip) => Ok(ip),
            None => local_ip_address::local_ip()
                .map_err(|e| RegistrationError::NoAddress(e.to_string())),
        }
    }

    /// Unregisters and stops browsing. Subsequent calls are no-ops.
    fn shutdown(&self) {
        let Some(active) = self.active.lock().take() else {
            return;
        };
        active.browse_cancel.cancel();
        if let Err(e) = active.daemon.stop_browse(SERVER_SERVICE_TYPE) {
            log::debug!("[mDNS] Failed to stop browse: {:?}", e);
        }
        if let Err(e) = active.daemon.unregister(&active.service_fullname) {
            log::warn!("[mDNS] Failed to unregister service: {}", e);
        }
        if let Err(e) = active.daemon.shutdown() {
            log::debug!("[mDNS] Daemon shutdown failed: {:?}", e);
        }
        self.discovered.clear();
        log::info!("[mDNS] Stopped advertising '{}'", active.service_fullname);
    }
}

#[async_trait]
impl Registration for MdnsRegistration {
    fn configure(&self, client: ClientInfo) {
        *self.client.write() = Some(client);
    }

    async fn start_all(&self) -> Result<(), RegistrationError> {
        let mut active = self.active.lock();
        if active.is_some() {
            return Ok(());
        }

        let client = self.client.read().clone().unwrap_or_default();
        let ip = self.advertise_ip()?;
        let daemon = ServiceDaemon::new().map_err(|e| RegistrationError::Mdns(e.to_string()))?;

        let service = build_client_service(&client, ip, self.port)?;
        let fullname = service.get_fullname().to_string();
        daemon
            .register(service)
            .map_err(|e| RegistrationError::Mdns(e.to_string()))?;
        log::info!("[mDNS] Advertising '{}' at {}:{}", client.name, ip, self.port);

        let browse_cancel = CancellationToken::new();
        match daemon.browse(SERVER_SERVICE_TYPE) {
            Ok(receiver) => {
                let cancel = browse_cancel.clone();
                let discovered = Arc::clone(&self.discovered);
                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            event = receiver.recv_async() => match event {
                                Ok(event) => handle_browse_event(&discovered, event),
                                Err(e) => {
                                    log::debug!("[mDNS] Browse channel closed: {:?}", e);
                                    break;
                                }
                            },
                        }
                    }
                });
            }
            Err(e) => log::warn!("[mDNS] Server browse unavailable: {}", e),
        }

        *active = Some(ActiveRegistration {
            daemon,
            service_fullname: fullname,
            browse_cancel,
        });
        Ok(())
    }

    async fn stop_all(&self) {
        self.shutdown();
    }

    async fn check_client_registration(&self) -> bool {
        let daemon = match self.active.lock().as_ref() {
            Some(active) => active.daemon.clone(),
            None => return false,
        };
        let receiver = match daemon.status() {
            Ok(receiver) => receiver,
            Err(e) => {
                log::debug!("[mDNS] Status query failed: {:?}", e);
                return false;
            }
        };
        matches!(
            tokio::time::timeout(self.check_timeout, receiver.recv_async()).await,
            Ok(Ok(DaemonStatus::Running))
        )
    }

    fn server_list(&self) -> Vec<ServerAddress> {
        let discovered = self
            .discovered
            .iter()
            .map(|entry| entry.value().clone())
            .collect::<Vec<_>>();
        dedup_servers(self.static_servers.iter().cloned().chain(discovered))
    }
}

impl Drop for MdnsRegistration {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn build_client_service(
    client: &ClientInfo,
    ip: IpAddr,
    port: u16,
) -> Result<ServiceInfo, RegistrationError> {
    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let dns_hostname = sanitize_dns_label(&hostname);

    let mut txt = HashMap::new();
    txt.insert("Name".to_string(), client.name.clone());
    txt.insert("Resource-Identifier".to_string(), client.machine_identifier.clone());
    txt.insert("Product".to_string(), client.product.clone());
    txt.insert("Version".to_string(), client.version.clone());
    txt.insert("Device-Class".to_string(), client.device_class.clone());
    txt.insert(
        "Protocol-Capabilities".to_string(),
        PROTOCOL_CAPABILITIES.to_string(),
    );
    txt.insert("Protocol-Version".to_string(), PROTOCOL_VERSION.to_string());
    txt.insert("Content-Type".to_string(), "plex/media-player".to_string());

    ServiceInfo::new(
        CLIENT_SERVICE_TYPE,
        &client.name,
        &format!("{}.local.", dns_hostname),
        ip,
        port,
        Some(txt),
    )
    .map_err(|e| RegistrationError::Mdns(e.to_string()))
}

/// Lowercases and strips a hostname down to a valid DNS label.
fn sanitize_dns_label(hostname: &str) -> String {
    let label = hostname
        .to_lowercase()
        .replace(' ', "-")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect::<String>();
    if label.is_empty() {
        "companion".to_string()
    } else {
        label
    }
}

fn handle_browse_event(discovered: &DashMap<String, ServerAddress>, event: ServiceEvent) {
    match event {
        ServiceEvent::ServiceResolved(info) => {
            if let Some(server) = parse_server_service(&info) {
                log::info!("[mDNS] Discovered media server {}", server);
                discovered.insert(info.fullname.clone(), server);
            }
        }
        ServiceEvent::ServiceRemoved(_, fullname) => {
            if let Some((_, server)) = discovered.remove(&fullname) {
                log::info!("[mDNS] Media server {} went away", server);
            }
        }
        _ => {}
    }
}

/// Builds a server address from a resolved service, preferring IPv4.
fn parse_server_service(info: &ResolvedService) -> Option<ServerAddress> {
    let host = info
        .addresses
        .iter()
        .find_map(|addr| match addr {
            ScopedIp::V4(v4) => Some(v4.addr().to_string()),
            _ => None,
        })
        .or_else(|| {
            info.addresses
                .iter()
                .next()
                .map(|addr| addr.to_ip_addr().to_string())
        })?;

    let port = if info.port > 0 {
        info.port
    } else {
        DEFAULT_SERVER_PORT
    };

    Some(ServerAddress {
        host,
        port,
        name: instance_name(&info.fullname, SERVER_SERVICE_TYPE),
    })
}

/// Extracts the instance label from `<instance>.<service type>`.
fn instance_name(fullname: &str, service_type: &str) -> Option<String> {
    fullname
        .strip_suffix(service_type)
        .map(|name| name.trim_end_matches('.'))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_name_strips_service_type() {
        assert_eq!(
            instance_name("Living Room NAS._plexmediasvr._tcp.local.", SERVER_SERVICE_TYPE),
            Some("Living Room NAS".to_string())
        );
        assert_eq!(instance_name("_plexmediasvr._tcp.local.", SERVER_SERVICE_TYPE), None);
        assert_eq!(instance_name("other._http._tcp.local.", SERVER_SERVICE_TYPE), None);
    }

    #[test]
    fn dns_label_is_sanitized() {
        assert_eq!(sanitize_dns_label("My Mac Book.lan"), "my-mac-booklan");
        assert_eq!(sanitize_dns_label("???"), "companion");
    }

    #[test]
    fn client_service_carries_identity() {
        let client = ClientInfo {
            name: "Den Player".into(),
            machine_identifier: "abc-123".into(),
            ..Default::default()
        };
        let service =
            build_client_service(&client, "192.168.1.20".parse().unwrap(), 3005).unwrap();

        assert_eq!(service.get_fullname(), "Den Player._plexclient._tcp.local.");
        assert_eq!(service.get_port(), 3005);
        assert_eq!(service.get_property_val_str("Resource-Identifier"), Some("abc-123"));
    }

    #[tokio::test]
    async fn unstarted_registration_is_not_registered() {
        let config = CompanionConfig {
            static_servers: vec![ServerAddress::new("10.0.0.2", 32400)],
            ..Default::default()
        };
        let registration = MdnsRegistration::new(&config);
        assert!(!registration.check_client_registration().await);
        assert_eq!(registration.server_list(), config.static_servers);
        registration.stop_all().await;
    }

    #[test]
    fn browse_events_update_cache() {
        let discovered = DashMap::new();
        discovered.insert(
            "NAS._plexmediasvr._tcp.local.".to_string(),
            ServerAddress::new("10.0.0.9", 32400),
        );
        handle_browse_event(
            &discovered,
            ServiceEvent::ServiceRemoved(
                SERVER_SERVICE_TYPE.to_string(),
                "NAS._plexmediasvr._tcp.local.".to_string(),
            ),
        );
        assert!(discovered.is_empty());
    }
}
