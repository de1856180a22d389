//! mDNS backend built on `mdns-sd`.
//!
//! Each connection runs its own [`ServiceDaemon`]. The daemon's monitor
//! channel is forwarded to the publisher by a background task: an
//! `Announce` for a registered full name establishes the group that owns it,
//! and the end of the monitor stream reports the connection as
//! disconnected.
//!
//! `mdns-sd` does not probe for conflicts, so only clashes between groups of
//! this process are reported as collisions.

use crate::client::{
    ClientState, DirectoryClient, DirectoryConnector, EventSink, GroupId, GroupState,
    ServiceAnnouncement,
};
use crate::error::{PublishError, Result};
use mdns_sd::{DaemonEvent, ServiceDaemon, ServiceInfo};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use zcpublish_core::config::PublishConfig;

/// Domain appended to every service type and host name
const LOCAL_DOMAIN: &str = "local.";

/// Full names registered on the daemon and the group owning each
type Registrations = Arc<Mutex<HashMap<String, GroupId>>>;

/// Connector creating one mDNS daemon per connection.
#[derive(Debug, Clone)]
pub struct MdnsConnector {
    host_name: String,
}

impl MdnsConnector {
    /// Announces records for `host_name`; `.local.` is appended.
    pub fn new(host_name: impl Into<String>) -> Self {
        Self {
            host_name: host_name.into(),
        }
    }

    /// Uses the configured host name, or the system one, up to its first dot.
    pub fn from_config(config: &PublishConfig) -> Self {
        let host_name = config
            .host_name
            .clone()
            .unwrap_or_else(crate::txt::detect_host_name);
        let label = host_name.split('.').next().unwrap_or_default();
        Self::new(label)
    }
}

impl DirectoryConnector for MdnsConnector {
    fn connect(&self, events: EventSink) -> Result<Box<dyn DirectoryClient>> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PublishError::ConnectFailed(format!("No async runtime: {}", e)))?;

        let daemon = ServiceDaemon::new().map_err(|e| {
            PublishError::ConnectFailed(format!("Failed to create mDNS daemon: {}", e))
        })?;

        let monitor = daemon.monitor().map_err(|e| {
            PublishError::ConnectFailed(format!("Failed to monitor mDNS daemon: {}", e))
        })?;

        let state = Arc::new(Mutex::new(ClientState::Running));
        let registrations: Registrations = Arc::new(Mutex::new(HashMap::new()));

        let forwarder = {
            let events = events.clone();
            let state = state.clone();
            let registrations = registrations.clone();
            runtime.spawn(async move {
                while let Ok(event) = monitor.recv_async().await {
                    forward_daemon_event(event, &events, &registrations);
                }

                *state.lock() = ClientState::Disconnected;
                debug!("mDNS monitor channel closed");
                events.client_state(ClientState::Disconnected);
            })
        };

        info!(
            host = %self.host_name,
            generation = events.generation(),
            "mDNS daemon started"
        );
        events.client_state(ClientState::Running);

        Ok(Box::new(MdnsClient {
            daemon,
            host: format!("{}.{}", self.host_name, LOCAL_DOMAIN),
            events,
            state,
            registrations,
            groups: HashMap::new(),
            forwarder: Some(forwarder),
        }))
    }

    fn name(&self) -> &'static str {
        "mdns"
    }
}

/// Relays one daemon notification to the publisher.
fn forward_daemon_event(event: DaemonEvent, events: &EventSink, registrations: &Registrations) {
    match event {
        DaemonEvent::Announce(fullname, addresses) => {
            let group = registrations.lock().get(&fullname).copied();
            match group {
                Some(group) => {
                    debug!(service = %fullname, %addresses, "Service announced");
                    events.group_state(group, GroupState::Established);
                }
                None => debug!(service = %fullname, "Announcement for unknown service"),
            }
        }
        DaemonEvent::Error(e) => {
            warn!(error = %e, "mDNS daemon error");
        }
        other => {
            debug!(event = ?other, "mDNS daemon event");
        }
    }
}

/// One running mDNS daemon.
pub struct MdnsClient {
    daemon: ServiceDaemon,
    host: String,
    events: EventSink,
    state: Arc<Mutex<ClientState>>,
    registrations: Registrations,
    /// Groups and the full name each one currently registers
    groups: HashMap<GroupId, Option<String>>,
    forwarder: Option<JoinHandle<()>>,
}

impl MdnsClient {
    fn unregister(&mut self, group: GroupId) {
        let Some(Some(fullname)) = self.groups.get_mut(&group).map(Option::take) else {
            return;
        };

        self.registrations.lock().remove(&fullname);
        match self.daemon.unregister(&fullname) {
            Ok(_) => debug!(service = %fullname, "Unregistered service"),
            Err(e) => warn!(service = %fullname, error = %e, "Failed to unregister service"),
        }
    }
}

impl DirectoryClient for MdnsClient {
    fn state(&self) -> ClientState {
        *self.state.lock()
    }

    fn add_group(&mut self, group: GroupId) -> Result<()> {
        self.groups.insert(group, None);
        Ok(())
    }

    fn commit(&mut self, group: GroupId, service: &ServiceAnnouncement) -> Result<()> {
        if !self.groups.contains_key(&group) {
            return Err(PublishError::UnknownGroup(group.as_u64()));
        }
        self.unregister(group);

        let ty_domain = format!("{}.{}", service.service_type, LOCAL_DOMAIN);
        let fullname = format!("{}.{}", service.name, ty_domain);

        let taken = self
            .registrations
            .lock()
            .get(&fullname)
            .is_some_and(|owner| *owner != group);
        if taken {
            debug!(service = %fullname, "Name already registered by another group");
            self.events.group_state(group, GroupState::Collision);
            return Ok(());
        }

        let properties: HashMap<String, String> = service
            .txt
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let info = ServiceInfo::new(
            &ty_domain,
            &service.name,
            &self.host,
            "",
            service.port,
            properties,
        )
        .map_err(|e| PublishError::commit_failed(service.name.clone(), e.to_string()))?
        .enable_addr_auto();

        self.registrations.lock().insert(fullname.clone(), group);
        if let Err(e) = self.daemon.register(info) {
            self.registrations.lock().remove(&fullname);
            return Err(PublishError::commit_failed(service.name.clone(), e.to_string()));
        }

        self.groups.insert(group, Some(fullname));
        self.events.group_state(group, GroupState::Registering);
        Ok(())
    }

    fn reset(&mut self, group: GroupId) -> Result<()> {
        if !self.groups.contains_key(&group) {
            return Err(PublishError::UnknownGroup(group.as_u64()));
        }
        self.unregister(group);
        Ok(())
    }

    fn free(&mut self, group: GroupId) {
        self.unregister(group);
        self.groups.remove(&group);
    }

    fn shutdown(&mut self) {
        let groups: Vec<GroupId> = self.groups.keys().copied().collect();
        for group in groups {
            self.free(group);
        }

        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }

        if let Err(e) = self.daemon.shutdown() {
            error!(error = %e, "Failed to shut down mDNS daemon");
        }
        *self.state.lock() = ClientState::Disconnected;
        debug!(generation = self.events.generation(), "mDNS daemon stopped");
    }
}
