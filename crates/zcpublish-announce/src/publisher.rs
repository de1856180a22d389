//! Lifecycle handlers and event loop.
//!
//! [`Publisher`] ties the pieces together: it owns the directory connection,
//! the service registry and the server identity, reacts to endpoint lifecycle
//! hooks and to the notifications the directory backend pushes through the
//! event channel.

use crate::client::{ClientAdapter, ClientState, DirectoryConnector, DirectoryEvent, GroupId, GroupState};
use crate::error::Result;
use crate::inventory::{EndpointEvent, EndpointInventory};
use crate::record::RecordStatus;
use crate::registry::{PublishContext, ServiceRegistry};
use crate::txt::ServerInfo;
use async_channel::Receiver;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use zcpublish_core::config::PublishConfig;
use zcpublish_core::types::{Endpoint, EndpointId};

/// Announces the server and its endpoints on the directory service.
pub struct Publisher {
    adapter: ClientAdapter,
    registry: ServiceRegistry,
    server: ServerInfo,
    inventory: Arc<dyn EndpointInventory>,
    port: u16,
    events: Receiver<DirectoryEvent>,
    released: bool,
}

impl Publisher {
    /// Validates `config`, connects to the directory service and publishes
    /// every endpoint `inventory` currently holds.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Config`](crate::PublishError::Config) for an
    /// invalid configuration and
    /// [`PublishError::ConnectFailed`](crate::PublishError::ConnectFailed)
    /// when no directory client could be created.
    pub fn initialize(
        config: &PublishConfig,
        connector: Box<dyn DirectoryConnector>,
        inventory: Arc<dyn EndpointInventory>,
    ) -> Result<Self> {
        config.validate()?;
        let port = config.port()?;
        let server = ServerInfo::detect(config);

        let (tx, events) = async_channel::unbounded();
        let adapter = ClientAdapter::connect(connector, tx).map_err(|e| {
            error!(error = %e, "Failed to create directory client");
            e
        })?;

        let registry = ServiceRegistry::new(&server);
        let mut publisher = Self {
            adapter,
            registry,
            server,
            inventory,
            port,
            events,
            released: false,
        };

        publisher.publish_all();

        info!(
            port,
            user = %publisher.server.user_name,
            host = %publisher.server.host_name,
            endpoints = publisher.registry.len(),
            "Publisher initialized"
        );

        Ok(publisher)
    }

    pub fn client_state(&self) -> ClientState {
        self.adapter.state()
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn server_info(&self) -> &ServerInfo {
        &self.server
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Status of every record, main record first.
    pub fn snapshot(&self) -> Vec<RecordStatus> {
        self.registry.snapshot()
    }

    /// A new endpoint appeared.
    pub fn on_endpoint_added(&mut self, endpoint: &Endpoint) {
        debug!(endpoint = %endpoint.reference(), name = %endpoint.name, "Endpoint added");
        let (registry, mut ctx) = self.split();
        registry.publish(endpoint, &mut ctx);
    }

    /// An endpoint's metadata changed; its record is recommitted under the
    /// name it currently holds.
    pub fn on_endpoint_description_changed(&mut self, endpoint: &Endpoint) {
        debug!(endpoint = %endpoint.reference(), label = endpoint.display_label(), "Endpoint changed");
        let (registry, mut ctx) = self.split();
        registry.publish(endpoint, &mut ctx);
    }

    pub fn on_endpoint_removed(&mut self, id: EndpointId) {
        debug!(endpoint = %id, "Endpoint removed");
        self.registry.remove(id, &mut self.adapter);
    }

    pub fn on_endpoint_event(&mut self, event: EndpointEvent) {
        match event {
            EndpointEvent::Added(endpoint) => self.on_endpoint_added(&endpoint),
            EndpointEvent::DescriptionChanged(endpoint) => {
                self.on_endpoint_description_changed(&endpoint)
            }
            EndpointEvent::Removed(id) => self.on_endpoint_removed(id),
        }
    }

    /// Reacts to a state change of the directory connection.
    pub fn on_client_state(&mut self, state: ClientState) {
        debug!(%state, "Directory client state changed");

        match state {
            ClientState::Running => self.publish_all(),
            ClientState::Collision => {
                warn!("Host name collision, withdrawing services");
                self.unpublish_all(false);
            }
            ClientState::Disconnected => {
                warn!("Directory service disconnected, reconnecting");
                self.unpublish_all(true);
                self.adapter.restart();
            }
            ClientState::Failure | ClientState::Connecting => {}
        }
    }

    fn on_group_state(&mut self, group: GroupId, state: GroupState) {
        let (registry, mut ctx) = self.split();
        registry.handle_group_event(group, state, &mut ctx);
    }

    /// Dispatches one directory notification.
    ///
    /// Notifications emitted by a connection that has since been replaced
    /// are dropped.
    pub fn handle_event(&mut self, event: DirectoryEvent) {
        if event.generation() != self.adapter.generation() {
            debug!(
                generation = event.generation(),
                current = self.adapter.generation(),
                "Dropping notification from a replaced connection"
            );
            return;
        }

        match event {
            DirectoryEvent::Client { state, .. } => self.on_client_state(state),
            DirectoryEvent::Group { group, state, .. } => self.on_group_state(group, state),
        }
    }

    /// Handles every notification already queued, including those queued
    /// while handling. Returns how many were handled.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Publishes every tracked or inventoried endpoint and the main record.
    pub fn publish_all(&mut self) {
        let (registry, mut ctx) = self.split();
        registry.publish_all(&mut ctx);
    }

    /// Withdraws (`hard`) or resets every announcement.
    pub fn unpublish_all(&mut self, hard: bool) {
        self.registry.unpublish_all(&mut self.adapter, hard);
    }

    /// Drives the publisher until `shutdown` is cancelled.
    ///
    /// Endpoint lifecycle events are read from `endpoint_events`; once that
    /// channel closes only directory notifications are handled.
    pub async fn run(
        &mut self,
        mut endpoint_events: mpsc::UnboundedReceiver<EndpointEvent>,
        shutdown: CancellationToken,
    ) {
        let events = self.events.clone();
        let mut endpoints_open = true;

        info!("Publisher running");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }
                event = events.recv() => match event {
                    Ok(event) => self.handle_event(event),
                    Err(e) => {
                        warn!(error = %e, "Directory event channel closed");
                        break;
                    }
                },
                event = endpoint_events.recv(), if endpoints_open => match event {
                    Some(event) => self.on_endpoint_event(event),
                    None => {
                        debug!("Endpoint event channel closed");
                        endpoints_open = false;
                    }
                },
            }
        }
    }

    /// Withdraws every announcement and closes the connection.
    pub fn teardown(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        self.registry.clear(&mut self.adapter);
        self.adapter.close();
        info!("Publisher shut down");
    }

    fn split(&mut self) -> (&mut ServiceRegistry, PublishContext<'_>) {
        (
            &mut self.registry,
            PublishContext {
                client: &mut self.adapter,
                server: &self.server,
                inventory: self.inventory.as_ref(),
                port: self.port,
            },
        )
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PublishError;
    use crate::inventory::EndpointTable;
    use crate::simulator::Simulator;
    use zcpublish_core::types::EndpointKind;

    fn config() -> PublishConfig {
        PublishConfig {
            user_name: Some("alice".to_string()),
            host_name: Some("host".to_string()),
            ..PublishConfig::default()
        }
    }

    #[test]
    fn test_initialize_rejects_bad_port() {
        let sim = Simulator::new();
        let result = Publisher::initialize(
            &PublishConfig::with_port(70000),
            sim.connector(),
            Arc::new(EndpointTable::new()),
        );
        assert!(matches!(result, Err(PublishError::Config(_))));
        assert_eq!(sim.connects(), 0);
    }

    #[test]
    fn test_initialize_fails_without_client() {
        let sim = Simulator::new();
        sim.fail_next_connects(1);
        let result =
            Publisher::initialize(&config(), sim.connector(), Arc::new(EndpointTable::new()));
        assert!(matches!(result, Err(PublishError::ConnectFailed(_))));
    }

    #[test]
    fn test_stale_generation_is_dropped() {
        let sim = Simulator::new();
        let table = Arc::new(EndpointTable::from_endpoints(vec![Endpoint::builder(
            1,
            EndpointKind::Sink,
            "sink1",
        )
        .build()]));
        let mut publisher = Publisher::initialize(&config(), sim.connector(), table).unwrap();
        publisher.dispatch_pending();

        let commits = sim.commit_count();
        publisher.handle_event(DirectoryEvent::Client {
            generation: 5,
            state: ClientState::Disconnected,
        });
        assert_eq!(publisher.client_state(), ClientState::Running);
        assert_eq!(sim.commit_count(), commits);
        assert_eq!(sim.connects(), 1);
    }

    #[test]
    fn test_teardown_releases_everything() {
        let sim = Simulator::new();
        let table = Arc::new(EndpointTable::from_endpoints(vec![Endpoint::builder(
            1,
            EndpointKind::Sink,
            "sink1",
        )
        .build()]));
        let mut publisher = Publisher::initialize(&config(), sim.connector(), table).unwrap();
        publisher.dispatch_pending();
        assert_eq!(sim.live_services().len(), 2);

        publisher.teardown();
        assert!(sim.live_services().is_empty());
        assert_eq!(sim.group_count(), 0);
    }
}
