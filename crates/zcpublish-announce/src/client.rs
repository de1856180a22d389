//! Directory client adapter.
//!
//! The directory service (an mDNS responder, or the in-memory simulator in
//! tests) is reached through a [`DirectoryClient`] created by a
//! [`DirectoryConnector`]. Nothing a client does returns its outcome
//! directly: state changes of the connection and of individual entry groups
//! are pushed as [`DirectoryEvent`]s into a single channel consumed by the
//! publisher.
//!
//! [`ClientAdapter`] owns the one live connection, allocates group handles
//! and recreates the connection on demand.

use crate::error::{PublishError, Result};
use crate::txt::TxtRecord;
use async_channel::Sender;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error, info, warn};

/// Connection state reported by the directory client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientState {
    /// Connection is being set up, host name not yet registered
    Connecting,
    /// Connected and able to accept commits
    Running,
    /// The host name itself collided with another host
    Collision,
    /// Link to the directory service was lost
    Disconnected,
    /// Any other failure, including "no client at all"
    Failure,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientState::Connecting => write!(f, "Connecting"),
            ClientState::Running => write!(f, "Running"),
            ClientState::Collision => write!(f, "Collision"),
            ClientState::Disconnected => write!(f, "Disconnected"),
            ClientState::Failure => write!(f, "Failure"),
        }
    }
}

/// State of a single entry group as reported by the directory service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupState {
    Uncommitted,
    Registering,
    Established,
    Collision,
    Failure,
}

impl fmt::Display for GroupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupState::Uncommitted => write!(f, "Uncommitted"),
            GroupState::Registering => write!(f, "Registering"),
            GroupState::Established => write!(f, "Established"),
            GroupState::Collision => write!(f, "Collision"),
            GroupState::Failure => write!(f, "Failure"),
        }
    }
}

/// Opaque handle of an entry group.
///
/// Handles are allocated by the adapter from a counter that survives
/// reconnections, so a handle is never handed out twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(u64);

impl GroupId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group-{}", self.0)
    }
}

/// Notification pushed by a directory client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryEvent {
    /// The connection changed state
    Client {
        generation: u64,
        state: ClientState,
    },
    /// An entry group changed state
    Group {
        generation: u64,
        group: GroupId,
        state: GroupState,
    },
}

impl DirectoryEvent {
    /// Connection generation the event was emitted by.
    pub fn generation(&self) -> u64 {
        match self {
            DirectoryEvent::Client { generation, .. } => *generation,
            DirectoryEvent::Group { generation, .. } => *generation,
        }
    }
}

/// Write side of the notification channel handed to a client.
///
/// Every event is stamped with the generation of the connection it belongs
/// to, so events still queued from a replaced connection can be discarded.
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: Sender<DirectoryEvent>,
}

impl EventSink {
    pub fn new(generation: u64, tx: Sender<DirectoryEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Reports a connection state change. Returns false once the consumer is gone.
    pub fn client_state(&self, state: ClientState) -> bool {
        self.send(DirectoryEvent::Client {
            generation: self.generation,
            state,
        })
    }

    /// Reports an entry group state change. Returns false once the consumer is gone.
    pub fn group_state(&self, group: GroupId, state: GroupState) -> bool {
        self.send(DirectoryEvent::Group {
            generation: self.generation,
            group,
            state,
        })
    }

    fn send(&self, event: DirectoryEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "Dropping directory event, consumer is gone");
                false
            }
        }
    }
}

/// Everything needed to publish one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAnnouncement {
    /// Instance name, at most one DNS label
    pub name: String,
    /// Service type such as `_pulse-sink._tcp`
    pub service_type: &'static str,
    pub port: u16,
    pub txt: TxtRecord,
}

/// One connection to a directory service.
///
/// Operations are fire and forget: an `Ok` only means the request was
/// accepted, the outcome arrives later through the [`EventSink`] the client
/// was created with.
pub trait DirectoryClient {
    /// Current connection state.
    fn state(&self) -> ClientState;

    /// Creates an empty entry group under `group`.
    fn add_group(&mut self, group: GroupId) -> Result<()>;

    /// Adds `service` to the group and commits it.
    fn commit(&mut self, group: GroupId, service: &ServiceAnnouncement) -> Result<()>;

    /// Withdraws whatever the group announced, keeping the group.
    fn reset(&mut self, group: GroupId) -> Result<()>;

    /// Withdraws and forgets the group. Unknown groups are ignored.
    fn free(&mut self, group: GroupId);

    /// Closes the connection. Called before the client is dropped.
    fn shutdown(&mut self) {}
}

/// Factory for directory clients.
pub trait DirectoryConnector {
    /// Opens a fresh connection reporting through `events`.
    fn connect(&self, events: EventSink) -> Result<Box<dyn DirectoryClient>>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// Owner of the live directory connection.
pub struct ClientAdapter {
    connector: Box<dyn DirectoryConnector>,
    client: Option<Box<dyn DirectoryClient>>,
    events: Sender<DirectoryEvent>,
    generation: u64,
    next_group: u64,
}

impl ClientAdapter {
    /// Opens the initial connection.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::ConnectFailed`] when the connector fails.
    pub fn connect(
        connector: Box<dyn DirectoryConnector>,
        events: Sender<DirectoryEvent>,
    ) -> Result<Self> {
        let client = connector.connect(EventSink::new(0, events.clone()))?;
        info!(backend = connector.name(), "Directory client created");

        Ok(Self {
            connector,
            client: Some(client),
            events,
            generation: 0,
            next_group: 1,
        })
    }

    /// Current connection state; `Failure` when there is no client.
    pub fn state(&self) -> ClientState {
        self.client
            .as_ref()
            .map(|c| c.state())
            .unwrap_or(ClientState::Failure)
    }

    pub fn is_running(&self) -> bool {
        self.state() == ClientState::Running
    }

    /// Generation of the live connection.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Replaces the connection with a fresh one.
    ///
    /// A failure to reconnect is logged and leaves the adapter without a
    /// client, reporting `Failure` until a later restart succeeds.
    pub fn restart(&mut self) {
        self.close();
        self.generation += 1;

        match self
            .connector
            .connect(EventSink::new(self.generation, self.events.clone()))
        {
            Ok(client) => {
                info!(
                    backend = self.connector.name(),
                    generation = self.generation,
                    "Directory client recreated"
                );
                self.client = Some(client);
            }
            Err(e) => {
                error!(
                    backend = self.connector.name(),
                    error = %e,
                    "Failed to recreate directory client, announcements stay withdrawn"
                );
            }
        }
    }

    /// Allocates a handle and creates the matching group on the client.
    pub fn create_group(&mut self) -> Result<GroupId> {
        let client = self.client.as_mut().ok_or(PublishError::ClientUnavailable)?;
        let group = GroupId(self.next_group);
        self.next_group += 1;

        client.add_group(group)?;
        debug!(%group, "Created entry group");
        Ok(group)
    }

    pub fn commit(&mut self, group: GroupId, service: &ServiceAnnouncement) -> Result<()> {
        let client = self.client.as_mut().ok_or(PublishError::ClientUnavailable)?;
        client.commit(group, service)
    }

    pub fn reset_group(&mut self, group: GroupId) -> Result<()> {
        let client = self.client.as_mut().ok_or(PublishError::ClientUnavailable)?;
        client.reset(group)
    }

    /// Frees a group. A missing client means the group is already gone.
    pub fn free_group(&mut self, group: GroupId) {
        if let Some(client) = self.client.as_mut() {
            client.free(group);
        }
    }

    /// Closes and drops the live client, if any.
    pub fn close(&mut self) {
        if let Some(mut client) = self.client.take() {
            debug!(generation = self.generation, "Closing directory client");
            client.shutdown();
        }
    }
}

impl Drop for ClientAdapter {
    fn drop(&mut self) {
        if self.client.is_some() {
            warn!("Directory client adapter dropped with a live connection");
            self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_sink_stamps_generation() {
        let (tx, rx) = async_channel::unbounded();
        let sink = EventSink::new(3, tx);

        assert!(sink.client_state(ClientState::Running));
        assert!(sink.group_state(GroupId(9), GroupState::Established));

        assert_eq!(
            rx.try_recv().unwrap(),
            DirectoryEvent::Client {
                generation: 3,
                state: ClientState::Running
            }
        );
        let event = rx.try_recv().unwrap();
        assert_eq!(event.generation(), 3);
        assert!(matches!(
            event,
            DirectoryEvent::Group {
                state: GroupState::Established,
                ..
            }
        ));
    }

    #[test]
    fn test_event_sink_reports_closed_channel() {
        let (tx, rx) = async_channel::unbounded();
        drop(rx);
        let sink = EventSink::new(0, tx);
        assert!(!sink.client_state(ClientState::Running));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ClientState::Disconnected.to_string(), "Disconnected");
        assert_eq!(GroupState::Registering.to_string(), "Registering");
        assert_eq!(GroupId(4).to_string(), "group-4");
    }
}
