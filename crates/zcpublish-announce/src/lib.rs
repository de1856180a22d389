//! Zeroconf announcement of a sound server and its sinks and sources.
//!
//! This crate keeps one DNS-SD service record per audio endpoint plus one
//! record for the server itself, and keeps them consistent with:
//! - the endpoint lifecycle (added, description changed, removed)
//! - the state of the directory client (running, host name collision,
//!   disconnected, failed)
//! - per-record name collisions reported asynchronously after a commit
//!
//! # Architecture
//!
//! Directory backends implement [`DirectoryConnector`] and
//! [`DirectoryClient`]. They never call back into the publisher; every
//! outcome is pushed as a [`DirectoryEvent`] into one channel that
//! [`Publisher`] drains on a single task, either through
//! [`Publisher::run`] or step by step with [`Publisher::dispatch_pending`].
//!
//! Two backends are provided: [`MdnsConnector`] (multicast DNS via the
//! `mdns-sd` crate) and [`Simulator`], a scriptable in-memory directory
//! used by the tests.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use zcpublish_announce::{EndpointTable, Publisher, Simulator};
//! use zcpublish_core::config::PublishConfig;
//! use zcpublish_core::types::{Endpoint, EndpointKind};
//!
//! let sim = Simulator::new();
//! let table = Arc::new(EndpointTable::new());
//! let config = PublishConfig {
//!     user_name: Some("alice".into()),
//!     host_name: Some("host".into()),
//!     ..PublishConfig::default()
//! };
//!
//! let mut publisher = Publisher::initialize(&config, sim.connector(), table.clone()).unwrap();
//!
//! let sink = Endpoint::builder(7, EndpointKind::Sink, "alsa_output.pci")
//!     .description("Built-in Audio")
//!     .build();
//! if let Some(event) = table.upsert(sink) {
//!     publisher.on_endpoint_event(event);
//! }
//! publisher.dispatch_pending();
//!
//! assert!(sim.live_services().contains(&"alice@host: Built-in Audio".to_string()));
//! publisher.teardown();
//! ```

pub mod client;
pub mod entry_group;
pub mod error;
pub mod inventory;
pub mod mdns;
pub mod naming;
pub mod publisher;
pub mod record;
pub mod registry;
pub mod simulator;
pub mod txt;

pub use client::{
    ClientAdapter, ClientState, DirectoryClient, DirectoryConnector, DirectoryEvent, EventSink,
    GroupId, GroupState, ServiceAnnouncement,
};
pub use entry_group::{EntryGroup, GroupHandle, PublicationState};
pub use error::{PublishError, Result};
pub use inventory::{EndpointEvent, EndpointInventory, EndpointTable};
pub use mdns::MdnsConnector;
pub use publisher::Publisher;
pub use record::{RecordStatus, ServiceRecord, Subject};
pub use registry::ServiceRegistry;
pub use simulator::{SimOp, Simulator};
pub use txt::{ServerInfo, TxtRecord};
