//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use zcpublish_announce::{EndpointTable, Publisher, Simulator};
use zcpublish_core::config::PublishConfig;
use zcpublish_core::types::{Endpoint, EndpointId, EndpointKind};

pub const SERVER_NAME: &str = "alice@host";
pub const BUILT_IN_AUDIO: &str = "alice@host: Built-in Audio";

/// Installs a test log writer once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("zcpublish_announce=debug")
        .with_test_writer()
        .try_init();
}

/// Publication settings with a fixed identity.
pub fn publish_config() -> PublishConfig {
    PublishConfig {
        user_name: Some("alice".to_string()),
        host_name: Some("host".to_string()),
        fqdn: Some("host.example.org".to_string()),
        ..PublishConfig::default()
    }
}

/// Sink 7, "Built-in Audio", 44.1 kHz stereo.
pub fn built_in_audio() -> Endpoint {
    Endpoint::builder(7, EndpointKind::Sink, "alsa_output.pci-0000_00_1f.3.analog-stereo")
        .description("Built-in Audio")
        .rate(44100)
        .channels(2)
        .build()
}

pub fn sink(id: u32, description: &str) -> Endpoint {
    Endpoint::builder(id, EndpointKind::Sink, format!("sink{}", id))
        .description(description)
        .build()
}

pub fn source(id: u32, description: &str) -> Endpoint {
    Endpoint::builder(id, EndpointKind::Source, format!("source{}", id))
        .description(description)
        .build()
}

/// Publisher wired to a simulator and an endpoint table.
pub struct Harness {
    pub sim: Simulator,
    pub table: Arc<EndpointTable>,
    pub publisher: Publisher,
}

impl Harness {
    /// Automatic simulator, already settled.
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self::with_simulator(Simulator::new(), endpoints)
    }

    /// Simulator that only reports injected outcomes.
    pub fn manual(endpoints: Vec<Endpoint>) -> Self {
        Self::with_simulator(Simulator::manual(), endpoints)
    }

    pub fn with_simulator(sim: Simulator, endpoints: Vec<Endpoint>) -> Self {
        init_tracing();
        let table = Arc::new(EndpointTable::from_endpoints(endpoints));
        let publisher = Publisher::initialize(&publish_config(), sim.connector(), table.clone())
            .expect("publisher should initialize");

        let mut harness = Self {
            sim,
            table,
            publisher,
        };
        harness.settle();
        harness
    }

    /// Handles every queued notification.
    pub fn settle(&mut self) -> usize {
        self.publisher.dispatch_pending()
    }

    pub fn add(&mut self, endpoint: Endpoint) {
        if let Some(event) = self.table.upsert(endpoint) {
            self.publisher.on_endpoint_event(event);
        }
        self.settle();
    }

    pub fn remove(&mut self, id: u32) {
        if let Some(event) = self.table.remove(EndpointId(id)) {
            self.publisher.on_endpoint_event(event);
        }
        self.settle();
    }

    /// Current name of the record for `id`.
    pub fn name_of(&self, id: u32) -> Option<String> {
        self.publisher
            .registry()
            .get(EndpointId(id))
            .map(|r| r.name().to_string())
    }
}
