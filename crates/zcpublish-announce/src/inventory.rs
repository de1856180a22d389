//! Endpoint inventory: the view of sinks and sources the publisher reads.
//!
//! The publisher never owns endpoints. It keeps identities and looks the
//! current data up through [`EndpointInventory`] whenever it has to build an
//! announcement, so an endpoint that disappeared can never be announced from
//! a stale copy.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::{debug, info};
use zcpublish_core::types::{Endpoint, EndpointId};

/// Read access to the endpoints of the owning application.
pub trait EndpointInventory: Send + Sync {
    /// All currently active endpoints.
    fn endpoints(&self) -> Vec<Endpoint>;

    /// Looks up one endpoint.
    fn endpoint(&self, id: EndpointId) -> Option<Endpoint>;
}

/// Lifecycle notification for one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointEvent {
    /// A new endpoint appeared
    Added(Endpoint),
    /// An endpoint's description or metadata changed
    DescriptionChanged(Endpoint),
    /// An endpoint went away
    Removed(EndpointId),
}

impl EndpointEvent {
    pub fn endpoint_id(&self) -> EndpointId {
        match self {
            EndpointEvent::Added(e) | EndpointEvent::DescriptionChanged(e) => e.id,
            EndpointEvent::Removed(id) => *id,
        }
    }
}

/// In-memory endpoint registry.
///
/// Mutations return the lifecycle event the owner should dispatch to the
/// publisher, mirroring how a device registry fires its hooks after
/// updating itself.
#[derive(Debug, Default)]
pub struct EndpointTable {
    endpoints: RwLock<BTreeMap<EndpointId, Endpoint>>,
}

impl EndpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_endpoints(endpoints: impl IntoIterator<Item = Endpoint>) -> Self {
        let table = Self::new();
        {
            let mut map = table.endpoints.write();
            for endpoint in endpoints {
                map.insert(endpoint.id, endpoint);
            }
        }
        table
    }

    pub fn len(&self) -> usize {
        self.endpoints.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.read().is_empty()
    }

    /// Inserts or updates an endpoint.
    ///
    /// Returns `Added` for a new id, `DescriptionChanged` when an existing
    /// endpoint differs and `None` when nothing changed.
    pub fn upsert(&self, endpoint: Endpoint) -> Option<EndpointEvent> {
        let mut map = self.endpoints.write();
        match map.get(&endpoint.id) {
            Some(existing) if *existing == endpoint => None,
            Some(_) => {
                map.insert(endpoint.id, endpoint.clone());
                Some(EndpointEvent::DescriptionChanged(endpoint))
            }
            None => {
                map.insert(endpoint.id, endpoint.clone());
                Some(EndpointEvent::Added(endpoint))
            }
        }
    }

    /// Removes an endpoint, returning the event when it existed.
    pub fn remove(&self, id: EndpointId) -> Option<EndpointEvent> {
        self.endpoints
            .write()
            .remove(&id)
            .map(|_| EndpointEvent::Removed(id))
    }

    /// Replaces the whole inventory and returns the events describing the
    /// difference: removals first, then changes, then additions.
    ///
    /// An endpoint whose kind changed under the same id is reported as
    /// removed and added again, since it is announced under another type.
    pub fn sync(&self, endpoints: Vec<Endpoint>) -> Vec<EndpointEvent> {
        let mut map = self.endpoints.write();
        let next: BTreeMap<EndpointId, Endpoint> =
            endpoints.into_iter().map(|e| (e.id, e)).collect();

        let mut removed = Vec::new();
        let mut changed = Vec::new();
        let mut added = Vec::new();

        for (id, current) in map.iter() {
            match next.get(id) {
                None => removed.push(EndpointEvent::Removed(*id)),
                Some(new) if new.kind != current.kind => {
                    removed.push(EndpointEvent::Removed(*id));
                    added.push(EndpointEvent::Added(new.clone()));
                }
                Some(new) if new != current => {
                    changed.push(EndpointEvent::DescriptionChanged(new.clone()));
                }
                Some(_) => {}
            }
        }

        for (id, new) in next.iter() {
            if !map.contains_key(id) {
                added.push(EndpointEvent::Added(new.clone()));
            }
        }

        *map = next;

        info!(
            removed = removed.len(),
            changed = changed.len(),
            added = added.len(),
            "Endpoint inventory synchronized"
        );

        removed.into_iter().chain(changed).chain(added).collect()
    }
}

impl EndpointInventory for EndpointTable {
    fn endpoints(&self) -> Vec<Endpoint> {
        self.endpoints.read().values().cloned().collect()
    }

    fn endpoint(&self, id: EndpointId) -> Option<Endpoint> {
        let endpoint = self.endpoints.read().get(&id).cloned();
        if endpoint.is_none() {
            debug!(%id, "Endpoint not in inventory");
        }
        endpoint
    }
}
