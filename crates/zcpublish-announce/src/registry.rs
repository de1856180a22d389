//! Service registry: one record per endpoint plus the main server record.

use crate::client::{ClientAdapter, GroupId, GroupState, ServiceAnnouncement};
use crate::entry_group::{Commit, Transition};
use crate::error::Result;
use crate::inventory::EndpointInventory;
use crate::naming::{alternative_service_name, endpoint_service_name, server_service_name};
use crate::record::{RecordStatus, ServiceRecord, Subject};
use crate::txt::{endpoint_txt, server_txt, ServerInfo};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::{debug, error, info};
use zcpublish_core::types::{Endpoint, EndpointId};

/// Borrowed collaborators needed to publish records.
pub struct PublishContext<'a> {
    pub client: &'a mut ClientAdapter,
    pub server: &'a ServerInfo,
    pub inventory: &'a dyn EndpointInventory,
    pub port: u16,
}

/// Record a group handle belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    Main,
    Endpoint(EndpointId),
}

/// Records keyed by endpoint identity, plus the main server record.
#[derive(Debug)]
pub struct ServiceRegistry {
    records: HashMap<EndpointId, ServiceRecord>,
    main: ServiceRecord,
}

impl ServiceRegistry {
    /// Creates an empty registry whose main record is named `user@host`.
    pub fn new(server: &ServerInfo) -> Self {
        Self {
            records: HashMap::new(),
            main: ServiceRecord::new(
                Subject::Server,
                server_service_name(&server.user_name, &server.host_name),
            ),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: EndpointId) -> Option<&ServiceRecord> {
        self.records.get(&id)
    }

    pub fn contains(&self, id: EndpointId) -> bool {
        self.records.contains_key(&id)
    }

    pub fn main(&self) -> &ServiceRecord {
        &self.main
    }

    pub fn records(&self) -> impl Iterator<Item = &ServiceRecord> {
        self.records.values()
    }

    /// Number of records, main record included, holding a handle.
    pub fn live_handles(&self) -> usize {
        self.records
            .values()
            .chain(std::iter::once(&self.main))
            .filter(|r| r.group.is_live())
            .count()
    }

    /// Status of every record, main record first.
    pub fn snapshot(&self) -> Vec<RecordStatus> {
        let mut endpoints: Vec<_> = self.records.values().map(ServiceRecord::status).collect();
        endpoints.sort_by(|a, b| a.name.cmp(&b.name));

        std::iter::once(self.main.status()).chain(endpoints).collect()
    }

    /// Returns the record for `endpoint`, creating it on first sight.
    ///
    /// An existing record keeps its name and takes over `endpoint`'s data.
    pub fn get_or_create(&mut self, endpoint: &Endpoint, server: &ServerInfo) -> &mut ServiceRecord {
        match self.records.entry(endpoint.id) {
            Entry::Occupied(entry) => {
                let record = entry.into_mut();
                record.refresh(endpoint);
                record
            }
            Entry::Vacant(entry) => {
                let name = endpoint_service_name(
                    &server.user_name,
                    &server.host_name,
                    endpoint.display_label(),
                );
                debug!(endpoint = %endpoint.reference(), service = %name, "Tracking new service");
                entry.insert(ServiceRecord::for_endpoint(endpoint.clone(), name))
            }
        }
    }

    /// Creates the record if needed and (re)commits it with `endpoint`'s data.
    pub fn publish(&mut self, endpoint: &Endpoint, ctx: &mut PublishContext<'_>) {
        self.get_or_create(endpoint, ctx.server);
        self.commit_endpoint(endpoint.id, ctx);
    }

    /// Frees the record's group and evicts it. No-op when absent.
    pub fn remove(&mut self, id: EndpointId, client: &mut ClientAdapter) -> bool {
        match self.records.remove(&id) {
            Some(mut record) => {
                if record.group.withdraw(client) {
                    debug!(service = %record.name(), "Removed entry group");
                }
                info!(service = %record.name(), endpoint = %id, "Service removed");
                true
            }
            None => false,
        }
    }

    /// Commits every tracked record, every endpoint in the inventory and
    /// the main record.
    ///
    /// Records that are already registering or established are left alone.
    /// Records delivered only through the endpoint hooks are recommitted
    /// with the data they were last given.
    pub fn publish_all(&mut self, ctx: &mut PublishContext<'_>) {
        debug!("Publishing services");

        for endpoint in ctx.inventory.endpoints() {
            self.get_or_create(&endpoint, ctx.server);
        }

        let idle: Vec<EndpointId> = self
            .records
            .iter()
            .filter(|(_, record)| !record.group.is_active())
            .map(|(id, _)| *id)
            .collect();
        for id in idle {
            self.commit_endpoint(id, ctx);
        }

        if !self.main.group.is_active() {
            self.commit_main(ctx);
        }
    }

    /// Withdraws (`hard`) or resets every live record and the main record.
    ///
    /// Records already in the target state are skipped.
    pub fn unpublish_all(&mut self, client: &mut ClientAdapter, hard: bool) {
        debug!(hard, "Unpublishing services");

        for record in self
            .records
            .values_mut()
            .chain(std::iter::once(&mut self.main))
        {
            let changed = if hard {
                record.group.withdraw(client)
            } else {
                record.group.reset(client)
            };

            if changed {
                debug!(
                    service = %record.name(),
                    action = if hard { "removed" } else { "reset" },
                    "Unpublished entry group"
                );
            }
        }
    }

    /// Resolves which record currently holds `group`.
    pub fn owner_of(&self, group: GroupId) -> Option<Owner> {
        if self.main.group.holds(group) {
            return Some(Owner::Main);
        }

        self.records
            .iter()
            .find(|(_, record)| record.group.holds(group))
            .map(|(id, _)| Owner::Endpoint(*id))
    }

    /// Applies a group notification to whichever record holds the handle.
    ///
    /// Handles nobody holds (freed, evicted, replaced) are ignored.
    pub fn handle_group_event(
        &mut self,
        group: GroupId,
        state: GroupState,
        ctx: &mut PublishContext<'_>,
    ) {
        let Some(owner) = self.owner_of(group) else {
            debug!(%group, %state, "Ignoring notification for released entry group");
            return;
        };

        let record = match owner {
            Owner::Main => &mut self.main,
            Owner::Endpoint(id) => match self.records.get_mut(&id) {
                Some(record) => record,
                None => return,
            },
        };

        match record.group.observe(group, state) {
            Transition::Established => {
                info!(service = %record.name(), "Successfully established service");
            }
            Transition::Collision => {
                let renamed = alternative_service_name(record.name());
                info!(
                    from = %record.name(),
                    to = %renamed,
                    "Name collision, renaming service"
                );
                record.rename(renamed);

                match owner {
                    Owner::Main => self.commit_main(ctx),
                    Owner::Endpoint(id) => self.commit_endpoint(id, ctx),
                }
            }
            Transition::Failure => {
                error!(service = %record.name(), "Failed to register service");
                match owner {
                    Owner::Main => {
                        record.group.withdraw(ctx.client);
                    }
                    Owner::Endpoint(id) => {
                        self.remove(id, ctx.client);
                    }
                }
            }
            Transition::Unchanged => {}
        }
    }

    /// Frees every handle and forgets every endpoint record.
    pub fn clear(&mut self, client: &mut ClientAdapter) {
        let ids: Vec<EndpointId> = self.records.keys().copied().collect();
        for id in ids {
            self.remove(id, client);
        }

        if self.main.group.withdraw(client) {
            debug!("Removed main entry group");
        }
    }

    /// Commits one endpoint record; on failure the record is dropped.
    fn commit_endpoint(&mut self, id: EndpointId, ctx: &mut PublishContext<'_>) {
        let Some(record) = self.records.get_mut(&id) else {
            return;
        };
        let Some(endpoint) = record.endpoint() else {
            return;
        };

        let announcement = ServiceAnnouncement {
            name: record.name().to_string(),
            service_type: endpoint.kind.service_type(),
            port: ctx.port,
            txt: endpoint_txt(ctx.server, endpoint),
        };

        if let Err(e) = Self::submit(record, &announcement, ctx.client) {
            error!(service = %announcement.name, error = %e, "Failed to publish service, dropping it");
            self.remove(id, ctx.client);
        }
    }

    fn commit_main(&mut self, ctx: &mut PublishContext<'_>) {
        let announcement = ServiceAnnouncement {
            name: self.main.name().to_string(),
            service_type: self.main.subject().service_type(),
            port: ctx.port,
            txt: server_txt(ctx.server),
        };

        if let Err(e) = Self::submit(&mut self.main, &announcement, ctx.client) {
            error!(service = %announcement.name, error = %e, "Failed to publish main service");
            self.main.group.withdraw(ctx.client);
        }
    }

    fn submit(
        record: &mut ServiceRecord,
        announcement: &ServiceAnnouncement,
        client: &mut ClientAdapter,
    ) -> Result<()> {
        if record.group.commit(client, announcement)? == Commit::Deferred {
            debug!(service = %announcement.name, "Publication deferred until the client runs");
        }
        Ok(())
    }
}
