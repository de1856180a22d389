//! Entry group state machine.
//!
//! Each announced record owns one [`EntryGroup`]. The group tracks the
//! publication handle through `Uncommitted → Registering → Established`;
//! collisions and failures are reported back to the owner as a
//! [`Transition`] so it can rename or drop the record.

use crate::client::{ClientAdapter, GroupId, GroupState, ServiceAnnouncement};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Publication handle of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupHandle {
    /// Nothing allocated on the directory service
    #[default]
    NoHandle,
    /// Group exists but announces nothing (after a reset)
    Uncommitted(GroupId),
    /// Commit submitted, waiting for the directory service
    Pending(GroupId),
    /// Directory service confirmed the announcement
    Committed(GroupId),
}

impl GroupHandle {
    pub fn id(&self) -> Option<GroupId> {
        match *self {
            GroupHandle::NoHandle => None,
            GroupHandle::Uncommitted(id) | GroupHandle::Pending(id) | GroupHandle::Committed(id) => {
                Some(id)
            }
        }
    }
}

/// Externally visible phase of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublicationState {
    /// No handle, nothing announced
    Unpublished,
    /// Handle kept but nothing announced
    Uncommitted,
    Registering,
    Established,
}

impl From<GroupHandle> for PublicationState {
    fn from(handle: GroupHandle) -> Self {
        match handle {
            GroupHandle::NoHandle => PublicationState::Unpublished,
            GroupHandle::Uncommitted(_) => PublicationState::Uncommitted,
            GroupHandle::Pending(_) => PublicationState::Registering,
            GroupHandle::Committed(_) => PublicationState::Established,
        }
    }
}

/// What a directory notification means for the owning record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Announcement confirmed
    Established,
    /// Name clashed; rename and commit again
    Collision,
    /// Group failed; release it and drop the record
    Failure,
    /// Nothing to do
    Unchanged,
}

/// Result of a commit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    /// Submitted to the directory service
    Submitted,
    /// Client is not running; retried on the next `Running` transition
    Deferred,
}

#[derive(Debug, Default)]
pub struct EntryGroup {
    handle: GroupHandle,
    established_at: Option<DateTime<Utc>>,
}

impl EntryGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> GroupHandle {
        self.handle
    }

    pub fn state(&self) -> PublicationState {
        self.handle.into()
    }

    /// Whether `group` is the handle currently held.
    pub fn holds(&self, group: GroupId) -> bool {
        self.handle.id() == Some(group)
    }

    /// Whether any handle is held.
    pub fn is_live(&self) -> bool {
        self.handle.id().is_some()
    }

    /// Whether a commit is in flight or established.
    pub fn is_active(&self) -> bool {
        matches!(self.handle, GroupHandle::Pending(_) | GroupHandle::Committed(_))
    }

    /// When the current announcement was last confirmed.
    pub fn established_at(&self) -> Option<DateTime<Utc>> {
        self.established_at
    }

    /// Submits `service`, reusing the held handle or creating one.
    ///
    /// When the client is not running the group is reset instead, so the
    /// next publish pass picks it up again. On error the handle (if any was
    /// obtained) is still held so the caller can release it.
    pub fn commit(
        &mut self,
        client: &mut ClientAdapter,
        service: &ServiceAnnouncement,
    ) -> Result<Commit> {
        if !client.is_running() {
            debug!(service = %service.name, state = %client.state(), "Deferring commit");
            self.reset(client);
            return Ok(Commit::Deferred);
        }

        let group = match self.handle.id() {
            Some(group) => {
                client.reset_group(group)?;
                group
            }
            None => client.create_group()?,
        };

        self.handle = GroupHandle::Uncommitted(group);
        self.established_at = None;

        client.commit(group, service)?;
        self.handle = GroupHandle::Pending(group);

        debug!(%group, service = %service.name, "Committed entry group");
        Ok(Commit::Submitted)
    }

    /// Applies a directory notification for `group`.
    pub fn observe(&mut self, group: GroupId, state: GroupState) -> Transition {
        match (self.handle, state) {
            (GroupHandle::Pending(id), GroupState::Established) if id == group => {
                self.handle = GroupHandle::Committed(id);
                self.established_at = Some(Utc::now());
                Transition::Established
            }
            (GroupHandle::Pending(id) | GroupHandle::Committed(id), GroupState::Collision)
                if id == group =>
            {
                Transition::Collision
            }
            (handle, GroupState::Failure) if handle.id() == Some(group) => Transition::Failure,
            _ => Transition::Unchanged,
        }
    }

    /// Withdraws the announcement but keeps the handle for a later commit.
    ///
    /// Returns false when there was nothing announced.
    pub fn reset(&mut self, client: &mut ClientAdapter) -> bool {
        match self.handle {
            GroupHandle::Pending(group) | GroupHandle::Committed(group) => {
                if let Err(e) = client.reset_group(group) {
                    debug!(%group, error = %e, "Reset not delivered");
                }
                self.handle = GroupHandle::Uncommitted(group);
                self.established_at = None;
                true
            }
            GroupHandle::Uncommitted(_) | GroupHandle::NoHandle => false,
        }
    }

    /// Frees the handle. Returns false when no handle was held.
    pub fn withdraw(&mut self, client: &mut ClientAdapter) -> bool {
        match self.handle.id() {
            Some(group) => {
                client.free_group(group);
                self.handle = GroupHandle::NoHandle;
                self.established_at = None;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::Simulator;
    use crate::txt::TxtRecord;

    fn announcement(name: &str) -> ServiceAnnouncement {
        ServiceAnnouncement {
            name: name.to_string(),
            service_type: "_pulse-sink._tcp",
            port: 4713,
            txt: TxtRecord::new(),
        }
    }

    fn running_adapter(sim: &Simulator) -> ClientAdapter {
        let (tx, _rx) = async_channel::unbounded();
        ClientAdapter::connect(sim.connector(), tx).unwrap()
    }

    #[test]
    fn test_commit_then_establish() {
        let sim = Simulator::manual();
        let mut client = running_adapter(&sim);
        let mut group = EntryGroup::new();

        assert_eq!(group.state(), PublicationState::Unpublished);
        let outcome = group.commit(&mut client, &announcement("a")).unwrap();
        assert_eq!(outcome, Commit::Submitted);
        assert_eq!(group.state(), PublicationState::Registering);

        let id = group.handle().id().unwrap();
        assert_eq!(group.observe(id, GroupState::Registering), Transition::Unchanged);
        assert_eq!(group.observe(id, GroupState::Established), Transition::Established);
        assert_eq!(group.state(), PublicationState::Established);
        assert!(group.established_at().is_some());
    }

    #[test]
    fn test_recommit_reuses_handle() {
        let sim = Simulator::manual();
        let mut client = running_adapter(&sim);
        let mut group = EntryGroup::new();

        group.commit(&mut client, &announcement("a")).unwrap();
        let first = group.handle().id();
        group.commit(&mut client, &announcement("a #2")).unwrap();
        assert_eq!(group.handle().id(), first);
    }

    #[test]
    fn test_notifications_for_other_groups_are_ignored() {
        let sim = Simulator::manual();
        let mut client = running_adapter(&sim);
        let mut group = EntryGroup::new();
        group.commit(&mut client, &announcement("a")).unwrap();

        let other = client.create_group().unwrap();
        assert_eq!(group.observe(other, GroupState::Established), Transition::Unchanged);
        assert_eq!(group.observe(other, GroupState::Failure), Transition::Unchanged);
        assert_eq!(group.state(), PublicationState::Registering);
    }

    #[test]
    fn test_reset_and_withdraw() {
        let sim = Simulator::manual();
        let mut client = running_adapter(&sim);
        let mut group = EntryGroup::new();
        group.commit(&mut client, &announcement("a")).unwrap();
        let id = group.handle().id().unwrap();

        assert!(group.reset(&mut client));
        assert_eq!(group.handle(), GroupHandle::Uncommitted(id));
        assert!(!group.reset(&mut client));

        // A late confirmation for the reset registration changes nothing
        assert_eq!(group.observe(id, GroupState::Established), Transition::Unchanged);

        assert!(group.withdraw(&mut client));
        assert_eq!(group.handle(), GroupHandle::NoHandle);
        assert!(!group.withdraw(&mut client));
    }

    #[test]
    fn test_commit_deferred_when_not_running() {
        let sim = Simulator::manual();
        sim.set_initial_state(crate::client::ClientState::Connecting);
        let mut client = running_adapter(&sim);
        let mut group = EntryGroup::new();

        let outcome = group.commit(&mut client, &announcement("a")).unwrap();
        assert_eq!(outcome, Commit::Deferred);
        assert!(!group.is_live());
        assert_eq!(sim.commit_count(), 0);
    }

    #[test]
    fn test_deferred_commit_releases_active_handle() {
        let sim = Simulator::manual();
        let mut client = running_adapter(&sim);
        let mut group = EntryGroup::new();
        group.commit(&mut client, &announcement("a")).unwrap();
        let id = group.handle().id().unwrap();

        sim.set_client_state(crate::client::ClientState::Connecting);
        let outcome = group.commit(&mut client, &announcement("a #2")).unwrap();
        assert_eq!(outcome, Commit::Deferred);
        assert_eq!(group.handle(), GroupHandle::Uncommitted(id));
        assert!(!group.is_active());
        assert_eq!(sim.reset_count(), 1);
    }
}
