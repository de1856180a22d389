//! In-memory directory backend.
//!
//! The simulator behaves like a single-host mDNS responder: names announced
//! by one group collide with the same name of the same type announced by
//! another, and names can be marked as taken by "some other host". Failures
//! and collisions can be scheduled ahead of time, and connection state
//! changes can be injected at any point. Every request is recorded as a
//! [`SimOp`] for inspection.
//!
//! In automatic mode (the default) a commit is immediately followed by the
//! outcome notifications. In manual mode nothing is emitted for groups and
//! the caller injects outcomes with [`Simulator::emit_group_state`].

use crate::client::{
    ClientState, DirectoryClient, DirectoryConnector, EventSink, GroupId, GroupState,
    ServiceAnnouncement,
};
use crate::error::{PublishError, Result};
use crate::txt::TxtRecord;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, trace};

/// A request received by the simulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimOp {
    Commit {
        group: GroupId,
        name: String,
        service_type: &'static str,
        port: u16,
        txt: TxtRecord,
    },
    Reset {
        group: GroupId,
    },
    Free {
        group: GroupId,
    },
}

#[derive(Debug)]
struct SimState {
    automatic: bool,
    initial_state: ClientState,
    client_state: ClientState,
    generation: Option<u64>,
    sink: Option<EventSink>,
    connects: usize,
    fail_connects: usize,
    fail_commits: usize,
    fail_groups: usize,
    collide: usize,
    occupied: HashSet<String>,
    /// Groups of the live connection and what each one announces
    groups: BTreeMap<GroupId, Option<(&'static str, String)>>,
    ops: Vec<SimOp>,
}

impl SimState {
    fn new(automatic: bool) -> Self {
        Self {
            automatic,
            initial_state: ClientState::Running,
            client_state: ClientState::Disconnected,
            generation: None,
            sink: None,
            connects: 0,
            fail_connects: 0,
            fail_commits: 0,
            fail_groups: 0,
            collide: 0,
            occupied: HashSet::new(),
            groups: BTreeMap::new(),
            ops: Vec::new(),
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation == Some(generation)
    }

    fn name_taken(&self, group: GroupId, service_type: &str, name: &str) -> bool {
        self.occupied.contains(name)
            || self.groups.iter().any(|(id, announced)| {
                *id != group
                    && matches!(announced, Some((ty, n)) if *ty == service_type && n == name)
            })
    }

    fn emit_group(&self, group: GroupId, state: GroupState) {
        if let Some(sink) = &self.sink {
            sink.group_state(group, state);
        }
    }
}

/// Handle on a simulated directory service. Clones share the same state.
#[derive(Debug, Clone)]
pub struct Simulator {
    state: Arc<Mutex<SimState>>,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulator {
    /// Simulator that reports commit outcomes on its own.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::new(true))),
        }
    }

    /// Simulator that only reports what the caller injects.
    pub fn manual() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::new(false))),
        }
    }

    pub fn connector(&self) -> Box<dyn DirectoryConnector> {
        Box::new(SimulatorConnector { sim: self.clone() })
    }

    /// State new connections start in. Defaults to `Running`.
    pub fn set_initial_state(&self, state: ClientState) {
        self.state.lock().initial_state = state;
    }

    /// Makes the next `n` connection attempts fail.
    pub fn fail_next_connects(&self, n: usize) {
        self.state.lock().fail_connects = n;
    }

    /// Makes the next `n` commits fail synchronously.
    pub fn fail_next_commits(&self, n: usize) {
        self.state.lock().fail_commits = n;
    }

    /// Makes the next `n` committed groups report `Failure`.
    pub fn fail_next_groups(&self, n: usize) {
        self.state.lock().fail_groups = n;
    }

    /// Makes the next `n` committed groups report `Collision`.
    pub fn collide_next(&self, n: usize) {
        self.state.lock().collide = n;
    }

    /// Marks `name` as announced by another host.
    pub fn occupy(&self, name: impl Into<String>) {
        self.state.lock().occupied.insert(name.into());
    }

    pub fn release(&self, name: &str) {
        self.state.lock().occupied.remove(name);
    }

    /// Changes the state of the live connection and reports it.
    pub fn set_client_state(&self, client_state: ClientState) {
        let mut state = self.state.lock();
        state.client_state = client_state;
        if matches!(client_state, ClientState::Disconnected | ClientState::Failure) {
            state.groups.clear();
        }
        if let Some(sink) = &state.sink {
            sink.client_state(client_state);
        }
    }

    /// Reports `group_state` for `group` on the live connection.
    pub fn emit_group_state(&self, group: GroupId, group_state: GroupState) {
        self.state.lock().emit_group(group, group_state);
    }

    pub fn ops(&self) -> Vec<SimOp> {
        self.state.lock().ops.clone()
    }

    pub fn commit_count(&self) -> usize {
        self.state
            .lock()
            .ops
            .iter()
            .filter(|op| matches!(op, SimOp::Commit { .. }))
            .count()
    }

    pub fn reset_count(&self) -> usize {
        self.state
            .lock()
            .ops
            .iter()
            .filter(|op| matches!(op, SimOp::Reset { .. }))
            .count()
    }

    /// Number of commits announcing `name`.
    pub fn commits_named(&self, name: &str) -> usize {
        self.state
            .lock()
            .ops
            .iter()
            .filter(|op| matches!(op, SimOp::Commit { name: n, .. } if n == name))
            .count()
    }

    /// Group of the most recent commit announcing `name`.
    pub fn last_group_named(&self, name: &str) -> Option<GroupId> {
        self.state.lock().ops.iter().rev().find_map(|op| match op {
            SimOp::Commit { group, name: n, .. } if n == name => Some(*group),
            _ => None,
        })
    }

    /// TXT record of the most recent commit announcing `name`.
    pub fn last_txt_named(&self, name: &str) -> Option<TxtRecord> {
        self.state.lock().ops.iter().rev().find_map(|op| match op {
            SimOp::Commit { name: n, txt, .. } if n == name => Some(txt.clone()),
            _ => None,
        })
    }

    /// Names currently announced on the live connection, sorted.
    pub fn live_services(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .lock()
            .groups
            .values()
            .filter_map(|announced| announced.as_ref().map(|(_, name)| name.clone()))
            .collect();
        names.sort();
        names
    }

    /// Number of groups allocated on the live connection.
    pub fn group_count(&self) -> usize {
        self.state.lock().groups.len()
    }

    /// Number of connection attempts, failed ones included.
    pub fn connects(&self) -> usize {
        self.state.lock().connects
    }
}

/// Connector producing [`SimulatorClient`]s.
#[derive(Debug)]
pub struct SimulatorConnector {
    sim: Simulator,
}

impl DirectoryConnector for SimulatorConnector {
    fn connect(&self, events: EventSink) -> Result<Box<dyn DirectoryClient>> {
        let mut state = self.sim.state.lock();
        state.connects += 1;

        if state.fail_connects > 0 {
            state.fail_connects -= 1;
            return Err(PublishError::ConnectFailed(
                "simulated daemon unavailable".to_string(),
            ));
        }

        let generation = events.generation();
        state.generation = Some(generation);
        state.client_state = state.initial_state;
        state.groups.clear();
        events.client_state(state.initial_state);
        state.sink = Some(events);

        debug!(generation, state = %state.client_state, "Simulated client connected");

        Ok(Box::new(SimulatorClient {
            sim: self.sim.clone(),
            generation,
        }))
    }

    fn name(&self) -> &'static str {
        "simulator"
    }
}

/// One simulated connection.
#[derive(Debug)]
pub struct SimulatorClient {
    sim: Simulator,
    generation: u64,
}

impl DirectoryClient for SimulatorClient {
    fn state(&self) -> ClientState {
        let state = self.sim.state.lock();
        if state.is_current(self.generation) {
            state.client_state
        } else {
            ClientState::Disconnected
        }
    }

    fn add_group(&mut self, group: GroupId) -> Result<()> {
        let mut state = self.sim.state.lock();
        if !state.is_current(self.generation) {
            return Err(PublishError::ClientUnavailable);
        }
        state.groups.insert(group, None);
        trace!(%group, "Simulated group added");
        Ok(())
    }

    fn commit(&mut self, group: GroupId, service: &ServiceAnnouncement) -> Result<()> {
        let mut state = self.sim.state.lock();
        if !state.is_current(self.generation) || state.client_state != ClientState::Running {
            return Err(PublishError::NotRunning {
                state: state.client_state.to_string(),
            });
        }
        if !state.groups.contains_key(&group) {
            return Err(PublishError::UnknownGroup(group.as_u64()));
        }
        if state.fail_commits > 0 {
            state.fail_commits -= 1;
            return Err(PublishError::commit_failed(
                service.name.clone(),
                "simulated rejection",
            ));
        }

        state.ops.push(SimOp::Commit {
            group,
            name: service.name.clone(),
            service_type: service.service_type,
            port: service.port,
            txt: service.txt.clone(),
        });

        if !state.automatic {
            state
                .groups
                .insert(group, Some((service.service_type, service.name.clone())));
            return Ok(());
        }

        state.emit_group(group, GroupState::Registering);

        if state.fail_groups > 0 {
            state.fail_groups -= 1;
            state.emit_group(group, GroupState::Failure);
        } else if state.collide > 0 {
            state.collide -= 1;
            state.emit_group(group, GroupState::Collision);
        } else if state.name_taken(group, service.service_type, &service.name) {
            state.emit_group(group, GroupState::Collision);
        } else {
            state
                .groups
                .insert(group, Some((service.service_type, service.name.clone())));
            state.emit_group(group, GroupState::Established);
        }

        Ok(())
    }

    fn reset(&mut self, group: GroupId) -> Result<()> {
        let mut state = self.sim.state.lock();
        if !state.is_current(self.generation) {
            return Err(PublishError::ClientUnavailable);
        }
        if !state.groups.contains_key(&group) {
            return Err(PublishError::UnknownGroup(group.as_u64()));
        }
        state.groups.insert(group, None);
        state.ops.push(SimOp::Reset { group });
        Ok(())
    }

    fn free(&mut self, group: GroupId) {
        let mut state = self.sim.state.lock();
        if state.is_current(self.generation) && state.groups.remove(&group).is_some() {
            state.ops.push(SimOp::Free { group });
        }
    }

    fn shutdown(&mut self) {
        let mut state = self.sim.state.lock();
        if state.is_current(self.generation) {
            state.groups.clear();
            state.generation = None;
            state.sink = None;
            state.client_state = ClientState::Disconnected;
            debug!(generation = self.generation, "Simulated client closed");
        }
    }
}
