//! Announced service records.

use crate::entry_group::{EntryGroup, PublicationState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use zcpublish_core::types::{Endpoint, EndpointRef, SERVICE_TYPE_SERVER};

/// What a record announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Subject {
    /// The server process itself
    Server,
    /// A sink or source, referenced by identity only
    Endpoint(EndpointRef),
}

impl Subject {
    pub fn service_type(&self) -> &'static str {
        match self {
            Subject::Server => SERVICE_TYPE_SERVER,
            Subject::Endpoint(endpoint) => endpoint.kind.service_type(),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Server => write!(f, "server"),
            Subject::Endpoint(endpoint) => write!(f, "{}", endpoint),
        }
    }
}

/// One announced service: its current name and publication handle.
///
/// The name is only ever changed by collision handling. Endpoint records
/// keep the last endpoint data they were handed, so they can be recommitted
/// without asking anyone else.
#[derive(Debug)]
pub struct ServiceRecord {
    subject: Subject,
    name: String,
    endpoint: Option<Endpoint>,
    pub(crate) group: EntryGroup,
}

impl ServiceRecord {
    pub fn new(subject: Subject, name: impl Into<String>) -> Self {
        Self {
            subject,
            name: name.into(),
            endpoint: None,
            group: EntryGroup::new(),
        }
    }

    /// Record announcing `endpoint`.
    pub fn for_endpoint(endpoint: Endpoint, name: impl Into<String>) -> Self {
        Self {
            subject: Subject::Endpoint(endpoint.reference()),
            name: name.into(),
            endpoint: Some(endpoint),
            group: EntryGroup::new(),
        }
    }

    pub fn subject(&self) -> Subject {
        self.subject
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Endpoint data the record was last published with.
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    pub fn group(&self) -> &EntryGroup {
        &self.group
    }

    pub fn state(&self) -> PublicationState {
        self.group.state()
    }

    pub(crate) fn rename(&mut self, name: String) {
        self.name = name;
    }

    pub(crate) fn refresh(&mut self, endpoint: &Endpoint) {
        if self.endpoint.as_ref() != Some(endpoint) {
            self.endpoint = Some(endpoint.clone());
        }
    }

    pub fn status(&self) -> RecordStatus {
        RecordStatus {
            name: self.name.clone(),
            subject: self.subject,
            service_type: self.subject.service_type().to_string(),
            state: self.group.state(),
            established_at: self.group.established_at(),
        }
    }
}

/// Serializable view of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordStatus {
    pub name: String,
    pub subject: Subject,
    pub service_type: String,
    pub state: PublicationState,
    pub established_at: Option<DateTime<Utc>>,
}
