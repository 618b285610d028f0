use std::collections::BTreeSet;

use routing_core::types::{ClassDirection, ClassId, ConnectionState, MainConnectionId};

use crate::policy::config::ClassConfig;

/// A class: a named group of sources and sinks plus the main connections
/// made on its behalf.
///
/// Members and connections are held by name and id only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Class {
    pub id: ClassId,
    pub name: String,
    pub priority: i32,
    pub direction: ClassDirection,
    configured_sources: BTreeSet<String>,
    configured_sinks: BTreeSet<String>,
    /// Registered members.
    pub sources: BTreeSet<String>,
    pub sinks: BTreeSet<String>,
    pub connections: BTreeSet<MainConnectionId>,
    /// Subset of `connections` currently published as Connected.
    pub connected: BTreeSet<MainConnectionId>,
}

impl Class {
    #[must_use]
    pub fn new(id: ClassId, config: &ClassConfig) -> Self {
        Self {
            id,
            name: config.name.clone(),
            priority: config.priority,
            direction: config.direction,
            configured_sources: config.sources.iter().cloned().collect(),
            configured_sinks: config.sinks.iter().cloned().collect(),
            sources: BTreeSet::new(),
            sinks: BTreeSet::new(),
            connections: BTreeSet::new(),
            connected: BTreeSet::new(),
        }
    }

    /// Whether `name` may be the source of a connection in this class.
    #[must_use]
    pub fn accepts_source(&self, name: &str) -> bool {
        self.configured_sources.is_empty() || self.configured_sources.contains(name)
    }

    /// Whether `name` may be the sink of a connection in this class.
    #[must_use]
    pub fn accepts_sink(&self, name: &str) -> bool {
        self.configured_sinks.is_empty() || self.configured_sinks.contains(name)
    }

    /// Tracks `id` as a member connection in its latest state.
    pub fn on_connection_state(&mut self, id: MainConnectionId, state: ConnectionState) {
        if state == ConnectionState::Connected {
            self.connected.insert(id);
        } else {
            self.connected.remove(&id);
        }
    }

    /// Drops a removed connection from the membership sets.
    pub fn forget_connection(&mut self, id: MainConnectionId) {
        self.connections.remove(&id);
        self.connected.remove(&id);
    }

    /// Order in which the segments of a connection are walked when sources
    /// are activated or deactivated.
    #[must_use]
    pub fn segment_order(&self, segments: usize) -> Vec<usize> {
        match self.direction {
            ClassDirection::SourceToSink => (0..segments).collect(),
            ClassDirection::SinkToSource => (0..segments).rev().collect(),
        }
    }
}
