//! Selection of the main connections an action operates on.

use std::cmp::Reverse;

use routing_core::descriptor::param;
use routing_core::types::{ConnectionState, MainConnectionId};
use routing_core::{ConnectionOrder, ControlResult};

use crate::action::params::Params;
use crate::connection::MainConnection;
use crate::elements::ElementRegistry;

/// Criteria a connection must meet; unset criteria match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionFilter {
    pub class_name: Option<String>,
    pub source: Option<String>,
    pub sink: Option<String>,
    pub connection_name: Option<String>,
    pub state: Option<ConnectionState>,
    pub suspended: Option<bool>,
}

impl ConnectionFilter {
    /// Builds a filter from the `className`, `sourceName`, `sinkName`,
    /// `connectionName` and `connectionState` parameters.
    ///
    /// # Errors
    ///
    /// Returns `Parameter` if `connectionState` does not parse.
    pub fn from_params(params: &Params<'_>) -> ControlResult<Self> {
        Ok(Self {
            class_name: params.text(param::CLASS_NAME).map(str::to_string),
            source: params.text(param::SOURCE_NAME).map(str::to_string),
            sink: params.text(param::SINK_NAME).map(str::to_string),
            connection_name: params.text(param::CONNECTION_NAME).map(str::to_string),
            state: params.parse(param::CONNECTION_STATE)?,
            suspended: None,
        })
    }

    /// Restricts the filter to suspended or non-suspended connections.
    #[must_use]
    pub fn with_suspended(mut self, suspended: bool) -> Self {
        self.suspended = Some(suspended);
        self
    }

    /// Whether `connection` satisfies every set field of the filter.
    #[must_use]
    pub fn matches(&self, connection: &MainConnection) -> bool {
        fn field(want: Option<&String>, have: &str) -> bool {
            want.map_or(true, |w| w == have)
        }
        field(self.class_name.as_ref(), &connection.class_name)
            && field(self.source.as_ref(), &connection.source)
            && field(self.sink.as_ref(), &connection.sink)
            && field(self.connection_name.as_ref(), &connection.name)
            && self.state.map_or(true, |s| s == connection.state())
            && self.suspended.map_or(true, |s| s == connection.suspended)
    }
}

/// Ids of the matching connections in visiting order. Ties fall back to
/// ascending id.
#[must_use]
pub fn select(
    elements: &ElementRegistry,
    filter: &ConnectionFilter,
    order: ConnectionOrder,
) -> Vec<MainConnectionId> {
    let mut matched: Vec<&MainConnection> =
        elements.connections().filter(|c| filter.matches(c)).collect();
    match order {
        ConnectionOrder::Newest => matched.sort_by_key(|c| (Reverse(c.last_connected), c.id)),
        ConnectionOrder::Oldest => matched.sort_by_key(|c| (c.last_connected, c.id)),
        ConnectionOrder::HighPriority => matched.sort_by_key(|c| (Reverse(c.priority), c.id)),
        ConnectionOrder::LowPriority => matched.sort_by_key(|c| (c.priority, c.id)),
    }
    matched.into_iter().map(|c| c.id).collect()
}
