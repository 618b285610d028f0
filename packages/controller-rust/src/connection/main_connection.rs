//! Main connection: an ordered chain of route segments between a source and
//! a sink, published to the outside as one connection state.

use routing_core::types::{
    connection_name, ConnectionState, MainConnectionId, SegmentState, SinkId, SourceId,
};
use routing_core::{ControlError, ControlResult, MainConnectionRecord};

use super::segment::RouteSegment;

/// Aggregates segment states into the route state.
///
/// All Connected gives Connected, all Disconnected (or no segments) gives
/// Disconnected, any Disconnecting gives Disconnecting, everything else is
/// Connecting.
#[must_use]
pub fn aggregate_state(segments: &[SegmentState]) -> ConnectionState {
    if segments.iter().all(|s| *s == SegmentState::Disconnected) {
        ConnectionState::Disconnected
    } else if segments.iter().all(|s| *s == SegmentState::Connected) {
        ConnectionState::Connected
    } else if segments.contains(&SegmentState::Disconnecting) {
        ConnectionState::Disconnecting
    } else {
        ConnectionState::Connecting
    }
}

/// Published state transition of a main connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

/// A source-to-sink connection routed over one or more segments.
#[derive(Debug, Clone)]
pub struct MainConnection {
    pub id: MainConnectionId,
    pub name: String,
    pub class_name: String,
    pub source: String,
    pub source_id: SourceId,
    pub sink: String,
    pub sink_id: SinkId,
    pub segments: Vec<RouteSegment>,
    pub suspended: bool,
    /// Sequence number of the last entry into Connected; 0 if never.
    pub last_connected: u64,
    pub priority: i32,
    state: ConnectionState,
}

impl MainConnection {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        class_name: &str,
        source: &str,
        source_id: SourceId,
        sink: &str,
        sink_id: SinkId,
        segments: Vec<RouteSegment>,
        priority: i32,
    ) -> Self {
        let mut connection = Self {
            id: 0,
            name: connection_name(source, sink),
            class_name: class_name.to_string(),
            source: source.to_string(),
            source_id,
            sink: sink.to_string(),
            sink_id,
            segments,
            suspended: false,
            last_connected: 0,
            priority,
            state: ConnectionState::Disconnected,
        };
        connection.state = connection.published_state();
        connection
    }

    /// Last published state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// State aggregated from the segments, ignoring suspension.
    #[must_use]
    pub fn route_state(&self) -> ConnectionState {
        let states: Vec<SegmentState> = self.segments.iter().map(|s| s.state).collect();
        aggregate_state(&states)
    }

    /// Route state with the suspended overlay applied.
    #[must_use]
    pub fn published_state(&self) -> ConnectionState {
        match self.route_state() {
            ConnectionState::Disconnected if self.suspended => ConnectionState::Suspended,
            state => state,
        }
    }

    /// Updates one segment and returns the published transition, if any.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::OutOfRange` for an unknown segment index.
    pub fn set_segment_state(
        &mut self,
        index: usize,
        state: SegmentState,
    ) -> ControlResult<Option<StateChange>> {
        let segment = self
            .segments
            .get_mut(index)
            .ok_or_else(|| ControlError::out_of_range("segment", index.to_string()))?;
        segment.state = state;
        Ok(self.refresh())
    }

    /// Sets the suspended flag and returns the published transition, if any.
    pub fn set_suspended(&mut self, suspended: bool) -> Option<StateChange> {
        self.suspended = suspended;
        self.refresh()
    }

    fn refresh(&mut self) -> Option<StateChange> {
        let to = self.published_state();
        if to == self.state {
            return None;
        }
        let from = std::mem::replace(&mut self.state, to);
        Some(StateChange { from, to })
    }

    #[must_use]
    pub fn segment(&self, index: usize) -> Option<&RouteSegment> {
        self.segments.get(index)
    }

    /// # Errors
    ///
    /// Returns `OutOfRange` for an unknown segment index.
    pub fn segment_mut(&mut self, index: usize) -> ControlResult<&mut RouteSegment> {
        self.segments
            .get_mut(index)
            .ok_or_else(|| ControlError::out_of_range("segment", index.to_string()))
    }

    /// Whether any segment streams from `source`.
    #[must_use]
    pub fn uses_source(&self, source: &str) -> bool {
        self.segments.iter().any(|s| s.source == source)
    }

    /// Whether any segment plays into `sink`.
    #[must_use]
    pub fn uses_sink(&self, sink: &str) -> bool {
        self.segments.iter().any(|s| s.sink == sink)
    }

    /// Row stored in the database for this connection.
    #[must_use]
    pub fn record(&self) -> MainConnectionRecord {
        MainConnectionRecord {
            id: self.id,
            source: self.source_id,
            sink: self.sink_id,
            state: self.state,
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use routing_core::types::ConnectionFormat;
    use routing_core::RouteHop;

    use super::*;

    fn segment(index: u16) -> RouteSegment {
        RouteSegment::new(
            RouteHop {
                source: index,
                sink: index,
                domain: 1,
            },
            format!("src{index}"),
            format!("sink{index}"),
            "D".into(),
            ConnectionFormat::Stereo,
        )
    }

    fn connection(segments: usize) -> MainConnection {
        let segments = (0..segments)
            .map(|i| segment(u16::try_from(i).unwrap()))
            .collect();
        MainConnection::new("BASE", "src0", 0, "sinkN", 9, segments, 0)
    }

    fn any_segment_state() -> impl Strategy<Value = SegmentState> {
        prop_oneof![
            Just(SegmentState::Disconnected),
            Just(SegmentState::Connecting),
            Just(SegmentState::Connected),
            Just(SegmentState::Disconnecting),
        ]
    }

    proptest! {
        #[test]
        fn aggregate_matches_unanimous_states(
            states in proptest::collection::vec(any_segment_state(), 0..8),
        ) {
            let aggregate = aggregate_state(&states);
            let all_connected = !states.is_empty()
                && states.iter().all(|s| *s == SegmentState::Connected);
            let all_disconnected = states.iter().all(|s| *s == SegmentState::Disconnected);
            prop_assert_eq!(aggregate == ConnectionState::Connected, all_connected);
            prop_assert_eq!(aggregate == ConnectionState::Disconnected, all_disconnected);
            prop_assert_ne!(aggregate, ConnectionState::Suspended);
        }
    }

    #[test]
    fn mixed_states_resolve_to_connecting_or_disconnecting() {
        use SegmentState::{Connected, Connecting, Disconnected, Disconnecting};
        assert_eq!(aggregate_state(&[Connected, Disconnected]), ConnectionState::Connecting);
        assert_eq!(aggregate_state(&[Connected, Connecting]), ConnectionState::Connecting);
        assert_eq!(
            aggregate_state(&[Connected, Disconnecting]),
            ConnectionState::Disconnecting
        );
        assert_eq!(aggregate_state(&[]), ConnectionState::Disconnected);
    }

    #[test]
    fn segment_changes_report_published_transitions() {
        let mut conn = connection(2);
        assert_eq!(conn.state(), ConnectionState::Disconnected);

        let change = conn.set_segment_state(0, SegmentState::Connecting).unwrap();
        assert_eq!(
            change,
            Some(StateChange {
                from: ConnectionState::Disconnected,
                to: ConnectionState::Connecting
            })
        );
        // Still Connecting: no transition to report.
        assert_eq!(conn.set_segment_state(0, SegmentState::Connected).unwrap(), None);
        let change = conn.set_segment_state(1, SegmentState::Connected).unwrap();
        assert_eq!(change.map(|c| c.to), Some(ConnectionState::Connected));
        assert!(conn.set_segment_state(5, SegmentState::Connected).is_err());
    }

    #[test]
    fn suspended_overlay_only_when_route_is_down() {
        let mut conn = connection(1);
        conn.set_segment_state(0, SegmentState::Connected).unwrap();
        assert_eq!(conn.set_suspended(true), None);
        assert_eq!(conn.state(), ConnectionState::Connected);

        let change = conn.set_segment_state(0, SegmentState::Disconnected).unwrap();
        assert_eq!(change.map(|c| c.to), Some(ConnectionState::Suspended));

        let change = conn.set_suspended(false);
        assert_eq!(change.map(|c| c.to), Some(ConnectionState::Disconnected));
    }

    #[test]
    fn name_and_record() {
        let conn = connection(1);
        assert_eq!(conn.name, "src0:sinkN");
        assert_eq!(conn.record().state, ConnectionState::Disconnected);
        assert!(conn.uses_source("src0"));
        assert!(!conn.uses_sink("nope"));
    }
}
