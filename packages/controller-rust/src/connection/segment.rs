use routing_core::types::{
    ConnectionFormat, ConnectionId, DomainId, SegmentState, SinkId, SourceId,
};
use routing_core::RouteHop;

/// One hop of a main connection inside a single domain.
///
/// `routed` is set once the engine acknowledged the hop; the segment only
/// reaches [`SegmentState::Connected`] after its source is streaming too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSegment {
    pub source: String,
    pub source_id: SourceId,
    pub sink: String,
    pub sink_id: SinkId,
    pub domain: String,
    pub domain_id: DomainId,
    pub format: ConnectionFormat,
    pub state: SegmentState,
    pub connection_id: Option<ConnectionId>,
    pub routed: bool,
}

impl RouteSegment {
    #[must_use]
    pub fn new(
        hop: RouteHop,
        source: String,
        sink: String,
        domain: String,
        format: ConnectionFormat,
    ) -> Self {
        Self {
            source,
            source_id: hop.source,
            sink,
            sink_id: hop.sink,
            domain,
            domain_id: hop.domain,
            format,
            state: SegmentState::Disconnected,
            connection_id: None,
            routed: false,
        }
    }
}
