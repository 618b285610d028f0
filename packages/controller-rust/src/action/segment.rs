//! Per-segment steps of connecting and disconnecting a main connection.
//!
//! Each step addresses its segment by main connection id and index; the
//! registry owns the segment itself.

use routing_core::types::{MainConnectionId, SegmentState, SourceState};
use routing_core::{ControlError, ControlResult};
use tracing::{debug, warn};

use super::leaf::{LeafStep, Step};
use super::ActionContext;

fn set_state(ctx: &mut ActionContext<'_>, conn: MainConnectionId, index: usize, state: SegmentState) {
    if let Err(err) = ctx.elements.set_segment_state(conn, index, state) {
        warn!(conn, index, %state, %err, "segment state not applied");
    }
}

// ---------------------------------------------------------------------------
// ConnectSegment
// ---------------------------------------------------------------------------

/// Routes one hop. The segment stays `Connecting` until its source streams.
pub struct ConnectSegment {
    conn: MainConnectionId,
    index: usize,
}

impl ConnectSegment {
    #[must_use]
    pub fn new(conn: MainConnectionId, index: usize) -> Self {
        Self { conn, index }
    }
}

impl LeafStep for ConnectSegment {
    fn name(&self) -> &'static str {
        "ConnectSegment"
    }

    fn start(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<Step> {
        let segment = ctx.elements.segment(self.conn, self.index)?;
        if segment.routed {
            return Ok(Step::Complete);
        }
        let (source, sink, format) = (segment.source_id, segment.sink_id, segment.format);
        let (handle, connection_id) = ctx.routing.connect(source, sink, format)?;
        ctx.elements.segment_mut(self.conn, self.index)?.connection_id = Some(connection_id);
        ctx.elements
            .set_segment_state(self.conn, self.index, SegmentState::Connecting)?;
        Ok(Step::Pending(handle))
    }

    fn confirm(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<()> {
        ctx.elements.segment_mut(self.conn, self.index)?.routed = true;
        Ok(())
    }

    fn on_failure(&mut self, ctx: &mut ActionContext<'_>, _error: &ControlError) {
        if let Ok(segment) = ctx.elements.segment_mut(self.conn, self.index) {
            segment.connection_id = None;
            segment.routed = false;
        }
        set_state(ctx, self.conn, self.index, SegmentState::Disconnected);
    }

    fn start_undo(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<Step> {
        let connection_id = ctx
            .elements
            .segment(self.conn, self.index)?
            .connection_id
            .ok_or_else(|| ControlError::NotPossible("segment has no connection".into()))?;
        let handle = ctx.routing.disconnect(connection_id)?;
        ctx.elements
            .set_segment_state(self.conn, self.index, SegmentState::Disconnecting)?;
        Ok(Step::Pending(handle))
    }

    fn confirm_undo(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<()> {
        let segment = ctx.elements.segment_mut(self.conn, self.index)?;
        segment.routed = false;
        segment.connection_id = None;
        ctx.elements
            .set_segment_state(self.conn, self.index, SegmentState::Disconnected)
    }
}

// ---------------------------------------------------------------------------
// ActivateSource
// ---------------------------------------------------------------------------

/// Switches the segment's source on and marks the segment `Connected`.
/// Sources that are already on, or in the don't-touch state, are not
/// commanded.
pub struct ActivateSource {
    conn: MainConnectionId,
    index: usize,
    source: String,
    previous: Option<SourceState>,
    touched: bool,
}

impl ActivateSource {
    #[must_use]
    pub fn new(conn: MainConnectionId, index: usize) -> Self {
        Self {
            conn,
            index,
            source: String::new(),
            previous: None,
            touched: false,
        }
    }
}

impl LeafStep for ActivateSource {
    fn name(&self) -> &'static str {
        "ActivateSource"
    }

    fn start(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<Step> {
        let segment = ctx.elements.segment(self.conn, self.index)?;
        if segment.state == SegmentState::Connected {
            return Ok(Step::Complete);
        }
        self.source = segment.source.clone();
        self.touched = true;
        let source = ctx.elements.source(&self.source)?;
        if !source.needs_activation() {
            debug!(source = %self.source, state = %source.state, "source not commanded");
            ctx.elements
                .set_segment_state(self.conn, self.index, SegmentState::Connected)?;
            return Ok(Step::Complete);
        }
        self.previous = Some(source.state);
        let handle = ctx.routing.set_source_state(source.id, SourceState::On)?;
        Ok(Step::Pending(handle))
    }

    fn confirm(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<()> {
        ctx.elements.set_source_state(&self.source, SourceState::On)?;
        ctx.elements
            .set_segment_state(self.conn, self.index, SegmentState::Connected)
    }

    fn start_undo(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<Step> {
        if !self.touched {
            return Ok(Step::Complete);
        }
        let step = match self.previous {
            Some(previous) => {
                let id = ctx.elements.source(&self.source)?.id;
                Step::Pending(ctx.routing.set_source_state(id, previous)?)
            }
            None => Step::Complete,
        };
        ctx.elements
            .set_segment_state(self.conn, self.index, SegmentState::Connecting)?;
        Ok(step)
    }

    fn confirm_undo(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<()> {
        match self.previous {
            Some(previous) => ctx.elements.set_source_state(&self.source, previous),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// DeactivateSource
// ---------------------------------------------------------------------------

/// Marks the segment `Disconnecting` and switches its source off unless
/// another connected main connection still streams from it.
pub struct DeactivateSource {
    conn: MainConnectionId,
    index: usize,
    source: String,
    prior_segment: SegmentState,
    commanded: bool,
}

impl DeactivateSource {
    #[must_use]
    pub fn new(conn: MainConnectionId, index: usize) -> Self {
        Self {
            conn,
            index,
            source: String::new(),
            prior_segment: SegmentState::Disconnected,
            commanded: false,
        }
    }
}

impl LeafStep for DeactivateSource {
    fn name(&self) -> &'static str {
        "DeactivateSource"
    }

    fn start(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<Step> {
        let segment = ctx.elements.segment(self.conn, self.index)?;
        self.prior_segment = segment.state;
        if segment.state == SegmentState::Disconnected {
            return Ok(Step::Complete);
        }
        self.source = segment.source.clone();
        let source = ctx.elements.source(&self.source)?;
        let id = source.id;
        let streaming = source.state == SourceState::On;
        ctx.elements
            .set_segment_state(self.conn, self.index, SegmentState::Disconnecting)?;
        if !streaming || ctx.elements.source_in_use(&self.source, self.conn) {
            return Ok(Step::Complete);
        }
        self.commanded = true;
        Ok(Step::Pending(ctx.routing.set_source_state(id, SourceState::Off)?))
    }

    fn confirm(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<()> {
        ctx.elements.set_source_state(&self.source, SourceState::Off)
    }

    fn on_failure(&mut self, ctx: &mut ActionContext<'_>, _error: &ControlError) {
        self.commanded = false;
        set_state(ctx, self.conn, self.index, self.prior_segment);
    }

    fn start_undo(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<Step> {
        if !self.commanded {
            ctx.elements
                .set_segment_state(self.conn, self.index, self.prior_segment)?;
            return Ok(Step::Complete);
        }
        let id = ctx.elements.source(&self.source)?.id;
        Ok(Step::Pending(ctx.routing.set_source_state(id, SourceState::On)?))
    }

    fn confirm_undo(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<()> {
        ctx.elements.set_source_state(&self.source, SourceState::On)?;
        ctx.elements
            .set_segment_state(self.conn, self.index, self.prior_segment)
    }
}

// ---------------------------------------------------------------------------
// DisconnectSegment
// ---------------------------------------------------------------------------

/// Tears down one routed hop.
pub struct DisconnectSegment {
    conn: MainConnectionId,
    index: usize,
    prior_segment: SegmentState,
    was_routed: bool,
}

impl DisconnectSegment {
    #[must_use]
    pub fn new(conn: MainConnectionId, index: usize) -> Self {
        Self {
            conn,
            index,
            prior_segment: SegmentState::Disconnected,
            was_routed: false,
        }
    }
}

impl LeafStep for DisconnectSegment {
    fn name(&self) -> &'static str {
        "DisconnectSegment"
    }

    fn start(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<Step> {
        let segment = ctx.elements.segment(self.conn, self.index)?;
        self.prior_segment = segment.state;
        let connection_id = match (segment.routed, segment.connection_id) {
            (true, Some(id)) => id,
            _ => {
                ctx.elements
                    .set_segment_state(self.conn, self.index, SegmentState::Disconnected)?;
                return Ok(Step::Complete);
            }
        };
        let handle = ctx.routing.disconnect(connection_id)?;
        self.was_routed = true;
        ctx.elements
            .set_segment_state(self.conn, self.index, SegmentState::Disconnecting)?;
        Ok(Step::Pending(handle))
    }

    fn confirm(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<()> {
        let segment = ctx.elements.segment_mut(self.conn, self.index)?;
        segment.routed = false;
        segment.connection_id = None;
        ctx.elements
            .set_segment_state(self.conn, self.index, SegmentState::Disconnected)
    }

    fn on_failure(&mut self, ctx: &mut ActionContext<'_>, _error: &ControlError) {
        self.was_routed = false;
        set_state(ctx, self.conn, self.index, self.prior_segment);
    }

    fn start_undo(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<Step> {
        if !self.was_routed {
            return Ok(Step::Complete);
        }
        let segment = ctx.elements.segment(self.conn, self.index)?;
        let (source, sink, format) = (segment.source_id, segment.sink_id, segment.format);
        let (handle, connection_id) = ctx.routing.connect(source, sink, format)?;
        ctx.elements.segment_mut(self.conn, self.index)?.connection_id = Some(connection_id);
        ctx.elements
            .set_segment_state(self.conn, self.index, SegmentState::Connecting)?;
        Ok(Step::Pending(handle))
    }

    fn confirm_undo(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<()> {
        ctx.elements.segment_mut(self.conn, self.index)?.routed = true;
        Ok(())
    }
}
