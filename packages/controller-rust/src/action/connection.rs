//! Connection plans: connect, disconnect, suspend and resume.
//!
//! A connect routes every unrouted hop in order, then activates the sources
//! concurrently in class direction order. A disconnect deactivates sources
//! concurrently, then tears the hops down in order.

use routing_core::types::{ConnectionFormat, ConnectionState, MainConnectionId};
use routing_core::{ConnectionOrder, ControlResult};
use tracing::{debug, warn};

use super::segment::{ActivateSource, ConnectSegment, DeactivateSource, DisconnectSegment};
use super::{Action, ActionContext, CompositeAction, LeafAction, LeafStep, Plan};
use crate::policy::selection::{select, ConnectionFilter};

fn leaf(
    ctx: &mut ActionContext<'_>,
    step: impl LeafStep + 'static,
    timeout_ms: u64,
) -> Box<dyn Action> {
    Box::new(LeafAction::new(ctx.ids.next(), step, timeout_ms))
}

/// Body that brings `conn` to Connected.
///
/// # Errors
///
/// Returns `OutOfRange` if the connection or its class is unknown.
pub fn connect_steps(
    ctx: &mut ActionContext<'_>,
    conn: MainConnectionId,
    timeout_ms: u64,
) -> ControlResult<CompositeAction> {
    let connection = ctx.elements.connection(conn)?;
    let unrouted: Vec<usize> = connection
        .segments
        .iter()
        .enumerate()
        .filter(|(_, s)| !s.routed)
        .map(|(i, _)| i)
        .collect();
    let order = ctx
        .elements
        .class(&connection.class_name)?
        .segment_order(connection.segments.len());

    let routes: Vec<Box<dyn Action>> = unrouted
        .into_iter()
        .map(|index| leaf(ctx, ConnectSegment::new(conn, index), timeout_ms))
        .collect();
    let activations: Vec<Box<dyn Action>> = order
        .into_iter()
        .map(|index| leaf(ctx, ActivateSource::new(conn, index), timeout_ms))
        .collect();
    let routes = CompositeAction::sequential(ctx.ids.next(), "RouteSegments", routes);
    let activations = CompositeAction::fork(ctx.ids.next(), "ActivateSources", activations);
    Ok(CompositeAction::sequential(
        ctx.ids.next(),
        "ConnectSteps",
        vec![Box::new(routes), Box::new(activations)],
    ))
}

/// Body that brings `conn` to Disconnected.
///
/// # Errors
///
/// Returns `OutOfRange` if the connection or its class is unknown.
pub fn disconnect_steps(
    ctx: &mut ActionContext<'_>,
    conn: MainConnectionId,
    timeout_ms: u64,
) -> ControlResult<CompositeAction> {
    let connection = ctx.elements.connection(conn)?;
    let count = connection.segments.len();
    let order = ctx.elements.class(&connection.class_name)?.segment_order(count);

    let deactivations: Vec<Box<dyn Action>> = order
        .into_iter()
        .map(|index| leaf(ctx, DeactivateSource::new(conn, index), timeout_ms))
        .collect();
    let teardown: Vec<Box<dyn Action>> = (0..count)
        .map(|index| leaf(ctx, DisconnectSegment::new(conn, index), timeout_ms))
        .collect();
    let deactivations = CompositeAction::fork(ctx.ids.next(), "DeactivateSources", deactivations);
    let teardown = CompositeAction::sequential(ctx.ids.next(), "TeardownSegments", teardown);
    Ok(CompositeAction::sequential(
        ctx.ids.next(),
        "DisconnectSteps",
        vec![Box::new(deactivations), Box::new(teardown)],
    ))
}

fn for_each(
    ctx: &mut ActionContext<'_>,
    name: &str,
    ids: &[MainConnectionId],
    timeout_ms: u64,
    steps: fn(&mut ActionContext<'_>, MainConnectionId, u64) -> ControlResult<CompositeAction>,
) -> ControlResult<CompositeAction> {
    let mut children: Vec<Box<dyn Action>> = Vec::with_capacity(ids.len());
    for id in ids {
        children.push(Box::new(steps(ctx, *id, timeout_ms)?));
    }
    Ok(CompositeAction::sequential(ctx.ids.next(), name, children))
}

// ---------------------------------------------------------------------------
// Connect
// ---------------------------------------------------------------------------

/// Connects `source` to `sink` in `class_name`, reusing an existing main
/// connection for the triple.
#[derive(Debug)]
pub struct ConnectPlan {
    pub class_name: String,
    pub source: String,
    pub sink: String,
    pub format: ConnectionFormat,
    pub timeout_ms: u64,
    connection: Option<MainConnectionId>,
    created: bool,
}

impl ConnectPlan {
    #[must_use]
    pub fn new(
        class_name: &str,
        source: &str,
        sink: &str,
        format: ConnectionFormat,
        timeout_ms: u64,
    ) -> Self {
        Self {
            class_name: class_name.to_string(),
            source: source.to_string(),
            sink: sink.to_string(),
            format,
            timeout_ms,
            connection: None,
            created: false,
        }
    }

    /// Connection created or found by the plan, once executed.
    #[must_use]
    pub fn connection(&self) -> Option<MainConnectionId> {
        self.connection
    }
}

impl Plan for ConnectPlan {
    fn name(&self) -> &'static str {
        "Connect"
    }

    fn build(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<CompositeAction> {
        let id = match ctx
            .elements
            .find_connection(&self.class_name, &self.source, &self.sink)
        {
            Some(id) => id,
            None => {
                self.created = true;
                ctx.elements
                    .create_connection(&self.class_name, &self.source, &self.sink, self.format)?
            }
        };
        self.connection = Some(id);
        ctx.elements.set_suspended(id, false)?;
        if ctx.elements.connection(id)?.state() == ConnectionState::Connected {
            debug!(id, "main connection already connected");
            return Ok(CompositeAction::sequential(ctx.ids.next(), "ConnectSteps", Vec::new()));
        }
        connect_steps(ctx, id, self.timeout_ms)
    }

    fn on_undone(&mut self, ctx: &mut ActionContext<'_>) {
        if let (true, Some(id)) = (self.created, self.connection) {
            if let Err(err) = ctx.elements.remove_connection(id) {
                warn!(id, %err, "main connection not removed after undo");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Disconnect
// ---------------------------------------------------------------------------

/// Disconnects every connection the filter selects, in `order`, and removes
/// them afterwards unless the undo flag is set.
#[derive(Debug)]
pub struct DisconnectPlan {
    pub filter: ConnectionFilter,
    pub order: ConnectionOrder,
    pub timeout_ms: u64,
    selected: Vec<MainConnectionId>,
}

impl DisconnectPlan {
    #[must_use]
    pub fn new(filter: ConnectionFilter, order: ConnectionOrder, timeout_ms: u64) -> Self {
        Self {
            filter,
            order,
            timeout_ms,
            selected: Vec::new(),
        }
    }

    /// Connections chosen by the filter at execution time.
    #[must_use]
    pub fn selected(&self) -> &[MainConnectionId] {
        &self.selected
    }
}

impl Plan for DisconnectPlan {
    fn name(&self) -> &'static str {
        "Disconnect"
    }

    fn build(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<CompositeAction> {
        self.selected = select(ctx.elements, &self.filter, self.order);
        debug!(selected = ?self.selected, "connections to disconnect");
        for_each(ctx, "DisconnectAll", &self.selected, self.timeout_ms, disconnect_steps)
    }

    fn on_complete(&mut self, ctx: &mut ActionContext<'_>, undo_required: bool) -> ControlResult<()> {
        if undo_required {
            return Ok(());
        }
        for id in &self.selected {
            ctx.elements.remove_connection(*id)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Suspend / Resume
// ---------------------------------------------------------------------------

/// Marks the selected connections suspended, then disconnects them while
/// keeping them registered.
#[derive(Debug)]
pub struct SuspendPlan {
    pub filter: ConnectionFilter,
    pub order: ConnectionOrder,
    pub timeout_ms: u64,
    selected: Vec<MainConnectionId>,
}

impl SuspendPlan {
    #[must_use]
    pub fn new(filter: ConnectionFilter, order: ConnectionOrder, timeout_ms: u64) -> Self {
        Self {
            filter: filter.with_suspended(false),
            order,
            timeout_ms,
            selected: Vec::new(),
        }
    }
}

impl Plan for SuspendPlan {
    fn name(&self) -> &'static str {
        "Suspend"
    }

    fn build(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<CompositeAction> {
        self.selected = select(ctx.elements, &self.filter, self.order);
        for id in &self.selected {
            ctx.elements.set_suspended(*id, true)?;
        }
        for_each(ctx, "SuspendAll", &self.selected, self.timeout_ms, disconnect_steps)
    }

    fn on_undone(&mut self, ctx: &mut ActionContext<'_>) {
        for id in &self.selected {
            if let Err(err) = ctx.elements.set_suspended(*id, false) {
                warn!(id, %err, "suspension not cleared after undo");
            }
        }
    }
}

/// Clears the suspension of the selected suspended connections and
/// reconnects them.
#[derive(Debug)]
pub struct ResumePlan {
    pub filter: ConnectionFilter,
    pub order: ConnectionOrder,
    pub timeout_ms: u64,
    selected: Vec<MainConnectionId>,
}

impl ResumePlan {
    #[must_use]
    pub fn new(filter: ConnectionFilter, order: ConnectionOrder, timeout_ms: u64) -> Self {
        Self {
            filter: filter.with_suspended(true),
            order,
            timeout_ms,
            selected: Vec::new(),
        }
    }
}

impl Plan for ResumePlan {
    fn name(&self) -> &'static str {
        "Resume"
    }

    fn build(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<CompositeAction> {
        self.selected = select(ctx.elements, &self.filter, self.order);
        for id in &self.selected {
            ctx.elements.set_suspended(*id, false)?;
        }
        for_each(ctx, "ResumeAll", &self.selected, self.timeout_ms, connect_steps)
    }

    fn on_undone(&mut self, ctx: &mut ActionContext<'_>) {
        for id in &self.selected {
            if let Err(err) = ctx.elements.set_suspended(*id, true) {
                warn!(id, %err, "suspension not restored after undo");
            }
        }
    }
}
