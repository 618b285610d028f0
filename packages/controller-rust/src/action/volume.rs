//! Volume actions: set, limit, unlimit, mute, unmute and restore.
//!
//! Every sink change funnels through [`SinkVolumeStep`]: the new requested
//! volume, limit set and mute state are computed first, the applied volume
//! follows from them, and the engine is only asked when the applied volume
//! actually moves.

use std::collections::BTreeMap;

use routing_core::types::{MainVolume, MuteState, RampType, Volume};
use routing_core::{ControlError, ControlResult};
use tracing::{debug, warn};

use super::leaf::{LeafStep, Step};
use super::{Action, ActionContext, ActionId, CompositeAction, LeafAction, Plan};
use crate::elements::{Endpoint, Sink};

fn tolerate_no_change(result: ControlResult<()>) -> ControlResult<()> {
    match result {
        Err(ControlError::NoChange) => Ok(()),
        other => other,
    }
}

/// What a sink volume step changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeChange {
    Set {
        volume: Volume,
        main_volume: Option<MainVolume>,
    },
    Limit {
        id: String,
        level: Volume,
    },
    Unlimit {
        id: String,
    },
    Mute,
    Unmute,
}

/// Volume-related fields of a sink.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SinkLevels {
    volume: Volume,
    main_volume: MainVolume,
    requested: Volume,
    limits: BTreeMap<String, Volume>,
    mute_state: MuteState,
}

impl SinkLevels {
    fn of(sink: &Sink) -> Self {
        Self {
            volume: sink.volume,
            main_volume: sink.main_volume,
            requested: sink.requested_volume,
            limits: sink.limits.clone(),
            mute_state: sink.mute_state,
        }
    }

    fn apply(&self, sink: &mut Sink) {
        sink.volume = self.volume;
        sink.main_volume = self.main_volume;
        sink.requested_volume = self.requested;
        sink.limits.clone_from(&self.limits);
        sink.mute_state = self.mute_state;
    }
}

// ---------------------------------------------------------------------------
// Sink volume
// ---------------------------------------------------------------------------

/// Sets the volume of one sink and remembers the previous value for undo.
pub struct SinkVolumeStep {
    sink: String,
    change: VolumeChange,
    ramp: RampType,
    ramp_time_ms: u16,
    /// Class the requested volume is recorded under; `None` records under
    /// every class containing the sink.
    class_name: Option<String>,
    previous: Option<SinkLevels>,
    next: Option<SinkLevels>,
}

impl SinkVolumeStep {
    #[must_use]
    pub fn new(sink: &str, change: VolumeChange, ramp: RampType, ramp_time_ms: u16) -> Self {
        Self {
            sink: sink.to_string(),
            change,
            ramp,
            ramp_time_ms,
            class_name: None,
            previous: None,
            next: None,
        }
    }

    /// Records the applied volume under `class_name` for later restore.
    #[must_use]
    pub fn recorded_under(mut self, class_name: Option<&str>) -> Self {
        self.class_name = class_name.map(str::to_string);
        self
    }

    fn plan_levels(&self, current: &SinkLevels, mute_volume: Volume) -> SinkLevels {
        let mut next = current.clone();
        match &self.change {
            VolumeChange::Set {
                volume,
                main_volume,
            } => {
                next.requested = *volume;
                if let Some(main_volume) = main_volume {
                    next.main_volume = *main_volume;
                }
            }
            VolumeChange::Limit { id, level } => {
                next.limits.insert(id.clone(), *level);
            }
            VolumeChange::Unlimit { id } => {
                next.limits.remove(id);
            }
            VolumeChange::Mute => next.mute_state = MuteState::Muted,
            VolumeChange::Unmute => next.mute_state = MuteState::Unmuted,
        }
        next.volume = Sink::target_volume(next.requested, &next.limits, next.mute_state, mute_volume);
        next
    }

    /// Writes `levels` to the model and the database side effects of the
    /// change.
    fn commit(&self, ctx: &mut ActionContext<'_>, levels: &SinkLevels) -> ControlResult<()> {
        let sink = ctx.elements.sink_mut(&self.sink)?;
        let id = sink.id;
        let main_volume_changed = sink.main_volume != levels.main_volume;
        let mute_changed = sink.mute_state != levels.mute_state;
        levels.apply(sink);
        debug!(sink = %self.sink, volume = levels.volume, requested = levels.requested, "sink volume committed");

        if main_volume_changed {
            tolerate_no_change(
                ctx.elements
                    .database_mut()
                    .change_sink_main_volume(id, levels.main_volume),
            )?;
        }
        if mute_changed {
            // Only Ok and NoChange reach the log branch; any other database
            // error is dropped and the step still completes.
            let result = ctx
                .elements
                .database_mut()
                .change_sink_mute_state(id, levels.mute_state);
            if matches!(result, Ok(()) | Err(ControlError::NoChange)) {
                warn!(sink = %self.sink, state = %levels.mute_state, "could not store mute state");
            }
        }
        Ok(())
    }

    fn begin(
        &mut self,
        ctx: &mut ActionContext<'_>,
        levels: SinkLevels,
        current_volume: Volume,
        store: fn(&mut Self, SinkLevels),
    ) -> ControlResult<Step> {
        if levels.volume == current_volume {
            self.commit(ctx, &levels)?;
            store(self, levels);
            return Ok(Step::Complete);
        }
        let id = ctx.elements.sink(&self.sink)?.id;
        let handle = ctx
            .routing
            .set_sink_volume(id, levels.volume, self.ramp, self.ramp_time_ms)?;
        store(self, levels);
        Ok(Step::Pending(handle))
    }

    fn record(&self, ctx: &mut ActionContext<'_>, levels: &SinkLevels) {
        if matches!(self.change, VolumeChange::Set { .. }) {
            ctx.elements
                .record_volume(self.class_name.as_deref(), &self.sink, levels.requested);
        }
    }
}

impl LeafStep for SinkVolumeStep {
    fn name(&self) -> &'static str {
        match self.change {
            VolumeChange::Set { .. } => "SetSinkVolume",
            VolumeChange::Limit { .. } => "LimitSinkVolume",
            VolumeChange::Unlimit { .. } => "UnlimitSinkVolume",
            VolumeChange::Mute => "MuteSink",
            VolumeChange::Unmute => "UnmuteSink",
        }
    }

    fn start(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<Step> {
        let current = SinkLevels::of(ctx.elements.sink(&self.sink)?);
        let next = self.plan_levels(&current, ctx.config.mute_volume);
        let volume = current.volume;
        self.previous = Some(current);
        let step = self.begin(ctx, next, volume, |step, levels| step.next = Some(levels))?;
        if step == Step::Complete {
            if let Some(levels) = self.next.clone() {
                self.record(ctx, &levels);
            }
        }
        Ok(step)
    }

    fn confirm(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<()> {
        let levels = self
            .next
            .clone()
            .ok_or_else(|| ControlError::NotPossible("no pending volume".into()))?;
        self.commit(ctx, &levels)?;
        self.record(ctx, &levels);
        Ok(())
    }

    fn start_undo(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<Step> {
        let Some(previous) = self.previous.clone() else {
            return Ok(Step::Complete);
        };
        let current = ctx.elements.sink(&self.sink)?.volume;
        self.begin(ctx, previous, current, |step, levels| step.previous = Some(levels))
    }

    fn confirm_undo(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<()> {
        match self.previous.clone() {
            Some(previous) => self.commit(ctx, &previous),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Source volume
// ---------------------------------------------------------------------------

/// Sets the volume of one source.
pub struct SourceVolumeStep {
    source: String,
    volume: Volume,
    ramp: RampType,
    ramp_time_ms: u16,
    previous: Option<Volume>,
}

impl SourceVolumeStep {
    #[must_use]
    pub fn new(source: &str, volume: Volume, ramp: RampType, ramp_time_ms: u16) -> Self {
        Self {
            source: source.to_string(),
            volume,
            ramp,
            ramp_time_ms,
            previous: None,
        }
    }

    fn request(&self, ctx: &mut ActionContext<'_>, volume: Volume) -> ControlResult<Step> {
        let source = ctx.elements.source(&self.source)?;
        if source.volume == volume {
            return Ok(Step::Complete);
        }
        let id = source.id;
        Ok(Step::Pending(ctx.routing.set_source_volume(
            id,
            volume,
            self.ramp,
            self.ramp_time_ms,
        )?))
    }
}

impl LeafStep for SourceVolumeStep {
    fn name(&self) -> &'static str {
        "SetSourceVolume"
    }

    fn start(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<Step> {
        self.previous = Some(ctx.elements.source(&self.source)?.volume);
        self.request(ctx, self.volume)
    }

    fn confirm(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<()> {
        ctx.elements.source_mut(&self.source)?.volume = self.volume;
        Ok(())
    }

    fn start_undo(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<Step> {
        match self.previous {
            Some(previous) => self.request(ctx, previous),
            None => Ok(Step::Complete),
        }
    }

    fn confirm_undo(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<()> {
        if let Some(previous) = self.previous {
            ctx.elements.source_mut(&self.source)?.volume = previous;
        }
        Ok(())
    }
}

/// Builds the leaf for `ACTION_SET_VOLUME` on either endpoint kind.
#[must_use]
pub fn set_volume(
    id: ActionId,
    endpoint: &Endpoint,
    volume: Volume,
    main_volume: Option<MainVolume>,
    ramp: (RampType, u16),
    timeout_ms: u64,
) -> Box<dyn Action> {
    match endpoint {
        Endpoint::Sink(name) => Box::new(LeafAction::new(
            id,
            SinkVolumeStep::new(
                name,
                VolumeChange::Set {
                    volume,
                    main_volume,
                },
                ramp.0,
                ramp.1,
            ),
            timeout_ms,
        )),
        Endpoint::Source(name) => Box::new(LeafAction::new(
            id,
            SourceVolumeStep::new(name, volume, ramp.0, ramp.1),
            timeout_ms,
        )),
    }
}

// ---------------------------------------------------------------------------
// Plans
// ---------------------------------------------------------------------------

/// Sinks a class-wide volume action touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkSelection {
    Sink(String),
    /// Sinks of the class's connected main connections.
    Class(String),
}

impl SinkSelection {
    fn resolve(&self, ctx: &ActionContext<'_>) -> ControlResult<Vec<String>> {
        match self {
            SinkSelection::Sink(name) => {
                ctx.elements.sink(name)?;
                Ok(vec![name.clone()])
            }
            SinkSelection::Class(class_name) => {
                let class = ctx.elements.class(class_name)?;
                let mut sinks: Vec<String> = class
                    .connected
                    .iter()
                    .filter_map(|id| ctx.elements.connection(*id).ok())
                    .map(|c| c.sink.clone())
                    .collect();
                sinks.sort();
                sinks.dedup();
                Ok(sinks)
            }
        }
    }
}

/// Limit, unlimit, mute or unmute over a sink selection, applied
/// concurrently.
#[derive(Debug)]
pub struct SinkVolumePlan {
    pub name: &'static str,
    pub selection: SinkSelection,
    pub change: VolumeChange,
    pub ramp: (RampType, u16),
    pub timeout_ms: u64,
}

impl Plan for SinkVolumePlan {
    fn name(&self) -> &'static str {
        self.name
    }

    fn build(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<CompositeAction> {
        let sinks = self.selection.resolve(ctx)?;
        debug!(action = self.name, ?sinks, "sinks selected");
        let children: Vec<Box<dyn Action>> = sinks
            .iter()
            .map(|sink| {
                let step = SinkVolumeStep::new(sink, self.change.clone(), self.ramp.0, self.ramp.1);
                Box::new(LeafAction::new(ctx.ids.next(), step, self.timeout_ms)) as Box<dyn Action>
            })
            .collect();
        Ok(CompositeAction::fork(ctx.ids.next(), self.name, children))
    }
}

/// Reapplies the last recorded volumes of a class.
#[derive(Debug)]
pub struct RestoreVolumePlan {
    pub class_name: String,
    pub ramp: (RampType, u16),
    pub timeout_ms: u64,
}

impl Plan for RestoreVolumePlan {
    fn name(&self) -> &'static str {
        "RestoreVolume"
    }

    fn build(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<CompositeAction> {
        let snapshot = ctx.elements.volumes().clone();
        let volumes = ctx.elements.restore_volume(&self.class_name, &snapshot)?;
        let children: Vec<Box<dyn Action>> = volumes
            .into_iter()
            .map(|(sink, volume)| {
                let step = SinkVolumeStep::new(
                    &sink,
                    VolumeChange::Set {
                        volume,
                        main_volume: None,
                    },
                    self.ramp.0,
                    self.ramp.1,
                )
                .recorded_under(Some(&self.class_name));
                Box::new(LeafAction::new(ctx.ids.next(), step, self.timeout_ms)) as Box<dyn Action>
            })
            .collect();
        Ok(CompositeAction::fork(ctx.ids.next(), "RestoreVolume", children))
    }
}
