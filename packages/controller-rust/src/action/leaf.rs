//! Leaf actions: one routing request (or one synchronous change) with an
//! optional undo.
//!
//! The request-specific part lives in a [`LeafStep`]; [`LeafAction`] owns the
//! status machine, the outstanding handle and the deadline.

use routing_core::{ControlError, ControlResult, Handle};
use tracing::debug;

use super::{Action, ActionContext, ActionCore, ActionId, ActionStatus, Outcome};

/// How a step started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Finished synchronously.
    Complete,
    /// A request is outstanding; completion follows its acknowledgement.
    Pending(Handle),
}

/// One routing-engine operation with an optional undo.
pub trait LeafStep: Send {
    fn name(&self) -> &'static str;

    /// Issues the forward request or applies a synchronous change.
    ///
    /// # Errors
    ///
    /// Any error fails the action.
    fn start(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<Step>;

    /// Commits the forward change after a successful acknowledgement.
    ///
    /// # Errors
    ///
    /// Any error fails the action.
    fn confirm(&mut self, _ctx: &mut ActionContext<'_>) -> ControlResult<()> {
        Ok(())
    }

    /// Cleans up after the forward request failed, timed out or was aborted.
    fn on_failure(&mut self, _ctx: &mut ActionContext<'_>, _error: &ControlError) {}

    /// Issues the reverting request. The default reverts nothing.
    ///
    /// # Errors
    ///
    /// Any error fails the undo.
    fn start_undo(&mut self, _ctx: &mut ActionContext<'_>) -> ControlResult<Step> {
        Ok(Step::Complete)
    }

    /// Commits the reverted state after a successful acknowledgement.
    ///
    /// # Errors
    ///
    /// Any error fails the undo.
    fn confirm_undo(&mut self, _ctx: &mut ActionContext<'_>) -> ControlResult<()> {
        Ok(())
    }
}

/// Drives a single [`LeafStep`], tracking its outstanding request and deadline.
pub struct LeafAction<S> {
    core: ActionCore,
    step: S,
    pending: Option<Handle>,
    timeout_ms: u64,
}

impl<S: LeafStep> LeafAction<S> {
    #[must_use]
    pub fn new(id: ActionId, step: S, timeout_ms: u64) -> Self {
        Self {
            core: ActionCore::new(id, step.name()),
            step,
            pending: None,
            timeout_ms,
        }
    }

    #[must_use]
    pub fn step(&self) -> &S {
        &self.step
    }

    /// Handle of the request this leaf is waiting on.
    #[must_use]
    pub fn pending(&self) -> Option<Handle> {
        self.pending
    }

    fn fail_forward(&mut self, ctx: &mut ActionContext<'_>, error: ControlError) -> Outcome {
        self.step.on_failure(ctx, &error);
        self.core.fail(error)
    }

    /// Tracks a started request, or settles a synchronous step.
    fn settle_start(&mut self, ctx: &mut ActionContext<'_>, step: ControlResult<Step>) -> Outcome {
        let undoing = self.core.status() == ActionStatus::Undoing;
        let error = match step {
            Ok(Step::Complete) if undoing => return self.core.undo_complete(),
            Ok(Step::Complete) => return self.core.complete(),
            Ok(Step::Pending(handle)) => match ctx.track(handle, self.core.id, self.timeout_ms) {
                Ok(()) => {
                    self.pending = Some(handle);
                    return Outcome::Waiting;
                }
                Err(err) => err,
            },
            Err(err) => err,
        };
        if undoing {
            self.core.undo_failed(error)
        } else {
            self.fail_forward(ctx, error)
        }
    }

    fn settle_result(&mut self, ctx: &mut ActionContext<'_>, result: ControlResult<()>) -> Outcome {
        match self.core.status() {
            ActionStatus::Executing => match result.and_then(|()| self.step.confirm(ctx)) {
                Ok(()) => self.core.complete(),
                Err(err) => self.fail_forward(ctx, err),
            },
            ActionStatus::Undoing => match result.and_then(|()| self.step.confirm_undo(ctx)) {
                Ok(()) => self.core.undo_complete(),
                Err(err) => self.core.undo_failed(err),
            },
            _ => self.core.current_outcome(),
        }
    }

    fn owns(&self, target: ActionId, handle: Handle) -> bool {
        target == self.core.id && self.pending == Some(handle)
    }
}

impl<S: LeafStep> Action for LeafAction<S> {
    fn core(&self) -> &ActionCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ActionCore {
        &mut self.core
    }

    fn execute(&mut self, ctx: &mut ActionContext<'_>) -> Outcome {
        if let Err(outcome) = self.core.begin() {
            return outcome;
        }
        let started = self.step.start(ctx);
        self.settle_start(ctx, started)
    }

    fn undo(&mut self, ctx: &mut ActionContext<'_>) -> Outcome {
        if let Err(outcome) = self.core.begin_undo() {
            return outcome;
        }
        let started = self.step.start_undo(ctx);
        self.settle_start(ctx, started)
    }

    fn on_async_result(
        &mut self,
        ctx: &mut ActionContext<'_>,
        target: ActionId,
        handle: Handle,
        result: ControlResult<()>,
    ) -> Outcome {
        if !self.owns(target, handle) {
            debug!(action = %self.core.name, %handle, "acknowledgement not for this action");
            return self.core.current_outcome();
        }
        self.pending = None;
        self.settle_result(ctx, result)
    }

    fn on_timeout(
        &mut self,
        ctx: &mut ActionContext<'_>,
        target: ActionId,
        handle: Handle,
    ) -> Outcome {
        if !self.owns(target, handle) {
            return self.core.current_outcome();
        }
        self.pending = None;
        ctx.abort_request(handle);
        self.settle_result(ctx, Err(ControlError::Timeout(handle)))
    }

    fn abort(&mut self, ctx: &mut ActionContext<'_>) {
        if let Some(handle) = self.pending.take() {
            ctx.abort_request(handle);
        }
        match self.core.status() {
            ActionStatus::Executing => {
                self.fail_forward(ctx, ControlError::Aborted);
            }
            ActionStatus::Undoing => {
                self.core.undo_failed(ControlError::Aborted);
            }
            _ => {}
        }
    }
}
