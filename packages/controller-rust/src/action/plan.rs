//! Planned actions: the child list is derived from live state when the
//! action starts, then executed as a composite.

use routing_core::{ControlError, ControlResult, Handle};

use super::{Action, ActionContext, ActionCore, ActionId, ActionStatus, CompositeAction, Outcome};

/// Decides at execution time which body of actions to run.
pub trait Plan: Send {
    fn name(&self) -> &'static str;

    /// Builds the body from the current registry state. Child ids come from
    /// `ctx.ids`.
    ///
    /// # Errors
    ///
    /// Any error fails the action before anything is issued.
    fn build(&mut self, ctx: &mut ActionContext<'_>) -> ControlResult<CompositeAction>;

    /// Runs after the body completed.
    ///
    /// # Errors
    ///
    /// Any error fails the action.
    fn on_complete(&mut self, _ctx: &mut ActionContext<'_>, _undo_required: bool) -> ControlResult<()> {
        Ok(())
    }

    /// Runs after the body was undone.
    fn on_undone(&mut self, _ctx: &mut ActionContext<'_>) {}
}

/// Runs the body a [`Plan`] builds when the action starts.
pub struct PlannedAction<P> {
    core: ActionCore,
    plan: P,
    body: Option<CompositeAction>,
}

impl<P: Plan> PlannedAction<P> {
    #[must_use]
    pub fn new(id: ActionId, plan: P) -> Self {
        Self {
            core: ActionCore::new(id, plan.name()),
            plan,
            body: None,
        }
    }

    #[must_use]
    pub fn plan(&self) -> &P {
        &self.plan
    }

    /// The body built by the plan, once executed.
    #[must_use]
    pub fn body(&self) -> Option<&CompositeAction> {
        self.body.as_ref()
    }

    fn settle(&mut self, ctx: &mut ActionContext<'_>, outcome: Outcome) -> Outcome {
        match (self.core.status(), outcome) {
            (_, Outcome::Waiting) => Outcome::Waiting,
            (ActionStatus::Executing, Outcome::Done) => {
                match self.plan.on_complete(ctx, self.core.undo_required()) {
                    Ok(()) => self.core.complete(),
                    Err(err) => self.core.fail(err),
                }
            }
            (ActionStatus::Executing, Outcome::Failed(err)) => {
                // The body has already unwound its completed children.
                if self.core.undo_required() {
                    self.plan.on_undone(ctx);
                }
                self.core.fail(err)
            }
            (ActionStatus::Undoing, Outcome::Done) => {
                self.plan.on_undone(ctx);
                self.core.undo_complete()
            }
            (ActionStatus::Undoing, Outcome::Failed(err)) => self.core.undo_failed(err),
            _ => self.core.current_outcome(),
        }
    }
}

impl<P: Plan> Action for PlannedAction<P> {
    fn core(&self) -> &ActionCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ActionCore {
        &mut self.core
    }

    fn set_undo_required(&mut self, undo: bool) {
        self.core.set_undo_required(undo);
        if let Some(body) = self.body.as_mut() {
            body.set_undo_required(undo);
        }
    }

    fn contains(&self, id: ActionId) -> bool {
        self.core.id == id || self.body.as_ref().is_some_and(|b| b.contains(id))
    }

    fn execute(&mut self, ctx: &mut ActionContext<'_>) -> Outcome {
        if let Err(outcome) = self.core.begin() {
            return outcome;
        }
        let mut body = match self.plan.build(ctx) {
            Ok(body) => body,
            Err(err) => return self.core.fail(err),
        };
        if self.core.undo_required() {
            body.set_undo_required(true);
        }
        let outcome = body.execute(ctx);
        self.body = Some(body);
        self.settle(ctx, outcome)
    }

    fn undo(&mut self, ctx: &mut ActionContext<'_>) -> Outcome {
        if let Err(outcome) = self.core.begin_undo() {
            return outcome;
        }
        let outcome = match self.body.as_mut() {
            Some(body) => body.undo(ctx),
            None => Outcome::Done,
        };
        self.settle(ctx, outcome)
    }

    fn on_async_result(
        &mut self,
        ctx: &mut ActionContext<'_>,
        target: ActionId,
        handle: Handle,
        result: ControlResult<()>,
    ) -> Outcome {
        let Some(body) = self.body.as_mut() else {
            return self.core.current_outcome();
        };
        let outcome = body.on_async_result(ctx, target, handle, result);
        self.settle(ctx, outcome)
    }

    fn on_timeout(
        &mut self,
        ctx: &mut ActionContext<'_>,
        target: ActionId,
        handle: Handle,
    ) -> Outcome {
        let Some(body) = self.body.as_mut() else {
            return self.core.current_outcome();
        };
        let outcome = body.on_timeout(ctx, target, handle);
        self.settle(ctx, outcome)
    }

    fn abort(&mut self, ctx: &mut ActionContext<'_>) {
        if let Some(body) = self.body.as_mut() {
            body.abort(ctx);
        }
        match self.core.status() {
            ActionStatus::Executing => {
                let error = self
                    .body
                    .as_ref()
                    .and_then(|b| b.error().cloned())
                    .unwrap_or(ControlError::Aborted);
                self.core.fail(error);
            }
            ActionStatus::Undoing => {
                self.core.undo_failed(ControlError::Aborted);
            }
            _ => {}
        }
    }
}
