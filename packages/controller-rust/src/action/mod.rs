//! Action framework.
//!
//! An action is an explicit state machine driven from the controller's event
//! loop. [`Action::execute`] either finishes synchronously or returns
//! [`Outcome::Waiting`] after issuing an asynchronous routing request; the
//! acknowledgement later arrives through [`Action::on_async_result`] (or the
//! deadline through [`Action::on_timeout`]) addressed to the owning action
//! id. Composites route those calls to the child that owns the id.
//!
//! Status machine:
//!
//! ```text
//! NotStarted -> Executing -> Completed | ErrorStopped
//! Completed  -> Undoing   -> UndoComplete | UndoFailed
//! ```

pub mod composite;
pub mod connection;
pub mod leaf;
pub mod params;
pub mod plan;
pub mod property;
pub mod reject;
pub mod segment;
pub mod volume;

use std::fmt;

use routing_core::{ControlError, ControlResult, Handle, RoutingControl};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::ControllerConfig;
use crate::elements::ElementRegistry;
use crate::handles::HandleRegistry;

pub use composite::{CompositeAction, Mode};
pub use leaf::{LeafAction, LeafStep, Step};
pub use plan::{Plan, PlannedAction};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Identifier of one action node, unique within a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ActionId(pub u64);

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a{}", self.0)
    }
}

/// Monotonic action id generator, one per controller.
#[derive(Debug, Default)]
pub struct ActionIds {
    last: u64,
}

impl ActionIds {
    /// Returns the next unused id. Ids start at 1.
    pub fn next(&mut self) -> ActionId {
        self.last += 1;
        ActionId(self.last)
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle of an action. Transitions are checked by [`ActionStatus::can_become`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionStatus {
    NotStarted,
    Executing,
    Completed,
    ErrorStopped,
    Undoing,
    UndoComplete,
    UndoFailed,
}

impl ActionStatus {
    /// Whether moving from `self` to `next` is a legal transition.
    #[must_use]
    pub fn can_become(self, next: ActionStatus) -> bool {
        use ActionStatus::{
            Completed, ErrorStopped, Executing, NotStarted, UndoComplete, UndoFailed, Undoing,
        };
        matches!(
            (self, next),
            (NotStarted, Executing)
                | (Executing, Completed | ErrorStopped)
                | (Completed, Undoing)
                | (Undoing, UndoComplete | UndoFailed)
        )
    }

    /// No further transition is expected from this status.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ActionStatus::Completed
                | ActionStatus::ErrorStopped
                | ActionStatus::UndoComplete
                | ActionStatus::UndoFailed
        )
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionStatus::NotStarted => "NOT_STARTED",
            ActionStatus::Executing => "EXECUTING",
            ActionStatus::Completed => "COMPLETED",
            ActionStatus::ErrorStopped => "ERROR_STOPPED",
            ActionStatus::Undoing => "UNDOING",
            ActionStatus::UndoComplete => "UNDO_COMPLETE",
            ActionStatus::UndoFailed => "UNDO_FAILED",
        };
        f.write_str(name)
    }
}

/// Result of driving an action one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done,
    Waiting,
    Failed(ControlError),
}

/// Bookkeeping shared by every action implementation.
#[derive(Debug, Clone)]
pub struct ActionCore {
    pub id: ActionId,
    pub name: String,
    status: ActionStatus,
    error: Option<ControlError>,
    undo_required: bool,
}

impl ActionCore {
    #[must_use]
    pub fn new(id: ActionId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            status: ActionStatus::NotStarted,
            error: None,
            undo_required: false,
        }
    }

    #[must_use]
    pub fn status(&self) -> ActionStatus {
        self.status
    }

    #[must_use]
    pub fn error(&self) -> Option<&ControlError> {
        self.error.as_ref()
    }

    /// Whether a failure of a later sibling should undo this action.
    #[must_use]
    pub fn undo_required(&self) -> bool {
        self.undo_required
    }

    pub fn set_undo_required(&mut self, undo: bool) {
        self.undo_required = undo;
    }

    /// Applies a legal transition. Illegal transitions are rejected and
    /// logged.
    pub fn transition(&mut self, next: ActionStatus) -> bool {
        if !self.status.can_become(next) {
            warn!(
                action = %self.name,
                id = %self.id,
                from = %self.status,
                to = %next,
                "illegal action transition rejected"
            );
            return false;
        }
        debug!(action = %self.name, id = %self.id, from = %self.status, to = %next, "action transition");
        self.status = next;
        true
    }

    /// `NotStarted -> Executing`, or a failure outcome describing why not.
    ///
    /// # Errors
    ///
    /// Returns the outcome to hand back to the caller when the action has
    /// already been started.
    pub fn begin(&mut self) -> Result<(), Outcome> {
        if self.transition(ActionStatus::Executing) {
            Ok(())
        } else {
            Err(Outcome::Failed(ControlError::NotPossible(format!(
                "{} is already {}",
                self.name, self.status
            ))))
        }
    }

    /// Marks the action completed.
    pub fn complete(&mut self) -> Outcome {
        if self.transition(ActionStatus::Completed) {
            Outcome::Done
        } else {
            self.current_outcome()
        }
    }

    /// Stops the action with `error` and reports it.
    pub fn fail(&mut self, error: ControlError) -> Outcome {
        if self.transition(ActionStatus::ErrorStopped) {
            debug!(action = %self.name, id = %self.id, %error, "action failed");
            self.error = Some(error.clone());
            Outcome::Failed(error)
        } else {
            self.current_outcome()
        }
    }

    /// `Completed -> Undoing`, or the failure outcome if undo is not legal.
    ///
    /// # Errors
    ///
    /// Returns the outcome to hand back when the action has not completed.
    pub fn begin_undo(&mut self) -> Result<(), Outcome> {
        if self.transition(ActionStatus::Undoing) {
            Ok(())
        } else {
            Err(Outcome::Failed(ControlError::NotPossible(format!(
                "{} cannot be undone while {}",
                self.name, self.status
            ))))
        }
    }

    /// Marks a running undo finished.
    pub fn undo_complete(&mut self) -> Outcome {
        if self.transition(ActionStatus::UndoComplete) {
            Outcome::Done
        } else {
            self.current_outcome()
        }
    }

    /// Marks a running undo failed with `error`.
    pub fn undo_failed(&mut self, error: ControlError) -> Outcome {
        if self.transition(ActionStatus::UndoFailed) {
            warn!(action = %self.name, id = %self.id, %error, "undo failed");
            self.error = Some(error.clone());
            Outcome::Failed(error)
        } else {
            self.current_outcome()
        }
    }

    /// Outcome matching the current status, for calls that change nothing.
    #[must_use]
    pub fn current_outcome(&self) -> Outcome {
        match self.status {
            ActionStatus::NotStarted | ActionStatus::Executing | ActionStatus::Undoing => {
                Outcome::Waiting
            }
            ActionStatus::Completed | ActionStatus::UndoComplete => Outcome::Done,
            ActionStatus::ErrorStopped | ActionStatus::UndoFailed => Outcome::Failed(
                self.error.clone().unwrap_or(ControlError::Aborted),
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Execution context
// ---------------------------------------------------------------------------

/// Everything an action may touch while it runs. Built by the controller for
/// each call into the action tree of one job.
pub struct ActionContext<'a> {
    pub elements: &'a mut ElementRegistry,
    pub handles: &'a mut HandleRegistry,
    pub routing: &'a mut dyn RoutingControl,
    pub config: &'a ControllerConfig,
    pub ids: &'a mut ActionIds,
    pub now_ms: u64,
    /// Root action of the running job.
    pub root: ActionId,
}

impl ActionContext<'_> {
    /// Registers an outstanding request owned by `owner`.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateHandle` if the routing engine reused a live handle.
    pub fn track(&mut self, handle: Handle, owner: ActionId, timeout_ms: u64) -> ControlResult<()> {
        self.handles
            .register(handle, owner, self.root, self.now_ms.saturating_add(timeout_ms))
    }

    /// Releases `handle` and asks the routing engine to drop the request.
    pub fn abort_request(&mut self, handle: Handle) {
        self.handles.release(handle);
        if let Err(err) = self.routing.abort(handle) {
            debug!(%handle, %err, "routing engine did not abort request");
        }
    }
}

// ---------------------------------------------------------------------------
// Action trait
// ---------------------------------------------------------------------------

/// A node of the action tree driven by the controller.
///
/// Every entry point returns an [`Outcome`]; `Waiting` means a routing
/// request is outstanding and a later acknowledgement resumes the node.
pub trait Action: Send {
    fn core(&self) -> &ActionCore;

    fn core_mut(&mut self) -> &mut ActionCore;

    fn id(&self) -> ActionId {
        self.core().id
    }

    fn name(&self) -> &str {
        &self.core().name
    }

    fn status(&self) -> ActionStatus {
        self.core().status()
    }

    fn error(&self) -> Option<&ControlError> {
        self.core().error()
    }

    fn undo_required(&self) -> bool {
        self.core().undo_required()
    }

    fn set_undo_required(&mut self, undo: bool) {
        self.core_mut().set_undo_required(undo);
    }

    /// Whether `id` names this action or one of its descendants.
    fn contains(&self, id: ActionId) -> bool {
        self.id() == id
    }

    fn execute(&mut self, ctx: &mut ActionContext<'_>) -> Outcome;

    /// Reverts a completed action.
    fn undo(&mut self, ctx: &mut ActionContext<'_>) -> Outcome;

    /// Delivers the acknowledgement of `handle`, owned by action `target`.
    fn on_async_result(
        &mut self,
        ctx: &mut ActionContext<'_>,
        target: ActionId,
        handle: Handle,
        result: ControlResult<()>,
    ) -> Outcome;

    /// Reports that the request `handle` owned by `target` expired. The
    /// registry entry has already been removed.
    fn on_timeout(&mut self, ctx: &mut ActionContext<'_>, target: ActionId, handle: Handle)
        -> Outcome;

    /// Forced teardown: releases outstanding handles and leaves the action in
    /// a terminal state.
    fn abort(&mut self, ctx: &mut ActionContext<'_>);
}

impl fmt::Debug for dyn Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions() {
        use ActionStatus::*;
        assert!(NotStarted.can_become(Executing));
        assert!(Executing.can_become(Completed));
        assert!(Executing.can_become(ErrorStopped));
        assert!(Completed.can_become(Undoing));
        assert!(Undoing.can_become(UndoFailed));
        assert!(!Completed.can_become(Executing));
        assert!(!ErrorStopped.can_become(Undoing));
        assert!(!NotStarted.can_become(Completed));
    }

    #[test]
    fn core_rejects_illegal_transition() {
        let mut core = ActionCore::new(ActionId(1), "test");
        assert!(core.begin_undo().is_err());
        assert_eq!(core.status(), ActionStatus::NotStarted);
        assert!(core.begin().is_ok());
        assert!(core.begin().is_err());
        assert_eq!(core.fail(ControlError::Aborted), Outcome::Failed(ControlError::Aborted));
        assert_eq!(core.error(), Some(&ControlError::Aborted));
        // Terminal: completion after failure is ignored.
        assert_eq!(core.complete(), Outcome::Failed(ControlError::Aborted));
        assert_eq!(core.status(), ActionStatus::ErrorStopped);
    }

    #[test]
    fn ids_are_monotonic() {
        let mut ids = ActionIds::default();
        assert_eq!(ids.next(), ActionId(1));
        assert_eq!(ids.next(), ActionId(2));
        assert_eq!(ActionId(7).to_string(), "a7");
    }
}
