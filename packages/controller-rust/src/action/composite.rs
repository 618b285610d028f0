//! Composite actions: an ordered list of child actions run sequentially or
//! as a fork.
//!
//! A composite halts at the first failed child and launches nothing further.
//! With the undo flag set it then undoes its completed children in reverse
//! launch order and ends `ErrorStopped` with the first child's error. A fork
//! waits for children already in flight before it unwinds.

use routing_core::{ControlError, ControlResult, Handle};
use tracing::warn;

use super::{Action, ActionContext, ActionCore, ActionId, ActionStatus, Outcome};

/// How a composite runs its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// One child at a time, in order.
    Sequential,
    /// Every child launched in order without waiting; done when all are.
    Fork,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Forward,
    /// Rolling back after a failed child.
    Unwinding,
    /// Explicit undo of a completed composite.
    Undoing,
}

/// An ordered group of child actions run sequentially or as a fork.
///
/// A failed child rolls back the completed siblings that asked for undo.
pub struct CompositeAction {
    core: ActionCore,
    mode: Mode,
    children: Vec<Box<dyn Action>>,
    phase: Phase,
    next: usize,
    in_flight: Vec<usize>,
    first_error: Option<ControlError>,
    /// Children still to undo, next one last.
    undo_queue: Vec<usize>,
    undo_error: Option<ControlError>,
}

impl CompositeAction {
    #[must_use]
    pub fn new(
        id: ActionId,
        name: impl Into<String>,
        mode: Mode,
        children: Vec<Box<dyn Action>>,
    ) -> Self {
        Self {
            core: ActionCore::new(id, name),
            mode,
            children,
            phase: Phase::Forward,
            next: 0,
            in_flight: Vec::new(),
            first_error: None,
            undo_queue: Vec::new(),
            undo_error: None,
        }
    }

    /// Runs `children` one after another.
    #[must_use]
    pub fn sequential(id: ActionId, name: impl Into<String>, children: Vec<Box<dyn Action>>) -> Self {
        Self::new(id, name, Mode::Sequential, children)
    }

    /// Launches every child at once, in order.
    #[must_use]
    pub fn fork(id: ActionId, name: impl Into<String>, children: Vec<Box<dyn Action>>) -> Self {
        Self::new(id, name, Mode::Fork, children)
    }

    /// Appends a child. Only meaningful before the composite is executed.
    pub fn push(&mut self, child: Box<dyn Action>) {
        self.children.push(child);
    }

    #[must_use]
    pub fn children(&self) -> &[Box<dyn Action>] {
        &self.children
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Launches children until one waits (sequential), all are launched
    /// (fork), or one fails.
    fn advance(&mut self, ctx: &mut ActionContext<'_>) -> Outcome {
        loop {
            if self.first_error.is_some() {
                if !self.in_flight.is_empty() {
                    return Outcome::Waiting;
                }
                return self.finish_failure(ctx);
            }
            if self.next == self.children.len() {
                if self.in_flight.is_empty() {
                    return self.core.complete();
                }
                return Outcome::Waiting;
            }
            if self.mode == Mode::Sequential && !self.in_flight.is_empty() {
                return Outcome::Waiting;
            }
            let index = self.next;
            self.next += 1;
            match self.children[index].execute(ctx) {
                Outcome::Done => {}
                Outcome::Waiting => self.in_flight.push(index),
                Outcome::Failed(err) => self.first_error = Some(err),
            }
        }
    }

    fn finish_failure(&mut self, ctx: &mut ActionContext<'_>) -> Outcome {
        if !self.core.undo_required() {
            return self.fail_with_first_error();
        }
        self.phase = Phase::Unwinding;
        self.undo_queue = self.completed_children();
        self.unwind(ctx)
    }

    fn fail_with_first_error(&mut self) -> Outcome {
        let error = self.first_error.clone().unwrap_or(ControlError::Aborted);
        self.core.fail(error)
    }

    /// Indices of completed children; popping yields reverse launch order.
    fn completed_children(&self) -> Vec<usize> {
        (0..self.next)
            .filter(|&i| self.children[i].status() == ActionStatus::Completed)
            .collect()
    }

    /// Undoes queued children one at a time. Undo failures are logged and the
    /// walk continues.
    fn unwind(&mut self, ctx: &mut ActionContext<'_>) -> Outcome {
        while let Some(&index) = self.undo_queue.last() {
            match self.children[index].undo(ctx) {
                Outcome::Waiting => return Outcome::Waiting,
                Outcome::Done => {}
                Outcome::Failed(err) => self.record_undo_failure(index, err),
            }
            self.undo_queue.pop();
        }
        match self.phase {
            Phase::Unwinding => self.fail_with_first_error(),
            Phase::Undoing => match self.undo_error.clone() {
                Some(err) => self.core.undo_failed(err),
                None => self.core.undo_complete(),
            },
            Phase::Forward => self.core.current_outcome(),
        }
    }

    fn record_undo_failure(&mut self, index: usize, err: ControlError) {
        warn!(
            composite = %self.core.name,
            child = %self.children[index].name(),
            %err,
            "child undo failed, continuing"
        );
        self.undo_error.get_or_insert(err);
    }

    fn on_child_outcome(&mut self, ctx: &mut ActionContext<'_>, index: usize, outcome: Outcome) -> Outcome {
        if outcome == Outcome::Waiting {
            return Outcome::Waiting;
        }
        match self.phase {
            Phase::Forward => {
                self.in_flight.retain(|&i| i != index);
                if let Outcome::Failed(err) = outcome {
                    self.first_error.get_or_insert(err);
                }
                self.advance(ctx)
            }
            Phase::Unwinding | Phase::Undoing => {
                if self.undo_queue.last() == Some(&index) {
                    self.undo_queue.pop();
                }
                if let Outcome::Failed(err) = outcome {
                    self.record_undo_failure(index, err);
                }
                self.unwind(ctx)
            }
        }
    }

    fn child_for(&self, target: ActionId) -> Option<usize> {
        self.children.iter().position(|c| c.contains(target))
    }
}

impl Action for CompositeAction {
    fn core(&self) -> &ActionCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ActionCore {
        &mut self.core
    }

    fn set_undo_required(&mut self, undo: bool) {
        self.core.set_undo_required(undo);
        for child in &mut self.children {
            child.set_undo_required(undo);
        }
    }

    fn contains(&self, id: ActionId) -> bool {
        self.core.id == id || self.children.iter().any(|c| c.contains(id))
    }

    fn execute(&mut self, ctx: &mut ActionContext<'_>) -> Outcome {
        if let Err(outcome) = self.core.begin() {
            return outcome;
        }
        if self.core.undo_required() {
            self.set_undo_required(true);
        }
        self.advance(ctx)
    }

    fn undo(&mut self, ctx: &mut ActionContext<'_>) -> Outcome {
        if let Err(outcome) = self.core.begin_undo() {
            return outcome;
        }
        self.phase = Phase::Undoing;
        self.undo_queue = self.completed_children();
        self.unwind(ctx)
    }

    fn on_async_result(
        &mut self,
        ctx: &mut ActionContext<'_>,
        target: ActionId,
        handle: Handle,
        result: ControlResult<()>,
    ) -> Outcome {
        let Some(index) = self.child_for(target) else {
            return self.core.current_outcome();
        };
        let outcome = self.children[index].on_async_result(ctx, target, handle, result);
        self.on_child_outcome(ctx, index, outcome)
    }

    fn on_timeout(
        &mut self,
        ctx: &mut ActionContext<'_>,
        target: ActionId,
        handle: Handle,
    ) -> Outcome {
        let Some(index) = self.child_for(target) else {
            return self.core.current_outcome();
        };
        let outcome = self.children[index].on_timeout(ctx, target, handle);
        self.on_child_outcome(ctx, index, outcome)
    }

    fn abort(&mut self, ctx: &mut ActionContext<'_>) {
        let mut active: Vec<usize> = self.in_flight.drain(..).collect();
        if let Some(&index) = self.undo_queue.last() {
            active.push(index);
        }
        self.undo_queue.clear();
        for index in active {
            self.children[index].abort(ctx);
        }
        match self.core.status() {
            ActionStatus::Executing => {
                let error = self.first_error.clone().unwrap_or(ControlError::Aborted);
                self.core.fail(error);
            }
            ActionStatus::Undoing => {
                self.core.undo_failed(ControlError::Aborted);
            }
            _ => {}
        }
    }
}
