//! Placeholder for a descriptor that could not be built.
//!
//! The error surfaces when the job reaches the action, so the siblings before
//! it still run.

use routing_core::{ActionType, ControlError, ControlResult};

use super::leaf::{LeafStep, Step};
use super::ActionContext;

/// Placeholder for an action that could not be built; fails on execution.
pub struct Reject {
    action: ActionType,
    error: ControlError,
}

impl Reject {
    #[must_use]
    pub fn new(action: ActionType, error: ControlError) -> Self {
        Self { action, error }
    }
}

impl LeafStep for Reject {
    fn name(&self) -> &'static str {
        self.action.as_str()
    }

    fn start(&mut self, _ctx: &mut ActionContext<'_>) -> ControlResult<Step> {
        Err(self.error.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, ActionStatus, LeafAction, Outcome};
    use crate::testing::TestBed;

    #[test]
    fn fails_on_execution_with_stored_error() {
        let mut bed = TestBed::new();
        let error = ControlError::Parameter("volume is unbound".into());
        let mut action = LeafAction::new(
            bed.ids.next(),
            Reject::new(ActionType::SetVolume, error.clone()),
            0,
        );
        assert_eq!(action.status(), ActionStatus::NotStarted);
        assert_eq!(bed.run(|ctx| action.execute(ctx)), Outcome::Failed(error));
        assert_eq!(action.name(), "ACTION_SET_VOLUME");
        assert!(bed.routing.issued().is_empty());
    }
}
