//! Controller trait - anything that picks an action from a state

use crate::action::Action;
use crate::state::StateVector;

/// A per-frame decision maker.
///
/// Implemented by scripted agents (which must never fail: faults map to
/// `Action::Idle`) and by the built-in rule bots.
pub trait Controller: Send + Sync {
    /// Stable identifier used in match results
    fn id(&self) -> &str;

    /// Choose an action for the given mirrored state
    fn act(&self, state: &StateVector) -> Action;
}

/// Controller that always issues the same action
#[derive(Clone, Debug)]
pub struct ConstantController {
    id: String,
    action: Action,
}

impl ConstantController {
    pub fn new(id: impl Into<String>, action: Action) -> Self {
        Self {
            id: id.into(),
            action,
        }
    }
}

impl Controller for ConstantController {
    fn id(&self) -> &str {
        &self.id
    }

    fn act(&self, _state: &StateVector) -> Action {
        self.action
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_controller() {
        let c = ConstantController::new("puncher", Action::Punch);
        assert_eq!(c.id(), "puncher");
        assert_eq!(c.act(&StateVector::zeros()), Action::Punch);
    }
}
