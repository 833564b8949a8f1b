//! Rule-based ladder opponents
//!
//! Deterministic bots used as fixed anchors when blending fitness. They read
//! the same mirrored state vector scripted agents see.

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::arena::{ARENA_WIDTH, KICK, PUNCH};
use crate::controller::Controller;
use crate::state::{self, StateVector};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Normalized distance within which a punch connects
const PUNCH_REACH: f32 = PUNCH.range / ARENA_WIDTH;

/// Normalized distance within which a kick connects
const KICK_REACH: f32 = KICK.range / ARENA_WIDTH;

/// Beyond this distance the hard bot prefers to shoot
const ZONING_DISTANCE: f32 = 0.3;

/// Ladder difficulty
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// The fixed three-step ladder, easiest first
    pub const LADDER: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    pub fn name(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

/// Deterministic scripted opponent
#[derive(Clone, Debug)]
pub struct RuleBot {
    id: String,
    difficulty: Difficulty,
}

impl RuleBot {
    pub fn new(difficulty: Difficulty) -> Self {
        Self {
            id: format!("rulebot-{}", difficulty.name()),
            difficulty,
        }
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    /// Build the full ladder
    pub fn ladder() -> Vec<RuleBot> {
        Difficulty::LADDER.iter().map(|&d| RuleBot::new(d)).collect()
    }

    fn easy(s: &StateVector) -> Action {
        let dist = s.distance();
        if dist <= PUNCH_REACH && s.own(state::F_PUNCH_CD) == 0.0 {
            Action::Punch
        } else if dist > PUNCH_REACH * 0.9 {
            Action::MoveRight
        } else {
            Action::Idle
        }
    }

    fn medium(s: &StateVector) -> Action {
        let dist = s.distance();
        let punch_ready = s.own(state::F_PUNCH_CD) == 0.0;
        let kick_ready = s.own(state::F_KICK_CD) == 0.0;

        if dist <= KICK_REACH && kick_ready {
            Action::Kick
        } else if dist <= PUNCH_REACH && punch_ready {
            Action::Punch
        } else if dist <= PUNCH_REACH && s.opponent(state::F_PUNCH_CD) == 0.0 {
            Action::Block
        } else if dist > PUNCH_REACH {
            Action::MoveRight
        } else {
            Action::Idle
        }
    }

    fn hard(s: &StateVector) -> Action {
        let dist = s.distance();
        let punch_ready = s.own(state::F_PUNCH_CD) == 0.0;
        let kick_ready = s.own(state::F_KICK_CD) == 0.0;
        let can_shoot = s.own(state::F_CHARGE) >= 1.0 && s.own(state::F_PROJECTILE_CD) == 0.0;

        // A freshly fired enemy projectile is in flight
        if s.opponent(state::F_PROJECTILE_CD) > 0.9 && dist > KICK_REACH {
            return Action::Jump;
        }
        if dist > ZONING_DISTANCE && can_shoot {
            return Action::Projectile;
        }
        if s.health_advantage() < -0.2 && dist <= KICK_REACH && !kick_ready && !punch_ready {
            return Action::MoveLeftBlock;
        }
        if dist <= KICK_REACH && kick_ready {
            return Action::Kick;
        }
        if dist <= PUNCH_REACH && punch_ready {
            return Action::Punch;
        }
        if s.opponent(state::F_Y) > 0.1 && dist <= KICK_REACH {
            return Action::Block;
        }
        if dist > PUNCH_REACH {
            Action::MoveRightBlock
        } else {
            Action::Block
        }
    }
}

impl Controller for RuleBot {
    fn id(&self) -> &str {
        &self.id
    }

    fn act(&self, state: &StateVector) -> Action {
        match self.difficulty {
            Difficulty::Easy => Self::easy(state),
            Difficulty::Medium => Self::medium(state),
            Difficulty::Hard => Self::hard(state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::simulator::{Side, Simulator, Winner};

    fn duel(a: &dyn Controller, b: &dyn Controller, seed: u64) -> Winner {
        let mut arena = Arena::with_max_steps(seed, 1200);
        arena.reset();
        loop {
            let a1 = a.act(&arena.state_for(Side::One));
            let a2 = b.act(&arena.state_for(Side::Two));
            let out = arena.step(a1, a2);
            if out.done {
                return out.winner;
            }
        }
    }

    #[test]
    fn test_ladder_order() {
        let ladder = RuleBot::ladder();
        assert_eq!(ladder.len(), 3);
        assert_eq!(ladder[0].difficulty(), Difficulty::Easy);
        assert_eq!(ladder[2].id(), "rulebot-hard");
    }

    #[test]
    fn test_easy_punches_in_range() {
        let mut values = [0.0; state::STATE_LEN];
        values[state::REL_DISTANCE] = PUNCH_REACH / 2.0;
        assert_eq!(RuleBot::new(Difficulty::Easy).act(&StateVector(values)), Action::Punch);
    }

    #[test]
    fn test_easy_approaches_from_afar() {
        let mut values = [0.0; state::STATE_LEN];
        values[state::REL_DISTANCE] = 0.5;
        assert_eq!(RuleBot::new(Difficulty::Easy).act(&StateVector(values)), Action::MoveRight);
    }

    #[test]
    fn test_bots_beat_idle() {
        let idle = crate::controller::ConstantController::new("idle", Action::Idle);
        for bot in RuleBot::ladder() {
            assert_eq!(duel(&bot, &idle, 4), Winner::Player1, "{} should beat idle", bot.id());
        }
    }

    #[test]
    fn test_bots_are_deterministic() {
        let hard = RuleBot::new(Difficulty::Hard);
        let medium = RuleBot::new(Difficulty::Medium);
        assert_eq!(duel(&hard, &medium, 9), duel(&hard, &medium, 9));
    }
}
