//! Simulator adapter contract
//!
//! The scheduler only needs `reset`, `step` and mirrored per-player views.
//! Any engine that satisfies the contract can sit behind `Simulator`.

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::state::StateVector;

/// Frame cap per game
pub const DEFAULT_MAX_STEPS: u32 = 3600;

/// Player slot in a match
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    One,
    Two,
}

impl Side {
    /// Array index of the slot
    pub fn index(self) -> usize {
        match self {
            Side::One => 0,
            Side::Two => 1,
        }
    }

    pub fn other(self) -> Self {
        match self {
            Side::One => Side::Two,
            Side::Two => Side::One,
        }
    }
}

/// Game winner at a terminal step
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Winner {
    #[default]
    Tie,
    Player1,
    Player2,
}

impl Winner {
    /// Wire code: 0 tie, 1 player one, 2 player two
    pub fn code(self) -> u8 {
        match self {
            Winner::Tie => 0,
            Winner::Player1 => 1,
            Winner::Player2 => 2,
        }
    }

    /// Winner from the two health totals
    pub fn from_health(h1: f32, h2: f32) -> Self {
        if h1 > h2 {
            Winner::Player1
        } else if h2 > h1 {
            Winner::Player2
        } else {
            Winner::Tie
        }
    }
}

/// Result of advancing the simulator by one frame
#[derive(Clone, Debug)]
pub struct StepOutcome {
    /// Player-one view after the step
    pub state: StateVector,
    /// Reward for player one
    pub r1: f32,
    /// Reward for player two
    pub r2: f32,
    /// True when the game is over
    pub done: bool,
    /// Meaningful only when `done`
    pub winner: Winner,
}

/// Deterministic two-player match simulator
///
/// For identical seed and action stream the outputs must be bit-identical.
pub trait Simulator: Send {
    /// Start a new game and return the player-one view
    fn reset(&mut self) -> StateVector;

    /// Advance one frame with both players' actions
    fn step(&mut self, a1: Action, a2: Action) -> StepOutcome;

    /// Mirrored view for a player (that player canonically on the left)
    fn state_for(&self, side: Side) -> StateVector;

    /// Frame cap for one game
    fn max_steps(&self) -> u32;
}

/// Creates simulators; one instance per match worker
pub trait SimulatorFactory: Send + Sync {
    fn create(&self, seed: u64) -> Box<dyn Simulator>;
}

impl<F> SimulatorFactory for F
where
    F: Fn(u64) -> Box<dyn Simulator> + Send + Sync,
{
    fn create(&self, seed: u64) -> Box<dyn Simulator> {
        self(seed)
    }
}
