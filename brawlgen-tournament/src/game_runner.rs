//! Game runner - executes single games
//!
//! Level 3 - Step-level implementation

use std::panic::{self, AssertUnwindSafe};

use brawlgen_core::{Controller, Side, Simulator, SimulatorFactory, Winner};

/// Outcome of a single game
#[derive(Clone, Debug, PartialEq)]
pub struct GameOutcome {
    /// Terminal winner (tie at the frame cap with equal health)
    pub winner: Winner,
    /// Accumulated reward for player one
    pub reward_a: f32,
    /// Accumulated reward for player two
    pub reward_b: f32,
    /// Frames simulated
    pub steps: u32,
}

impl GameOutcome {
    /// Check if player one won
    pub fn a_wins(&self) -> bool {
        self.winner == Winner::Player1
    }

    /// Check if player two won
    pub fn b_wins(&self) -> bool {
        self.winner == Winner::Player2
    }

    pub fn is_tie(&self) -> bool {
        self.winner == Winner::Tie
    }
}

/// Play one game to completion or the simulator's frame cap
pub fn play_game(sim: &mut dyn Simulator, a: &dyn Controller, b: &dyn Controller) -> GameOutcome {
    sim.reset();
    let max_steps = sim.max_steps();
    let mut reward_a = 0.0f32;
    let mut reward_b = 0.0f32;
    let mut winner = Winner::Tie;
    let mut steps = 0u32;

    while steps < max_steps {
        let action_a = a.act(&sim.state_for(Side::One));
        let action_b = b.act(&sim.state_for(Side::Two));
        let out = sim.step(action_a, action_b);
        steps += 1;
        reward_a += out.r1;
        reward_b += out.r2;
        if out.done {
            winner = out.winner;
            break;
        }
    }

    GameOutcome {
        winner,
        reward_a,
        reward_b,
        steps,
    }
}

/// Play one game on a fresh simulator, swallowing panics.
///
/// Returns the panic message when the simulator (or a controller) panicked;
/// the caller drops that game and moves on.
pub fn play_game_guarded(
    factory: &dyn SimulatorFactory,
    seed: u64,
    a: &dyn Controller,
    b: &dyn Controller,
) -> Result<GameOutcome, String> {
    panic::catch_unwind(AssertUnwindSafe(|| {
        let mut sim = factory.create(seed);
        play_game(sim.as_mut(), a, b)
    }))
    .map_err(|payload| {
        if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use brawlgen_core::{Action, ArenaFactory, ConstantController, StateVector, StepOutcome};

    /// Simulator that panics on its first step
    struct ExplodingSim;

    impl Simulator for ExplodingSim {
        fn reset(&mut self) -> StateVector {
            StateVector::zeros()
        }

        fn step(&mut self, _a1: Action, _a2: Action) -> StepOutcome {
            panic!("engine fault")
        }

        fn state_for(&self, _side: Side) -> StateVector {
            StateVector::zeros()
        }

        fn max_steps(&self) -> u32 {
            10
        }
    }

    #[test]
    fn test_punch_beats_idle() {
        let factory = ArenaFactory { max_steps: 1200 };
        let mut sim = factory.create(1);
        let a = ConstantController::new("a", Action::Punch);
        let b = ConstantController::new("b", Action::Idle);

        let outcome = play_game(sim.as_mut(), &a, &b);
        assert!(outcome.a_wins());
        assert!(outcome.reward_a > 0.0);
        assert!(outcome.reward_b < 0.0);
        assert!(outcome.steps < 1200);
    }

    #[test]
    fn test_idle_game_runs_to_cap() {
        let factory = ArenaFactory { max_steps: 50 };
        let mut sim = factory.create(1);
        let idle = ConstantController::new("idle", Action::Idle);

        let outcome = play_game(sim.as_mut(), &idle, &idle);
        assert!(outcome.is_tie());
        assert_eq!(outcome.steps, 50);
    }

    #[test]
    fn test_guarded_game_catches_panic() {
        let factory = |_seed: u64| -> Box<dyn Simulator> { Box::new(ExplodingSim) };
        let idle = ConstantController::new("idle", Action::Idle);

        let err = play_game_guarded(&factory, 0, &idle, &idle).unwrap_err();
        assert!(err.contains("engine fault"));
    }
}
