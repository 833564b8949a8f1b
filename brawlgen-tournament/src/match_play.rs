//! Match play - multiple games between two agents
//!
//! Level 2 - Phase-level implementation

use std::time::Instant;

use brawlgen_core::{Controller, SimulatorFactory};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::MatchConfig;
use crate::game_runner::{play_game_guarded, GameOutcome};

/// Bookkeeping attached to a match result
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchMeta {
    /// Set when no game completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock duration of the match
    #[serde(default)]
    pub duration_ms: u64,
    /// Games skipped because the simulator panicked
    #[serde(default)]
    pub dropped_games: u32,
    /// The soft match timeout cut the match short
    #[serde(default)]
    pub timed_out: bool,
    /// Swiss bye: no opponent, no games
    #[serde(default)]
    pub bye: bool,
}

/// Result of a match (multiple games)
///
/// Scores are in {0.0, 0.5, 1.0} and sum to 1.0 unless `games_played` is 0.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub a_id: String,
    /// None for a bye
    pub b_id: Option<String>,
    pub a_score: f32,
    pub b_score: f32,
    /// Mean accumulated reward per completed game for side A
    pub a_fitness: f32,
    pub b_fitness: f32,
    pub games_played: u32,
    /// Game wins for side A
    pub a_wins: u32,
    pub b_wins: u32,
    pub ties: u32,
    pub meta: MatchMeta,
}

impl MatchResult {
    /// Bye result: full score, no fitness, no games
    pub fn bye(id: impl Into<String>) -> Self {
        Self {
            a_id: id.into(),
            b_id: None,
            a_score: 1.0,
            b_score: 0.0,
            a_fitness: 0.0,
            b_fitness: 0.0,
            games_played: 0,
            a_wins: 0,
            b_wins: 0,
            ties: 0,
            meta: MatchMeta {
                bye: true,
                ..Default::default()
            },
        }
    }

    /// Error result: zero scores, zero games
    pub fn error(a_id: impl Into<String>, b_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            a_id: a_id.into(),
            b_id: Some(b_id.into()),
            a_score: 0.0,
            b_score: 0.0,
            a_fitness: 0.0,
            b_fitness: 0.0,
            games_played: 0,
            a_wins: 0,
            b_wins: 0,
            ties: 0,
            meta: MatchMeta {
                error: Some(reason.into()),
                ..Default::default()
            },
        }
    }

    pub fn is_bye(&self) -> bool {
        self.meta.bye
    }

    pub fn is_error(&self) -> bool {
        !self.is_bye() && self.games_played == 0
    }

    /// Score earned by `id` in this match
    pub fn score_for(&self, id: &str) -> Option<f32> {
        if self.a_id == id {
            Some(self.a_score)
        } else if self.b_id.as_deref() == Some(id) {
            Some(self.b_score)
        } else {
            None
        }
    }

    /// Mean per-game reward earned by `id` in this match
    pub fn fitness_for(&self, id: &str) -> Option<f32> {
        if self.a_id == id {
            Some(self.a_fitness)
        } else if self.b_id.as_deref() == Some(id) {
            Some(self.b_fitness)
        } else {
            None
        }
    }

    /// Game wins earned by `id` in this match
    pub fn wins_for(&self, id: &str) -> Option<u32> {
        if self.a_id == id {
            Some(self.a_wins)
        } else if self.b_id.as_deref() == Some(id) {
            Some(self.b_wins)
        } else {
            None
        }
    }

    /// The other side of the match, if `id` took part and it was not a bye
    pub fn opponent_of(&self, id: &str) -> Option<&str> {
        if self.a_id == id {
            self.b_id.as_deref()
        } else if self.b_id.as_deref() == Some(id) {
            Some(&self.a_id)
        } else {
            None
        }
    }
}

/// Play a match between two agents (Level 2 phase)
///
/// Side A is always player one. Each game runs on a fresh simulator seeded
/// with `seed + game_index`; a panicking game is dropped and the match
/// continues. The soft timeout is checked after every game.
pub fn run_match(
    a: &dyn Controller,
    b: &dyn Controller,
    factory: &dyn SimulatorFactory,
    config: &MatchConfig,
    seed: u64,
) -> MatchResult {
    let started = Instant::now();
    let timeout = config.timeout();
    let mut outcomes: Vec<GameOutcome> = Vec::with_capacity(config.games_per_match as usize);
    let mut dropped_games = 0u32;
    let mut timed_out = false;

    for game_index in 0..config.games_per_match {
        let game_seed = seed.wrapping_add(game_index as u64);
        match play_game_guarded(factory, game_seed, a, b) {
            Ok(outcome) => outcomes.push(outcome),
            Err(reason) => {
                dropped_games += 1;
                warn!(a = a.id(), b = b.id(), game_index, %reason, "simulator panicked, game dropped");
            }
        }

        let finished = game_index + 1 == config.games_per_match;
        if !finished && timeout.is_some_and(|limit| started.elapsed() > limit) {
            timed_out = true;
            debug!(a = a.id(), b = b.id(), games = outcomes.len(), "match timeout reached");
            break;
        }
    }

    let duration_ms = started.elapsed().as_millis() as u64;
    let mut result = aggregate_outcomes(a.id(), b.id(), &outcomes);
    result.meta.duration_ms = duration_ms;
    result.meta.dropped_games = dropped_games;
    result.meta.timed_out = timed_out;
    debug!(
        a = %result.a_id,
        b = ?result.b_id,
        a_score = result.a_score,
        games = result.games_played,
        "match finished"
    );
    result
}

// ============================================================================
// Level 3 - Steps
// ============================================================================

/// Aggregate game outcomes into a match result
fn aggregate_outcomes(a_id: &str, b_id: &str, outcomes: &[GameOutcome]) -> MatchResult {
    if outcomes.is_empty() {
        return MatchResult::error(a_id, b_id, "no games completed");
    }

    let mut a_wins = 0u32;
    let mut b_wins = 0u32;
    let mut ties = 0u32;
    let mut total_a = 0.0f32;
    let mut total_b = 0.0f32;

    for outcome in outcomes {
        if outcome.a_wins() {
            a_wins += 1;
        } else if outcome.b_wins() {
            b_wins += 1;
        } else {
            ties += 1;
        }
        total_a += outcome.reward_a;
        total_b += outcome.reward_b;
    }

    let (a_score, b_score) = match a_wins.cmp(&b_wins) {
        std::cmp::Ordering::Greater => (1.0, 0.0),
        std::cmp::Ordering::Less => (0.0, 1.0),
        std::cmp::Ordering::Equal => (0.5, 0.5),
    };
    let games = outcomes.len() as u32;

    MatchResult {
        a_id: a_id.to_string(),
        b_id: Some(b_id.to_string()),
        a_score,
        b_score,
        a_fitness: total_a / games as f32,
        b_fitness: total_b / games as f32,
        games_played: games,
        a_wins,
        b_wins,
        ties,
        meta: MatchMeta::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brawlgen_core::{
        Action, ArenaFactory, ConstantController, Side, Simulator, StateVector, StepOutcome,
        Winner,
    };
    use std::sync::atomic::{AtomicU64, Ordering};

    fn quick_arena() -> ArenaFactory {
        ArenaFactory { max_steps: 1200 }
    }

    /// Panics on odd seeds, otherwise a one-frame game won by player one
    struct FlakySim {
        seed: u64,
    }

    impl Simulator for FlakySim {
        fn reset(&mut self) -> StateVector {
            if self.seed % 2 == 1 {
                panic!("flaky reset");
            }
            StateVector::zeros()
        }

        fn step(&mut self, _a1: Action, _a2: Action) -> StepOutcome {
            StepOutcome {
                state: StateVector::zeros(),
                r1: 2.0,
                r2: -2.0,
                done: true,
                winner: Winner::Player1,
            }
        }

        fn state_for(&self, _side: Side) -> StateVector {
            StateVector::zeros()
        }

        fn max_steps(&self) -> u32 {
            5
        }
    }

    #[test]
    fn test_dominant_action_takes_the_match() {
        let a = ConstantController::new("A", Action::Punch);
        let b = ConstantController::new("B", Action::Idle);

        let result = run_match(&a, &b, &quick_arena(), &MatchConfig::new(5), 11);

        assert_eq!(result.a_score, 1.0);
        assert_eq!(result.b_score, 0.0);
        assert_eq!(result.games_played, 5);
        assert_eq!(result.a_wins, 5);
        assert_eq!(result.b_wins, 0);
        assert!(result.a_fitness > result.b_fitness);
        assert_eq!(result.meta.error, None);
    }

    #[test]
    fn test_mirror_match_splits_score() {
        let a = ConstantController::new("A", Action::Idle);
        let b = ConstantController::new("B", Action::Idle);
        let factory = ArenaFactory { max_steps: 30 };

        let result = run_match(&a, &b, &factory, &MatchConfig::new(3), 0);
        assert_eq!(result.a_score, 0.5);
        assert_eq!(result.b_score, 0.5);
        assert_eq!(result.ties, 3);
    }

    #[test]
    fn test_panicking_games_are_dropped() {
        let factory = |seed: u64| -> Box<dyn Simulator> { Box::new(FlakySim { seed }) };
        let a = ConstantController::new("A", Action::Idle);
        let b = ConstantController::new("B", Action::Idle);

        let result = run_match(&a, &b, &factory, &MatchConfig::new(4), 0);
        assert_eq!(result.games_played, 2);
        assert_eq!(result.meta.dropped_games, 2);
        assert_eq!(result.a_score, 1.0);
        assert_eq!(result.a_fitness, 2.0);
    }

    #[test]
    fn test_no_completed_games_is_error_result() {
        let factory = |_seed: u64| -> Box<dyn Simulator> { Box::new(FlakySim { seed: 1 }) };
        let a = ConstantController::new("A", Action::Idle);
        let b = ConstantController::new("B", Action::Idle);

        let result = run_match(&a, &b, &factory, &MatchConfig::new(3), 0);
        assert!(result.is_error());
        assert_eq!(result.a_score + result.b_score, 0.0);
        assert_eq!(result.games_played, 0);
        assert!(result.meta.error.is_some());

        let empty = run_match(&a, &b, &factory, &MatchConfig::new(0), 0);
        assert!(empty.is_error());
    }

    #[test]
    fn test_timeout_checked_at_game_boundary() {
        let a = ConstantController::new("A", Action::Idle);
        let b = ConstantController::new("B", Action::Idle);
        let factory = ArenaFactory { max_steps: 20 };
        let config = MatchConfig::new(10).with_timeout(Some(0.0));

        let result = run_match(&a, &b, &factory, &config, 0);
        assert_eq!(result.games_played, 1);
        assert!(result.meta.timed_out);
    }

    #[test]
    fn test_game_seeds_follow_base_seed() {
        static SEEN: AtomicU64 = AtomicU64::new(0);
        let factory = |seed: u64| -> Box<dyn Simulator> {
            SEEN.fetch_add(seed, Ordering::SeqCst);
            Box::new(FlakySim { seed: 0 })
        };
        let a = ConstantController::new("A", Action::Idle);
        run_match(&a, &a, &factory, &MatchConfig::new(3), 100);
        assert_eq!(SEEN.load(Ordering::SeqCst), 100 + 101 + 102);
    }

    #[test]
    fn test_result_accessors() {
        let bye = MatchResult::bye("solo");
        assert!(bye.is_bye());
        assert!(!bye.is_error());
        assert_eq!(bye.score_for("solo"), Some(1.0));
        assert_eq!(bye.opponent_of("solo"), None);

        let err = MatchResult::error("x", "y", "boom");
        assert_eq!(err.opponent_of("y"), Some("x"));
        assert_eq!(err.score_for("y"), Some(0.0));
        assert_eq!(err.score_for("z"), None);
    }

    #[test]
    fn test_result_json_shape() {
        let json = serde_json::to_value(MatchResult::bye("solo")).expect("serializable");
        assert_eq!(json["a_id"], "solo");
        assert!(json["b_id"].is_null());
        assert_eq!(json["meta"]["bye"], true);
        assert!(json["meta"].get("error").is_none());
    }
}
