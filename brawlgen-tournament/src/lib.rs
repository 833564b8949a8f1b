//! BRAWLGEN Tournament - Fitness evaluation through match play
//!
//! This crate provides tournament infrastructure:
//! - Match play between two controllers on a simulator
//! - Swiss pairing with byes, strength-of-schedule and rematch avoidance
//! - Fitness blending of peer results with the rule-bot ladder
//!
//! ## Architecture (4-layer granularity)
//!
//! - Level 1: run_swiss (orchestration)
//! - Level 2: Tournament pair/record/rank, run_match, blend_fitness (phases)
//! - Level 3: play_game, aggregation, pairing search (steps)
//! - Level 4: utilities, configuration

mod config;
mod fitness;
mod game_runner;
mod match_play;
mod tournament;

pub use config::{FitnessConfig, MatchConfig, TournamentConfig};
pub use fitness::{blend_fitness, FitnessResult};
pub use game_runner::{play_game, play_game_guarded, GameOutcome};
pub use match_play::{run_match, MatchMeta, MatchResult};
pub use tournament::{
    default_rounds, run_swiss, Standing, StandingSummary, Tournament, TournamentError,
    TournamentResult,
};
