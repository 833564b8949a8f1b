//! Configuration types for match and tournament play
//!
//! Level 4 - Utilities and configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-match settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Games played between the two sides
    pub games_per_match: u32,
    /// Soft wall-clock budget, checked at game boundaries (None = unbounded)
    pub per_match_timeout_s: Option<f64>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            games_per_match: 5,
            per_match_timeout_s: Some(120.0),
        }
    }
}

impl MatchConfig {
    /// Create config with specified games per match
    pub fn new(games_per_match: u32) -> Self {
        Self {
            games_per_match,
            ..Default::default()
        }
    }

    /// Set the soft match timeout
    pub fn with_timeout(mut self, seconds: Option<f64>) -> Self {
        self.per_match_timeout_s = seconds;
        self
    }

    /// Timeout as a duration; negative or NaN values count as zero
    pub fn timeout(&self) -> Option<Duration> {
        self.per_match_timeout_s
            .map(|s| Duration::from_secs_f64(if s.is_finite() && s > 0.0 { s } else { 0.0 }))
    }
}

/// Swiss tournament configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TournamentConfig {
    /// Settings for every match in the tournament
    pub match_config: MatchConfig,
    /// Fixed round count; None means ceil(log2 n), minimum 1
    pub rounds: Option<u32>,
    /// Whether to run a round's matches in parallel
    pub parallel: bool,
    /// Seed for the round-one shuffle and simulator seeds
    pub seed: u64,
}

impl Default for TournamentConfig {
    fn default() -> Self {
        Self {
            match_config: MatchConfig::default(),
            rounds: None,
            parallel: true,
            seed: 42,
        }
    }
}

impl TournamentConfig {
    /// Create Swiss config with a given match length
    pub fn swiss(games_per_match: u32) -> Self {
        Self {
            match_config: MatchConfig::new(games_per_match),
            ..Default::default()
        }
    }

    /// Force a round count
    pub fn with_rounds(mut self, rounds: u32) -> Self {
        self.rounds = Some(rounds);
        self
    }

    /// Set random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Configuration for the fitness blender
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitnessConfig {
    /// Weight of the mean tournament fitness
    pub tournament_weight: f32,
    /// Weight of the mean ladder fitness
    pub ladder_weight: f32,
    /// Upper bound on K, the number of agents that face the full ladder
    pub ladder_top_k: usize,
    /// Settings for ladder matches
    pub match_config: MatchConfig,
    /// Whether to run ladder matches in parallel
    pub parallel: bool,
    pub seed: u64,
}

impl Default for FitnessConfig {
    fn default() -> Self {
        Self {
            tournament_weight: 0.3,
            ladder_weight: 0.7,
            ladder_top_k: 10,
            match_config: MatchConfig::default(),
            parallel: true,
            seed: 7,
        }
    }
}

impl FitnessConfig {
    /// K = min(n / 2, ladder_top_k)
    pub fn top_k(&self, population: usize) -> usize {
        (population / 2).min(self.ladder_top_k)
    }
}
