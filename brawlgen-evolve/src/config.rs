//! Experiment configuration
//!
//! Level 4 - Utilities and configuration
//!
//! One flat struct carries every tunable of an experiment. It is what gets
//! written to `config.json`, and it derives the narrower configs the host,
//! tournament and fitness blender consume.

use brawlgen_core::ArenaFactory;
use brawlgen_host::HostConfig;
use brawlgen_tournament::{FitnessConfig, MatchConfig, TournamentConfig};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::prompts::DEFAULT_STYLES;

/// Default model requested from the proposal oracle
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";

/// Evolution experiment configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub population_size: usize,
    pub generations: u32,
    pub games_per_match: u32,
    /// Top agents carried unchanged into the next generation
    pub elite_size: usize,
    /// Individuals sampled per parent-selection tournament
    pub tournament_size: usize,
    /// Probability a bred slot uses two parents instead of one
    pub crossover_probability: f64,
    /// Swiss rounds; None means ceil(log2 n)
    pub swiss_rounds: Option<u32>,
    pub act_timeout_ms: u64,
    pub act_fuel: u64,
    /// Soft per-match budget in seconds; None disables it
    pub per_match_timeout_s: Option<f64>,
    /// Frame cap per game
    pub max_steps: u32,
    pub max_errors: u32,
    pub max_timeouts: u32,
    pub max_lines: usize,
    pub max_chars: usize,
    pub hall_of_fame_size: usize,
    pub tournament_weight: f32,
    pub ladder_weight: f32,
    pub ladder_top_k: usize,
    /// Style tags handed out round-robin to seed slots
    pub styles: Vec<String>,
    /// Bred children keep their first parent's style
    pub inherit_style: bool,
    pub model: String,
    pub max_tokens: u32,
    pub seed: u64,
    /// Run matches on the rayon pool
    pub parallel: bool,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            population_size: 10,
            generations: 5,
            games_per_match: 3,
            elite_size: 2,
            tournament_size: 3,
            crossover_probability: 2.0 / 3.0,
            swiss_rounds: None,
            act_timeout_ms: 20,
            act_fuel: 200_000,
            per_match_timeout_s: Some(120.0),
            max_steps: brawlgen_core::DEFAULT_MAX_STEPS,
            max_errors: 20,
            max_timeouts: 10,
            max_lines: 1400,
            max_chars: 40_000,
            hall_of_fame_size: 100,
            tournament_weight: 0.3,
            ladder_weight: 0.7,
            ladder_top_k: 10,
            styles: DEFAULT_STYLES.iter().map(|s| s.to_string()).collect(),
            inherit_style: true,
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 4096,
            seed: 42,
            parallel: true,
        }
    }
}

impl ExperimentConfig {
    /// Small configuration for tests
    pub fn quick() -> Self {
        Self {
            population_size: 4,
            generations: 2,
            games_per_match: 1,
            elite_size: 1,
            max_steps: 600,
            hall_of_fame_size: 10,
            ..Default::default()
        }
    }

    /// Reject configurations the generation loop cannot run
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population_size == 0 {
            return Err(ConfigError::new("population_size must be at least 1"));
        }
        if self.generations == 0 {
            return Err(ConfigError::new("generations must be at least 1"));
        }
        if self.games_per_match == 0 {
            return Err(ConfigError::new("games_per_match must be at least 1"));
        }
        if self.elite_size > self.population_size {
            return Err(ConfigError::new(format!(
                "elite_size ({}) exceeds population_size ({})",
                self.elite_size, self.population_size
            )));
        }
        if !(0.0..=1.0).contains(&self.crossover_probability) {
            return Err(ConfigError::new("crossover_probability must lie in [0, 1]"));
        }
        if self.tournament_weight < 0.0 || self.ladder_weight < 0.0 {
            return Err(ConfigError::new("blend weights must be non-negative"));
        }
        if self.hall_of_fame_size == 0 {
            return Err(ConfigError::new("hall_of_fame_size must be at least 1"));
        }
        if self.styles.is_empty() {
            return Err(ConfigError::new("at least one style is required"));
        }
        if self.max_steps == 0 {
            return Err(ConfigError::new("max_steps must be at least 1"));
        }
        Ok(())
    }

    /// Total proposal attempts allowed per generation
    pub fn attempt_budget(&self) -> usize {
        3 * self.population_size
    }

    /// Valid handles a generation needs to proceed (at least half the population)
    pub fn required_valid(&self) -> usize {
        self.population_size.div_ceil(2)
    }

    /// Style for a seed slot, round-robin over the style list
    pub fn style_for_slot(&self, slot: usize) -> &str {
        if self.styles.is_empty() {
            return DEFAULT_STYLES[slot % DEFAULT_STYLES.len()];
        }
        &self.styles[slot % self.styles.len()]
    }

    // ========================================================================
    // DERIVED CONFIGS
    // ========================================================================

    pub fn host_config(&self) -> HostConfig {
        HostConfig {
            max_lines: self.max_lines,
            max_chars: self.max_chars,
            act_timeout_ms: self.act_timeout_ms,
            act_fuel: self.act_fuel,
            max_errors: self.max_errors,
            max_timeouts: self.max_timeouts,
            ..HostConfig::default()
        }
    }

    pub fn match_config(&self) -> MatchConfig {
        MatchConfig::new(self.games_per_match).with_timeout(self.per_match_timeout_s)
    }

    /// Swiss settings for one generation (seed varies per generation)
    pub fn tournament_config(&self, generation: u32) -> TournamentConfig {
        TournamentConfig {
            match_config: self.match_config(),
            rounds: self.swiss_rounds,
            parallel: self.parallel,
            seed: generation_seed(self.seed, generation, 0x5157),
        }
    }

    /// Blender settings for one generation
    pub fn fitness_config(&self, generation: u32) -> FitnessConfig {
        FitnessConfig {
            tournament_weight: self.tournament_weight,
            ladder_weight: self.ladder_weight,
            ladder_top_k: self.ladder_top_k,
            match_config: self.match_config(),
            parallel: self.parallel,
            seed: generation_seed(self.seed, generation, 0x1add),
        }
    }

    pub fn arena_factory(&self) -> ArenaFactory {
        ArenaFactory {
            max_steps: self.max_steps,
        }
    }
}

fn generation_seed(base: u64, generation: u32, salt: u64) -> u64 {
    base.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add((generation as u64) << 32)
        .wrapping_add(salt)
}
