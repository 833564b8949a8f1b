//! BRAWLGEN Evolution - LLM-driven evolution of fighting-game controllers
//!
//! This crate provides the evolutionary scheduler:
//! - Experiment configuration
//! - Prompt assembly and proposal oracles (variation happens in the oracle)
//! - Selection (tournament, elitism)
//! - The bounded Hall of Fame and the agent source file format
//! - Experiment bookkeeping and persistence
//! - The generation controller tying host, tournament and blender together
//!
//! ## Architecture (4-layer granularity)
//!
//! - Level 1: GenerationController::run (orchestration)
//! - Level 2: seed/breed, evaluate, admit, persist; HallOfFame; Experiment
//! - Level 3: slot proposal and admission, elite promotion, record rendering
//! - Level 4: configuration, naming, file primitives

pub mod archive;
pub mod cancel;
pub mod config;
pub mod controller;
pub mod error;
pub mod experiment;
pub mod hall_of_fame;
pub mod naming;
pub mod oracle;
pub mod population;
pub mod prompts;
pub mod record;
pub mod selection;

pub use cancel::CancelToken;
pub use config::{ExperimentConfig, DEFAULT_MODEL};
pub use controller::{GenerationController, GenerationReport, RunSummary};
pub use error::{ConfigError, GenerationError, OracleError, PersistenceError};
pub use experiment::{EvolutionSummary, Experiment, GenerationSummary};
pub use hall_of_fame::{HallOfFame, HofStats};
pub use naming::{agent_id, digest_name};
pub use oracle::{extract_code_block, ProposalOracle, SeedLibraryOracle};
pub use population::Origin;
pub use prompts::DEFAULT_STYLES;
pub use record::{agent_body, verify_agent_file, AgentMeta, AgentRecord, TournamentStats};
pub use selection::{select_elite, select_parents, tournament_select};
