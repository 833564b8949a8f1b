//! Duel command - play a match between two controllers
//!
//! ## Architecture (4-layer granularity)
//!
//! - Level 1: run() - orchestration
//! - Level 2: load_fighter(), run_match(), report_results()
//! - Level 3: bot lookup, agent file admission
//! - Level 4: output formatting

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use brawlgen_core::{ArenaFactory, Controller, Difficulty, RuleBot, DEFAULT_MAX_STEPS};
use brawlgen_evolve::{agent_body, AgentRecord};
use brawlgen_host::{AgentHandle, AgentStats, HostConfig};
use brawlgen_tournament::{run_match, MatchConfig, MatchResult};

// ============================================================================
// COMMAND ARGUMENTS (Level 4 - Configuration)
// ============================================================================

#[derive(Args, Debug)]
pub struct DuelArgs {
    /// First fighter: an agent file, or easy/medium/hard for a rule bot
    #[arg(long, value_name = "FILE")]
    pub a: String,

    /// Second fighter: an agent file, or easy/medium/hard for a rule bot
    #[arg(long, value_name = "FILE")]
    pub b: String,

    /// Number of games
    #[arg(long, default_value = "3")]
    pub games: u32,

    /// Frame cap per game
    #[arg(long, default_value_t = DEFAULT_MAX_STEPS)]
    pub max_steps: u32,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

/// A loaded fighter and, for scripted agents, its handle for host stats
enum Fighter {
    Bot(RuleBot),
    Agent(AgentHandle),
}

impl Fighter {
    fn controller(&self) -> &dyn Controller {
        match self {
            Fighter::Bot(bot) => bot,
            Fighter::Agent(handle) => handle,
        }
    }

    fn stats(&self) -> Option<AgentStats> {
        match self {
            Fighter::Bot(_) => None,
            Fighter::Agent(handle) => Some(handle.stats()),
        }
    }
}

#[derive(Serialize)]
struct DuelReport<'a> {
    result: &'a MatchResult,
    seed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    a_host: Option<AgentStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    b_host: Option<AgentStats>,
}

// ============================================================================
// LEVEL 1 - ORCHESTRATION
// ============================================================================

/// Run a duel
///
/// 1. Load both fighters (admitting agent files through the host)
/// 2. Play the match on the reference arena
/// 3. Report
pub fn run(args: DuelArgs, seed: Option<u64>) -> Result<()> {
    let host = HostConfig::default();
    let a = load_fighter(&args.a, "a", &host)?;
    let b = load_fighter(&args.b, "b", &host)?;

    let seed = seed.unwrap_or_else(|| ChaCha8Rng::from_entropy().gen());
    tracing::info!("Duel: {} vs {} ({} games, seed {})", a.controller().id(), b.controller().id(), args.games, seed);

    let factory = ArenaFactory {
        max_steps: args.max_steps,
    };
    let config = MatchConfig::new(args.games).with_timeout(None);
    let result = run_match(a.controller(), b.controller(), &factory, &config, seed);

    report_results(&result, &a, &b, seed, &args)
}

// ============================================================================
// LEVEL 2 - PHASES
// ============================================================================

fn load_fighter(spec: &str, fallback_id: &str, host: &HostConfig) -> Result<Fighter> {
    if let Some(difficulty) = parse_difficulty(spec) {
        return Ok(Fighter::Bot(RuleBot::new(difficulty)));
    }
    let handle = admit_file(Path::new(spec), fallback_id, host)?;
    Ok(Fighter::Agent(handle))
}

fn report_results(result: &MatchResult, a: &Fighter, b: &Fighter, seed: u64, args: &DuelArgs) -> Result<()> {
    if args.json {
        let report = DuelReport {
            result,
            seed,
            a_host: a.stats(),
            b_host: b.stats(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let b_id = result.b_id.as_deref().unwrap_or("-");
    println!("\n=== Duel Results ===");
    println!("Games played: {}", result.games_played);
    println!("{}: {} wins, score {:.1}, mean reward {:.2}", result.a_id, result.a_wins, result.a_score, result.a_fitness);
    println!("{}: {} wins, score {:.1}, mean reward {:.2}", b_id, result.b_wins, result.b_score, result.b_fitness);
    println!("Ties: {}", result.ties);
    if let Some(error) = &result.meta.error {
        println!("Error: {}", error);
    }
    for (id, stats) in [(result.a_id.as_str(), a.stats()), (b_id, b.stats())] {
        if let Some(stats) = stats {
            println!(
                "Host {}: {} calls, {} errors, {} timeouts, {:?}",
                id, stats.call_count, stats.error_count, stats.timeout_count, stats.status
            );
        }
    }
    Ok(())
}

// ============================================================================
// LEVEL 3 - STEPS
// ============================================================================

/// Admit an agent file; persisted agents use their stored id
pub(crate) fn admit_file(path: &Path, fallback_id: &str, host: &HostConfig) -> Result<AgentHandle> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read agent: {}", path.display()))?;
    let id = match AgentRecord::from_agent_file(&text) {
        Ok(record) => record.meta.id,
        Err(_) => agent_id_for(path, fallback_id),
    };
    AgentHandle::admit(id, agent_body(&text), host)
        .with_context(|| format!("Agent rejected: {}", path.display()))
}

fn agent_id_for(path: &Path, fallback: &str) -> String {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| fallback.to_string())
}

// ============================================================================
// LEVEL 4 - UTILITIES
// ============================================================================

fn parse_difficulty(spec: &str) -> Option<Difficulty> {
    match spec {
        "easy" => Some(Difficulty::Easy),
        "medium" => Some(Difficulty::Medium),
        "hard" => Some(Difficulty::Hard),
        _ => None,
    }
}

// ============================================================================
// TESTS
// ============================================================================
