//! BRAWLGEN CLI - Command-line interface
//!
//! Commands:
//! - run: Evolve fighting-game controllers
//! - duel: Play a match between two agents or rule bots
//! - validate: Check an agent file against the admission rules
//! - report: Regenerate an experiment's Markdown report

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use brawlgen_evolve::GenerationError;

mod anthropic;
mod duel_cmd;
mod report_cmd;
mod run_cmd;
mod validate_cmd;

#[derive(Parser)]
#[command(name = "brawlgen")]
#[command(about = "Evolve fighting-game controllers proposed by a language model")]
struct Cli {
    /// Seed for reproducible runs
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an evolution experiment
    Run(run_cmd::RunArgs),
    /// Play a match between two fighters
    Duel(duel_cmd::DuelArgs),
    /// Check an agent file against the admission rules
    Validate(validate_cmd::ValidateArgs),
    /// Regenerate an experiment report
    Report(report_cmd::ReportArgs),
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => run_cmd::run(args, cli.seed),
        Commands::Duel(args) => duel_cmd::run(args, cli.seed),
        Commands::Validate(args) => validate_cmd::run(args),
        Commands::Report(args) => report_cmd::run(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = exit_code(&err);
            if code == 130 {
                tracing::warn!("{:#}", err);
            } else {
                eprintln!("Error: {:#}", err);
            }
            ExitCode::from(code)
        }
    }
}

/// 130 for cancellation, 1 for everything else
fn exit_code(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<GenerationError>())
        .map_or(1, GenerationError::exit_code)
}
