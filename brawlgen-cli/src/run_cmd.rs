//! Run command - evolve a population of controllers
//!
//! ## Architecture (4-layer granularity)
//!
//! - Level 1: run() - orchestration
//! - Level 2: build_config(), build_oracle(), run_generations()
//! - Level 3: credential lookup, Ctrl-C wiring, progress reporting
//! - Level 4: formatting utilities

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use brawlgen_evolve::{
    CancelToken, Experiment, ExperimentConfig, GenerationController, GenerationReport, HallOfFame,
    ProposalOracle, RunSummary, SeedLibraryOracle,
};

use crate::anthropic::{first_set, AnthropicConfig, AnthropicOracle, API_KEY_VARS, MODEL_VARS};

// ============================================================================
// COMMAND ARGUMENTS (Level 4 - Configuration)
// ============================================================================

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Agents per generation
    #[arg(long)]
    pub population: Option<usize>,

    /// Number of generations to run
    #[arg(long)]
    pub generations: Option<u32>,

    /// Games per Swiss match
    #[arg(long)]
    pub games_per_match: Option<u32>,

    /// Agents carried unchanged into the next generation
    #[arg(long)]
    pub elite_size: Option<usize>,

    /// Hall of Fame capacity
    #[arg(long)]
    pub hall_of_fame_size: Option<usize>,

    /// Frame cap per game
    #[arg(long)]
    pub max_steps: Option<u32>,

    /// Directory name for this experiment (default: timestamped)
    #[arg(long)]
    pub experiment_name: Option<String>,

    /// Model requested from the proposal oracle
    #[arg(long)]
    pub model: Option<String>,

    /// API key (falls back to ANTHROPIC_API_KEY and its aliases)
    #[arg(long)]
    pub api_key: Option<String>,

    /// Experiment configuration JSON; flags override its values
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Parent directory for experiment directories
    #[arg(long, default_value = "experiments", value_name = "DIR")]
    pub output_dir: PathBuf,

    /// Start from a persisted Hall of Fame manifest
    #[arg(long, value_name = "FILE")]
    pub hall_of_fame: Option<PathBuf>,

    /// Use the built-in seed library instead of a remote model
    #[arg(long)]
    pub offline: bool,

    /// Play matches one at a time
    #[arg(long)]
    pub sequential: bool,

    /// Use the small smoke-test configuration as the base
    #[arg(long)]
    pub quick: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

// ============================================================================
// LEVEL 1 - ORCHESTRATION
// ============================================================================

/// Run an evolution experiment
///
/// 1. Build and validate the configuration
/// 2. Pick the proposal oracle
/// 3. Create the experiment directory
/// 4. Run the generation loop until done, failed or cancelled
pub fn run(args: RunArgs, seed: Option<u64>) -> Result<()> {
    let config = build_config(&args, seed, |var| std::env::var(var).ok())?;
    let oracle = build_oracle(&args, |var| std::env::var(var).ok())?;

    info!(
        "Starting run: pop={}, gen={}, games={}, oracle={}, model={}",
        config.population_size,
        config.generations,
        config.games_per_match,
        oracle.name(),
        config.model
    );

    let experiment = Experiment::create(&args.output_dir, args.experiment_name.as_deref(), &config)
        .with_context(|| format!("Failed to create experiment under {}", args.output_dir.display()))?;
    let hall = load_hall_of_fame(args.hall_of_fame.as_deref(), config.hall_of_fame_size)?;

    let cancel = CancelToken::new();
    install_interrupt_handler(cancel.clone())?;

    let summary = run_generations(config, oracle.as_ref(), experiment, hall, cancel)?;
    print_summary(&summary, &args)
}

// ============================================================================
// LEVEL 2 - PHASES
// ============================================================================

/// Defaults, then the JSON file, then flags, then the environment model
fn build_config(
    args: &RunArgs,
    seed: Option<u64>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ExperimentConfig> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None if args.quick => ExperimentConfig::quick(),
        None => ExperimentConfig::default(),
    };

    if let Some(population) = args.population {
        config.population_size = population;
    }
    if let Some(generations) = args.generations {
        config.generations = generations;
    }
    if let Some(games) = args.games_per_match {
        config.games_per_match = games;
    }
    if let Some(elite) = args.elite_size {
        config.elite_size = elite;
    }
    if let Some(size) = args.hall_of_fame_size {
        config.hall_of_fame_size = size;
    }
    if let Some(steps) = args.max_steps {
        config.max_steps = steps;
    }
    if let Some(seed) = seed {
        config.seed = seed;
    }
    if args.sequential {
        config.parallel = false;
    }
    match &args.model {
        Some(model) => config.model = model.clone(),
        None => {
            if let Some(model) = first_set(&MODEL_VARS, lookup) {
                config.model = model;
            }
        }
    }

    config.validate()?;
    Ok(config)
}

fn build_oracle(
    args: &RunArgs,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Box<dyn ProposalOracle>> {
    if args.offline {
        return Ok(Box::new(SeedLibraryOracle::new(0x5eed)));
    }

    let key = args
        .api_key
        .clone()
        .filter(|key| !key.trim().is_empty())
        .or_else(|| first_set(&API_KEY_VARS, lookup));
    let Some(key) = key else {
        bail!(
            "no API key: pass --api-key, set one of {} or use --offline",
            API_KEY_VARS.join(", ")
        );
    };

    let oracle = AnthropicOracle::new(AnthropicConfig::new(key)).context("Failed to build HTTP client")?;
    Ok(Box::new(oracle))
}

fn run_generations(
    config: ExperimentConfig,
    oracle: &dyn ProposalOracle,
    experiment: Experiment,
    hall: Option<HallOfFame>,
    cancel: CancelToken,
) -> Result<RunSummary> {
    let progress = create_progress_bar(config.generations);
    let mut controller = GenerationController::new(config, oracle, experiment, cancel)?;
    if let Some(hall) = hall {
        controller = controller.with_hall_of_fame(hall);
    }

    let result = controller.run_with_callback(|report| {
        progress.set_message(generation_message(report));
        progress.inc(1);
    });
    progress.finish_and_clear();

    Ok(result?)
}

// ============================================================================
// LEVEL 3 - STEPS
// ============================================================================

fn load_config(path: &Path) -> Result<ExperimentConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse config: {}", path.display()))
}

fn load_hall_of_fame(path: Option<&Path>, capacity: usize) -> Result<Option<HallOfFame>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let hall = HallOfFame::load_with_capacity(path, capacity)
        .with_context(|| format!("Failed to load Hall of Fame: {}", path.display()))?;
    info!("Loaded {} Hall of Fame agents from {}", hall.len(), path.display());
    Ok(Some(hall))
}

/// Cancel the run on the first Ctrl-C
fn install_interrupt_handler(cancel: CancelToken) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start signal runtime")?;
    std::thread::Builder::new()
        .name("interrupt".to_string())
        .spawn(move || {
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, stopping at the next checkpoint");
                    cancel.cancel();
                }
            })
        })
        .context("Failed to spawn signal thread")?;
    Ok(())
}

fn create_progress_bar(generations: u32) -> ProgressBar {
    let bar = ProgressBar::new(generations as u64);
    if let Ok(style) =
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} generations ({msg})")
    {
        bar.set_style(style.progress_chars("=> "));
    }
    bar
}

fn print_summary(summary: &RunSummary, args: &RunArgs) -> Result<()> {
    if args.json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!("\n=== Evolution Complete ===");
    println!("Experiment: {}", summary.experiment_name);
    println!("Generations: {}", summary.generations.len());
    for report in &summary.generations {
        println!("  {}", generation_message(report));
    }
    println!("Hall of Fame size: {}", summary.hall_of_fame_size);
    match (&summary.best_agent, summary.best_fitness) {
        (Some(id), Some(fitness)) => println!("Best agent: {} (fitness {:.3})", id, fitness),
        _ => println!("Best agent: none"),
    }
    println!(
        "Output directory: {}",
        args.output_dir.join(&summary.experiment_name).display()
    );
    Ok(())
}

// ============================================================================
// LEVEL 4 - UTILITIES
// ============================================================================

fn generation_message(report: &GenerationReport) -> String {
    format!(
        "gen {}: best={:.3} avg={:.3} valid={} hof={}",
        report.generation, report.best_fitness, report.avg_fitness, report.valid_agents, report.hall_of_fame_size
    )
}

// ============================================================================
// TESTS
// ============================================================================
