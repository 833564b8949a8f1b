//! Report command - regenerate the Markdown report of an experiment

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use brawlgen_evolve::archive::HALL_OF_FAME_FILE;
use brawlgen_evolve::experiment::render_report;
use brawlgen_evolve::{Experiment, HallOfFame};

#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Experiment directory
    #[arg(long, value_name = "DIR")]
    pub experiment: PathBuf,

    /// Also print the report to stdout
    #[arg(long)]
    pub print: bool,
}

pub fn run(args: ReportArgs) -> Result<()> {
    let experiment = Experiment::open(&args.experiment)
        .with_context(|| format!("Failed to open experiment: {}", args.experiment.display()))?;
    let hall = load_hall(&experiment)?;

    let path = experiment
        .write_report(&hall)
        .context("Failed to write report")?;
    tracing::info!("Report written to {}", path.display());

    if args.print {
        print!("{}", render_report(experiment.summary(), &hall));
    } else {
        println!("{}", path.display());
    }
    Ok(())
}

/// Persisted Hall of Fame, or an empty one if none was written yet
fn load_hall(experiment: &Experiment) -> Result<HallOfFame> {
    let path = experiment.root().join(HALL_OF_FAME_FILE);
    if !path.exists() {
        return Ok(HallOfFame::new(experiment.config().hall_of_fame_size.max(1)));
    }
    HallOfFame::load(&path).with_context(|| format!("Failed to load Hall of Fame: {}", path.display()))
}
