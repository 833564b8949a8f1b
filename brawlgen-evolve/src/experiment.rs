//! Experiment bookkeeping and persisted state
//!
//! Level 2 - Phase-level implementation
//!
//! An experiment is a directory. Creation writes `config.json`, a README and
//! an empty rolling summary; after that everything is append-only apart from
//! the documents replaced atomically in place (`evolution_summary.json`,
//! `hall_of_fame.json`, `top_agents/`, the analysis report).

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use brawlgen_tournament::{MatchResult, StandingSummary, TournamentResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::archive::{
    append_line, archive_name, ensure_dir, read_json, snapshot_name, tournament_log_name,
    write_atomic, write_file, write_json_atomic, AGENT_ARCHIVE_DIR, ANALYSIS_DIR, CONFIG_FILE, EVENT_LOG_FILE,
    README_FILE, REPORT_FILE, SNAPSHOT_DIR, SUBDIRS, SUMMARY_FILE, TOURNAMENT_DIR,
};
use crate::config::ExperimentConfig;
use crate::error::PersistenceError;
use crate::hall_of_fame::HallOfFame;
use crate::population::{PopulationEntry, PopulationSnapshot};
use crate::record::AgentRecord;

// ============================================================================
// DOCUMENTS
// ============================================================================

/// `config.json`: the flattened configuration plus creation metadata
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(flatten)]
    pub config: ExperimentConfig,
    pub experiment_name: String,
    pub created_at: DateTime<Utc>,
    pub created_at_human: String,
}

/// One entry of the rolling summary
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationSummary {
    pub generation: u32,
    pub timestamp: DateTime<Utc>,
    pub best_fitness: f32,
    pub avg_fitness: f32,
    pub valid_agents: usize,
    pub hall_of_fame_size: usize,
}

/// `evolution_summary.json`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvolutionSummary {
    pub experiment_name: String,
    pub config: ExperimentConfig,
    pub started_at: DateTime<Utc>,
    pub generations: Vec<GenerationSummary>,
    pub last_updated: DateTime<Utc>,
    pub current_generation: u32,
    pub total_generations_completed: usize,
    /// How the run ended ("completed", "cancelled", "failed: ..."); absent while running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
}

/// `generation_{NNN}_tournament.json`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TournamentLog {
    pub generation: u32,
    pub timestamp: DateTime<Utc>,
    pub rounds_played: u32,
    pub cancelled: bool,
    pub standings: Vec<StandingSummary>,
    pub results: Vec<MatchResult>,
}

// ============================================================================
// EXPERIMENT
// ============================================================================

#[derive(Debug)]
pub struct Experiment {
    root: PathBuf,
    summary: EvolutionSummary,
}

/// Default name for an unnamed experiment
pub fn timestamped_name(now: DateTime<Utc>) -> String {
    format!("experiment_{}", now.format("%Y%m%d_%H%M%S"))
}

impl Experiment {
    /// Create `base/name` (or a timestamped directory) and its skeleton.
    ///
    /// Refuses to reuse a directory that already holds an experiment.
    pub fn create(
        base: &Path,
        name: Option<&str>,
        config: &ExperimentConfig,
    ) -> Result<Self, PersistenceError> {
        let now = Utc::now();
        let name = name.map(str::to_string).unwrap_or_else(|| timestamped_name(now));
        let root = base.join(&name);
        if root.join(CONFIG_FILE).exists() {
            return Err(PersistenceError::AlreadyExists(root));
        }

        ensure_dir(&root)?;
        for sub in SUBDIRS {
            ensure_dir(&root.join(sub))?;
        }

        let document = ConfigDocument {
            config: config.clone(),
            experiment_name: name.clone(),
            created_at: now,
            created_at_human: now.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        };
        write_json_atomic(&root.join(CONFIG_FILE), &document)?;
        write_file(&root.join(README_FILE), &readme(&name, now))?;

        let experiment = Self {
            root,
            summary: EvolutionSummary {
                experiment_name: name,
                config: config.clone(),
                started_at: now,
                generations: Vec::new(),
                last_updated: now,
                current_generation: 0,
                total_generations_completed: 0,
                outcome: None,
            },
        };
        experiment.write_summary()?;
        experiment.log_event(&format!(
            "experiment {} created (population {}, generations {})",
            experiment.name(),
            config.population_size,
            config.generations
        ))?;
        info!(root = %experiment.root.display(), "experiment created");
        Ok(experiment)
    }

    /// Open an existing experiment directory
    pub fn open(root: &Path) -> Result<Self, PersistenceError> {
        let document: ConfigDocument = read_json(&root.join(CONFIG_FILE))?;
        let summary_path = root.join(SUMMARY_FILE);
        let summary = if summary_path.exists() {
            read_json(&summary_path)?
        } else {
            EvolutionSummary {
                experiment_name: document.experiment_name,
                config: document.config,
                started_at: document.created_at,
                generations: Vec::new(),
                last_updated: document.created_at,
                current_generation: 0,
                total_generations_completed: 0,
                outcome: None,
            }
        };
        Ok(Self {
            root: root.to_path_buf(),
            summary,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn name(&self) -> &str {
        &self.summary.experiment_name
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.summary.config
    }

    pub fn summary(&self) -> &EvolutionSummary {
        &self.summary
    }

    // ========================================================================
    // EVENT LOG
    // ========================================================================

    /// Append one timestamped line to `experiment.log`
    pub fn log_event(&self, message: &str) -> Result<(), PersistenceError> {
        let line = format!("[{}] {}", Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"), message);
        append_line(&self.root.join(EVENT_LOG_FILE), &line)
    }

    // ========================================================================
    // PER-GENERATION DOCUMENTS
    // ========================================================================

    pub fn write_tournament_log(
        &self,
        generation: u32,
        tournament: &TournamentResult,
    ) -> Result<PathBuf, PersistenceError> {
        let path = self.root.join(TOURNAMENT_DIR).join(tournament_log_name(generation));
        let log = TournamentLog {
            generation,
            timestamp: Utc::now(),
            rounds_played: tournament.rounds_played,
            cancelled: tournament.cancelled,
            standings: tournament.standings.clone(),
            results: tournament.results.clone(),
        };
        write_json_atomic(&path, &log)?;
        Ok(path)
    }

    pub fn write_population_snapshot(
        &self,
        generation: u32,
        population: Vec<PopulationEntry>,
    ) -> Result<PathBuf, PersistenceError> {
        let path = self.root.join(SNAPSHOT_DIR).join(snapshot_name(generation));
        let snapshot = PopulationSnapshot {
            generation,
            timestamp: Utc::now(),
            population,
        };
        write_json_atomic(&path, &snapshot)?;
        Ok(path)
    }

    /// Write `agent_archive/<id>.py`; an existing archive entry is kept
    pub fn archive_agent(&self, record: &AgentRecord) -> Result<(), PersistenceError> {
        let path = self.root.join(AGENT_ARCHIVE_DIR).join(archive_name(record.id()));
        if path.exists() {
            debug!(agent = %record.id(), "already archived");
            return Ok(());
        }
        write_file(&path, &record.to_agent_file()?)
    }

    /// Append a generation to the rolling summary and rewrite it
    pub fn record_generation(&mut self, entry: GenerationSummary) -> Result<(), PersistenceError> {
        self.summary.current_generation = entry.generation;
        self.summary.last_updated = entry.timestamp;
        self.summary.generations.push(entry);
        self.summary.total_generations_completed = self.summary.generations.len();
        self.write_summary()
    }

    /// Stamp the outcome on the summary and rewrite it
    pub fn finish(&mut self, outcome: impl Into<String>) -> Result<(), PersistenceError> {
        let outcome = outcome.into();
        self.summary.outcome = Some(outcome.clone());
        self.summary.last_updated = Utc::now();
        self.write_summary()?;
        self.log_event(&format!("experiment finished: {}", outcome))
    }

    fn write_summary(&self) -> Result<(), PersistenceError> {
        write_json_atomic(&self.root.join(SUMMARY_FILE), &self.summary)
    }

    // ========================================================================
    // ANALYSIS
    // ========================================================================

    /// Write `analysis/experiment_report.md` and return its path
    pub fn write_report(&self, hall: &HallOfFame) -> Result<PathBuf, PersistenceError> {
        let dir = self.root.join(ANALYSIS_DIR);
        ensure_dir(&dir)?;
        let path = dir.join(REPORT_FILE);
        write_atomic(&path, render_report(&self.summary, hall).as_bytes())?;
        Ok(path)
    }
}

/// Markdown progress report
pub fn render_report(summary: &EvolutionSummary, hall: &HallOfFame) -> String {
    let total = summary.config.generations.max(1);
    let completed = summary.total_generations_completed;
    let percent = 100.0 * completed as f64 / total as f64;
    let stats = hall.stats();

    let mut out = String::new();
    let _ = writeln!(out, "# Experiment report: {}\n", summary.experiment_name);
    let _ = writeln!(out, "- Started: {}", summary.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(out, "- Last updated: {}", summary.last_updated.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(out, "- Current generation: {}", summary.current_generation);
    let _ = writeln!(
        out,
        "- Progress: {}/{} generations ({:.1}%)",
        completed, total, percent
    );
    if let Some(outcome) = &summary.outcome {
        let _ = writeln!(out, "- Outcome: {}", outcome);
    }
    let _ = writeln!(out, "- Hall of Fame size: {}/{}", stats.count, hall.max_agents());
    match stats.best {
        Some(best) => {
            let _ = writeln!(out, "- Best fitness: {:.3}", best);
        }
        None => out.push_str("- Best fitness: n/a\n"),
    }

    out.push_str("\n## Recent generations\n\n");
    if summary.generations.is_empty() {
        out.push_str("No generation completed yet.\n");
    } else {
        out.push_str("| Generation | Best | Average | Valid | HoF size |\n");
        out.push_str("|---|---|---|---|---|\n");
        let skip = summary.generations.len().saturating_sub(5);
        for g in &summary.generations[skip..] {
            let _ = writeln!(
                out,
                "| {} | {:.3} | {:.3} | {} | {} |",
                g.generation, g.best_fitness, g.avg_fitness, g.valid_agents, g.hall_of_fame_size
            );
        }
    }

    out.push_str("\n## Hall of Fame leaders\n\n");
    if hall.is_empty() {
        out.push_str("Hall of Fame is empty.\n");
    } else {
        out.push_str("| Rank | Agent | Fitness | Win rate | Style | Generation |\n");
        out.push_str("|---|---|---|---|---|---|\n");
        for (i, record) in hall.top(5).iter().enumerate() {
            let _ = writeln!(
                out,
                "| {} | {} | {:.3} | {:.0}% | {} | {} |",
                i + 1,
                record.id(),
                record.fitness(),
                record.meta.win_rate * 100.0,
                record.meta.style_tag,
                record.generation()
            );
        }
        out.push_str("\n## Styles in the Hall of Fame\n\n");
        for (style, count) in &stats.style_histogram {
            let _ = writeln!(out, "- {}: {}", style, count);
        }
    }
    out
}

fn readme(name: &str, created: DateTime<Utc>) -> String {
    format!(
        "# {name}\n\
         \n\
         Evolution experiment created {created}.\n\
         \n\
         ## Layout\n\
         \n\
         - `config.json`: experiment configuration\n\
         - `experiment.log`: append-only event log\n\
         - `evolution_summary.json`: per-generation best/average fitness, updated in place\n\
         - `hall_of_fame.json`: Hall of Fame manifest\n\
         - `tournament_logs/generation_NNN_tournament.json`: every match of a generation\n\
         - `generation_snapshots/generation_NNN_population.json`: population with fitness and host counters\n\
         - `top_agents/`: Hall of Fame sources, `rank_NNN_fitness_F.F_gen_G_<id>.py`\n\
         - `agent_archive/<id>.py`: every evaluated agent\n\
         - `analysis/experiment_report.md`: progress report\n\
         \n\
         Agent files start with a docstring header holding the agent id, a JSON\n\
         metadata object and the `code_hash` of the body. `brawlgen validate`\n\
         checks the hash; `brawlgen duel` plays two files against each other.\n",
        name = name,
        created = created.format("%Y-%m-%d %H:%M:%S UTC"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{AgentMeta, TournamentStats};
    use std::fs;

    fn quick() -> ExperimentConfig {
        ExperimentConfig::quick()
    }

    fn record(id: &str, fitness: f32) -> AgentRecord {
        AgentRecord {
            meta: AgentMeta {
                id: id.into(),
                generation: 0,
                fitness,
                win_rate: 0.5,
                avg_reward: 1.0,
                style_tag: "balanced".into(),
                created_at: Utc::now(),
                code_hash: "0000000000000000".into(),
                tournament_stats: TournamentStats::default(),
                lineage: Vec::new(),
            },
            source: "def act(state):\n    return 0".into(),
        }
    }

    #[test]
    fn test_create_writes_skeleton() {
        let dir = tempfile::tempdir().expect("tempdir");
        let experiment = Experiment::create(dir.path(), Some("trial"), &quick()).expect("create");
        let root = experiment.root();

        for sub in SUBDIRS {
            assert!(root.join(sub).is_dir(), "{} missing", sub);
        }
        let config: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(root.join(CONFIG_FILE)).expect("read")).expect("json");
        assert_eq!(config["experiment_name"], "trial");
        assert_eq!(config["population_size"], 4);
        assert!(config["created_at_human"].as_str().is_some());

        assert!(fs::read_to_string(root.join(README_FILE)).expect("readme").contains("top_agents/"));
        let log = fs::read_to_string(root.join(EVENT_LOG_FILE)).expect("log");
        assert!(log.starts_with('['));
        assert!(log.contains("experiment trial created"));
        assert!(root.join(SUMMARY_FILE).exists());
    }

    #[test]
    fn test_create_refuses_existing_experiment() {
        let dir = tempfile::tempdir().expect("tempdir");
        Experiment::create(dir.path(), Some("dup"), &quick()).expect("create");
        let err = Experiment::create(dir.path(), Some("dup"), &quick()).unwrap_err();
        assert!(matches!(err, PersistenceError::AlreadyExists(_)));
    }

    #[test]
    fn test_timestamped_name() {
        let now = DateTime::parse_from_rfc3339("2026-10-17T08:05:09Z")
            .expect("valid")
            .with_timezone(&Utc);
        assert_eq!(timestamped_name(now), "experiment_20261017_080509");
    }

    #[test]
    fn test_summary_rolls_and_reopens() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut experiment = Experiment::create(dir.path(), Some("rolling"), &quick()).expect("create");
        for generation in 0..2 {
            experiment
                .record_generation(GenerationSummary {
                    generation,
                    timestamp: Utc::now(),
                    best_fitness: 3.0 + generation as f32,
                    avg_fitness: 1.0,
                    valid_agents: 4,
                    hall_of_fame_size: 2,
                })
                .expect("record");
        }
        experiment.finish("completed").expect("finish");

        let reopened = Experiment::open(experiment.root()).expect("open");
        let summary = reopened.summary();
        assert_eq!(summary.generations.len(), 2);
        assert_eq!(summary.current_generation, 1);
        assert_eq!(summary.total_generations_completed, 2);
        assert_eq!(summary.outcome.as_deref(), Some("completed"));
        assert_eq!(reopened.config(), &quick());
    }

    #[test]
    fn test_archive_agent_writes_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let experiment = Experiment::create(dir.path(), Some("arch"), &quick()).expect("create");
        experiment.archive_agent(&record("g000_00_iron-mantis", 2.0)).expect("archive");
        experiment.archive_agent(&record("g000_00_iron-mantis", 9.0)).expect("archive again");

        let text = fs::read_to_string(
            experiment.root().join(AGENT_ARCHIVE_DIR).join("g000_00_iron-mantis.py"),
        )
        .expect("archived file");
        let back = AgentRecord::from_agent_file(&text).expect("parse");
        assert_eq!(back.fitness(), 2.0);
    }

    #[test]
    fn test_report_contents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut experiment = Experiment::create(dir.path(), Some("report"), &quick()).expect("create");
        experiment
            .record_generation(GenerationSummary {
                generation: 0,
                timestamp: Utc::now(),
                best_fitness: 5.5,
                avg_fitness: 2.0,
                valid_agents: 4,
                hall_of_fame_size: 1,
            })
            .expect("record");
        let mut hall = HallOfFame::new(10);
        hall.admit(record("g000_01_bold-crane", 5.5));

        let path = experiment.write_report(&hall).expect("report");
        let text = fs::read_to_string(path).expect("read");
        assert!(text.contains("Progress: 1/2 generations (50.0%)"));
        assert!(text.contains("Hall of Fame size: 1/10"));
        assert!(text.contains("Best fitness: 5.500"));
        assert!(text.contains("g000_01_bold-crane"));
        assert!(text.contains("- balanced: 1"));
    }

    #[test]
    fn test_empty_report() {
        let summary = EvolutionSummary {
            experiment_name: "empty".into(),
            config: quick(),
            started_at: Utc::now(),
            generations: Vec::new(),
            last_updated: Utc::now(),
            current_generation: 0,
            total_generations_completed: 0,
            outcome: None,
        };
        let text = render_report(&summary, &HallOfFame::new(3));
        assert!(text.contains("No generation completed yet."));
        assert!(text.contains("Hall of Fame is empty."));
        assert!(text.contains("Best fitness: n/a"));
    }
}
