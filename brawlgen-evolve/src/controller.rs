//! Generation controller - the evolution loop
//!
//! ## Architecture (4-layer granularity)
//!
//! - Level 1: `run` / `run_with_callback` (orchestration over generations)
//! - Level 2: seed or breed, evaluate, admit, persist (one generation)
//! - Level 3: proposal + admission of one slot, elite promotion
//! - Level 4: reports and small helpers
//!
//! The controller exclusively owns the current population. Everything it
//! persists goes through [`Experiment`]; persistence failures are logged and
//! never stop a generation.

use brawlgen_core::{Controller, RuleBot, SimulatorFactory};
use brawlgen_host::{clean_source, source_digest, AdmissionError, AgentHandle, HostConfig};
use brawlgen_tournament::{blend_fitness, run_swiss, FitnessResult, TournamentResult};
use chrono::Utc;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::config::ExperimentConfig;
use crate::error::{GenerationError, OracleError, PersistenceError};
use crate::experiment::{Experiment, GenerationSummary};
use crate::hall_of_fame::HallOfFame;
use crate::naming::agent_id;
use crate::oracle::{extract_code_block, ProposalOracle};
use crate::population::{Candidate, Evaluated, Origin, PopulationEntry};
use crate::prompts::{crossover_prompt, mutation_prompt, seed_prompt, ParentBrief};
use crate::record::AgentRecord;
use crate::selection::{select_elite, select_parents};

/// Outcome of one completed generation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub generation: u32,
    pub best_fitness: f32,
    pub avg_fitness: f32,
    pub best_agent: Option<String>,
    pub valid_agents: usize,
    /// Proposal requests issued (elite re-admissions excluded)
    pub attempts: usize,
    pub admitted_to_hall: usize,
    pub hall_of_fame_size: usize,
}

/// Outcome of a completed run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub experiment_name: String,
    pub generations: Vec<GenerationReport>,
    pub hall_of_fame_size: usize,
    pub best_agent: Option<String>,
    pub best_fitness: Option<f32>,
}

/// Why a single slot proposal failed
#[derive(Debug, Error)]
enum ProposalFailure {
    #[error("oracle: {0}")]
    Oracle(#[from] OracleError),

    #[error("{}: {}", .0.kind(), .0)]
    Admission(#[from] AdmissionError),

    #[error("duplicate source {0}")]
    Duplicate(String),
}

/// One pending proposal request
struct Request {
    prompt: String,
    style_tag: String,
    origin: Origin,
    lineage: Vec<String>,
}

pub struct GenerationController<'a> {
    config: ExperimentConfig,
    host: HostConfig,
    oracle: &'a dyn ProposalOracle,
    factory: Box<dyn SimulatorFactory>,
    ladder: Vec<RuleBot>,
    experiment: Experiment,
    hall: HallOfFame,
    cancel: CancelToken,
    rng: ChaCha8Rng,
}

impl<'a> GenerationController<'a> {
    /// Controller over the reference arena with an empty Hall of Fame
    pub fn new(
        config: ExperimentConfig,
        oracle: &'a dyn ProposalOracle,
        experiment: Experiment,
        cancel: CancelToken,
    ) -> Result<Self, GenerationError> {
        config.validate()?;
        Ok(Self {
            host: config.host_config(),
            factory: Box::new(config.arena_factory()),
            ladder: RuleBot::ladder(),
            hall: HallOfFame::new(config.hall_of_fame_size),
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            config,
            oracle,
            experiment,
            cancel,
        })
    }

    /// Start from an existing Hall of Fame
    pub fn with_hall_of_fame(mut self, hall: HallOfFame) -> Self {
        self.hall = hall;
        self
    }

    /// Evaluate on a different simulator
    pub fn with_simulator(mut self, factory: Box<dyn SimulatorFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn hall_of_fame(&self) -> &HallOfFame {
        &self.hall
    }

    pub fn experiment(&self) -> &Experiment {
        &self.experiment
    }

    // ========================================================================
    // LEVEL 1 - ORCHESTRATION
    // ========================================================================

    pub fn run(&mut self) -> Result<RunSummary, GenerationError> {
        self.run_with_callback(|_| {})
    }

    /// Run every generation, calling `on_generation` after each one.
    ///
    /// On failure or cancellation the summary is stamped with the outcome
    /// and the report rewritten before the error is returned.
    pub fn run_with_callback<F>(&mut self, mut on_generation: F) -> Result<RunSummary, GenerationError>
    where
        F: FnMut(&GenerationReport),
    {
        let mut previous: Vec<Evaluated> = Vec::new();
        let mut reports = Vec::new();

        for generation in 0..self.config.generations {
            match self.run_generation(generation, &previous) {
                Ok((report, evaluated)) => {
                    on_generation(&report);
                    reports.push(report);
                    previous = evaluated;
                }
                Err(err) => {
                    let outcome = if err.is_cancelled() {
                        "cancelled".to_string()
                    } else {
                        format!("failed: {}", err)
                    };
                    warn!(generation, error = %err, "evolution stopped");
                    self.finish(&outcome);
                    return Err(err);
                }
            }
        }

        self.finish("completed");
        let best = self.hall.best();
        Ok(RunSummary {
            experiment_name: self.experiment.name().to_string(),
            generations: reports,
            hall_of_fame_size: self.hall.len(),
            best_agent: best.map(|r| r.id().to_string()),
            best_fitness: best.map(AgentRecord::fitness),
        })
    }

    // ========================================================================
    // LEVEL 2 - ONE GENERATION
    // ========================================================================

    fn run_generation(
        &mut self,
        generation: u32,
        previous: &[Evaluated],
    ) -> Result<(GenerationReport, Vec<Evaluated>), GenerationError> {
        self.check_cancelled(generation)?;
        self.event(&format!("generation {} started", generation));

        // Seed or breed
        let mut population = if previous.is_empty() {
            Vec::new()
        } else {
            self.promote_elites(previous)
        };
        let attempts = self.fill_population(generation, &mut population, previous);
        self.check_cancelled(generation)?;

        let required = self.config.required_valid();
        self.event(&format!(
            "generation {}: {} valid agents after {} proposals",
            generation,
            population.len(),
            attempts
        ));
        if population.len() < required {
            return Err(GenerationError::InsufficientPopulation {
                generation,
                valid: population.len(),
                required,
            });
        }

        // Evaluate
        let (tournament, fitness) = self.evaluate(generation, &population)?;
        if tournament.cancelled {
            self.persist(|e| e.write_tournament_log(generation, &tournament).map(drop), "tournament log");
        }
        self.check_cancelled(generation)?;
        let evaluated = pair_fitness(population, fitness);

        // Admit
        let now = Utc::now();
        let records: Vec<AgentRecord> = evaluated
            .iter()
            .map(|e| e.candidate.to_record(&e.fitness, &tournament, now))
            .collect();
        let admitted = self.hall.admit_many(
            records.iter().filter(|r| r.fitness() > 0.0).cloned(),
            generation,
        );

        // Persist
        let report = build_report(generation, &evaluated, attempts, admitted, self.hall.len());
        self.persist_generation(generation, &tournament, &evaluated, &records, &report);

        info!(
            generation,
            best = report.best_fitness,
            avg = report.avg_fitness,
            valid = report.valid_agents,
            hall_of_fame = report.hall_of_fame_size,
            "generation complete"
        );
        Ok((report, evaluated))
    }

    fn evaluate(
        &self,
        generation: u32,
        population: &[Candidate],
    ) -> Result<(TournamentResult, Vec<FitnessResult>), GenerationError> {
        let agents: Vec<&dyn Controller> = population
            .iter()
            .map(|c| &c.handle as &dyn Controller)
            .collect();
        let tournament = run_swiss(
            &agents,
            self.factory.as_ref(),
            &self.config.tournament_config(generation),
            self.cancel.flag(),
        )?;

        let ladder: Vec<&dyn Controller> = self.ladder.iter().map(|b| b as &dyn Controller).collect();
        let fitness = blend_fitness(
            &agents,
            &tournament,
            &ladder,
            self.factory.as_ref(),
            &self.config.fitness_config(generation),
            self.cancel.flag(),
        );
        Ok((tournament, fitness))
    }

    fn persist_generation(
        &mut self,
        generation: u32,
        tournament: &TournamentResult,
        evaluated: &[Evaluated],
        records: &[AgentRecord],
        report: &GenerationReport,
    ) {
        self.persist(|e| e.write_tournament_log(generation, tournament).map(drop), "tournament log");

        let entries: Vec<PopulationEntry> = evaluated.iter().map(PopulationEntry::from_evaluated).collect();
        self.persist(
            |e| e.write_population_snapshot(generation, entries).map(drop),
            "population snapshot",
        );

        for record in records {
            self.persist(|e| e.archive_agent(record), "agent archive");
        }

        let hall = &self.hall;
        self.persist(|e| hall.persist(e.root()), "hall of fame");

        let entry = GenerationSummary {
            generation,
            timestamp: Utc::now(),
            best_fitness: report.best_fitness,
            avg_fitness: report.avg_fitness,
            valid_agents: report.valid_agents,
            hall_of_fame_size: report.hall_of_fame_size,
        };
        if let Err(err) = self.experiment.record_generation(entry) {
            self.persist_failed("evolution summary", &err);
        }

        let hall = &self.hall;
        self.persist(|e| e.write_report(hall).map(drop), "report");

        self.event(&format!(
            "generation {} complete: best {:.3} ({}), avg {:.3}, hall of fame {} (+{})",
            generation,
            report.best_fitness,
            report.best_agent.as_deref().unwrap_or("-"),
            report.avg_fitness,
            report.hall_of_fame_size,
            report.admitted_to_hall
        ));
    }

    // ========================================================================
    // LEVEL 3 - POPULATION
    // ========================================================================

    /// Fresh handles for the previous generation's best agents
    fn promote_elites(&self, previous: &[Evaluated]) -> Vec<Candidate> {
        let fitness: Vec<f32> = previous.iter().map(|e| e.fitness.fitness).collect();
        select_elite(&fitness, self.config.elite_size)
            .into_iter()
            .filter_map(|i| {
                let parent = &previous[i].candidate;
                match AgentHandle::admit(parent.id(), parent.handle.source(), &self.host) {
                    Ok(handle) => Some(Candidate {
                        handle,
                        style_tag: parent.style_tag.clone(),
                        origin: Origin::Elite,
                        born: parent.born,
                        lineage: parent.lineage.clone(),
                    }),
                    Err(err) => {
                        warn!(agent = %parent.id(), error = %err, "elite failed re-admission");
                        None
                    }
                }
            })
            .collect()
    }

    /// Propose until the population is full or the attempt budget is spent.
    /// Returns the number of proposals issued.
    fn fill_population(
        &mut self,
        generation: u32,
        population: &mut Vec<Candidate>,
        previous: &[Evaluated],
    ) -> usize {
        let budget = self.config.attempt_budget();
        let mut attempts = 0;

        while population.len() < self.config.population_size && attempts < budget {
            if self.cancel.is_cancelled() {
                break;
            }
            attempts += 1;
            let slot = population.len();
            let request = if previous.is_empty() {
                self.seed_request(generation, slot)
            } else {
                self.breed_request(generation, slot, previous)
            };

            match self.propose(generation, slot, request, population) {
                Ok(candidate) => {
                    info!(generation, slot, agent = %candidate.id(), origin = ?candidate.origin, "agent admitted");
                    population.push(candidate);
                }
                Err(failure) => {
                    warn!(generation, slot, attempt = attempts, reason = %failure, "proposal rejected");
                    self.event(&format!(
                        "generation {} slot {} attempt {} rejected: {}",
                        generation, slot, attempts, failure
                    ));
                }
            }
        }
        attempts
    }

    fn seed_request(&self, generation: u32, slot: usize) -> Request {
        let style = self.config.style_for_slot(slot).to_string();
        Request {
            prompt: seed_prompt(&style, generation),
            style_tag: style,
            origin: Origin::Seed,
            lineage: Vec::new(),
        }
    }

    fn breed_request(&mut self, generation: u32, slot: usize, previous: &[Evaluated]) -> Request {
        let fitness: Vec<f32> = previous.iter().map(|e| e.fitness.fitness).collect();
        let crossover = previous.len() >= 2 && self.rng.gen_bool(self.config.crossover_probability);
        let count = if crossover { 2 } else { 1 };
        let parents: Vec<&Evaluated> = select_parents(&fitness, count, self.config.tournament_size, &mut self.rng)
            .into_iter()
            .map(|i| &previous[i])
            .collect();

        let style = match parents.first() {
            Some(p) if self.config.inherit_style => p.candidate.style_tag.clone(),
            _ => self.config.style_for_slot(slot).to_string(),
        };
        let briefs: Vec<ParentBrief<'_>> = parents
            .iter()
            .map(|p| ParentBrief {
                id: p.candidate.id(),
                source: p.candidate.handle.source(),
                fitness: p.fitness.fitness,
                win_rate: p.fitness.win_rate,
            })
            .collect();

        let (prompt, origin) = match briefs.as_slice() {
            [a, b] => (crossover_prompt(&style, generation, a, b), Origin::Crossover),
            [a] => (mutation_prompt(&style, generation, a), Origin::Mutation),
            _ => (seed_prompt(&style, generation), Origin::Seed),
        };
        Request {
            prompt,
            style_tag: style,
            origin,
            lineage: parents.iter().map(|p| p.candidate.id().to_string()).collect(),
        }
    }

    /// Ask the oracle for one slot and admit the reply
    fn propose(
        &self,
        generation: u32,
        slot: usize,
        request: Request,
        population: &[Candidate],
    ) -> Result<Candidate, ProposalFailure> {
        let reply = self
            .oracle
            .propose(&request.prompt, &self.config.model, self.config.max_tokens)?;
        let source = clean_source(&extract_code_block(&reply));
        let digest = source_digest(&source);
        if population.iter().any(|c| c.handle.digest() == digest) {
            return Err(ProposalFailure::Duplicate(digest));
        }

        let handle = AgentHandle::admit(agent_id(generation, slot, &digest), &source, &self.host)?;
        Ok(Candidate {
            handle,
            style_tag: request.style_tag,
            origin: request.origin,
            born: generation,
            lineage: request.lineage,
        })
    }

    // ========================================================================
    // LEVEL 4 - UTILITIES
    // ========================================================================

    fn check_cancelled(&self, generation: u32) -> Result<(), GenerationError> {
        if self.cancel.is_cancelled() {
            Err(GenerationError::Cancelled { generation })
        } else {
            Ok(())
        }
    }

    fn event(&self, message: &str) {
        if let Err(err) = self.experiment.log_event(message) {
            warn!(error = %err, "event log write failed");
        }
    }

    fn persist<F>(&self, write: F, what: &str)
    where
        F: FnOnce(&Experiment) -> Result<(), PersistenceError>,
    {
        if let Err(err) = write(&self.experiment) {
            self.persist_failed(what, &err);
        }
    }

    fn persist_failed(&self, what: &str, err: &PersistenceError) {
        warn!(what, error = %err, "persistence failed");
        self.event(&format!("persistence failed ({}): {}", what, err));
    }

    fn finish(&mut self, outcome: &str) {
        if let Err(err) = self.experiment.finish(outcome) {
            self.persist_failed("final summary", &err);
        }
        let hall = &self.hall;
        self.persist(|e| hall.persist(e.root()), "hall of fame");
        self.persist(|e| e.write_report(hall).map(drop), "report");
    }
}

/// Join candidates with their fitness, best first
fn pair_fitness(population: Vec<Candidate>, fitness: Vec<FitnessResult>) -> Vec<Evaluated> {
    let mut by_id: FxHashMap<String, FitnessResult> =
        fitness.into_iter().map(|f| (f.id.clone(), f)).collect();
    let mut evaluated: Vec<Evaluated> = population
        .into_iter()
        .filter_map(|candidate| {
            let fitness = by_id.remove(candidate.id());
            if fitness.is_none() {
                warn!(agent = %candidate.id(), "no fitness computed");
            }
            fitness.map(|fitness| Evaluated { candidate, fitness })
        })
        .collect();
    evaluated.sort_by(|a, b| b.fitness.fitness.total_cmp(&a.fitness.fitness));
    evaluated
}

fn build_report(
    generation: u32,
    evaluated: &[Evaluated],
    attempts: usize,
    admitted: usize,
    hall_of_fame_size: usize,
) -> GenerationReport {
    let fitness: Vec<f32> = evaluated.iter().map(|e| e.fitness.fitness).collect();
    let best_fitness = fitness.first().copied().unwrap_or(0.0);
    let avg_fitness = if fitness.is_empty() {
        0.0
    } else {
        fitness.iter().sum::<f32>() / fitness.len() as f32
    };
    GenerationReport {
        generation,
        best_fitness,
        avg_fitness,
        best_agent: evaluated.first().map(|e| e.candidate.id().to_string()),
        valid_agents: evaluated.len(),
        attempts,
        admitted_to_hall: admitted,
        hall_of_fame_size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{
        snapshot_name, tournament_log_name, ANALYSIS_DIR, REPORT_FILE, SNAPSHOT_DIR, SUMMARY_FILE,
        TOURNAMENT_DIR,
    };
    use crate::experiment::EvolutionSummary;
    use crate::oracle::SeedLibraryOracle;
    use crate::population::PopulationSnapshot;
    use std::fs;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Oracle answering from a closure over the call index
    struct ScriptedOracle<F> {
        reply: F,
        calls: AtomicU64,
    }

    impl<F> ScriptedOracle<F>
    where
        F: Fn(u64) -> Result<String, OracleError> + Send + Sync,
    {
        fn new(reply: F) -> Self {
            Self {
                reply,
                calls: AtomicU64::new(0),
            }
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::Relaxed)
        }
    }

    impl<F> ProposalOracle for ScriptedOracle<F>
    where
        F: Fn(u64) -> Result<String, OracleError> + Send + Sync,
    {
        fn name(&self) -> &str {
            "scripted"
        }

        fn propose(&self, _prompt: &str, _model: &str, _max_tokens: u32) -> Result<String, OracleError> {
            let n = self.calls.fetch_add(1, Ordering::Relaxed);
            (self.reply)(n)
        }
    }

    fn constant_agent(action: u64) -> String {
        format!("```python\ndef act(state):\n    return {}\n```", action)
    }

    fn read_summary(experiment: &Experiment) -> EvolutionSummary {
        let text = fs::read_to_string(experiment.root().join(SUMMARY_FILE)).expect("summary");
        serde_json::from_str(&text).expect("summary json")
    }

    #[test]
    fn test_small_run_completes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = ExperimentConfig::quick();
        let experiment = Experiment::create(dir.path(), Some("small"), &config).expect("create");
        let oracle = SeedLibraryOracle::new(3);

        let mut controller =
            GenerationController::new(config.clone(), &oracle, experiment, CancelToken::new()).expect("valid config");
        let mut seen = Vec::new();
        let summary = controller
            .run_with_callback(|report| seen.push(report.generation))
            .expect("run completes");

        assert_eq!(seen, vec![0, 1]);
        assert_eq!(summary.generations.len(), 2);
        for report in &summary.generations {
            assert_eq!(report.valid_agents, config.population_size);
        }

        let hall = controller.hall_of_fame();
        assert!(hall.len() <= config.hall_of_fame_size);
        assert!(hall.records().iter().all(|r| r.fitness() > 0.0));

        let root = controller.experiment().root();
        for generation in 0..2 {
            assert!(root.join(TOURNAMENT_DIR).join(tournament_log_name(generation)).exists());
            assert!(root.join(SNAPSHOT_DIR).join(snapshot_name(generation)).exists());
        }
        assert!(root.join(ANALYSIS_DIR).join(REPORT_FILE).exists());

        let persisted = read_summary(controller.experiment());
        assert_eq!(persisted.total_generations_completed, 2);
        assert_eq!(persisted.outcome.as_deref(), Some("completed"));

        // Generation 1 starts with the elite and breeds the rest
        let text = fs::read_to_string(root.join(SNAPSHOT_DIR).join(snapshot_name(1))).expect("snapshot");
        let snapshot: PopulationSnapshot = serde_json::from_str(&text).expect("snapshot json");
        let elites: Vec<_> = snapshot.population.iter().filter(|p| p.origin == Origin::Elite).collect();
        assert_eq!(elites.len(), config.elite_size);
        assert!(elites.iter().all(|p| p.born == 0));
        assert!(snapshot
            .population
            .iter()
            .filter(|p| p.origin != Origin::Elite)
            .all(|p| !p.lineage.is_empty() && p.id.starts_with("g001_")));
    }

    #[test]
    fn test_generation_failure_floor() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = ExperimentConfig {
            population_size: 10,
            ..ExperimentConfig::quick()
        };
        let experiment = Experiment::create(dir.path(), Some("floor"), &config).expect("create");
        // Four valid agents, then only forbidden imports
        let oracle = ScriptedOracle::new(|n| {
            if n < 4 {
                Ok(constant_agent(n))
            } else {
                Ok("import os\ndef act(s):\n  return 0\n".to_string())
            }
        });

        let mut controller =
            GenerationController::new(config.clone(), &oracle, experiment, CancelToken::new()).expect("valid config");
        let err = controller.run().unwrap_err();

        match &err {
            GenerationError::InsufficientPopulation { generation, valid, required } => {
                assert_eq!((*generation, *valid, *required), (0, 4, 5));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(err.exit_code(), 1);
        assert_eq!(oracle.calls(), config.attempt_budget() as u64);

        let summary = read_summary(controller.experiment());
        assert!(summary.outcome.as_deref().unwrap_or("").starts_with("failed"));
        assert!(summary.generations.is_empty());
        let log = fs::read_to_string(controller.experiment().root().join("experiment.log")).expect("log");
        assert!(log.contains("forbidden_import"));
    }

    #[test]
    fn test_cancel_before_start() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = ExperimentConfig::quick();
        let experiment = Experiment::create(dir.path(), Some("cancel"), &config).expect("create");
        let oracle = SeedLibraryOracle::new(1);
        let cancel = CancelToken::new();
        cancel.cancel();

        let mut controller = GenerationController::new(config, &oracle, experiment, cancel).expect("valid config");
        let err = controller.run().unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.exit_code(), 130);
        assert_eq!(oracle.calls(), 0);
        assert_eq!(read_summary(controller.experiment()).outcome.as_deref(), Some("cancelled"));
    }

    #[test]
    fn test_oracle_errors_are_retried() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = ExperimentConfig {
            generations: 1,
            ..ExperimentConfig::quick()
        };
        let experiment = Experiment::create(dir.path(), Some("retry"), &config).expect("create");
        let oracle = ScriptedOracle::new(|n| {
            if n % 2 == 0 {
                Err(OracleError::Transport("connection reset".into()))
            } else {
                Ok(constant_agent(n % 10))
            }
        });

        let mut controller =
            GenerationController::new(config.clone(), &oracle, experiment, CancelToken::new()).expect("valid config");
        let summary = controller.run().expect("run completes");
        assert_eq!(summary.generations[0].valid_agents, config.population_size);
        assert_eq!(summary.generations[0].attempts, 2 * config.population_size);
    }

    #[test]
    fn test_duplicate_sources_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = ExperimentConfig::quick();
        let experiment = Experiment::create(dir.path(), Some("dups"), &config).expect("create");
        let oracle = ScriptedOracle::new(|_| Ok(constant_agent(4)));

        let mut controller =
            GenerationController::new(config.clone(), &oracle, experiment, CancelToken::new()).expect("valid config");
        match controller.run().unwrap_err() {
            GenerationError::InsufficientPopulation { valid, .. } => assert_eq!(valid, 1),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = ExperimentConfig::quick();
        let experiment = Experiment::create(dir.path(), Some("bad"), &config).expect("create");
        let oracle = SeedLibraryOracle::new(1);
        let bad = ExperimentConfig {
            population_size: 0,
            ..config
        };
        let result = GenerationController::new(bad, &oracle, experiment, CancelToken::new());
        assert!(matches!(result, Err(GenerationError::Config(_))));
    }

    #[test]
    fn test_pair_fitness_orders_best_first() {
        let host = HostConfig::default();
        let population: Vec<Candidate> = (0..3)
            .map(|i| Candidate {
                handle: AgentHandle::admit(format!("a{}", i), &format!("def act(s):\n    return {}", i), &host)
                    .expect("valid"),
                style_tag: "balanced".into(),
                origin: Origin::Seed,
                born: 0,
                lineage: Vec::new(),
            })
            .collect();
        let fitness: Vec<FitnessResult> = [(0, 1.0), (1, 3.0), (2, 2.0)]
            .iter()
            .map(|&(i, f)| FitnessResult {
                id: format!("a{}", i),
                fitness: f,
                win_rate: 0.0,
                avg_reward: 0.0,
                tournament_fitness: 0.0,
                ladder_fitness: None,
                full_ladder: false,
                tournament_rank: i + 1,
                ladder_results: Vec::new(),
            })
            .collect();

        let evaluated = pair_fitness(population, fitness);
        let ids: Vec<&str> = evaluated.iter().map(|e| e.candidate.id()).collect();
        assert_eq!(ids, vec!["a1", "a2", "a0"]);

        let report = build_report(0, &evaluated, 5, 1, 1);
        assert_eq!(report.best_fitness, 3.0);
        assert!((report.avg_fitness - 2.0).abs() < 1e-6);
        assert_eq!(report.best_agent.as_deref(), Some("a1"));
    }
}
