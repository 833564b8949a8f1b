//! Integration tests for the BRAWLGEN scheduler
//!
//! Exercises the full stack: admission, Swiss play, fitness blending, the
//! Hall of Fame and experiment persistence, driven by the offline oracle.

use std::fs;
use std::path::Path;
use std::sync::atomic::AtomicBool;

use brawlgen_core::{ArenaFactory, Controller, RuleBot};
use brawlgen_evolve::archive::{
    AGENT_ARCHIVE_DIR, CONFIG_FILE, EVENT_LOG_FILE, HALL_OF_FAME_FILE, SNAPSHOT_DIR, SUMMARY_FILE,
    TOP_AGENTS_DIR, TOURNAMENT_DIR,
};
use brawlgen_evolve::{
    agent_body, verify_agent_file, AgentRecord, CancelToken, Experiment, ExperimentConfig,
    GenerationController, GenerationError, HallOfFame, ProposalOracle, SeedLibraryOracle,
};
use brawlgen_host::{AgentHandle, HostConfig};
use brawlgen_tournament::{blend_fitness, run_match, run_swiss, FitnessConfig, MatchConfig, TournamentConfig};

// ============================================================================
// TEST FIXTURES
// ============================================================================

fn quick_config(seed: u64) -> ExperimentConfig {
    ExperimentConfig {
        seed,
        ..ExperimentConfig::quick()
    }
}

fn run_experiment(base: &Path, name: &str, config: &ExperimentConfig) -> HallOfFame {
    let experiment = Experiment::create(base, Some(name), config).expect("create experiment");
    let oracle = SeedLibraryOracle::new(config.seed);
    let mut controller =
        GenerationController::new(config.clone(), &oracle, experiment, CancelToken::new()).expect("config");
    controller.run().expect("run completes");
    controller.hall_of_fame().clone()
}

fn admitted_population(count: usize) -> Vec<AgentHandle> {
    let oracle = SeedLibraryOracle::new(11);
    let host = HostConfig::default();
    let styles = ["aggressive", "defensive", "balanced", "projectile_zoner"];
    (0..count)
        .map(|i| {
            let prompt = format!("Style: {}\nGeneration: 0\n", styles[i % styles.len()]);
            let reply = oracle.propose(&prompt, "offline", 1024).expect("offline oracle");
            let source = brawlgen_evolve::extract_code_block(&reply);
            AgentHandle::admit(format!("agent_{i}"), &source, &host).expect("seed library source admits")
        })
        .collect()
}

// ============================================================================
// EVALUATION PIPELINE
// ============================================================================

#[test]
fn test_swiss_then_blend_covers_every_agent() {
    let agents = admitted_population(5);
    let controllers: Vec<&dyn Controller> = agents.iter().map(|a| a as &dyn Controller).collect();
    let factory = ArenaFactory { max_steps: 600 };
    let cancel = AtomicBool::new(false);

    let tournament = run_swiss(&controllers, &factory, &TournamentConfig::swiss(1).with_seed(3), &cancel)
        .expect("tournament runs");
    assert_eq!(tournament.standings.len(), 5);
    assert!(!tournament.cancelled);

    // Odd population: every round has exactly one bye
    let byes: u32 = tournament.standings.iter().map(|s| s.byes).sum();
    assert_eq!(byes, tournament.rounds_played);

    let bots = RuleBot::ladder();
    let ladder: Vec<&dyn Controller> = bots.iter().map(|b| b as &dyn Controller).collect();
    let fitness = blend_fitness(
        &controllers,
        &tournament,
        &ladder,
        &factory,
        &FitnessConfig::default(),
        &cancel,
    );
    assert_eq!(fitness.len(), 5);
    for result in &fitness {
        assert!(result.fitness.is_finite());
        assert!((0.0..=1.0).contains(&result.win_rate));
    }
}

#[test]
fn test_duel_between_agent_and_bot() {
    let agents = admitted_population(1);
    let bot = RuleBot::ladder().remove(0);
    let factory = ArenaFactory { max_steps: 400 };
    let result = run_match(&agents[0], &bot, &factory, &MatchConfig::new(2), 5);
    assert_eq!(result.games_played, 2);
    assert!((result.a_score + result.b_score - 1.0).abs() < 1e-6);
    assert!(!agents[0].is_disabled());
}

// ============================================================================
// FULL EXPERIMENT
// ============================================================================

#[test]
fn test_experiment_layout_and_hall_of_fame() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = quick_config(21);
    let hall = run_experiment(dir.path(), "layout", &config);
    let root = dir.path().join("layout");

    for file in [CONFIG_FILE, SUMMARY_FILE, EVENT_LOG_FILE, HALL_OF_FAME_FILE] {
        assert!(root.join(file).is_file(), "missing {file}");
    }
    for sub in [TOURNAMENT_DIR, SNAPSHOT_DIR, TOP_AGENTS_DIR, AGENT_ARCHIVE_DIR] {
        assert!(root.join(sub).is_dir(), "missing {sub}/");
    }

    // Hall of Fame is sorted, bounded and positive
    assert!(hall.len() <= config.hall_of_fame_size);
    let fitness: Vec<f32> = hall.records().iter().map(AgentRecord::fitness).collect();
    assert!(fitness.windows(2).all(|w| w[0] >= w[1]));
    assert!(fitness.iter().all(|&f| f > 0.0));

    // One file per Hall of Fame agent, each intact and admissible
    let top: Vec<_> = fs::read_dir(root.join(TOP_AGENTS_DIR))
        .expect("top agents")
        .map(|entry| entry.expect("entry").path())
        .collect();
    assert_eq!(top.len(), hall.len());
    for path in &top {
        let text = fs::read_to_string(path).expect("agent file");
        assert!(verify_agent_file(&text).expect("header"));
        AgentHandle::admit("reloaded", agent_body(&text), &HostConfig::default()).expect("still admissible");
    }

    // The persisted manifest reloads to the same ranking
    let reloaded = HallOfFame::load(&root.join(HALL_OF_FAME_FILE)).expect("reload");
    let ids = |h: &HallOfFame| h.records().iter().map(|r| r.id().to_string()).collect::<Vec<_>>();
    assert_eq!(ids(&reloaded), ids(&hall));
}

#[test]
fn test_same_seed_same_outcome() {
    let dir = tempfile::tempdir().expect("tempdir");
    // Only the instruction budget may cut an act call short here
    let config = ExperimentConfig {
        parallel: false,
        act_timeout_ms: 5_000,
        per_match_timeout_s: None,
        ..quick_config(8)
    };
    let first = run_experiment(dir.path(), "first", &config);
    let second = run_experiment(dir.path(), "second", &config);

    let view = |h: &HallOfFame| {
        h.records()
            .iter()
            .map(|r| (r.id().to_string(), r.meta.code_hash.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(view(&first), view(&second));
}

#[test]
fn test_experiment_directory_not_reused() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = quick_config(1);
    Experiment::create(dir.path(), Some("taken"), &config).expect("first create");
    assert!(Experiment::create(dir.path(), Some("taken"), &config).is_err());
}

#[test]
fn test_cancelled_run_exits_130() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = quick_config(2);
    let experiment = Experiment::create(dir.path(), Some("stopped"), &config).expect("create");
    let oracle = SeedLibraryOracle::new(2);
    let cancel = CancelToken::new();
    cancel.cancel();

    let mut controller = GenerationController::new(config, &oracle, experiment, cancel).expect("config");
    let err = controller.run().expect_err("cancelled");
    assert!(matches!(err, GenerationError::Cancelled { .. }));
    assert_eq!(err.exit_code(), 130);
    assert_eq!(oracle.calls(), 0);
}

#[test]
fn test_second_experiment_starts_from_hall_of_fame() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = quick_config(5);
    let hall = run_experiment(dir.path(), "parent", &config);
    let manifest = dir.path().join("parent").join(HALL_OF_FAME_FILE);

    let seeded = HallOfFame::load_with_capacity(&manifest, config.hall_of_fame_size).expect("load");
    assert_eq!(seeded.len(), hall.len());

    let experiment = Experiment::create(dir.path(), Some("child"), &config).expect("create");
    let oracle = SeedLibraryOracle::new(6);
    let mut controller = GenerationController::new(config, &oracle, experiment, CancelToken::new())
        .expect("config")
        .with_hall_of_fame(seeded);
    controller.run().expect("run completes");

    // Earlier champions are only displaced by strictly fitter agents
    let best_before = hall.best().map(AgentRecord::fitness).unwrap_or(0.0);
    let best_after = controller.hall_of_fame().best().map(AgentRecord::fitness).unwrap_or(0.0);
    assert!(best_after >= best_before);
}
