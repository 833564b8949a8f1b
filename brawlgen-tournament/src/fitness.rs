//! Fitness blending for evolution
//!
//! Level 2 - Phase-level implementation
//!
//! Peer play discriminates relative strength, the fixed rule-bot ladder
//! anchors absolute progress across generations. The top K agents of the
//! tournament face the whole ladder; everyone else plays one match against
//! the easiest rung.

use std::sync::atomic::{AtomicBool, Ordering};

use brawlgen_core::{Controller, SimulatorFactory};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::FitnessConfig;
use crate::match_play::{run_match, MatchResult};
use crate::tournament::TournamentResult;

/// Blended evaluation of one agent for one generation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitnessResult {
    pub id: String,
    /// Scalar used for selection and Hall-of-Fame admission
    pub fitness: f32,
    /// Game wins over all games this generation (tournament and ladder)
    pub win_rate: f32,
    /// Mean per-game reward over the same games
    pub avg_reward: f32,
    /// Mean match fitness in the Swiss tournament
    pub tournament_fitness: f32,
    /// Mean fitness against the ladder; None if no ladder game completed
    pub ladder_fitness: Option<f32>,
    /// Whether the agent faced the full ladder
    pub full_ladder: bool,
    /// 1-based tournament rank
    pub tournament_rank: usize,
    /// Ladder match results from the agent's side (side A)
    pub ladder_results: Vec<MatchResult>,
}

/// Running totals of game-level wins and rewards
#[derive(Clone, Copy, Debug, Default)]
struct GameTally {
    wins: u32,
    games: u32,
    reward: f32,
}

impl GameTally {
    fn add(&mut self, wins: u32, games: u32, fitness: f32) {
        self.wins += wins;
        self.games += games;
        self.reward += fitness * games as f32;
    }

    fn win_rate(&self) -> f32 {
        if self.games == 0 {
            0.0
        } else {
            self.wins as f32 / self.games as f32
        }
    }

    fn avg_reward(&self) -> f32 {
        if self.games == 0 {
            0.0
        } else {
            self.reward / self.games as f32
        }
    }
}

/// Blend tournament standings with ladder play (Level 2 phase)
///
/// `ladder` must be ordered easiest first. Returned results follow the
/// tournament ranking. Once `cancel` is set no further ladder match starts
/// and affected agents fall back to their tournament fitness.
pub fn blend_fitness(
    agents: &[&dyn Controller],
    tournament: &TournamentResult,
    ladder: &[&dyn Controller],
    factory: &dyn SimulatorFactory,
    config: &FitnessConfig,
    cancel: &AtomicBool,
) -> Vec<FitnessResult> {
    let by_id: FxHashMap<&str, &dyn Controller> = agents.iter().map(|a| (a.id(), *a)).collect();
    let k = config.top_k(tournament.standings.len());
    let jobs = plan_ladder_jobs(tournament, ladder.len(), k);

    // An agent's rungs run in order on one thread; only distinct agents overlap
    let run = |&(rank_index, rungs): &(usize, usize)| -> Vec<MatchResult> {
        let id = tournament.standings[rank_index].id.as_str();
        let Some(agent) = by_id.get(id) else {
            return Vec::new();
        };
        let mut results = Vec::with_capacity(rungs);
        for (rung, opponent) in ladder.iter().take(rungs).enumerate() {
            if cancel.load(Ordering::Relaxed) {
                break;
            }
            let seed = config
                .seed
                .wrapping_add((rank_index as u64) << 16)
                .wrapping_add(rung as u64);
            results.push(run_match(*agent, *opponent, factory, &config.match_config, seed));
        }
        results
    };
    let played: Vec<Vec<MatchResult>> = if config.parallel {
        jobs.par_iter().map(run).collect()
    } else {
        jobs.iter().map(run).collect()
    };

    let mut ladder_results: Vec<Vec<MatchResult>> = vec![Vec::new(); tournament.standings.len()];
    for (&(rank_index, _), results) in jobs.iter().zip(played) {
        ladder_results[rank_index] = results;
    }

    tournament
        .standings
        .iter()
        .zip(ladder_results)
        .enumerate()
        .map(|(rank_index, (standing, results))| {
            let full_ladder = rank_index < k;
            compute_fitness(tournament, &standing.id, standing.rank, full_ladder, results, config)
        })
        .inspect(|r| {
            debug!(
                id = %r.id,
                fitness = r.fitness,
                win_rate = r.win_rate,
                full_ladder = r.full_ladder,
                "fitness blended"
            )
        })
        .collect()
}

// ============================================================================
// Level 3 - Steps
// ============================================================================

/// (tournament rank index, rungs to climb) per agent, easiest rung first
fn plan_ladder_jobs(tournament: &TournamentResult, rungs: usize, k: usize) -> Vec<(usize, usize)> {
    if rungs == 0 {
        return Vec::new();
    }
    (0..tournament.standings.len())
        .map(|rank_index| (rank_index, if rank_index < k { rungs } else { 1 }))
        .collect()
}

fn compute_fitness(
    tournament: &TournamentResult,
    id: &str,
    rank: usize,
    full_ladder: bool,
    ladder_results: Vec<MatchResult>,
    config: &FitnessConfig,
) -> FitnessResult {
    let tournament_fitness = tournament
        .standing_for(id)
        .map(|s| s.mean_fitness)
        .unwrap_or(0.0);

    let mut tally = GameTally::default();
    for result in tournament.history_of(id).filter(|r| !r.is_bye()) {
        let wins = result.wins_for(id).unwrap_or(0);
        let fitness = result.fitness_for(id).unwrap_or(0.0);
        tally.add(wins, result.games_played, fitness);
    }

    let completed: Vec<&MatchResult> = ladder_results.iter().filter(|r| r.games_played > 0).collect();
    let ladder_fitness = if completed.is_empty() {
        None
    } else {
        Some(completed.iter().map(|r| r.a_fitness).sum::<f32>() / completed.len() as f32)
    };
    for result in &completed {
        tally.add(result.a_wins, result.games_played, result.a_fitness);
    }

    let fitness = match (full_ladder, ladder_fitness) {
        (true, Some(ladder)) => {
            config.tournament_weight * tournament_fitness + config.ladder_weight * ladder
        }
        (false, Some(ladder)) => ladder,
        (_, None) => tournament_fitness,
    };

    FitnessResult {
        id: id.to_string(),
        fitness,
        win_rate: tally.win_rate(),
        avg_reward: tally.avg_reward(),
        tournament_fitness,
        ladder_fitness,
        full_ladder,
        tournament_rank: rank,
        ladder_results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MatchConfig, TournamentConfig};
    use crate::tournament::{run_swiss, Standing, Tournament};
    use brawlgen_core::{Action, ArenaFactory, ConstantController, RuleBot, StateVector};
    use std::sync::atomic::AtomicU32;

    /// Cycles through a fixed action pattern, one step per call
    struct CyclingController {
        id: String,
        calls: AtomicU32,
    }

    impl CyclingController {
        fn new(id: impl Into<String>) -> Self {
            Self {
                id: id.into(),
                calls: AtomicU32::new(0),
            }
        }
    }

    impl Controller for CyclingController {
        fn id(&self) -> &str {
            &self.id
        }

        fn act(&self, _state: &StateVector) -> Action {
            const PATTERN: [Action; 5] = [Action::Punch, Action::Kick, Action::Block, Action::Jump, Action::Idle];
            let n = self.calls.fetch_add(1, Ordering::Relaxed);
            PATTERN[n as usize % PATTERN.len()]
        }
    }

    fn standings_only(ids: &[&str]) -> TournamentResult {
        TournamentResult {
            standings: ids
                .iter()
                .enumerate()
                .map(|(i, id)| Standing::new(id.to_string()).summary(i + 1))
                .collect(),
            results: Vec::new(),
            rounds_played: 0,
            cancelled: false,
        }
    }

    fn quick_config() -> FitnessConfig {
        FitnessConfig {
            match_config: MatchConfig::new(1),
            ..FitnessConfig::default()
        }
    }

    fn ladder_refs(bots: &[RuleBot]) -> Vec<&dyn Controller> {
        bots.iter().map(|b| b as &dyn Controller).collect()
    }

    #[test]
    fn test_top_k_faces_full_ladder() {
        let controllers: Vec<ConstantController> = [
            Action::Punch,
            Action::Kick,
            Action::Idle,
            Action::Block,
            Action::Jump,
        ]
        .iter()
        .enumerate()
        .map(|(i, &a)| ConstantController::new(format!("c{}", i), a))
        .collect();
        let agents: Vec<&dyn Controller> = controllers.iter().map(|c| c as &dyn Controller).collect();
        let factory = ArenaFactory { max_steps: 600 };
        let cancel = AtomicBool::new(false);
        let tournament = run_swiss(
            &agents,
            &factory,
            &TournamentConfig::swiss(1),
            &cancel,
        )
        .expect("unique ids");

        let bots = RuleBot::ladder();
        let results = blend_fitness(
            &agents,
            &tournament,
            &ladder_refs(&bots),
            &factory,
            &quick_config(),
            &cancel,
        );

        assert_eq!(results.len(), 5);
        // K = min(5 / 2, 10) = 2
        assert_eq!(results.iter().filter(|r| r.full_ladder).count(), 2);
        for (i, r) in results.iter().enumerate() {
            assert_eq!(r.tournament_rank, i + 1);
            let expected = if i < 2 { 3 } else { 1 };
            assert_eq!(r.ladder_results.len(), expected);
            assert!((0.0..=1.0).contains(&r.win_rate));
        }
    }

    #[test]
    fn test_blend_weights() {
        let mut t = Tournament::new(vec!["solo".to_string(), "other".to_string()], Some(1), 0)
            .expect("unique ids");
        t.record(vec![MatchResult {
            a_id: "solo".into(),
            b_id: Some("other".into()),
            a_score: 1.0,
            b_score: 0.0,
            a_fitness: 10.0,
            b_fitness: -10.0,
            games_played: 2,
            a_wins: 2,
            b_wins: 0,
            ties: 0,
            meta: Default::default(),
        }])
        .expect("known agents");
        let tournament = TournamentResult {
            standings: t
                .rank()
                .iter()
                .enumerate()
                .map(|(i, (_, s))| s.summary(i + 1))
                .collect(),
            results: t.results().to_vec(),
            rounds_played: 1,
            cancelled: false,
        };

        let ladder_win = MatchResult {
            a_id: "solo".into(),
            b_id: Some("rulebot-easy".into()),
            a_score: 1.0,
            b_score: 0.0,
            a_fitness: 20.0,
            b_fitness: -20.0,
            games_played: 2,
            a_wins: 1,
            b_wins: 0,
            ties: 1,
            meta: Default::default(),
        };
        let config = FitnessConfig::default();

        let blended = compute_fitness(&tournament, "solo", 1, true, vec![ladder_win.clone()], &config);
        assert!((blended.fitness - (0.3 * 10.0 + 0.7 * 20.0)).abs() < 1e-4);
        assert_eq!(blended.ladder_fitness, Some(20.0));
        // 2 tournament wins + 1 ladder win over 4 games
        assert!((blended.win_rate - 0.75).abs() < 1e-6);
        assert!((blended.avg_reward - 15.0).abs() < 1e-4);

        let light = compute_fitness(&tournament, "solo", 1, false, vec![ladder_win], &config);
        assert_eq!(light.fitness, 20.0);

        let no_ladder = compute_fitness(&tournament, "solo", 1, true, Vec::new(), &config);
        assert_eq!(no_ladder.fitness, 10.0);
        assert_eq!(no_ladder.ladder_fitness, None);
    }

    #[test]
    fn test_cancel_skips_ladder() {
        let a = ConstantController::new("a", Action::Punch);
        let b = ConstantController::new("b", Action::Idle);
        let agents: Vec<&dyn Controller> = vec![&a, &b];
        let factory = ArenaFactory { max_steps: 600 };
        let tournament = run_swiss(
            &agents,
            &factory,
            &TournamentConfig::swiss(1),
            &AtomicBool::new(false),
        )
        .expect("unique ids");

        let bots = RuleBot::ladder();
        let results = blend_fitness(
            &agents,
            &tournament,
            &ladder_refs(&bots),
            &factory,
            &quick_config(),
            &AtomicBool::new(true),
        );
        assert_eq!(results.len(), 2);
        for r in &results {
            assert!(r.ladder_results.is_empty());
            assert_eq!(r.fitness, r.tournament_fitness);
        }
    }

    #[test]
    fn test_plan_ladder_jobs() {
        let tournament = TournamentResult {
            standings: (0..4)
                .map(|i| Standing::new(format!("x{}", i)).summary(i + 1))
                .collect(),
            results: Vec::new(),
            rounds_played: 0,
            cancelled: false,
        };
        let jobs = plan_ladder_jobs(&tournament, 3, 2);
        assert_eq!(jobs, vec![(0, 3), (1, 3), (2, 1), (3, 1)]);
        assert!(plan_ladder_jobs(&tournament, 0, 2).is_empty());
    }

    #[test]
    fn test_stateful_agents_same_fitness_parallel_or_not() {
        let ids = ["s0", "s1", "s2", "s3"];
        let tournament = standings_only(&ids);
        let bots = RuleBot::ladder();
        let factory = ArenaFactory { max_steps: 300 };

        let evaluate = |parallel: bool| {
            let agents: Vec<CyclingController> = ids.iter().map(|id| CyclingController::new(*id)).collect();
            let refs: Vec<&dyn Controller> = agents.iter().map(|a| a as &dyn Controller).collect();
            let config = FitnessConfig {
                match_config: MatchConfig::new(2),
                parallel,
                ..FitnessConfig::default()
            };
            blend_fitness(&refs, &tournament, &ladder_refs(&bots), &factory, &config, &AtomicBool::new(false))
                .into_iter()
                .map(|r| {
                    let ladder: Vec<(Option<String>, u32, u32, u32)> = r
                        .ladder_results
                        .iter()
                        .map(|m| (m.b_id.clone(), m.a_wins, m.b_wins, m.games_played))
                        .collect();
                    (r.id, r.fitness.to_bits(), r.win_rate.to_bits(), ladder)
                })
                .collect::<Vec<_>>()
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(4)
            .build()
            .expect("thread pool");
        let sequential = evaluate(false);
        for _ in 0..3 {
            assert_eq!(pool.install(|| evaluate(true)), sequential);
        }
        // K = min(4 / 2, 10) = 2
        assert_eq!(sequential[0].3.len(), bots.len());
        assert_eq!(sequential[2].3.len(), 1);
    }
}
