//! Swiss tournament - standings, pairings and ranking
//!
//! Level 1 - Orchestration (`run_swiss`) on top of the `Tournament` state
//! machine (Level 2: pair / record / rank).
//!
//! Byes award a full point and no fitness, and do not count as a game
//! played. Consequently `wins <= games_played + byes` rather than
//! `wins <= games_played`.

use std::sync::atomic::{AtomicBool, Ordering};

use brawlgen_core::{Controller, SimulatorFactory};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::TournamentConfig;
use crate::match_play::{run_match, MatchResult};

/// Node budget for the rematch-avoiding pairing search
const PAIRING_SEARCH_BUDGET: usize = 10_000;

/// Errors from driving a tournament
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TournamentError {
    #[error("agent '{0}' entered twice")]
    DuplicateAgent(String),

    #[error("result names unknown agent '{0}'")]
    UnknownAgent(String),
}

/// Round count used when none is configured: ceil(log2 n), minimum 1
pub fn default_rounds(n: usize) -> u32 {
    if n <= 2 {
        return 1;
    }
    usize::BITS - (n - 1).leading_zeros()
}

// ============================================================================
// STANDINGS
// ============================================================================

/// Per-agent standing within one tournament
#[derive(Clone, Debug, Default)]
pub struct Standing {
    pub id: String,
    /// Match points, byes included
    pub wins: f32,
    /// Matches played, byes excluded
    pub games_played: u32,
    pub byes: u32,
    pub total_fitness: f32,
    pub opponents: FxHashSet<String>,
    pub match_history: Vec<MatchResult>,
    /// Mean current win rate of faced opponents
    pub sos: f32,
}

impl Standing {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Points earned over the board, excluding byes, per match played
    pub fn win_rate(&self) -> f32 {
        if self.games_played == 0 {
            0.0
        } else {
            (self.wins - self.byes as f32).max(0.0) / self.games_played as f32
        }
    }

    /// Mean match fitness over played matches
    pub fn mean_fitness(&self) -> f32 {
        if self.games_played == 0 {
            0.0
        } else {
            self.total_fitness / self.games_played as f32
        }
    }

    pub fn has_faced(&self, other: &str) -> bool {
        self.opponents.contains(other)
    }

    /// Serializable snapshot with a rank attached
    pub fn summary(&self, rank: usize) -> StandingSummary {
        let mut opponents: Vec<String> = self.opponents.iter().cloned().collect();
        opponents.sort();
        StandingSummary {
            rank,
            id: self.id.clone(),
            wins: self.wins,
            games_played: self.games_played,
            byes: self.byes,
            sos: self.sos,
            mean_fitness: self.mean_fitness(),
            win_rate: self.win_rate(),
            opponents,
        }
    }
}

/// Flattened standing for logs and reports
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StandingSummary {
    /// 1-based
    pub rank: usize,
    pub id: String,
    pub wins: f32,
    pub games_played: u32,
    pub byes: u32,
    pub sos: f32,
    pub mean_fitness: f32,
    pub win_rate: f32,
    pub opponents: Vec<String>,
}

// ============================================================================
// TOURNAMENT STATE
// ============================================================================

/// Swiss tournament state machine
#[derive(Clone, Debug)]
pub struct Tournament {
    /// Entry order; the stable tiebreak for ranking
    ids: Vec<String>,
    rounds: u32,
    current_round: u32,
    standings: FxHashMap<String, Standing>,
    results: Vec<MatchResult>,
    rng: ChaCha8Rng,
}

impl Tournament {
    /// Create a tournament; `rounds = None` uses `default_rounds`
    pub fn new(
        ids: impl IntoIterator<Item = String>,
        rounds: Option<u32>,
        seed: u64,
    ) -> Result<Self, TournamentError> {
        let ids: Vec<String> = ids.into_iter().collect();
        let mut standings = FxHashMap::default();
        for id in &ids {
            if standings.insert(id.clone(), Standing::new(id.clone())).is_some() {
                return Err(TournamentError::DuplicateAgent(id.clone()));
            }
        }
        let rounds = rounds.unwrap_or_else(|| default_rounds(ids.len())).max(1);
        Ok(Self {
            ids,
            rounds,
            current_round: 0,
            standings,
            results: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        })
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    /// Rounds paired so far
    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    pub fn is_finished(&self) -> bool {
        self.current_round >= self.rounds
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn standing(&self, id: &str) -> Option<&Standing> {
        self.standings.get(id)
    }

    /// Every recorded result, in recording order
    pub fn results(&self) -> &[MatchResult] {
        &self.results
    }

    /// Produce the next round's pairings; `None` opponent is a bye
    pub fn pair_next_round(&mut self) -> Vec<(String, Option<String>)> {
        self.current_round += 1;
        if self.current_round == 1 {
            return self.pair_random();
        }
        self.update_sos();
        let order: Vec<String> = self.sorted_ids();
        self.pair_by_standing(&order)
    }

    /// Fold a round's results into the standings
    pub fn record(&mut self, results: Vec<MatchResult>) -> Result<(), TournamentError> {
        for result in &results {
            if !self.standings.contains_key(&result.a_id) {
                return Err(TournamentError::UnknownAgent(result.a_id.clone()));
            }
            if let Some(b) = &result.b_id {
                if !self.standings.contains_key(b) {
                    return Err(TournamentError::UnknownAgent(b.clone()));
                }
            }
        }

        for result in results {
            match result.b_id.clone() {
                None => {
                    if let Some(s) = self.standings.get_mut(&result.a_id) {
                        s.wins += result.a_score;
                        s.byes += 1;
                        s.match_history.push(result.clone());
                    }
                }
                Some(b_id) => {
                    let a_id = result.a_id.clone();
                    for (me, them, score, fitness) in [
                        (&a_id, &b_id, result.a_score, result.a_fitness),
                        (&b_id, &a_id, result.b_score, result.b_fitness),
                    ] {
                        if let Some(s) = self.standings.get_mut(me) {
                            s.wins += score;
                            s.games_played += 1;
                            s.total_fitness += fitness;
                            s.opponents.insert(them.clone());
                            s.match_history.push(result.clone());
                        }
                    }
                }
            }
            self.results.push(result);
        }
        self.update_sos();
        Ok(())
    }

    /// Standings in rank order: (wins, sos, mean_fitness) descending
    pub fn rank(&self) -> Vec<(String, Standing)> {
        let mut snapshot = self.clone();
        snapshot.update_sos();
        snapshot
            .sorted_ids()
            .into_iter()
            .filter_map(|id| snapshot.standings.remove(&id).map(|s| (id, s)))
            .collect()
    }

    // ------------------------------------------------------------------------
    // Level 3 - Steps
    // ------------------------------------------------------------------------

    fn update_sos(&mut self) {
        let rates: FxHashMap<String, f32> = self
            .standings
            .iter()
            .map(|(id, s)| (id.clone(), s.win_rate()))
            .collect();
        for standing in self.standings.values_mut() {
            standing.sos = if standing.opponents.is_empty() {
                0.0
            } else {
                let total: f32 = standing
                    .opponents
                    .iter()
                    .map(|o| rates.get(o).copied().unwrap_or(0.0))
                    .sum();
                total / standing.opponents.len() as f32
            };
        }
    }

    /// Entry order, stably sorted by the rank key
    fn sorted_ids(&self) -> Vec<String> {
        let mut ids = self.ids.clone();
        let key = |id: &String| {
            self.standings
                .get(id)
                .map(|s| (s.wins, s.sos, s.mean_fitness()))
                .unwrap_or_default()
        };
        ids.sort_by(|a, b| {
            let (ka, kb) = (key(a), key(b));
            kb.0.total_cmp(&ka.0)
                .then_with(|| kb.1.total_cmp(&ka.1))
                .then_with(|| kb.2.total_cmp(&ka.2))
        });
        ids
    }

    /// Round one: shuffle, pair adjacent, trailing agent sits out
    fn pair_random(&mut self) -> Vec<(String, Option<String>)> {
        let mut order = self.ids.clone();
        order.shuffle(&mut self.rng);
        order
            .chunks(2)
            .map(|c| (c[0].clone(), c.get(1).cloned()))
            .collect()
    }

    fn faced(&self, a: &str, b: &str) -> bool {
        self.standings.get(a).is_some_and(|s| s.has_faced(b))
    }

    fn had_bye(&self, id: &str) -> bool {
        self.standings.get(id).is_some_and(|s| s.byes > 0)
    }

    /// Later rounds: pair down the ranked list avoiding rematches
    fn pair_by_standing(&self, order: &[String]) -> Vec<(String, Option<String>)> {
        if order.len() % 2 == 0 {
            return self.pair_pool(order);
        }

        // Bye goes to the lowest-ranked agent without one, as long as the
        // rest can still be paired without rematches
        let mut candidates: Vec<usize> = (0..order.len())
            .rev()
            .filter(|&i| !self.had_bye(&order[i]))
            .collect();
        if candidates.is_empty() {
            candidates = (0..order.len()).rev().collect();
        }

        for &bye in &candidates {
            let pool: Vec<String> = order
                .iter()
                .enumerate()
                .filter(|&(i, _)| i != bye)
                .map(|(_, id)| id.clone())
                .collect();
            if let Some(pairs) = self.search_pairing(&pool) {
                let mut out: Vec<(String, Option<String>)> =
                    pairs.into_iter().map(|(a, b)| (a, Some(b))).collect();
                out.push((order[bye].clone(), None));
                return out;
            }
        }

        let bye = candidates[0];
        let pool: Vec<String> = order
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != bye)
            .map(|(_, id)| id.clone())
            .collect();
        let mut out: Vec<(String, Option<String>)> = self
            .pair_greedy(&pool)
            .into_iter()
            .map(|(a, b)| (a, Some(b)))
            .collect();
        out.push((order[bye].clone(), None));
        out
    }

    fn pair_pool(&self, pool: &[String]) -> Vec<(String, Option<String>)> {
        let pairs = self
            .search_pairing(pool)
            .unwrap_or_else(|| self.pair_greedy(pool));
        pairs.into_iter().map(|(a, b)| (a, Some(b))).collect()
    }

    /// Greedy walk: first following unfaced agent, else first following agent
    fn pair_greedy(&self, pool: &[String]) -> Vec<(String, String)> {
        let mut taken = vec![false; pool.len()];
        let mut pairs = Vec::with_capacity(pool.len() / 2);
        for i in 0..pool.len() {
            if taken[i] {
                continue;
            }
            let open: Vec<usize> = (i + 1..pool.len()).filter(|&j| !taken[j]).collect();
            let partner = open
                .iter()
                .copied()
                .find(|&j| !self.faced(&pool[i], &pool[j]))
                .or_else(|| open.first().copied());
            if let Some(j) = partner {
                taken[i] = true;
                taken[j] = true;
                pairs.push((pool[i].clone(), pool[j].clone()));
            }
        }
        pairs
    }

    /// Depth-first version of the greedy walk that never accepts a rematch.
    ///
    /// Explores partners in the same order as `pair_greedy`, so when the
    /// greedy walk needs no rematch both produce the same pairing.
    fn search_pairing(&self, pool: &[String]) -> Option<Vec<(String, String)>> {
        let mut taken = vec![false; pool.len()];
        let mut pairs = Vec::with_capacity(pool.len() / 2);
        let mut budget = PAIRING_SEARCH_BUDGET;
        if self.search_step(pool, &mut taken, &mut pairs, &mut budget) {
            Some(pairs)
        } else {
            None
        }
    }

    fn search_step(
        &self,
        pool: &[String],
        taken: &mut [bool],
        pairs: &mut Vec<(String, String)>,
        budget: &mut usize,
    ) -> bool {
        let Some(i) = taken.iter().position(|t| !t) else {
            return true;
        };
        if *budget == 0 {
            return false;
        }
        *budget -= 1;

        taken[i] = true;
        for j in i + 1..pool.len() {
            if taken[j] || self.faced(&pool[i], &pool[j]) {
                continue;
            }
            taken[j] = true;
            pairs.push((pool[i].clone(), pool[j].clone()));
            if self.search_step(pool, taken, pairs, budget) {
                return true;
            }
            pairs.pop();
            taken[j] = false;
        }
        taken[i] = false;
        false
    }
}

// ============================================================================
// Level 1 - Orchestration
// ============================================================================

/// Final state of a completed (or cancelled) tournament
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TournamentResult {
    /// Standings in rank order
    pub standings: Vec<StandingSummary>,
    /// Every match result in recording order
    pub results: Vec<MatchResult>,
    pub rounds_played: u32,
    /// Cancellation stopped the tournament early
    pub cancelled: bool,
}

impl TournamentResult {
    /// Get tournament winner
    pub fn winner(&self) -> Option<&StandingSummary> {
        self.standings.first()
    }

    /// Get top N standings
    pub fn top_n(&self, n: usize) -> &[StandingSummary] {
        &self.standings[..n.min(self.standings.len())]
    }

    /// Get standing for a specific agent
    pub fn standing_for(&self, id: &str) -> Option<&StandingSummary> {
        self.standings.iter().find(|s| s.id == id)
    }

    /// Every result `id` took part in
    pub fn history_of<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a MatchResult> + 'a {
        self.results
            .iter()
            .filter(move |r| r.a_id == id || r.b_id.as_deref() == Some(id))
    }
}

/// Run a full Swiss tournament among `agents`.
///
/// Each round is paired up front, its matches run (in parallel when
/// configured), and the results recorded at round end. `cancel` is polled
/// before every match; once set, no further match starts.
pub fn run_swiss(
    agents: &[&dyn Controller],
    factory: &dyn SimulatorFactory,
    config: &TournamentConfig,
    cancel: &AtomicBool,
) -> Result<TournamentResult, TournamentError> {
    let mut tournament = Tournament::new(
        agents.iter().map(|a| a.id().to_string()),
        config.rounds,
        config.seed,
    )?;
    let by_id: FxHashMap<&str, &dyn Controller> = agents.iter().map(|a| (a.id(), *a)).collect();
    let mut cancelled = false;

    while !tournament.is_finished() {
        if cancel.load(Ordering::Relaxed) {
            cancelled = true;
            break;
        }
        let pairings = tournament.pair_next_round();
        let round = tournament.current_round();
        let results = execute_round(&pairings, &by_id, factory, config, round, cancel);
        if results.len() < pairings.len() {
            cancelled = true;
        }
        tournament.record(results)?;
        debug!(round, rounds = tournament.rounds(), "swiss round recorded");
        if cancelled {
            break;
        }
    }

    let standings: Vec<StandingSummary> = tournament
        .rank()
        .iter()
        .enumerate()
        .map(|(i, (_, s))| s.summary(i + 1))
        .collect();
    if let Some(top) = standings.first() {
        info!(
            agents = agents.len(),
            rounds = tournament.current_round(),
            leader = %top.id,
            leader_wins = top.wins,
            "swiss tournament complete"
        );
    }

    Ok(TournamentResult {
        standings,
        rounds_played: tournament.current_round(),
        results: tournament.results,
        cancelled,
    })
}

/// Execute one round's pairings; skipped matches are omitted
fn execute_round(
    pairings: &[(String, Option<String>)],
    by_id: &FxHashMap<&str, &dyn Controller>,
    factory: &dyn SimulatorFactory,
    config: &TournamentConfig,
    round: u32,
    cancel: &AtomicBool,
) -> Vec<MatchResult> {
    let play = |(index, (a, b)): (usize, &(String, Option<String>))| -> Option<MatchResult> {
        let Some(b) = b else {
            return Some(MatchResult::bye(a.clone()));
        };
        if cancel.load(Ordering::Relaxed) {
            return None;
        }
        let (Some(ctrl_a), Some(ctrl_b)) = (by_id.get(a.as_str()), by_id.get(b.as_str())) else {
            return Some(MatchResult::error(a.clone(), b.clone(), "agent missing from pool"));
        };
        let seed = match_seed(config.seed, round, index);
        Some(run_match(*ctrl_a, *ctrl_b, factory, &config.match_config, seed))
    };

    if config.parallel {
        pairings.par_iter().enumerate().filter_map(play).collect()
    } else {
        pairings.iter().enumerate().filter_map(play).collect()
    }
}

fn match_seed(base: u64, round: u32, index: usize) -> u64 {
    base.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add((round as u64) << 32)
        .wrapping_add((index as u64) << 8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchConfig;
    use brawlgen_core::{Action, ArenaFactory, ConstantController};

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("agent-{}", i)).collect()
    }

    /// Every pairing decided in favor of the first-listed agent
    fn decide(pairings: &[(String, Option<String>)]) -> Vec<MatchResult> {
        pairings
            .iter()
            .map(|(a, b)| match b {
                None => MatchResult::bye(a.clone()),
                Some(b) => MatchResult {
                    a_id: a.clone(),
                    b_id: Some(b.clone()),
                    a_score: 1.0,
                    b_score: 0.0,
                    a_fitness: 3.0,
                    b_fitness: -3.0,
                    games_played: 3,
                    a_wins: 3,
                    b_wins: 0,
                    ties: 0,
                    meta: Default::default(),
                },
            })
            .collect()
    }

    fn play_out(tournament: &mut Tournament) -> Vec<Vec<(String, Option<String>)>> {
        let mut rounds = Vec::new();
        while !tournament.is_finished() {
            let pairings = tournament.pair_next_round();
            tournament.record(decide(&pairings)).expect("known agents");
            rounds.push(pairings);
        }
        rounds
    }

    #[test]
    fn test_default_rounds() {
        assert_eq!(default_rounds(0), 1);
        assert_eq!(default_rounds(1), 1);
        assert_eq!(default_rounds(2), 1);
        assert_eq!(default_rounds(3), 2);
        assert_eq!(default_rounds(4), 2);
        assert_eq!(default_rounds(5), 3);
        assert_eq!(default_rounds(8), 3);
        assert_eq!(default_rounds(9), 4);
    }

    #[test]
    fn test_duplicate_agent_rejected() {
        let err = Tournament::new(vec!["a".into(), "a".into()], None, 0).unwrap_err();
        assert_eq!(err, TournamentError::DuplicateAgent("a".into()));
    }

    #[test]
    fn test_round_one_covers_everyone() {
        let mut t = Tournament::new(ids(7), None, 3).expect("unique ids");
        let pairings = t.pair_next_round();
        assert_eq!(pairings.len(), 4);
        let byes: Vec<_> = pairings.iter().filter(|(_, b)| b.is_none()).collect();
        assert_eq!(byes.len(), 1);
        let mut seen: Vec<&String> = pairings
            .iter()
            .flat_map(|(a, b)| std::iter::once(a).chain(b.iter()))
            .collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 7);
    }

    #[test]
    fn test_five_agents_three_rounds() {
        for seed in 0..50 {
            let mut t = Tournament::new(ids(5), None, seed).expect("unique ids");
            assert_eq!(t.rounds(), 3);
            let rounds = play_out(&mut t);

            let mut met: FxHashSet<(String, String)> = FxHashSet::default();
            for pairings in &rounds {
                assert_eq!(pairings.iter().filter(|(_, b)| b.is_none()).count(), 1);
                for (a, b) in pairings {
                    if let Some(b) = b {
                        let key = if a < b { (a.clone(), b.clone()) } else { (b.clone(), a.clone()) };
                        assert!(met.insert(key), "rematch with seed {}", seed);
                    }
                }
            }
            for (_, standing) in t.rank() {
                assert!(standing.byes <= 1, "double bye with seed {}", seed);
                assert!(standing.games_played <= 3);
                assert!(standing.games_played >= 2);
            }
        }
    }

    #[test]
    fn test_games_played_bounds_every_round() {
        let mut t = Tournament::new(ids(9), Some(4), 17).expect("unique ids");
        let mut round = 0;
        while !t.is_finished() {
            let pairings = t.pair_next_round();
            t.record(decide(&pairings)).expect("known agents");
            round += 1;
            for (_, s) in t.rank() {
                assert!(s.games_played <= round);
                assert!(s.games_played + 1 >= round);
                assert!(s.wins <= (s.games_played + s.byes) as f32);
                assert!(s.opponents.len() as u32 <= s.games_played);
            }
        }
    }

    #[test]
    fn test_single_agent_gets_byes() {
        let mut t = Tournament::new(ids(1), Some(3), 0).expect("unique ids");
        let rounds = play_out(&mut t);
        assert_eq!(rounds.len(), 3);
        for pairings in rounds {
            assert_eq!(pairings, vec![("agent-0".to_string(), None)]);
        }
        let ranked = t.rank();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].1.wins, 3.0);
        assert_eq!(ranked[0].1.games_played, 0);
        assert_eq!(ranked[0].1.byes, 3);
    }

    #[test]
    fn test_forced_rematch_when_no_alternative() {
        let mut t = Tournament::new(ids(2), Some(2), 0).expect("unique ids");
        let rounds = play_out(&mut t);
        assert_eq!(rounds[1].len(), 1);
        assert!(rounds[1][0].1.is_some());
    }

    #[test]
    fn test_bye_recording() {
        let mut t = Tournament::new(ids(3), Some(1), 0).expect("unique ids");
        let pairings = t.pair_next_round();
        t.record(decide(&pairings)).expect("known agents");
        let (bye_id, _) = pairings.iter().find(|(_, b)| b.is_none()).expect("odd pool");
        let s = t.standing(bye_id).expect("present");
        assert_eq!(s.wins, 1.0);
        assert_eq!(s.games_played, 0);
        assert_eq!(s.total_fitness, 0.0);
        assert_eq!(s.match_history.len(), 1);
        assert!(s.opponents.is_empty());
    }

    #[test]
    fn test_record_unknown_agent() {
        let mut t = Tournament::new(ids(2), None, 0).expect("unique ids");
        let err = t.record(vec![MatchResult::bye("ghost")]).unwrap_err();
        assert_eq!(err, TournamentError::UnknownAgent("ghost".into()));
        assert!(t.results().is_empty());
    }

    #[test]
    fn test_sos_is_mean_opponent_win_rate() {
        let mut t = Tournament::new(ids(4), Some(2), 0).expect("unique ids");
        t.pair_next_round();
        let result = |a: &str, b: &str| MatchResult {
            a_id: a.into(),
            b_id: Some(b.into()),
            a_score: 1.0,
            b_score: 0.0,
            a_fitness: 1.0,
            b_fitness: 0.0,
            games_played: 1,
            a_wins: 1,
            b_wins: 0,
            ties: 0,
            meta: Default::default(),
        };
        t.record(vec![result("agent-0", "agent-1"), result("agent-2", "agent-3")])
            .expect("known agents");
        t.record(vec![result("agent-0", "agent-2")]).expect("known agents");

        // agent-2 is 1/2, agent-1 is 0/1
        let s0 = t.standing("agent-0").expect("present");
        assert!((s0.sos - 0.25).abs() < 1e-6);
        let s3 = t.standing("agent-3").expect("present");
        assert!((s3.sos - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_rank_order_and_tiebreaks() {
        let mut t = Tournament::new(ids(4), Some(1), 0).expect("unique ids");
        let mk = |a: &str, b: &str, a_score: f32, a_fit: f32| MatchResult {
            a_id: a.into(),
            b_id: Some(b.into()),
            a_score,
            b_score: 1.0 - a_score,
            a_fitness: a_fit,
            b_fitness: -a_fit,
            games_played: 2,
            a_wins: 0,
            b_wins: 0,
            ties: 2,
            meta: Default::default(),
        };
        t.record(vec![mk("agent-0", "agent-1", 0.5, 4.0), mk("agent-2", "agent-3", 1.0, 1.0)])
            .expect("known agents");
        let order: Vec<String> = t.rank().into_iter().map(|(id, _)| id).collect();
        assert_eq!(order, vec!["agent-2", "agent-0", "agent-1", "agent-3"]);
    }

    #[test]
    fn test_second_round_pairs_leaders() {
        let mut t = Tournament::new(ids(4), Some(2), 5).expect("unique ids");
        let rounds = play_out(&mut t);
        let winners: FxHashSet<&String> = rounds[0].iter().map(|(a, _)| a).collect();
        let (a, b) = &rounds[1][0];
        assert!(winners.contains(a));
        assert!(winners.contains(b.as_ref().expect("even pool")));
    }

    #[test]
    fn test_run_swiss_with_arena() {
        let puncher = ConstantController::new("puncher", Action::Punch);
        let kicker = ConstantController::new("kicker", Action::Kick);
        let idle_a = ConstantController::new("idle-a", Action::Idle);
        let idle_b = ConstantController::new("idle-b", Action::Idle);
        let agents: Vec<&dyn Controller> = vec![&puncher, &kicker, &idle_a, &idle_b];
        let config = TournamentConfig {
            match_config: MatchConfig::new(2),
            parallel: true,
            ..TournamentConfig::default()
        };
        let factory = ArenaFactory { max_steps: 900 };

        let result = run_swiss(&agents, &factory, &config, &AtomicBool::new(false))
            .expect("unique ids");

        assert_eq!(result.rounds_played, 2);
        assert_eq!(result.results.len(), 4);
        assert_eq!(result.standings.len(), 4);
        assert!(!result.cancelled);
        let leader = result.winner().expect("non-empty");
        assert!(leader.id == "puncher" || leader.id == "kicker");
        assert_eq!(result.history_of("idle-a").count(), 2);
        assert_eq!(result.top_n(10).len(), 4);
        assert!(result.standing_for("nobody").is_none());
    }

    #[test]
    fn test_run_swiss_cancelled_before_start() {
        let a = ConstantController::new("a", Action::Idle);
        let b = ConstantController::new("b", Action::Idle);
        let agents: Vec<&dyn Controller> = vec![&a, &b];
        let cancel = AtomicBool::new(true);

        let result = run_swiss(&agents, &ArenaFactory::default(), &TournamentConfig::default(), &cancel)
            .expect("unique ids");
        assert!(result.cancelled);
        assert_eq!(result.rounds_played, 0);
        assert!(result.results.is_empty());
    }
}
