//! Population members and their per-generation snapshots

use brawlgen_host::{AgentHandle, AgentStats};
use brawlgen_tournament::{FitnessResult, TournamentResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::{AgentMeta, AgentRecord, TournamentStats};

/// How a member entered its generation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Fresh proposal from a seed prompt
    Seed,
    /// Carried over unchanged from the previous generation
    Elite,
    /// Variation of one parent
    Mutation,
    /// Combination of two parents
    Crossover,
}

/// An admitted agent plus its breeding context
#[derive(Debug)]
pub struct Candidate {
    pub handle: AgentHandle,
    pub style_tag: String,
    pub origin: Origin,
    /// Generation the source was first proposed in
    pub born: u32,
    pub lineage: Vec<String>,
}

impl Candidate {
    pub fn id(&self) -> &str {
        self.handle.id()
    }

    /// Hall-of-Fame record for this candidate's evaluation
    pub fn to_record(
        &self,
        fitness: &FitnessResult,
        tournament: &TournamentResult,
        created_at: DateTime<Utc>,
    ) -> AgentRecord {
        let standing = tournament.standing_for(self.id());
        AgentRecord {
            meta: AgentMeta {
                id: self.id().to_string(),
                generation: self.born,
                fitness: fitness.fitness,
                win_rate: fitness.win_rate,
                avg_reward: fitness.avg_reward,
                style_tag: self.style_tag.clone(),
                created_at,
                code_hash: self.handle.digest().to_string(),
                tournament_stats: TournamentStats {
                    rank: fitness.tournament_rank,
                    wins: standing.map(|s| s.wins).unwrap_or(0.0),
                    games_played: standing.map(|s| s.games_played).unwrap_or(0),
                    byes: standing.map(|s| s.byes).unwrap_or(0),
                    sos: standing.map(|s| s.sos).unwrap_or(0.0),
                    tournament_fitness: fitness.tournament_fitness,
                    ladder_fitness: fitness.ladder_fitness,
                    full_ladder: fitness.full_ladder,
                },
                lineage: self.lineage.clone(),
            },
            source: self.handle.source().to_string(),
        }
    }
}

/// A candidate after evaluation
#[derive(Debug)]
pub struct Evaluated {
    pub candidate: Candidate,
    pub fitness: FitnessResult,
}

/// One row of `generation_{NNN}_population.json`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PopulationEntry {
    pub id: String,
    pub style_tag: String,
    pub origin: Origin,
    pub born: u32,
    pub lineage: Vec<String>,
    pub fitness: f32,
    pub win_rate: f32,
    pub avg_reward: f32,
    pub tournament_rank: usize,
    pub full_ladder: bool,
    pub host: AgentStats,
}

impl PopulationEntry {
    pub fn from_evaluated(evaluated: &Evaluated) -> Self {
        let c = &evaluated.candidate;
        let f = &evaluated.fitness;
        Self {
            id: c.id().to_string(),
            style_tag: c.style_tag.clone(),
            origin: c.origin,
            born: c.born,
            lineage: c.lineage.clone(),
            fitness: f.fitness,
            win_rate: f.win_rate,
            avg_reward: f.avg_reward,
            tournament_rank: f.tournament_rank,
            full_ladder: f.full_ladder,
            host: c.handle.stats(),
        }
    }
}

/// `generation_{NNN}_population.json`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PopulationSnapshot {
    pub generation: u32,
    pub timestamp: DateTime<Utc>,
    pub population: Vec<PopulationEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use brawlgen_host::HostConfig;
    use brawlgen_tournament::StandingSummary;

    fn candidate() -> Candidate {
        Candidate {
            handle: AgentHandle::admit("g002_01_iron-fist", "def act(state):\n    return 4", &HostConfig::default())
                .expect("valid agent"),
            style_tag: "aggressive".into(),
            origin: Origin::Mutation,
            born: 2,
            lineage: vec!["g001_00_calm-owl".into()],
        }
    }

    fn fitness() -> FitnessResult {
        FitnessResult {
            id: "g002_01_iron-fist".into(),
            fitness: 9.5,
            win_rate: 0.8,
            avg_reward: 9.0,
            tournament_fitness: 6.0,
            ladder_fitness: Some(11.0),
            full_ladder: true,
            tournament_rank: 1,
            ladder_results: Vec::new(),
        }
    }

    #[test]
    fn test_to_record() {
        let c = candidate();
        let tournament = TournamentResult {
            standings: vec![StandingSummary {
                rank: 1,
                id: "g002_01_iron-fist".into(),
                wins: 2.0,
                games_played: 2,
                byes: 0,
                sos: 0.25,
                mean_fitness: 6.0,
                win_rate: 1.0,
                opponents: vec!["x".into(), "y".into()],
            }],
            results: Vec::new(),
            rounds_played: 2,
            cancelled: false,
        };
        let record = c.to_record(&fitness(), &tournament, Utc::now());
        assert_eq!(record.id(), "g002_01_iron-fist");
        assert_eq!(record.generation(), 2);
        assert_eq!(record.fitness(), 9.5);
        assert_eq!(record.meta.code_hash, c.handle.digest());
        assert_eq!(record.meta.tournament_stats.wins, 2.0);
        assert_eq!(record.meta.tournament_stats.ladder_fitness, Some(11.0));
        assert_eq!(record.meta.lineage, vec!["g001_00_calm-owl".to_string()]);
        assert_eq!(record.source, "def act(state):\n    return 4");
    }

    #[test]
    fn test_population_entry_serializes_origin() {
        let entry = PopulationEntry::from_evaluated(&Evaluated {
            candidate: candidate(),
            fitness: fitness(),
        });
        let json = serde_json::to_value(&entry).expect("serialize");
        assert_eq!(json["origin"], "mutation");
        assert_eq!(json["host"]["status"], "valid");
    }
}
