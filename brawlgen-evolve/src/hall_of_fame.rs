//! Hall of Fame - bounded archive of the best agents ever evaluated
//!
//! Level 2 - Phase-level implementation
//!
//! Entries stay sorted by (fitness desc, created_at asc). A full Hall only
//! accepts a record that strictly beats its current minimum, which is then
//! evicted. Ranks are frozen at admission time: an agent's fitness is not
//! revised by later generations.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::archive::{
    ensure_dir, read_json, top_agent_name, write_file, write_json_atomic, HALL_OF_FAME_FILE,
    TOP_AGENTS_DIR,
};
use crate::error::PersistenceError;
use crate::record::AgentRecord;

/// Summary statistics over the current membership
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HofStats {
    pub count: usize,
    pub best: Option<f32>,
    pub mean: Option<f32>,
    /// (min, max) fitness
    pub fitness_range: Option<(f32, f32)>,
    /// (oldest, newest) generation
    pub generation_range: Option<(u32, u32)>,
    pub style_histogram: BTreeMap<String, usize>,
    pub generation_histogram: BTreeMap<u32, usize>,
}

/// Header of the persisted manifest
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManifestInfo {
    pub max_agents: usize,
    pub last_updated: DateTime<Utc>,
    pub total_agents: usize,
}

/// `hall_of_fame.json`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HofManifest {
    pub experiment_info: ManifestInfo,
    pub agents: Vec<AgentRecord>,
}

#[derive(Clone, Debug)]
pub struct HallOfFame {
    max_agents: usize,
    records: Vec<AgentRecord>,
}

fn rank_order(a: &AgentRecord, b: &AgentRecord) -> Ordering {
    b.fitness()
        .total_cmp(&a.fitness())
        .then_with(|| a.meta.created_at.cmp(&b.meta.created_at))
}

impl HallOfFame {
    pub fn new(max_agents: usize) -> Self {
        Self {
            max_agents: max_agents.max(1),
            records: Vec::new(),
        }
    }

    pub fn max_agents(&self) -> usize {
        self.max_agents
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Members in rank order
    pub fn records(&self) -> &[AgentRecord] {
        &self.records
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.iter().any(|r| r.id() == id)
    }

    /// Lowest fitness currently held
    pub fn min_fitness(&self) -> Option<f32> {
        self.records.last().map(AgentRecord::fitness)
    }

    pub fn best(&self) -> Option<&AgentRecord> {
        self.records.first()
    }

    /// Top `n` members in rank order
    pub fn top(&self, n: usize) -> &[AgentRecord] {
        &self.records[..n.min(self.records.len())]
    }

    // ========================================================================
    // ADMISSION
    // ========================================================================

    /// Try to admit one record; returns whether it entered the Hall
    pub fn admit(&mut self, record: AgentRecord) -> bool {
        let fitness = record.fitness();
        if fitness.is_nan() || fitness <= 0.0 || self.contains(record.id()) {
            return false;
        }
        if self.records.len() >= self.max_agents {
            match self.min_fitness() {
                Some(min) if fitness > min => {
                    if let Some(evicted) = self.records.pop() {
                        debug!(evicted = %evicted.id(), fitness = evicted.fitness(), "hall of fame eviction");
                    }
                }
                _ => return false,
            }
        }
        let at = self
            .records
            .partition_point(|r| rank_order(r, &record) != Ordering::Greater);
        self.records.insert(at, record);
        true
    }

    /// Admit a batch in order; returns how many entered
    pub fn admit_many(&mut self, records: impl IntoIterator<Item = AgentRecord>, generation: u32) -> usize {
        let mut admitted = 0;
        for record in records {
            if self.admit(record) {
                admitted += 1;
            }
        }
        if admitted > 0 {
            info!(
                generation,
                admitted,
                size = self.records.len(),
                best = self.best().map(AgentRecord::fitness).unwrap_or(0.0),
                "hall of fame updated"
            );
        }
        admitted
    }

    // ========================================================================
    // STATISTICS
    // ========================================================================

    pub fn stats(&self) -> HofStats {
        if self.records.is_empty() {
            return HofStats::default();
        }
        let fitness: Vec<f32> = self.records.iter().map(AgentRecord::fitness).collect();
        let min = fitness.iter().copied().fold(f32::INFINITY, f32::min);
        let max = fitness.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mean = fitness.iter().sum::<f32>() / fitness.len() as f32;

        let mut style_histogram = BTreeMap::new();
        let mut generation_histogram = BTreeMap::new();
        for record in &self.records {
            *style_histogram.entry(record.meta.style_tag.clone()).or_insert(0) += 1;
            *generation_histogram.entry(record.generation()).or_insert(0) += 1;
        }
        let generation_range = match (
            generation_histogram.keys().next(),
            generation_histogram.keys().next_back(),
        ) {
            (Some(&lo), Some(&hi)) => Some((lo, hi)),
            _ => None,
        };

        HofStats {
            count: self.records.len(),
            best: Some(max),
            mean: Some(mean),
            fitness_range: Some((min, max)),
            generation_range,
            style_histogram,
            generation_histogram,
        }
    }

    // ========================================================================
    // PERSISTENCE
    // ========================================================================

    pub fn manifest(&self) -> HofManifest {
        HofManifest {
            experiment_info: ManifestInfo {
                max_agents: self.max_agents,
                last_updated: Utc::now(),
                total_agents: self.records.len(),
            },
            agents: self.records.clone(),
        }
    }

    /// Write `hall_of_fame.json` and rebuild `top_agents/` under `root`.
    ///
    /// The manifest is replaced atomically. Ranked sources are written to a
    /// staging directory that is swapped in for the previous one.
    pub fn persist(&self, root: &Path) -> Result<(), PersistenceError> {
        write_json_atomic(&root.join(HALL_OF_FAME_FILE), &self.manifest())?;

        let live = root.join(TOP_AGENTS_DIR);
        let staging = root.join(format!(".{}.staging", TOP_AGENTS_DIR));
        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(|e| PersistenceError::io("clear", &staging, e))?;
        }
        ensure_dir(&staging)?;
        for (i, record) in self.records.iter().enumerate() {
            let name = top_agent_name(i + 1, record.fitness(), record.generation(), record.id());
            write_file(&staging.join(name), &record.to_agent_file()?)?;
        }
        if live.exists() {
            fs::remove_dir_all(&live).map_err(|e| PersistenceError::io("remove", &live, e))?;
        }
        fs::rename(&staging, &live).map_err(|e| PersistenceError::io("rename", &live, e))
    }

    /// Restore a Hall of Fame from a persisted manifest.
    ///
    /// Records are re-admitted, so the loaded Hall satisfies the usual
    /// ordering and bound even if the file was edited.
    pub fn load(path: &Path) -> Result<Self, PersistenceError> {
        let manifest: HofManifest = read_json(path)?;
        let mut hall = HallOfFame::new(manifest.experiment_info.max_agents);
        for record in manifest.agents {
            hall.admit(record);
        }
        Ok(hall)
    }

    /// Same as [`HallOfFame::load`] with a different capacity
    pub fn load_with_capacity(path: &Path, max_agents: usize) -> Result<Self, PersistenceError> {
        let loaded = Self::load(path)?;
        let mut hall = HallOfFame::new(max_agents);
        for record in loaded.records {
            hall.admit(record);
        }
        Ok(hall)
    }
}
