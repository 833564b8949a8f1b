//! Experiment directory layout and file writing primitives
//!
//! Level 4 - Utilities

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::PersistenceError;
use crate::record::AGENT_EXT;

pub const CONFIG_FILE: &str = "config.json";
pub const EVENT_LOG_FILE: &str = "experiment.log";
pub const SUMMARY_FILE: &str = "evolution_summary.json";
pub const HALL_OF_FAME_FILE: &str = "hall_of_fame.json";
pub const README_FILE: &str = "README.md";
pub const TOURNAMENT_DIR: &str = "tournament_logs";
pub const SNAPSHOT_DIR: &str = "generation_snapshots";
pub const TOP_AGENTS_DIR: &str = "top_agents";
pub const AGENT_ARCHIVE_DIR: &str = "agent_archive";
pub const ANALYSIS_DIR: &str = "analysis";
pub const REPORT_FILE: &str = "experiment_report.md";

/// Subdirectories created with every experiment
pub const SUBDIRS: [&str; 5] = [
    TOURNAMENT_DIR,
    SNAPSHOT_DIR,
    TOP_AGENTS_DIR,
    AGENT_ARCHIVE_DIR,
    ANALYSIS_DIR,
];

pub fn tournament_log_name(generation: u32) -> String {
    format!("generation_{:03}_tournament.json", generation)
}

pub fn snapshot_name(generation: u32) -> String {
    format!("generation_{:03}_population.json", generation)
}

/// `rank_{NNN}_fitness_{F.F}_gen_{G}_{id}.py`
pub fn top_agent_name(rank: usize, fitness: f32, generation: u32, id: &str) -> String {
    format!(
        "rank_{:03}_fitness_{:.1}_gen_{}_{}.{}",
        rank, fitness, generation, id, AGENT_EXT
    )
}

pub fn archive_name(id: &str) -> String {
    format!("{}.{}", id, AGENT_EXT)
}

pub fn ensure_dir(path: &Path) -> Result<(), PersistenceError> {
    fs::create_dir_all(path).map_err(|e| PersistenceError::io("create directory", path, e))
}

/// Write a file via a sibling temp file and rename
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), PersistenceError> {
    let tmp = temp_sibling(path);
    let result = (|| {
        let mut file = File::create(&tmp).map_err(|e| PersistenceError::io("create", &tmp, e))?;
        file.write_all(contents)
            .map_err(|e| PersistenceError::io("write", &tmp, e))?;
        file.sync_all().map_err(|e| PersistenceError::io("sync", &tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| PersistenceError::io("rename", path, e))
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Serialize as pretty JSON and write atomically
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    let json = serde_json::to_vec_pretty(value).map_err(|e| PersistenceError::json(path, e))?;
    write_atomic(path, &json)
}

/// Write a file in one shot (no rename; for files written once)
pub fn write_file(path: &Path, contents: &str) -> Result<(), PersistenceError> {
    fs::write(path, contents).map_err(|e| PersistenceError::io("write", path, e))
}

/// Append one line and flush before returning
pub fn append_line(path: &Path, line: &str) -> Result<(), PersistenceError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| PersistenceError::io("open", path, e))?;
    writeln!(file, "{}", line).map_err(|e| PersistenceError::io("append", path, e))?;
    file.flush().map_err(|e| PersistenceError::io("flush", path, e))
}

pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, PersistenceError> {
    let text = fs::read_to_string(path).map_err(|e| PersistenceError::io("read", path, e))?;
    serde_json::from_str(&text).map_err(|e| PersistenceError::json(path, e))
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}
