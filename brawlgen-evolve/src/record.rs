//! Agent records and their on-disk source format
//!
//! An archived agent is a runnable source file whose first lines are a
//! docstring header:
//!
//! ```text
//! """
//! Agent: g001_03_iron-mantis
//! Metadata: {"id":"g001_03_iron-mantis","generation":1,...}
//! code_hash: 3f2a9c0d1b7e4a55
//! """
//! def act(state):
//!     ...
//! ```
//!
//! The header is a string-literal statement, so the file still admits as
//! an agent. `code_hash` is the digest of the body and makes edits evident.

use brawlgen_host::source_digest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;

/// File extension of archived agent sources
pub const AGENT_EXT: &str = "py";

const FENCE: &str = "\"\"\"";
const AGENT_PREFIX: &str = "Agent: ";
const METADATA_PREFIX: &str = "Metadata: ";
const HASH_PREFIX: &str = "code_hash: ";

/// Tournament standing snapshot stored with a record
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TournamentStats {
    pub rank: usize,
    pub wins: f32,
    pub games_played: u32,
    pub byes: u32,
    pub sos: f32,
    pub tournament_fitness: f32,
    pub ladder_fitness: Option<f32>,
    pub full_ladder: bool,
}

/// Everything known about an agent except its source
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentMeta {
    pub id: String,
    pub generation: u32,
    pub fitness: f32,
    pub win_rate: f32,
    pub avg_reward: f32,
    pub style_tag: String,
    pub created_at: DateTime<Utc>,
    pub code_hash: String,
    pub tournament_stats: TournamentStats,
    /// Parent ids; empty for seeded agents
    pub lineage: Vec<String>,
}

/// A Hall-of-Fame entry: metadata plus cleaned source
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    #[serde(flatten)]
    pub meta: AgentMeta,
    pub source: String,
}

impl AgentRecord {
    pub fn id(&self) -> &str {
        &self.meta.id
    }

    pub fn fitness(&self) -> f32 {
        self.meta.fitness
    }

    pub fn generation(&self) -> u32 {
        self.meta.generation
    }

    /// Render the on-disk form (header + body, trailing newline)
    pub fn to_agent_file(&self) -> Result<String, PersistenceError> {
        let metadata = serde_json::to_string(&self.meta)
            .map_err(|e| PersistenceError::Format(format!("metadata for {}: {}", self.meta.id, e)))?;
        Ok(format!(
            "{fence}\n{agent}{id}\n{meta}{json}\n{hash}{code_hash}\n{fence}\n{body}\n",
            fence = FENCE,
            agent = AGENT_PREFIX,
            id = self.meta.id,
            meta = METADATA_PREFIX,
            json = metadata,
            hash = HASH_PREFIX,
            code_hash = self.meta.code_hash,
            body = self.source,
        ))
    }

    /// Parse an on-disk agent file back into a record
    pub fn from_agent_file(text: &str) -> Result<Self, PersistenceError> {
        let parsed = parse_header(text)?;
        let meta: AgentMeta = serde_json::from_str(parsed.metadata)
            .map_err(|e| PersistenceError::Format(format!("metadata: {}", e)))?;
        if meta.id != parsed.agent {
            return Err(PersistenceError::Format(format!(
                "header names {} but metadata names {}",
                parsed.agent, meta.id
            )));
        }
        Ok(AgentRecord {
            meta,
            source: parsed.body.to_string(),
        })
    }
}

struct ParsedHeader<'a> {
    agent: &'a str,
    metadata: &'a str,
    code_hash: &'a str,
    body: &'a str,
}

fn missing(what: &str) -> PersistenceError {
    PersistenceError::Format(format!("missing {}", what))
}

fn take_line<'a>(rest: &mut &'a str, prefix: &str) -> Result<&'a str, PersistenceError> {
    let (line, tail) = rest.split_once('\n').ok_or_else(|| missing(prefix.trim()))?;
    *rest = tail;
    line.strip_prefix(prefix).ok_or_else(|| missing(prefix.trim()))
}

fn parse_header(text: &str) -> Result<ParsedHeader<'_>, PersistenceError> {
    let mut rest = text
        .strip_prefix(FENCE)
        .and_then(|r| r.strip_prefix('\n'))
        .ok_or_else(|| missing("opening docstring"))?;

    let agent = take_line(&mut rest, AGENT_PREFIX)?;
    let metadata = take_line(&mut rest, METADATA_PREFIX)?;
    let code_hash = take_line(&mut rest, HASH_PREFIX)?;

    let body = rest
        .strip_prefix(FENCE)
        .and_then(|b| b.strip_prefix('\n'))
        .ok_or_else(|| missing("closing docstring"))?;
    let body = body.strip_suffix('\n').unwrap_or(body);

    Ok(ParsedHeader {
        agent,
        metadata,
        code_hash,
        body,
    })
}

/// Source body of an agent file, or the whole text if it has no header
pub fn agent_body(text: &str) -> &str {
    parse_header(text).map(|h| h.body).unwrap_or(text)
}

/// Check an agent file's body against its embedded `code_hash`
pub fn verify_agent_file(text: &str) -> Result<bool, PersistenceError> {
    let header = parse_header(text)?;
    Ok(source_digest(header.body) == header.code_hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_record() -> AgentRecord {
        let source = "def act(state):\n    if state[22] < 0.1:\n        return 4\n    return 2".to_string();
        AgentRecord {
            meta: AgentMeta {
                id: "g001_03_iron-mantis".into(),
                generation: 1,
                fitness: 12.345,
                win_rate: 0.6,
                avg_reward: 3.3,
                style_tag: "aggressive".into(),
                created_at: Utc
                    .with_ymd_and_hms(2026, 10, 17, 9, 30, 0)
                    .single()
                    .expect("valid timestamp"),
                code_hash: source_digest(&source),
                tournament_stats: TournamentStats {
                    rank: 2,
                    wins: 2.5,
                    games_played: 3,
                    byes: 0,
                    sos: 0.4,
                    tournament_fitness: 8.1,
                    ladder_fitness: Some(14.2),
                    full_ladder: true,
                },
                lineage: vec!["g000_01_calm-owl".into(), "g000_04_sly-fox".into()],
            },
            source,
        }
    }

    #[test]
    fn test_agent_file_round_trip_is_byte_identical() {
        let record = sample_record();
        let text = record.to_agent_file().expect("render");
        let reloaded = AgentRecord::from_agent_file(&text).expect("parse");
        assert_eq!(reloaded, record);
        assert_eq!(reloaded.to_agent_file().expect("render"), text);
    }

    #[test]
    fn test_header_layout() {
        let text = sample_record().to_agent_file().expect("render");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "\"\"\"");
        assert_eq!(lines[1], "Agent: g001_03_iron-mantis");
        assert!(lines[2].starts_with("Metadata: {"));
        assert!(lines[3].starts_with("code_hash: "));
        assert_eq!(lines[4], "\"\"\"");
        assert_eq!(lines[5], "def act(state):");
        assert!(text.ends_with("return 2\n"));
    }

    #[test]
    fn test_verify_detects_tampering() {
        let text = sample_record().to_agent_file().expect("render");
        assert!(verify_agent_file(&text).expect("well formed"));

        let tampered = text.replace("return 2", "return 5");
        assert!(!verify_agent_file(&tampered).expect("well formed"));
    }

    #[test]
    fn test_agent_body_without_header() {
        assert_eq!(agent_body("def act(s):\n    return 0"), "def act(s):\n    return 0");
        let text = sample_record().to_agent_file().expect("render");
        assert_eq!(agent_body(&text), sample_record().source);
    }

    #[test]
    fn test_malformed_files_rejected() {
        assert!(AgentRecord::from_agent_file("def act(s): return 0").is_err());
        assert!(verify_agent_file("\"\"\"\nAgent: x\n\"\"\"\n").is_err());

        let text = sample_record().to_agent_file().expect("render");
        let mismatched = text.replacen("Agent: g001_03_iron-mantis", "Agent: someone-else", 1);
        assert!(AgentRecord::from_agent_file(&mismatched).is_err());
    }

    #[test]
    fn test_header_file_still_admits() {
        let text = sample_record().to_agent_file().expect("render");
        let handle = brawlgen_host::AgentHandle::admit("archived", &text, &Default::default());
        assert!(handle.is_ok(), "{:?}", handle.err());
    }
}
