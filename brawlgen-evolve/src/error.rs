//! Error types for the evolution layer

use std::io;
use std::path::{Path, PathBuf};

use brawlgen_tournament::TournamentError;
use thiserror::Error;

/// Unusable experiment configuration
#[derive(Clone, Debug, PartialEq, Error)]
#[error("invalid configuration: {0}")]
pub struct ConfigError(pub String);

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        ConfigError(message.into())
    }
}

/// Failure of a proposal request
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("response contained no text")]
    EmptyResponse,
}

/// Failure writing or reading experiment state
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("{action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("json error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0} already holds an experiment")]
    AlreadyExists(PathBuf),

    #[error("malformed agent file: {0}")]
    Format(String),
}

impl PersistenceError {
    pub fn io(action: &'static str, path: &Path, source: io::Error) -> Self {
        PersistenceError::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn json(path: &Path, source: serde_json::Error) -> Self {
        PersistenceError::Json {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Why the generation loop stopped early
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation {generation}: only {valid} valid agents, need {required}")]
    InsufficientPopulation {
        generation: u32,
        valid: usize,
        required: usize,
    },

    #[error("cancelled during generation {generation}")]
    Cancelled { generation: u32 },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Tournament(#[from] TournamentError),

    #[error("experiment storage: {0}")]
    Persistence(#[from] PersistenceError),
}

impl GenerationError {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> u8 {
        match self {
            GenerationError::Cancelled { .. } => 130,
            _ => 1,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, GenerationError::Cancelled { .. })
    }
}
