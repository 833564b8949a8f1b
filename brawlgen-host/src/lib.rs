//! BRAWLGEN Host - Sandboxed execution of proposed agents
//!
//! Candidate controller source goes through admission (cleaning, length
//! limits, parsing, static denylist/allowlist checks, a smoke call) and
//! comes out as an [`AgentHandle`]: a `Controller` whose every call is
//! metered, time-limited and fault-counted.

pub mod clean;
pub mod error;
pub mod handle;
pub mod script;
pub mod validate;

pub use clean::{clean_source, source_digest, DIGEST_LEN};
pub use error::{AdmissionError, AgentRuntimeError, ScriptError};
pub use handle::{AgentHandle, AgentStats, AgentStatus, HostConfig};
