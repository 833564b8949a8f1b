//! Error types for agent admission and execution

use thiserror::Error;

/// Failure raised by the script front end or interpreter
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ScriptError {
    #[error("syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("{0}")]
    Runtime(String),

    /// Wall-clock deadline or instruction budget exceeded
    #[error("execution timed out")]
    Timeout,
}

impl ScriptError {
    pub fn runtime(message: impl Into<String>) -> Self {
        ScriptError::Runtime(message.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ScriptError::Timeout)
    }
}

/// Why a candidate source was refused a handle
#[derive(Clone, Debug, PartialEq, Error)]
pub enum AdmissionError {
    #[error("source too long: {lines} lines / {chars} chars (limits {max_lines} / {max_chars})")]
    TooLong {
        lines: usize,
        chars: usize,
        max_lines: usize,
        max_chars: usize,
    },

    #[error("syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("forbidden operation at line {line}: {what}")]
    ForbiddenOp { line: usize, what: String },

    #[error("forbidden import at line {line}: {module}")]
    ForbiddenImport { line: usize, module: String },

    #[error("missing entrypoint: {0}")]
    MissingEntrypoint(String),

    #[error("smoke invocation failed: {0}")]
    Runtime(String),
}

impl AdmissionError {
    /// Short machine-readable tag used in logs and experiment events
    pub fn kind(&self) -> &'static str {
        match self {
            AdmissionError::TooLong { .. } => "too_long",
            AdmissionError::Syntax { .. } => "syntax",
            AdmissionError::ForbiddenOp { .. } => "forbidden_op",
            AdmissionError::ForbiddenImport { .. } => "forbidden_import",
            AdmissionError::MissingEntrypoint(_) => "missing_entrypoint",
            AdmissionError::Runtime(_) => "runtime",
        }
    }
}

/// A fault observed while invoking an admitted agent.
///
/// These never escape `AgentHandle::act`; they are counted and mapped to
/// the fallback action.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum AgentRuntimeError {
    #[error("agent raised: {0}")]
    Raised(String),

    #[error("agent timed out")]
    Timeout,

    #[error("agent returned invalid action: {0}")]
    InvalidReturn(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_kinds() {
        let err = AdmissionError::ForbiddenImport {
            line: 1,
            module: "os".into(),
        };
        assert_eq!(err.kind(), "forbidden_import");
        assert!(err.to_string().contains("os"));
        assert_eq!(AdmissionError::Runtime("x".into()).kind(), "runtime");
    }
}
