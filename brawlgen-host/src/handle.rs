//! Admitted agents and their execution accounting

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use brawlgen_core::{Action, Controller, StateVector, STATE_LEN};

use crate::clean::{clean_source, seed_from_digest, source_digest};
use crate::error::{AdmissionError, AgentRuntimeError, ScriptError};
use crate::script::{parse, Interpreter, Limits, Namespace, Value};
use crate::validate::{validate, ENTRYPOINT};

/// Limits applied to every admitted agent
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Maximum source lines accepted at admission
    pub max_lines: usize,
    /// Maximum source characters accepted at admission
    pub max_chars: usize,
    /// Wall-clock budget for one `act` call
    pub act_timeout_ms: u64,
    /// Instruction budget for one `act` call
    pub act_fuel: u64,
    /// Wall-clock budget for running the module body
    pub init_timeout_ms: u64,
    /// Instruction budget for running the module body
    pub init_fuel: u64,
    /// Maximum nested function calls
    pub max_call_depth: usize,
    /// Errors tolerated before the agent is disabled
    pub max_errors: u32,
    /// Timeouts tolerated before the agent is disabled
    pub max_timeouts: u32,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            max_lines: 1400,
            max_chars: 40_000,
            act_timeout_ms: 20,
            act_fuel: 200_000,
            init_timeout_ms: 1000,
            init_fuel: 2_000_000,
            max_call_depth: 64,
            max_errors: 20,
            max_timeouts: 10,
        }
    }
}

impl HostConfig {
    fn act_limits(&self, started: Instant) -> Limits {
        Limits {
            fuel: self.act_fuel,
            max_depth: self.max_call_depth,
            deadline: Some(started + Duration::from_millis(self.act_timeout_ms)),
        }
    }

    fn init_limits(&self) -> Limits {
        Limits {
            fuel: self.init_fuel,
            max_depth: self.max_call_depth,
            deadline: Some(Instant::now() + Duration::from_millis(self.init_timeout_ms)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Valid,
    Disabled,
}

/// Snapshot of a handle's counters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentStats {
    pub id: String,
    pub digest: String,
    pub status: AgentStatus,
    pub call_count: u64,
    pub error_count: u32,
    pub timeout_count: u32,
    pub mean_exec_time_ms: f64,
}

/// An admitted agent.
///
/// The module namespace persists between calls (agents may keep state in
/// globals). Counters are atomic so a handle can be shared by reference
/// across match workers.
pub struct AgentHandle {
    id: String,
    source: String,
    digest: String,
    config: HostConfig,
    namespace: Mutex<Namespace>,
    disabled: AtomicBool,
    call_count: AtomicU64,
    error_count: AtomicU32,
    timeout_count: AtomicU32,
    total_exec_nanos: AtomicU64,
}

impl fmt::Debug for AgentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentHandle")
            .field("id", &self.id)
            .field("digest", &self.digest)
            .field("status", &self.status())
            .finish()
    }
}

fn admission_syntax(err: ScriptError) -> AdmissionError {
    match err {
        ScriptError::Syntax { line, message } => AdmissionError::Syntax { line, message },
        other => AdmissionError::Syntax {
            line: 0,
            message: other.to_string(),
        },
    }
}

fn check_length(source: &str, config: &HostConfig) -> Result<(), AdmissionError> {
    let lines = source.lines().count();
    let chars = source.chars().count();
    if lines > config.max_lines || chars > config.max_chars {
        return Err(AdmissionError::TooLong {
            lines,
            chars,
            max_lines: config.max_lines,
            max_chars: config.max_chars,
        });
    }
    Ok(())
}

impl AgentHandle {
    // ========================================================================
    // ADMISSION
    // ========================================================================

    /// Validate and load a candidate.
    ///
    /// Checks run in order: length, parse, denylist, import allowlist,
    /// entrypoint, then a smoke call of `act` on the zero state in a scratch
    /// namespace. On success the module body is run again in a fresh
    /// namespace so smoke-call side effects do not leak into play.
    pub fn admit(
        id: impl Into<String>,
        raw_source: &str,
        config: &HostConfig,
    ) -> Result<Self, AdmissionError> {
        let id = id.into();
        let source = clean_source(raw_source);

        check_length(&source, config)?;
        let module = parse(&source).map_err(admission_syntax)?;
        validate(&module)?;

        let digest = source_digest(&source);
        let seed = seed_from_digest(&digest);

        let mut scratch = Namespace::new(seed);
        guarded(|| Interpreter::new(&mut scratch, config.init_limits()).exec_module(&module))
            .map_err(|e| AdmissionError::Runtime(format!("module body: {}", e)))?;
        guarded(|| {
            Interpreter::new(&mut scratch, config.init_limits())
                .call_global(ENTRYPOINT, vec![Value::float_list(&[0.0; STATE_LEN])])
        })
        .map_err(|e| AdmissionError::Runtime(format!("{}(zero state): {}", ENTRYPOINT, e)))?;

        let mut namespace = Namespace::new(seed);
        guarded(|| Interpreter::new(&mut namespace, config.init_limits()).exec_module(&module))
            .map_err(|e| AdmissionError::Runtime(format!("module body: {}", e)))?;

        debug!(agent = %id, digest = %digest, "agent admitted");

        Ok(Self {
            id,
            source,
            digest,
            config: config.clone(),
            namespace: Mutex::new(namespace),
            disabled: AtomicBool::new(false),
            call_count: AtomicU64::new(0),
            error_count: AtomicU32::new(0),
            timeout_count: AtomicU32::new(0),
            total_exec_nanos: AtomicU64::new(0),
        })
    }

    // ========================================================================
    // EXECUTION
    // ========================================================================

    /// Choose an action. Never fails: faults are counted and yield `Idle`.
    pub fn act(&self, state: &StateVector) -> Action {
        if self.is_disabled() {
            return Action::Idle;
        }
        self.call_count.fetch_add(1, Ordering::Relaxed);

        match self.invoke(state) {
            Ok(action) => action,
            Err(fault) => {
                self.record_fault(&fault);
                Action::Idle
            }
        }
    }

    fn invoke(&self, state: &StateVector) -> Result<Action, AgentRuntimeError> {
        let mut namespace = self
            .namespace
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let started = Instant::now();
        let result = guarded(|| {
            Interpreter::new(&mut namespace, self.config.act_limits(started))
                .call_global(ENTRYPOINT, vec![Value::float_list(state.as_slice())])
        });
        let elapsed = started.elapsed();
        drop(namespace);

        self.total_exec_nanos
            .fetch_add(elapsed.as_nanos().min(u64::MAX as u128) as u64, Ordering::Relaxed);

        if elapsed > Duration::from_millis(self.config.act_timeout_ms) {
            return Err(AgentRuntimeError::Timeout);
        }
        match result {
            Ok(value) => action_from_value(&value),
            Err(ScriptError::Timeout) => Err(AgentRuntimeError::Timeout),
            Err(e) => Err(AgentRuntimeError::Raised(e.to_string())),
        }
    }

    fn record_fault(&self, fault: &AgentRuntimeError) {
        let (errors, timeouts) = match fault {
            AgentRuntimeError::Timeout => (
                self.error_count.load(Ordering::Relaxed),
                self.timeout_count.fetch_add(1, Ordering::Relaxed) + 1,
            ),
            _ => (
                self.error_count.fetch_add(1, Ordering::Relaxed) + 1,
                self.timeout_count.load(Ordering::Relaxed),
            ),
        };
        debug!(agent = %self.id, %fault, errors, timeouts, "agent fault");

        if errors > self.config.max_errors || timeouts > self.config.max_timeouts {
            let was_disabled = self.disabled.swap(true, Ordering::AcqRel);
            if !was_disabled {
                warn!(
                    agent = %self.id,
                    errors,
                    timeouts,
                    "agent disabled after exceeding fault budget"
                );
            }
        }
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Cleaned source text
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Acquire)
    }

    pub fn status(&self) -> AgentStatus {
        if self.is_disabled() {
            AgentStatus::Disabled
        } else {
            AgentStatus::Valid
        }
    }

    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn timeout_count(&self) -> u32 {
        self.timeout_count.load(Ordering::Relaxed)
    }

    pub fn mean_exec_time(&self) -> Duration {
        let calls = self.call_count();
        if calls == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.total_exec_nanos.load(Ordering::Relaxed) / calls)
    }

    pub fn stats(&self) -> AgentStats {
        AgentStats {
            id: self.id.clone(),
            digest: self.digest.clone(),
            status: self.status(),
            call_count: self.call_count(),
            error_count: self.error_count(),
            timeout_count: self.timeout_count(),
            mean_exec_time_ms: self.mean_exec_time().as_secs_f64() * 1000.0,
        }
    }
}

fn action_from_value(value: &Value) -> Result<Action, AgentRuntimeError> {
    let index = match value {
        Value::Int(i) => *i,
        Value::Bool(b) => *b as i64,
        other => {
            return Err(AgentRuntimeError::InvalidReturn(format!(
                "expected int, got {}",
                other.type_name()
            )))
        }
    };
    Action::from_index(index).map_err(|e| AgentRuntimeError::InvalidReturn(e.to_string()))
}

impl Controller for AgentHandle {
    fn id(&self) -> &str {
        &self.id
    }

    fn act(&self, state: &StateVector) -> Action {
        AgentHandle::act(self, state)
    }
}

/// Run interpreter work, turning a panic into a runtime error
fn guarded<T>(work: impl FnOnce() -> Result<T, ScriptError>) -> Result<T, ScriptError> {
    panic::catch_unwind(AssertUnwindSafe(work)).unwrap_or_else(|payload| {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        warn!(%message, "interpreter panicked");
        Err(ScriptError::runtime(format!("interpreter panic: {}", message)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &str = "def act(state):\n    return 1\n";

    fn admit(source: &str) -> Result<AgentHandle, AdmissionError> {
        AgentHandle::admit("test-agent", source, &HostConfig::default())
    }

    fn state() -> StateVector {
        StateVector::zeros()
    }

    #[test]
    fn test_admit_simple_agent() {
        let handle = admit(SIMPLE).unwrap();
        assert_eq!(handle.status(), AgentStatus::Valid);
        assert_eq!(handle.digest().len(), 16);
        assert_eq!(handle.act(&state()), Action::MoveLeft);
        assert_eq!(handle.call_count(), 1);
        assert_eq!(handle.error_count(), 0);
    }

    #[test]
    fn test_handle_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AgentHandle>();
    }

    #[test]
    fn test_forbidden_import_rejected() {
        let err = admit("import os\ndef act(s):\n    return 0\n").unwrap_err();
        assert_eq!(err.kind(), "forbidden_import");
    }

    #[test]
    fn test_out_of_range_return_counts_error() {
        // Admission does not inspect the smoke call's return value
        let handle = admit("def act(s):\n    return 42\n").unwrap();
        assert_eq!(handle.act(&state()), Action::Idle);
        assert_eq!(handle.error_count(), 1);
        assert_eq!(handle.status(), AgentStatus::Valid);
    }

    #[test]
    fn test_non_integer_return_counts_error() {
        let handle = admit("def act(s):\n    return 'punch'\n").unwrap();
        assert_eq!(handle.act(&state()), Action::Idle);
        assert_eq!(handle.error_count(), 1);
    }

    #[test]
    fn test_disabled_after_error_budget() {
        let config = HostConfig::default();
        let handle = admit("def act(s):\n    return 42\n").unwrap();
        for _ in 0..=config.max_errors {
            assert_eq!(handle.act(&state()), Action::Idle);
        }
        assert_eq!(handle.status(), AgentStatus::Disabled);
        let calls = handle.call_count();
        assert_eq!(handle.act(&state()), Action::Idle);
        // No invocation once disabled
        assert_eq!(handle.call_count(), calls);
    }

    #[test]
    fn test_timeouts_disable_handle() {
        let source = "calls = 0\n\
                      def act(s):\n    global calls\n    calls += 1\n    if calls > 1:\n        while True:\n            pass\n    return 0\n";
        let handle = admit(source).unwrap();
        let config = HostConfig::default();
        // First live call is fast (the smoke call ran in a scratch namespace)
        assert_eq!(handle.act(&state()), Action::Idle);
        assert_eq!(handle.timeout_count(), 0);
        for _ in 0..=config.max_timeouts {
            handle.act(&state());
        }
        assert_eq!(handle.timeout_count(), config.max_timeouts + 1);
        assert_eq!(handle.status(), AgentStatus::Disabled);
    }

    #[test]
    fn test_globals_persist_between_calls() {
        let source = "step = 0\ndef act(s):\n    global step\n    step += 1\n    return step % 10\n";
        let handle = admit(source).unwrap();
        assert_eq!(handle.act(&state()), Action::MoveLeft);
        assert_eq!(handle.act(&state()), Action::MoveRight);
        assert_eq!(handle.act(&state()), Action::Jump);
        assert_eq!(handle.act(&state()), Action::Punch);
    }

    #[test]
    fn test_smoke_failure_is_runtime_error() {
        let err = admit("def act(s):\n    return s[100]\n").unwrap_err();
        assert_eq!(err.kind(), "runtime");
        let err = admit("x = 1 / 0\ndef act(s):\n    return 0\n").unwrap_err();
        assert_eq!(err.kind(), "runtime");
    }

    #[test]
    fn test_extreme_slice_steps_do_not_crash_admission() {
        let source = "def act(s):\n    t = s[1::9223372036854775807]\n    u = s[::-9223372036854775807]\n    return len(t) + len(u) - 2\n";
        let handle = admit(source).unwrap();
        assert_eq!(handle.act(&state()), Action::Idle);
        assert_eq!(handle.stats().error_count, 0);
    }

    #[test]
    fn test_deeply_nested_source_is_syntax_error() {
        let source = format!("def act(s):\n    return {}0{}\n", "(".repeat(19_000), ")".repeat(19_000));
        assert!(source.chars().count() < HostConfig::default().max_chars);
        let err = admit(&source).unwrap_err();
        assert_eq!(err.kind(), "syntax");
    }

    #[test]
    fn test_interpreter_panic_maps_to_runtime_error() {
        let result: Result<(), ScriptError> = guarded(|| panic!("boom"));
        match result {
            Err(ScriptError::Runtime(message)) => assert!(message.contains("boom")),
            other => panic!("expected runtime error, got {:?}", other),
        }
    }

    #[test]
    fn test_state_is_visible_to_agent() {
        let source = "def act(s):\n    return 4 if s[0] > 0.5 else 6\n";
        let handle = admit(source).unwrap();
        let mut values = [0.0f32; STATE_LEN];
        values[0] = 0.9;
        assert_eq!(handle.act(&StateVector::from(values)), Action::Punch);
        assert_eq!(handle.act(&state()), Action::Block);
    }

    #[test]
    fn test_length_boundaries() {
        let config = HostConfig {
            max_lines: 5,
            max_chars: 10_000,
            ..HostConfig::default()
        };
        let at_limit = "x = 1\ny = 2\nz = 3\ndef act(s):\n    return 0";
        assert!(AgentHandle::admit("a", at_limit, &config).is_ok());
        let over = format!("w = 0\n{}", at_limit);
        let err = AgentHandle::admit("a", &over, &config).unwrap_err();
        assert_eq!(err.kind(), "too_long");

        let body = "def act(s):\n    return 0";
        let config = HostConfig {
            max_chars: body.chars().count(),
            ..HostConfig::default()
        };
        assert!(AgentHandle::admit("a", body, &config).is_ok());
        let config = HostConfig {
            max_chars: body.chars().count() - 1,
            ..HostConfig::default()
        };
        assert_eq!(
            AgentHandle::admit("a", body, &config).unwrap_err().kind(),
            "too_long"
        );
    }

    #[test]
    fn test_digest_uses_cleaned_source() {
        let fenced = format!("```python\n{}```", SIMPLE);
        let a = admit(SIMPLE).unwrap();
        let b = admit(&fenced).unwrap();
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.source(), b.source());
    }

    #[test]
    fn test_stats_snapshot() {
        let handle = admit(SIMPLE).unwrap();
        handle.act(&state());
        let stats = handle.stats();
        assert_eq!(stats.call_count, 1);
        assert_eq!(stats.status, AgentStatus::Valid);
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"valid\""));
    }
}
