use std::time::Duration;

use chrono::{DateTime, Utc};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_STEPS: u64 = 10_000_000;
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1000;
pub const DEFAULT_MAX_STACK_DEPTH: usize = 100_000;
pub const DEFAULT_MAX_MEMORY: usize = 64 * 1024 * 1024;
/// Nesting limit for native functions calling back into script closures.
pub const DEFAULT_MAX_HOST_DEPTH: usize = 64;
pub const DEFAULT_MAX_TRACE_ENTRIES: usize = 100_000;

/// Resource budget of a single run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    pub timeout: Duration,
    pub max_steps: u64,
    pub max_call_depth: usize,
    pub max_stack_depth: usize,
    pub max_memory: usize,
    pub max_host_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_steps: DEFAULT_MAX_STEPS,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_stack_depth: DEFAULT_MAX_STACK_DEPTH,
            max_memory: DEFAULT_MAX_MEMORY,
            max_host_depth: DEFAULT_MAX_HOST_DEPTH,
        }
    }
}

/// Per-invocation configuration.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    pub limits: Limits,
    /// Record an instruction trace. Never changes results.
    pub debug: bool,
    /// Cap on recorded trace entries; `0` means the default.
    pub max_trace_entries: usize,
    pub team_id: Option<i64>,
    /// Clock reading returned by `now()`. Defaults to the wall clock when the
    /// run starts.
    pub now: Option<DateTime<Utc>>,
}

impl ExecOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.limits.timeout = timeout;
        self
    }

    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.limits.max_steps = max_steps;
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.limits.max_call_depth = depth;
        self
    }

    pub fn with_max_stack_depth(mut self, depth: usize) -> Self {
        self.limits.max_stack_depth = depth;
        self
    }

    pub fn with_max_memory(mut self, bytes: usize) -> Self {
        self.limits.max_memory = bytes;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_team_id(mut self, team_id: Option<i64>) -> Self {
        self.team_id = team_id;
        self
    }

    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    pub(crate) fn trace_cap(&self) -> usize {
        if self.max_trace_entries == 0 {
            DEFAULT_MAX_TRACE_ENTRIES
        } else {
            self.max_trace_entries
        }
    }
}
