mod call;
mod frame;
mod run;
mod stack;
mod throw;

use std::rc::Rc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::error::{VmError, VmResult};
use crate::module::{FunctionRegistry, StlContext};
use crate::op::RegexCache;
use crate::util::fast_map::{FastHashMap, fast_hash_map_new};
use crate::val::{Callable, Closure, UpvalueRef, Value};

use super::bytecode::{CODE_START, Program};
use super::context::ExecOptions;
use super::exec::{Globals, Telemetry, TraceEntry};

use frame::{CallFrame, TryMarker};
use stack::FootprintCache;

/// Interpreter state for one invocation.
///
/// A `Vm` borrows the program, registry and globals, owns everything it
/// mutates, and is dropped when the run ends. Nothing in it is shared with
/// other runs.
pub struct Vm<'a> {
    program: &'a Program,
    registry: &'a FunctionRegistry,
    globals: &'a Globals,
    options: &'a ExecOptions,

    stack: Vec<Value>,
    mem_stack: Vec<usize>,
    mem_used: usize,
    max_mem_used: usize,
    footprints: FootprintCache,
    frames: Vec<CallFrame>,
    tries: Vec<TryMarker>,
    /// Upvalues still pointing into the stack, sorted by slot.
    open_upvalues: Vec<UpvalueRef>,
    declared: FastHashMap<Rc<str>, Rc<Callable>>,

    ops: u64,
    started: Instant,
    now: DateTime<Utc>,
    stdout: Vec<String>,
    trace: Vec<TraceEntry>,
    regex_cache: RegexCache,

    /// Error value of a throw that escaped a nested run, waiting to be
    /// rethrown by the native call that started it.
    pending_throw: Option<Value>,
    host_depth: usize,
}

impl<'a> Vm<'a> {
    pub fn new(
        program: &'a Program,
        registry: &'a FunctionRegistry,
        globals: &'a Globals,
        options: &'a ExecOptions,
    ) -> Self {
        Self {
            program,
            registry,
            globals,
            options,
            stack: Vec::with_capacity(64),
            mem_stack: Vec::with_capacity(64),
            mem_used: 0,
            max_mem_used: 0,
            footprints: FootprintCache::default(),
            frames: Vec::with_capacity(16),
            tries: Vec::new(),
            open_upvalues: Vec::new(),
            declared: fast_hash_map_new(),
            ops: 0,
            started: Instant::now(),
            now: options.now.unwrap_or_else(Utc::now),
            stdout: Vec::new(),
            trace: Vec::new(),
            regex_cache: RegexCache::new(),
            pending_throw: None,
            host_depth: 0,
        }
    }

    /// Runs the program from its first instruction to completion.
    pub fn run_main(&mut self) -> VmResult<Value> {
        let main = Rc::new(Closure::new(Callable::main(CODE_START)));
        self.frames.push(CallFrame {
            ip: CODE_START,
            stack_start: 0,
            closure: main,
        });
        self.run(0)
    }

    pub fn telemetry(&self) -> Telemetry {
        Telemetry {
            ops: self.ops,
            duration: self.started.elapsed(),
            bytecode_len: self.program.len(),
            max_memory_used: self.max_mem_used,
        }
    }

    /// Captured stdout lines and the instruction trace.
    pub fn into_output(self) -> (Vec<String>, Vec<TraceEntry>) {
        (self.stdout, self.trace)
    }

    pub fn stdout(&self) -> &[String] {
        &self.stdout
    }

    fn check_timeout(&self) -> VmResult<()> {
        let timeout = self.options.limits.timeout;
        if self.started.elapsed() > timeout {
            return Err(VmError::Timeout { timeout, ops: self.ops });
        }
        Ok(())
    }
}

impl StlContext for Vm<'_> {
    fn print(&mut self, line: String) {
        self.stdout.push(line);
    }

    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn team_id(&self) -> Option<i64> {
        self.options.team_id
    }

    fn call(&mut self, callee: &Value, args: Vec<Value>) -> VmResult<Value> {
        self.call_value(callee, args)
    }

    fn regex_cache(&mut self) -> &mut RegexCache {
        &mut self.regex_cache
    }
}
