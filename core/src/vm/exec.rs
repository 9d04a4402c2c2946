//! Execution controller: one call per top-level invocation.

use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{Value as JsonValue, json};

use crate::error::{VmError, VmResult};
use crate::module::FunctionRegistry;
use crate::op::Opcode;
use crate::val::Value;

use super::bytecode::Program;
use super::context::ExecOptions;
use super::vm::Vm;

/// Read-only input bindings, looked up by `GET_GLOBAL`.
pub type Globals = serde_json::Map<String, JsonValue>;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Telemetry {
    /// Executed instructions.
    pub ops: u64,
    #[serde(serialize_with = "serialize_millis")]
    pub duration: Duration,
    /// Tokens in the program, header included.
    pub bytecode_len: usize,
    /// High-water mark of the operand-stack memory estimate, in bytes.
    pub max_memory_used: usize,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64() * 1000.0)
}

/// One executed instruction, recorded in debug mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TraceEntry {
    pub ip: usize,
    pub opcode: Opcode,
    pub stack_depth: usize,
    pub call_depth: usize,
}

/// Outcome of a run. Output printed before a failure is kept.
#[derive(Debug)]
pub struct ExecResult {
    pub stdout: Vec<String>,
    pub return_value: Option<Value>,
    pub error: Option<VmError>,
    pub telemetry: Telemetry,
    pub trace: Vec<TraceEntry>,
}

impl ExecResult {
    fn failed(error: VmError, elapsed: Duration) -> Self {
        Self {
            stdout: Vec::new(),
            return_value: None,
            error: Some(error),
            telemetry: Telemetry {
                duration: elapsed,
                ..Telemetry::default()
            },
            trace: Vec::new(),
        }
    }

    #[inline]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// The return value, or the error that ended the run.
    pub fn into_result(self) -> VmResult<Value> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.return_value.unwrap_or_default()),
        }
    }

    /// Result record as JSON: `stdout`, `result`, `error`, `telemetry`.
    pub fn to_json(&self) -> JsonValue {
        json!({
            "stdout": self.stdout,
            "result": self.return_value.as_ref().map_or(JsonValue::Null, Value::to_json),
            "error": self.error.as_ref().map_or(JsonValue::Null, VmError::to_json),
            "telemetry": self.telemetry,
        })
    }
}

/// Runs `program` to completion under `options`.
///
/// Never panics on malformed bytecode and never returns early: every failure,
/// script-raised or VM-level, is reported through [`ExecResult::error`].
pub fn execute(program: &Program, globals: &Globals, registry: &FunctionRegistry, options: &ExecOptions) -> ExecResult {
    tracing::debug!(bytecode_len = program.len(), globals = globals.len(), "starting run");
    let mut vm = Vm::new(program, registry, globals, options);
    let outcome = vm.run_main();
    let telemetry = vm.telemetry();
    let (stdout, trace) = vm.into_output();

    let (return_value, error) = match outcome {
        Ok(value) => {
            tracing::debug!(ops = telemetry.ops, duration = ?telemetry.duration, "run finished");
            (Some(value), None)
        }
        Err(err) if err.is_script_error() => {
            tracing::debug!(kind = err.kind(), message = %err.message(), ops = telemetry.ops, "uncaught script error");
            (None, Some(err))
        }
        Err(err) => {
            tracing::warn!(kind = err.kind(), message = %err.message(), ops = telemetry.ops, "run aborted");
            (None, Some(err))
        }
    };

    ExecResult {
        stdout,
        return_value,
        error,
        telemetry,
        trace,
    }
}

/// Decodes JSON wire-format bytecode, then runs it like [`execute`].
pub fn execute_json(
    bytecode: &str,
    globals: &Globals,
    registry: &FunctionRegistry,
    options: &ExecOptions,
) -> ExecResult {
    let started = Instant::now();
    match Program::from_json_str(bytecode) {
        Ok(program) => execute(&program, globals, registry, options),
        Err(err) => {
            tracing::warn!(error = %err, "rejected bytecode");
            ExecResult::failed(err, started.elapsed())
        }
    }
}
