//! Native function registry.
//!
//! Scripts reach native code through `CALL_GLOBAL name argc`. The name is
//! resolved against a [`FunctionRegistry`] built once by the embedder and
//! shared read-only by every run; per-run state is only reachable through
//! the [`StlContext`] handed to each call.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::error::{VmError, VmResult};
use crate::op::RegexCache;
use crate::util::fast_map::{FastHashMap, fast_hash_map_with_capacity};
use crate::val::Value;

mod builtins;


/// Signature of every native function.
pub type NativeFunction = fn(args: &[Value], ctx: &mut dyn StlContext) -> VmResult<Value>;

/// Whether a function depends on state outside its arguments (clock, stdout).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purity {
    Pure,
    Impure,
}

#[derive(Debug, Clone, Copy)]
pub struct StlFunction {
    pub name: &'static str,
    pub min_args: usize,
    /// `None` for variadic functions.
    pub max_args: Option<usize>,
    pub purity: Purity,
    pub func: NativeFunction,
}

impl StlFunction {
    pub const fn pure(name: &'static str, min_args: usize, max_args: Option<usize>, func: NativeFunction) -> Self {
        Self {
            name,
            min_args,
            max_args,
            purity: Purity::Pure,
            func,
        }
    }

    pub const fn impure(name: &'static str, min_args: usize, max_args: Option<usize>, func: NativeFunction) -> Self {
        Self {
            name,
            min_args,
            max_args,
            purity: Purity::Impure,
            func,
        }
    }

    /// Human-readable accepted argument count, e.g. `1`, `1 to 3`, `at least 2`.
    pub fn expected_arity(&self) -> String {
        match self.max_args {
            Some(max) if max == self.min_args => max.to_string(),
            Some(max) => format!("{} to {}", self.min_args, max),
            None => format!("at least {}", self.min_args),
        }
    }

    pub fn check_arity(&self, got: usize) -> VmResult<()> {
        if got < self.min_args || self.max_args.is_some_and(|max| got > max) {
            return Err(VmError::Arity {
                name: self.name.to_string(),
                expected: self.expected_arity(),
                got,
            });
        }
        Ok(())
    }

    /// Arity check followed by the call.
    #[inline]
    pub fn invoke(&self, args: &[Value], ctx: &mut dyn StlContext) -> VmResult<Value> {
        self.check_arity(args.len())?;
        (self.func)(args, ctx)
    }
}

/// Per-run services available to native functions.
pub trait StlContext {
    /// Appends one line to the run's captured stdout.
    fn print(&mut self, line: String);

    /// The run's clock. Fixed by the embedder for deterministic runs.
    fn now(&self) -> DateTime<Utc>;

    fn team_id(&self) -> Option<i64>;

    /// Calls a script closure (or a registry function referenced as a value)
    /// from native code and returns its result. Errors thrown by the callee
    /// propagate as `VmError::Uncaught` and stay catchable by the script.
    fn call(&mut self, callee: &Value, args: Vec<Value>) -> VmResult<Value>;

    fn regex_cache(&mut self) -> &mut RegexCache;
}

/// A named group of native functions.
pub trait Module: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn enabled(&self) -> bool {
        true
    }

    fn functions(&self) -> Vec<StlFunction>;

    fn register(&self, registry: &mut FunctionRegistry) -> VmResult<()> {
        for func in self.functions() {
            registry.register(func)?;
        }
        Ok(())
    }
}

/// Name to native function lookup. Immutable while runs are executing, so a
/// single registry can back any number of concurrent runs.
#[derive(Debug, Clone)]
pub struct FunctionRegistry {
    functions: FastHashMap<&'static str, StlFunction>,
    modules: Vec<String>,
}

impl FunctionRegistry {
    /// Registry holding the core builtins (`print`, `typeof`, error
    /// constructors).
    pub fn new() -> Self {
        let mut registry = Self::empty();
        for func in builtins::functions() {
            registry.functions.insert(func.name, func);
        }
        registry.modules.push(builtins::MODULE_NAME.to_string());
        registry
    }

    pub fn empty() -> Self {
        Self {
            functions: fast_hash_map_with_capacity(128),
            modules: Vec::new(),
        }
    }

    pub fn register(&mut self, func: StlFunction) -> VmResult<()> {
        if self.functions.contains_key(func.name) {
            return Err(VmError::InvalidOperation(format!(
                "Function '{}' is already registered",
                func.name
            )));
        }
        self.functions.insert(func.name, func);
        Ok(())
    }

    pub fn register_module(&mut self, module: &dyn Module) -> VmResult<()> {
        if module.enabled() {
            module.register(self)?;
            tracing::debug!(module = module.name(), total = self.functions.len(), "registered module");
        }
        self.modules.push(module.name().to_string());
        Ok(())
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&StlFunction> {
        self.functions.get(name)
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Sorted function names.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.functions.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn module_names(&self) -> &[String] {
        &self.modules
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Argument `idx`, or null when the caller passed fewer.
#[inline]
pub fn arg(args: &[Value], idx: usize) -> Value {
    args.get(idx).cloned().unwrap_or_default()
}

fn bad_arg(name: &str, idx: usize, expected: &str, got: Option<&Value>) -> VmError {
    VmError::type_mismatch(format!(
        "{name}() expects {expected} as argument {}, got {}",
        idx + 1,
        got.map_or("nothing", Value::type_name)
    ))
}

pub fn str_arg<'a>(name: &str, args: &'a [Value], idx: usize) -> VmResult<&'a str> {
    args.get(idx)
        .and_then(Value::as_str)
        .ok_or_else(|| bad_arg(name, idx, "a string", args.get(idx)))
}

pub fn int_arg(name: &str, args: &[Value], idx: usize) -> VmResult<i64> {
    match args.get(idx) {
        Some(Value::Int(i)) => Ok(*i),
        Some(Value::Float(f)) if f.fract() == 0.0 && f.is_finite() => Ok(*f as i64),
        other => Err(bad_arg(name, idx, "an integer", other)),
    }
}

pub fn num_arg(name: &str, args: &[Value], idx: usize) -> VmResult<f64> {
    args.get(idx)
        .and_then(Value::as_f64)
        .ok_or_else(|| bad_arg(name, idx, "a number", args.get(idx)))
}

/// Elements of an array or tuple argument.
pub fn items_arg(name: &str, args: &[Value], idx: usize) -> VmResult<Vec<Value>> {
    args.get(idx)
        .and_then(Value::as_items)
        .ok_or_else(|| bad_arg(name, idx, "an array", args.get(idx)))
}
