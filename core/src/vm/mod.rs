//! Bytecode VM subsystem
//!
//! Wire-format decoding, the programmatic assembler, execution options and
//! the interpreter. [`execute`] is the entry point for a single run.

mod builder;
mod bytecode;
mod context;
mod exec;
#[allow(clippy::module_inception)]
mod vm;

pub use builder::{BytecodeBuilder, Label};
pub use bytecode::*;
pub use context::*;
pub use exec::{ExecResult, Globals, Telemetry, TraceEntry, execute, execute_json};
pub use vm::Vm;

#[cfg(test)]
mod vm_test;
