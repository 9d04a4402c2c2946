//! HogVM core: values, the instruction set, the native function registry and
//! the bytecode interpreter.

pub mod error;
pub mod module;
pub mod op;
pub mod util;
pub mod val;
pub mod vm;


pub use error::{ErrorCategory, ScriptError, VmError, VmResult};
pub use module::{FunctionRegistry, Module, StlContext, StlFunction};
pub use op::Opcode;
pub use val::Value;
pub use vm::{BytecodeBuilder, ExecOptions, ExecResult, Globals, Limits, Program, execute, execute_json};
