pub(super) use std::time::Duration;

pub(super) use serde_json::json;

pub(super) use crate::{
    error::{VmError, VmResult},
    module::{FunctionRegistry, StlContext, StlFunction},
    op::Opcode,
    val::Value,
    vm::{BytecodeBuilder, ExecOptions, ExecResult, Globals, Program, execute, execute_json},
};

pub(super) fn assemble(build: impl FnOnce(&mut BytecodeBuilder)) -> Program {
    let mut b = BytecodeBuilder::new();
    build(&mut b);
    b.build().unwrap()
}

pub(super) fn run_full(
    build: impl FnOnce(&mut BytecodeBuilder),
    globals: &Globals,
    registry: &FunctionRegistry,
    options: &ExecOptions,
) -> ExecResult {
    execute(&assemble(build), globals, registry, options)
}

pub(super) fn run_with(build: impl FnOnce(&mut BytecodeBuilder), options: &ExecOptions) -> ExecResult {
    run_full(build, &Globals::new(), &FunctionRegistry::new(), options)
}

pub(super) fn run(build: impl FnOnce(&mut BytecodeBuilder)) -> ExecResult {
    run_with(build, &ExecOptions::default())
}

pub(super) fn eval(build: impl FnOnce(&mut BytecodeBuilder)) -> Value {
    run(build).into_result().unwrap()
}

pub(super) fn eval_err(build: impl FnOnce(&mut BytecodeBuilder)) -> VmError {
    run(build).into_result().unwrap_err()
}

pub(super) fn globals(value: serde_json::Value) -> Globals {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("globals must be an object, got {other}"),
    }
}

mod bytecode;
mod control_flow;
mod exceptions;
mod functions;
mod limits;
mod semantics;
