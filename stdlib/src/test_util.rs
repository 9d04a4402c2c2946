use hogvm_core::{BytecodeBuilder, ExecOptions, ExecResult, Globals, Value, VmResult, execute};
use serde_json::Value as JsonValue;

use crate::shared_registry;

pub fn run_with(
    build: impl FnOnce(&mut BytecodeBuilder),
    globals: &Globals,
    options: &ExecOptions,
) -> VmResult<ExecResult> {
    let mut b = BytecodeBuilder::new();
    build(&mut b);
    let program = b.build()?;
    Ok(execute(&program, globals, shared_registry()?, options))
}

pub fn eval(build: impl FnOnce(&mut BytecodeBuilder)) -> VmResult<Value> {
    run_with(build, &Globals::new(), &ExecOptions::default())?.into_result()
}

/// Calls `name` with `args`, each passed in through a global so that any
/// JSON value (boxed dates included) can be an argument.
pub fn call_with(name: &str, args: &[JsonValue], options: &ExecOptions) -> VmResult<Value> {
    let keys: Vec<String> = (0..args.len()).map(|i| format!("a{i}")).collect();
    let globals: Globals = keys.iter().cloned().zip(args.iter().cloned()).collect();
    let result = run_with(
        |b| {
            for key in &keys {
                b.get_global(&[key.as_str()]);
            }
            b.call_global(name, args.len()).ret();
        },
        &globals,
        options,
    )?;
    result.into_result()
}

pub fn call(name: &str, args: &[JsonValue]) -> VmResult<Value> {
    call_with(name, args, &ExecOptions::default())
}

/// `call`, with the result converted to JSON for easy comparison.
pub fn call_json(name: &str, args: &[JsonValue]) -> VmResult<JsonValue> {
    Ok(call(name, args)?.to_json())
}
