use crate::error::VmResult;
use crate::val::{HogError, Value};

use super::{StlContext, StlFunction};

pub(super) const MODULE_NAME: &str = "core";

pub(super) fn functions() -> Vec<StlFunction> {
    vec![
        StlFunction::impure("print", 0, None, print),
        StlFunction::pure("typeof", 1, Some(1), type_of),
        StlFunction::pure("HogError", 1, Some(3), hog_error),
        StlFunction::pure("Error", 0, Some(2), error),
        StlFunction::pure("RetryError", 0, Some(2), retry_error),
        StlFunction::pure("NotImplementedError", 0, Some(2), not_implemented_error),
    ]
}

/// Prints its arguments separated by spaces. Strings print bare.
fn print(args: &[Value], ctx: &mut dyn StlContext) -> VmResult<Value> {
    let line = args.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ");
    ctx.print(line);
    Ok(Value::Null)
}

fn type_of(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
    Ok(Value::from(args.first().map_or("null", Value::type_name)))
}

/// `HogError(type, message?, payload?)`
fn hog_error(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
    Ok(Value::error(HogError::from_values(args.first(), args.get(1), args.get(2))))
}

fn typed_error(kind: &str, args: &[Value]) -> Value {
    Value::error(HogError::from_values(
        Some(&Value::from(kind)),
        args.first(),
        args.get(1),
    ))
}

fn error(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
    Ok(typed_error("Error", args))
}

fn retry_error(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
    Ok(typed_error("RetryError", args))
}

fn not_implemented_error(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
    Ok(typed_error("NotImplementedError", args))
}
