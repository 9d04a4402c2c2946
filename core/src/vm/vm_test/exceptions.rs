use super::*;

fn explode(_args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
    Err(VmError::script("ValueError", "bad input"))
}

/// `callWith(f)` calls `f()` and returns its result.
fn call_with(args: &[Value], ctx: &mut dyn StlContext) -> VmResult<Value> {
    ctx.call(&args[0], Vec::new())
}

fn registry() -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();
    registry.register(StlFunction::pure("explode", 0, Some(0), explode)).unwrap();
    registry.register(StlFunction::pure("callWith", 1, Some(1), call_with)).unwrap();
    registry
}

fn run_registry(build: impl FnOnce(&mut BytecodeBuilder)) -> ExecResult {
    run_full(build, &Globals::new(), &registry(), &ExecOptions::default())
}

/// Emits `throw Error(message)`.
fn throw_error(b: &mut BytecodeBuilder, kind: &str, message: &str) {
    b.string(message).call_global(kind, 1).throw();
}

#[test]
fn test_uncaught_error_keeps_stdout() {
    let result = run(|b| {
        b.string("hi").call_global("print", 1).pop();
        throw_error(b, "Error", "boom");
    });
    assert_eq!(result.stdout, vec!["hi".to_string()]);
    let err = result.error.expect("run should fail");
    assert!(err.is_script_error());
    assert_eq!(err.kind(), "Error");
    assert_eq!(err.message(), "boom");
}

#[test]
fn test_catch_reads_error_fields() {
    // try { throw Error('boom') } catch (e) { return e.message }
    let result = eval(|b| {
        let catch = b.new_label();
        let end = b.new_label();
        b.try_(catch);
        throw_error(b, "Error", "boom");
        b.pop_try().jump(end);
        b.mark(catch).string("message").op(Opcode::GetProperty);
        b.mark(end).ret();
    });
    assert_eq!(result, Value::from("boom"));
}

#[test]
fn test_catch_restores_stack_depth() {
    let result = eval(|b| {
        let catch = b.new_label();
        b.int(7);
        b.try_(catch).int(1).int(2).int(3);
        throw_error(b, "Error", "boom");
        b.mark(catch).pop();
    });
    assert_eq!(result, Value::Int(7));
}

#[test]
fn test_try_without_throw() {
    let result = eval(|b| {
        let catch = b.new_label();
        let end = b.new_label();
        b.try_(catch).int(1).pop_try().jump(end);
        b.mark(catch).pop().int(2);
        b.mark(end).ret();
    });
    assert_eq!(result, Value::Int(1));
}

#[test]
fn test_catch_across_frames() {
    let result = eval(|b| {
        let catch = b.new_label();
        let end = b.new_label();
        b.declare_fn("fail", 0, |b| {
            throw_error(b, "RetryError", "deep");
        });
        b.try_(catch).call_global("fail", 0).pop_try().jump(end);
        b.mark(catch).string("type").op(Opcode::GetProperty);
        b.mark(end).ret();
    });
    assert_eq!(result, Value::from("RetryError"));
}

#[test]
fn test_rethrow_from_catch() {
    let err = eval_err(|b| {
        let catch = b.new_label();
        b.try_(catch);
        throw_error(b, "Error", "first");
        b.mark(catch).pop();
        throw_error(b, "NotImplementedError", "second");
    });
    assert_eq!(err.kind(), "NotImplementedError");
    assert_eq!(err.message(), "second");
}

#[test]
fn test_stale_try_marker_dropped_on_return() {
    // A function that opens a try block and returns without POP_TRY must not
    // leave its handler behind for the caller.
    let err = eval_err(|b| {
        let inner_catch = b.new_label();
        b.declare_fn("leaky", 0, |b| {
            b.try_(inner_catch).null().ret();
            b.mark(inner_catch).string("caught").ret();
        });
        b.call_global("leaky", 0).pop();
        throw_error(b, "Error", "outside");
    });
    assert_eq!(err.message(), "outside");
}

#[test]
fn test_error_payload() {
    let err = eval_err(|b| {
        b.string("CustomError").string("with payload");
        b.string("code").int(7).dict(1);
        b.call_global("HogError", 3).throw();
    });
    assert_eq!(err.kind(), "CustomError");
    assert_eq!(err.payload(), Some(&json!({"code": 7})));
}

#[test]
fn test_throw_requires_error_value() {
    let err = eval_err(|b| {
        b.int(1).throw();
    });
    assert!(matches!(err, VmError::TypeMismatch(_)));
}

#[test]
fn test_throw_object_that_gained_error_shape() {
    // let e := {}; e.__hogError__ := true; e.type := 'ValueError'; e.message := 'assembled'; throw e
    let err = eval_err(|b| {
        b.dict(0);
        b.get_local(0).string("__hogError__").bool(true).op(Opcode::SetProperty);
        b.get_local(0).string("type").string("ValueError").op(Opcode::SetProperty);
        b.get_local(0).string("message").string("assembled").op(Opcode::SetProperty);
        b.get_local(0).throw();
    });
    assert!(err.is_script_error());
    assert_eq!(err.kind(), "ValueError");
    assert_eq!(err.message(), "assembled");
}

#[test]
fn test_pop_try_without_try() {
    let err = eval_err(|b| {
        b.pop_try();
    });
    assert!(matches!(err, VmError::InvalidOperation(_)));
}

#[test]
fn test_native_error_is_catchable() {
    let result = run_registry(|b| {
        let catch = b.new_label();
        let end = b.new_label();
        b.try_(catch).call_global("explode", 0).pop_try().jump(end);
        b.mark(catch).string("type").op(Opcode::GetProperty);
        b.mark(end).ret();
    });
    assert_eq!(result.into_result().unwrap(), Value::from("ValueError"));
}

#[test]
fn test_native_error_uncaught() {
    let err = run_registry(|b| {
        b.call_global("explode", 0).ret();
    })
    .into_result()
    .unwrap_err();
    assert_eq!(err.kind(), "ValueError");
    assert_eq!(err.message(), "bad input");
}

#[test]
fn test_throw_inside_callback_caught_outside() {
    let result = run_registry(|b| {
        let catch = b.new_label();
        let end = b.new_label();
        b.function("thrower", 0, 0, |b| {
            throw_error(b, "RetryError", "from callback");
        })
        .closure(&[]);
        b.try_(catch).get_local(0).call_global("callWith", 1).pop_try().jump(end);
        b.mark(catch).string("message").op(Opcode::GetProperty);
        b.mark(end).ret();
    });
    assert_eq!(result.into_result().unwrap(), Value::from("from callback"));
}

#[test]
fn test_throw_inside_callback_caught_inside() {
    let result = run_registry(|b| {
        b.function("safe", 0, 0, |b| {
            let catch = b.new_label();
            b.try_(catch);
            throw_error(b, "Error", "inner");
            b.mark(catch).string("message").op(Opcode::GetProperty).ret();
        })
        .closure(&[]);
        b.get_local(0).call_global("callWith", 1).ret();
    });
    assert_eq!(result.into_result().unwrap(), Value::from("inner"));
}

#[test]
fn test_vm_faults_are_not_catchable() {
    let err = eval_err(|b| {
        let catch = b.new_label();
        b.try_(catch).call_global("missing", 0).pop_try();
        b.mark(catch).ret();
    });
    assert!(matches!(err, VmError::UnknownFunction(_)));
}
