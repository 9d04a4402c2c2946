use super::*;

fn registry_with(funcs: &[StlFunction]) -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();
    for func in funcs {
        registry.register(*func).unwrap();
    }
    registry
}

/// `applyTwice(f, x)` returns `f(f(x))`.
fn apply_twice(args: &[Value], ctx: &mut dyn StlContext) -> VmResult<Value> {
    let once = ctx.call(&args[0], vec![args[1].clone()])?;
    ctx.call(&args[0], vec![once])
}

#[test]
fn test_declared_function() {
    // fun add(a, b) { return a + b } return add(1, 2)
    let result = eval(|b| {
        b.declare_fn("add", 2, |b| {
            b.get_local(1).get_local(0).op(Opcode::Plus).ret();
        });
        b.int(1).int(2).call_global("add", 2).ret();
    });
    assert_eq!(result, Value::Int(3));
}

#[test]
fn test_missing_arguments_are_null() {
    let result = eval(|b| {
        b.declare_fn("second", 2, |b| {
            b.get_local(1).ret();
        });
        b.int(1).call_global("second", 1).ret();
    });
    assert_eq!(result, Value::Null);
}

#[test]
fn test_too_many_arguments() {
    let err = eval_err(|b| {
        b.declare_fn("one", 1, |b| {
            b.get_local(0).ret();
        });
        b.int(1).int(2).call_global("one", 2).ret();
    });
    assert!(matches!(err, VmError::Arity { ref name, got: 2, .. } if name == "one"));
}

#[test]
fn test_recursion() {
    // fun fib(n) { if (n < 2) { return n } return fib(n - 1) + fib(n - 2) }
    let result = eval(|b| {
        b.declare_fn("fib", 1, |b| {
            let recurse = b.new_label();
            b.int(2).get_local(0).op(Opcode::Lt).jump_if_false(recurse);
            b.get_local(0).ret();
            b.mark(recurse);
            b.int(2).get_local(0).op(Opcode::Minus).call_global("fib", 1);
            b.int(1).get_local(0).op(Opcode::Minus).call_global("fib", 1);
            b.op(Opcode::Plus).ret();
        });
        b.int(10).call_global("fib", 1).ret();
    });
    assert_eq!(result, Value::Int(55));
}

#[test]
fn test_unknown_function() {
    let err = eval_err(|b| {
        b.call_global("nope", 0).ret();
    });
    assert!(matches!(err, VmError::UnknownFunction(name) if name == "nope"));
}

#[test]
fn test_native_call_and_stdout() {
    let result = run(|b| {
        b.string("hello").int(1).call_global("print", 2).pop();
        b.int(3).call_global("typeof", 1).ret();
    });
    assert_eq!(result.stdout, vec!["hello 1".to_string()]);
    assert_eq!(result.into_result().unwrap(), Value::from("integer"));
}

#[test]
fn test_native_arity() {
    let err = eval_err(|b| {
        b.call_global("typeof", 0).ret();
    });
    assert!(matches!(err, VmError::Arity { got: 0, .. }));
}

#[test]
fn test_lambda_call() {
    // let double := (x) -> x * 2; return double(21)
    let result = eval(|b| {
        b.function("double", 1, 0, |b| {
            b.int(2).get_local(0).op(Opcode::Multiply).ret();
        })
        .closure(&[]);
        b.int(21).get_local(0).call_local(1).ret();
    });
    assert_eq!(result, Value::Int(42));
}

#[test]
fn test_counter_closure_outlives_frame() {
    // fun makeCounter() { let count := 0; return () -> { count := count + 1; return count } }
    let result = eval(|b| {
        b.declare_fn("makeCounter", 0, |b| {
            b.int(0);
            b.function("inc", 0, 1, |b| {
                b.int(1).get_upvalue(0).op(Opcode::Plus).set_upvalue(0).get_upvalue(0).ret();
            })
            .closure(&[(true, 0)]);
            b.get_local(1).ret();
        });
        b.call_global("makeCounter", 0);
        b.get_local(0).call_local(0).pop();
        b.get_local(0).call_local(0).pop();
        b.get_local(0).call_local(0).ret();
    });
    assert_eq!(result, Value::Int(3));
}

#[test]
fn test_closures_share_upvalue() {
    let result = eval(|b| {
        b.int(0);
        b.function("set", 1, 1, |b| {
            b.get_local(0).set_upvalue(0).null().ret();
        })
        .closure(&[(true, 0)]);
        b.function("get", 0, 1, |b| {
            b.get_upvalue(0).ret();
        })
        .closure(&[(true, 0)]);
        b.int(42).get_local(1).call_local(1).pop();
        b.get_local(2).call_local(0).get_local(0).array(2).ret();
    });
    assert_eq!(result.repr(), "[42, 42]");
}

#[test]
fn test_close_upvalue_snapshots_slot() {
    // let get; { let x := 5; get := () -> x } return get()
    let result = eval(|b| {
        b.null().int(5);
        b.function("get", 0, 1, |b| {
            b.get_upvalue(0).ret();
        })
        .closure(&[(true, 1)])
        .set_local(0);
        b.op(Opcode::CloseUpvalue);
        // reuses the slot x lived in
        b.int(99);
        b.get_local(0).call_local(0).ret();
    });
    assert_eq!(result, Value::Int(5));
}

#[test]
fn test_nested_upvalue_chain() {
    // fun outer() { let x := 7; return () -> () -> x }
    let result = eval(|b| {
        b.declare_fn("outer", 0, |b| {
            b.int(7);
            b.function("middle", 0, 1, |b| {
                b.function("inner", 0, 1, |b| {
                    b.get_upvalue(0).ret();
                })
                .closure(&[(false, 0)])
                .ret();
            })
            .closure(&[(true, 0)])
            .ret();
        });
        b.call_global("outer", 0).call_local(0).call_local(0).ret();
    });
    assert_eq!(result, Value::Int(7));
}

#[test]
fn test_function_values_from_globals() {
    let result = eval(|b| {
        b.int(5).get_global(&["typeof"]).call_local(1).ret();
    });
    assert_eq!(result, Value::from("integer"));
}

#[test]
fn test_native_callback() {
    let registry = registry_with(&[StlFunction::pure("applyTwice", 2, Some(2), apply_twice)]);
    let result = run_full(
        |b| {
            b.function("inc", 1, 0, |b| {
                b.int(1).get_local(0).op(Opcode::Plus).ret();
            })
            .closure(&[]);
            b.get_local(0).int(40).call_global("applyTwice", 2).ret();
        },
        &Globals::new(),
        &registry,
        &ExecOptions::default(),
    );
    assert_eq!(result.into_result().unwrap(), Value::Int(42));
}

#[test]
fn test_native_callback_with_native_callee() {
    let registry = registry_with(&[StlFunction::pure("applyTwice", 2, Some(2), apply_twice)]);
    let result = run_full(
        |b| {
            b.get_global(&["typeof"]).int(1).call_global("applyTwice", 2).ret();
        },
        &Globals::new(),
        &registry,
        &ExecOptions::default(),
    );
    assert_eq!(result.into_result().unwrap(), Value::from("string"));
}
