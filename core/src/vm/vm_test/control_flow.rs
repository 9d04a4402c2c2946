use super::*;

#[test]
fn test_return_sum() {
    // return 1 + 2
    assert_eq!(eval(|b| { b.int(2).int(1).op(Opcode::Plus).ret(); }), Value::Int(3));
}

#[test]
fn test_binary_operand_order() {
    // return 10 - 3
    assert_eq!(eval(|b| { b.int(3).int(10).op(Opcode::Minus).ret(); }), Value::Int(7));
    // return 10 > 3
    assert_eq!(eval(|b| { b.int(3).int(10).op(Opcode::Gt).ret(); }), Value::Bool(true));
    // return 'a' || 'b'
    assert_eq!(eval(|b| { b.string("b").string("a").op(Opcode::Plus).ret(); }), Value::from("ab"));
}

#[test]
fn test_value_left_on_stack_is_result() {
    assert_eq!(eval(|b| { b.int(4); }), Value::Int(4));
}

#[test]
fn test_extra_values_at_end_are_rejected() {
    assert!(matches!(eval_err(|b| { b.int(1).int(2); }), VmError::InvalidBytecode(_)));
}

#[test]
fn test_while_loop() {
    // let i := 0; while (i < 5) { i := i + 1 } return i
    let result = eval(|b| {
        let top = b.new_label();
        let end = b.new_label();
        b.int(0);
        b.mark(top).int(5).get_local(0).op(Opcode::Lt).jump_if_false(end);
        b.int(1).get_local(0).op(Opcode::Plus).set_local(0).jump(top);
        b.mark(end).get_local(0).ret();
    });
    assert_eq!(result, Value::Int(5));
}

#[test]
fn test_if_else() {
    let branch = |cond: bool| {
        eval(|b| {
            let otherwise = b.new_label();
            let end = b.new_label();
            b.bool(cond).jump_if_false(otherwise);
            b.string("then").jump(end);
            b.mark(otherwise).string("else");
            b.mark(end).ret();
        })
    };
    assert_eq!(branch(true), Value::from("then"));
    assert_eq!(branch(false), Value::from("else"));
}

#[test]
fn test_and_or_not() {
    assert_eq!(eval(|b| { b.bool(true).int(1).string("x").and(3).ret(); }), Value::Bool(true));
    assert_eq!(eval(|b| { b.bool(true).int(0).and(2).ret(); }), Value::Bool(false));
    assert_eq!(eval(|b| { b.null().string("").int(3).or(3).ret(); }), Value::Bool(true));
    assert_eq!(eval(|b| { b.null().op(Opcode::Not).ret(); }), Value::Bool(true));
}

#[test]
fn test_nan_is_truthy() {
    assert_eq!(eval(|b| { b.float(f64::NAN).op(Opcode::Not).ret(); }), Value::Bool(false));
    let branch = eval(|b| {
        let otherwise = b.new_label();
        b.float(f64::NAN).jump_if_false(otherwise).string("then").ret();
        b.mark(otherwise).string("else").ret();
    });
    assert_eq!(branch, Value::from("then"));
}

#[test]
fn test_nullish_coalesce() {
    // return a ?? 'fallback'
    let coalesce = |value: Option<i64>| {
        eval(|b| {
            let end = b.new_label();
            match value {
                Some(i) => b.int(i),
                None => b.null(),
            };
            b.jump_if_stack_not_null(end).pop().string("fallback");
            b.mark(end).ret();
        })
    };
    assert_eq!(coalesce(Some(7)), Value::Int(7));
    assert_eq!(coalesce(None), Value::from("fallback"));
}

#[test]
fn test_collections() {
    let arr = eval(|b| {
        b.int(1).int(2).int(3).array(3).ret();
    });
    assert_eq!(arr.repr(), "[1, 2, 3]");

    let obj = eval(|b| {
        b.string("a").int(1).string("b").bool(true).dict(2).ret();
    });
    assert_eq!(obj.repr(), "{'a': 1, 'b': true}");

    let tup = eval(|b| {
        b.int(1).string("x").tuple(2).ret();
    });
    assert_eq!(tup.repr(), "(1, 'x')");
}

#[test]
fn test_property_access() {
    // let arr := [10, 20]; return arr[2]
    let second = eval(|b| {
        b.int(10).int(20).array(2).int(2).op(Opcode::GetProperty).ret();
    });
    assert_eq!(second, Value::Int(20));

    let last = eval(|b| {
        b.int(10).int(20).array(2).int(-1).op(Opcode::GetProperty).ret();
    });
    assert_eq!(last, Value::Int(20));

    let err = eval_err(|b| {
        b.int(10).array(1).int(0).op(Opcode::GetProperty).ret();
    });
    assert!(matches!(err, VmError::OutOfBounds { index: 0, len: 1 }));

    let nullish = eval(|b| {
        b.int(10).array(1).int(5).op(Opcode::GetPropertyNullish).ret();
    });
    assert_eq!(nullish, Value::Null);
}

#[test]
fn test_set_property_is_shared_by_aliases() {
    // let a := {}; let b := a; b.x := 1; return a.x
    let result = eval(|b| {
        b.dict(0).get_local(0);
        b.get_local(1).string("x").int(1).op(Opcode::SetProperty);
        b.get_local(0).string("x").op(Opcode::GetProperty).ret();
    });
    assert_eq!(result, Value::Int(1));
}

#[test]
fn test_globals_chain() {
    let globals = globals(json!({
        "event": {"event": "$pageview", "properties": {"$current_url": "https://posthog.com"}},
        "person": {"name": "Ann"}
    }));
    let registry = FunctionRegistry::new();
    let options = ExecOptions::default();

    let url = run_full(
        |b| {
            b.get_global(&["event", "properties", "$current_url"]).ret();
        },
        &globals,
        &registry,
        &options,
    );
    assert_eq!(url.into_result().unwrap(), Value::from("https://posthog.com"));

    let missing = run_full(
        |b| {
            b.get_global(&["event", "properties", "nope", "deeper"]).ret();
        },
        &globals,
        &registry,
        &options,
    );
    assert_eq!(missing.into_result().unwrap(), Value::Null);

    let unknown = run_full(
        |b| {
            b.get_global(&["nobody"]).ret();
        },
        &globals,
        &registry,
        &options,
    );
    assert!(matches!(unknown.into_result(), Err(VmError::UnknownGlobal(name)) if name == "nobody"));
}

#[test]
fn test_globals_are_copied_on_read() {
    let globals = globals(json!({"person": {"name": "Ann"}}));
    let result = run_full(
        |b| {
            b.get_global(&["person"]).string("name").string("Bob").op(Opcode::SetProperty);
            b.get_global(&["person", "name"]).ret();
        },
        &globals,
        &FunctionRegistry::new(),
        &ExecOptions::default(),
    );
    assert_eq!(result.into_result().unwrap(), Value::from("Ann"));
}

#[test]
fn test_pattern_ops() {
    // 'hello world' like '%world'
    let like = eval(|b| {
        b.string("%world").string("hello world").op(Opcode::Like).ret();
    });
    assert_eq!(like, Value::Bool(true));

    let ilike = eval(|b| {
        b.string("HELLO%").string("hello world").op(Opcode::ILike).ret();
    });
    assert_eq!(ilike, Value::Bool(true));

    let regex = eval(|b| {
        b.string("o w").string("hello world").op(Opcode::NotRegex).ret();
    });
    assert_eq!(regex, Value::Bool(false));

    let null_subject = eval(|b| {
        b.string("%").null().op(Opcode::Like).ret();
    });
    assert_eq!(null_subject, Value::Bool(false));
}

#[test]
fn test_in_ops() {
    let found = eval(|b| {
        b.int(1).int(2).array(2).int(2).op(Opcode::In).ret();
    });
    assert_eq!(found, Value::Bool(true));

    let key = eval(|b| {
        b.string("a").int(1).dict(1).string("a").op(Opcode::NotIn).ret();
    });
    assert_eq!(key, Value::Bool(false));

    let substring = eval(|b| {
        b.string("posthog").string("hog").op(Opcode::In).ret();
    });
    assert_eq!(substring, Value::Bool(true));
}

#[test]
fn test_cohort_ops_are_unsupported() {
    let err = eval_err(|b| {
        b.int(1).int(2).op(Opcode::InCohort).ret();
    });
    assert!(matches!(err, VmError::InvalidOperation(_)));
}
