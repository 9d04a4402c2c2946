use super::*;

fn infinite_loop(b: &mut BytecodeBuilder) {
    let top = b.new_label();
    b.mark(top).jump(top);
}

/// `while (i < times) { body; i := i + 1 }` with `i` in local `counter`.
fn repeat(b: &mut BytecodeBuilder, counter: usize, times: i64, body: impl FnOnce(&mut BytecodeBuilder)) {
    let top = b.new_label();
    let end = b.new_label();
    b.mark(top).int(times).get_local(counter).op(Opcode::Lt).jump_if_false(end);
    body(b);
    b.int(1).get_local(counter).op(Opcode::Plus).set_local(counter).jump(top);
    b.mark(end);
}

/// `let a := null; repeat levels times: a := [a]; return print(a)`
fn self_nesting(b: &mut BytecodeBuilder, levels: i64) {
    b.null().int(0);
    repeat(b, 1, levels, |b| {
        b.get_local(0).array(1).set_local(0);
    });
    b.get_local(0).call_global("print", 1).ret();
}

fn endless_recursion(b: &mut BytecodeBuilder) {
    b.declare_fn("down", 1, |b| {
        b.get_local(0).call_global("down", 1).ret();
    });
    b.int(0).call_global("down", 1).ret();
}

#[test]
fn test_step_budget() {
    let result = run_with(infinite_loop, &ExecOptions::default().with_max_steps(1000));
    assert!(matches!(result.error, Some(VmError::StepBudgetExceeded { limit: 1000 })));
    assert_eq!(result.telemetry.ops, 1001);
}

#[test]
fn test_timeout() {
    let options = ExecOptions::default().with_timeout(Duration::from_millis(10));
    let result = run_with(infinite_loop, &options);
    let err = result.error.expect("loop should time out");
    assert_eq!(err.kind(), "Timeout");
    assert!(err.message().starts_with("Execution timed out after 0.010 seconds"));
}

#[test]
fn test_call_depth() {
    let err = run(endless_recursion).into_result().unwrap_err();
    assert!(matches!(err, VmError::StackOverflow(_)));

    let shallow = ExecOptions::default().with_max_call_depth(10);
    let result = run_with(endless_recursion, &shallow);
    assert!(matches!(result.error, Some(VmError::StackOverflow(_))));
    assert!(result.telemetry.ops < 100);
}

#[test]
fn test_stack_depth() {
    let options = ExecOptions::default().with_max_stack_depth(10);
    let result = run_with(
        |b| {
            for i in 0..11 {
                b.int(i);
            }
        },
        &options,
    );
    assert!(matches!(result.error, Some(VmError::StackOverflow(_))));
}

#[test]
fn test_memory_limit() {
    let big = "x".repeat(100);
    let options = ExecOptions::default().with_max_memory(64);
    let result = run_with(
        |b| {
            b.string(&big).ret();
        },
        &options,
    );
    assert!(matches!(
        result.error,
        Some(VmError::MemoryLimitExceeded { limit: 64, requested: 108 })
    ));
}

#[test]
fn test_memory_is_released_on_pop() {
    let chunk = "x".repeat(100);
    let options = ExecOptions::default().with_max_memory(200);
    let result = run_with(
        |b| {
            for _ in 0..10 {
                b.string(&chunk).pop();
            }
            b.null().ret();
        },
        &options,
    );
    assert!(result.is_ok(), "{:?}", result.error);
    assert_eq!(result.telemetry.max_memory_used, 108);
}

#[test]
fn test_native_nesting_limit() {
    let mut registry = FunctionRegistry::new();
    registry
        .register(StlFunction::pure("callWith", 1, Some(1), |args, ctx| {
            ctx.call(&args[0], Vec::new())
        }))
        .unwrap();
    let result = run_full(
        |b| {
            b.declare_fn("again", 0, |b| {
                b.get_global(&["again"]).call_global("callWith", 1).ret();
            });
            b.call_global("again", 0).ret();
        },
        &Globals::new(),
        &registry,
        &ExecOptions::default(),
    );
    let err = result.error.expect("nesting should be capped");
    assert!(matches!(err, VmError::StackOverflow(ref msg) if msg.contains("native call nesting")));
}

#[test]
fn test_telemetry() {
    let result = run(|b| {
        b.int(1).int(2).op(Opcode::Plus).ret();
    });
    assert_eq!(result.telemetry.ops, 4);
    assert_eq!(result.telemetry.bytecode_len, 8);
    assert!(result.trace.is_empty());
}

#[test]
fn test_debug_trace_does_not_change_results() {
    let program = |b: &mut BytecodeBuilder| {
        b.string("tick").call_global("print", 1).pop();
        b.int(1).int(2).op(Opcode::Plus).ret();
    };
    let plain = run(program);
    let traced = run_with(program, &ExecOptions::default().with_debug(true));

    assert_eq!(plain.stdout, traced.stdout);
    assert_eq!(plain.telemetry.ops, traced.telemetry.ops);
    assert_eq!(traced.trace.len() as u64, traced.telemetry.ops);
    assert_eq!(traced.trace[0].ip, 2);
    assert_eq!(traced.trace[0].opcode, Opcode::String);
    assert_eq!(traced.trace.last().map(|t| t.opcode), Some(Opcode::Return));
    assert_eq!(plain.into_result().unwrap(), traced.into_result().unwrap());
}

#[test]
fn test_trace_cap() {
    let mut options = ExecOptions::default().with_debug(true);
    options.max_trace_entries = 3;
    let result = run_with(
        |b| {
            b.int(1).pop().int(2).pop().null().ret();
        },
        &options,
    );
    assert!(result.is_ok());
    assert_eq!(result.trace.len(), 3);
    assert_eq!(result.telemetry.ops, 6);
}

#[test]
fn test_nesting_at_the_cap_still_prints() {
    let result = run(|b| self_nesting(b, 1000));
    assert!(result.is_ok(), "{:?}", result.error);
    let line = &result.stdout[0];
    assert_eq!(line.len(), 2004);
    assert!(line.starts_with("[[[") && line.ends_with("null]]]"));
}

#[test]
fn test_self_nesting_past_the_cap_faults() {
    let options = ExecOptions::default().with_timeout(Duration::from_secs(60));
    let result = run_with(|b| self_nesting(b, 5000), &options);
    let err = result.error.expect("nesting should be capped");
    assert!(matches!(err, VmError::StackOverflow(ref msg) if msg.contains("nesting exceeded 1000")));
    assert!(result.stdout.is_empty());
}

#[test]
fn test_chain_built_by_mutation_is_refused_and_dropped() {
    // let top := [null]; let cur := top
    // repeat: let next := [null]; cur[1] := next; cur := next
    // print(top)
    let options = ExecOptions::default().with_timeout(Duration::from_secs(60));
    let result = run_with(
        |b| {
            b.null().array(1).get_local(0).int(0);
            repeat(b, 2, 50_000, |b| {
                b.null().array(1);
                b.get_local(1).int(1).get_local(3).op(Opcode::SetProperty);
                b.get_local(3).set_local(1).pop();
            });
            b.get_local(0).call_global("print", 1).ret();
        },
        &options,
    );
    let err = result.error.expect("deep chain should not be readable");
    assert!(matches!(err, VmError::StackOverflow(ref msg) if msg.contains("nesting")));
}

#[test]
fn test_every_alias_of_a_container_is_charged() {
    // let big := [0 x 2000]; big[2000] + big[1]; then two more aliases of big
    let result = run(|b| {
        for _ in 0..2000 {
            b.int(0);
        }
        b.array(2000);
        b.get_local(0).int(2000).op(Opcode::GetProperty);
        b.get_local(0).int(1).op(Opcode::GetProperty);
        b.op(Opcode::Plus);
        b.get_local(0).get_local(0).pop().pop();
        b.ret();
    });
    assert_eq!(result.telemetry.max_memory_used, 3 * 16_008 + 8);
    assert_eq!(result.into_result().unwrap(), Value::Int(0));
}

#[test]
fn test_container_cost_follows_mutation() {
    let long = "x".repeat(1000);
    let result = run(|b| {
        for _ in 0..200 {
            b.int(0);
        }
        b.array(200);
        b.get_local(0).pop();
        b.get_local(0).int(1).string(&long).op(Opcode::SetProperty);
        b.get_local(0).get_local(0).pop().pop();
        b.null().ret();
    });
    assert!(result.is_ok(), "{:?}", result.error);
    // the local keeps its original charge; each later read pays the grown size
    assert_eq!(result.telemetry.max_memory_used, 1608 + 2 * 2608);
}
