use super::*;

#[test]
fn test_execute_json_wire_format() {
    // return 3 + 2
    let result = execute_json(
        r#"["_H", 1, 33, 2, 33, 3, 6, 38]"#,
        &Globals::new(),
        &FunctionRegistry::new(),
        &ExecOptions::default(),
    );
    assert!(result.is_ok());
    assert_eq!(result.into_result().unwrap(), Value::Int(5));
}

#[test]
fn test_empty_program_returns_null() {
    let program = Program::from_json_str(r#"["_H", 1]"#).unwrap();
    let result = execute(&program, &Globals::new(), &FunctionRegistry::new(), &ExecOptions::default());
    assert_eq!(result.into_result().unwrap(), Value::Null);
}

#[test]
fn test_header_validation() {
    for src in [r#"["_h", 33, 1]"#, r#"[33, 1]"#, r#"["_H", 2, 31]"#, r#"["_H"]"#, r#"{"_H": 1}"#, "not json"] {
        let err = Program::from_json_str(src).unwrap_err();
        assert!(matches!(err, VmError::InvalidBytecode(_)), "{src}: {err:?}");
    }
    let err = Program::from_json_str(r#"["_h", 33, 1]"#).unwrap_err();
    assert!(err.to_string().contains("legacy"));
}

#[test]
fn test_rejected_bytecode_is_reported_in_result() {
    let result = execute_json(
        r#"["_h", 31]"#,
        &Globals::new(),
        &FunctionRegistry::new(),
        &ExecOptions::default(),
    );
    assert!(!result.is_ok());
    assert_eq!(result.error.as_ref().map(VmError::kind), Some("InvalidBytecode"));
    assert!(result.stdout.is_empty());
}

#[test]
fn test_unknown_opcode() {
    let result = execute_json(
        r#"["_H", 1, 99]"#,
        &Globals::new(),
        &FunctionRegistry::new(),
        &ExecOptions::default(),
    );
    assert!(matches!(result.into_result(), Err(VmError::UnknownOpcode(code)) if code == "99"));
}

#[test]
fn test_truncated_operand() {
    let result = execute_json(
        r#"["_H", 1, 33]"#,
        &Globals::new(),
        &FunctionRegistry::new(),
        &ExecOptions::default(),
    );
    assert!(matches!(result.into_result(), Err(VmError::InvalidBytecode(_))));
}

#[test]
fn test_wrong_operand_type() {
    let result = execute_json(
        r#"["_H", 1, 33, "one", 38]"#,
        &Globals::new(),
        &FunctionRegistry::new(),
        &ExecOptions::default(),
    );
    assert!(matches!(result.into_result(), Err(VmError::InvalidBytecode(_))));
}

#[test]
fn test_builder_matches_wire_format() {
    let program = assemble(|b| {
        b.int(2).int(3).op(Opcode::Plus).ret();
    });
    assert_eq!(program.to_json(), json!(["_H", 1, 33, 2, 33, 3, 6, 38]));
    let reparsed = Program::from_json(&program.to_json()).unwrap();
    assert_eq!(reparsed, program);
}

#[test]
fn test_unbound_label_fails_to_build() {
    let mut b = BytecodeBuilder::new();
    let nowhere = b.new_label();
    b.jump(nowhere);
    assert!(matches!(b.build(), Err(VmError::InvalidBytecode(_))));
}

#[test]
fn test_disassemble_resolves_targets() {
    let program = assemble(|b| {
        let end = b.new_label();
        b.bool(true).jump_if_false(end).string("yes").pop().mark(end).null().ret();
    });
    let listing = program.disassemble().unwrap();
    let opcodes: Vec<_> = listing.iter().map(|i| i.opcode).collect();
    assert_eq!(
        opcodes,
        vec![
            Opcode::True,
            Opcode::JumpIfFalse,
            Opcode::String,
            Opcode::Pop,
            Opcode::Null,
            Opcode::Return
        ]
    );
    let jump = &listing[1];
    assert_eq!(jump.ip, 3);
    // the NULL instruction
    assert_eq!(jump.target, Some(listing[4].ip as i64));
    assert_eq!(listing[2].to_string(), "     5  STRING 'yes'");
}

#[test]
fn test_disassemble_closure_captures() {
    let program = assemble(|b| {
        b.int(1);
        b.function("inner", 0, 1, |b| {
            b.function("innermost", 0, 1, |b| {
                b.get_upvalue(0).ret();
            })
            .closure(&[(false, 0)])
            .ret();
        })
        .closure(&[(true, 0)])
        .pop()
        .null()
        .ret();
    });
    let listing = program.disassemble().unwrap();
    let closures: Vec<_> = listing
        .iter()
        .filter(|i| i.opcode == Opcode::Closure)
        .map(|i| i.operands.len())
        .collect();
    assert_eq!(closures, vec![2, 2]);
    let callable = listing.iter().find(|i| i.opcode == Opcode::Callable).unwrap();
    assert_eq!(callable.target, Some(listing[listing.len() - 4].ip as i64));
}
