use super::*;

fn binary(op: Opcode, left: Value, right: Value) -> VmResult<Value> {
    let push = |b: &mut BytecodeBuilder, v: &Value| match v {
        Value::Int(i) => {
            b.int(*i);
        }
        Value::Float(f) => {
            b.float(*f);
        }
        Value::Str(s) => {
            b.string(s);
        }
        Value::Null => {
            b.null();
        }
        other => panic!("unsupported literal {other:?}"),
    };
    run(|b| {
        push(b, &right);
        push(b, &left);
        b.op(op).ret();
    })
    .into_result()
}

#[test]
fn test_arithmetic() {
    assert_eq!(binary(Opcode::Divide, Value::Int(7), Value::Int(2)).unwrap(), Value::Float(3.5));
    assert_eq!(binary(Opcode::Mod, Value::Int(-7), Value::Int(3)).unwrap(), Value::Int(2));
    assert_eq!(binary(Opcode::Multiply, Value::Float(1.5), Value::Int(2)).unwrap(), Value::Float(3.0));
    assert_eq!(
        binary(Opcode::Plus, Value::Int(i64::MAX), Value::Int(1)).unwrap(),
        Value::Float(i64::MAX as f64 + 1.0)
    );
}

#[test]
fn test_arithmetic_errors() {
    assert!(matches!(
        binary(Opcode::Divide, Value::Int(1), Value::Int(0)),
        Err(VmError::InvalidOperation(_))
    ));
    assert!(matches!(
        binary(Opcode::Mod, Value::Int(1), Value::Int(0)),
        Err(VmError::InvalidOperation(_))
    ));
    assert!(matches!(
        binary(Opcode::Minus, Value::from("a"), Value::Int(1)),
        Err(VmError::TypeMismatch(_))
    ));
}

#[test]
fn test_equality_and_ordering() {
    assert_eq!(binary(Opcode::Eq, Value::Int(1), Value::Float(1.0)).unwrap(), Value::Bool(true));
    assert_eq!(binary(Opcode::NotEq, Value::from("a"), Value::from("b")).unwrap(), Value::Bool(true));
    assert_eq!(binary(Opcode::Eq, Value::Null, Value::Null).unwrap(), Value::Bool(true));
    assert_eq!(binary(Opcode::LtEq, Value::from("abc"), Value::from("abd")).unwrap(), Value::Bool(true));
    assert_eq!(binary(Opcode::GtEq, Value::Float(2.5), Value::Int(2)).unwrap(), Value::Bool(true));
    assert!(matches!(
        binary(Opcode::Lt, Value::from("a"), Value::Int(1)),
        Err(VmError::TypeMismatch(_))
    ));
}

#[test]
fn test_typeof() {
    let result = run(|b| {
        b.null().call_global("typeof", 1);
        b.float(1.5).call_global("typeof", 1);
        b.array(0).call_global("typeof", 1);
        b.dict(0).call_global("typeof", 1);
        b.tuple(0).call_global("typeof", 1);
        b.string("x").call_global("Error", 1).call_global("typeof", 1);
        b.array(6).ret();
    });
    assert_eq!(
        result.into_result().unwrap().repr(),
        "['null', 'float', 'array', 'object', 'tuple', 'error']"
    );
}

#[test]
fn test_boxed_values_from_dict() {
    // {'__hogDate__': true, 'year': 2024, 'month': 2, 'day': 29}
    let result = eval(|b| {
        b.string("__hogDate__").bool(true);
        b.string("year").int(2024);
        b.string("month").int(2);
        b.string("day").int(29);
        b.dict(4).call_global("typeof", 1).ret();
    });
    assert_eq!(result, Value::from("date"));
}

#[test]
fn test_result_json() {
    let result = run(|b| {
        b.string("line").call_global("print", 1).pop();
        b.string("a").int(1).string("b").float(f64::NAN).dict(2).ret();
    });
    let json = result.to_json();
    assert_eq!(json["stdout"], json!(["line"]));
    assert_eq!(json["result"], json!({"a": 1, "b": null}));
    assert_eq!(json["error"], serde_json::Value::Null);
    assert_eq!(json["telemetry"]["ops"], json!(result.telemetry.ops));
}

#[test]
fn test_error_json() {
    let result = run(|b| {
        b.string("nope").call_global("Error", 1).throw();
    });
    let json = result.to_json();
    assert_eq!(json["result"], serde_json::Value::Null);
    assert_eq!(
        json["error"],
        json!({"category": "script", "type": "Error", "message": "nope"})
    );
}
