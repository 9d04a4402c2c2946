use std::ops::{Add, Div, Mul, Rem, Sub};

use crate::error::{VmError, VmResult};

use super::Value;

fn err_op<R>(l: &Value, op: &str, r: &Value) -> VmResult<R> {
    Err(VmError::type_mismatch(format!(
        "unsupported operand types for {op}: {} and {}",
        l.type_name(),
        r.type_name()
    )))
}

/// Int/Int through `checked`, falling back to float math on overflow; any
/// other numeric pair is computed in float.
#[inline]
fn numeric(
    l: &Value,
    r: &Value,
    op: &str,
    checked: fn(i64, i64) -> Option<i64>,
    float: fn(f64, f64) -> f64,
) -> VmResult<Value> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => Ok(match checked(*a, *b) {
            Some(v) => Value::Int(v),
            None => Value::Float(float(*a as f64, *b as f64)),
        }),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => Ok(Value::Float(float(
            l.as_f64().unwrap_or_default(),
            r.as_f64().unwrap_or_default(),
        ))),
        _ => err_op(l, op, r),
    }
}

fn floored_float_mod(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r }
}

impl Add for &Value {
    type Output = VmResult<Value>;

    #[inline]
    fn add(self, other: Self) -> Self::Output {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => {
                if a.is_empty() {
                    return Ok(Value::Str(b.clone()));
                }
                if b.is_empty() {
                    return Ok(Value::Str(a.clone()));
                }
                let mut out = String::with_capacity(a.len() + b.len());
                out.push_str(a);
                out.push_str(b);
                Ok(Value::from(out))
            }
            (Value::Array(_) | Value::Tuple(_), Value::Array(_) | Value::Tuple(_)) => {
                let mut items = self.as_items().unwrap_or_default();
                items.extend(other.as_items().unwrap_or_default());
                Ok(Value::array(items))
            }
            _ => numeric(self, other, "+", i64::checked_add, |a, b| a + b),
        }
    }
}

impl Sub for &Value {
    type Output = VmResult<Value>;

    #[inline]
    fn sub(self, other: Self) -> Self::Output {
        numeric(self, other, "-", i64::checked_sub, |a, b| a - b)
    }
}

impl Mul for &Value {
    type Output = VmResult<Value>;

    #[inline]
    fn mul(self, other: Self) -> Self::Output {
        numeric(self, other, "*", i64::checked_mul, |a, b| a * b)
    }
}

impl Div for &Value {
    type Output = VmResult<Value>;

    /// True division: the result is always a float.
    #[inline]
    fn div(self, other: Self) -> Self::Output {
        match (self.as_f64(), other.as_f64()) {
            (Some(_), Some(b)) if b == 0.0 => Err(VmError::InvalidOperation("Division by zero".into())),
            (Some(a), Some(b)) => Ok(Value::Float(a / b)),
            _ => err_op(self, "/", other),
        }
    }
}

impl Rem for &Value {
    type Output = VmResult<Value>;

    /// Floored modulo: the result takes the sign of the divisor.
    #[inline]
    fn rem(self, other: Self) -> Self::Output {
        match (self, other) {
            (Value::Int(_) | Value::Float(_), Value::Int(0)) => {
                Err(VmError::InvalidOperation("Modulo by zero".into()))
            }
            (Value::Int(_) | Value::Float(_), Value::Float(b)) if *b == 0.0 => {
                Err(VmError::InvalidOperation("Modulo by zero".into()))
            }
            (Value::Int(a), Value::Int(b)) => {
                let r = a.checked_rem(*b).unwrap_or(0);
                Ok(Value::Int(if r != 0 && (r < 0) != (*b < 0) { r + b } else { r }))
            }
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => Ok(Value::Float(floored_float_mod(
                self.as_f64().unwrap_or_default(),
                other.as_f64().unwrap_or_default(),
            ))),
            _ => err_op(self, "%", other),
        }
    }
}
