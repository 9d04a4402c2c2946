use hogvm_core::{
    VmError, VmResult,
    module::{Module, StlContext, StlFunction, int_arg},
    val::Value,
};

#[derive(Debug, Default)]
pub struct MathModule;

impl MathModule {
    pub fn new() -> Self {
        Self
    }

    fn number<'a>(name: &str, args: &'a [Value], idx: usize) -> VmResult<Option<&'a Value>> {
        match args.get(idx) {
            None | Some(Value::Null) => Ok(None),
            Some(v @ (Value::Int(_) | Value::Float(_))) => Ok(Some(v)),
            Some(other) => Err(VmError::type_mismatch(format!(
                "{name}() expects a number as argument {}, got {}",
                idx + 1,
                other.type_name()
            ))),
        }
    }

    /// Integers pass through unchanged, floats go through `f`.
    fn float_op(name: &str, args: &[Value], f: fn(f64) -> f64) -> VmResult<Value> {
        Ok(match Self::number(name, args, 0)? {
            None => Value::Null,
            Some(Value::Float(x)) => Value::Float(f(*x)),
            Some(v) => v.clone(),
        })
    }

    /// `round(x, digits?)`, halves away from zero.
    fn round(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        let digits = if args.len() > 1 { int_arg("round", args, 1)? } else { 0 };
        if digits == 0 {
            return Self::float_op("round", args, f64::round);
        }
        Ok(match Self::number("round", args, 0)? {
            None => Value::Null,
            Some(Value::Int(i)) if digits > 0 => Value::Int(*i),
            Some(v) => {
                let x = v.as_f64().unwrap_or_default();
                let scale = 10f64.powi(digits.clamp(-300, 300) as i32);
                Value::Float((x * scale).round() / scale)
            }
        })
    }

    fn floor(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        Self::float_op("floor", args, f64::floor)
    }

    fn ceil(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        Self::float_op("ceil", args, f64::ceil)
    }

    fn abs(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        Ok(match Self::number("abs", args, 0)? {
            None => Value::Null,
            Some(Value::Int(i)) => i.checked_abs().map_or(Value::Float((*i as f64).abs()), Value::Int),
            Some(v) => Value::Float(v.as_f64().unwrap_or_default().abs()),
        })
    }

    fn pick(name: &str, args: &[Value], want: std::cmp::Ordering) -> VmResult<Value> {
        let a = Self::number(name, args, 0)?;
        let b = Self::number(name, args, 1)?;
        Ok(match (a, b) {
            (Some(a), Some(b)) => {
                if b.compare(a)? == want {
                    b.clone()
                } else {
                    a.clone()
                }
            }
            (Some(v), None) | (None, Some(v)) => v.clone(),
            (None, None) => Value::Null,
        })
    }

    fn min2(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        Self::pick("min2", args, std::cmp::Ordering::Less)
    }

    fn max2(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        Self::pick("max2", args, std::cmp::Ordering::Greater)
    }
}

impl Module for MathModule {
    fn name(&self) -> &str {
        "math"
    }

    fn functions(&self) -> Vec<StlFunction> {
        vec![
            StlFunction::pure("round", 1, Some(2), Self::round),
            StlFunction::pure("floor", 1, Some(1), Self::floor),
            StlFunction::pure("ceil", 1, Some(1), Self::ceil),
            StlFunction::pure("abs", 1, Some(1), Self::abs),
            StlFunction::pure("min2", 2, Some(2), Self::min2),
            StlFunction::pure("max2", 2, Some(2), Self::max2),
        ]
    }
}
