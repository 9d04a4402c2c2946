use hogvm_core::{
    VmResult,
    module::{Module, StlContext, StlFunction},
    val::Value,
};

/// Type conversions. Conversions that cannot succeed yield null rather than
/// failing the run.
#[derive(Debug, Default)]
pub struct ConvertModule;

impl ConvertModule {
    pub fn new() -> Self {
        Self
    }

    fn to_string(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        Ok(match &args[0] {
            s @ Value::Str(_) => s.clone(),
            other => Value::from(other.to_string()),
        })
    }

    fn parse_int(s: &str) -> Option<i64> {
        let s = s.trim();
        s.parse::<i64>()
            .ok()
            .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
    }

    fn to_int(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        Ok(match &args[0] {
            Value::Int(i) => Value::Int(*i),
            Value::Float(f) if f.is_finite() => Value::Int(f.trunc() as i64),
            Value::Bool(b) => Value::Int(i64::from(*b)),
            Value::Str(s) => Self::parse_int(s).map_or(Value::Null, Value::Int),
            Value::DateTime(dt) => Value::Int(dt.dt.trunc() as i64),
            _ => Value::Null,
        })
    }

    fn to_float(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        Ok(match &args[0] {
            Value::Int(i) => Value::Float(*i as f64),
            Value::Float(f) => Value::Float(*f),
            Value::Bool(b) => Value::Float(if *b { 1.0 } else { 0.0 }),
            Value::Str(s) => s.trim().parse::<f64>().map_or(Value::Null, Value::Float),
            Value::DateTime(dt) => Value::Float(dt.dt),
            _ => Value::Null,
        })
    }

    /// Strings convert only from `true`/`false` (any case); other values use
    /// truthiness. Null stays null.
    fn to_bool(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        Ok(match &args[0] {
            Value::Null => Value::Null,
            Value::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => Value::Null,
            },
            other => Value::Bool(other.truthy()),
        })
    }

    fn if_null(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        Ok(if args[0].is_null() { args[1].clone() } else { args[0].clone() })
    }
}

impl Module for ConvertModule {
    fn name(&self) -> &str {
        "conversion"
    }

    fn functions(&self) -> Vec<StlFunction> {
        vec![
            StlFunction::pure("toString", 1, Some(1), Self::to_string),
            StlFunction::pure("toInt", 1, Some(1), Self::to_int),
            StlFunction::pure("toInteger", 1, Some(1), Self::to_int),
            StlFunction::pure("toFloat", 1, Some(1), Self::to_float),
            StlFunction::pure("toBool", 1, Some(1), Self::to_bool),
            StlFunction::pure("ifNull", 2, Some(2), Self::if_null),
        ]
    }
}
