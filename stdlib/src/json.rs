use serde::Serialize;
use serde_json::Value as JsonValue;
use serde_json::ser::{PrettyFormatter, Serializer};

use hogvm_core::{
    VmError, VmResult,
    module::{Module, StlContext, StlFunction, int_arg, str_arg},
    val::Value,
};

#[derive(Debug, Default)]
pub struct JsonModule;

impl JsonModule {
    pub fn new() -> Self {
        Self
    }

    fn parse(name: &str, text: &str) -> VmResult<JsonValue> {
        serde_json::from_str(text).map_err(|e| VmError::script("Error", format!("{name}(): invalid JSON: {e}")))
    }

    fn json_parse(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        let text = str_arg("jsonParse", args, 0)?;
        Ok(Value::from_json(&Self::parse("jsonParse", text)?))
    }

    /// `jsonStringify(value, indent?)`. Compact unless a positive indent is
    /// given.
    fn json_stringify(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        let json = args[0].to_json();
        let indent = match args.get(1) {
            None | Some(Value::Null) => 0,
            Some(_) => int_arg("jsonStringify", args, 1)?.clamp(0, 32) as usize,
        };
        let text = if indent == 0 {
            serde_json::to_string(&json)
        } else {
            let spaces = " ".repeat(indent);
            let mut buf = Vec::new();
            let mut ser = Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(spaces.as_bytes()));
            json.serialize(&mut ser).map(|_| String::from_utf8_lossy(&buf).into_owned())
        }
        .map_err(|e| VmError::InvalidOperation(format!("jsonStringify(): {e}")))?;
        Ok(Value::from(text))
    }

    /// Document argument of the `JSON*` functions: a JSON string or an
    /// already parsed value.
    fn document(name: &str, value: &Value) -> VmResult<Value> {
        match value {
            Value::Str(s) => Ok(Value::from_json(&Self::parse(name, s)?)),
            other => Ok(other.clone()),
        }
    }

    /// Follows object keys and 1-based array indices. `None` when any step
    /// is missing.
    fn walk(mut current: Value, path: &[Value]) -> Option<Value> {
        for key in path {
            let next = match (&current, key) {
                (Value::Map(map), key) => {
                    let found = map.borrow().get(&key.to_string()).cloned();
                    found?
                }
                (Value::Array(_) | Value::Tuple(_), Value::Int(_)) => {
                    if !Self::index_exists(&current, key) {
                        return None;
                    }
                    current.get_property(key, true).ok()?
                }
                _ => return None,
            };
            current = next;
        }
        Some(current)
    }

    fn index_exists(seq: &Value, key: &Value) -> bool {
        let len = seq.as_items().map_or(0, |items| items.len()) as i64;
        match key {
            Value::Int(i) if *i > 0 => *i <= len,
            Value::Int(i) if *i < 0 => -*i <= len,
            _ => false,
        }
    }

    fn json_has(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        let doc = Self::document("JSONHas", &args[0])?;
        Ok(Value::Bool(Self::walk(doc, &args[1..]).is_some()))
    }

    fn json_length(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        let doc = Self::document("JSONLength", &args[0])?;
        let len = match Self::walk(doc, &args[1..]).as_ref() {
            Some(Value::Map(map)) => map.borrow().len(),
            Some(Value::Array(items)) => items.borrow().len(),
            Some(Value::Tuple(items)) => items.len(),
            _ => 0,
        };
        Ok(Value::from(len))
    }

    fn json_extract(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        let doc = Self::document("JSONExtract", &args[0])?;
        Ok(Self::walk(doc, &args[1..]).unwrap_or_default())
    }
}

impl Module for JsonModule {
    fn name(&self) -> &str {
        "json"
    }

    fn functions(&self) -> Vec<StlFunction> {
        vec![
            StlFunction::pure("jsonParse", 1, Some(1), Self::json_parse),
            StlFunction::pure("jsonStringify", 1, Some(2), Self::json_stringify),
            StlFunction::pure("JSONHas", 1, None, Self::json_has),
            StlFunction::pure("JSONLength", 1, None, Self::json_length),
            StlFunction::pure("JSONExtract", 1, None, Self::json_extract),
        ]
    }
}
