use std::rc::Rc;

use serde_json::{Map as JsonMap, Number, Value as JsonValue};

use crate::util::fast_map::{FastHashSet, fast_hash_set_new};

use super::{MAX_NESTING_DEPTH, MapEntries, Value};

impl From<String> for Value {
    #[inline]
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<&str> for Value {
    #[inline]
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<Rc<str>> for Value {
    #[inline]
    fn from(s: Rc<str>) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    #[inline]
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    #[inline]
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<usize> for Value {
    #[inline]
    fn from(i: usize) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    #[inline]
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    #[inline]
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T> From<Vec<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Vec<T>) -> Self {
        Value::array(v.into_iter().map(Into::into).collect())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(o: Option<T>) -> Self {
        match o {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl From<&JsonValue> for Value {
    fn from(val: &JsonValue) -> Self {
        Value::from_json(val)
    }
}

impl From<JsonValue> for Value {
    fn from(val: JsonValue) -> Self {
        Value::from_json(&val)
    }
}

impl Value {
    /// Converts JSON into a fresh value graph. Objects with a boxed shape
    /// become dates, datetimes or errors.
    pub fn from_json(val: &JsonValue) -> Value {
        match val {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    n.as_f64().map(Value::Float).unwrap_or_default()
                }
            }
            JsonValue::String(s) => Value::from(s.as_str()),
            JsonValue::Array(items) => Value::array(items.iter().map(Value::from_json).collect()),
            JsonValue::Object(obj) => {
                let entries: MapEntries = obj.iter().map(|(k, v)| (k.clone(), Value::from_json(v))).collect();
                Value::from_entries(entries)
            }
        }
    }

    /// JSON form of a value. Tuples become arrays, boxed kinds become their
    /// marker objects, closures become their printed form. Cycles, and
    /// containers nested deeper than [`MAX_NESTING_DEPTH`], become `null`.
    pub fn to_json(&self) -> JsonValue {
        let mut marked = fast_hash_set_new();
        self.to_json_inner(&mut marked, 0)
    }

    fn to_json_inner(&self, marked: &mut FastHashSet<usize>, depth: usize) -> JsonValue {
        let nested = matches!(
            self,
            Value::Array(_) | Value::Tuple(_) | Value::Map(_) | Value::Error(_)
        );
        if nested && depth >= MAX_NESTING_DEPTH {
            return JsonValue::Null;
        }
        let depth = depth + 1;
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(i) => JsonValue::Number((*i).into()),
            Value::Float(f) => Number::from_f64(*f).map(JsonValue::Number).unwrap_or(JsonValue::Null),
            Value::Str(s) => JsonValue::String(s.to_string()),
            Value::Array(items) => {
                let key = Rc::as_ptr(items) as *const () as usize;
                if !marked.insert(key) {
                    return JsonValue::Null;
                }
                let out = items.borrow().iter().map(|v| v.to_json_inner(marked, depth)).collect();
                marked.remove(&key);
                JsonValue::Array(out)
            }
            Value::Tuple(items) => JsonValue::Array(items.iter().map(|v| v.to_json_inner(marked, depth)).collect()),
            Value::Map(map) => {
                let key = Rc::as_ptr(map) as *const () as usize;
                if !marked.insert(key) {
                    return JsonValue::Null;
                }
                let out = entries_to_json(&map.borrow(), marked, depth);
                marked.remove(&key);
                out
            }
            Value::Date(d) => entries_to_json(&d.to_entries(), marked, depth),
            Value::DateTime(dt) => entries_to_json(&dt.to_entries(), marked, depth),
            Value::Error(err) => entries_to_json(&err.to_entries(), marked, depth),
            Value::Closure(_) => JsonValue::String(self.repr()),
        }
    }
}

fn entries_to_json(entries: &MapEntries, marked: &mut FastHashSet<usize>, depth: usize) -> JsonValue {
    let mut out = JsonMap::with_capacity(entries.len());
    for (k, v) in entries {
        out.insert(k.clone(), v.to_json_inner(marked, depth));
    }
    JsonValue::Object(out)
}
