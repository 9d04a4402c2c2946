use crate::error::{VmError, VmResult};

use super::Value;

/// Maps a 1-based (or negative, from the end) script index onto a slice
/// position. Index 0 never resolves.
fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len_i = len as i64;
    let pos = if index > 0 {
        index - 1
    } else if index < 0 {
        len_i + index
    } else {
        return None;
    };
    (0..len_i).contains(&pos).then_some(pos as usize)
}

/// Object keys are always strings; other key types are stringified.
pub(crate) fn key_string(key: &Value) -> String {
    key.to_string()
}

impl Value {
    /// Reads `self[key]`.
    ///
    /// Sequences and strings take 1-based integer indices. An index outside
    /// the sequence is `OutOfBounds`, unless `nullish` is set, in which case
    /// it reads as null. Missing object keys and reads on null are null.
    pub fn get_property(&self, key: &Value, nullish: bool) -> VmResult<Value> {
        let index_of = |len: usize| -> VmResult<Option<usize>> {
            match key {
                Value::Int(i) => match resolve_index(*i, len) {
                    Some(pos) => Ok(Some(pos)),
                    None if nullish => Ok(None),
                    None => Err(VmError::OutOfBounds { index: *i, len }),
                },
                _ => Ok(None),
            }
        };
        match self {
            Value::Null => Ok(Value::Null),
            Value::Array(items) => {
                let items = items.borrow();
                Ok(index_of(items.len())?.map(|pos| items[pos].clone()).unwrap_or_default())
            }
            Value::Tuple(items) => Ok(index_of(items.len())?.map(|pos| items[pos].clone()).unwrap_or_default()),
            Value::Str(s) => {
                let len = s.chars().count();
                Ok(index_of(len)?
                    .and_then(|pos| s.chars().nth(pos))
                    .map(|c| Value::from(c.to_string()))
                    .unwrap_or_default())
            }
            Value::Map(map) => Ok(map.borrow().get(&key_string(key)).cloned().unwrap_or_default()),
            Value::Date(_) | Value::DateTime(_) | Value::Error(_) => Ok(self
                .to_entries()
                .and_then(|entries| entries.get(&key_string(key)).cloned())
                .unwrap_or_default()),
            _ => Ok(Value::Null),
        }
    }

    /// Writes `self[key] = value`. Arrays and objects are mutated in place, so
    /// every alias sees the change.
    pub fn set_property(&self, key: &Value, value: Value) -> VmResult<()> {
        match self {
            Value::Array(items) => {
                let mut items = items.borrow_mut();
                let len = items.len();
                match key {
                    Value::Int(i) => {
                        let pos = resolve_index(*i, len).ok_or(VmError::OutOfBounds { index: *i, len })?;
                        items[pos] = value;
                        Ok(())
                    }
                    other => Err(VmError::type_mismatch(format!(
                        "array index must be an integer, got {}",
                        other.type_name()
                    ))),
                }
            }
            Value::Map(map) => {
                map.borrow_mut().insert(key_string(key), value);
                Ok(())
            }
            other => Err(VmError::type_mismatch(format!(
                "cannot set property on {}",
                other.type_name()
            ))),
        }
    }
}
