use std::cmp::Ordering;
use std::rc::Rc;

use crate::error::{VmError, VmResult};
use crate::util::fast_map::{FastHashSet, fast_hash_set_new};

use super::Value;

// Orderings nested deeper than this are refused.
const MAX_COMPARE_DEPTH: usize = 512;

type PendingPairs = Vec<(Value, Value)>;

fn floats_equal(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

fn ptr_key<T: ?Sized>(a: &Rc<T>, b: &Rc<T>) -> (usize, usize) {
    (Rc::as_ptr(a) as *const () as usize, Rc::as_ptr(b) as *const () as usize)
}

fn queue_seq(a: &[Value], b: &[Value], pending: &mut PendingPairs) -> bool {
    if a.len() != b.len() {
        return false;
    }
    pending.extend(a.iter().cloned().zip(b.iter().cloned()));
    true
}

/// Compares the top level of `a` and `b` and queues their children.
///
/// A pair of shared containers already being compared is taken as equal, so
/// cyclic values terminate.
fn queue_eq(a: &Value, b: &Value, pending: &mut PendingPairs, visited: &mut FastHashSet<(usize, usize)>) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Float(a), Value::Float(b)) => floats_equal(*a, *b),
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => floats_equal(*a as f64, *b),
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Array(a), Value::Array(b)) => {
            if Rc::ptr_eq(a, b) || !visited.insert(ptr_key(a, b)) {
                return true;
            }
            queue_seq(&a.borrow(), &b.borrow(), pending)
        }
        (Value::Tuple(a), Value::Tuple(b)) => Rc::ptr_eq(a, b) || queue_seq(a, b, pending),
        (Value::Array(a), Value::Tuple(b)) | (Value::Tuple(b), Value::Array(a)) => queue_seq(&a.borrow(), b, pending),
        (Value::Map(a), Value::Map(b)) => {
            if Rc::ptr_eq(a, b) || !visited.insert(ptr_key(a, b)) {
                return true;
            }
            let (a, b) = (a.borrow(), b.borrow());
            if a.len() != b.len() {
                return false;
            }
            for (k, v) in a.iter() {
                match b.get(k) {
                    Some(other) => pending.push((v.clone(), other.clone())),
                    None => return false,
                }
            }
            true
        }
        (Value::Date(a), Value::Date(b)) => a == b,
        (Value::DateTime(a), Value::DateTime(b)) => floats_equal(a.dt, b.dt) && a.zone == b.zone,
        (Value::Error(a), Value::Error(b)) => {
            if Rc::ptr_eq(a, b) {
                return true;
            }
            if a.kind != b.kind || a.message != b.message {
                return false;
            }
            pending.push((a.payload.clone().unwrap_or_default(), b.payload.clone().unwrap_or_default()));
            true
        }
        (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
        _ => false,
    }
}

impl Value {
    /// True when both values are the same shared container.
    pub(crate) fn same_ref(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Tuple(a), Value::Tuple(b)) => Rc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Ordering used by `<`, `<=`, `>` and `>=`. Values of unrelated types
    /// cannot be ordered.
    pub fn compare(&self, other: &Value) -> VmResult<Ordering> {
        self.compare_at(other, 0)
    }

    fn compare_at(&self, other: &Value, depth: usize) -> VmResult<Ordering> {
        if depth > MAX_COMPARE_DEPTH {
            return Err(VmError::InvalidOperation(format!(
                "Cannot compare values nested more than {MAX_COMPARE_DEPTH} levels deep"
            )));
        }
        let unordered = || {
            VmError::type_mismatch(format!(
                "cannot compare {} with {}",
                self.type_name(),
                other.type_name()
            ))
        };
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            (a, b) if a.is_number() && b.is_number() => {
                let (a, b) = (a.as_f64().unwrap_or_default(), b.as_f64().unwrap_or_default());
                a.partial_cmp(&b)
                    .ok_or_else(|| VmError::InvalidOperation("Cannot compare NaN".into()))
            }
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Ok(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => a
                .dt
                .partial_cmp(&b.dt)
                .ok_or_else(|| VmError::InvalidOperation("Cannot compare NaN".into())),
            (Value::Array(_) | Value::Tuple(_), Value::Array(_) | Value::Tuple(_)) => {
                let (a, b) = (self.as_items().unwrap_or_default(), other.as_items().unwrap_or_default());
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.compare_at(y, depth + 1)? {
                        Ordering::Equal => continue,
                        non_eq => return Ok(non_eq),
                    }
                }
                Ok(a.len().cmp(&b.len()))
            }
            _ => Err(unordered()),
        }
    }
}

/// Structural equality. Numbers compare across int/float, NaN equals NaN,
/// arrays equal tuples with the same elements. Nesting depth is unbounded.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        let mut pending = Vec::new();
        let mut visited = fast_hash_set_new();
        if !queue_eq(self, other, &mut pending, &mut visited) {
            return false;
        }
        while let Some((a, b)) = pending.pop() {
            if !queue_eq(&a, &b, &mut pending, &mut visited) {
                return false;
            }
        }
        true
    }
}
