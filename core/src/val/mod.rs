use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::util::fast_map::fast_hash_set_new;

mod access;
mod boxed;
mod closure;
mod cmp;
mod convert;
mod display;
mod ops;


pub use boxed::{
    DATE_MARKER, DATETIME_MARKER, DEFAULT_ERROR_KIND, DEFAULT_ERROR_MESSAGE, ERROR_MARKER, HogDate, HogDateTime,
    HogError,
};
pub use closure::{Callable, CallableKind, Closure, Upvalue, UpvalueRef};
pub use display::{escape_identifier, escape_string};

/// Ordered key/value storage backing script objects.
pub type MapEntries = IndexMap<String, Value>;

/// Memory accounting unit charged for every value, on top of string bytes.
pub const COST_PER_UNIT: usize = 8;

/// Deepest container nesting a value may have when it is pushed.
pub const MAX_NESTING_DEPTH: usize = 1000;

/// A dynamically typed Hog value.
///
/// Arrays and objects are shared by reference within one run: every alias
/// observes `SET_PROPERTY` mutations, as scripts expect. Tuples are immutable.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Array(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<[Value]>),
    Map(Rc<RefCell<MapEntries>>),
    Date(HogDate),
    DateTime(HogDateTime),
    Error(Rc<HogError>),
    Closure(Rc<Closure>),
}

impl Value {
    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(Rc::from(items))
    }

    pub fn empty_map() -> Self {
        Value::Map(Rc::new(RefCell::new(MapEntries::new())))
    }

    /// Builds an object, recognising boxed date/datetime/error shapes.
    pub fn from_entries(entries: MapEntries) -> Self {
        boxed::detect(&entries).unwrap_or_else(|| Value::Map(Rc::new(RefCell::new(entries))))
    }

    pub fn error(err: HogError) -> Self {
        Value::Error(Rc::new(err))
    }

    pub fn closure(closure: Closure) -> Self {
        Value::Closure(Rc::new(closure))
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    #[inline]
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_closure(&self) -> Option<&Rc<Closure>> {
        match self {
            Value::Closure(c) => Some(c),
            _ => None,
        }
    }

    /// Snapshot of the elements of an array or tuple.
    pub fn as_items(&self) -> Option<Vec<Value>> {
        match self {
            Value::Array(items) => Some(items.borrow().clone()),
            Value::Tuple(items) => Some(items.to_vec()),
            _ => None,
        }
    }

    /// Null, false, zero and empty strings/containers are falsy. NaN is truthy.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Array(items) => !items.borrow().is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Map(map) => !map.borrow().is_empty(),
            Value::Date(_) | Value::DateTime(_) | Value::Error(_) | Value::Closure(_) => true,
        }
    }

    /// Name reported by `typeof`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Tuple(_) => "tuple",
            Value::Map(map) => boxed::detect(&map.borrow()).map_or("object", |boxed| boxed.type_name()),
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::Error(_) => "error",
            Value::Closure(_) => "function",
        }
    }

    /// Key/value view of objects and boxed values.
    pub fn to_entries(&self) -> Option<MapEntries> {
        match self {
            Value::Map(map) => Some(map.borrow().clone()),
            Value::Date(d) => Some(d.to_entries()),
            Value::DateTime(dt) => Some(dt.to_entries()),
            Value::Error(err) => Some(err.to_entries()),
            _ => None,
        }
    }

    /// Approximate heap footprint used for the per-run memory budget. Shared
    /// containers reachable twice are only charged once.
    pub fn cost(&self) -> usize {
        self.footprint().cost
    }

    /// Cost and container nesting depth, measured in one walk. The walk keeps
    /// its own work list, so arbitrarily deep values are safe to measure.
    pub fn footprint(&self) -> Footprint {
        let mut seen = fast_hash_set_new();
        let mut total = Footprint::default();
        let mut pending = vec![(self.clone(), 1usize)];
        while let Some((value, depth)) = pending.pop() {
            total.cost += COST_PER_UNIT;
            match &value {
                Value::Str(s) => total.cost += s.len(),
                Value::Array(items) => {
                    total.depth = total.depth.max(depth);
                    if seen.insert(Rc::as_ptr(items) as *const () as usize) {
                        pending.extend(items.borrow().iter().map(|v| (v.clone(), depth + 1)));
                    }
                }
                Value::Tuple(items) => {
                    total.depth = total.depth.max(depth);
                    pending.extend(items.iter().map(|v| (v.clone(), depth + 1)));
                }
                Value::Map(map) => {
                    total.depth = total.depth.max(depth);
                    if seen.insert(Rc::as_ptr(map) as *const () as usize) {
                        for (k, v) in map.borrow().iter() {
                            total.cost += COST_PER_UNIT + k.len();
                            pending.push((v.clone(), depth + 1));
                        }
                    }
                }
                Value::Error(err) => {
                    total.depth = total.depth.max(depth);
                    total.cost += err.kind.len() + err.message.len();
                    if let Some(payload) = &err.payload {
                        pending.push((payload.clone(), depth + 1));
                    }
                }
                _ => {}
            }
        }
        total
    }

    /// Re-reads the boxed shape of an object that gained its marker keys
    /// after it was built. Other values are returned unchanged.
    pub fn reboxed(self) -> Value {
        let detected = match &self {
            Value::Map(map) => boxed::detect(&map.borrow()),
            _ => None,
        };
        detected.unwrap_or(self)
    }
}

/// Result of [`Value::footprint`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Footprint {
    pub cost: usize,
    /// Containers on the longest path from the root; scalars are 0.
    pub depth: usize,
}

/// Moves the children of containers this value solely owns into `pending`,
/// so dropping it never recurses.
fn detach_children(value: &mut Value, pending: &mut Vec<Value>) {
    match value {
        Value::Array(items) => {
            if let Some(items) = Rc::get_mut(items) {
                pending.append(items.get_mut());
            }
        }
        Value::Tuple(items) => {
            if let Some(items) = Rc::get_mut(items) {
                pending.extend(items.iter_mut().map(std::mem::take));
            }
        }
        Value::Map(map) => {
            if let Some(map) = Rc::get_mut(map) {
                pending.extend(map.get_mut().drain(..).map(|(_, v)| v));
            }
        }
        Value::Error(err) => {
            if let Some(payload) = Rc::get_mut(err).and_then(|err| err.payload.take()) {
                pending.push(payload);
            }
        }
        Value::Closure(closure) => {
            if let Some(closure) = Rc::get_mut(closure) {
                for upvalue in closure.upvalues.drain(..) {
                    if let Ok(Upvalue::Closed(v)) = Rc::try_unwrap(upvalue).map(RefCell::into_inner) {
                        pending.push(v);
                    }
                }
            }
        }
        _ => {}
    }
}

impl Drop for Value {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        detach_children(self, &mut pending);
        while let Some(mut value) = pending.pop() {
            detach_children(&mut value, &mut pending);
        }
    }
}
