use std::fmt::{self, Write as _};
use std::rc::Rc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::util::fast_map::{FastHashSet, fast_hash_set_new};

use super::Value;

static PLAIN_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("identifier pattern is valid"));

fn escape_char(c: char, quote: char, out: &mut String) {
    match c {
        '\u{8}' => out.push_str("\\b"),
        '\u{c}' => out.push_str("\\f"),
        '\r' => out.push_str("\\r"),
        '\n' => out.push_str("\\n"),
        '\t' => out.push_str("\\t"),
        '\0' => out.push_str("\\0"),
        '\u{7}' => out.push_str("\\a"),
        '\u{b}' => out.push_str("\\v"),
        '\\' => out.push_str("\\\\"),
        c if c == quote => {
            out.push('\\');
            out.push(c);
        }
        c => out.push(c),
    }
}

/// Single-quoted string literal with control characters escaped.
pub fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        escape_char(c, '\'', &mut out);
    }
    out.push('\'');
    out
}

/// Identifiers are printed bare when possible, backtick-quoted otherwise.
pub fn escape_identifier(s: &str) -> String {
    if PLAIN_IDENTIFIER.is_match(s) {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len() + 2);
    out.push('`');
    for c in s.chars() {
        escape_char(c, '`', &mut out);
    }
    out.push('`');
    out
}

pub(crate) fn format_float(f: f64, out: &mut String) {
    if f.is_nan() {
        out.push_str("nan");
    } else if f.is_infinite() {
        out.push_str(if f > 0.0 { "inf" } else { "-inf" });
    } else {
        let mut buf = ryu::Buffer::new();
        out.push_str(buf.format_finite(f));
    }
}

/// Work item of the repr walk.
enum Piece {
    Value(Value),
    Text(&'static str),
    Owned(String),
    /// Leaves a container, so later siblings may print it again.
    Unmark(usize),
}

fn queue_seq(items: &[Value], pending: &mut Vec<Piece>) {
    for (idx, item) in items.iter().enumerate().rev() {
        pending.push(Piece::Value(item.clone()));
        if idx > 0 {
            pending.push(Piece::Text(", "));
        }
    }
}

impl Value {
    /// Literal-style rendering: nested strings are quoted, containers are
    /// expanded, cycles print as `null`.
    pub fn repr(&self) -> String {
        let mut out = String::new();
        let mut marked = fast_hash_set_new();
        let mut pending = vec![Piece::Value(self.clone())];
        while let Some(piece) = pending.pop() {
            match piece {
                Piece::Value(value) => value.write_shallow(&mut out, &mut marked, &mut pending),
                Piece::Text(text) => out.push_str(text),
                Piece::Owned(text) => out.push_str(&text),
                Piece::Unmark(key) => {
                    marked.remove(&key);
                }
            }
        }
        out
    }

    /// Writes the opening of `self` and queues the rest.
    fn write_shallow(&self, out: &mut String, marked: &mut FastHashSet<usize>, pending: &mut Vec<Piece>) {
        match self {
            Value::Null => out.push_str("null"),
            Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Int(i) => {
                let mut buf = itoa::Buffer::new();
                out.push_str(buf.format(*i));
            }
            Value::Float(f) => format_float(*f, out),
            Value::Str(s) => out.push_str(&escape_string(s)),
            Value::Array(items) => {
                let key = Rc::as_ptr(items) as *const () as usize;
                if !marked.insert(key) {
                    out.push_str("null");
                    return;
                }
                out.push('[');
                pending.push(Piece::Unmark(key));
                pending.push(Piece::Text("]"));
                queue_seq(&items.borrow(), pending);
            }
            Value::Tuple(items) => {
                out.push_str(if items.len() < 2 { "tuple(" } else { "(" });
                pending.push(Piece::Text(")"));
                queue_seq(items, pending);
            }
            Value::Map(map) => {
                let key = Rc::as_ptr(map) as *const () as usize;
                if !marked.insert(key) {
                    out.push_str("null");
                    return;
                }
                out.push('{');
                pending.push(Piece::Unmark(key));
                pending.push(Piece::Text("}"));
                for (idx, (k, v)) in map.borrow().iter().enumerate().rev() {
                    pending.push(Piece::Value(v.clone()));
                    pending.push(Piece::Owned(format!("{}: ", escape_string(k))));
                    if idx > 0 {
                        pending.push(Piece::Text(", "));
                    }
                }
            }
            Value::Date(d) => {
                let _ = write!(out, "Date({}, {}, {})", d.year, d.month, d.day);
            }
            Value::DateTime(dt) => {
                out.push_str("DateTime(");
                format_float(dt.dt, out);
                out.push_str(", ");
                out.push_str(&escape_string(&dt.zone));
                out.push(')');
            }
            Value::Error(err) => {
                out.push_str(&err.kind);
                out.push('(');
                out.push_str(&escape_string(&err.message));
                match err.payload.as_ref().filter(|p| p.truthy()) {
                    Some(payload) => {
                        pending.push(Piece::Text(")"));
                        pending.push(Piece::Value(payload.clone()));
                        pending.push(Piece::Text(", "));
                    }
                    None => out.push(')'),
                }
            }
            Value::Closure(closure) => {
                let name = if closure.name().is_empty() { "lambda" } else { closure.name() };
                let _ = write!(out, "fn<{}({})>", escape_identifier(name), closure.arg_count());
            }
        }
    }
}

/// Output form used by `print`, `toString` and string concatenation: a bare
/// string is written verbatim, everything else uses [`Value::repr`].
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            other => f.write_str(&other.repr()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}
