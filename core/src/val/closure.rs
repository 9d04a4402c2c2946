use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallableKind {
    /// Function body inside the running program.
    Local,
    /// Registry function referenced as a value.
    Stl,
    /// The program's top level.
    Main,
}

/// Static description of a function: where its body starts and how it is
/// called. Created by `CALLABLE` (or when an STL name is read as a value).
#[derive(Debug, Clone, PartialEq)]
pub struct Callable {
    pub kind: CallableKind,
    pub name: Rc<str>,
    pub arg_count: usize,
    pub upvalue_count: usize,
    pub ip: usize,
}

impl Callable {
    pub fn local(name: impl Into<Rc<str>>, arg_count: usize, upvalue_count: usize, ip: usize) -> Self {
        Self {
            kind: CallableKind::Local,
            name: name.into(),
            arg_count,
            upvalue_count,
            ip,
        }
    }

    pub fn stl(name: impl Into<Rc<str>>, arg_count: usize) -> Self {
        Self {
            kind: CallableKind::Stl,
            name: name.into(),
            arg_count,
            upvalue_count: 0,
            ip: 0,
        }
    }

    pub fn main(ip: usize) -> Self {
        Self {
            kind: CallableKind::Main,
            name: Rc::from(""),
            arg_count: 0,
            upvalue_count: 0,
            ip,
        }
    }
}

/// A captured variable. Open upvalues alias a live operand-stack slot; once the
/// slot is popped the value is moved into the cell.
#[derive(Debug, Clone)]
pub enum Upvalue {
    Open(usize),
    Closed(Value),
}

pub type UpvalueRef = Rc<RefCell<Upvalue>>;

#[derive(Clone)]
pub struct Closure {
    pub callable: Rc<Callable>,
    pub upvalues: Vec<UpvalueRef>,
}

impl Closure {
    pub fn new(callable: Callable) -> Self {
        Self {
            callable: Rc::new(callable),
            upvalues: Vec::new(),
        }
    }

    pub fn with_upvalues(callable: Rc<Callable>, upvalues: Vec<UpvalueRef>) -> Self {
        Self { callable, upvalues }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.callable.name
    }

    #[inline]
    pub fn arg_count(&self) -> usize {
        self.callable.arg_count
    }
}

// Upvalues may point back at the closure itself; keep Debug shallow.
impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure")
            .field("callable", &self.callable)
            .field("upvalues", &self.upvalues.len())
            .finish()
    }
}
