use std::rc::Rc;

use crate::val::Closure;

/// Activation record of a script function.
#[derive(Debug, Clone)]
pub(crate) struct CallFrame {
    /// Next instruction to execute in this frame.
    pub(crate) ip: usize,
    /// Operand-stack index of local slot 0 (the first argument).
    pub(crate) stack_start: usize,
    pub(crate) closure: Rc<Closure>,
}

/// Pushed by `TRY`, consumed by `POP_TRY` or by a throw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TryMarker {
    /// Number of call frames live when the try block was entered.
    pub(crate) call_depth: usize,
    /// Operand-stack length to restore before jumping to the handler.
    pub(crate) stack_len: usize,
    pub(crate) catch_ip: usize,
}

/// What the dispatch loop does after an instruction.
pub(crate) enum Flow {
    Continue,
    /// The frame at the run's exit depth returned this value.
    Return(crate::val::Value),
}
