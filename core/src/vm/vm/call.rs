use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{VmError, VmResult};
use crate::module::StlFunction;
use crate::val::{CallableKind, Closure, Upvalue, UpvalueRef, Value};

use super::Vm;
use super::frame::CallFrame;

impl Vm<'_> {
    /// Enters a script function whose `argc` arguments are on top of the
    /// stack. Missing arguments are padded with null.
    pub(crate) fn call_closure(&mut self, closure: Rc<Closure>, argc: usize) -> VmResult<()> {
        let arg_count = closure.arg_count();
        if argc > arg_count {
            return Err(VmError::Arity {
                name: closure.name().to_string(),
                expected: arg_count.to_string(),
                got: argc,
            });
        }
        let max_depth = self.options.limits.max_call_depth;
        if self.frames.len() >= max_depth {
            return Err(VmError::StackOverflow(format!(
                "maximum call depth of {max_depth} exceeded"
            )));
        }
        for _ in argc..arg_count {
            self.push(Value::Null)?;
        }
        let stack_start = self
            .stack
            .len()
            .checked_sub(arg_count)
            .ok_or(VmError::StackUnderflow)?;
        self.frames.push(CallFrame {
            ip: closure.callable.ip,
            stack_start,
            closure,
        });
        Ok(())
    }

    /// Calls a registry function with arguments popped by the caller.
    ///
    /// Returns `None` when the function raised a script error that a try
    /// block of this run caught; execution then continues at the handler.
    pub(crate) fn call_native(
        &mut self,
        func: &StlFunction,
        args: Vec<Value>,
        exit_depth: usize,
    ) -> VmResult<Option<Value>> {
        self.pending_throw = None;
        match func.invoke(&args, self) {
            Ok(value) => Ok(Some(value)),
            Err(VmError::Uncaught(err)) => {
                let value = self
                    .pending_throw
                    .take()
                    .unwrap_or_else(|| super::throw::error_value(&err));
                self.throw_value(value, exit_depth)?;
                Ok(None)
            }
            Err(other) => Err(other),
        }
    }

    /// Re-entrant call used by native functions (`arrayMap` and friends).
    ///
    /// Runs a nested dispatch loop until the callee returns. On any error the
    /// frames, stack slots and try markers the call created are discarded
    /// before the error is handed back to the native caller.
    pub(crate) fn call_value(&mut self, callee: &Value, args: Vec<Value>) -> VmResult<Value> {
        let closure = callee.as_closure().cloned().ok_or_else(|| {
            VmError::type_mismatch(format!("cannot call a value of type {}", callee.type_name()))
        })?;
        match closure.callable.kind {
            CallableKind::Stl => {
                let func = *self
                    .registry
                    .get(closure.name())
                    .ok_or_else(|| VmError::UnknownFunction(closure.name().to_string()))?;
                func.invoke(&args, self)
            }
            CallableKind::Main => Err(VmError::InvalidOperation(
                "the program body cannot be called as a function".into(),
            )),
            CallableKind::Local => {
                let max_host_depth = self.options.limits.max_host_depth;
                if self.host_depth >= max_host_depth {
                    return Err(VmError::StackOverflow(format!(
                        "maximum native call nesting of {max_host_depth} exceeded"
                    )));
                }
                let base_frames = self.frames.len();
                let base_stack = self.stack.len();
                let base_tries = self.tries.len();

                self.host_depth += 1;
                let result = self.enter_nested(closure, args, base_frames);
                self.host_depth -= 1;

                if result.is_err() {
                    self.close_upvalues(base_stack);
                    self.frames.truncate(base_frames);
                    self.truncate_stack(base_stack);
                    self.tries.truncate(base_tries);
                }
                result
            }
        }
    }

    fn enter_nested(&mut self, closure: Rc<Closure>, args: Vec<Value>, exit_depth: usize) -> VmResult<Value> {
        let argc = args.len();
        for arg in args {
            self.push(arg)?;
        }
        self.call_closure(closure, argc)?;
        self.run(exit_depth)
    }

    /// Returns the upvalue for stack slot `location`, sharing an existing open
    /// one so that all closures over the same variable see each other's writes.
    pub(crate) fn capture_upvalue(&mut self, location: usize) -> UpvalueRef {
        let mut insert_at = self.open_upvalues.len();
        for (idx, upvalue) in self.open_upvalues.iter().enumerate() {
            if let Upvalue::Open(loc) = *upvalue.borrow() {
                if loc == location {
                    return upvalue.clone();
                }
                if loc > location {
                    insert_at = idx;
                    break;
                }
            }
        }
        let created = Rc::new(RefCell::new(Upvalue::Open(location)));
        self.open_upvalues.insert(insert_at, created.clone());
        created
    }

    /// Moves the values of every open upvalue at or above `from` into their
    /// cells. Called before those slots leave the stack.
    pub(crate) fn close_upvalues(&mut self, from: usize) {
        while let Some(upvalue) = self.open_upvalues.last().cloned() {
            let loc = match *upvalue.borrow() {
                Upvalue::Open(loc) => Some(loc),
                Upvalue::Closed(_) => None,
            };
            if let Some(loc) = loc {
                if loc < from {
                    break;
                }
                let value = self.stack.get(loc).cloned().unwrap_or_default();
                *upvalue.borrow_mut() = Upvalue::Closed(value);
            }
            self.open_upvalues.pop();
        }
    }

    pub(crate) fn read_upvalue(&self, upvalue: &UpvalueRef) -> VmResult<Value> {
        match &*upvalue.borrow() {
            Upvalue::Open(loc) => self.slot(*loc),
            Upvalue::Closed(value) => Ok(value.clone()),
        }
    }

    pub(crate) fn write_upvalue(&mut self, upvalue: &UpvalueRef, value: Value) -> VmResult<()> {
        let open = match *upvalue.borrow() {
            Upvalue::Open(loc) => Some(loc),
            Upvalue::Closed(_) => None,
        };
        match open {
            Some(loc) => self.set_slot(loc, value),
            None => {
                *upvalue.borrow_mut() = Upvalue::Closed(value);
                Ok(())
            }
        }
    }
}
