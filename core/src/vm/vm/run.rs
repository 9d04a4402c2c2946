use std::rc::Rc;
use std::sync::Arc;

use crate::error::{VmError, VmResult};
use crate::op::{Opcode, like, regex_match};
use crate::val::{Callable, CallableKind, Closure, MapEntries, UpvalueRef, Value};
use crate::vm::exec::TraceEntry;

use super::Vm;
use super::frame::{Flow, TryMarker};

/// How often (in executed instructions) the wall clock is polled. Must be a
/// power of two.
const TIMEOUT_CHECK_INTERVAL: u64 = 128;

impl Vm<'_> {
    /// Dispatch loop. Returns when the frame sitting just above `exit_depth`
    /// returns, or when the root frame runs off the end of the program.
    pub(crate) fn run(&mut self, exit_depth: usize) -> VmResult<Value> {
        loop {
            let ip = match self.frames.last() {
                Some(frame) => frame.ip,
                None => return Err(VmError::invalid_bytecode("no active call frame")),
            };
            if ip >= self.program.len() {
                return self.end_of_program(exit_depth);
            }
            let op = self.program.opcode_at(ip)?;
            self.tick(ip, op)?;
            self.set_ip(ip + 1);
            if let Flow::Return(value) = self.step(op, exit_depth)? {
                return Ok(value);
            }
        }
    }

    #[inline]
    fn tick(&mut self, ip: usize, op: Opcode) -> VmResult<()> {
        self.ops += 1;
        let limit = self.options.limits.max_steps;
        if self.ops > limit {
            return Err(VmError::StepBudgetExceeded { limit });
        }
        if self.ops & (TIMEOUT_CHECK_INTERVAL - 1) == 0 {
            self.check_timeout()?;
        }
        if self.options.debug && self.trace.len() < self.options.trace_cap() {
            self.trace.push(TraceEntry {
                ip,
                opcode: op,
                stack_depth: self.stack.len(),
                call_depth: self.frames.len(),
            });
        }
        tracing::trace!(target: "hogvm::vm", ip, op = %op, stack = self.stack.len(), "step");
        Ok(())
    }

    fn end_of_program(&mut self, exit_depth: usize) -> VmResult<Value> {
        if exit_depth > 0 || self.frames.len() > 1 {
            return Err(VmError::invalid_bytecode("function body runs past the end of the program"));
        }
        match self.stack.len() {
            0 => Ok(Value::Null),
            1 => self.pop(),
            n => Err(VmError::invalid_bytecode(format!(
                "{n} values left on the stack at the end of the program"
            ))),
        }
    }

    #[inline]
    fn ip(&self) -> usize {
        self.frames.last().map_or(0, |frame| frame.ip)
    }

    #[inline]
    fn set_ip(&mut self, ip: usize) {
        if let Some(frame) = self.frames.last_mut() {
            frame.ip = ip;
        }
    }

    fn jump_by(&mut self, offset: i64) -> VmResult<()> {
        let target = self.ip() as i64 + offset;
        if target < 0 {
            return Err(VmError::invalid_bytecode(format!("jump to negative position {target}")));
        }
        self.set_ip(target as usize);
        Ok(())
    }

    fn stack_start(&self) -> usize {
        self.frames.last().map_or(0, |frame| frame.stack_start)
    }

    #[inline]
    fn read_int(&mut self) -> VmResult<i64> {
        let ip = self.ip();
        let val = self.program.int_at(ip)?;
        self.set_ip(ip + 1);
        Ok(val)
    }

    #[inline]
    fn read_count(&mut self) -> VmResult<usize> {
        let ip = self.ip();
        let val = self.program.count_at(ip)?;
        self.set_ip(ip + 1);
        Ok(val)
    }

    fn read_number(&mut self) -> VmResult<f64> {
        let ip = self.ip();
        let val = self.program.number_at(ip)?;
        self.set_ip(ip + 1);
        Ok(val)
    }

    fn read_str(&mut self) -> VmResult<Arc<str>> {
        let ip = self.ip();
        let val = self.program.str_at(ip)?.clone();
        self.set_ip(ip + 1);
        Ok(val)
    }

    fn read_flag(&mut self) -> VmResult<bool> {
        let ip = self.ip();
        let val = self.program.flag_at(ip)?;
        self.set_ip(ip + 1);
        Ok(val)
    }

    /// Pops `left` then `right`.
    #[inline]
    fn pop_pair(&mut self) -> VmResult<(Value, Value)> {
        let left = self.pop()?;
        let right = self.pop()?;
        Ok((left, right))
    }

    fn step(&mut self, op: Opcode, exit_depth: usize) -> VmResult<Flow> {
        match op {
            Opcode::GetGlobal => {
                let count = self.read_count()?;
                let mut chain = Vec::with_capacity(count);
                for _ in 0..count {
                    chain.push(self.pop()?);
                }
                let value = self.get_global(&chain)?;
                self.push(value)?;
            }
            Opcode::CallGlobal => {
                self.check_timeout()?;
                let name = self.read_str()?;
                let argc = self.read_count()?;
                if let Some(callable) = self.declared.get(&*name).cloned() {
                    self.call_closure(Rc::new(Closure::with_upvalues(callable, Vec::new())), argc)?;
                } else if let Some(func) = self.registry.get(&name).copied() {
                    let args = self.pop_n(argc)?;
                    if let Some(result) = self.call_native(&func, args, exit_depth)? {
                        self.push(result)?;
                    }
                } else {
                    return Err(VmError::UnknownFunction(name.to_string()));
                }
            }
            Opcode::And | Opcode::Or => {
                let count = self.read_count()?;
                let values = self.pop_n(count)?;
                let result = if op == Opcode::And {
                    values.iter().all(Value::truthy)
                } else {
                    values.iter().any(Value::truthy)
                };
                self.push(Value::Bool(result))?;
            }
            Opcode::Not => {
                let value = self.pop()?;
                self.push(Value::Bool(!value.truthy()))?;
            }
            Opcode::Plus | Opcode::Minus | Opcode::Multiply | Opcode::Divide | Opcode::Mod => {
                let (left, right) = self.pop_pair()?;
                let result = match op {
                    Opcode::Plus => &left + &right,
                    Opcode::Minus => &left - &right,
                    Opcode::Multiply => &left * &right,
                    Opcode::Divide => &left / &right,
                    _ => &left % &right,
                }?;
                self.push(result)?;
            }
            Opcode::Eq | Opcode::NotEq => {
                let (left, right) = self.pop_pair()?;
                self.push(Value::Bool((left == right) == (op == Opcode::Eq)))?;
            }
            Opcode::Gt | Opcode::GtEq | Opcode::Lt | Opcode::LtEq => {
                let (left, right) = self.pop_pair()?;
                let ord = left.compare(&right)?;
                let result = match op {
                    Opcode::Gt => ord.is_gt(),
                    Opcode::GtEq => ord.is_ge(),
                    Opcode::Lt => ord.is_lt(),
                    _ => ord.is_le(),
                };
                self.push(Value::Bool(result))?;
            }
            Opcode::Like | Opcode::ILike | Opcode::NotLike | Opcode::NotILike => {
                let (subject, pattern) = self.pop_pair()?;
                let case_insensitive = matches!(op, Opcode::ILike | Opcode::NotILike);
                let negate = matches!(op, Opcode::NotLike | Opcode::NotILike);
                let matched = self.match_pattern(&subject, &pattern, case_insensitive, true)?;
                self.push(Value::Bool(matched != negate))?;
            }
            Opcode::Regex | Opcode::NotRegex | Opcode::IRegex | Opcode::NotIRegex => {
                let (subject, pattern) = self.pop_pair()?;
                let case_insensitive = matches!(op, Opcode::IRegex | Opcode::NotIRegex);
                let negate = matches!(op, Opcode::NotRegex | Opcode::NotIRegex);
                let matched = self.match_pattern(&subject, &pattern, case_insensitive, false)?;
                self.push(Value::Bool(matched != negate))?;
            }
            Opcode::In | Opcode::NotIn => {
                let (needle, haystack) = self.pop_pair()?;
                let found = contains(&haystack, &needle)?;
                self.push(Value::Bool(found == (op == Opcode::In)))?;
            }
            Opcode::InCohort | Opcode::NotInCohort => {
                return Err(VmError::InvalidOperation(
                    "Cohort membership is not supported in this VM".into(),
                ));
            }
            Opcode::True => self.push(Value::Bool(true))?,
            Opcode::False => self.push(Value::Bool(false))?,
            Opcode::Null => self.push(Value::Null)?,
            Opcode::String => {
                let s = self.read_str()?;
                self.push(Value::from(&*s))?;
            }
            Opcode::Integer => {
                let i = self.read_int()?;
                self.push(Value::Int(i))?;
            }
            Opcode::Float => {
                let f = self.read_number()?;
                self.push(Value::Float(f))?;
            }
            Opcode::Pop => {
                self.pop()?;
            }
            Opcode::GetLocal => {
                let slot = self.stack_start() + self.read_count()?;
                let value = self.slot(slot)?;
                self.push(value)?;
            }
            Opcode::SetLocal => {
                let slot = self.stack_start() + self.read_count()?;
                let value = self.pop()?;
                self.set_slot(slot, value)?;
            }
            Opcode::Return => {
                let result = self.pop()?;
                let frame = self.frames.pop().ok_or(VmError::StackUnderflow)?;
                let depth = self.frames.len();
                while self.tries.last().is_some_and(|marker| marker.call_depth > depth) {
                    self.tries.pop();
                }
                self.close_upvalues(frame.stack_start);
                self.truncate_stack(frame.stack_start);
                if depth == exit_depth {
                    return Ok(Flow::Return(result));
                }
                self.push(result)?;
            }
            Opcode::Jump => {
                let offset = self.read_int()?;
                self.jump_by(offset)?;
            }
            Opcode::JumpIfFalse => {
                let offset = self.read_int()?;
                if !self.pop()?.truthy() {
                    self.jump_by(offset)?;
                }
            }
            Opcode::JumpIfStackNotNull => {
                let offset = self.read_int()?;
                if self.peek().is_some_and(|v| !v.is_null()) {
                    self.jump_by(offset)?;
                }
            }
            Opcode::DeclareFn => {
                let name = self.read_str()?;
                let arg_count = self.read_count()?;
                let body_len = self.read_int()?;
                let body_start = self.ip();
                let callable = Callable::local(&*name, arg_count, 0, body_start);
                self.declared.insert(Rc::from(&*name), Rc::new(callable));
                self.jump_by(body_len)?;
            }
            Opcode::Dict => {
                let pairs = self.read_count()?;
                let flat = self.pop_n(pairs * 2)?;
                let mut entries = MapEntries::with_capacity(pairs);
                let mut it = flat.into_iter();
                while let (Some(key), Some(value)) = (it.next(), it.next()) {
                    entries.insert(key.to_string(), value);
                }
                self.push(Value::from_entries(entries))?;
            }
            Opcode::Array => {
                let len = self.read_count()?;
                let items = self.pop_n(len)?;
                self.push(Value::array(items))?;
            }
            Opcode::Tuple => {
                let len = self.read_count()?;
                let items = self.pop_n(len)?;
                self.push(Value::tuple(items))?;
            }
            Opcode::GetProperty | Opcode::GetPropertyNullish => {
                let key = self.pop()?;
                let object = self.pop()?;
                let value = object.get_property(&key, op == Opcode::GetPropertyNullish)?;
                self.push(value)?;
            }
            Opcode::SetProperty => {
                let value = self.pop()?;
                let key = self.pop()?;
                let object = self.pop()?;
                object.set_property(&key, value)?;
                self.footprints.clear();
            }
            Opcode::Throw => {
                let value = self.pop()?.reboxed();
                if !matches!(value, Value::Error(_)) {
                    return Err(VmError::type_mismatch(format!(
                        "can not throw a value of type {}, expected an error",
                        value.type_name()
                    )));
                }
                self.throw_value(value, exit_depth)?;
            }
            Opcode::Try => {
                let offset = self.read_int()?;
                let catch_ip = self.ip() as i64 + offset;
                if catch_ip < 0 {
                    return Err(VmError::invalid_bytecode(format!("catch target {catch_ip} is negative")));
                }
                self.tries.push(TryMarker {
                    call_depth: self.frames.len(),
                    stack_len: self.stack.len(),
                    catch_ip: catch_ip as usize,
                });
            }
            Opcode::PopTry => {
                let depth = self.frames.len();
                match self.tries.last() {
                    Some(marker) if marker.call_depth == depth => {
                        self.tries.pop();
                    }
                    _ => {
                        return Err(VmError::InvalidOperation(
                            "POP_TRY without a matching TRY in this function".into(),
                        ));
                    }
                }
            }
            Opcode::Callable => {
                let name = self.read_str()?;
                let arg_count = self.read_count()?;
                let upvalue_count = self.read_count()?;
                let body_len = self.read_int()?;
                let callable = Callable::local(&*name, arg_count, upvalue_count, self.ip());
                self.push(Value::closure(Closure::new(callable)))?;
                self.jump_by(body_len)?;
            }
            Opcode::Closure => {
                let template = self.pop()?;
                let callable = match template.as_closure() {
                    Some(closure) => closure.callable.clone(),
                    None => {
                        return Err(VmError::type_mismatch(format!(
                            "CLOSURE expects a callable, got {}",
                            template.type_name()
                        )));
                    }
                };
                let stack_start = self.stack_start();
                let mut upvalues = Vec::with_capacity(callable.upvalue_count);
                for _ in 0..callable.upvalue_count {
                    let is_local = self.read_flag()?;
                    let index = self.read_count()?;
                    let upvalue = if is_local {
                        self.capture_upvalue(stack_start + index)
                    } else {
                        self.frames
                            .last()
                            .and_then(|frame| frame.closure.upvalues.get(index).cloned())
                            .ok_or_else(|| {
                                VmError::invalid_bytecode(format!("enclosing function has no upvalue {index}"))
                            })?
                    };
                    upvalues.push(upvalue);
                }
                self.push(Value::closure(Closure::with_upvalues(callable, upvalues)))?;
            }
            Opcode::CallLocal => {
                let argc = self.read_count()?;
                let callee = self.pop()?;
                let closure = callee.as_closure().cloned().ok_or_else(|| {
                    VmError::type_mismatch(format!("cannot call a value of type {}", callee.type_name()))
                })?;
                match closure.callable.kind {
                    CallableKind::Local => self.call_closure(closure, argc)?,
                    CallableKind::Stl => {
                        let func = self
                            .registry
                            .get(closure.name())
                            .copied()
                            .ok_or_else(|| VmError::UnknownFunction(closure.name().to_string()))?;
                        let args = self.pop_n(argc)?;
                        if let Some(result) = self.call_native(&func, args, exit_depth)? {
                            self.push(result)?;
                        }
                    }
                    CallableKind::Main => {
                        return Err(VmError::InvalidOperation(
                            "the program body cannot be called as a function".into(),
                        ));
                    }
                }
            }
            Opcode::GetUpvalue => {
                let index = self.read_count()?;
                let upvalue = self.current_upvalue(index)?;
                let value = self.read_upvalue(&upvalue)?;
                self.push(value)?;
            }
            Opcode::SetUpvalue => {
                let index = self.read_count()?;
                let upvalue = self.current_upvalue(index)?;
                let value = self.pop()?;
                self.write_upvalue(&upvalue, value)?;
            }
            Opcode::CloseUpvalue => {
                let top = self.stack.len().checked_sub(1).ok_or(VmError::StackUnderflow)?;
                self.close_upvalues(top);
                self.pop()?;
            }
        }
        Ok(Flow::Continue)
    }

    fn current_upvalue(&self, index: usize) -> VmResult<UpvalueRef> {
        self.frames
            .last()
            .and_then(|frame| frame.closure.upvalues.get(index).cloned())
            .ok_or_else(|| VmError::invalid_bytecode(format!("no upvalue {index} in the current function")))
    }

    /// Resolves `root.a.b` against globals, then declared functions, then
    /// registry functions (as callable values).
    fn get_global(&self, chain: &[Value]) -> VmResult<Value> {
        let (root, rest) = chain
            .split_first()
            .ok_or_else(|| VmError::invalid_bytecode("GET_GLOBAL with an empty chain"))?;
        let name = root.to_string();
        if let Some(json) = self.globals.get(&name) {
            let mut value = Value::from_json(json);
            for key in rest {
                value = value.get_property(key, true)?;
            }
            return Ok(value);
        }
        if rest.is_empty() {
            if let Some(callable) = self.declared.get(name.as_str()) {
                return Ok(Value::closure(Closure::with_upvalues(callable.clone(), Vec::new())));
            }
            if let Some(func) = self.registry.get(&name) {
                let arg_count = func.max_args.unwrap_or(func.min_args);
                return Ok(Value::closure(Closure::new(Callable::stl(func.name, arg_count))));
            }
        }
        Err(VmError::UnknownGlobal(name))
    }

    fn match_pattern(
        &mut self,
        subject: &Value,
        pattern: &Value,
        case_insensitive: bool,
        sql_like: bool,
    ) -> VmResult<bool> {
        if subject.is_null() {
            return Ok(false);
        }
        let pattern = pattern.as_str().ok_or_else(|| {
            VmError::type_mismatch(format!("pattern must be a string, got {}", pattern.type_name()))
        })?;
        let subject = subject.to_string();
        if sql_like {
            like(&mut self.regex_cache, &subject, pattern, case_insensitive)
        } else {
            regex_match(&mut self.regex_cache, &subject, pattern, case_insensitive)
        }
    }
}

/// Membership test behind `IN`: elements of sequences, keys of objects,
/// substrings of strings.
fn contains(haystack: &Value, needle: &Value) -> VmResult<bool> {
    match haystack {
        Value::Null => Ok(false),
        Value::Array(items) => Ok(items.borrow().iter().any(|item| item == needle)),
        Value::Tuple(items) => Ok(items.iter().any(|item| item == needle)),
        Value::Map(map) => Ok(map.borrow().contains_key(&needle.to_string())),
        Value::Str(s) => match needle {
            Value::Str(n) => Ok(s.contains(&**n)),
            other => Err(VmError::type_mismatch(format!(
                "'in <string>' requires a string, got {}",
                other.type_name()
            ))),
        },
        other => Err(VmError::type_mismatch(format!(
            "argument of type {} is not iterable",
            other.type_name()
        ))),
    }
}
