//! Programmatic assembler for bytecode.
//!
//! Used by embedders that generate programs directly and by the test suite.
//! Jump offsets and function body lengths are back-patched on [`build`].
//!
//! [`build`]: BytecodeBuilder::build

use crate::error::{VmError, VmResult};
use crate::op::Opcode;

use super::bytecode::{HEADER_MARKER, Program, SUPPORTED_VERSION, Token};

/// Forward-declarable jump target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

#[derive(Debug)]
struct Patch {
    /// Token holding the offset.
    slot: usize,
    label: Label,
}

#[derive(Debug)]
pub struct BytecodeBuilder {
    tokens: Vec<Token>,
    labels: Vec<Option<usize>>,
    patches: Vec<Patch>,
}

impl Default for BytecodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BytecodeBuilder {
    pub fn new() -> Self {
        Self {
            tokens: vec![Token::from(HEADER_MARKER), Token::Int(SUPPORTED_VERSION)],
            labels: Vec::new(),
            patches: Vec::new(),
        }
    }

    /// Current write position.
    #[inline]
    pub fn position(&self) -> usize {
        self.tokens.len()
    }

    pub fn op(&mut self, op: Opcode) -> &mut Self {
        self.tokens.push(op.into());
        self
    }

    pub fn raw(&mut self, token: impl Into<Token>) -> &mut Self {
        self.tokens.push(token.into());
        self
    }

    fn op_with(&mut self, op: Opcode, operand: impl Into<Token>) -> &mut Self {
        self.op(op).raw(operand)
    }

    fn count(n: usize) -> Token {
        Token::Int(n as i64)
    }

    pub fn int(&mut self, i: i64) -> &mut Self {
        self.op_with(Opcode::Integer, i)
    }

    pub fn float(&mut self, f: f64) -> &mut Self {
        self.op_with(Opcode::Float, f)
    }

    pub fn string(&mut self, s: &str) -> &mut Self {
        self.op_with(Opcode::String, s)
    }

    pub fn bool(&mut self, b: bool) -> &mut Self {
        self.op(if b { Opcode::True } else { Opcode::False })
    }

    pub fn null(&mut self) -> &mut Self {
        self.op(Opcode::Null)
    }

    pub fn pop(&mut self) -> &mut Self {
        self.op(Opcode::Pop)
    }

    pub fn get_local(&mut self, slot: usize) -> &mut Self {
        self.op_with(Opcode::GetLocal, Self::count(slot))
    }

    pub fn set_local(&mut self, slot: usize) -> &mut Self {
        self.op_with(Opcode::SetLocal, Self::count(slot))
    }

    /// Pushes a global lookup such as `event.properties.url`.
    pub fn get_global(&mut self, chain: &[&str]) -> &mut Self {
        for part in chain.iter().rev() {
            self.string(part);
        }
        self.op_with(Opcode::GetGlobal, Self::count(chain.len()))
    }

    /// Calls a declared or registry function with the `argc` values on top of
    /// the stack, pushed first-argument first.
    pub fn call_global(&mut self, name: &str, argc: usize) -> &mut Self {
        self.op(Opcode::CallGlobal).raw(name).raw(Self::count(argc))
    }

    pub fn call_local(&mut self, argc: usize) -> &mut Self {
        self.op_with(Opcode::CallLocal, Self::count(argc))
    }

    pub fn array(&mut self, len: usize) -> &mut Self {
        self.op_with(Opcode::Array, Self::count(len))
    }

    pub fn tuple(&mut self, len: usize) -> &mut Self {
        self.op_with(Opcode::Tuple, Self::count(len))
    }

    /// Builds an object from `pairs` key/value pairs on the stack.
    pub fn dict(&mut self, pairs: usize) -> &mut Self {
        self.op_with(Opcode::Dict, Self::count(pairs))
    }

    pub fn and(&mut self, count: usize) -> &mut Self {
        self.op_with(Opcode::And, Self::count(count))
    }

    pub fn or(&mut self, count: usize) -> &mut Self {
        self.op_with(Opcode::Or, Self::count(count))
    }

    pub fn get_upvalue(&mut self, index: usize) -> &mut Self {
        self.op_with(Opcode::GetUpvalue, Self::count(index))
    }

    pub fn set_upvalue(&mut self, index: usize) -> &mut Self {
        self.op_with(Opcode::SetUpvalue, Self::count(index))
    }

    pub fn ret(&mut self) -> &mut Self {
        self.op(Opcode::Return)
    }

    pub fn throw(&mut self) -> &mut Self {
        self.op(Opcode::Throw)
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Binds `label` to the current position.
    pub fn mark(&mut self, label: Label) -> &mut Self {
        let pos = self.position();
        if let Some(slot) = self.labels.get_mut(label.0) {
            *slot = Some(pos);
        }
        self
    }

    fn op_to_label(&mut self, op: Opcode, label: Label) -> &mut Self {
        self.op(op);
        self.patches.push(Patch {
            slot: self.tokens.len(),
            label,
        });
        self.raw(0i64)
    }

    pub fn jump(&mut self, label: Label) -> &mut Self {
        self.op_to_label(Opcode::Jump, label)
    }

    pub fn jump_if_false(&mut self, label: Label) -> &mut Self {
        self.op_to_label(Opcode::JumpIfFalse, label)
    }

    pub fn jump_if_stack_not_null(&mut self, label: Label) -> &mut Self {
        self.op_to_label(Opcode::JumpIfStackNotNull, label)
    }

    /// Opens a try block whose handler starts at `catch`.
    pub fn try_(&mut self, catch: Label) -> &mut Self {
        self.op_to_label(Opcode::Try, catch)
    }

    pub fn pop_try(&mut self) -> &mut Self {
        self.op(Opcode::PopTry)
    }

    fn with_body(&mut self, body: impl FnOnce(&mut Self)) -> &mut Self {
        let len_slot = self.tokens.len() - 1;
        let start = self.position();
        body(self);
        let body_len = self.position() - start;
        self.tokens[len_slot] = Self::count(body_len);
        self
    }

    /// Emits `CALLABLE` with an inline body. The body runs with its arguments
    /// in locals `0..arg_count`.
    pub fn function(
        &mut self,
        name: &str,
        arg_count: usize,
        upvalue_count: usize,
        body: impl FnOnce(&mut Self),
    ) -> &mut Self {
        self.op(Opcode::Callable)
            .raw(name)
            .raw(Self::count(arg_count))
            .raw(Self::count(upvalue_count))
            .raw(0i64)
            .with_body(body)
    }

    /// Emits `CLOSURE`, capturing `(is_local, index)` for each upvalue of the
    /// callable on top of the stack.
    pub fn closure(&mut self, captures: &[(bool, usize)]) -> &mut Self {
        self.op(Opcode::Closure);
        for (is_local, index) in captures {
            self.raw(*is_local).raw(Self::count(*index));
        }
        self
    }

    /// Emits a named top-level function callable through `CALL_GLOBAL`.
    pub fn declare_fn(&mut self, name: &str, arg_count: usize, body: impl FnOnce(&mut Self)) -> &mut Self {
        self.op(Opcode::DeclareFn)
            .raw(name)
            .raw(Self::count(arg_count))
            .raw(0i64)
            .with_body(body)
    }

    /// Resolves labels and validates the header.
    pub fn build(&self) -> VmResult<Program> {
        let mut tokens = self.tokens.clone();
        for patch in &self.patches {
            let target = self
                .labels
                .get(patch.label.0)
                .copied()
                .flatten()
                .ok_or_else(|| VmError::invalid_bytecode(format!("unbound label {}", patch.label.0)))?;
            let offset = target as i64 - (patch.slot as i64 + 1);
            tokens[patch.slot] = Token::Int(offset);
        }
        Program::from_tokens(tokens)
    }
}
