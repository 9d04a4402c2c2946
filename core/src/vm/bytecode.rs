use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::error::{VmError, VmResult};
use crate::op::{OperandKind, Opcode};
use crate::val::escape_string;

/// Marker expected in the first slot of every program.
pub const HEADER_MARKER: &str = "_H";
/// Marker of the pre-versioned format, which is not executed.
pub const LEGACY_HEADER_MARKER: &str = "_h";
pub const SUPPORTED_VERSION: i64 = 1;
/// Index of the first instruction: after the marker and the version.
pub const CODE_START: usize = 2;

/// One element of the flat token stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Token {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
}

impl Token {
    fn from_json(pos: usize, val: &JsonValue) -> VmResult<Token> {
        Ok(match val {
            JsonValue::Null => Token::Null,
            JsonValue::Bool(b) => Token::Bool(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Token::Int(i),
                None => Token::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Token::Str(Arc::from(s.as_str())),
            JsonValue::Array(_) | JsonValue::Object(_) => {
                return Err(VmError::invalid_bytecode(format!(
                    "unexpected nested structure at position {pos}"
                )));
            }
        })
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Token::Null => "null",
            Token::Bool(_) => "boolean",
            Token::Int(_) => "integer",
            Token::Float(_) => "float",
            Token::Str(_) => "string",
        }
    }
}

impl From<i64> for Token {
    fn from(i: i64) -> Self {
        Token::Int(i)
    }
}

impl From<f64> for Token {
    fn from(f: f64) -> Self {
        Token::Float(f)
    }
}

impl From<bool> for Token {
    fn from(b: bool) -> Self {
        Token::Bool(b)
    }
}

impl From<&str> for Token {
    fn from(s: &str) -> Self {
        Token::Str(Arc::from(s))
    }
}

impl From<Opcode> for Token {
    fn from(op: Opcode) -> Self {
        Token::Int(op.code())
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Null => f.write_str("null"),
            Token::Bool(b) => write!(f, "{b}"),
            Token::Int(i) => write!(f, "{i}"),
            Token::Float(x) => write!(f, "{x:?}"),
            Token::Str(s) => f.write_str(&escape_string(s)),
        }
    }
}

/// A validated, immutable bytecode program.
///
/// Cloning is cheap and the token stream is never mutated, so one program can
/// be executed by many threads at once.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    tokens: Arc<[Token]>,
}

impl Program {
    /// Parses the JSON wire format: `["_H", 1, op, operands..., op, ...]`.
    pub fn from_json_str(src: &str) -> VmResult<Program> {
        let json: JsonValue =
            serde_json::from_str(src).map_err(|e| VmError::invalid_bytecode(format!("not valid JSON: {e}")))?;
        Program::from_json(&json)
    }

    pub fn from_json(json: &JsonValue) -> VmResult<Program> {
        let items = json
            .as_array()
            .ok_or_else(|| VmError::invalid_bytecode("expected a JSON array"))?;
        let tokens = items
            .iter()
            .enumerate()
            .map(|(pos, item)| Token::from_json(pos, item))
            .collect::<VmResult<Vec<_>>>()?;
        Program::from_tokens(tokens)
    }

    /// Validates the header of an already tokenized stream.
    pub fn from_tokens(tokens: Vec<Token>) -> VmResult<Program> {
        match tokens.first() {
            Some(Token::Str(marker)) if &**marker == HEADER_MARKER => {}
            Some(Token::Str(marker)) if &**marker == LEGACY_HEADER_MARKER => {
                return Err(VmError::invalid_bytecode(
                    "legacy bytecode format is not supported, recompile the program",
                ));
            }
            _ => return Err(VmError::invalid_bytecode("missing \"_H\" header")),
        }
        match tokens.get(1) {
            Some(Token::Int(SUPPORTED_VERSION)) => {}
            Some(other) => {
                return Err(VmError::invalid_bytecode(format!("unsupported bytecode version {other}")));
            }
            None => return Err(VmError::invalid_bytecode("missing bytecode version")),
        }
        Ok(Program {
            tokens: Arc::from(tokens),
        })
    }

    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(&*self.tokens).unwrap_or(JsonValue::Null)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tokens.len() <= CODE_START
    }

    #[inline]
    pub fn token(&self, pos: usize) -> Option<&Token> {
        self.tokens.get(pos)
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    fn operand_error(&self, pos: usize, expected: &str) -> VmError {
        match self.tokens.get(pos) {
            Some(tok) => VmError::invalid_bytecode(format!(
                "expected {expected} at position {pos}, found {}",
                tok.kind_name()
            )),
            None => VmError::invalid_bytecode(format!("unexpected end of bytecode at position {pos}")),
        }
    }

    #[inline]
    pub fn opcode_at(&self, pos: usize) -> VmResult<Opcode> {
        match self.tokens.get(pos) {
            Some(Token::Int(code)) => Opcode::try_from(*code),
            Some(other) => Err(VmError::UnknownOpcode(other.to_string())),
            None => Err(self.operand_error(pos, "an opcode")),
        }
    }

    #[inline]
    pub fn int_at(&self, pos: usize) -> VmResult<i64> {
        match self.tokens.get(pos) {
            Some(Token::Int(i)) => Ok(*i),
            _ => Err(self.operand_error(pos, "an integer")),
        }
    }

    /// Non-negative integer operand (counts, slots, lengths).
    #[inline]
    pub fn count_at(&self, pos: usize) -> VmResult<usize> {
        let val = self.int_at(pos)?;
        usize::try_from(val)
            .map_err(|_| VmError::invalid_bytecode(format!("negative operand {val} at position {pos}")))
    }

    #[inline]
    pub fn number_at(&self, pos: usize) -> VmResult<f64> {
        match self.tokens.get(pos) {
            Some(Token::Int(i)) => Ok(*i as f64),
            Some(Token::Float(f)) => Ok(*f),
            _ => Err(self.operand_error(pos, "a number")),
        }
    }

    #[inline]
    pub fn str_at(&self, pos: usize) -> VmResult<&Arc<str>> {
        match self.tokens.get(pos) {
            Some(Token::Str(s)) => Ok(s),
            _ => Err(self.operand_error(pos, "a string")),
        }
    }

    /// `CLOSURE` capture flags are booleans; integer 0/1 is accepted too.
    #[inline]
    pub fn flag_at(&self, pos: usize) -> VmResult<bool> {
        match self.tokens.get(pos) {
            Some(Token::Bool(b)) => Ok(*b),
            Some(Token::Int(i)) => Ok(*i != 0),
            _ => Err(self.operand_error(pos, "a boolean")),
        }
    }

    /// Decodes the whole stream into a positioned listing. Jump operands are
    /// resolved to absolute targets.
    pub fn disassemble(&self) -> VmResult<Vec<Instruction>> {
        let mut out = Vec::new();
        let mut pos = CODE_START;
        // Upvalue counts of callables whose CLOSURE has not been seen yet.
        let mut pending_captures: Vec<usize> = Vec::new();
        while pos < self.tokens.len() {
            let ip = pos;
            let opcode = self.opcode_at(pos)?;
            pos += 1;
            let mut operands = Vec::with_capacity(opcode.operands().len());
            for kind in opcode.operands() {
                let tok = match kind {
                    OperandKind::Int => Token::Int(self.int_at(pos)?),
                    OperandKind::Number => Token::Float(self.number_at(pos)?),
                    OperandKind::Str => Token::Str(self.str_at(pos)?.clone()),
                };
                operands.push(tok);
                pos += 1;
            }
            if opcode == Opcode::Callable {
                pending_captures.push(self.count_at(pos - 2)?);
            }
            if opcode.has_capture_list() {
                for _ in 0..pending_captures.pop().unwrap_or(0) {
                    operands.push(Token::Bool(self.flag_at(pos)?));
                    operands.push(Token::Int(self.int_at(pos + 1)?));
                    pos += 2;
                }
            }
            let target = opcode
                .is_relative_jump()
                .then(|| self.int_at(pos - 1).map(|offset| pos as i64 + offset))
                .transpose()?;
            out.push(Instruction {
                ip,
                opcode,
                operands,
                target,
            });
        }
        Ok(out)
    }
}

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Instruction {
    pub ip: usize,
    pub opcode: Opcode,
    pub operands: Vec<Token>,
    /// Absolute destination of jumps, try handlers and skipped bodies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<i64>,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>6}  {}", self.ip, self.opcode)?;
        for operand in &self.operands {
            write!(f, " {operand}")?;
        }
        if let Some(target) = self.target {
            write!(f, "  -> {target}")?;
        }
        Ok(())
    }
}
