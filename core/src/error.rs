use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

pub type VmResult<T> = Result<T, VmError>;

/// Who is responsible for a failed run.
///
/// `Script` errors were raised by the program itself (`throw`) and escaped every
/// try block. `Vm` errors mean the sandbox stopped the program or could not
/// make sense of it; they are never visible to script-level try/catch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Script,
    Vm,
}

/// An error value thrown by a script that no try block caught.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScriptError {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[derive(Debug, Clone, Error)]
pub enum VmError {
    #[error("{0}")]
    Uncaught(ScriptError),
    #[error("Execution timed out after {:.3} seconds ({ops} operations)", .timeout.as_secs_f64())]
    Timeout { timeout: Duration, ops: u64 },
    #[error("Exceeded the maximum of {limit} executed instructions")]
    StepBudgetExceeded { limit: u64 },
    #[error("Stack overflow: {0}")]
    StackOverflow(String),
    #[error("Stack underflow")]
    StackUnderflow,
    #[error("Memory limit of {limit} bytes exceeded. Tried to allocate {requested} bytes")]
    MemoryLimitExceeded { limit: usize, requested: usize },
    #[error("Unknown opcode: {0}")]
    UnknownOpcode(String),
    #[error("Unknown function: {0}")]
    UnknownFunction(String),
    #[error("Global variable not found: {0}")]
    UnknownGlobal(String),
    #[error("{name}() takes {expected} arguments, got {got}")]
    Arity { name: String, expected: String, got: usize },
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),
    #[error("Index {index} out of bounds for length {len}")]
    OutOfBounds { index: i64, len: usize },
    #[error("Invalid bytecode: {0}")]
    InvalidBytecode(String),
    #[error("{0}")]
    InvalidOperation(String),
}

impl VmError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            VmError::Uncaught(_) => ErrorCategory::Script,
            _ => ErrorCategory::Vm,
        }
    }

    #[inline]
    pub fn is_script_error(&self) -> bool {
        self.category() == ErrorCategory::Script
    }

    /// Error kind as surfaced to callers: the thrown error's type for script
    /// errors, the fault name otherwise.
    pub fn kind(&self) -> &str {
        match self {
            VmError::Uncaught(err) => &err.kind,
            VmError::Timeout { .. } => "Timeout",
            VmError::StepBudgetExceeded { .. } => "StepBudgetExceeded",
            VmError::StackOverflow(_) => "StackOverflow",
            VmError::StackUnderflow => "StackUnderflow",
            VmError::MemoryLimitExceeded { .. } => "MemoryLimitExceeded",
            VmError::UnknownOpcode(_) => "UnknownOpcode",
            VmError::UnknownFunction(_) => "UnknownFunction",
            VmError::UnknownGlobal(_) => "UnknownGlobal",
            VmError::Arity { .. } => "ArityMismatch",
            VmError::TypeMismatch(_) => "TypeMismatch",
            VmError::OutOfBounds { .. } => "OutOfBounds",
            VmError::InvalidBytecode(_) => "InvalidBytecode",
            VmError::InvalidOperation(_) => "InvalidOperation",
        }
    }

    pub fn message(&self) -> String {
        match self {
            VmError::Uncaught(err) => err.message.clone(),
            other => other.to_string(),
        }
    }

    pub fn payload(&self) -> Option<&serde_json::Value> {
        match self {
            VmError::Uncaught(err) => err.payload.as_ref(),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut out = serde_json::Map::new();
        out.insert("category".into(), serde_json::json!(self.category()));
        out.insert("type".into(), self.kind().into());
        out.insert("message".into(), self.message().into());
        if let Some(payload) = self.payload() {
            out.insert("payload".into(), payload.clone());
        }
        serde_json::Value::Object(out)
    }

    /// A catchable error raised from native code, as if the script had
    /// thrown `kind(message)`.
    pub fn script(kind: impl Into<String>, message: impl Into<String>) -> Self {
        VmError::Uncaught(ScriptError {
            kind: kind.into(),
            message: message.into(),
            payload: None,
        })
    }

    pub fn type_mismatch(msg: impl Into<String>) -> Self {
        VmError::TypeMismatch(msg.into())
    }

    pub fn invalid_bytecode(msg: impl Into<String>) -> Self {
        VmError::InvalidBytecode(msg.into())
    }
}
