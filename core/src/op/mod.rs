//! Instruction set.
//!
//! Opcode numbers are part of the wire format and must never be reused.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::error::VmError;

mod pattern;

pub use pattern::{RegexCache, like, regex_match};


/// Kind of an inline operand following an opcode in the token stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperandKind {
    Int,
    Str,
    Number,
}

macro_rules! opcodes {
    ($($variant:ident = $code:literal => $name:literal [$($kind:ident),*]),* $(,)?) => {
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Opcode {
            $($variant = $code),*
        }

        impl Opcode {
            pub const ALL: &'static [Opcode] = &[$(Opcode::$variant),*];

            #[inline]
            pub fn from_code(code: i64) -> Option<Opcode> {
                match code {
                    $($code => Some(Opcode::$variant),)*
                    _ => None,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $(Opcode::$variant => $name),*
                }
            }

            /// Fixed inline operands. `CLOSURE` additionally carries a
            /// variable number of `(is_local, index)` pairs, see
            /// [`Opcode::has_capture_list`].
            pub fn operands(self) -> &'static [OperandKind] {
                match self {
                    $(Opcode::$variant => &[$(OperandKind::$kind),*]),*
                }
            }
        }
    };
}

opcodes! {
    GetGlobal = 1 => "GET_GLOBAL" [Int],
    CallGlobal = 2 => "CALL_GLOBAL" [Str, Int],
    And = 3 => "AND" [Int],
    Or = 4 => "OR" [Int],
    Not = 5 => "NOT" [],
    Plus = 6 => "PLUS" [],
    Minus = 7 => "MINUS" [],
    Multiply = 8 => "MULTIPLY" [],
    Divide = 9 => "DIVIDE" [],
    Mod = 10 => "MOD" [],
    Eq = 11 => "EQ" [],
    NotEq = 12 => "NOT_EQ" [],
    Gt = 13 => "GT" [],
    GtEq = 14 => "GT_EQ" [],
    Lt = 15 => "LT" [],
    LtEq = 16 => "LT_EQ" [],
    Like = 17 => "LIKE" [],
    ILike = 18 => "ILIKE" [],
    NotLike = 19 => "NOT_LIKE" [],
    NotILike = 20 => "NOT_ILIKE" [],
    In = 21 => "IN" [],
    NotIn = 22 => "NOT_IN" [],
    Regex = 23 => "REGEX" [],
    NotRegex = 24 => "NOT_REGEX" [],
    IRegex = 25 => "IREGEX" [],
    NotIRegex = 26 => "NOT_IREGEX" [],
    InCohort = 27 => "IN_COHORT" [],
    NotInCohort = 28 => "NOT_IN_COHORT" [],
    True = 29 => "TRUE" [],
    False = 30 => "FALSE" [],
    Null = 31 => "NULL" [],
    String = 32 => "STRING" [Str],
    Integer = 33 => "INTEGER" [Int],
    Float = 34 => "FLOAT" [Number],
    Pop = 35 => "POP" [],
    GetLocal = 36 => "GET_LOCAL" [Int],
    SetLocal = 37 => "SET_LOCAL" [Int],
    Return = 38 => "RETURN" [],
    Jump = 39 => "JUMP" [Int],
    JumpIfFalse = 40 => "JUMP_IF_FALSE" [Int],
    DeclareFn = 41 => "DECLARE_FN" [Str, Int, Int],
    Dict = 42 => "DICT" [Int],
    Array = 43 => "ARRAY" [Int],
    Tuple = 44 => "TUPLE" [Int],
    GetProperty = 45 => "GET_PROPERTY" [],
    SetProperty = 46 => "SET_PROPERTY" [],
    JumpIfStackNotNull = 47 => "JUMP_IF_STACK_NOT_NULL" [Int],
    GetPropertyNullish = 48 => "GET_PROPERTY_NULLISH" [],
    Throw = 49 => "THROW" [],
    Try = 50 => "TRY" [Int],
    PopTry = 51 => "POP_TRY" [],
    Callable = 52 => "CALLABLE" [Str, Int, Int, Int],
    Closure = 53 => "CLOSURE" [],
    CallLocal = 54 => "CALL_LOCAL" [Int],
    GetUpvalue = 55 => "GET_UPVALUE" [Int],
    SetUpvalue = 56 => "SET_UPVALUE" [Int],
    CloseUpvalue = 57 => "CLOSE_UPVALUE" [],
}

impl Opcode {
    #[inline]
    pub fn code(self) -> i64 {
        self as u8 as i64
    }

    #[inline]
    pub fn has_capture_list(self) -> bool {
        self == Opcode::Closure
    }

    /// Whether the last fixed operand is a relative offset from the end of the
    /// instruction.
    pub fn is_relative_jump(self) -> bool {
        matches!(
            self,
            Opcode::Jump
                | Opcode::JumpIfFalse
                | Opcode::JumpIfStackNotNull
                | Opcode::Try
                | Opcode::DeclareFn
                | Opcode::Callable
        )
    }
}

impl TryFrom<i64> for Opcode {
    type Error = VmError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        Opcode::from_code(code).ok_or_else(|| VmError::UnknownOpcode(code.to_string()))
    }
}

impl Serialize for Opcode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
