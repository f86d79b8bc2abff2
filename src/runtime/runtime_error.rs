use thiserror::Error;

use crate::bytecode::op::UnknownOpcode;

/// Fatal errors raised by the VM. Execution stops at the first one.
///
/// Builtins report misuse through `Object::Error` values instead; those are
/// ordinary results as far as the VM is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("stack overflow")]
    StackOverflow,

    #[error("stack underflow")]
    StackUnderflow,

    #[error("frame overflow")]
    FrameOverflow,

    #[error("unknown opcode: {0}")]
    UnknownOpcode(u8),

    #[error("truncated instruction at offset {0}")]
    TruncatedInstruction(usize),

    #[error("constant index {0} out of range")]
    ConstantOutOfRange(usize),

    #[error("global index {index} out of range for {size} globals")]
    GlobalOutOfRange { index: usize, size: usize },

    #[error("free variable index {0} out of range")]
    FreeOutOfRange(usize),

    #[error("builtin index {0} out of range")]
    BuiltinOutOfRange(usize),

    #[error("division by zero")]
    DivisionByZero,

    #[error("unsupported types for binary operation: {left} {right}")]
    UnsupportedBinaryTypes {
        left: &'static str,
        right: &'static str,
    },

    #[error("unknown string operator: {0}")]
    UnknownStringOperator(&'static str),

    #[error("unknown operator: {operator} ({left} {right})")]
    UnknownOperator {
        operator: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("unsupported type for negation: {0}")]
    UnsupportedNegation(&'static str),

    #[error("unusable as hash key: {0}")]
    UnusableHashKey(&'static str),

    #[error("index operator not supported: {0}")]
    IndexNotSupported(&'static str),

    #[error("wrong number of arguments: want={want}, got={got}")]
    WrongArgumentCount { want: usize, got: usize },

    #[error("calling non-function and non-built-in")]
    NotCallable,

    #[error("not a function: {0}")]
    NotAFunction(&'static str),
}

impl From<UnknownOpcode> for RuntimeError {
    fn from(err: UnknownOpcode) -> Self {
        RuntimeError::UnknownOpcode(err.0)
    }
}
