use thiserror::Error;

/// Errors raised while lowering the AST to bytecode.
///
/// The first error aborts compilation of the current unit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// Identifier that resolves in no enclosing scope.
    #[error("undefined variable: {0}")]
    UndefinedVariable(String),

    /// Prefix or infix operator with no opcode mapping.
    #[error("unknown operator: {0}")]
    UnknownOperator(String),

    /// An operand that does not fit in its encoded width.
    #[error("too many {what}: {value} exceeds the limit of {max}")]
    OperandOutOfRange {
        what: &'static str,
        value: usize,
        max: usize,
    },
}

impl CompileError {
    pub fn undefined(name: &str) -> Self {
        CompileError::UndefinedVariable(name.to_string())
    }

    pub fn unknown_operator(operator: &str) -> Self {
        CompileError::UnknownOperator(operator.to_string())
    }

    pub fn out_of_range(what: &'static str, value: usize, max: usize) -> Self {
        CompileError::OperandOutOfRange { what, value, max }
    }
}
