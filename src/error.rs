use thiserror::Error;

use crate::bytecode::CompileError;
use crate::frontend::{LexerError, ParserError};
use crate::runtime::RuntimeError;

/// Any failure on the way from source text to a value.
#[derive(Debug, Error)]
pub enum MonkeyError {
    #[error("lexer error: {0}")]
    Lexer(#[from] LexerError),

    #[error("parse error: {0}")]
    Parser(#[from] ParserError),

    #[error("compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}
