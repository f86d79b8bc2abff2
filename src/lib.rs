//! Monkey: lexer, parser, bytecode compiler and stack virtual machine.
//!
//! The pipeline is `frontend` (source to AST), `bytecode` (AST to
//! instructions plus a constant pool) and `runtime` (executes bytecode).
//! [`Session`] strings the stages together and keeps globals alive between
//! evaluations.

pub mod bytecode;
pub mod error;
pub mod frontend;
pub mod lang;
pub mod repl;
pub mod runtime;
pub mod session;

pub use bytecode::{Bytecode, Compiler};
pub use error::MonkeyError;
pub use lang::value::Object;
pub use runtime::{Vm, VmConfig};
pub use session::Session;
