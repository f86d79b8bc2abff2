//! Instruction encoding, compilation and disassembly.

pub mod compile;
pub mod compile_error;
pub mod disasm;
pub mod ir;
pub mod op;
pub mod symbol_table;

pub use compile::Compiler;
pub use compile_error::CompileError;
pub use ir::{Bytecode, Instructions};
pub use op::{Definition, Opcode, lookup, make, read_operands};
pub use symbol_table::{Symbol, SymbolScope, SymbolTable};
