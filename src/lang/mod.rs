//! # Monkey language model
//!
//! The AST produced by the parser and the runtime values shared by the
//! compiler (constant pool) and the VM (stack, globals).
//!
//! ## Conventions
//!
//! - AST nodes are immutable once parsed and derive `Serialize` so the CLI
//!   can dump them as JSON.
//! - `Object` is cheap to clone; heap data sits behind `Rc`.

pub mod builtins;
pub mod node;
pub mod value;
