use std::mem;

use tracing::debug;

use crate::bytecode::{Bytecode, Compiler, SymbolTable};
use crate::error::MonkeyError;
use crate::frontend::parse_source;
use crate::lang::value::Object;
use crate::runtime::{Vm, VmConfig};

/// Compile and run state that persists across evaluated units.
///
/// Each call to [`Session::eval`] sees the globals, functions and constants
/// defined by the calls before it, the way a REPL does.
pub struct Session {
    symbols: SymbolTable,
    constants: Vec<Object>,
    globals: Vec<Object>,
    config: VmConfig,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        let (symbols, constants) = Compiler::new().into_state();
        Self {
            symbols,
            constants,
            globals: vec![Object::Null; config.globals_size],
            config,
        }
    }

    /// Lexes, parses, compiles and runs `source`, returning the value of its
    /// last expression statement.
    pub fn eval(&mut self, source: &str) -> Result<Object, MonkeyError> {
        let bytecode = self.compile(source)?;
        self.run(bytecode)
    }

    /// Compiles `source` against the session state and commits the new
    /// symbols and constants. Nothing is committed when compilation fails.
    pub fn compile(&mut self, source: &str) -> Result<Bytecode, MonkeyError> {
        debug!(len = source.len(), "compiling unit");

        let program = parse_source(source)?;
        let mut compiler = Compiler::new_with_state(self.symbols.clone(), self.constants.clone());
        compiler.compile(&program)?;

        let bytecode = compiler.bytecode();
        (self.symbols, self.constants) = compiler.into_state();
        Ok(bytecode)
    }

    /// Runs compiled bytecode against the session globals. Globals written
    /// before a runtime error are kept.
    pub fn run(&mut self, bytecode: Bytecode) -> Result<Object, MonkeyError> {
        let globals = mem::take(&mut self.globals);
        let mut vm = Vm::with_globals(bytecode, globals, self.config.clone());

        let result = vm.run();
        let value = vm.last_popped();
        self.globals = vm.into_globals();

        result?;
        debug!(%value, "unit finished");
        Ok(value)
    }

    pub fn globals(&self) -> &[Object] {
        &self.globals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::CompileError;
    use crate::runtime::RuntimeError;

    #[test]
    fn test_globals_persist_between_units() {
        let mut session = Session::new();
        session.eval("let a = 5;").unwrap();
        session.eval("let b = a * 2;").unwrap();
        assert_eq!(session.eval("a + b").unwrap(), Object::Integer(15));
    }

    #[test]
    fn test_functions_persist_between_units() {
        let mut session = Session::new();
        session.eval("let add = fn(x, y) { x + y };").unwrap();
        assert_eq!(session.eval("add(2, 3)").unwrap(), Object::Integer(5));
    }

    #[test]
    fn test_compile_error_keeps_state() {
        let mut session = Session::new();
        session.eval("let a = 1;").unwrap();

        let err = session.eval("let b = 2; c").unwrap_err();
        assert!(matches!(
            err,
            MonkeyError::Compile(CompileError::UndefinedVariable(ref name)) if name == "c"
        ));

        // `b` was never committed, so it is still undefined.
        assert!(session.eval("b").is_err());
        assert_eq!(session.eval("let b = 3; a + b").unwrap(), Object::Integer(4));
    }

    #[test]
    fn test_runtime_error_keeps_earlier_globals() {
        let mut session = Session::new();
        let err = session.eval("let a = 7; 1 / 0").unwrap_err();
        assert!(matches!(err, MonkeyError::Runtime(RuntimeError::DivisionByZero)));
        assert_eq!(session.globals()[0], Object::Integer(7));
        assert_eq!(session.eval("a").unwrap(), Object::Integer(7));
    }

    #[test]
    fn test_parse_error_is_reported() {
        let mut session = Session::new();
        assert!(matches!(session.eval("let = 5;"), Err(MonkeyError::Parser(_))));
    }
}
