use std::mem;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::{
    bytecode::{
        Bytecode, Instructions,
        compile_error::CompileError,
        op::{Opcode, make},
        symbol_table::{Symbol, SymbolScope, SymbolTable},
    },
    lang::{
        builtins::BUILTINS,
        node::{BlockStatement, Expression, FunctionLiteral, Program, Statement},
        value::{CompiledFunction, Object},
    },
};

/// Operand placeholder for forward jumps, patched once the target is known.
const JUMP_PLACEHOLDER: usize = 9999;

const MAX_U8: usize = u8::MAX as usize;
const MAX_U16: usize = u16::MAX as usize;

#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    opcode: Opcode,
    position: usize,
}

/// Instruction buffer of one function body (or of the main program).
#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Instructions,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
}

pub struct Compiler {
    /// Constant pool, shared by every scope.
    constants: Vec<Object>,

    symbol_table: SymbolTable,

    /// Scope currently receiving instructions.
    scope: CompilationScope,

    /// Suspended scopes of the enclosing function literals, innermost last.
    enclosing: Vec<CompilationScope>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    /// Fresh compiler with every builtin registered in the root scope.
    pub fn new() -> Self {
        let mut symbol_table = SymbolTable::new();
        for (index, builtin) in BUILTINS.iter().enumerate() {
            symbol_table.define_builtin(index, builtin.name);
        }

        Self::new_with_state(symbol_table, Vec::new())
    }

    /// Resumes from the global symbol table and constant pool of an earlier
    /// compile, so later units see the globals defined by earlier ones.
    pub fn new_with_state(symbol_table: SymbolTable, constants: Vec<Object>) -> Self {
        Self {
            constants,
            symbol_table,
            scope: CompilationScope::default(),
            enclosing: Vec::new(),
        }
    }

    /// Hands back the global symbol table and constant pool.
    pub fn into_state(self) -> (SymbolTable, Vec<Object>) {
        let mut table = self.symbol_table;
        while !table.is_global() {
            table = table.into_outer().unwrap_or_default();
        }
        (table, self.constants)
    }

    pub fn bytecode(&self) -> Bytecode {
        Bytecode {
            instructions: self.scope.instructions.clone(),
            constants: self.constants.clone(),
        }
    }

    pub fn compile(&mut self, program: &Program) -> Result<(), CompileError> {
        for statement in &program.statements {
            self.compile_statement(statement)?;
        }

        debug!(
            instructions = self.scope.instructions.len(),
            constants = self.constants.len(),
            "compiled program"
        );
        Ok(())
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn compile_statement(&mut self, statement: &Statement) -> Result<(), CompileError> {
        match statement {
            Statement::Expression(expression) => {
                self.compile_expression(expression)?;
                self.emit(Opcode::Pop, &[]);
            }
            Statement::Let { name, value } => {
                self.compile_expression(value)?;
                let symbol = self.symbol_table.define(name);
                self.store_symbol(&symbol)?;
            }
            Statement::Return(value) => {
                self.compile_expression(value)?;
                self.emit(Opcode::ReturnValue, &[]);
            }
        }
        Ok(())
    }

    fn compile_block(&mut self, block: &BlockStatement) -> Result<(), CompileError> {
        for statement in &block.statements {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    /// Compiles an `if` branch so that it leaves exactly one value.
    ///
    /// A trailing expression statement keeps its value (its `Pop` is dropped).
    /// An empty branch, or one ending in `let`, yields `null`.
    fn compile_branch(&mut self, block: &BlockStatement) -> Result<(), CompileError> {
        self.compile_block(block)?;

        if self.last_instruction_is(Opcode::Pop) {
            self.remove_last_pop();
        } else if !self.last_instruction_is(Opcode::ReturnValue) {
            self.emit(Opcode::Null, &[]);
        }
        Ok(())
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn compile_expression(&mut self, expression: &Expression) -> Result<(), CompileError> {
        match expression {
            Expression::Integer(value) => {
                let index = self.add_constant(Object::Integer(*value))?;
                self.emit(Opcode::Constant, &[index]);
            }
            Expression::String(value) => {
                let index = self.add_constant(Object::string(value.as_str()))?;
                self.emit(Opcode::Constant, &[index]);
            }
            Expression::Boolean(true) => {
                self.emit(Opcode::True, &[]);
            }
            Expression::Boolean(false) => {
                self.emit(Opcode::False, &[]);
            }
            Expression::Identifier(name) => {
                let symbol = self
                    .symbol_table
                    .resolve(name)
                    .ok_or_else(|| CompileError::undefined(name))?;
                self.load_symbol(&symbol)?;
            }
            Expression::Prefix { operator, right } => {
                self.compile_expression(right)?;
                let opcode = match operator.as_str() {
                    "!" => Opcode::Bang,
                    "-" => Opcode::Minus,
                    other => return Err(CompileError::unknown_operator(other)),
                };
                self.emit(opcode, &[]);
            }
            Expression::Infix {
                left,
                operator,
                right,
            } => self.compile_infix(left, operator, right)?,
            Expression::If {
                condition,
                consequence,
                alternative,
            } => self.compile_if(condition, consequence, alternative.as_ref())?,
            Expression::Function(literal) => self.compile_function(literal)?,
            Expression::Call {
                function,
                arguments,
            } => {
                self.compile_expression(function)?;
                for argument in arguments {
                    self.compile_expression(argument)?;
                }
                let argc = check_operand("arguments", arguments.len(), MAX_U8)?;
                self.emit(Opcode::Call, &[argc]);
            }
            Expression::Array(elements) => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                let count = check_operand("array elements", elements.len(), MAX_U16)?;
                self.emit(Opcode::Array, &[count]);
            }
            Expression::Hash(pairs) => {
                for (key, value) in pairs {
                    self.compile_expression(key)?;
                    self.compile_expression(value)?;
                }
                let count = check_operand("hash elements", pairs.len() * 2, MAX_U16)?;
                self.emit(Opcode::Hash, &[count]);
            }
            Expression::Index { left, index } => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.emit(Opcode::Index, &[]);
            }
        }
        Ok(())
    }

    /// `a < b` has no opcode of its own; it is emitted as `b > a`.
    fn compile_infix(
        &mut self,
        left: &Expression,
        operator: &str,
        right: &Expression,
    ) -> Result<(), CompileError> {
        if operator == "<" {
            self.compile_expression(right)?;
            self.compile_expression(left)?;
            self.emit(Opcode::GreaterThan, &[]);
            return Ok(());
        }

        self.compile_expression(left)?;
        self.compile_expression(right)?;

        let opcode = match operator {
            "+" => Opcode::Add,
            "-" => Opcode::Sub,
            "*" => Opcode::Mul,
            "/" => Opcode::Div,
            ">" => Opcode::GreaterThan,
            "==" => Opcode::Equal,
            "!=" => Opcode::NotEqual,
            other => return Err(CompileError::unknown_operator(other)),
        };
        self.emit(opcode, &[]);
        Ok(())
    }

    /// ```text
    ///     <condition>
    ///     JumpNotTruthy else
    ///     <consequence>
    ///     Jump end
    /// else:
    ///     <alternative> | Null
    /// end:
    /// ```
    fn compile_if(
        &mut self,
        condition: &Expression,
        consequence: &BlockStatement,
        alternative: Option<&BlockStatement>,
    ) -> Result<(), CompileError> {
        self.compile_expression(condition)?;

        let jump_not_truthy = self.emit(Opcode::JumpNotTruthy, &[JUMP_PLACEHOLDER]);

        self.compile_branch(consequence)?;

        let jump = self.emit(Opcode::Jump, &[JUMP_PLACEHOLDER]);

        let after_consequence = self.scope.instructions.len();
        self.change_operand(jump_not_truthy, Opcode::JumpNotTruthy, after_consequence)?;

        match alternative {
            Some(block) => self.compile_branch(block)?,
            None => {
                self.emit(Opcode::Null, &[]);
            }
        }

        let after_alternative = self.scope.instructions.len();
        self.change_operand(jump, Opcode::Jump, after_alternative)?;

        Ok(())
    }

    fn compile_function(&mut self, literal: &FunctionLiteral) -> Result<(), CompileError> {
        self.enter_scope();

        if let Some(name) = &literal.name {
            self.symbol_table.define_function_name(name);
        }
        for parameter in &literal.parameters {
            self.symbol_table.define(parameter);
        }

        self.compile_block(&literal.body)?;

        if self.last_instruction_is(Opcode::Pop) {
            self.replace_last_pop_with_return();
        }
        if !self.last_instruction_is(Opcode::ReturnValue) {
            self.emit(Opcode::Return, &[]);
        }

        let free_symbols = self.symbol_table.free_symbols().to_vec();
        let num_locals = self.symbol_table.num_definitions();
        let instructions = self.leave_scope();

        for symbol in &free_symbols {
            self.load_symbol(symbol)?;
        }

        let function = CompiledFunction {
            instructions,
            num_locals,
            num_parameters: literal.parameters.len(),
        };
        let index = self.add_constant(Object::CompiledFunction(Rc::new(function)))?;
        let free_count = check_operand("free variables", free_symbols.len(), MAX_U8)?;

        debug!(
            name = literal.name.as_deref().unwrap_or("<anonymous>"),
            constant = index,
            num_locals,
            free = free_count,
            "compiled function"
        );

        self.emit(Opcode::Closure, &[index, free_count]);
        Ok(())
    }

    // =========================================================================
    // Symbols
    // =========================================================================

    fn load_symbol(&mut self, symbol: &Symbol) -> Result<(), CompileError> {
        match symbol.scope {
            SymbolScope::Global => {
                let index = check_operand("globals", symbol.index, MAX_U16)?;
                self.emit(Opcode::GetGlobal, &[index]);
            }
            SymbolScope::Local => {
                let index = check_operand("locals", symbol.index, MAX_U8)?;
                self.emit(Opcode::GetLocal, &[index]);
            }
            SymbolScope::Builtin => {
                let index = check_operand("builtins", symbol.index, MAX_U8)?;
                self.emit(Opcode::GetBuiltin, &[index]);
            }
            SymbolScope::Free => {
                let index = check_operand("free variables", symbol.index, MAX_U8)?;
                self.emit(Opcode::GetFree, &[index]);
            }
            SymbolScope::Function => {
                self.emit(Opcode::CurrentClosure, &[]);
            }
        }
        Ok(())
    }

    fn store_symbol(&mut self, symbol: &Symbol) -> Result<(), CompileError> {
        if symbol.scope == SymbolScope::Global {
            let index = check_operand("globals", symbol.index, MAX_U16)?;
            self.emit(Opcode::SetGlobal, &[index]);
        } else {
            let index = check_operand("locals", symbol.index, MAX_U8)?;
            self.emit(Opcode::SetLocal, &[index]);
        }
        Ok(())
    }

    // =========================================================================
    // Emission
    // =========================================================================

    fn add_constant(&mut self, object: Object) -> Result<usize, CompileError> {
        let index = check_operand("constants", self.constants.len(), MAX_U16)?;
        self.constants.push(object);
        Ok(index)
    }

    /// Appends one instruction and returns its position.
    fn emit(&mut self, opcode: Opcode, operands: &[usize]) -> usize {
        let instruction = make(opcode, operands);
        let position = self.scope.instructions.len();
        self.scope.instructions.extend_from_slice(&instruction);

        self.scope.previous_instruction = self.scope.last_instruction;
        self.scope.last_instruction = Some(EmittedInstruction { opcode, position });

        position
    }

    fn last_instruction_is(&self, opcode: Opcode) -> bool {
        matches!(self.scope.last_instruction, Some(last) if last.opcode == opcode)
    }

    fn remove_last_pop(&mut self) {
        if let Some(last) = self.scope.last_instruction {
            self.scope.instructions.truncate(last.position);
            self.scope.last_instruction = self.scope.previous_instruction;
        }
    }

    /// Overwrites the instruction at `position` with one of the same width.
    fn replace_instruction(&mut self, position: usize, instruction: &[u8]) {
        let end = position + instruction.len();
        self.scope.instructions[position..end].copy_from_slice(instruction);
    }

    /// Patches the single operand of the `opcode` instruction at `position`.
    fn change_operand(
        &mut self,
        position: usize,
        opcode: Opcode,
        operand: usize,
    ) -> Result<(), CompileError> {
        let operand = check_operand("instruction bytes", operand, MAX_U16)?;

        let instruction = make(opcode, &[operand]);
        self.replace_instruction(position, &instruction);
        Ok(())
    }

    fn replace_last_pop_with_return(&mut self) {
        if let Some(last) = self.scope.last_instruction {
            self.replace_instruction(last.position, &make(Opcode::ReturnValue, &[]));
            self.scope.last_instruction = Some(EmittedInstruction {
                opcode: Opcode::ReturnValue,
                position: last.position,
            });
        }
    }

    // =========================================================================
    // Scopes
    // =========================================================================

    fn enter_scope(&mut self) {
        let outer = mem::take(&mut self.scope);
        self.enclosing.push(outer);

        let outer_table = mem::take(&mut self.symbol_table);
        self.symbol_table = SymbolTable::new_enclosed(outer_table);

        trace!(depth = self.enclosing.len(), "enter scope");
    }

    fn leave_scope(&mut self) -> Instructions {
        let outer = self.enclosing.pop().unwrap_or_default();
        let inner = mem::replace(&mut self.scope, outer);

        let table = mem::take(&mut self.symbol_table);
        self.symbol_table = table.into_outer().unwrap_or_default();

        trace!(depth = self.enclosing.len(), "leave scope");
        inner.instructions
    }
}

fn check_operand(what: &'static str, value: usize, max: usize) -> Result<usize, CompileError> {
    if value > max {
        Err(CompileError::out_of_range(what, value, max))
    } else {
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parser::parse_source;

    enum Constant {
        Int(i64),
        Str(&'static str),
        Function(Vec<Vec<u8>>),
    }

    fn compile(source: &str) -> Result<Bytecode, CompileError> {
        let program = parse_source(source).expect("source should parse");
        let mut compiler = Compiler::new();
        compiler.compile(&program)?;
        Ok(compiler.bytecode())
    }

    fn assert_constants(actual: &[Object], expected: &[Constant]) {
        assert_eq!(actual.len(), expected.len(), "constants: {:?}", actual);

        for (i, (actual, expected)) in actual.iter().zip(expected).enumerate() {
            match (expected, actual) {
                (Constant::Int(n), Object::Integer(m)) => assert_eq!(n, m, "constant {}", i),
                (Constant::Str(s), Object::String(t)) => assert_eq!(*s, &**t, "constant {}", i),
                (Constant::Function(ins), Object::CompiledFunction(func)) => {
                    let expected = Instructions::concat(ins.clone());
                    assert_eq!(
                        func.instructions, expected,
                        "constant {}:\nwant:\n{}got:\n{}",
                        i, expected, func.instructions
                    );
                }
                (_, other) => panic!("constant {} has unexpected type: {:?}", i, other),
            }
        }
    }

    fn run_compiler_test(source: &str, constants: Vec<Constant>, instructions: Vec<Vec<u8>>) {
        let bytecode = compile(source).expect("compilation should succeed");

        let expected = Instructions::concat(instructions);
        assert_eq!(
            bytecode.instructions, expected,
            "source: {}\nwant:\n{}got:\n{}",
            source, expected, bytecode.instructions
        );
        assert_constants(&bytecode.constants, &constants);
    }

    use Constant::{Function as F, Int, Str};

    // =========================================================================
    // Expressions
    // =========================================================================

    #[test]
    fn test_integer_arithmetic() {
        run_compiler_test(
            "1 + 2",
            vec![Int(1), Int(2)],
            vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Add, &[]),
                make(Opcode::Pop, &[]),
            ],
        );
        run_compiler_test(
            "1; 2",
            vec![Int(1), Int(2)],
            vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::Pop, &[]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Pop, &[]),
            ],
        );
        run_compiler_test(
            "2 / 1",
            vec![Int(2), Int(1)],
            vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Div, &[]),
                make(Opcode::Pop, &[]),
            ],
        );
        run_compiler_test(
            "-1",
            vec![Int(1)],
            vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::Minus, &[]),
                make(Opcode::Pop, &[]),
            ],
        );
    }

    #[test]
    fn test_boolean_expressions() {
        run_compiler_test(
            "true",
            vec![],
            vec![make(Opcode::True, &[]), make(Opcode::Pop, &[])],
        );
        run_compiler_test(
            "1 > 2",
            vec![Int(1), Int(2)],
            vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::GreaterThan, &[]),
                make(Opcode::Pop, &[]),
            ],
        );
        run_compiler_test(
            "1 < 2",
            vec![Int(2), Int(1)],
            vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::GreaterThan, &[]),
                make(Opcode::Pop, &[]),
            ],
        );
        run_compiler_test(
            "true != false",
            vec![],
            vec![
                make(Opcode::True, &[]),
                make(Opcode::False, &[]),
                make(Opcode::NotEqual, &[]),
                make(Opcode::Pop, &[]),
            ],
        );
        run_compiler_test(
            "!true",
            vec![],
            vec![
                make(Opcode::True, &[]),
                make(Opcode::Bang, &[]),
                make(Opcode::Pop, &[]),
            ],
        );
    }

    #[test]
    fn test_conditionals() {
        run_compiler_test(
            "if (true) { 10 }; 3333;",
            vec![Int(10), Int(3333)],
            vec![
                make(Opcode::True, &[]),             // 0000
                make(Opcode::JumpNotTruthy, &[10]),  // 0001
                make(Opcode::Constant, &[0]),        // 0004
                make(Opcode::Jump, &[11]),           // 0007
                make(Opcode::Null, &[]),             // 0010
                make(Opcode::Pop, &[]),              // 0011
                make(Opcode::Constant, &[1]),        // 0012
                make(Opcode::Pop, &[]),              // 0015
            ],
        );
        run_compiler_test(
            "if (true) { 10 } else { 20 }; 3333;",
            vec![Int(10), Int(20), Int(3333)],
            vec![
                make(Opcode::True, &[]),             // 0000
                make(Opcode::JumpNotTruthy, &[10]),  // 0001
                make(Opcode::Constant, &[0]),        // 0004
                make(Opcode::Jump, &[13]),           // 0007
                make(Opcode::Constant, &[1]),        // 0010
                make(Opcode::Pop, &[]),              // 0013
                make(Opcode::Constant, &[2]),        // 0014
                make(Opcode::Pop, &[]),              // 0017
            ],
        );
    }

    #[test]
    fn test_empty_branch_yields_null() {
        run_compiler_test(
            "if (true) { }",
            vec![],
            vec![
                make(Opcode::True, &[]),            // 0000
                make(Opcode::JumpNotTruthy, &[8]),  // 0001
                make(Opcode::Null, &[]),            // 0004
                make(Opcode::Jump, &[9]),           // 0005
                make(Opcode::Null, &[]),            // 0008
                make(Opcode::Pop, &[]),             // 0009
            ],
        );
    }

    #[test]
    fn test_global_let_statements() {
        run_compiler_test(
            "let one = 1; let two = 2;",
            vec![Int(1), Int(2)],
            vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::SetGlobal, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::SetGlobal, &[1]),
            ],
        );
        run_compiler_test(
            "let one = 1; let two = one; two;",
            vec![Int(1)],
            vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::SetGlobal, &[0]),
                make(Opcode::GetGlobal, &[0]),
                make(Opcode::SetGlobal, &[1]),
                make(Opcode::GetGlobal, &[1]),
                make(Opcode::Pop, &[]),
            ],
        );
    }

    #[test]
    fn test_string_expressions() {
        run_compiler_test(
            r#""monkey""#,
            vec![Str("monkey")],
            vec![make(Opcode::Constant, &[0]), make(Opcode::Pop, &[])],
        );
        run_compiler_test(
            r#""mon" + "key""#,
            vec![Str("mon"), Str("key")],
            vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Add, &[]),
                make(Opcode::Pop, &[]),
            ],
        );
    }

    #[test]
    fn test_array_literals() {
        run_compiler_test(
            "[]",
            vec![],
            vec![make(Opcode::Array, &[0]), make(Opcode::Pop, &[])],
        );
        run_compiler_test(
            "[1 + 2, 3 - 4]",
            vec![Int(1), Int(2), Int(3), Int(4)],
            vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Add, &[]),
                make(Opcode::Constant, &[2]),
                make(Opcode::Constant, &[3]),
                make(Opcode::Sub, &[]),
                make(Opcode::Array, &[2]),
                make(Opcode::Pop, &[]),
            ],
        );
    }

    #[test]
    fn test_hash_literals_keep_source_order() {
        run_compiler_test(
            "{}",
            vec![],
            vec![make(Opcode::Hash, &[0]), make(Opcode::Pop, &[])],
        );
        run_compiler_test(
            "{3: 4, 1: 2}",
            vec![Int(3), Int(4), Int(1), Int(2)],
            vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Constant, &[2]),
                make(Opcode::Constant, &[3]),
                make(Opcode::Hash, &[4]),
                make(Opcode::Pop, &[]),
            ],
        );
    }

    #[test]
    fn test_index_expressions() {
        run_compiler_test(
            "[1, 2, 3][1 + 1]",
            vec![Int(1), Int(2), Int(3), Int(1), Int(1)],
            vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Constant, &[2]),
                make(Opcode::Array, &[3]),
                make(Opcode::Constant, &[3]),
                make(Opcode::Constant, &[4]),
                make(Opcode::Add, &[]),
                make(Opcode::Index, &[]),
                make(Opcode::Pop, &[]),
            ],
        );
    }

    // =========================================================================
    // Functions
    // =========================================================================

    #[test]
    fn test_functions() {
        let body = vec![
            make(Opcode::Constant, &[0]),
            make(Opcode::Constant, &[1]),
            make(Opcode::Add, &[]),
            make(Opcode::ReturnValue, &[]),
        ];

        for source in ["fn() { return 5 + 10 }", "fn() { 5 + 10 }"] {
            run_compiler_test(
                source,
                vec![Int(5), Int(10), F(body.clone())],
                vec![make(Opcode::Closure, &[2, 0]), make(Opcode::Pop, &[])],
            );
        }

        run_compiler_test(
            "fn() { 1; 2 }",
            vec![
                Int(1),
                Int(2),
                F(vec![
                    make(Opcode::Constant, &[0]),
                    make(Opcode::Pop, &[]),
                    make(Opcode::Constant, &[1]),
                    make(Opcode::ReturnValue, &[]),
                ]),
            ],
            vec![make(Opcode::Closure, &[2, 0]), make(Opcode::Pop, &[])],
        );
    }

    #[test]
    fn test_functions_without_return_value() {
        run_compiler_test(
            "fn() { }",
            vec![F(vec![make(Opcode::Return, &[])])],
            vec![make(Opcode::Closure, &[0, 0]), make(Opcode::Pop, &[])],
        );
    }

    #[test]
    fn test_function_calls() {
        run_compiler_test(
            "fn() { 24 }();",
            vec![
                Int(24),
                F(vec![make(Opcode::Constant, &[0]), make(Opcode::ReturnValue, &[])]),
            ],
            vec![
                make(Opcode::Closure, &[1, 0]),
                make(Opcode::Call, &[0]),
                make(Opcode::Pop, &[]),
            ],
        );
        run_compiler_test(
            "let oneArg = fn(a) { a }; oneArg(24);",
            vec![
                F(vec![make(Opcode::GetLocal, &[0]), make(Opcode::ReturnValue, &[])]),
                Int(24),
            ],
            vec![
                make(Opcode::Closure, &[0, 0]),
                make(Opcode::SetGlobal, &[0]),
                make(Opcode::GetGlobal, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Call, &[1]),
                make(Opcode::Pop, &[]),
            ],
        );
    }

    #[test]
    fn test_let_statement_scopes() {
        run_compiler_test(
            "let num = 55; fn() { num }",
            vec![
                Int(55),
                F(vec![make(Opcode::GetGlobal, &[0]), make(Opcode::ReturnValue, &[])]),
            ],
            vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::SetGlobal, &[0]),
                make(Opcode::Closure, &[1, 0]),
                make(Opcode::Pop, &[]),
            ],
        );
        run_compiler_test(
            "fn() { let num = 55; num }",
            vec![
                Int(55),
                F(vec![
                    make(Opcode::Constant, &[0]),
                    make(Opcode::SetLocal, &[0]),
                    make(Opcode::GetLocal, &[0]),
                    make(Opcode::ReturnValue, &[]),
                ]),
            ],
            vec![make(Opcode::Closure, &[1, 0]), make(Opcode::Pop, &[])],
        );
    }

    #[test]
    fn test_builtins() {
        run_compiler_test(
            "len([]); push([], 1);",
            vec![Int(1)],
            vec![
                make(Opcode::GetBuiltin, &[0]),
                make(Opcode::Array, &[0]),
                make(Opcode::Call, &[1]),
                make(Opcode::Pop, &[]),
                make(Opcode::GetBuiltin, &[4]),
                make(Opcode::Array, &[0]),
                make(Opcode::Constant, &[0]),
                make(Opcode::Call, &[2]),
                make(Opcode::Pop, &[]),
            ],
        );
        run_compiler_test(
            "fn() { len([]) }",
            vec![F(vec![
                make(Opcode::GetBuiltin, &[0]),
                make(Opcode::Array, &[0]),
                make(Opcode::Call, &[1]),
                make(Opcode::ReturnValue, &[]),
            ])],
            vec![make(Opcode::Closure, &[0, 0]), make(Opcode::Pop, &[])],
        );
    }

    #[test]
    fn test_closures() {
        run_compiler_test(
            "fn(a) { fn(b) { a + b } }",
            vec![
                F(vec![
                    make(Opcode::GetFree, &[0]),
                    make(Opcode::GetLocal, &[0]),
                    make(Opcode::Add, &[]),
                    make(Opcode::ReturnValue, &[]),
                ]),
                F(vec![
                    make(Opcode::GetLocal, &[0]),
                    make(Opcode::Closure, &[0, 1]),
                    make(Opcode::ReturnValue, &[]),
                ]),
            ],
            vec![make(Opcode::Closure, &[1, 0]), make(Opcode::Pop, &[])],
        );
    }

    #[test]
    fn test_closures_capture_through_every_level() {
        run_compiler_test(
            "fn(a) { fn(b) { fn(c) { a + b + c } } };",
            vec![
                F(vec![
                    make(Opcode::GetFree, &[0]),
                    make(Opcode::GetFree, &[1]),
                    make(Opcode::Add, &[]),
                    make(Opcode::GetLocal, &[0]),
                    make(Opcode::Add, &[]),
                    make(Opcode::ReturnValue, &[]),
                ]),
                F(vec![
                    make(Opcode::GetFree, &[0]),
                    make(Opcode::GetLocal, &[0]),
                    make(Opcode::Closure, &[0, 2]),
                    make(Opcode::ReturnValue, &[]),
                ]),
                F(vec![
                    make(Opcode::GetLocal, &[0]),
                    make(Opcode::Closure, &[1, 1]),
                    make(Opcode::ReturnValue, &[]),
                ]),
            ],
            vec![make(Opcode::Closure, &[2, 0]), make(Opcode::Pop, &[])],
        );
    }

    #[test]
    fn test_recursive_functions() {
        run_compiler_test(
            "let countDown = fn(x) { countDown(x - 1); }; countDown(1);",
            vec![
                Int(1),
                F(vec![
                    make(Opcode::CurrentClosure, &[]),
                    make(Opcode::GetLocal, &[0]),
                    make(Opcode::Constant, &[0]),
                    make(Opcode::Sub, &[]),
                    make(Opcode::Call, &[1]),
                    make(Opcode::ReturnValue, &[]),
                ]),
                Int(1),
            ],
            vec![
                make(Opcode::Closure, &[1, 0]),
                make(Opcode::SetGlobal, &[0]),
                make(Opcode::GetGlobal, &[0]),
                make(Opcode::Constant, &[2]),
                make(Opcode::Call, &[1]),
                make(Opcode::Pop, &[]),
            ],
        );

        run_compiler_test(
            "let wrapper = fn() { let countDown = fn(x) { countDown(x - 1); }; countDown(1); }; wrapper();",
            vec![
                Int(1),
                F(vec![
                    make(Opcode::CurrentClosure, &[]),
                    make(Opcode::GetLocal, &[0]),
                    make(Opcode::Constant, &[0]),
                    make(Opcode::Sub, &[]),
                    make(Opcode::Call, &[1]),
                    make(Opcode::ReturnValue, &[]),
                ]),
                Int(1),
                F(vec![
                    make(Opcode::Closure, &[1, 0]),
                    make(Opcode::SetLocal, &[0]),
                    make(Opcode::GetLocal, &[0]),
                    make(Opcode::Constant, &[2]),
                    make(Opcode::Call, &[1]),
                    make(Opcode::ReturnValue, &[]),
                ]),
            ],
            vec![
                make(Opcode::Closure, &[3, 0]),
                make(Opcode::SetGlobal, &[0]),
                make(Opcode::GetGlobal, &[0]),
                make(Opcode::Call, &[0]),
                make(Opcode::Pop, &[]),
            ],
        );
    }

    #[test]
    fn test_compiled_function_metadata() {
        let bytecode = compile("fn(a, b) { let c = a + b; c }").unwrap();
        match &bytecode.constants[0] {
            Object::CompiledFunction(func) => {
                assert_eq!(func.num_parameters, 2);
                assert_eq!(func.num_locals, 3);
            }
            other => panic!("expected compiled function, got {:?}", other),
        }
    }

    // =========================================================================
    // Scopes and state
    // =========================================================================

    #[test]
    fn test_compiler_scopes() {
        let mut compiler = Compiler::new();
        compiler.emit(Opcode::Mul, &[]);

        compiler.enter_scope();
        assert_eq!(compiler.enclosing.len(), 1);
        assert!(!compiler.symbol_table.is_global());

        compiler.emit(Opcode::Sub, &[]);
        assert_eq!(compiler.scope.instructions.len(), 1);
        assert!(compiler.last_instruction_is(Opcode::Sub));

        let inner = compiler.leave_scope();
        assert_eq!(inner, Instructions::from(make(Opcode::Sub, &[])));
        assert!(compiler.enclosing.is_empty());
        assert!(compiler.symbol_table.is_global());

        compiler.emit(Opcode::Add, &[]);
        assert_eq!(compiler.scope.instructions.len(), 2);
        assert!(compiler.last_instruction_is(Opcode::Add));
        assert!(matches!(
            compiler.scope.previous_instruction,
            Some(EmittedInstruction { opcode: Opcode::Mul, .. })
        ));
    }

    #[test]
    fn test_resume_from_state() {
        let mut first = Compiler::new();
        first.compile(&parse_source("let a = 1;").unwrap()).unwrap();
        let (symbols, constants) = first.into_state();

        let mut second = Compiler::new_with_state(symbols, constants);
        second.compile(&parse_source("a + 2").unwrap()).unwrap();
        let bytecode = second.bytecode();

        assert_eq!(
            bytecode.instructions,
            Instructions::concat(vec![
                make(Opcode::GetGlobal, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Add, &[]),
                make(Opcode::Pop, &[]),
            ])
        );
        assert_constants(&bytecode.constants, &[Int(1), Int(2)]);
    }

    // =========================================================================
    // Errors
    // =========================================================================

    #[test]
    fn test_undefined_variable() {
        let err = compile("x + 1").unwrap_err();
        assert_eq!(err, CompileError::UndefinedVariable("x".to_string()));

        let err = compile("fn() { y }").unwrap_err();
        assert_eq!(err.to_string(), "undefined variable: y");
    }

    #[test]
    fn test_unknown_operator() {
        let program = Program {
            statements: vec![Statement::Expression(Expression::infix(
                Expression::Integer(1),
                "%",
                Expression::Integer(2),
            ))],
        };

        let mut compiler = Compiler::new();
        let err = compiler.compile(&program).unwrap_err();
        assert_eq!(err.to_string(), "unknown operator: %");
    }

    #[test]
    fn test_constant_pool_limit() {
        let mut compiler = Compiler::new_with_state(SymbolTable::new(), vec![Object::Null; 65536]);
        let err = compiler.compile(&parse_source("1").unwrap()).unwrap_err();
        assert_eq!(err, CompileError::out_of_range("constants", 65536, 65535));
    }

    #[test]
    fn test_argument_count_limit() {
        let arguments = vec!["true"; 256].join(", ");
        let source = format!("let f = fn() {{ 1 }}; f({});", arguments);

        let err = compile(&source).unwrap_err();
        assert_eq!(err, CompileError::out_of_range("arguments", 256, 255));
    }
}
