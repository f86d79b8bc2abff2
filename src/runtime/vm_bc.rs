use std::mem;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::bytecode::Bytecode;
use crate::bytecode::op::Opcode;
use crate::lang::builtins::{BUILTINS, Builtin};
use crate::lang::value::{Closure, CompiledFunction, HashKey, Object};
use crate::runtime::frame::Frame;
use crate::runtime::runtime_error::RuntimeError;

#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Operand stack slots.
    pub stack_size: usize,
    /// Maximum call depth, the main program included.
    pub max_frames: usize,
    /// Global variable slots.
    pub globals_size: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            stack_size: 2048,
            max_frames: 1024,
            globals_size: 65536,
        }
    }
}

pub struct Vm {
    constants: Vec<Object>,

    /// Fixed-size operand stack. `sp` is the next free slot; slots at and
    /// above `sp` keep whatever was last popped from them.
    stack: Vec<Object>,
    sp: usize,

    globals: Vec<Object>,

    /// Frame being executed.
    frame: Frame,
    /// Suspended callers, outermost first.
    callers: Vec<Frame>,

    config: VmConfig,
}

impl Vm {
    pub fn new(bytecode: Bytecode) -> Self {
        Self::with_config(bytecode, VmConfig::default())
    }

    pub fn with_config(bytecode: Bytecode, config: VmConfig) -> Self {
        let globals = vec![Object::Null; config.globals_size];
        Self::with_globals(bytecode, globals, config)
    }

    /// Runs against a globals store carried over from an earlier run.
    pub fn with_globals(bytecode: Bytecode, mut globals: Vec<Object>, config: VmConfig) -> Self {
        if globals.len() < config.globals_size {
            globals.resize(config.globals_size, Object::Null);
        }

        let main_fn = CompiledFunction {
            instructions: bytecode.instructions,
            ..Default::default()
        };
        let main_closure = Rc::new(Closure::new(Rc::new(main_fn), Vec::new()));

        Self {
            constants: bytecode.constants,
            stack: vec![Object::Null; config.stack_size],
            sp: 0,
            globals,
            frame: Frame::new(main_closure, 0),
            callers: Vec::new(),
            config,
        }
    }

    /// The value most recently popped off the stack. After a successful run
    /// this is the value of the program's last expression statement.
    pub fn last_popped(&self) -> Object {
        self.stack.get(self.sp).cloned().unwrap_or(Object::Null)
    }

    pub fn stack_top(&self) -> Option<&Object> {
        self.sp.checked_sub(1).map(|top| &self.stack[top])
    }

    pub fn globals(&self) -> &[Object] {
        &self.globals
    }

    pub fn into_globals(self) -> Vec<Object> {
        self.globals
    }

    // =========================================================================
    // Execution
    // =========================================================================

    pub fn run(&mut self) -> Result<(), RuntimeError> {
        debug!(
            instructions = self.frame.instructions().len(),
            constants = self.constants.len(),
            "vm run"
        );

        while self.frame.has_next() {
            let opcode = Opcode::try_from(self.frame.fetch())?;

            match opcode {
                Opcode::Constant => {
                    let index = self.frame.read_u16_operand()?;
                    let constant = self
                        .constants
                        .get(index)
                        .cloned()
                        .ok_or(RuntimeError::ConstantOutOfRange(index))?;
                    self.push(constant)?;
                }

                Opcode::Pop => {
                    self.pop()?;
                }

                Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => {
                    self.execute_binary_operation(opcode)?;
                }

                Opcode::True => self.push(Object::Boolean(true))?,
                Opcode::False => self.push(Object::Boolean(false))?,
                Opcode::Null => self.push(Object::Null)?,

                Opcode::Equal | Opcode::NotEqual | Opcode::GreaterThan => {
                    self.execute_comparison(opcode)?;
                }

                Opcode::Bang => {
                    let operand = self.pop()?;
                    self.push(Object::Boolean(!operand.is_truthy()))?;
                }

                Opcode::Minus => match self.pop()? {
                    Object::Integer(value) => self.push(Object::Integer(value.wrapping_neg()))?,
                    other => return Err(RuntimeError::UnsupportedNegation(other.type_name())),
                },

                // Control flow
                Opcode::Jump => {
                    let target = self.frame.read_u16_operand()?;
                    self.frame.jump_to(target);
                }

                Opcode::JumpNotTruthy => {
                    let target = self.frame.read_u16_operand()?;
                    let condition = self.pop()?;
                    if !condition.is_truthy() {
                        self.frame.jump_to(target);
                    }
                }

                // Bindings
                Opcode::SetGlobal => {
                    let index = self.frame.read_u16_operand()?;
                    let value = self.pop()?;
                    let size = self.globals.len();
                    let slot = self
                        .globals
                        .get_mut(index)
                        .ok_or(RuntimeError::GlobalOutOfRange { index, size })?;
                    *slot = value;
                }

                Opcode::GetGlobal => {
                    let index = self.frame.read_u16_operand()?;
                    let value = self.globals.get(index).cloned().ok_or(
                        RuntimeError::GlobalOutOfRange {
                            index,
                            size: self.globals.len(),
                        },
                    )?;
                    self.push(value)?;
                }

                Opcode::SetLocal => {
                    let index = self.frame.read_u8_operand()?;
                    let value = self.pop()?;
                    let slot = self.frame.base_pointer + index;
                    self.stack[slot] = value;
                }

                Opcode::GetLocal => {
                    let index = self.frame.read_u8_operand()?;
                    let value = self.stack[self.frame.base_pointer + index].clone();
                    self.push(value)?;
                }

                Opcode::GetBuiltin => {
                    let index = self.frame.read_u8_operand()?;
                    let builtin = BUILTINS
                        .get(index)
                        .ok_or(RuntimeError::BuiltinOutOfRange(index))?;
                    self.push(Object::Builtin(builtin))?;
                }

                Opcode::GetFree => {
                    let index = self.frame.read_u8_operand()?;
                    let value = self
                        .frame
                        .closure
                        .free
                        .get(index)
                        .cloned()
                        .ok_or(RuntimeError::FreeOutOfRange(index))?;
                    self.push(value)?;
                }

                Opcode::CurrentClosure => {
                    let closure = Rc::clone(&self.frame.closure);
                    self.push(Object::Closure(closure))?;
                }

                // Aggregates
                Opcode::Array => {
                    let count = self.frame.read_u16_operand()?;
                    let start = self.take_slots(count)?;
                    let elements = self.stack[start..start + count].to_vec();
                    self.push(Object::array(elements))?;
                }

                Opcode::Hash => {
                    let count = self.frame.read_u16_operand()?;
                    let start = self.take_slots(count)?;
                    let hash = self.build_hash(start, start + count)?;
                    self.push(hash)?;
                }

                Opcode::Index => {
                    let index = self.pop()?;
                    let left = self.pop()?;
                    let value = execute_index(&left, &index)?;
                    self.push(value)?;
                }

                // Calls
                Opcode::Call => {
                    let argc = self.frame.read_u8_operand()?;
                    self.execute_call(argc)?;
                }

                Opcode::ReturnValue => {
                    let value = self.pop()?;
                    if self.return_from_frame(value)? {
                        break;
                    }
                }

                Opcode::Return => {
                    if self.return_from_frame(Object::Null)? {
                        break;
                    }
                }

                Opcode::Closure => {
                    let index = self.frame.read_u16_operand()?;
                    let num_free = self.frame.read_u8_operand()?;
                    self.push_closure(index, num_free)?;
                }
            }
        }

        debug!(sp = self.sp, "vm finished");
        Ok(())
    }

    // =========================================================================
    // Operations
    // =========================================================================

    fn execute_binary_operation(&mut self, opcode: Opcode) -> Result<(), RuntimeError> {
        let right = self.pop()?;
        let left = self.pop()?;

        let result = match (&left, &right) {
            (Object::Integer(l), Object::Integer(r)) => {
                Object::Integer(execute_integer_operation(opcode, *l, *r)?)
            }
            (Object::String(l), Object::String(r)) => {
                if opcode != Opcode::Add {
                    return Err(RuntimeError::UnknownStringOperator(opcode.definition().name));
                }
                let mut joined = String::with_capacity(l.len() + r.len());
                joined.push_str(l);
                joined.push_str(r);
                Object::string(joined)
            }
            _ => {
                return Err(RuntimeError::UnsupportedBinaryTypes {
                    left: left.type_name(),
                    right: right.type_name(),
                });
            }
        };

        self.push(result)
    }

    fn execute_comparison(&mut self, opcode: Opcode) -> Result<(), RuntimeError> {
        let right = self.pop()?;
        let left = self.pop()?;

        let result = match (opcode, &left, &right) {
            (Opcode::GreaterThan, Object::Integer(l), Object::Integer(r)) => l > r,
            (Opcode::GreaterThan, _, _) => {
                return Err(RuntimeError::UnknownOperator {
                    operator: opcode.definition().name,
                    left: left.type_name(),
                    right: right.type_name(),
                });
            }
            (Opcode::NotEqual, _, _) => !left.same_value(&right),
            _ => left.same_value(&right),
        };

        self.push(Object::Boolean(result))
    }

    fn build_hash(&self, start: usize, end: usize) -> Result<Object, RuntimeError> {
        let mut pairs = IndexMap::with_capacity((end - start) / 2);

        for pair in self.stack[start..end].chunks_exact(2) {
            let key = HashKey::from_object(&pair[0])
                .ok_or(RuntimeError::UnusableHashKey(pair[0].type_name()))?;
            pairs.insert(key, pair[1].clone());
        }

        Ok(Object::Hash(Rc::new(pairs)))
    }

    fn push_closure(&mut self, index: usize, num_free: usize) -> Result<(), RuntimeError> {
        let func = match self.constants.get(index) {
            Some(Object::CompiledFunction(func)) => Rc::clone(func),
            Some(other) => return Err(RuntimeError::NotAFunction(other.type_name())),
            None => return Err(RuntimeError::ConstantOutOfRange(index)),
        };

        let start = self.take_slots(num_free)?;
        let free = self.stack[start..start + num_free].to_vec();

        self.push(Object::Closure(Rc::new(Closure::new(func, free))))
    }

    fn execute_call(&mut self, argc: usize) -> Result<(), RuntimeError> {
        let callee_slot = self
            .sp
            .checked_sub(argc + 1)
            .ok_or(RuntimeError::StackUnderflow)?;

        match &self.stack[callee_slot] {
            Object::Closure(closure) => {
                let closure = Rc::clone(closure);
                self.call_closure(closure, argc, callee_slot)
            }
            Object::Builtin(builtin) => {
                let builtin: &'static Builtin = *builtin;
                self.call_builtin(builtin, argc, callee_slot)
            }
            _ => Err(RuntimeError::NotCallable),
        }
    }

    fn call_closure(
        &mut self,
        closure: Rc<Closure>,
        argc: usize,
        callee_slot: usize,
    ) -> Result<(), RuntimeError> {
        let want = closure.func.num_parameters;
        if argc != want {
            self.sp = callee_slot;
            return Err(RuntimeError::WrongArgumentCount { want, got: argc });
        }

        if self.callers.len() + 1 >= self.config.max_frames {
            return Err(RuntimeError::FrameOverflow);
        }

        let base_pointer = self.sp - argc;
        let new_sp = base_pointer + closure.func.num_locals;
        if new_sp > self.stack.len() {
            return Err(RuntimeError::StackOverflow);
        }

        let caller = mem::replace(&mut self.frame, Frame::new(closure, base_pointer));
        self.callers.push(caller);
        self.sp = new_sp;

        trace!(depth = self.callers.len(), base_pointer, "push frame");
        Ok(())
    }

    fn call_builtin(
        &mut self,
        builtin: &'static Builtin,
        argc: usize,
        callee_slot: usize,
    ) -> Result<(), RuntimeError> {
        let result = (builtin.func)(&self.stack[self.sp - argc..self.sp]);
        self.sp = callee_slot;

        trace!(builtin = builtin.name, argc, "call builtin");
        self.push(result.unwrap_or(Object::Null))
    }

    /// Pops the current frame and hands `value` to the caller. Returns `true`
    /// when the outermost frame returned, which ends the run with `value` as
    /// the last popped value.
    fn return_from_frame(&mut self, value: Object) -> Result<bool, RuntimeError> {
        match self.callers.pop() {
            Some(caller) => {
                let finished = mem::replace(&mut self.frame, caller);
                self.sp = finished.base_pointer - 1;

                trace!(depth = self.callers.len(), "pop frame");
                self.push(value)?;
                Ok(false)
            }
            None => {
                self.sp = 0;
                if let Some(slot) = self.stack.first_mut() {
                    *slot = value;
                }
                Ok(true)
            }
        }
    }

    // =========================================================================
    // Stack
    // =========================================================================

    fn push(&mut self, value: Object) -> Result<(), RuntimeError> {
        if self.sp >= self.stack.len() {
            return Err(RuntimeError::StackOverflow);
        }

        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> Result<Object, RuntimeError> {
        if self.sp == 0 {
            return Err(RuntimeError::StackUnderflow);
        }

        self.sp -= 1;
        Ok(self.stack[self.sp].clone())
    }

    /// Releases the top `count` slots and returns the index of the lowest.
    /// The values stay readable until the next push.
    fn take_slots(&mut self, count: usize) -> Result<usize, RuntimeError> {
        let start = self
            .sp
            .checked_sub(count)
            .ok_or(RuntimeError::StackUnderflow)?;
        self.sp = start;
        Ok(start)
    }
}

fn execute_integer_operation(opcode: Opcode, left: i64, right: i64) -> Result<i64, RuntimeError> {
    match opcode {
        Opcode::Add => Ok(left.wrapping_add(right)),
        Opcode::Sub => Ok(left.wrapping_sub(right)),
        Opcode::Mul => Ok(left.wrapping_mul(right)),
        _ if right == 0 => Err(RuntimeError::DivisionByZero),
        _ => Ok(left.wrapping_div(right)),
    }
}

fn execute_index(left: &Object, index: &Object) -> Result<Object, RuntimeError> {
    match (left, index) {
        (Object::Array(elements), Object::Integer(i)) => Ok(usize::try_from(*i)
            .ok()
            .and_then(|i| elements.get(i))
            .cloned()
            .unwrap_or(Object::Null)),
        (Object::Hash(pairs), _) => {
            let key = HashKey::from_object(index)
                .ok_or(RuntimeError::UnusableHashKey(index.type_name()))?;
            Ok(pairs.get(&key).cloned().unwrap_or(Object::Null))
        }
        _ => Err(RuntimeError::IndexNotSupported(left.type_name())),
    }
}
