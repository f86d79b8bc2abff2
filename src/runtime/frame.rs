use std::rc::Rc;

use crate::bytecode::Instructions;
use crate::bytecode::op::{read_u8, read_u16};
use crate::lang::value::Closure;
use crate::runtime::runtime_error::RuntimeError;

/// Activation record of one call.
#[derive(Debug, Clone)]
pub struct Frame {
    pub closure: Rc<Closure>,

    /// Offset of the instruction being executed. Starts at -1 and is
    /// advanced before every fetch.
    pub ip: isize,

    /// Stack slot of the first argument. The callee sits one slot below.
    pub base_pointer: usize,
}

impl Frame {
    pub fn new(closure: Rc<Closure>, base_pointer: usize) -> Self {
        Frame {
            closure,
            ip: -1,
            base_pointer,
        }
    }

    pub fn instructions(&self) -> &Instructions {
        &self.closure.func.instructions
    }

    /// Whether another instruction follows the current one.
    pub fn has_next(&self) -> bool {
        self.ip + 1 < self.instructions().len() as isize
    }

    /// Advances to the next instruction and returns its opcode byte.
    pub fn fetch(&mut self) -> u8 {
        self.ip += 1;
        self.instructions()[self.ip as usize]
    }

    fn operand_bytes(&self, width: usize) -> Result<&[u8], RuntimeError> {
        let start = (self.ip + 1) as usize;
        self.instructions()
            .get(start..start + width)
            .ok_or(RuntimeError::TruncatedInstruction(self.ip as usize))
    }

    /// Reads a two-byte operand and steps past it.
    pub fn read_u16_operand(&mut self) -> Result<usize, RuntimeError> {
        let operand = read_u16(self.operand_bytes(2)?) as usize;
        self.ip += 2;
        Ok(operand)
    }

    /// Reads a one-byte operand and steps past it.
    pub fn read_u8_operand(&mut self) -> Result<usize, RuntimeError> {
        let operand = read_u8(self.operand_bytes(1)?) as usize;
        self.ip += 1;
        Ok(operand)
    }

    /// Moves execution so that the next fetch reads `target`.
    pub fn jump_to(&mut self, target: usize) {
        self.ip = target as isize - 1;
    }
}
