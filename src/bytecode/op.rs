use strum_macros::FromRepr;
use thiserror::Error;

// =============================================================================
// OPCODE - Bytecode instruction tags
// =============================================================================

/// Single-byte instruction tag.
///
/// The discriminant is the byte written into the instruction stream, so the
/// order of the variants is part of the encoding.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr)]
pub enum Opcode {
    // literals
    Constant,
    Pop,

    // arithmetic
    Add,
    Sub,
    Mul,
    Div,

    True,
    False,

    // comparison
    Equal,
    NotEqual,
    GreaterThan,

    // prefix
    Minus,
    Bang,

    // ==========================================================================
    // Control flow - absolute byte offsets into the current instruction stream
    // ==========================================================================
    JumpNotTruthy,
    Jump,

    Null,

    GetGlobal,
    SetGlobal,

    // aggregates
    Array,
    Hash,
    Index,

    // ==========================================================================
    // Calls and closures
    // ==========================================================================
    Call,
    ReturnValue,
    Return,

    GetLocal,
    SetLocal,
    GetBuiltin,

    /// `Closure(constant index, free variable count)`
    Closure,
    GetFree,
    CurrentClosure,
}

/// Operand layout of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Definition {
    pub name: &'static str,
    pub operand_widths: &'static [usize],
}

impl Definition {
    /// Total number of operand bytes following the opcode byte.
    pub fn operand_len(&self) -> usize {
        self.operand_widths.iter().sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown opcode: {0}")]
pub struct UnknownOpcode(pub u8);

const NONE: &[usize] = &[];
const U8: &[usize] = &[1];
const U16: &[usize] = &[2];
const U16_U8: &[usize] = &[2, 1];

impl Opcode {
    pub const fn definition(self) -> Definition {
        use Opcode::*;

        let (name, operand_widths) = match self {
            Constant => ("OpConstant", U16),
            Pop => ("OpPop", NONE),
            Add => ("OpAdd", NONE),
            Sub => ("OpSub", NONE),
            Mul => ("OpMul", NONE),
            Div => ("OpDiv", NONE),
            True => ("OpTrue", NONE),
            False => ("OpFalse", NONE),
            Equal => ("OpEqual", NONE),
            NotEqual => ("OpNotEqual", NONE),
            GreaterThan => ("OpGreaterThan", NONE),
            Minus => ("OpMinus", NONE),
            Bang => ("OpBang", NONE),
            JumpNotTruthy => ("OpJumpNotTruthy", U16),
            Jump => ("OpJump", U16),
            Null => ("OpNull", NONE),
            GetGlobal => ("OpGetGlobal", U16),
            SetGlobal => ("OpSetGlobal", U16),
            Array => ("OpArray", U16),
            Hash => ("OpHash", U16),
            Index => ("OpIndex", NONE),
            Call => ("OpCall", U8),
            ReturnValue => ("OpReturnValue", NONE),
            Return => ("OpReturn", NONE),
            GetLocal => ("OpGetLocal", U8),
            SetLocal => ("OpSetLocal", U8),
            GetBuiltin => ("OpGetBuiltin", U8),
            Closure => ("OpClosure", U16_U8),
            GetFree => ("OpGetFree", U8),
            CurrentClosure => ("OpCurrentClosure", NONE),
        };

        Definition {
            name,
            operand_widths,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Opcode {
    type Error = UnknownOpcode;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Opcode::from_repr(byte).ok_or(UnknownOpcode(byte))
    }
}

/// Look up the opcode and operand layout for a raw instruction byte.
pub fn lookup(byte: u8) -> Result<(Opcode, Definition), UnknownOpcode> {
    let op = Opcode::try_from(byte)?;
    Ok((op, op.definition()))
}

// =============================================================================
// Encoding / decoding
// =============================================================================

/// Encode one instruction.
///
/// Operands are written big-endian and truncated to their declared width;
/// callers that care about range (the compiler) check it before calling.
/// Operands beyond the definition's width list are ignored.
pub fn make(op: Opcode, operands: &[usize]) -> Vec<u8> {
    let def = op.definition();

    let mut instruction = Vec::with_capacity(1 + def.operand_len());
    instruction.push(op.as_byte());

    for (operand, width) in operands.iter().zip(def.operand_widths) {
        match *width {
            2 => instruction.extend_from_slice(&(*operand as u16).to_be_bytes()),
            1 => instruction.push(*operand as u8),
            _ => unreachable!("operand width {} is not in the catalog", width),
        }
    }

    instruction
}

/// Decode the operands of one instruction.
///
/// `ins` starts right after the opcode byte. Returns the operands and the
/// number of bytes consumed.
pub fn read_operands(def: &Definition, ins: &[u8]) -> (Vec<usize>, usize) {
    let mut operands = Vec::with_capacity(def.operand_widths.len());
    let mut offset = 0;

    for &width in def.operand_widths {
        let operand = match width {
            2 => read_u16(&ins[offset..]) as usize,
            1 => read_u8(&ins[offset..]) as usize,
            _ => unreachable!("operand width {} is not in the catalog", width),
        };
        operands.push(operand);
        offset += width;
    }

    (operands, offset)
}

pub fn read_u16(ins: &[u8]) -> u16 {
    u16::from_be_bytes([ins[0], ins[1]])
}

pub fn read_u8(ins: &[u8]) -> u8 {
    ins[0]
}
