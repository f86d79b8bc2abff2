use std::fmt;
use std::ops::{Deref, DerefMut};

use crate::bytecode::disasm;
use crate::lang::value::Object;

/// A flat, encoded instruction stream.
///
/// Thin wrapper over the raw bytes so the stream can print itself as
/// disassembly. Derefs to `Vec<u8>` for everything else.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Instructions(pub Vec<u8>);

impl Instructions {
    /// Joins separately encoded instructions into one stream.
    pub fn concat<I>(parts: I) -> Self
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        Self(parts.into_iter().flatten().collect())
    }
}

impl Deref for Instructions {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Instructions {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Vec<u8>> for Instructions {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Instructions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        disasm::write_disassembly(f, &self.0)
    }
}

/// A compiled unit: the main instruction stream plus its constant pool.
///
/// Function bodies live in the pool as `Object::CompiledFunction`.
#[derive(Debug, Clone, Default)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Object>,
}
