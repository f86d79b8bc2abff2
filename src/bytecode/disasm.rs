use std::fmt;

use rustc_hash::FxHashMap;

use crate::bytecode::op::{self, Definition, Opcode};
use crate::bytecode::Bytecode;
use crate::lang::value::Object;

/// One decoded position in an instruction stream.
enum Decoded {
    Instruction {
        offset: usize,
        op: Opcode,
        def: Definition,
        operands: Vec<usize>,
    },
    /// Byte with no catalog entry. Decoding resumes at the next byte.
    Unknown { offset: usize, byte: u8 },
    /// Opcode whose operands run past the end of the stream.
    Truncated { offset: usize, def: Definition },
}

fn decode(ins: &[u8]) -> Vec<Decoded> {
    let mut decoded = Vec::new();
    let mut i = 0;

    while i < ins.len() {
        match op::lookup(ins[i]) {
            Err(_) => {
                decoded.push(Decoded::Unknown {
                    offset: i,
                    byte: ins[i],
                });
                i += 1;
            }
            Ok((_, def)) if i + 1 + def.operand_len() > ins.len() => {
                decoded.push(Decoded::Truncated { offset: i, def });
                break;
            }
            Ok((op, def)) => {
                let (operands, read) = op::read_operands(&def, &ins[i + 1..]);
                decoded.push(Decoded::Instruction {
                    offset: i,
                    op,
                    def,
                    operands,
                });
                i += 1 + read;
            }
        }
    }

    decoded
}

/// Renders `NAME OPERANDS` for one instruction.
pub fn fmt_instruction(def: &Definition, operands: &[usize]) -> String {
    let expected = def.operand_widths.len();
    if operands.len() != expected {
        return format!(
            "ERROR: operand len {} does not match defined {}",
            operands.len(),
            expected
        );
    }

    match operands {
        [] => def.name.to_string(),
        [a] => format!("{} {}", def.name, a),
        [a, b] => format!("{} {} {}", def.name, a, b),
        _ => format!("ERROR: unhandled operand count for {}", def.name),
    }
}

/// Canonical disassembly: one `OFFSET NAME OPERANDS` line per instruction.
///
/// Unknown bytes produce an `ERROR:` line and are skipped, so a corrupt
/// stream still renders everything around the bad byte.
pub fn write_disassembly<W: fmt::Write>(out: &mut W, ins: &[u8]) -> fmt::Result {
    for item in decode(ins) {
        match item {
            Decoded::Instruction {
                offset,
                def,
                operands,
                ..
            } => writeln!(out, "{:04} {}", offset, fmt_instruction(&def, &operands))?,
            Decoded::Unknown { byte, .. } => writeln!(out, "ERROR: unknown opcode {}", byte)?,
            Decoded::Truncated { offset, def } => {
                writeln!(out, "{:04} ERROR: truncated operands for {}", offset, def.name)?
            }
        }
    }
    Ok(())
}

pub fn disassemble(ins: &[u8]) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = write_disassembly(&mut out, ins);
    out
}

// =============================================================================
// Annotated listing (CLI `--dump-bytecode`)
// =============================================================================

fn collect_jump_targets(ins: &[u8]) -> Vec<usize> {
    let mut targets = Vec::new();

    for item in decode(ins) {
        if let Decoded::Instruction {
            op: Opcode::Jump | Opcode::JumpNotTruthy,
            operands,
            ..
        } = item
        {
            if !targets.contains(&operands[0]) {
                targets.push(operands[0]);
            }
        }
    }

    targets
}

/// Short inline description of a pool constant.
fn describe_constant(constant: &Object) -> String {
    match constant {
        Object::String(s) => format!("{:?}", s),
        Object::CompiledFunction(func) => format!(
            "<fn params={} locals={} len={}>",
            func.num_parameters,
            func.num_locals,
            func.instructions.len()
        ),
        other => other.to_string(),
    }
}

fn write_code_object(
    f: &mut fmt::Formatter<'_>,
    name: &str,
    ins: &[u8],
    constants: &[Object],
) -> fmt::Result {
    let jump_targets = collect_jump_targets(ins);

    writeln!(f, "════════════════════════════════════════")?;
    writeln!(f, " {}", name)?;
    writeln!(f, " {} bytes", ins.len())?;
    writeln!(f, "════════════════════════════════════════")?;

    for item in decode(ins) {
        let offset = match &item {
            Decoded::Instruction { offset, .. }
            | Decoded::Unknown { offset, .. }
            | Decoded::Truncated { offset, .. } => *offset,
        };

        if jump_targets.contains(&offset) {
            writeln!(f, "      ┌──────────────────────────────────")?;
            write!(f, "{:04} ► ", offset)?;
        } else {
            write!(f, "{:04}   ", offset)?;
        }

        match item {
            Decoded::Instruction {
                op, def, operands, ..
            } => {
                write!(f, "{}", fmt_instruction(&def, &operands))?;
                match op {
                    Opcode::Constant | Opcode::Closure => {
                        if let Some(constant) = constants.get(operands[0]) {
                            write!(f, "    ; {}", describe_constant(constant))?;
                        }
                    }
                    Opcode::Jump | Opcode::JumpNotTruthy => {
                        let direction = if operands[0] <= offset { "↑" } else { "↓" };
                        write!(f, " {} (→ {:04})", direction, operands[0])?;
                    }
                    _ => {}
                }
            }
            Decoded::Unknown { byte, .. } => write!(f, "ERROR: unknown opcode {}", byte)?,
            Decoded::Truncated { def, .. } => write!(f, "ERROR: truncated operands for {}", def.name)?,
        }
        writeln!(f)?;
    }
    writeln!(f)
}

/// Full annotated listing: main stream, every function in the pool, then the
/// pool itself.
pub struct BytecodeListing<'a>(pub &'a Bytecode);

impl fmt::Display for BytecodeListing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bc = self.0;
        writeln!(f, "=== BYTECODE PROGRAM ===")?;
        writeln!(f)?;

        write_code_object(f, "main", &bc.instructions, &bc.constants)?;

        for (index, constant) in bc.constants.iter().enumerate() {
            if let Object::CompiledFunction(func) = constant {
                let name = format!(
                    "constant[{}] (params={}, locals={})",
                    index, func.num_parameters, func.num_locals
                );
                write_code_object(f, &name, &func.instructions, &bc.constants)?;
            }
        }

        writeln!(f, "=== CONSTANTS ({}) ===", bc.constants.len())?;
        for (index, constant) in bc.constants.iter().enumerate() {
            writeln!(f, "  [{}] {:<18} {}", index, constant.type_name(), describe_constant(constant))?;
        }
        Ok(())
    }
}

pub fn render_bytecode(bc: &Bytecode) -> String {
    BytecodeListing(bc).to_string()
}

pub fn print_bytecode(bc: &Bytecode) {
    print!("{}", BytecodeListing(bc));
}

// =============================================================================
// Statistics
// =============================================================================

fn count_ops(ins: &[u8], counts: &mut FxHashMap<&'static str, usize>) -> usize {
    let mut total = 0;
    for item in decode(ins) {
        if let Decoded::Instruction { def, .. } = item {
            *counts.entry(def.name).or_insert(0) += 1;
            total += 1;
        }
    }
    total
}

/// Instruction counts and the ten most frequent opcodes.
pub struct BytecodeStats<'a>(pub &'a Bytecode);

impl fmt::Display for BytecodeStats<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bc = self.0;

        let mut counts = FxHashMap::default();
        let main_ops = count_ops(&bc.instructions, &mut counts);

        let mut function_count = 0;
        let mut function_ops = 0;
        for constant in &bc.constants {
            if let Object::CompiledFunction(func) = constant {
                function_count += 1;
                function_ops += count_ops(&func.instructions, &mut counts);
            }
        }
        let total_ops = main_ops + function_ops;

        writeln!(f, "=== BYTECODE STATISTICS ===")?;
        writeln!(f)?;
        writeln!(f, "Constants:        {}", bc.constants.len())?;
        writeln!(f, "Functions:        {}", function_count)?;
        writeln!(f)?;
        writeln!(f, "Instructions:")?;
        writeln!(f, "  main:           {}", main_ops)?;
        writeln!(f, "  functions:      {}", function_ops)?;
        writeln!(f, "  total:          {}", total_ops)?;
        writeln!(f)?;

        writeln!(f, "Op frequency:")?;
        let mut sorted: Vec<_> = counts.into_iter().collect();
        sorted.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

        for (name, count) in sorted.iter().take(10) {
            let pct = (*count as f64 / total_ops as f64) * 100.0;
            writeln!(f, "  {:<18} {:>4} ({:>5.1}%)", name, count, pct)?;
        }
        Ok(())
    }
}

pub fn render_bytecode_stats(bc: &Bytecode) -> String {
    BytecodeStats(bc).to_string()
}

pub fn print_bytecode_stats(bc: &Bytecode) {
    print!("{}", BytecodeStats(bc));
}
