// Copyright 2023 ToyCC contributors

//! Peephole optimization over TCIR and i386 assembly emission.
//!
//! The generator consumes a five-section TCIR dump, rebuilds the symbol
//! tables it needs, optimizes the instruction list and writes NASM-flavored
//! 32-bit assembly. Locals get stack slots below `ebp`; sibling blocks
//! overlap, so a frame is the deepest path through the block tree.

use crate::tcir::ir::{split_sections, IrFormatError, IrInstruction};
use crate::tcir::symtab::{
    BlockId, BlockSymbolTable, FunctionSymbol, GlobalSymbolTable, SymtabError, VarId,
    VariableDescriptionTable,
};
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};

/// Rewrites applied left-to-right with index rewind on every match, repeated
/// until a whole scan changes nothing. The fixpoint makes the pass
/// idempotent even when a deletion exposes a new match behind the cursor.
pub fn optimize_instructions(instructions: &mut Vec<IrInstruction>) {
    while scan_once(instructions) {}
}

fn scan_once(instructions: &mut Vec<IrInstruction>) -> bool {
    let mut changed = false;
    let mut idx = 0;
    while idx < instructions.len() {
        if idx + 1 < instructions.len() {
            let matches_pair = {
                let curr = &instructions[idx];
                let next = &instructions[idx + 1];
                if curr.is_ret() && next.is_ret() {
                    Some(PairRewrite::DropNext)
                } else if curr.is_paired_push_pop_with(next) {
                    Some(PairRewrite::DropBoth)
                } else if curr.is_mov() && curr == next {
                    Some(PairRewrite::DropNext)
                } else if curr.is_mov_to_same_target_with(next) {
                    // the later store wins
                    Some(PairRewrite::DropCurrent)
                } else if curr.is_circular_mov_with(next) {
                    Some(PairRewrite::DropNext)
                } else {
                    None
                }
            };
            match matches_pair {
                Some(PairRewrite::DropNext) => {
                    instructions.remove(idx + 1);
                    changed = true;
                    continue;
                }
                Some(PairRewrite::DropCurrent) => {
                    instructions.remove(idx);
                    changed = true;
                    continue;
                }
                Some(PairRewrite::DropBoth) => {
                    instructions.remove(idx + 1);
                    instructions.remove(idx);
                    idx = idx.saturating_sub(1);
                    changed = true;
                    continue;
                }
                None => (),
            }
        }
        if idx + 2 < instructions.len()
            && instructions[idx].is_push_vreg0()
            && instructions[idx + 1].is_mov_to_vreg0()
            && instructions[idx + 2].is_pop_vreg1()
        {
            // push vreg 0; mov vreg 0, X; pop vreg 1  =>  mov vreg 1, vreg 0; mov vreg 0, X
            instructions[idx] = IrInstruction::parse("mov vreg 1 vreg 0");
            instructions.remove(idx + 2);
            changed = true;
            continue;
        }
        idx += 1;
    }
    changed
}

enum PairRewrite {
    DropNext,
    DropCurrent,
    DropBoth,
}

#[derive(Debug)]
pub enum AsmError {
    Format(IrFormatError),
    Symtab(SymtabError),
    MissingSection(&'static str),
    Io(io::Error),
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AsmError::Format(inner) => write!(f, "bad TCIR layout: {}", inner),
            AsmError::Symtab(inner) => write!(f, "bad symbol table record: {}", inner),
            AsmError::MissingSection(name) => write!(f, "missing section \"{}\"", name),
            AsmError::Io(inner) => write!(f, "{}", inner),
        }
    }
}

impl std::error::Error for AsmError {}

impl From<IrFormatError> for AsmError {
    fn from(inner: IrFormatError) -> Self {
        AsmError::Format(inner)
    }
}

impl From<SymtabError> for AsmError {
    fn from(inner: SymtabError) -> Self {
        AsmError::Symtab(inner)
    }
}

impl From<io::Error> for AsmError {
    fn from(inner: io::Error) -> Self {
        AsmError::Io(inner)
    }
}

/// Stack layout of one function: total frame bytes and the `[ebp - offset]`
/// slot of every local, assigned pre-order so sibling blocks share slots.
#[derive(Debug, Default)]
struct FrameLayout {
    function: String,
    frame_size: usize,
    offsets: BTreeMap<VarId, usize>,
}

#[derive(Debug, Default)]
pub struct Intel386AssemblyGenerator {
    global_table: GlobalSymbolTable,
    desc_table: VariableDescriptionTable,
    blocks: BTreeMap<BlockId, BlockSymbolTable>,
    current_frame: Option<FrameLayout>,
    pending_call_bytes: usize,
}

impl Intel386AssemblyGenerator {
    pub fn new() -> Self {
        Intel386AssemblyGenerator::default()
    }

    pub fn clear(&mut self) {
        self.global_table.clear();
        self.desc_table.clear();
        self.blocks.clear();
        self.current_frame = None;
        self.pending_call_bytes = 0;
    }

    /// Translate a TCIR dump into assembly text. Structural failures abort;
    /// per-instruction problems are reported in the returned list and
    /// emission continues.
    pub fn generate<W: Write>(
        &mut self,
        ir_text: &str,
        out: &mut W,
    ) -> Result<Vec<String>, AsmError> {
        self.clear();
        let sections = split_sections(ir_text)?;
        let section = |name: &'static str| -> Result<&String, AsmError> {
            sections.get(name).ok_or(AsmError::MissingSection(name))
        };

        writeln!(out, "; generated by toycc")?;
        writeln!(out, "; for intel 386 protected mode environment")?;
        writeln!(out)?;
        writeln!(out, "[bits 32]")?;
        writeln!(out, "section .text")?;
        writeln!(out)?;

        let mut errors: Vec<String> = vec![];

        for line in section("extlink")?.lines() {
            let fields: Vec<&str> = line.split_whitespace().collect();
            match fields.as_slice() {
                [] => (),
                ["export", name, _kind] => writeln!(out, "global {}", name)?,
                ["import", name] => writeln!(out, "extern {}", name)?,
                _ => errors.push(format!("bad extlink record: {}", line.trim())),
            }
        }
        writeln!(out)?;

        let (global_table, mut desc_table) = GlobalSymbolTable::build(section("global-symtab")?)?;
        self.blocks = BlockSymbolTable::build(section("block-symtab")?, &mut desc_table)?;
        self.global_table = global_table;
        self.desc_table = desc_table;

        let mut instructions: Vec<IrInstruction> = section("instructions")?
            .lines()
            .map(IrInstruction::parse)
            .filter(|instruction| !instruction.is_empty())
            .collect();
        optimize_instructions(&mut instructions);

        for instruction in instructions.iter() {
            if let Err(message) = self.emit_instruction(instruction, out)? {
                errors.push(message);
            }
        }

        self.emit_static_data(section("static-data")?, out, &mut errors)?;

        Ok(errors)
    }

    fn emit_static_data<W: Write>(
        &mut self,
        body: &str,
        out: &mut W,
        errors: &mut Vec<String>,
    ) -> Result<(), AsmError> {
        let records: Vec<Vec<String>> = body
            .lines()
            .map(|line| line.split_whitespace().map(str::to_string).collect())
            .filter(|fields: &Vec<String>| !fields.is_empty())
            .collect();
        if records.is_empty() {
            return Ok(());
        }
        writeln!(out)?;
        writeln!(out, "section .data")?;
        for fields in records {
            // int var <name> <value_type> <init_value>
            if fields.len() == 5 && fields[0] == "int" && fields[1] == "var" {
                let value: i64 = match fields[4].parse() {
                    Ok(value) => value,
                    Err(_) => {
                        errors.push(format!("bad static-data value: {}", fields[4]));
                        continue;
                    }
                };
                let bytes = (value as u32).to_le_bytes();
                writeln!(out, "align 4")?;
                writeln!(out, "{}:", fields[2])?;
                writeln!(
                    out,
                    "db {}, {}, {}, {}",
                    bytes[0], bytes[1], bytes[2], bytes[3]
                )?;
            } else {
                errors.push(format!("bad static-data record: {}", fields.join(" ")));
            }
        }
        Ok(())
    }

    /// Max path sum of `4 * |symbols|` through the block subtree; offsets
    /// assigned parents-before-children so sibling blocks overlap.
    fn compute_frame(&self, function: &FunctionSymbol) -> FrameLayout {
        let mut layout = FrameLayout {
            function: function.name.clone(),
            frame_size: 0,
            offsets: BTreeMap::new(),
        };
        if function.root_block_id == 0 {
            return layout;
        }
        layout.frame_size = self.walk_block(function.root_block_id, 0, &mut layout.offsets);
        layout
    }

    fn walk_block(
        &self,
        block_id: BlockId,
        base: usize,
        offsets: &mut BTreeMap<VarId, usize>,
    ) -> usize {
        let block = match self.blocks.get(&block_id) {
            Some(block) => block,
            None => return base,
        };
        for (slot, &var_id) in block.symbol_ids().iter().enumerate() {
            offsets.insert(var_id, base + 4 * (slot + 1));
        }
        let local_end = base + 4 * block.symbol_count();
        let mut deepest = local_end;
        for &child_id in block.children.iter() {
            let depth = self.walk_block(child_id, local_end, offsets);
            deepest = deepest.max(depth);
        }
        deepest
    }

    /// Render a two-token operand starting at `index`.
    fn operand(&self, instruction: &IrInstruction, index: usize) -> Result<String, String> {
        let tag = instruction
            .get(index)
            .ok_or_else(|| format!("truncated instruction: {}", instruction))?;
        let value = instruction
            .get(index + 1)
            .ok_or_else(|| format!("truncated instruction: {}", instruction))?;
        match tag {
            "imm" => Ok(value.to_string()),
            "vreg" => match value {
                "0" => Ok("eax".to_string()),
                "1" => Ok("edx".to_string()),
                _ => Err(format!("unknown virtual register: {}", value)),
            },
            "val" => {
                if let Ok(var_id) = value.parse::<VarId>() {
                    let frame = self
                        .current_frame
                        .as_ref()
                        .ok_or_else(|| format!("local {} used outside any function", var_id))?;
                    let offset = frame
                        .offsets
                        .get(&var_id)
                        .ok_or_else(|| format!("no stack slot for local {}", var_id))?;
                    Ok(format!("[ebp - {}]", offset))
                } else {
                    Ok(format!("[{}]", value))
                }
            }
            "fval" => {
                let frame = self
                    .current_frame
                    .as_ref()
                    .ok_or_else(|| format!("parameter {} used outside any function", value))?;
                let function = self
                    .global_table
                    .get_function(&frame.function)
                    .ok_or_else(|| format!("unknown function {}", frame.function))?;
                let index = function
                    .find_param_index(value)
                    .ok_or_else(|| format!("unknown parameter {}", value))?;
                Ok(format!("[ebp + {}]", 8 + 4 * index))
            }
            _ => Err(format!("unknown operand form: {}", tag)),
        }
    }

    fn open_function<W: Write>(&mut self, name: &str, out: &mut W) -> io::Result<()> {
        let function = self
            .global_table
            .get_function(name)
            .expect("caller checked the function exists");
        let layout = self.compute_frame(function);
        writeln!(out)?;
        writeln!(out, "{}:", name)?;
        writeln!(out, "push ebp")?;
        writeln!(out, "mov ebp, esp")?;
        if layout.frame_size > 0 {
            writeln!(out, "sub esp, {}", layout.frame_size)?;
        }
        self.current_frame = Some(layout);
        self.pending_call_bytes = 0;
        Ok(())
    }

    /// Emit one instruction. `Ok(Err(message))` flags a diagnostic while the
    /// overall run continues.
    fn emit_instruction<W: Write>(
        &mut self,
        instruction: &IrInstruction,
        out: &mut W,
    ) -> Result<Result<(), String>, AsmError> {
        macro_rules! try_operand {
            ($index:expr) => {
                match self.operand(instruction, $index) {
                    Ok(operand) => operand,
                    Err(message) => return Ok(Err(message)),
                }
            };
        }

        let opcode = match instruction.opcode() {
            Some(opcode) => opcode,
            None => return Ok(Ok(())),
        };
        match opcode {
            "label" | "fun-label" => {
                let name = match instruction.get(1) {
                    Some(name) => name.to_string(),
                    None => return Ok(Err("label without a name".to_string())),
                };
                if self.global_table.get_function(&name).is_some() {
                    self.open_function(&name, out)?;
                } else {
                    writeln!(out, "{}:", name)?;
                }
            }
            "ret" => {
                writeln!(out, "leave")?;
                writeln!(out, "ret")?;
                writeln!(out)?;
            }
            "call" => {
                let name = match instruction.get(1) {
                    Some(name) => name,
                    None => return Ok(Err("call without a target".to_string())),
                };
                writeln!(out, "call {}", name)?;
                if self.pending_call_bytes > 0 {
                    // cdecl: the caller reclaims the argument bytes
                    writeln!(out, "add esp, {}", self.pending_call_bytes)?;
                    self.pending_call_bytes = 0;
                }
            }
            "pushfc" => {
                let operand = try_operand!(2);
                self.emit_push(&operand, out)?;
                self.pending_call_bytes += 4;
            }
            "push" => {
                let operand = try_operand!(2);
                self.emit_push(&operand, out)?;
            }
            "pop" => {
                let operand = try_operand!(2);
                if operand.starts_with('[') {
                    writeln!(out, "pop dword {}", operand)?;
                } else {
                    writeln!(out, "pop {}", operand)?;
                }
            }
            "mov" => {
                let dst = try_operand!(1);
                let src = try_operand!(3);
                writeln!(out, "mov dword {}, {}", dst, src)?;
            }
            "xchg" => {
                let a = try_operand!(1);
                let b = try_operand!(3);
                writeln!(out, "xchg {}, {}", a, b)?;
            }
            "add" | "sub" => {
                let dst = try_operand!(1);
                let src = try_operand!(3);
                let size = if dst.starts_with('[') { "dword " } else { "" };
                writeln!(out, "{} {}{}, {}", opcode, size, dst, src)?;
            }
            "cmp" => {
                let a = try_operand!(1);
                let b = try_operand!(3);
                let condition = match instruction.get(5) {
                    Some(condition) => condition,
                    None => return Ok(Err(format!("cmp without a condition: {}", instruction))),
                };
                let setcc = match condition {
                    "eq" => "sete",
                    "ne" => "setne",
                    "l" => "setl",
                    "g" => "setg",
                    "le" => "setle",
                    "ge" => "setge",
                    other => return Ok(Err(format!("unknown cmp condition: {}", other))),
                };
                writeln!(out, "cmp {}, {}", a, b)?;
                writeln!(out, "{} al", setcc)?;
                writeln!(out, "movzx eax, al")?;
            }
            "jmp" => {
                let target = match instruction.get(1) {
                    Some(target) => target,
                    None => return Ok(Err("jmp without a target".to_string())),
                };
                writeln!(out, "jmp {}", target)?;
            }
            "je" | "jne" | "jg" | "jl" | "jge" | "jle" => {
                let target = match instruction.get(1) {
                    Some(target) => target,
                    None => return Ok(Err(format!("{} without a target", opcode))),
                };
                // conditional jumps test the accumulator
                writeln!(out, "cmp eax, 0")?;
                writeln!(out, "{} {}", opcode, target)?;
            }
            other => return Ok(Err(format!("unknown instruction: {}", other))),
        }
        Ok(Ok(()))
    }

    fn emit_push<W: Write>(&self, operand: &str, out: &mut W) -> io::Result<()> {
        if operand.starts_with('[') {
            writeln!(out, "push dword {}", operand)
        } else {
            writeln!(out, "push {}", operand)
        }
    }
}
