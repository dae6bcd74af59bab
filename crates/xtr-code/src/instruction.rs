//! Instructions and programs.

use std::ops::Index;

use crate::opcode::{AluOp, Cond, Opcode};
use crate::operand::{Imm, Label, Mem, Operand};
use crate::reg::{Gp, Width};

/// One opcode plus its operands, destination first.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Instruction {
    opcode: Opcode,
    operands: Vec<Operand>,
}

impl Instruction {
    pub const fn new(opcode: Opcode, operands: Vec<Operand>) -> Self {
        Self { opcode, operands }
    }

    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        self.opcode
    }

    #[must_use]
    pub fn operands(&self) -> &[Operand] {
        &self.operands
    }

    #[must_use]
    pub fn operand(&self, i: usize) -> Option<&Operand> {
        self.operands.get(i)
    }

    /// Whether this is a label definition.
    #[must_use]
    pub const fn is_label(&self) -> bool {
        matches!(self.opcode, Opcode::Label)
    }

    // ------------------------------------------------------------------
    // Builders
    // ------------------------------------------------------------------

    pub fn mov(width: Width, dst: impl Into<Operand>, src: impl Into<Operand>) -> Self {
        Self::new(Opcode::Mov(width), vec![dst.into(), src.into()])
    }

    #[must_use]
    pub fn movabs(dst: Gp, value: u64) -> Self {
        Self::new(
            Opcode::Movabs,
            vec![Operand::Reg(dst), Operand::Imm(Imm(value as i64))],
        )
    }

    #[must_use]
    pub fn lea(dst: Gp, src: Mem) -> Self {
        Self::new(Opcode::Lea, vec![Operand::Reg(dst), Operand::Mem(src)])
    }

    pub fn alu(op: AluOp, width: Width, dst: impl Into<Operand>, src: impl Into<Operand>) -> Self {
        Self::new(Opcode::Alu(op, width), vec![dst.into(), src.into()])
    }

    pub fn add(width: Width, dst: impl Into<Operand>, src: impl Into<Operand>) -> Self {
        Self::alu(AluOp::Add, width, dst, src)
    }

    pub fn sub(width: Width, dst: impl Into<Operand>, src: impl Into<Operand>) -> Self {
        Self::alu(AluOp::Sub, width, dst, src)
    }

    pub fn test(width: Width, dst: impl Into<Operand>, src: impl Into<Operand>) -> Self {
        Self::new(Opcode::Test(width), vec![dst.into(), src.into()])
    }

    pub fn imul(width: Width, dst: Gp, src: impl Into<Operand>) -> Self {
        Self::new(Opcode::Imul(width), vec![Operand::Reg(dst), src.into()])
    }

    pub fn inc(width: Width, dst: impl Into<Operand>) -> Self {
        Self::new(Opcode::Inc(width), vec![dst.into()])
    }

    pub fn dec(width: Width, dst: impl Into<Operand>) -> Self {
        Self::new(Opcode::Dec(width), vec![dst.into()])
    }

    #[must_use]
    pub fn push(src: Gp) -> Self {
        Self::new(Opcode::Push, vec![Operand::Reg(src)])
    }

    #[must_use]
    pub fn pop(dst: Gp) -> Self {
        Self::new(Opcode::Pop, vec![Operand::Reg(dst)])
    }

    #[must_use]
    pub const fn pushf() -> Self {
        Self::new(Opcode::Pushf, Vec::new())
    }

    #[must_use]
    pub const fn popf() -> Self {
        Self::new(Opcode::Popf, Vec::new())
    }

    #[must_use]
    pub const fn lahf() -> Self {
        Self::new(Opcode::Lahf, Vec::new())
    }

    #[must_use]
    pub const fn sahf() -> Self {
        Self::new(Opcode::Sahf, Vec::new())
    }

    #[must_use]
    pub fn jmp(target: Label) -> Self {
        Self::new(Opcode::Jmp, vec![Operand::Label(target)])
    }

    #[must_use]
    pub fn jcc(cond: Cond, target: Label) -> Self {
        Self::new(Opcode::Jcc(cond), vec![Operand::Label(target)])
    }

    #[must_use]
    pub fn label(name: Label) -> Self {
        Self::new(Opcode::Label, vec![Operand::Label(name)])
    }

    #[must_use]
    pub const fn ret() -> Self {
        Self::new(Opcode::Ret, Vec::new())
    }

    #[must_use]
    pub const fn nop() -> Self {
        Self::new(Opcode::Nop, Vec::new())
    }
}

/// An ordered instruction list. Indices are program lines.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Code {
    instrs: Vec<Instruction>,
}

impl Code {
    #[must_use]
    pub const fn new() -> Self {
        Self { instrs: Vec::new() }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    #[must_use]
    pub fn get(&self, i: usize) -> Option<&Instruction> {
        self.instrs.get(i)
    }

    pub fn push(&mut self, instr: Instruction) {
        self.instrs.push(instr);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instruction> {
        self.instrs.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Instruction] {
        &self.instrs
    }
}

impl From<Vec<Instruction>> for Code {
    fn from(instrs: Vec<Instruction>) -> Self {
        Self { instrs }
    }
}

impl FromIterator<Instruction> for Code {
    fn from_iter<I: IntoIterator<Item = Instruction>>(iter: I) -> Self {
        Self {
            instrs: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Code {
    type Item = &'a Instruction;
    type IntoIter = std::slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.instrs.iter()
    }
}

impl Index<usize> for Code {
    type Output = Instruction;

    fn index(&self, i: usize) -> &Instruction {
        &self.instrs[i]
    }
}
