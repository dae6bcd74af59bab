//! The emission sink interface.

use xtr_code::{AluOp, Cond, Gp, Imm, Instruction, Label, Mem, Operand, Width};

use crate::error::Result;

/// Symbolic name of an absolute address baked into emitted code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Reloc(&'static str);

impl Reloc {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        self.0
    }
}

/// Where an absolute address was emitted.
///
/// `at` is the byte offset of the 8-byte immediate in a [`Function`], or
/// the instruction index in a [`Listing`].
///
/// [`Function`]: crate::Function
/// [`Listing`]: crate::Listing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatchSite {
    pub at: usize,
    pub reloc: Reloc,
    pub value: u64,
}

/// A code emission sink.
///
/// Calls are bracketed: `start`, any number of `assemble`/`load_abs`, then
/// `finish`. An error anywhere leaves nothing finalized; the next `start`
/// discards the partial function.
pub trait Emit {
    type Output;

    /// Begin a new function, discarding anything in progress.
    fn start(&mut self);

    /// Append one instruction.
    ///
    /// # Errors
    ///
    /// Fails if the instruction cannot be encoded or no function is open.
    fn assemble(&mut self, instr: &Instruction) -> Result<()>;

    /// Load a 64-bit absolute address into `dst` and record it as a patch site.
    ///
    /// # Errors
    ///
    /// Fails if no function is open.
    fn load_abs(&mut self, dst: Gp, reloc: Reloc, value: u64) -> Result<()>;

    /// Resolve labels and hand back the finished function.
    ///
    /// # Errors
    ///
    /// Fails on unbound labels or if no function is open.
    fn finish(&mut self) -> Result<Self::Output>;

    // ------------------------------------------------------------------
    // Primitives used by instrumentation (all 64-bit)
    // ------------------------------------------------------------------

    fn push(&mut self, src: Gp) -> Result<()> {
        self.assemble(&Instruction::push(src))
    }

    fn pop(&mut self, dst: Gp) -> Result<()> {
        self.assemble(&Instruction::pop(dst))
    }

    fn pushf(&mut self) -> Result<()> {
        self.assemble(&Instruction::pushf())
    }

    fn popf(&mut self) -> Result<()> {
        self.assemble(&Instruction::popf())
    }

    fn lahf(&mut self) -> Result<()> {
        self.assemble(&Instruction::lahf())
    }

    fn sahf(&mut self) -> Result<()> {
        self.assemble(&Instruction::sahf())
    }

    fn mov(&mut self, dst: impl Into<Operand>, src: impl Into<Operand>) -> Result<()>
    where
        Self: Sized,
    {
        self.assemble(&Instruction::mov(Width::Q, dst, src))
    }

    fn mov_imm(&mut self, dst: Gp, value: i64) -> Result<()> {
        self.assemble(&Instruction::mov(Width::Q, dst, Imm(value)))
    }

    /// `movq %src, mem`
    fn store(&mut self, dst: Mem, src: Gp) -> Result<()> {
        self.assemble(&Instruction::mov(Width::Q, dst, src))
    }

    /// `movq mem, %dst`
    fn load(&mut self, dst: Gp, src: Mem) -> Result<()> {
        self.assemble(&Instruction::mov(Width::Q, dst, src))
    }

    fn add(&mut self, dst: impl Into<Operand>, src: impl Into<Operand>) -> Result<()>
    where
        Self: Sized,
    {
        self.assemble(&Instruction::add(Width::Q, dst, src))
    }

    fn imul(&mut self, dst: Gp, src: impl Into<Operand>) -> Result<()>
    where
        Self: Sized,
    {
        self.assemble(&Instruction::imul(Width::Q, dst, src))
    }

    fn inc(&mut self, dst: impl Into<Operand>) -> Result<()>
    where
        Self: Sized,
    {
        self.assemble(&Instruction::inc(Width::Q, dst))
    }

    fn dec(&mut self, dst: impl Into<Operand>) -> Result<()>
    where
        Self: Sized,
    {
        self.assemble(&Instruction::dec(Width::Q, dst))
    }

    fn lea(&mut self, dst: Gp, src: Mem) -> Result<()> {
        self.assemble(&Instruction::lea(dst, src))
    }

    /// Set flags from `lhs - rhs`.
    fn cmp(&mut self, lhs: Gp, rhs: Gp) -> Result<()> {
        self.assemble(&Instruction::alu(AluOp::Cmp, Width::Q, lhs, rhs))
    }

    fn jcc(&mut self, cond: Cond, target: &Label) -> Result<()> {
        self.assemble(&Instruction::jcc(cond, target.clone()))
    }

    fn jmp(&mut self, target: &Label) -> Result<()> {
        self.assemble(&Instruction::jmp(target.clone()))
    }

    fn bind(&mut self, label: &Label) -> Result<()> {
        self.assemble(&Instruction::label(label.clone()))
    }
}
