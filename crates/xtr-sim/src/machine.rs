//! Interpreter state and execution loop.

use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::{debug, trace};
use xtr_code::{AluOp, Code, Gp, Instruction, Label, Mem, Opcode, Operand, Width};

use crate::flags::{self, Flags};

/// Initial `%rsp` of a fresh machine.
pub const STACK_TOP: u64 = 0x7fff_ffff_f000;

const DEFAULT_MAX_STEPS: u64 = 1_000_000;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("step limit of {0} reached")]
    StepLimit(u64),

    #[error("jump to unbound label `{0}`")]
    UnboundLabel(String),

    #[error("label `{0}` defined twice")]
    DuplicateLabel(String),

    #[error("unsupported operands: {0}")]
    BadOperands(Instruction),
}

type Result<T> = std::result::Result<T, SimError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitReason {
    /// `retq` executed; the return address is popped.
    Ret,
    /// Control ran off the end of the listing.
    End,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Exit {
    pub reason: ExitReason,
    pub steps: u64,
}

/// Registers and RFLAGS at one point in time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub regs: [u64; Gp::COUNT],
    pub rflags: u64,
}

impl Snapshot {
    /// Same registers, and RFLAGS equal under `mask`.
    #[must_use]
    pub fn matches(&self, other: &Self, mask: u64) -> bool {
        self.regs == other.regs && (self.rflags & mask) == (other.rflags & mask)
    }
}

enum Flow<'a> {
    Next,
    Jump(&'a Label),
    Halt,
}

/// Sixteen registers, RFLAGS and sparse little-endian memory.
#[derive(Clone, Debug)]
pub struct Machine {
    regs: [u64; Gp::COUNT],
    rflags: u64,
    mem: FxHashMap<u64, u8>,
    max_steps: u64,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine {
    #[must_use]
    pub fn new() -> Self {
        let mut regs = [0; Gp::COUNT];
        regs[Gp::Rsp.index()] = STACK_TOP;
        Self {
            regs,
            rflags: Flags::RESERVED,
            mem: FxHashMap::default(),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    #[must_use]
    pub const fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    #[must_use]
    pub const fn reg(&self, r: Gp) -> u64 {
        self.regs[r.index()]
    }

    pub const fn set_reg(&mut self, r: Gp, value: u64) {
        self.regs[r.index()] = value;
    }

    #[must_use]
    pub const fn rflags(&self) -> u64 {
        self.rflags
    }

    /// Set the modelled flags; other bits are dropped.
    pub const fn set_rflags(&mut self, value: u64) {
        self.rflags = (value & Flags::ARITH) | Flags::RESERVED;
    }

    #[must_use]
    pub const fn snapshot(&self) -> Snapshot {
        Snapshot {
            regs: self.regs,
            rflags: self.rflags,
        }
    }

    /// Read `n` bytes little-endian. Unwritten memory reads as zero.
    fn read(&self, addr: u64, n: u64) -> u64 {
        (0..n).fold(0, |acc, i| {
            let byte = self.mem.get(&addr.wrapping_add(i)).copied().unwrap_or(0);
            acc | (u64::from(byte) << (8 * i))
        })
    }

    fn write(&mut self, addr: u64, n: u64, value: u64) {
        for i in 0..n {
            self.mem.insert(addr.wrapping_add(i), (value >> (8 * i)) as u8);
        }
    }

    #[must_use]
    pub fn read_u64(&self, addr: u64) -> u64 {
        self.read(addr, 8)
    }

    pub fn write_u64(&mut self, addr: u64, value: u64) {
        self.write(addr, 8, value);
    }

    /// Run `code` from its first instruction until `retq` or the end.
    ///
    /// # Errors
    ///
    /// Fails on jumps to unknown labels, malformed operands, or when the
    /// step limit is exceeded.
    pub fn run(&mut self, code: &Code) -> Result<Exit> {
        let mut labels: FxHashMap<&Label, usize> = FxHashMap::default();
        for (i, instr) in code.iter().enumerate() {
            if instr.is_label() {
                let Some(label) = instr.operand(0).and_then(Operand::as_label) else {
                    return Err(SimError::BadOperands(instr.clone()));
                };
                if labels.insert(label, i).is_some() {
                    return Err(SimError::DuplicateLabel(label.name().to_string()));
                }
            }
        }

        let mut pc = 0;
        let mut steps = 0;
        while let Some(instr) = code.get(pc) {
            if steps == self.max_steps {
                return Err(SimError::StepLimit(self.max_steps));
            }
            steps += 1;
            trace!(pc, %instr, "step");
            match self.step(instr)? {
                Flow::Next => pc += 1,
                Flow::Jump(label) => {
                    pc = *labels
                        .get(label)
                        .ok_or_else(|| SimError::UnboundLabel(label.name().to_string()))?;
                }
                Flow::Halt => {
                    debug!(steps, "returned");
                    return Ok(Exit {
                        reason: ExitReason::Ret,
                        steps,
                    });
                }
            }
        }
        debug!(steps, "ran off end");
        Ok(Exit {
            reason: ExitReason::End,
            steps,
        })
    }

    fn addr(&self, m: Mem) -> u64 {
        let base = m.base.map_or(0, |r| self.reg(r));
        let index = m
            .index
            .map_or(0, |(r, s)| self.reg(r).wrapping_mul(s.factor()));
        base.wrapping_add(index)
            .wrapping_add(i64::from(m.disp) as u64)
    }

    fn load(&self, instr: &Instruction, op: &Operand, w: Width) -> Result<u64> {
        match op {
            Operand::Reg(r) => Ok(self.reg(*r) & w.mask()),
            Operand::Imm(imm) => Ok((imm.0 as u64) & w.mask()),
            Operand::Mem(m) => Ok(self.read(self.addr(*m), u64::from(w.bits() / 8))),
            Operand::Label(_) => Err(SimError::BadOperands(instr.clone())),
        }
    }

    fn store(&mut self, instr: &Instruction, op: &Operand, w: Width, value: u64) -> Result<()> {
        match op {
            // 32-bit register writes zero-extend.
            Operand::Reg(r) => self.set_reg(*r, value & w.mask()),
            Operand::Mem(m) => {
                let addr = self.addr(*m);
                self.write(addr, u64::from(w.bits() / 8), value);
            }
            _ => return Err(SimError::BadOperands(instr.clone())),
        }
        Ok(())
    }

    fn push(&mut self, value: u64) {
        let rsp = self.reg(Gp::Rsp).wrapping_sub(8);
        self.set_reg(Gp::Rsp, rsp);
        self.write_u64(rsp, value);
    }

    fn pop(&mut self) -> u64 {
        let rsp = self.reg(Gp::Rsp);
        let value = self.read_u64(rsp);
        self.set_reg(Gp::Rsp, rsp.wrapping_add(8));
        value
    }

    /// Replace the bits in `mask` with `value`.
    const fn update_flags(&mut self, mask: u64, value: u64) {
        self.rflags = (self.rflags & !mask) | (value & mask) | Flags::RESERVED;
    }

    fn step<'a>(&mut self, instr: &'a Instruction) -> Result<Flow<'a>> {
        let ops = instr.operands();
        let bad = || SimError::BadOperands(instr.clone());
        let op = |i: usize| ops.get(i).ok_or_else(bad);

        match instr.opcode() {
            Opcode::Label | Opcode::Nop => {}
            Opcode::Mov(w) => {
                let v = self.load(instr, op(1)?, w)?;
                self.store(instr, op(0)?, w, v)?;
            }
            Opcode::Movabs => {
                let v = self.load(instr, op(1)?, Width::Q)?;
                self.store(instr, op(0)?, Width::Q, v)?;
            }
            Opcode::Lea => {
                let (Some(dst), Some(m)) = (op(0)?.as_reg(), op(1)?.as_mem()) else {
                    return Err(bad());
                };
                let a = self.addr(m);
                self.set_reg(dst, a);
            }
            Opcode::Alu(alu, w) => {
                let a = self.load(instr, op(0)?, w)?;
                let b = self.load(instr, op(1)?, w)?;
                let (r, f) = match alu {
                    AluOp::Add => flags::add(a, b, w),
                    AluOp::Sub | AluOp::Cmp => flags::sub(a, b, w),
                    AluOp::Or => (a | b, flags::logic(a | b, w)),
                    AluOp::And => (a & b, flags::logic(a & b, w)),
                    AluOp::Xor => (a ^ b, flags::logic(a ^ b, w)),
                };
                self.update_flags(Flags::ARITH, f);
                if alu.writes_dst() {
                    self.store(instr, op(0)?, w, r)?;
                }
            }
            Opcode::Test(w) => {
                let a = self.load(instr, op(0)?, w)?;
                let b = self.load(instr, op(1)?, w)?;
                self.update_flags(Flags::ARITH, flags::logic(a & b, w));
            }
            Opcode::Imul(w) => {
                let (a, b) = if ops.len() == 3 {
                    (self.load(instr, op(1)?, w)?, self.load(instr, op(2)?, w)?)
                } else {
                    (self.load(instr, op(0)?, w)?, self.load(instr, op(1)?, w)?)
                };
                let (r, f) = flags::imul(a, b, w);
                self.update_flags(Flags::ARITH, f);
                self.store(instr, op(0)?, w, r)?;
            }
            Opcode::Inc(w) | Opcode::Dec(w) => {
                let a = self.load(instr, op(0)?, w)?;
                let (r, f) = if matches!(instr.opcode(), Opcode::Inc(_)) {
                    flags::add(a, 1, w)
                } else {
                    flags::sub(a, 1, w)
                };
                // CF is left alone.
                self.update_flags(Flags::ARITH & !Flags::CF, f);
                self.store(instr, op(0)?, w, r)?;
            }
            Opcode::Neg(w) => {
                let a = self.load(instr, op(0)?, w)?;
                let (r, f) = flags::sub(0, a, w);
                self.update_flags(Flags::ARITH, f);
                self.store(instr, op(0)?, w, r)?;
            }
            Opcode::Not(w) => {
                let a = self.load(instr, op(0)?, w)?;
                self.store(instr, op(0)?, w, !a)?;
            }
            Opcode::Push => {
                // `pushq %rsp` pushes the value before the decrement.
                let v = self.load(instr, op(0)?, Width::Q)?;
                self.push(v);
            }
            Opcode::Pop => {
                let v = self.pop();
                self.store(instr, op(0)?, Width::Q, v)?;
            }
            Opcode::Pushf => self.push(self.rflags),
            Opcode::Popf => {
                let v = self.pop();
                self.set_rflags(v);
            }
            Opcode::Lahf => {
                let ah = (self.rflags & Flags::LAHF) | Flags::RESERVED;
                let rax = (self.reg(Gp::Rax) & !0xff00) | (ah << 8);
                self.set_reg(Gp::Rax, rax);
            }
            Opcode::Sahf => {
                let ah = (self.reg(Gp::Rax) >> 8) & 0xff;
                self.update_flags(Flags::LAHF, ah);
            }
            Opcode::Jmp => {
                return op(0)?.as_label().map(Flow::Jump).ok_or_else(bad);
            }
            Opcode::Jcc(c) => {
                let target = op(0)?.as_label().ok_or_else(bad)?;
                if flags::cond(c, self.rflags) {
                    return Ok(Flow::Jump(target));
                }
            }
            Opcode::Ret => {
                self.pop();
                return Ok(Flow::Halt);
            }
        }
        Ok(Flow::Next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(src: &str) -> Machine {
        let code: Code = src.parse().unwrap();
        let mut m = Machine::new();
        m.run(&code).unwrap();
        m
    }

    #[test]
    fn test_arithmetic_and_moves() {
        let m = run(
            "movq $5, %rax
             movq $7, %rcx
             addq %rcx, %rax
             imulq $3, %rax, %rdx
             leaq 8(%rdx,%rax,2), %rsi",
        );
        assert_eq!(m.reg(Gp::Rax), 12);
        assert_eq!(m.reg(Gp::Rdx), 36);
        assert_eq!(m.reg(Gp::Rsi), 36 + 24 + 8);
    }

    #[test]
    fn test_32bit_writes_zero_extend() {
        let m = run("movq $-1, %rax\nmovl $1, %eax\nmovq $-1, %rcx\naddl $1, %ecx");
        assert_eq!(m.reg(Gp::Rax), 1);
        assert_eq!(m.reg(Gp::Rcx), 0);
        assert_ne!(m.rflags() & Flags::CF, 0);
    }

    #[test]
    fn test_memory_and_stack() {
        let m = run(
            "movabsq $0x1000, %rbx
             movq $42, 8(%rbx)
             incq 8(%rbx)
             pushq 8(%rbx)
             popq %rcx",
        );
        assert_eq!(m.read_u64(0x1008), 43);
        assert_eq!(m.reg(Gp::Rcx), 43);
        assert_eq!(m.reg(Gp::Rsp), STACK_TOP);
    }

    #[test]
    fn test_push_rsp_pushes_old_value() {
        let m = run("pushq %rsp\npopq %rax");
        assert_eq!(m.reg(Gp::Rax), STACK_TOP);
    }

    #[test]
    fn test_loop_with_conditional_branch() {
        let m = run(
            "movq $0, %rax
             movq $10, %rcx
             top:
             addq %rcx, %rax
             decq %rcx
             jne top
             retq",
        );
        assert_eq!(m.reg(Gp::Rax), 55);
        assert_eq!(m.reg(Gp::Rcx), 0);
    }

    #[test]
    fn test_inc_preserves_carry() {
        let m = run("movq $-1, %rax\naddq $1, %rax\nincq %rax");
        assert_ne!(m.rflags() & Flags::CF, 0);
        assert_eq!(m.rflags() & Flags::ZF, 0);
    }

    #[test]
    fn test_flags_round_trip_through_stack() {
        let m = run(
            "movq $1, %rax
             cmpq $2, %rax
             pushfq
             xorq %rax, %rax
             popfq",
        );
        assert_ne!(m.rflags() & Flags::CF, 0);
        assert_ne!(m.rflags() & Flags::SF, 0);
        assert_eq!(m.rflags() & Flags::ZF, 0);
    }

    #[test]
    fn test_lahf_sahf_drop_overflow() {
        let mut m = run(
            "movabsq $0x7fffffffffffffff, %rax
             addq $1, %rax
             lahf",
        );
        assert_ne!(m.rflags() & Flags::OF, 0);
        let ah = (m.reg(Gp::Rax) >> 8) & 0xff;
        assert_eq!(ah & Flags::SF, Flags::SF);
        assert_eq!(ah & Flags::RESERVED, Flags::RESERVED);

        m.set_rflags(0);
        let code: Code = "sahf".parse().unwrap();
        m.run(&code).unwrap();
        assert_ne!(m.rflags() & Flags::SF, 0);
        assert_eq!(m.rflags() & Flags::OF, 0);
    }

    #[test]
    fn test_ret_halts() {
        let code: Code = "movq $1, %rax\nretq\nmovq $2, %rax".parse().unwrap();
        let mut m = Machine::new();
        let exit = m.run(&code).unwrap();
        assert_eq!(exit.reason, ExitReason::Ret);
        assert_eq!(exit.steps, 2);
        assert_eq!(m.reg(Gp::Rax), 1);
        assert_eq!(m.reg(Gp::Rsp), STACK_TOP + 8);
    }

    #[test]
    fn test_errors() {
        let code: Code = "top:\njmp top".parse().unwrap();
        let mut m = Machine::new().with_max_steps(10);
        assert!(matches!(m.run(&code), Err(SimError::StepLimit(10))));

        let code: Code = "jmp nowhere".parse().unwrap();
        assert!(matches!(
            Machine::new().run(&code),
            Err(SimError::UnboundLabel(l)) if l == "nowhere"
        ));
    }

    #[test]
    fn test_snapshot_matches_under_mask() {
        let mut a = Machine::new();
        let b = a.clone();
        a.set_rflags(Flags::OF);
        assert!(a.snapshot().matches(&b.snapshot(), Flags::LAHF));
        assert!(!a.snapshot().matches(&b.snapshot(), Flags::ARITH));
    }
}
