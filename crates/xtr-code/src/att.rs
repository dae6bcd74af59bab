//! AT&T syntax writer.
//!
//! Registers carry a `%` sigil and are named by the opcode's width,
//! immediates carry `$`, memory is `disp(%base,%index,scale)` and labels
//! are bare names. Operands print source first.

use std::fmt::{self, Display, Formatter, Write};

use crate::instruction::{Code, Instruction};
use crate::opcode::Opcode;
use crate::operand::{Imm, Label, Mem, Operand};
use crate::reg::{Gp, Width};

/// Write a register at a given width.
pub(crate) fn write_reg(w: &mut impl Write, reg: Gp, width: Width) -> fmt::Result {
    write!(w, "%{}", reg.name(width))
}

/// Write an operand, naming registers at `width`.
pub(crate) fn write_operand(w: &mut impl Write, op: &Operand, width: Width) -> fmt::Result {
    match op {
        Operand::Reg(r) => write_reg(w, *r, width),
        Operand::Imm(i) => write!(w, "{i}"),
        Operand::Mem(m) => write!(w, "{m}"),
        Operand::Label(l) => write!(w, "{l}"),
    }
}

impl Display for Gp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write_reg(f, *self, Width::Q)
    }
}

impl Display for Imm {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if (0..0x1_0000).contains(&self.0) || self.0 < 0 {
            write!(f, "${}", self.0)
        } else {
            write!(f, "$0x{:x}", self.0)
        }
    }
}

impl Display for Mem {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.base.is_none() && self.index.is_none() {
            return write!(f, "{}", self.disp);
        }
        if self.disp != 0 {
            write!(f, "{}", self.disp)?;
        }
        f.write_char('(')?;
        if let Some(base) = self.base {
            write!(f, "{base}")?;
        }
        if let Some((index, scale)) = self.index {
            write!(f, ",{index},{}", scale.factor())?;
        }
        f.write_char(')')
    }
}

impl Display for Label {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let opcode = self.opcode();
        if opcode == Opcode::Label {
            if let Some(l) = self.operand(0) {
                write_operand(f, l, Width::Q)?;
            }
            return f.write_char(':');
        }

        write!(f, "{opcode}")?;
        let width = opcode.width();
        for (i, op) in self.operands().iter().rev().enumerate() {
            f.write_str(if i == 0 { " " } else { ", " })?;
            write_operand(f, op, width)?;
        }
        Ok(())
    }
}

impl Display for Code {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for instr in self {
            writeln!(f, "{instr}")?;
        }
        Ok(())
    }
}
