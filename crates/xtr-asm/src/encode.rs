//! Machine-code encoding for the supported instruction subset.
//!
//! Encoding is table-free: each opcode picks its primary byte(s) and the
//! shared ModR/M path builds REX, ModR/M, SIB and displacement.

use xtr_code::{Gp, Imm, Instruction, Label, Mem, Opcode, Operand, Width};

use crate::error::{AsmError, Result};

/// A rel32 field waiting for its label's offset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Fixup {
    /// Offset of the 4-byte displacement; the jump ends right after it.
    pub at: usize,
    pub label: Label,
}

/// Register or memory operand in the ModR/M `rm` slot.
#[derive(Clone, Copy)]
enum Rm {
    Reg(Gp),
    Mem(Mem),
}

impl Rm {
    const fn from_operand(op: &Operand) -> Option<Self> {
        match op {
            Operand::Reg(r) => Some(Self::Reg(*r)),
            Operand::Mem(m) => Some(Self::Mem(*m)),
            _ => None,
        }
    }
}

const fn modrm(md: u8, reg: u8, rm: u8) -> u8 {
    (md << 6) | ((reg & 7) << 3) | (rm & 7)
}

/// Encode one instruction, appending to `out`.
///
/// Jumps get a zero rel32 placeholder; use [`Assembler`](crate::Assembler)
/// to resolve them. Label definitions encode to nothing.
///
/// # Errors
///
/// Fails on operand combinations outside the supported subset, immediates
/// that do not fit their field, or `%rsp` used as an index.
pub fn encode(instr: &Instruction, out: &mut Vec<u8>) -> Result<()> {
    encode_with_fixup(instr, out).map(|_| ())
}

pub(crate) fn encode_with_fixup(instr: &Instruction, out: &mut Vec<u8>) -> Result<Option<Fixup>> {
    let mut enc = Encoder { instr, out };
    enc.encode()
}

struct Encoder<'a> {
    instr: &'a Instruction,
    out: &'a mut Vec<u8>,
}

impl Encoder<'_> {
    fn unsupported(&self) -> AsmError {
        AsmError::UnsupportedOperands(self.instr.clone())
    }

    fn ops(&self) -> &[Operand] {
        self.instr.operands()
    }

    fn rm(&self, i: usize) -> Result<Rm> {
        self.ops()
            .get(i)
            .and_then(Rm::from_operand)
            .ok_or_else(|| self.unsupported())
    }

    fn label(&self, i: usize) -> Result<Label> {
        self.ops()
            .get(i)
            .and_then(Operand::as_label)
            .cloned()
            .ok_or_else(|| self.unsupported())
    }

    /// Immediate for a 32-bit field. 64-bit operations sign-extend it; 32-bit
    /// operations also accept the unsigned range.
    fn imm32(&self, imm: Imm, width: Width) -> Result<i32> {
        let ok = match width {
            Width::Q => imm.fits_i32(),
            Width::L => imm.fits_i32() || (0..=i64::from(u32::MAX)).contains(&imm.0),
        };
        if ok {
            #[allow(clippy::cast_possible_truncation)]
            let v = imm.0 as i32;
            Ok(v)
        } else {
            Err(AsmError::ImmediateOutOfRange {
                instr: self.instr.clone(),
                value: imm.0,
                bits: 32,
            })
        }
    }

    fn encode(&mut self) -> Result<Option<Fixup>> {
        let instr = self.instr;
        match (instr.opcode(), instr.operands()) {
            (Opcode::Label, _) => Ok(None),
            (Opcode::Nop, []) => self.bytes(&[0x90]),
            (Opcode::Ret, []) => self.bytes(&[0xc3]),
            (Opcode::Pushf, []) => self.bytes(&[0x9c]),
            (Opcode::Popf, []) => self.bytes(&[0x9d]),
            (Opcode::Sahf, []) => self.bytes(&[0x9e]),
            (Opcode::Lahf, []) => self.bytes(&[0x9f]),
            (Opcode::Push, [Operand::Reg(r)]) => self.short_reg(0x50, *r),
            (Opcode::Pop, [Operand::Reg(r)]) => self.short_reg(0x58, *r),
            (Opcode::Jmp, [Operand::Label(_)]) => {
                self.out.push(0xe9);
                self.rel32(0)
            }
            (Opcode::Jcc(cond), [Operand::Label(_)]) => {
                self.out.extend_from_slice(&[0x0f, 0x80 | cond.code()]);
                self.rel32(0)
            }
            (Opcode::Movabs, [Operand::Reg(r), Operand::Imm(i)]) => {
                self.movabs(*r, i.0 as u64);
                Ok(None)
            }
            (Opcode::Mov(w), [Operand::Reg(d), Operand::Imm(i)]) => {
                let imm = self.imm32(*i, w)?;
                if w == Width::L {
                    // B8+rd id: shortest form, zero-extends.
                    self.short_reg(0xb8, *d)?;
                    self.out.extend_from_slice(&imm.to_le_bytes());
                    Ok(None)
                } else {
                    self.op_rm(w, &[0xc7], 0, Rm::Reg(*d), Some(imm.to_le_bytes().as_slice()))
                }
            }
            (Opcode::Mov(w), [Operand::Mem(m), Operand::Imm(i)]) => {
                let imm = self.imm32(*i, w)?;
                self.op_rm(w, &[0xc7], 0, Rm::Mem(*m), Some(imm.to_le_bytes().as_slice()))
            }
            (Opcode::Mov(w), [_, Operand::Reg(s)]) => {
                let dst = self.rm(0)?;
                self.op_rm(w, &[0x89], s.index() as u8, dst, None)
            }
            (Opcode::Mov(w), [Operand::Reg(d), Operand::Mem(m)]) => {
                self.op_rm(w, &[0x8b], d.index() as u8, Rm::Mem(*m), None)
            }
            (Opcode::Lea, [Operand::Reg(d), Operand::Mem(m)]) => {
                self.op_rm(Width::Q, &[0x8d], d.index() as u8, Rm::Mem(*m), None)
            }
            (Opcode::Alu(op, w), [_, Operand::Imm(i)]) => {
                let dst = self.rm(0)?;
                if i.fits_i8() {
                    #[allow(clippy::cast_possible_truncation)]
                    let ib = [i.0 as i8 as u8];
                    self.op_rm(w, &[0x83], op.ext(), dst, Some(ib.as_slice()))
                } else {
                    let imm = self.imm32(*i, w)?;
                    self.op_rm(w, &[0x81], op.ext(), dst, Some(imm.to_le_bytes().as_slice()))
                }
            }
            (Opcode::Alu(op, w), [_, Operand::Reg(s)]) => {
                let dst = self.rm(0)?;
                self.op_rm(w, &[op.ext() * 8 + 1], s.index() as u8, dst, None)
            }
            (Opcode::Alu(op, w), [Operand::Reg(d), Operand::Mem(m)]) => {
                self.op_rm(w, &[op.ext() * 8 + 3], d.index() as u8, Rm::Mem(*m), None)
            }
            (Opcode::Test(w), [_, Operand::Imm(i)]) => {
                let dst = self.rm(0)?;
                let imm = self.imm32(*i, w)?;
                self.op_rm(w, &[0xf7], 0, dst, Some(imm.to_le_bytes().as_slice()))
            }
            (Opcode::Test(w), [_, Operand::Reg(s)]) => {
                let dst = self.rm(0)?;
                self.op_rm(w, &[0x85], s.index() as u8, dst, None)
            }
            (Opcode::Test(w), [Operand::Reg(d), Operand::Mem(m)]) => {
                self.op_rm(w, &[0x85], d.index() as u8, Rm::Mem(*m), None)
            }
            (Opcode::Imul(w), [Operand::Reg(d), _]) => {
                let src = self.rm(1)?;
                self.op_rm(w, &[0x0f, 0xaf], d.index() as u8, src, None)
            }
            (Opcode::Imul(w), [Operand::Reg(d), _, Operand::Imm(i)]) => {
                let src = self.rm(1)?;
                if i.fits_i8() {
                    #[allow(clippy::cast_possible_truncation)]
                    let ib = [i.0 as i8 as u8];
                    self.op_rm(w, &[0x6b], d.index() as u8, src, Some(ib.as_slice()))
                } else {
                    let imm = self.imm32(*i, w)?;
                    self.op_rm(w, &[0x69], d.index() as u8, src, Some(imm.to_le_bytes().as_slice()))
                }
            }
            (Opcode::Inc(w), [_]) => self.unary(w, 0xff, 0),
            (Opcode::Dec(w), [_]) => self.unary(w, 0xff, 1),
            (Opcode::Not(w), [_]) => self.unary(w, 0xf7, 2),
            (Opcode::Neg(w), [_]) => self.unary(w, 0xf7, 3),
            _ => Err(self.unsupported()),
        }
    }

    fn bytes(&mut self, bytes: &[u8]) -> Result<Option<Fixup>> {
        self.out.extend_from_slice(bytes);
        Ok(None)
    }

    /// `op+rd` forms (push, pop, mov r32 imm). The register lives in the
    /// opcode byte, extended by REX.B.
    fn short_reg(&mut self, op: u8, r: Gp) -> Result<Option<Fixup>> {
        if r.is_extended() {
            self.out.push(0x41);
        }
        self.out.push(op + r.low3());
        Ok(None)
    }

    fn movabs(&mut self, r: Gp, value: u64) {
        self.out.push(if r.is_extended() { 0x49 } else { 0x48 });
        self.out.push(0xb8 + r.low3());
        self.out.extend_from_slice(&value.to_le_bytes());
    }

    fn rel32(&mut self, rel: i32) -> Result<Option<Fixup>> {
        let label = self.label(0)?;
        let at = self.out.len();
        self.out.extend_from_slice(&rel.to_le_bytes());
        Ok(Some(Fixup { at, label }))
    }

    fn unary(&mut self, w: Width, op: u8, ext: u8) -> Result<Option<Fixup>> {
        let dst = self.rm(0)?;
        self.op_rm(w, &[op], ext, dst, None)
    }

    /// Encode `[REX] opcode ModR/M [SIB] [disp] [imm]`.
    ///
    /// `reg` is either a register number or an opcode extension.
    fn op_rm(
        &mut self,
        w: Width,
        opcode: &[u8],
        reg: u8,
        rm: Rm,
        imm: Option<&[u8]>,
    ) -> Result<Option<Fixup>> {
        let (x, b) = match rm {
            Rm::Reg(r) => (false, r.is_extended()),
            Rm::Mem(m) => {
                if matches!(m.index, Some((Gp::Rsp, _))) {
                    return Err(AsmError::RspIndex);
                }
                (
                    m.index.is_some_and(|(i, _)| i.is_extended()),
                    m.base.is_some_and(Gp::is_extended),
                )
            }
        };
        let mut rex = 0x40;
        if w == Width::Q {
            rex |= 0x08;
        }
        if reg >= 8 {
            rex |= 0x04;
        }
        if x {
            rex |= 0x02;
        }
        if b {
            rex |= 0x01;
        }
        if rex != 0x40 {
            self.out.push(rex);
        }
        self.out.extend_from_slice(opcode);

        match rm {
            Rm::Reg(r) => self.out.push(modrm(0b11, reg, r.low3())),
            Rm::Mem(m) => self.mem(reg, m),
        }
        if let Some(imm) = imm {
            self.out.extend_from_slice(imm);
        }
        Ok(None)
    }

    fn mem(&mut self, reg: u8, m: Mem) {
        let Some(base) = m.base else {
            // No base: SIB with base=101 and a mandatory disp32.
            self.out.push(modrm(0b00, reg, 0b100));
            let (scale, index) = m.index.map_or((0, 0b100), |(i, s)| (s.bits(), i.low3()));
            self.out.push(modrm(scale, index, 0b101));
            self.out.extend_from_slice(&m.disp.to_le_bytes());
            return;
        };

        // rbp/r13 with mod=00 means disp32-only, so they always carry a disp.
        let md = if m.disp == 0 && base.low3() != 0b101 {
            0b00
        } else if i8::try_from(m.disp).is_ok() {
            0b01
        } else {
            0b10
        };

        // rsp/r12 as rm selects a SIB byte.
        if m.index.is_some() || base.low3() == 0b100 {
            self.out.push(modrm(md, reg, 0b100));
            let (scale, index) = m.index.map_or((0, 0b100), |(i, s)| (s.bits(), i.low3()));
            self.out.push(modrm(scale, index, base.low3()));
        } else {
            self.out.push(modrm(md, reg, base.low3()));
        }

        match md {
            #[allow(clippy::cast_possible_truncation)]
            0b01 => self.out.push(m.disp as i8 as u8),
            0b10 => self.out.extend_from_slice(&m.disp.to_le_bytes()),
            _ => {}
        }
    }
}
