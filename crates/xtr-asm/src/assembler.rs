//! Byte-level emission sink.

use rustc_hash::FxHashMap;
use tracing::debug;
use xtr_code::{Gp, Instruction, Label, Opcode};

use crate::emit::{Emit, PatchSite, Reloc};
use crate::encode::{Fixup, encode_with_fixup};
use crate::error::{AsmError, Result};
use crate::function::Function;

/// Encodes instructions into a [`Function`].
#[derive(Debug, Default)]
pub struct Assembler {
    buf: Vec<u8>,
    labels: FxHashMap<Label, usize>,
    fixups: Vec<Fixup>,
    sites: Vec<PatchSite>,
    active: bool,
}

impl Assembler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes emitted so far in the open function.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.buf.len()
    }

    const fn check_active(&self) -> Result<()> {
        if self.active {
            Ok(())
        } else {
            Err(AsmError::NotStarted)
        }
    }

    fn reset(&mut self) {
        self.buf.clear();
        self.labels.clear();
        self.fixups.clear();
        self.sites.clear();
    }
}

impl Emit for Assembler {
    type Output = Function;

    fn start(&mut self) {
        self.reset();
        self.active = true;
    }

    fn assemble(&mut self, instr: &Instruction) -> Result<()> {
        self.check_active()?;
        if instr.opcode() == Opcode::Label {
            let Some(label) = instr.operand(0).and_then(|op| op.as_label()) else {
                return Err(AsmError::UnsupportedOperands(instr.clone()));
            };
            if self.labels.insert(label.clone(), self.buf.len()).is_some() {
                return Err(AsmError::DuplicateLabel(label.name().to_string()));
            }
            return Ok(());
        }
        if let Some(fixup) = encode_with_fixup(instr, &mut self.buf)? {
            self.fixups.push(fixup);
        }
        Ok(())
    }

    fn load_abs(&mut self, dst: Gp, reloc: Reloc, value: u64) -> Result<()> {
        self.check_active()?;
        // REX.W + B8+rd, then the immediate.
        let at = self.buf.len() + 2;
        encode_with_fixup(&Instruction::movabs(dst, value), &mut self.buf)?;
        self.sites.push(PatchSite { at, reloc, value });
        Ok(())
    }

    fn finish(&mut self) -> Result<Function> {
        self.check_active()?;
        self.active = false;

        for fixup in &self.fixups {
            let Some(&target) = self.labels.get(&fixup.label) else {
                return Err(AsmError::UnboundLabel(fixup.label.name().to_string()));
            };
            let next = fixup.at + 4;
            let rel = i64::try_from(target).unwrap_or(i64::MAX)
                - i64::try_from(next).unwrap_or(i64::MAX);
            let rel = i32::try_from(rel)
                .map_err(|_| AsmError::JumpOutOfRange(fixup.label.name().to_string()))?;
            self.buf[fixup.at..next].copy_from_slice(&rel.to_le_bytes());
        }

        debug!(
            bytes = self.buf.len(),
            labels = self.labels.len(),
            patch_sites = self.sites.len(),
            "function assembled"
        );
        let function = Function::new(
            std::mem::take(&mut self.buf),
            std::mem::take(&mut self.sites),
            std::mem::take(&mut self.labels),
        );
        self.reset();
        Ok(function)
    }
}
