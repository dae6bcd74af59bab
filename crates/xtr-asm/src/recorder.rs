//! Listing-producing emission sink.

use xtr_code::{Code, Gp, Instruction};

use crate::assembler::Assembler;
use crate::emit::{Emit, PatchSite, Reloc};
use crate::error::Result;
use crate::function::Function;

/// Everything a [`Recorder`] produced: the instruction stream, its patch
/// sites by instruction index, and the encoded function.
#[derive(Clone, Debug)]
pub struct Listing {
    pub code: Code,
    pub sites: Vec<PatchSite>,
    pub function: Function,
}

/// Emission sink that keeps the emitted instructions.
///
/// Every instruction is also encoded, so a `Recorder` rejects exactly what
/// an [`Assembler`] rejects.
#[derive(Debug, Default)]
pub struct Recorder {
    asm: Assembler,
    code: Code,
    sites: Vec<PatchSite>,
}

impl Recorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Emit for Recorder {
    type Output = Listing;

    fn start(&mut self) {
        self.asm.start();
        self.code = Code::new();
        self.sites.clear();
    }

    fn assemble(&mut self, instr: &Instruction) -> Result<()> {
        self.asm.assemble(instr)?;
        self.code.push(instr.clone());
        Ok(())
    }

    fn load_abs(&mut self, dst: Gp, reloc: Reloc, value: u64) -> Result<()> {
        self.asm.load_abs(dst, reloc, value)?;
        self.sites.push(PatchSite {
            at: self.code.len(),
            reloc,
            value,
        });
        self.code.push(Instruction::movabs(dst, value));
        Ok(())
    }

    fn finish(&mut self) -> Result<Listing> {
        let function = self.asm.finish()?;
        Ok(Listing {
            code: std::mem::take(&mut self.code),
            sites: std::mem::take(&mut self.sites),
            function,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AsmError;

    #[test]
    fn test_records_instructions_and_sites() {
        const TABLE: Reloc = Reloc::new("table");
        let mut rec = Recorder::new();
        rec.start();
        rec.push(Gp::Rbx).unwrap();
        rec.load_abs(Gp::Rbx, TABLE, 0x4_0000).unwrap();
        rec.inc(xtr_code::Mem::base(Gp::Rbx)).unwrap();
        rec.pop(Gp::Rbx).unwrap();
        let listing = rec.finish().unwrap();

        assert_eq!(
            listing.code.to_string(),
            "pushq %rbx\nmovabsq $0x40000, %rbx\nincq (%rbx)\npopq %rbx\n"
        );
        assert_eq!(listing.sites.len(), 1);
        assert_eq!(listing.sites[0].at, 1);
        assert_eq!(listing.function.patch_sites()[0].at, 3);
        assert_eq!(listing.function.len(), 1 + 10 + 3 + 1);
    }

    #[test]
    fn test_rejects_like_assembler() {
        let mut rec = Recorder::new();
        rec.start();
        let bad: Instruction = "movq (%rax), (%rbx)".parse().unwrap();
        assert!(matches!(rec.assemble(&bad), Err(AsmError::UnsupportedOperands(_))));
    }
}
