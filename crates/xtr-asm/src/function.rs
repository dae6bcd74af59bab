//! Finished machine-code functions.

use std::fmt;

use rustc_hash::FxHashMap;
use xtr_code::Label;

use crate::emit::{PatchSite, Reloc};
use crate::error::ExecError;
use crate::exec::Executable;

/// Encoded function with its labels and absolute-address patch sites.
#[derive(Clone, Debug, Default)]
pub struct Function {
    code: Vec<u8>,
    sites: Vec<PatchSite>,
    labels: FxHashMap<Label, usize>,
}

impl Function {
    pub(crate) const fn new(
        code: Vec<u8>,
        sites: Vec<PatchSite>,
        labels: FxHashMap<Label, usize>,
    ) -> Self {
        Self {
            code,
            sites,
            labels,
        }
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.code
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    #[must_use]
    pub fn patch_sites(&self) -> &[PatchSite] {
        &self.sites
    }

    /// Byte offset of a label definition.
    #[must_use]
    pub fn label_offset(&self, name: &str) -> Option<usize> {
        self.labels.get(&Label::new(name)).copied()
    }

    /// Point every site for `reloc` at `value`. Returns how many sites changed.
    pub fn rebind(&mut self, reloc: Reloc, value: u64) -> usize {
        let mut patched = 0;
        for site in self.sites.iter_mut().filter(|s| s.reloc == reloc) {
            self.code[site.at..site.at + 8].copy_from_slice(&value.to_le_bytes());
            site.value = value;
            patched += 1;
        }
        patched
    }

    /// Copy into freshly mapped executable memory.
    ///
    /// # Errors
    ///
    /// Fails if the function is empty or the mapping cannot be created.
    pub fn load(&self) -> Result<Executable, ExecError> {
        Executable::new(&self.code)
    }
}

/// Hex dump, 16 bytes per line, prefixed by offset.
impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (row, chunk) in self.code.chunks(16).enumerate() {
            write!(f, "{:08x}:", row * 16)?;
            for b in chunk {
                write!(f, " {b:02x}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CURSOR: Reloc = Reloc::new("cursor");
    const OTHER: Reloc = Reloc::new("other");

    fn sample() -> Function {
        let mut code = vec![0x48, 0xb8];
        code.extend_from_slice(&1u64.to_le_bytes());
        code.push(0xc3);
        Function::new(
            code,
            vec![PatchSite {
                at: 2,
                reloc: CURSOR,
                value: 1,
            }],
            FxHashMap::default(),
        )
    }

    #[test]
    fn test_rebind_rewrites_immediate() {
        let mut f = sample();
        assert_eq!(f.rebind(OTHER, 5), 0);
        assert_eq!(f.rebind(CURSOR, 0xdead_beef), 1);
        assert_eq!(&f.bytes()[2..10], &0xdead_beefu64.to_le_bytes());
        assert_eq!(f.patch_sites()[0].value, 0xdead_beef);
        assert_eq!(f.bytes()[10], 0xc3);
    }

    #[test]
    fn test_hex_dump() {
        let f = sample();
        assert_eq!(
            f.to_string(),
            "00000000: 48 b8 01 00 00 00 00 00 00 00 c3\n"
        );
    }
}
