//! Instruction operands.

use crate::reg::Gp;

/// Immediate value. Its encoded size depends on the opcode using it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Imm(pub i64);

impl Imm {
    /// Whether the value fits a sign-extended 8-bit field.
    #[must_use]
    pub const fn fits_i8(self) -> bool {
        self.0 >= i8::MIN as i64 && self.0 <= i8::MAX as i64
    }

    /// Whether the value fits a sign-extended 32-bit field.
    #[must_use]
    pub const fn fits_i32(self) -> bool {
        self.0 >= i32::MIN as i64 && self.0 <= i32::MAX as i64
    }
}

/// SIB scale factor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Scale {
    #[default]
    S1,
    S2,
    S4,
    S8,
}

impl Scale {
    /// Multiplier applied to the index register.
    #[must_use]
    pub const fn factor(self) -> u64 {
        match self {
            Self::S1 => 1,
            Self::S2 => 2,
            Self::S4 => 4,
            Self::S8 => 8,
        }
    }

    /// Two-bit SIB encoding.
    #[must_use]
    pub const fn bits(self) -> u8 {
        match self {
            Self::S1 => 0,
            Self::S2 => 1,
            Self::S4 => 2,
            Self::S8 => 3,
        }
    }

    /// Scale from its multiplier.
    #[must_use]
    pub const fn from_factor(factor: u64) -> Option<Self> {
        match factor {
            1 => Some(Self::S1),
            2 => Some(Self::S2),
            4 => Some(Self::S4),
            8 => Some(Self::S8),
            _ => None,
        }
    }
}

/// Memory operand: `disp(base, index, scale)`.
///
/// Address registers are always 64-bit. With neither base nor index the
/// operand is an absolute 32-bit address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Mem {
    pub base: Option<Gp>,
    pub index: Option<(Gp, Scale)>,
    pub disp: i32,
}

impl Mem {
    /// `(base)`
    #[must_use]
    pub const fn base(base: Gp) -> Self {
        Self {
            base: Some(base),
            index: None,
            disp: 0,
        }
    }

    /// `disp(base)`
    #[must_use]
    pub const fn base_disp(base: Gp, disp: i32) -> Self {
        Self {
            base: Some(base),
            index: None,
            disp,
        }
    }

    /// `(base, index, 1)`
    #[must_use]
    pub const fn base_index(base: Gp, index: Gp) -> Self {
        Self {
            base: Some(base),
            index: Some((index, Scale::S1)),
            disp: 0,
        }
    }

    /// Absolute address.
    #[must_use]
    pub const fn abs(disp: i32) -> Self {
        Self {
            base: None,
            index: None,
            disp,
        }
    }

    /// Replace the index register and scale.
    #[must_use]
    pub const fn with_index(mut self, index: Gp, scale: Scale) -> Self {
        self.index = Some((index, scale));
        self
    }

    /// Replace the displacement.
    #[must_use]
    pub const fn with_disp(mut self, disp: i32) -> Self {
        self.disp = disp;
        self
    }
}

/// Symbolic jump target or label definition name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(String);

impl Label {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Label names follow assembler identifier rules.
    pub(crate) fn is_valid_name(name: &str) -> bool {
        let mut chars = name.chars();
        chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '.')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
    }
}

/// An instruction operand.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operand {
    Reg(Gp),
    Imm(Imm),
    Mem(Mem),
    Label(Label),
}

impl Operand {
    #[must_use]
    pub const fn as_reg(&self) -> Option<Gp> {
        match self {
            Self::Reg(r) => Some(*r),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_imm(&self) -> Option<Imm> {
        match self {
            Self::Imm(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_mem(&self) -> Option<Mem> {
        match self {
            Self::Mem(m) => Some(*m),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_label(&self) -> Option<&Label> {
        match self {
            Self::Label(l) => Some(l),
            _ => None,
        }
    }
}

impl From<Gp> for Operand {
    fn from(r: Gp) -> Self {
        Self::Reg(r)
    }
}

impl From<Imm> for Operand {
    fn from(i: Imm) -> Self {
        Self::Imm(i)
    }
}

impl From<Mem> for Operand {
    fn from(m: Mem) -> Self {
        Self::Mem(m)
    }
}

impl From<Label> for Operand {
    fn from(l: Label) -> Self {
        Self::Label(l)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_imm_ranges() {
        assert!(Imm(127).fits_i8());
        assert!(!Imm(128).fits_i8());
        assert!(Imm(-128).fits_i8());
        assert!(Imm(i64::from(i32::MIN)).fits_i32());
        assert!(!Imm(1 << 31).fits_i32());
    }

    #[test]
    fn test_label_names() {
        assert!(Label::is_valid_name("loop"));
        assert!(Label::is_valid_name(".L1"));
        assert!(Label::is_valid_name("_done2"));
        assert!(!Label::is_valid_name("2bad"));
        assert!(!Label::is_valid_name(""));
        assert!(!Label::is_valid_name("a-b"));
    }

    #[test]
    fn test_mem_builders() {
        let m = Mem::base_disp(Gp::Rsp, 16).with_index(Gp::Rcx, Scale::S8);
        assert_eq!(m.base, Some(Gp::Rsp));
        assert_eq!(m.index, Some((Gp::Rcx, Scale::S8)));
        assert_eq!(m.disp, 16);
        assert_eq!(Scale::from_factor(4), Some(Scale::S4));
        assert_eq!(Scale::from_factor(3), None);
    }
}
