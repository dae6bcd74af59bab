//! General-purpose registers.

/// Operand width for width-suffixed opcodes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Width {
    /// 32-bit (`l` suffix). Writes zero-extend into the full register.
    L,
    /// 64-bit (`q` suffix).
    #[default]
    Q,
}

impl Width {
    /// AT&T mnemonic suffix.
    #[must_use]
    pub const fn suffix(self) -> char {
        match self {
            Self::L => 'l',
            Self::Q => 'q',
        }
    }

    /// Width in bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Self::L => 32,
            Self::Q => 64,
        }
    }

    /// Mask of the bits a value of this width occupies.
    #[must_use]
    pub const fn mask(self) -> u64 {
        match self {
            Self::L => 0xffff_ffff,
            Self::Q => u64::MAX,
        }
    }

    pub(crate) const fn from_suffix(c: char) -> Option<Self> {
        match c {
            'l' => Some(Self::L),
            'q' => Some(Self::Q),
            _ => None,
        }
    }
}

/// x86-64 general-purpose register, numbered by hardware encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Gp {
    Rax = 0,
    Rcx = 1,
    Rdx = 2,
    Rbx = 3,
    Rsp = 4,
    Rbp = 5,
    Rsi = 6,
    Rdi = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    R13 = 13,
    R14 = 14,
    R15 = 15,
}

const NAMES_64: [&str; 16] = [
    "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11", "r12",
    "r13", "r14", "r15",
];

const NAMES_32: [&str; 16] = [
    "eax", "ecx", "edx", "ebx", "esp", "ebp", "esi", "edi", "r8d", "r9d", "r10d", "r11d",
    "r12d", "r13d", "r14d", "r15d",
];

impl Gp {
    /// Number of general-purpose registers.
    pub const COUNT: usize = 16;

    /// All registers in encoding order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Rax,
        Self::Rcx,
        Self::Rdx,
        Self::Rbx,
        Self::Rsp,
        Self::Rbp,
        Self::Rsi,
        Self::Rdi,
        Self::R8,
        Self::R9,
        Self::R10,
        Self::R11,
        Self::R12,
        Self::R13,
        Self::R14,
        Self::R15,
    ];

    /// Hardware register number (0-15).
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Low three bits, as placed in ModR/M and SIB fields.
    #[must_use]
    pub const fn low3(self) -> u8 {
        (self as u8) & 7
    }

    /// Whether the register needs a REX extension bit (r8-r15).
    #[must_use]
    pub const fn is_extended(self) -> bool {
        (self as u8) >= 8
    }

    /// Register from hardware number.
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        if index < Self::COUNT {
            Some(Self::ALL[index])
        } else {
            None
        }
    }

    /// Register name at the given width, without the `%` sigil.
    #[must_use]
    pub const fn name(self, width: Width) -> &'static str {
        match width {
            Width::Q => NAMES_64[self as usize],
            Width::L => NAMES_32[self as usize],
        }
    }

    /// Look up a register by name (no sigil), returning its width too.
    #[must_use]
    pub fn from_name(name: &str) -> Option<(Self, Width)> {
        if let Some(i) = NAMES_64.iter().position(|&n| n == name) {
            return Some((Self::ALL[i], Width::Q));
        }
        NAMES_32
            .iter()
            .position(|&n| n == name)
            .map(|i| (Self::ALL[i], Width::L))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_numbers() {
        assert_eq!(Gp::Rax.index(), 0);
        assert_eq!(Gp::Rsp.low3(), 4);
        assert_eq!(Gp::R12.low3(), 4);
        assert!(Gp::R12.is_extended());
        assert!(!Gp::Rdi.is_extended());
        assert_eq!(Gp::from_index(13), Some(Gp::R13));
        assert_eq!(Gp::from_index(16), None);
    }

    #[test]
    fn test_names_by_width() {
        assert_eq!(Gp::Rbx.name(Width::Q), "rbx");
        assert_eq!(Gp::Rbx.name(Width::L), "ebx");
        assert_eq!(Gp::R9.name(Width::L), "r9d");
        assert_eq!(Gp::from_name("r9d"), Some((Gp::R9, Width::L)));
        assert_eq!(Gp::from_name("rsp"), Some((Gp::Rsp, Width::Q)));
        assert_eq!(Gp::from_name("xmm0"), None);
    }

    #[test]
    fn test_all_is_ordered() {
        for (i, gp) in Gp::ALL.iter().enumerate() {
            assert_eq!(gp.index(), i);
        }
    }
}
