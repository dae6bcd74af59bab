//! Opcodes of the supported x86-64 subset.

use std::fmt;
use std::ops::RangeInclusive;

use crate::reg::Width;

/// Two-operand integer ALU operations sharing the `00 /r` encoding group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AluOp {
    Add,
    Or,
    And,
    Sub,
    Xor,
    Cmp,
}

impl AluOp {
    pub const ALL: [Self; 6] = [Self::Add, Self::Or, Self::And, Self::Sub, Self::Xor, Self::Cmp];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Or => "or",
            Self::And => "and",
            Self::Sub => "sub",
            Self::Xor => "xor",
            Self::Cmp => "cmp",
        }
    }

    /// `/digit` extension used by the `81`/`83` immediate forms.
    #[must_use]
    pub const fn ext(self) -> u8 {
        match self {
            Self::Add => 0,
            Self::Or => 1,
            Self::And => 4,
            Self::Sub => 5,
            Self::Xor => 6,
            Self::Cmp => 7,
        }
    }

    /// Whether the result is written back (everything except `cmp`).
    #[must_use]
    pub const fn writes_dst(self) -> bool {
        !matches!(self, Self::Cmp)
    }
}

/// Branch condition codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Cond {
    /// Below (CF=1).
    B,
    /// Above or equal (CF=0).
    Ae,
    /// Equal (ZF=1).
    E,
    /// Not equal (ZF=0).
    Ne,
    /// Below or equal (CF=1 or ZF=1).
    Be,
    /// Above (CF=0 and ZF=0).
    A,
    /// Sign (SF=1).
    S,
    /// Not sign (SF=0).
    Ns,
    /// Less (SF!=OF).
    L,
    /// Greater or equal (SF=OF).
    Ge,
    /// Less or equal (ZF=1 or SF!=OF).
    Le,
    /// Greater (ZF=0 and SF=OF).
    G,
}

impl Cond {
    pub const ALL: [Self; 12] = [
        Self::B,
        Self::Ae,
        Self::E,
        Self::Ne,
        Self::Be,
        Self::A,
        Self::S,
        Self::Ns,
        Self::L,
        Self::Ge,
        Self::Le,
        Self::G,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::B => "b",
            Self::Ae => "ae",
            Self::E => "e",
            Self::Ne => "ne",
            Self::Be => "be",
            Self::A => "a",
            Self::S => "s",
            Self::Ns => "ns",
            Self::L => "l",
            Self::Ge => "ge",
            Self::Le => "le",
            Self::G => "g",
        }
    }

    /// Low nibble of the `0F 8x` / `7x` opcode.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::B => 0x2,
            Self::Ae => 0x3,
            Self::E => 0x4,
            Self::Ne => 0x5,
            Self::Be => 0x6,
            Self::A => 0x7,
            Self::S => 0x8,
            Self::Ns => 0x9,
            Self::L => 0xc,
            Self::Ge => 0xd,
            Self::Le => 0xe,
            Self::G => 0xf,
        }
    }
}

/// Opcode of an [`Instruction`](crate::Instruction).
///
/// Width-parameterised variants carry the AT&T suffix; the rest are
/// implicitly 64-bit or take no sized operands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    Mov(Width),
    /// `movabsq $imm64, %reg`
    Movabs,
    Lea,
    Alu(AluOp, Width),
    Test(Width),
    /// Two-operand `imul r, r/m` or three-operand `imul r, r/m, imm32`.
    Imul(Width),
    Inc(Width),
    Dec(Width),
    Neg(Width),
    Not(Width),
    Push,
    Pop,
    Pushf,
    Popf,
    /// Load SF, ZF, AF, PF, CF into `%ah`.
    Lahf,
    /// Store `%ah` into SF, ZF, AF, PF, CF.
    Sahf,
    Jmp,
    Jcc(Cond),
    Ret,
    Nop,
    /// Label definition pseudo-instruction; emits no bytes.
    Label,
}

impl Opcode {
    /// Width used to name register operands.
    #[must_use]
    pub const fn width(self) -> Width {
        match self {
            Self::Mov(w)
            | Self::Alu(_, w)
            | Self::Test(w)
            | Self::Imul(w)
            | Self::Inc(w)
            | Self::Dec(w)
            | Self::Neg(w)
            | Self::Not(w) => w,
            _ => Width::Q,
        }
    }

    /// Accepted operand counts.
    #[must_use]
    pub const fn arity(self) -> RangeInclusive<usize> {
        match self {
            Self::Mov(_) | Self::Movabs | Self::Lea | Self::Alu(..) | Self::Test(_) => 2..=2,
            Self::Imul(_) => 2..=3,
            Self::Inc(_)
            | Self::Dec(_)
            | Self::Neg(_)
            | Self::Not(_)
            | Self::Push
            | Self::Pop
            | Self::Jmp
            | Self::Jcc(_)
            | Self::Label => 1..=1,
            Self::Pushf | Self::Popf | Self::Lahf | Self::Sahf | Self::Ret | Self::Nop => 0..=0,
        }
    }

    /// Whether control may leave the straight-line path.
    #[must_use]
    pub const fn is_branch(self) -> bool {
        matches!(self, Self::Jmp | Self::Jcc(_) | Self::Ret)
    }

    /// Parse an AT&T mnemonic.
    #[must_use]
    pub fn from_mnemonic(s: &str) -> Option<Self> {
        let fixed = match s {
            "movabsq" | "movabs" => Some(Self::Movabs),
            "leaq" => Some(Self::Lea),
            "pushq" => Some(Self::Push),
            "popq" => Some(Self::Pop),
            "pushfq" => Some(Self::Pushf),
            "popfq" => Some(Self::Popf),
            "lahf" => Some(Self::Lahf),
            "sahf" => Some(Self::Sahf),
            "jmp" => Some(Self::Jmp),
            "retq" | "ret" => Some(Self::Ret),
            "nop" => Some(Self::Nop),
            _ => None,
        };
        if fixed.is_some() {
            return fixed;
        }
        if let Some(cc) = s.strip_prefix('j') {
            if let Some(cond) = Cond::ALL.into_iter().find(|c| c.name() == cc) {
                return Some(Self::Jcc(cond));
            }
        }

        let width = Width::from_suffix(s.chars().last()?)?;
        let stem = &s[..s.len() - 1];
        if let Some(op) = AluOp::ALL.into_iter().find(|op| op.name() == stem) {
            return Some(Self::Alu(op, width));
        }
        match stem {
            "mov" => Some(Self::Mov(width)),
            "test" => Some(Self::Test(width)),
            "imul" => Some(Self::Imul(width)),
            "inc" => Some(Self::Inc(width)),
            "dec" => Some(Self::Dec(width)),
            "neg" => Some(Self::Neg(width)),
            "not" => Some(Self::Not(width)),
            _ => None,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mov(w) => write!(f, "mov{}", w.suffix()),
            Self::Movabs => f.write_str("movabsq"),
            Self::Lea => f.write_str("leaq"),
            Self::Alu(op, w) => write!(f, "{}{}", op.name(), w.suffix()),
            Self::Test(w) => write!(f, "test{}", w.suffix()),
            Self::Imul(w) => write!(f, "imul{}", w.suffix()),
            Self::Inc(w) => write!(f, "inc{}", w.suffix()),
            Self::Dec(w) => write!(f, "dec{}", w.suffix()),
            Self::Neg(w) => write!(f, "neg{}", w.suffix()),
            Self::Not(w) => write!(f, "not{}", w.suffix()),
            Self::Push => f.write_str("pushq"),
            Self::Pop => f.write_str("popq"),
            Self::Pushf => f.write_str("pushfq"),
            Self::Popf => f.write_str("popfq"),
            Self::Lahf => f.write_str("lahf"),
            Self::Sahf => f.write_str("sahf"),
            Self::Jmp => f.write_str("jmp"),
            Self::Jcc(c) => write!(f, "j{}", c.name()),
            Self::Ret => f.write_str("retq"),
            Self::Nop => f.write_str("nop"),
            Self::Label => f.write_str(".label"),
        }
    }
}
