//! RFLAGS arithmetic flag computation.

use xtr_code::{Cond, Width};

/// RFLAGS bits modelled by the interpreter.
pub struct Flags;

impl Flags {
    pub const CF: u64 = 1 << 0;
    /// Always reads as one.
    pub const RESERVED: u64 = 1 << 1;
    pub const PF: u64 = 1 << 2;
    pub const AF: u64 = 1 << 4;
    pub const ZF: u64 = 1 << 6;
    pub const SF: u64 = 1 << 7;
    pub const OF: u64 = 1 << 11;

    /// Every arithmetic status flag.
    pub const ARITH: u64 = Self::CF | Self::PF | Self::AF | Self::ZF | Self::SF | Self::OF;
    /// Flags that `lahf`/`sahf` transfer through `%ah`.
    pub const LAHF: u64 = Self::CF | Self::PF | Self::AF | Self::ZF | Self::SF;
}

const fn sign_bit(w: Width) -> u64 {
    1 << (w.bits() - 1)
}

/// ZF, SF and PF of a result.
pub(crate) const fn result_flags(r: u64, w: Width) -> u64 {
    let r = r & w.mask();
    let mut f = 0;
    if r == 0 {
        f |= Flags::ZF;
    }
    if r & sign_bit(w) != 0 {
        f |= Flags::SF;
    }
    if (r as u8).count_ones() % 2 == 0 {
        f |= Flags::PF;
    }
    f
}

/// Result and flags of `a + b`.
pub(crate) const fn add(a: u64, b: u64, w: Width) -> (u64, u64) {
    let m = w.mask();
    let (a, b) = (a & m, b & m);
    let r = a.wrapping_add(b) & m;
    let mut f = result_flags(r, w);
    if (a as u128 + b as u128) > m as u128 {
        f |= Flags::CF;
    }
    if (a ^ r) & (b ^ r) & sign_bit(w) != 0 {
        f |= Flags::OF;
    }
    if (a ^ b ^ r) & 0x10 != 0 {
        f |= Flags::AF;
    }
    (r, f)
}

/// Result and flags of `a - b`.
pub(crate) const fn sub(a: u64, b: u64, w: Width) -> (u64, u64) {
    let m = w.mask();
    let (a, b) = (a & m, b & m);
    let r = a.wrapping_sub(b) & m;
    let mut f = result_flags(r, w);
    if a < b {
        f |= Flags::CF;
    }
    if (a ^ b) & (a ^ r) & sign_bit(w) != 0 {
        f |= Flags::OF;
    }
    if (a ^ b ^ r) & 0x10 != 0 {
        f |= Flags::AF;
    }
    (r, f)
}

/// Flags of a logical result: CF and OF cleared.
pub(crate) const fn logic(r: u64, w: Width) -> u64 {
    result_flags(r, w)
}

/// Truncated signed product; CF and OF set when it overflowed.
pub(crate) const fn imul(a: u64, b: u64, w: Width) -> (u64, u64) {
    let (full, r) = match w {
        Width::Q => {
            let full = (a as i64 as i128) * (b as i64 as i128);
            (full, full as i64 as u64)
        }
        Width::L => {
            let full = (a as i32 as i128) * (b as i32 as i128);
            (full, full as i32 as u32 as u64)
        }
    };
    let truncated = match w {
        Width::Q => r as i64 as i128,
        Width::L => r as u32 as i32 as i128,
    };
    let mut f = result_flags(r, w);
    if full != truncated {
        f |= Flags::CF | Flags::OF;
    }
    (r, f)
}

/// Evaluate a condition code against RFLAGS.
pub(crate) const fn cond(c: Cond, flags: u64) -> bool {
    let cf = flags & Flags::CF != 0;
    let zf = flags & Flags::ZF != 0;
    let sf = flags & Flags::SF != 0;
    let of = flags & Flags::OF != 0;
    match c {
        Cond::B => cf,
        Cond::Ae => !cf,
        Cond::E => zf,
        Cond::Ne => !zf,
        Cond::Be => cf || zf,
        Cond::A => !cf && !zf,
        Cond::S => sf,
        Cond::Ns => !sf,
        Cond::L => sf != of,
        Cond::Ge => sf == of,
        Cond::Le => zf || sf != of,
        Cond::G => !zf && sf == of,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_carry_and_overflow() {
        let (r, f) = add(u64::MAX, 1, Width::Q);
        assert_eq!(r, 0);
        assert_ne!(f & Flags::CF, 0);
        assert_ne!(f & Flags::ZF, 0);
        assert_eq!(f & Flags::OF, 0);

        let (r, f) = add(i64::MAX as u64, 1, Width::Q);
        assert_eq!(r, 1 << 63);
        assert_ne!(f & Flags::OF, 0);
        assert_ne!(f & Flags::SF, 0);
        assert_eq!(f & Flags::CF, 0);
    }

    #[test]
    fn test_sub_borrow() {
        let (r, f) = sub(3, 5, Width::L);
        assert_eq!(r, 0xffff_fffe);
        assert_ne!(f & Flags::CF, 0);
        assert_ne!(f & Flags::SF, 0);
        assert!(cond(Cond::L, f));
        assert!(cond(Cond::B, f));
    }

    #[test]
    fn test_parity_of_low_byte() {
        assert_ne!(result_flags(0b11, Width::Q) & Flags::PF, 0);
        assert_eq!(result_flags(0b111, Width::Q) & Flags::PF, 0);
        // Only the low byte counts.
        assert_ne!(result_flags(0x100, Width::Q) & Flags::PF, 0);
    }

    #[test]
    fn test_imul_overflow() {
        let (r, f) = imul(6, 7, Width::Q);
        assert_eq!(r, 42);
        assert_eq!(f & (Flags::CF | Flags::OF), 0);
        let (_, f) = imul(1 << 62, 4, Width::Q);
        assert_eq!(f & (Flags::CF | Flags::OF), Flags::CF | Flags::OF);
        let (r, _) = imul((-3i64) as u64, 5, Width::Q);
        assert_eq!(r as i64, -15);
    }

    #[test]
    fn test_signed_conditions() {
        let (_, f) = sub(5, 5, Width::Q);
        assert!(cond(Cond::E, f));
        assert!(cond(Cond::Ge, f));
        assert!(cond(Cond::Le, f));
        assert!(!cond(Cond::G, f));
        let (_, f) = sub((-1i64) as u64, 1, Width::Q);
        assert!(cond(Cond::L, f));
        assert!(cond(Cond::A, f));
    }
}
