//! AT&T syntax parser.
//!
//! Accepts the same text the writer produces: one instruction per line,
//! `name:` label definitions and `#` comments.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::instruction::{Code, Instruction};
use crate::opcode::Opcode;
use crate::operand::{Imm, Label, Mem, Operand, Scale};
use crate::reg::{Gp, Width};

static MEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<disp>-?(?:0x[0-9a-fA-F]+|[0-9]+))?\((?P<base>%[a-z0-9]+)?(?:,(?P<index>%[a-z0-9]+)(?:,(?P<scale>[0-9]+))?)?\)$",
    )
    .expect("memory operand regex is valid")
});

/// What went wrong on a line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("unknown mnemonic `{0}`")]
    UnknownMnemonic(String),
    #[error("unknown register `{0}`")]
    UnknownRegister(String),
    #[error("register `{reg}` does not match {width}-bit operand width")]
    WidthMismatch { reg: String, width: u32 },
    #[error("invalid immediate `{0}`")]
    BadImmediate(String),
    #[error("invalid memory operand `{0}`")]
    BadMemory(String),
    #[error("invalid operand `{0}`")]
    BadOperand(String),
    #[error("invalid label `{0}`")]
    BadLabel(String),
    #[error("`{mnemonic}` takes {expected} operands, got {got}")]
    OperandCount {
        mnemonic: String,
        expected: String,
        got: usize,
    },
}

/// Parse failure with its 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {kind}")]
pub struct ParseError {
    pub line: usize,
    pub kind: ParseErrorKind,
}

impl FromStr for Code {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut code = Self::new();
        for (i, raw) in s.lines().enumerate() {
            let text = raw.split('#').next().unwrap_or("").trim();
            if text.is_empty() {
                continue;
            }
            let instr = parse_line(text).map_err(|kind| ParseError { line: i + 1, kind })?;
            code.push(instr);
        }
        Ok(code)
    }
}

impl FromStr for Instruction {
    type Err = ParseErrorKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_line(s.trim())
    }
}

fn parse_line(text: &str) -> Result<Instruction, ParseErrorKind> {
    if let Some(name) = text.strip_suffix(':') {
        let name = name.trim();
        if !Label::is_valid_name(name) {
            return Err(ParseErrorKind::BadLabel(name.to_string()));
        }
        return Ok(Instruction::label(Label::new(name)));
    }

    let (mnemonic, rest) = text
        .split_once(char::is_whitespace)
        .map_or((text, ""), |(m, r)| (m, r.trim()));
    let opcode = Opcode::from_mnemonic(mnemonic)
        .ok_or_else(|| ParseErrorKind::UnknownMnemonic(mnemonic.to_string()))?;

    let mut operands = split_operands(rest)
        .into_iter()
        .map(|s| parse_operand(s, opcode.width()))
        .collect::<Result<Vec<_>, _>>()?;
    // AT&T lists the destination last.
    operands.reverse();

    let arity = opcode.arity();
    if !arity.contains(&operands.len()) {
        let expected = if arity.start() == arity.end() {
            arity.start().to_string()
        } else {
            format!("{}-{}", arity.start(), arity.end())
        };
        return Err(ParseErrorKind::OperandCount {
            mnemonic: mnemonic.to_string(),
            expected,
            got: operands.len(),
        });
    }

    Ok(Instruction::new(opcode, operands))
}

/// Split on commas outside parentheses.
fn split_operands(s: &str) -> Vec<&str> {
    if s.is_empty() {
        return Vec::new();
    }
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(s[start..].trim());
    parts
}

fn parse_operand(s: &str, width: Width) -> Result<Operand, ParseErrorKind> {
    if let Some(name) = s.strip_prefix('%') {
        let (reg, w) =
            Gp::from_name(name).ok_or_else(|| ParseErrorKind::UnknownRegister(s.to_string()))?;
        if w != width {
            return Err(ParseErrorKind::WidthMismatch {
                reg: s.to_string(),
                width: width.bits(),
            });
        }
        return Ok(Operand::Reg(reg));
    }
    if let Some(value) = s.strip_prefix('$') {
        return parse_int(value)
            .map(|v| Operand::Imm(Imm(v)))
            .ok_or_else(|| ParseErrorKind::BadImmediate(s.to_string()));
    }
    if s.contains('(') {
        return parse_mem(s).map(Operand::Mem);
    }
    if let Some(v) = parse_int(s) {
        let disp = i32::try_from(v).map_err(|_| ParseErrorKind::BadMemory(s.to_string()))?;
        return Ok(Operand::Mem(Mem::abs(disp)));
    }
    if Label::is_valid_name(s) {
        return Ok(Operand::Label(Label::new(s)));
    }
    Err(ParseErrorKind::BadOperand(s.to_string()))
}

fn parse_mem(s: &str) -> Result<Mem, ParseErrorKind> {
    let bad = || ParseErrorKind::BadMemory(s.to_string());
    let caps = MEM_RE.captures(s).ok_or_else(bad)?;

    let disp = match caps.name("disp") {
        Some(m) => i32::try_from(parse_int(m.as_str()).ok_or_else(bad)?).map_err(|_| bad())?,
        None => 0,
    };
    let addr_reg = |name: &str| -> Result<Gp, ParseErrorKind> {
        let name = &name[1..];
        match Gp::from_name(name) {
            Some((reg, Width::Q)) => Ok(reg),
            Some(_) => Err(ParseErrorKind::WidthMismatch {
                reg: format!("%{name}"),
                width: 64,
            }),
            None => Err(ParseErrorKind::UnknownRegister(format!("%{name}"))),
        }
    };
    let base = caps.name("base").map(|m| addr_reg(m.as_str())).transpose()?;
    let index = match caps.name("index") {
        Some(m) => {
            let scale = match caps.name("scale") {
                Some(sc) => sc
                    .as_str()
                    .parse()
                    .ok()
                    .and_then(Scale::from_factor)
                    .ok_or_else(bad)?,
                None => Scale::S1,
            };
            Some((addr_reg(m.as_str())?, scale))
        }
        None => None,
    };
    if base.is_none() && index.is_none() {
        return Err(bad());
    }
    Ok(Mem { base, index, disp })
}

/// Decimal or `0x` hexadecimal, optionally negative. Hex values use the
/// full 64-bit range.
#[allow(clippy::cast_possible_wrap)]
fn parse_int(s: &str) -> Option<i64> {
    let (neg, digits) = s.strip_prefix('-').map_or((false, s), |d| (true, d));
    let magnitude = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16).ok()? as i64
    } else if neg {
        // i64::MIN has no positive counterpart.
        return 0_i64.checked_sub_unsigned(digits.parse::<u64>().ok()?);
    } else {
        digits.parse::<i64>().ok()?
    };
    Some(if neg { magnitude.wrapping_neg() } else { magnitude })
}
