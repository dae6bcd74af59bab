//! x86-64 instruction model.
//!
//! A program is a [`Code`]: an ordered list of [`Instruction`]s, each an
//! [`Opcode`] plus [`Operand`]s stored destination first (Intel order).
//! Only the subset of the ISA that the assembler and the tracer need is
//! modelled.
//!
//! Text in and out uses AT&T syntax:
//!
//! ```
//! use xtr_code::Code;
//!
//! let code: Code = "movq $5, %rax\naddq %rcx, %rax\nretq".parse().unwrap();
//! assert_eq!(code.len(), 3);
//! assert_eq!(code.to_string(), "movq $5, %rax\naddq %rcx, %rax\nretq\n");
//! ```

mod att;
mod instruction;
mod opcode;
mod operand;
mod parse;
mod reg;

pub use instruction::{Code, Instruction};
pub use opcode::{AluOp, Cond, Opcode};
pub use operand::{Imm, Label, Mem, Operand, Scale};
pub use parse::{ParseError, ParseErrorKind};
pub use reg::{Gp, Width};
