//! x86-64 code emission.
//!
//! Everything that produces code goes through the [`Emit`] trait: a
//! `start`/`finish` bracket around per-instruction `assemble` calls, plus
//! [`Emit::load_abs`] for absolute addresses that must stay visible as
//! [`PatchSite`]s. Two sinks are provided:
//!
//! - [`Assembler`] encodes to machine code and produces a [`Function`].
//! - [`Recorder`] does the same and also keeps the instruction listing,
//!   which is what diagnostics and the reference interpreter consume.
//!
//! A finished [`Function`] can be mapped executable with [`Function::load`].

mod assembler;
mod emit;
mod encode;
mod error;
mod exec;
mod function;
mod recorder;

pub use assembler::Assembler;
pub use emit::{Emit, PatchSite, Reloc};
pub use encode::encode;
pub use error::{AsmError, ExecError, Result};
pub use exec::Executable;
pub use function::Function;
pub use recorder::{Listing, Recorder};
