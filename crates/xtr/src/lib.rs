//! xtr - x86-64 assembler and register-trace instrumenter
//!
//! Parses AT&T listings, assembles them, and emits copies instrumented to
//! record selected registers at selected lines into a [`Trace`].
//!
//! # Example
//!
//! ```
//! use xtr::{Gp, Machine, Pipeline, TracerConfig};
//!
//! let code = "movq $5, %rax\nmovq $7, %rcx\naddq %rcx, %rax\nretq".parse()?;
//! let config = TracerConfig::default()
//!     .with_regs([Gp::Rax, Gp::Rcx])
//!     .with_before([0, 2])
//!     .with_after([2]);
//!
//! let pipeline = Pipeline::new(code, config)?;
//! let run = pipeline.run_sim(&mut Machine::new())?;
//! assert_eq!(run.trace.states()[1].after[..2], [12, 7]);
//! # Ok::<(), xtr::Error>(())
//! ```

// Re-export from sub-crates
pub use xtr_asm::{
    AsmError, Assembler, Emit, ExecError, Executable, Function, Listing, PatchSite, Recorder,
    Reloc,
};
pub use xtr_code::{Code, Gp, Instruction, Operand, ParseError, Width};
pub use xtr_sim::{Exit, ExitReason, Flags, Machine, SimError, Snapshot};
pub use xtr_trace::{
    FlagSave, MAX_TRACKED, Phase, State, StateLayout, Trace, TraceAddrs, TraceError, Tracer,
    TracerConfig,
};

mod error;
mod pipeline;

pub use error::{Error, Result};
pub use pipeline::{Pipeline, SIM_BUFFER, SIM_CURSOR, SimRun, load};
