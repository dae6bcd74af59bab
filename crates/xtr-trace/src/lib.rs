//! Register-trace instrumentation.
//!
//! A [`Tracer`] rewrites a [`Code`](xtr_code::Code) listing through an
//! [`Emit`](xtr_asm::Emit) sink, inserting code around selected lines that
//! copies the tracked registers into a caller-owned [`Trace`]. The emitted
//! code leaves every register, flag and the stack exactly as the original
//! program would; its only effect is the writes into the trace.
//!
//! ```
//! use xtr_code::{Code, Gp};
//! use xtr_trace::{Trace, Tracer, TracerConfig};
//!
//! let code: Code = "movq $5, %rax\nmovq $7, %rcx\naddq %rcx, %rax\nretq".parse().unwrap();
//! let tracer = Tracer::new(
//!     TracerConfig::default()
//!         .with_regs([Gp::Rax, Gp::Rcx])
//!         .with_before([0, 2])
//!         .with_after([2]),
//! )
//! .unwrap();
//!
//! let mut trace = Trace::with_capacity(2);
//! let function = tracer.assemble(&trace.addrs(), &code).unwrap();
//! assert!(!function.is_empty());
//! ```

mod config;
mod error;
mod layout;
mod preserve;
mod trace;
mod tracer;

pub use config::{FlagSave, TracerConfig};
pub use error::{Result, TraceError};
pub use layout::{MAX_TRACKED, Phase, StateLayout};
pub use trace::{State, TRACE_BUFFER, TRACE_CAPACITY, TRACE_CURSOR, Trace, TraceAddrs};
pub use tracer::Tracer;
