//! Reference interpreter for the xtr instruction subset.
//!
//! [`Machine`] executes a [`Code`](xtr_code::Code) listing over sixteen
//! general-purpose registers, the arithmetic flags of RFLAGS and a sparse
//! byte-addressed memory. It exists to check properties of generated code
//! (for example that instrumentation leaves architectural state untouched)
//! without mapping and running native code.

mod flags;
mod machine;

pub use flags::Flags;
pub use machine::{Exit, ExitReason, Machine, SimError, Snapshot, STACK_TOP};
