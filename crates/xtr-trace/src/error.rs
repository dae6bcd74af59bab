use thiserror::Error;
use xtr_asm::AsmError;
use xtr_code::Gp;

use crate::layout::MAX_TRACKED;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("line {index} out of range for a program of {len} instructions")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("trace holds {capacity} states but {needed} are needed")]
    CapacityExceeded { needed: usize, capacity: usize },

    #[error("register {0} tracked more than once")]
    DuplicateRegister(Gp),

    #[error("{0} registers tracked, at most {MAX_TRACKED} allowed")]
    TooManyRegisters(usize),

    #[error(transparent)]
    Asm(#[from] AsmError),
}

pub type Result<T> = std::result::Result<T, TraceError>;
