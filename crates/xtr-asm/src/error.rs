use thiserror::Error;
use xtr_code::Instruction;

/// Code emission errors.
#[derive(Debug, Error)]
pub enum AsmError {
    #[error("unsupported operands for `{0}`")]
    UnsupportedOperands(Instruction),
    #[error("immediate {value} does not fit in {bits} bits for `{instr}`")]
    ImmediateOutOfRange {
        instr: Instruction,
        value: i64,
        bits: u32,
    },
    #[error("%rsp cannot be used as an index register")]
    RspIndex,
    #[error("label `{0}` defined more than once")]
    DuplicateLabel(String),
    #[error("label `{0}` is never defined")]
    UnboundLabel(String),
    #[error("jump to `{0}` is out of rel32 range")]
    JumpOutOfRange(String),
    #[error("emission outside a start/finish bracket")]
    NotStarted,
    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// Executable memory errors.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("mmap failed: {0}")]
    MmapFailed(#[from] nix::Error),
    #[error("cannot map an empty function")]
    Empty,
}

pub type Result<T> = std::result::Result<T, AsmError>;
