use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] xtr_code::ParseError),
    #[error("trace error: {0}")]
    Trace(#[from] xtr_trace::TraceError),
    #[error("assembly error: {0}")]
    Asm(#[from] xtr_asm::AsmError),
    #[error("simulation error: {0}")]
    Sim(#[from] xtr_sim::SimError),
    #[error("cannot map code: {0}")]
    Exec(#[from] xtr_asm::ExecError),
}

pub type Result<T> = std::result::Result<T, Error>;
