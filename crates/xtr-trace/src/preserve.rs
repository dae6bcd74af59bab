//! Save and restore of scratch registers and flags around instrumentation.

use xtr_asm::Emit;
use xtr_code::{Gp, Mem};

use crate::config::{FlagSave, TracerConfig};
use crate::error::Result;

/// Bytes below `%rsp` that leaf code may use without moving the stack pointer.
const RED_ZONE: i32 = 128;

/// Stack depth at the point the body starts running.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Frame {
    /// Bytes between the program's `%rsp` and the current `%rsp`.
    pub bytes: i32,
}

/// Emit `body` with `%rax`, `%rbx` and the flags saved around it.
///
/// On entry to `body` both scratch registers still hold the program's
/// values and the flags are safe to clobber.
pub(crate) fn preserve<E, F>(sink: &mut E, config: &TracerConfig, body: F) -> Result<()>
where
    E: Emit,
    F: FnOnce(&mut E, Frame) -> Result<()>,
{
    let mut bytes = 0;
    if config.red_zone {
        // lea leaves the flags alone, unlike sub.
        sink.lea(Gp::Rsp, Mem::base_disp(Gp::Rsp, -RED_ZONE))?;
        bytes += RED_ZONE;
    }

    sink.push(Gp::Rax)?;
    sink.push(Gp::Rbx)?;
    bytes += 16;

    match config.flag_save {
        FlagSave::Pushf => sink.pushf()?,
        FlagSave::Lahf => {
            sink.lahf()?;
            sink.push(Gp::Rax)?;
            sink.load(Gp::Rax, Mem::base_disp(Gp::Rsp, 16))?;
        }
    }
    bytes += 8;

    body(sink, Frame { bytes })?;

    match config.flag_save {
        FlagSave::Pushf => sink.popf()?,
        FlagSave::Lahf => {
            sink.pop(Gp::Rax)?;
            sink.sahf()?;
        }
    }
    sink.pop(Gp::Rbx)?;
    sink.pop(Gp::Rax)?;

    if config.red_zone {
        sink.lea(Gp::Rsp, Mem::base_disp(Gp::Rsp, RED_ZONE))?;
    }
    Ok(())
}
