//! Executable memory for assembled functions.
//!
//! Code is copied into an anonymous read/write mapping which is then
//! flipped to read/execute. The mapping is never writable and executable
//! at the same time.

use std::ffi::c_void;
use std::num::NonZeroUsize;
use std::ptr::NonNull;

use nix::sys::mman::{MapFlags, ProtFlags, mmap_anonymous, mprotect, munmap};
use tracing::debug;

use crate::error::ExecError;

/// A function mapped into executable memory.
pub struct Executable {
    region: NonNull<c_void>,
    len: usize,
}

impl Executable {
    /// Map `code` as an executable region.
    ///
    /// # Errors
    ///
    /// Returns an error if `code` is empty or mmap/mprotect fails.
    pub fn new(code: &[u8]) -> Result<Self, ExecError> {
        let len = NonZeroUsize::new(code.len()).ok_or(ExecError::Empty)?;

        let region = unsafe {
            mmap_anonymous(
                None,
                len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_PRIVATE,
            )?
        };
        let exec = Self {
            region,
            len: len.get(),
        };

        unsafe {
            std::ptr::copy_nonoverlapping(code.as_ptr(), region.as_ptr().cast::<u8>(), code.len());
            mprotect(region, exec.len, ProtFlags::PROT_READ | ProtFlags::PROT_EXEC)?;
        }

        debug!(bytes = exec.len, addr = ?region, "mapped executable function");
        Ok(exec)
    }

    /// Start address of the mapped code.
    #[must_use]
    pub const fn as_ptr(&self) -> *const u8 {
        self.region.as_ptr().cast::<u8>().cast_const()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Call the mapped code as `extern "sysv64" fn()`.
    ///
    /// # Safety
    ///
    /// The code must be a well-formed function for the current process: it
    /// returns with `ret`, preserves callee-saved registers and the stack,
    /// and every absolute address it dereferences is live and writable for
    /// the duration of the call.
    #[cfg(target_arch = "x86_64")]
    pub unsafe fn call(&self) {
        let entry: extern "sysv64" fn() = unsafe { std::mem::transmute(self.region.as_ptr()) };
        entry();
    }
}

impl Drop for Executable {
    fn drop(&mut self) {
        unsafe {
            let _ = munmap(self.region, self.len);
        }
    }
}
