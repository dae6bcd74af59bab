//! `State` layout descriptor.
//!
//! Every displacement baked into instrumentation comes from here. The
//! `#[repr(C)]` struct in `trace.rs` must agree with it; the tests pin both.

/// Maximum number of tracked registers, and the width of each snapshot array.
pub const MAX_TRACKED: usize = 16;

/// Which snapshot array of a state is written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Before,
    After,
}

/// `State` field offsets in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateLayout {
    /// Offset of `line`.
    pub offset_line: usize,
    /// Offset of `before[0]`.
    pub offset_before: usize,
    /// Offset of `after[0]`.
    pub offset_after: usize,
    /// Bytes per register slot.
    pub slot_bytes: usize,
    /// Size of one state, the stride between consecutive records.
    pub size: usize,
}

impl StateLayout {
    /// Bumped whenever an offset changes.
    pub const VERSION: u32 = 1;

    /// Layout of [`State`](crate::State).
    pub const CURRENT: Self = Self::new(MAX_TRACKED);

    #[must_use]
    pub const fn new(slots: usize) -> Self {
        let slot_bytes = 8;
        let offset_line = 0;
        let offset_before = offset_line + 8;
        let offset_after = offset_before + slots * slot_bytes;
        let size = offset_after + slots * slot_bytes;
        Self {
            offset_line,
            offset_before,
            offset_after,
            slot_bytes,
            size,
        }
    }

    /// Offset of the register at `position` in the given snapshot.
    #[must_use]
    pub const fn field_offset(&self, phase: Phase, position: usize) -> usize {
        let base = match phase {
            Phase::Before => self.offset_before,
            Phase::After => self.offset_after,
        };
        base + position * self.slot_bytes
    }
}
