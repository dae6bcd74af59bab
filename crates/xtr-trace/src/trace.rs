//! Caller-owned trace buffer.

use xtr_asm::Reloc;

use crate::layout::{MAX_TRACKED, Phase, StateLayout};

/// Patch sites holding the address of the first [`State`].
pub const TRACE_BUFFER: Reloc = Reloc::new("trace.buffer");
/// Patch sites holding the address of the cursor.
pub const TRACE_CURSOR: Reloc = Reloc::new("trace.cursor");
/// Patch sites holding the number of states at the buffer.
pub const TRACE_CAPACITY: Reloc = Reloc::new("trace.capacity");

/// One instrumented line.
///
/// `before[k]` and `after[k]` hold the register at position `k` of the
/// tracked set. Arrays the line was not instrumented for are left unwritten.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct State {
    pub line: u64,
    pub before: [u64; MAX_TRACKED],
    pub after: [u64; MAX_TRACKED],
}

impl State {
    #[must_use]
    pub const fn value(&self, phase: Phase, position: usize) -> u64 {
        match phase {
            Phase::Before => self.before[position],
            Phase::After => self.after[position],
        }
    }
}

/// Runtime addresses of a trace, as baked into generated code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TraceAddrs {
    /// Address of the first state.
    pub buffer: u64,
    /// Address of the `u64` cursor.
    pub cursor: u64,
    /// Number of states at `buffer`.
    pub capacity: usize,
}

impl TraceAddrs {
    /// Describe a trace that lives somewhere other than this process, such
    /// as in simulated memory.
    #[must_use]
    pub const fn new(buffer: u64, cursor: u64, capacity: usize) -> Self {
        Self {
            buffer,
            cursor,
            capacity,
        }
    }

    /// Address of state `slot`.
    #[must_use]
    pub const fn state(&self, slot: usize) -> u64 {
        self.buffer + (slot * StateLayout::CURRENT.size) as u64
    }
}

/// Fixed-capacity array of [`State`]s plus the cursor counting how many are
/// populated.
///
/// The states and the cursor sit in separate heap allocations that never
/// move, so the addresses from [`Trace::addrs`] stay valid for the life of
/// the trace. Instrumented code updates the cursor with a plain
/// read-modify-write: running it on several threads at once, or reentrantly,
/// against the same trace is not supported.
#[derive(Debug)]
pub struct Trace {
    states: Box<[State]>,
    cursor: Box<u64>,
}

impl Trace {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            states: vec![State::default(); capacity].into_boxed_slice(),
            cursor: Box::new(0),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.states.len()
    }

    /// Raw cursor value as left by instrumented code. Above
    /// [`Trace::capacity`] when states were dropped.
    #[must_use]
    pub fn cursor(&self) -> u64 {
        *self.cursor
    }

    /// Number of populated states.
    #[must_use]
    pub fn len(&self) -> usize {
        usize::try_from(*self.cursor).map_or(self.capacity(), |n| n.min(self.capacity()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Populated states, in the order they were recorded.
    #[must_use]
    pub fn states(&self) -> &[State] {
        &self.states[..self.len()]
    }

    #[must_use]
    pub fn get(&self, slot: usize) -> Option<&State> {
        self.states().get(slot)
    }

    /// Addresses for instrumented code to write through.
    ///
    /// Takes `&mut self` so no shared borrow of the trace can be held while
    /// code using these addresses runs.
    pub fn addrs(&mut self) -> TraceAddrs {
        TraceAddrs {
            buffer: self.states.as_mut_ptr() as u64,
            cursor: std::ptr::from_mut(&mut *self.cursor) as u64,
            capacity: self.states.len(),
        }
    }

    /// Zero every state and the cursor.
    pub fn reset(&mut self) {
        self.states.fill(State::default());
        *self.cursor = 0;
    }

    /// Rebuild a trace from memory described by `addrs`, reading one
    /// little-endian `u64` at a time.
    pub fn from_image(addrs: &TraceAddrs, mut read_u64: impl FnMut(u64) -> u64) -> Self {
        let layout = StateLayout::CURRENT;
        let word = |slot: usize, offset: usize| addrs.state(slot) + offset as u64;

        let mut trace = Self::with_capacity(addrs.capacity);
        for (slot, state) in trace.states.iter_mut().enumerate() {
            state.line = read_u64(word(slot, layout.offset_line));
            for k in 0..MAX_TRACKED {
                state.before[k] = read_u64(word(slot, layout.field_offset(Phase::Before, k)));
                state.after[k] = read_u64(word(slot, layout.field_offset(Phase::After, k)));
            }
        }
        *trace.cursor = read_u64(addrs.cursor);
        trace
    }
}
