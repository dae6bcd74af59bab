//! Tracer configuration.

use std::collections::BTreeSet;

use xtr_code::Gp;

/// How instrumentation saves RFLAGS around itself.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FlagSave {
    /// `pushfq`/`popfq`. Restores every flag.
    #[default]
    Pushf,
    /// `lahf`/`sahf` through `%ah`. Restores SF, ZF, AF, PF and CF but not OF.
    Lahf,
}

/// What to capture and where.
#[derive(Clone, Debug)]
pub struct TracerConfig {
    /// Tracked registers; position in this list is the slot index.
    pub regs: Vec<Gp>,
    /// Lines whose state is captured before they execute.
    pub before: BTreeSet<usize>,
    /// Lines whose state is captured after they execute.
    pub after: BTreeSet<usize>,
    pub flag_save: FlagSave,
    /// Step over the 128-byte red zone below `%rsp` before pushing anything.
    pub red_zone: bool,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            regs: Vec::new(),
            before: BTreeSet::new(),
            after: BTreeSet::new(),
            flag_save: FlagSave::Pushf,
            red_zone: true,
        }
    }
}

impl TracerConfig {
    #[must_use]
    pub fn with_regs(mut self, regs: impl IntoIterator<Item = Gp>) -> Self {
        self.regs = regs.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_before(mut self, lines: impl IntoIterator<Item = usize>) -> Self {
        self.before = lines.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_after(mut self, lines: impl IntoIterator<Item = usize>) -> Self {
        self.after = lines.into_iter().collect();
        self
    }

    #[must_use]
    pub const fn with_flag_save(mut self, flag_save: FlagSave) -> Self {
        self.flag_save = flag_save;
        self
    }

    #[must_use]
    pub const fn with_red_zone(mut self, enabled: bool) -> Self {
        self.red_zone = enabled;
        self
    }

    /// Lines that get a state, ascending.
    pub fn lines(&self) -> impl Iterator<Item = usize> + '_ {
        self.before.union(&self.after).copied()
    }

    /// Number of states one pass through every instrumented line records.
    #[must_use]
    pub fn states_needed(&self) -> usize {
        self.lines().count()
    }

    #[must_use]
    pub fn is_instrumented(&self, line: usize) -> bool {
        self.before.contains(&line) || self.after.contains(&line)
    }
}
