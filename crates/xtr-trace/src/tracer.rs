//! Instrumented trace generation.
//!
//! For each line `i` of the program, in order:
//!
//! 1. `i` in `before`: snapshot the tracked registers into the state at the cursor.
//! 2. `i` in `before` or `after`: write `i` into that state's `line` and bump the cursor.
//! 3. The original instruction.
//! 4. `i` in `after`: snapshot into the state just recorded (cursor - 1).
//!
//! Stores are skipped once the target slot is at or past the capacity baked
//! in at [`TRACE_CAPACITY`]. The cursor keeps counting, so a cursor above
//! capacity after a run means states were dropped.
//!
//! An instrumented label definition is emitted first, so jumps to the label
//! run its instrumentation too. Labels have no effect of their own, so its
//! before and after snapshots are equal.

use tracing::{debug, info_span};
use xtr_asm::{Assembler, Emit, Function, Listing, Recorder};
use xtr_code::{Code, Cond, Gp, Imm, Instruction, Label, Mem};

use crate::config::TracerConfig;
use crate::error::{Result, TraceError};
use crate::layout::{MAX_TRACKED, Phase, StateLayout};
use crate::preserve::{Frame, preserve};
use crate::trace::{TRACE_BUFFER, TRACE_CAPACITY, TRACE_CURSOR, TraceAddrs};

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
const fn disp(offset: usize) -> i32 {
    offset as i32
}

/// Local labels for the overflow branches.
#[derive(Default)]
struct Skips(usize);

impl Skips {
    fn next(&mut self) -> Label {
        self.0 += 1;
        Label::new(format!(".Lxtr_skip{}", self.0))
    }
}

/// Emits programs instrumented according to a [`TracerConfig`].
#[derive(Clone, Debug)]
pub struct Tracer {
    config: TracerConfig,
    layout: StateLayout,
}

impl Tracer {
    /// # Errors
    ///
    /// Fails if more than [`MAX_TRACKED`] registers are tracked or a
    /// register appears twice.
    pub fn new(config: TracerConfig) -> Result<Self> {
        if config.regs.len() > MAX_TRACKED {
            return Err(TraceError::TooManyRegisters(config.regs.len()));
        }
        let mut seen = [false; Gp::COUNT];
        for &reg in &config.regs {
            if std::mem::replace(&mut seen[reg.index()], true) {
                return Err(TraceError::DuplicateRegister(reg));
            }
        }
        Ok(Self {
            config,
            layout: StateLayout::CURRENT,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &TracerConfig {
        &self.config
    }

    /// Check that `code` and `target` can be instrumented.
    ///
    /// # Errors
    ///
    /// Fails if an instrumented line is past the end of `code` or the trace
    /// is too small to hold one state per instrumented line.
    pub fn validate(&self, target: &TraceAddrs, code: &Code) -> Result<()> {
        let len = code.len();
        if let Some(&index) = self
            .config
            .before
            .iter()
            .chain(&self.config.after)
            .find(|&&i| i >= len)
        {
            return Err(TraceError::IndexOutOfRange { index, len });
        }
        let needed = self.config.states_needed();
        if needed > target.capacity {
            return Err(TraceError::CapacityExceeded {
                needed,
                capacity: target.capacity,
            });
        }
        Ok(())
    }

    /// Emit `code` into `sink` with instrumentation writing into `target`.
    ///
    /// Nothing is emitted when validation fails. If the sink fails midway,
    /// its partial function is discarded by the next `start`.
    ///
    /// # Errors
    ///
    /// Validation errors from [`Tracer::validate`], or any sink error.
    pub fn trace<E: Emit>(&self, sink: &mut E, target: &TraceAddrs, code: &Code) -> Result<E::Output> {
        let _span = info_span!(
            "trace",
            lines = code.len(),
            regs = self.config.regs.len(),
            states = self.config.states_needed()
        )
        .entered();

        self.validate(target, code)?;

        sink.start();
        let mut skips = Skips::default();
        for (line, instr) in code.iter().enumerate() {
            let before = self.config.before.contains(&line);
            let after = self.config.after.contains(&line);
            if before || after {
                debug!(line, before, after, %instr, "instrumenting");
            }

            if instr.is_label() {
                sink.assemble(instr)?;
            }
            if before {
                self.snapshot(sink, target, Phase::Before, &skips.next())?;
            }
            if before || after {
                self.record_line(sink, target, line, &skips.next())?;
            }
            if !instr.is_label() {
                sink.assemble(instr)?;
            }
            if after {
                self.snapshot(sink, target, Phase::After, &skips.next())?;
            }
        }
        Ok(sink.finish()?)
    }

    /// Instrument and encode `code`.
    ///
    /// # Errors
    ///
    /// See [`Tracer::trace`].
    pub fn assemble(&self, target: &TraceAddrs, code: &Code) -> Result<Function> {
        self.trace(&mut Assembler::new(), target, code)
    }

    /// Instrument `code`, keeping the emitted instructions.
    ///
    /// # Errors
    ///
    /// See [`Tracer::trace`].
    pub fn listing(&self, target: &TraceAddrs, code: &Code) -> Result<Listing> {
        self.trace(&mut Recorder::new(), target, code)
    }

    /// Point a function previously instrumented for `code` at another trace.
    /// Returns the number of patched sites.
    ///
    /// # Errors
    ///
    /// Fails if `target` is too small for `code`.
    pub fn rebind(&self, function: &mut Function, target: &TraceAddrs, code: &Code) -> Result<usize> {
        self.validate(target, code)?;
        Ok(function.rebind(TRACE_BUFFER, target.buffer)
            + function.rebind(TRACE_CURSOR, target.cursor)
            + function.rebind(TRACE_CAPACITY, target.capacity as u64))
    }

    /// Leave the address of the state a phase writes into in `%rbx`: the
    /// state at the cursor for [`Phase::Before`], the one just recorded for
    /// [`Phase::After`]. Jumps to `skip` if that slot is outside the trace.
    /// Clobbers `%rax` and the flags.
    fn slot_address<E: Emit>(
        &self,
        sink: &mut E,
        target: &TraceAddrs,
        phase: Phase,
        skip: &Label,
    ) -> Result<()> {
        sink.load_abs(Gp::Rax, TRACE_CURSOR, target.cursor)?;
        sink.load(Gp::Rax, Mem::base(Gp::Rax))?;
        if phase == Phase::After {
            sink.dec(Gp::Rax)?;
        }
        // Unsigned, so an after-snapshot with nothing recorded skips too.
        sink.load_abs(Gp::Rbx, TRACE_CAPACITY, target.capacity as u64)?;
        sink.cmp(Gp::Rax, Gp::Rbx)?;
        sink.jcc(Cond::Ae, skip)?;
        sink.mov_imm(Gp::Rbx, i64::from(disp(self.layout.size)))?;
        sink.imul(Gp::Rbx, Gp::Rax)?;
        sink.load_abs(Gp::Rax, TRACE_BUFFER, target.buffer)?;
        sink.add(Gp::Rbx, Gp::Rax)?;
        Ok(())
    }

    /// Copy every tracked register into the `phase` array of the target state.
    fn snapshot<E: Emit>(
        &self,
        sink: &mut E,
        target: &TraceAddrs,
        phase: Phase,
        skip: &Label,
    ) -> Result<()> {
        preserve(sink, &self.config, |sink, Frame { bytes }| {
            let mut depth = bytes;
            for &reg in &self.config.regs {
                // %rax and %rbx still hold the program's values here.
                sink.push(reg)?;
                if reg == Gp::Rsp {
                    // The pushed value is the program's %rsp minus the depth
                    // before this push.
                    sink.add(Mem::base(Gp::Rsp), Imm(i64::from(depth)))?;
                }
                depth += 8;
            }

            self.slot_address(sink, target, phase, skip)?;

            let count = self.config.regs.len();
            for position in (0..count).rev() {
                let offset = disp(self.layout.field_offset(phase, position));
                sink.pop(Gp::Rax)?;
                sink.store(Mem::base_disp(Gp::Rbx, offset), Gp::Rax)?;
            }
            if count == 0 {
                sink.bind(skip)?;
                return Ok(());
            }
            // Out of range: drop the pushed values instead of storing them.
            let done = Label::new(format!("{}.done", skip.name()));
            sink.jmp(&done)?;
            sink.bind(skip)?;
            sink.lea(Gp::Rsp, Mem::base_disp(Gp::Rsp, disp(count * 8)))?;
            sink.bind(&done)?;
            Ok(())
        })
    }

    /// Write `line` into the state at the cursor and advance the cursor.
    fn record_line<E: Emit>(
        &self,
        sink: &mut E,
        target: &TraceAddrs,
        line: usize,
        skip: &Label,
    ) -> Result<()> {
        preserve(sink, &self.config, |sink, _| {
            self.slot_address(sink, target, Phase::Before, skip)?;
            let field = Mem::base_disp(Gp::Rbx, disp(self.layout.offset_line));
            if let Ok(small) = i32::try_from(line) {
                sink.mov(field, Imm(i64::from(small)))?;
            } else {
                sink.assemble(&Instruction::movabs(Gp::Rax, line as u64))?;
                sink.store(field, Gp::Rax)?;
            }
            sink.bind(skip)?;
            sink.load_abs(Gp::Rax, TRACE_CURSOR, target.cursor)?;
            sink.inc(Mem::base(Gp::Rax))?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FlagSave;
    use xtr_asm::AsmError;

    const TARGET: TraceAddrs = TraceAddrs::new(0x10_0000, 0x20_0000, 4);

    fn code(src: &str) -> Code {
        src.parse().unwrap()
    }

    #[test]
    fn test_rejects_bad_register_sets() {
        let dup = TracerConfig::default().with_regs([Gp::Rax, Gp::Rbx, Gp::Rax]);
        assert!(matches!(
            Tracer::new(dup),
            Err(TraceError::DuplicateRegister(Gp::Rax))
        ));

        let many = TracerConfig::default().with_regs(Gp::ALL.into_iter().chain([Gp::Rax]));
        assert!(matches!(
            Tracer::new(many),
            Err(TraceError::TooManyRegisters(17))
        ));

        assert!(Tracer::new(TracerConfig::default().with_regs(Gp::ALL)).is_ok());
        assert!(Tracer::new(TracerConfig::default()).is_ok());
    }

    #[test]
    fn test_validation_precedes_emission() {
        let program = code("movq $1, %rax\nretq");

        let tracer = Tracer::new(TracerConfig::default().with_after([2])).unwrap();
        let mut rec = Recorder::new();
        assert!(matches!(
            tracer.trace(&mut rec, &TARGET, &program),
            Err(TraceError::IndexOutOfRange { index: 2, len: 2 })
        ));
        // The sink was never started.
        assert!(matches!(rec.finish(), Err(AsmError::NotStarted)));

        let tracer = Tracer::new(TracerConfig::default().with_before([0]).with_after([1])).unwrap();
        let small = TraceAddrs::new(0x10_0000, 0x20_0000, 1);
        assert!(matches!(
            tracer.listing(&small, &program),
            Err(TraceError::CapacityExceeded {
                needed: 2,
                capacity: 1
            })
        ));
    }

    #[test]
    fn test_empty_capture_sets_pass_through() {
        let program = code("top:\nmovq $1, %rax\ndecq %rax\njne top\nretq");
        let tracer = Tracer::new(TracerConfig::default().with_regs([Gp::Rax])).unwrap();
        let listing = tracer.listing(&TraceAddrs::new(0, 0, 0), &program).unwrap();
        assert_eq!(listing.code, program);
        assert!(listing.sites.is_empty());
    }

    #[test]
    fn test_before_snapshot_listing() {
        let tracer = Tracer::new(
            TracerConfig::default()
                .with_regs([Gp::Rcx])
                .with_before([0])
                .with_red_zone(false),
        )
        .unwrap();
        let listing = tracer.listing(&TARGET, &code("movq $1, %rcx")).unwrap();
        let expected = "\
pushq %rax
pushq %rbx
pushfq
pushq %rcx
movabsq $0x200000, %rax
movq (%rax), %rax
movabsq $4, %rbx
cmpq %rbx, %rax
jae .Lxtr_skip1
movq $264, %rbx
imulq %rax, %rbx
movabsq $0x100000, %rax
addq %rax, %rbx
popq %rax
movq %rax, 8(%rbx)
jmp .Lxtr_skip1.done
.Lxtr_skip1:
leaq 8(%rsp), %rsp
.Lxtr_skip1.done:
popfq
popq %rbx
popq %rax
pushq %rax
pushq %rbx
pushfq
movabsq $0x200000, %rax
movq (%rax), %rax
movabsq $4, %rbx
cmpq %rbx, %rax
jae .Lxtr_skip2
movq $264, %rbx
imulq %rax, %rbx
movabsq $0x100000, %rax
addq %rax, %rbx
movq $0, (%rbx)
.Lxtr_skip2:
movabsq $0x200000, %rax
incq (%rax)
popfq
popq %rbx
popq %rax
movq $1, %rcx
";
        assert_eq!(listing.code.to_string(), expected);
        assert_eq!(listing.sites.len(), 7);
        assert_eq!(listing.function.patch_sites().len(), 7);
    }

    #[test]
    fn test_after_snapshot_targets_previous_state() {
        let tracer = Tracer::new(
            TracerConfig::default()
                .with_regs([Gp::Rdx, Gp::Rsi])
                .with_after([0]),
        )
        .unwrap();
        let text = tracer
            .listing(&TARGET, &code("movq $1, %rdx"))
            .unwrap()
            .code
            .to_string();
        let after = &text[text.find("movq $1, %rdx").unwrap()..];
        assert!(after.contains("movq (%rax), %rax\ndecq %rax\n"));
        // Popped in reverse order into their configured positions.
        assert!(after.contains("popq %rax\nmovq %rax, 144(%rbx)\npopq %rax\nmovq %rax, 136(%rbx)\n"));
    }

    #[test]
    fn test_tracked_rsp_is_corrected() {
        let tracer = Tracer::new(
            TracerConfig::default()
                .with_regs([Gp::Rax, Gp::Rsp])
                .with_before([0])
                .with_flag_save(FlagSave::Lahf),
        )
        .unwrap();
        let text = tracer.listing(&TARGET, &code("nop")).unwrap().code.to_string();
        // 128 red zone + rax + rbx + flags + tracked rax
        assert!(text.contains("pushq %rsp\naddq $160, (%rsp)\n"));
    }

    #[test]
    fn test_rebind() {
        let program = code("movq $1, %rax\nretq");
        let tracer = Tracer::new(
            TracerConfig::default()
                .with_regs([Gp::Rax])
                .with_before([0])
                .with_after([1]),
        )
        .unwrap();
        let mut function = tracer.assemble(&TARGET, &program).unwrap();
        let other = TraceAddrs::new(0x30_0000, 0x40_0000, 2);
        // 2 snapshots and 2 line records, three sites each plus one for the cursor bump.
        assert_eq!(tracer.rebind(&mut function, &other, &program).unwrap(), 14);

        let fresh = tracer.assemble(&other, &program).unwrap();
        assert_eq!(function.bytes(), fresh.bytes());

        let tiny = TraceAddrs::new(0x30_0000, 0x40_0000, 1);
        assert!(matches!(
            tracer.rebind(&mut function, &tiny, &program),
            Err(TraceError::CapacityExceeded { .. })
        ));
    }

    #[test]
    fn test_wide_line_numbers_use_movabs() {
        let tracer = Tracer::new(TracerConfig::default().with_red_zone(false)).unwrap();
        let mut rec = Recorder::new();
        rec.start();
        tracer
            .record_line(&mut rec, &TARGET, 1 << 40, &Label::new("skip"))
            .unwrap();
        let text = rec.finish().unwrap().code.to_string();
        assert!(text.contains("addq %rax, %rbx\nmovabsq $0x10000000000, %rax\nmovq %rax, (%rbx)\nskip:\n"));
    }

    #[test]
    fn test_untracked_snapshot_binds_skip_only() {
        let tracer = Tracer::new(TracerConfig::default().with_after([0]).with_red_zone(false)).unwrap();
        let text = tracer.listing(&TARGET, &code("nop")).unwrap().code.to_string();
        assert!(text.contains("jae .Lxtr_skip2\nmovq $264, %rbx\nimulq %rax, %rbx\nmovabsq $0x100000, %rax\naddq %rax, %rbx\n.Lxtr_skip2:\npopfq\n"));
        assert!(!text.contains("jmp"));
    }
}
