//! Load, instrument and run a listing.

use std::path::Path;

use tracing::{debug, info};
use xtr_asm::{Function, Listing};
use xtr_code::Code;
use xtr_sim::{Exit, Machine};
use xtr_trace::{Trace, TraceAddrs, Tracer, TracerConfig};

use crate::error::Result;

/// Where the trace lives in simulated memory.
pub const SIM_BUFFER: u64 = 0x1000_0000;
/// Where the cursor lives in simulated memory.
pub const SIM_CURSOR: u64 = 0x0fff_f000;

/// Read and parse an AT&T listing.
///
/// # Errors
///
/// Fails if the file cannot be read or does not parse.
pub fn load(path: &Path) -> Result<Code> {
    let source = std::fs::read_to_string(path)?;
    let code: Code = source.parse()?;
    debug!(path = %path.display(), instructions = code.len(), "loaded listing");
    Ok(code)
}

/// Result of running instrumented code in the interpreter.
#[derive(Debug)]
pub struct SimRun {
    pub trace: Trace,
    pub exit: Exit,
}

/// A program together with the tracer that instruments it.
#[derive(Debug)]
pub struct Pipeline {
    code: Code,
    tracer: Tracer,
    capacity: usize,
}

impl Pipeline {
    /// The trace capacity defaults to one state per instrumented line.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is rejected by [`Tracer::new`] or does not
    /// fit `code`.
    pub fn new(code: Code, config: TracerConfig) -> Result<Self> {
        let capacity = config.states_needed();
        let tracer = Tracer::new(config)?;
        tracer.validate(&TraceAddrs::new(SIM_BUFFER, SIM_CURSOR, capacity), &code)?;
        Ok(Self {
            code,
            tracer,
            capacity,
        })
    }

    /// Load `path` and build a pipeline for it.
    ///
    /// # Errors
    ///
    /// See [`load`] and [`Pipeline::new`].
    pub fn from_path(path: &Path, config: TracerConfig) -> Result<Self> {
        Self::new(load(path)?, config)
    }

    /// Room for more states than there are instrumented lines, for lines
    /// that execute more than once. Without it, later passes are counted by
    /// the cursor but not stored.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = self.capacity.max(capacity);
        self
    }

    #[must_use]
    pub const fn code(&self) -> &Code {
        &self.code
    }

    #[must_use]
    pub const fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Trace addresses used for simulation and for printed listings.
    #[must_use]
    pub const fn sim_addrs(&self) -> TraceAddrs {
        TraceAddrs::new(SIM_BUFFER, SIM_CURSOR, self.capacity)
    }

    /// Instrumented instruction stream, addressed at the simulated trace.
    ///
    /// # Errors
    ///
    /// Fails if the instrumented program cannot be encoded.
    pub fn listing(&self) -> Result<Listing> {
        Ok(self.tracer.listing(&self.sim_addrs(), &self.code)?)
    }

    /// Encoded instrumented function, addressed at the simulated trace.
    ///
    /// # Errors
    ///
    /// Fails if the instrumented program cannot be encoded.
    pub fn assemble(&self) -> Result<Function> {
        Ok(self.tracer.assemble(&self.sim_addrs(), &self.code)?)
    }

    /// Run the instrumented program on `machine` and read back its trace.
    ///
    /// # Errors
    ///
    /// Fails if instrumentation fails or the interpreter stops with an error.
    pub fn run_sim(&self, machine: &mut Machine) -> Result<SimRun> {
        let addrs = self.sim_addrs();
        let listing = self.tracer.listing(&addrs, &self.code)?;
        let exit = machine.run(&listing.code)?;
        let trace = Trace::from_image(&addrs, |a| machine.read_u64(a));
        info!(steps = exit.steps, states = trace.cursor(), "simulation finished");
        if trace.cursor() > self.capacity as u64 {
            tracing::warn!(
                recorded = trace.cursor(),
                capacity = self.capacity,
                "trace overflowed; states past capacity were dropped"
            );
        }
        Ok(SimRun { trace, exit })
    }

    /// Assemble, map and call the instrumented program on this CPU.
    ///
    /// # Errors
    ///
    /// Fails if instrumentation fails or the code cannot be mapped.
    ///
    /// # Safety
    ///
    /// The program runs as an `extern "sysv64" fn()`. It must return with
    /// `retq`, keep the stack balanced, leave callee-saved registers intact
    /// and only touch memory it owns. States past the capacity are dropped,
    /// not written.
    #[cfg(target_arch = "x86_64")]
    pub unsafe fn run_native(&self) -> Result<Trace> {
        let mut trace = Trace::with_capacity(self.capacity);
        let function = self.tracer.assemble(&trace.addrs(), &self.code)?;
        let exec = function.load()?;
        unsafe { exec.call() };
        info!(states = trace.cursor(), "native run finished");
        Ok(trace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xtr_code::Gp;
    use xtr_sim::ExitReason;
    use xtr_trace::TraceError;

    use crate::Error;

    fn sum_loop() -> Code {
        "movq $0, %rax
movq $3, %rcx
top:
addq %rcx, %rax
decq %rcx
jne top
retq"
            .parse()
            .unwrap()
    }

    #[test]
    fn test_capacity_defaults_to_instrumented_lines() {
        let config = TracerConfig::default().with_before([0, 3]).with_after([3]);
        let pipeline = Pipeline::new(sum_loop(), config).unwrap();
        assert_eq!(pipeline.capacity(), 2);
        assert_eq!(pipeline.with_capacity(1).capacity(), 2);
    }

    #[test]
    fn test_rejects_out_of_range_lines_early() {
        let config = TracerConfig::default().with_after([7]);
        assert!(matches!(
            Pipeline::new(sum_loop(), config),
            Err(Error::Trace(TraceError::IndexOutOfRange { index: 7, len: 7 }))
        ));
    }

    #[test]
    fn test_sim_run_records_every_iteration() {
        let config = TracerConfig::default()
            .with_regs([Gp::Rax, Gp::Rcx])
            .with_after([3]);
        let pipeline = Pipeline::new(sum_loop(), config).unwrap().with_capacity(3);
        let run = pipeline.run_sim(&mut Machine::new()).unwrap();

        assert_eq!(run.exit.reason, ExitReason::Ret);
        let after: Vec<[u64; 2]> = run
            .trace
            .states()
            .iter()
            .map(|s| [s.after[0], s.after[1]])
            .collect();
        assert_eq!(after, [[3, 3], [5, 2], [6, 1]]);
    }

    #[test]
    fn test_sim_run_past_capacity_keeps_first_states() {
        let config = TracerConfig::default().with_regs([Gp::Rcx]).with_before([3]);
        let pipeline = Pipeline::new(sum_loop(), config).unwrap();
        let run = pipeline.run_sim(&mut Machine::new()).unwrap();
        assert_eq!(run.exit.reason, ExitReason::Ret);
        assert_eq!(run.trace.cursor(), 3);
        assert_eq!(run.trace.len(), 1);
        assert_eq!(run.trace.states()[0].before[0], 3);
    }

    #[cfg(all(target_arch = "x86_64", target_os = "linux"))]
    #[test]
    fn test_native_run_past_capacity() {
        let config = TracerConfig::default().with_regs([Gp::Rcx]).with_before([3]);
        let pipeline = Pipeline::new(sum_loop(), config).unwrap();
        assert_eq!(pipeline.capacity(), 1);
        let trace = unsafe { pipeline.run_native() }.unwrap();
        assert_eq!(trace.cursor(), 3);
        assert_eq!(trace.states()[0].before[0], 3);
    }

    #[test]
    fn test_listing_uses_sim_addresses() {
        let config = TracerConfig::default().with_before([0]);
        let listing = Pipeline::new(sum_loop(), config).unwrap().listing().unwrap();
        assert!(listing.sites.iter().any(|s| s.value == SIM_BUFFER));
        assert!(listing.sites.iter().any(|s| s.value == SIM_CURSOR));
    }
}
