//! Run command.

use std::path::Path;

use tracing::info;
use xtr::{Code, Gp, Machine, Phase, Trace, TracerConfig};

use crate::cli::TracerArgs;
use crate::commands::pipeline;
use crate::terminal::{self, Alignment, Table};

/// Handle the `run` command.
pub fn cmd_run(
    input: &Path,
    args: &TracerArgs,
    native: bool,
    regs: &[(Gp, u64)],
    max_steps: u64,
) -> xtr::Result<()> {
    let pipeline = pipeline(input, args)?;
    let config = pipeline.tracer().config();

    let trace = if native {
        if !regs.is_empty() {
            terminal::warning("--reg only applies to the interpreter");
        }
        run_native(&pipeline)?
    } else {
        let mut machine = Machine::new().with_max_steps(max_steps);
        for &(reg, value) in regs {
            machine.set_reg(reg, value);
        }
        let run = pipeline.run_sim(&mut machine)?;
        info!(exit = ?run.exit.reason, steps = run.exit.steps, "program finished");
        run.trace
    };

    trace_table(&trace, pipeline.code(), config).print();

    let recorded = trace.cursor();
    if recorded > trace.capacity() as u64 {
        terminal::warning(&format!(
            "{recorded} states recorded but capacity is {}; the rest were dropped, rerun with --capacity {recorded}",
            trace.capacity()
        ));
    } else {
        terminal::success(&format!("{recorded} states recorded"));
    }
    Ok(())
}

#[cfg(target_arch = "x86_64")]
fn run_native(pipeline: &xtr::Pipeline) -> xtr::Result<Trace> {
    terminal::info("executing natively");
    // The user opted in with --native; the listing is trusted to behave as a function.
    unsafe { pipeline.run_native() }
}

#[cfg(not(target_arch = "x86_64"))]
fn run_native(_pipeline: &xtr::Pipeline) -> xtr::Result<Trace> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "native execution needs an x86-64 host",
    )
    .into())
}

/// One row per recorded state. Snapshots a line was not captured for show `-`.
fn trace_table(trace: &Trace, code: &Code, config: &TracerConfig) -> Table {
    let mut headers = vec!["slot".to_string(), "line".to_string(), "instruction".to_string()];
    for phase in ["before", "after"] {
        for reg in &config.regs {
            headers.push(format!("{phase} {reg}"));
        }
    }
    let mut alignments = vec![Alignment::Right, Alignment::Right, Alignment::Left];
    alignments.resize(headers.len(), Alignment::Right);
    let mut table = Table::new(headers).with_alignments(alignments);

    for (slot, state) in trace.states().iter().enumerate() {
        let line = usize::try_from(state.line).ok();
        let instr = line
            .and_then(|l| code.get(l))
            .map_or_else(|| "?".to_string(), ToString::to_string);
        let mut row = vec![slot.to_string(), state.line.to_string(), instr];
        for (phase, captured) in [(Phase::Before, &config.before), (Phase::After, &config.after)] {
            let shown = line.is_some_and(|l| captured.contains(&l));
            for position in 0..config.regs.len() {
                row.push(if shown {
                    format!("{:#x}", state.value(phase, position))
                } else {
                    "-".to_string()
                });
            }
        }
        table.add_row(row);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use xtr::{Pipeline, SIM_BUFFER};

    #[test]
    fn test_trace_table() {
        let code: Code = "movq $5, %rax\nmovq $7, %rcx\naddq %rcx, %rax".parse().unwrap();
        let config = TracerConfig::default()
            .with_regs([Gp::Rax, Gp::Rcx])
            .with_before([0, 2])
            .with_after([2]);
        let pipeline = Pipeline::new(code, config).unwrap();
        let run = pipeline.run_sim(&mut Machine::new()).unwrap();
        assert_eq!(pipeline.sim_addrs().buffer, SIM_BUFFER);

        let rendered = trace_table(&run.trace, pipeline.code(), pipeline.tracer().config()).render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("before %rax"));
        assert!(lines[0].contains("after %rcx"));

        let cells = |line: &str| -> Vec<String> {
            line.split('|').map(|c| c.trim().to_string()).filter(|c| !c.is_empty()).collect()
        };
        assert_eq!(cells(lines[2]), ["0", "0", "movq $5, %rax", "0x0", "0x0", "-", "-"]);
        assert_eq!(cells(lines[3]), ["1", "2", "addq %rcx, %rax", "0x5", "0x7", "0xc", "0x7"]);
    }
}
