//! Command implementations.

mod run;

use std::path::Path;

use tracing::error;
use xtr::{Assembler, Emit, Function, Pipeline};

use crate::cli::{Cli, Commands, EXIT_FAILURE, EXIT_SUCCESS, TracerArgs};
use crate::terminal;

/// Dispatch CLI command to the appropriate handler.
pub fn run_command(cli: &Cli) -> i32 {
    let result = match &cli.command {
        Commands::Fmt { input } => cmd_fmt(input),
        Commands::Asm { input } => cmd_asm(input),
        Commands::Instrument { input, tracer } => cmd_instrument(input, tracer),
        Commands::Run {
            input,
            tracer,
            native,
            regs,
            max_steps,
        } => run::cmd_run(input, tracer, *native, regs, *max_steps),
    };
    match result {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            terminal::error(&e.to_string());
            EXIT_FAILURE
        }
    }
}

fn cmd_fmt(input: &Path) -> xtr::Result<()> {
    let code = xtr::load(input)?;
    print!("{code}");
    Ok(())
}

/// Assemble a listing without instrumentation.
pub fn assemble(code: &xtr::Code) -> xtr::Result<Function> {
    let mut asm = Assembler::new();
    asm.start();
    for instr in code {
        asm.assemble(instr)?;
    }
    Ok(asm.finish()?)
}

fn cmd_asm(input: &Path) -> xtr::Result<()> {
    let code = xtr::load(input)?;
    let function = assemble(&code)?;
    print!("{function}");
    terminal::success(&format!(
        "{} instructions, {} bytes",
        code.len(),
        function.len()
    ));
    Ok(())
}

/// Build the pipeline shared by `instrument` and `run`.
pub fn pipeline(input: &Path, args: &TracerArgs) -> xtr::Result<Pipeline> {
    let pipeline = Pipeline::from_path(input, args.to_config())?;
    Ok(match args.capacity {
        Some(capacity) => pipeline.with_capacity(capacity),
        None => pipeline,
    })
}

fn cmd_instrument(input: &Path, args: &TracerArgs) -> xtr::Result<()> {
    let pipeline = pipeline(input, args)?;
    let listing = pipeline.listing()?;
    print!("{}", listing.code);

    if args.track.is_empty() && pipeline.tracer().config().states_needed() > 0 {
        terminal::warning("no registers tracked; states will only record lines");
    }
    terminal::info(&format!(
        "{} -> {} instructions, {} bytes, {} patch sites",
        pipeline.code().len(),
        listing.code.len(),
        listing.function.len(),
        listing.sites.len()
    ));
    Ok(())
}
