//! CLI definitions and argument types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use xtr::{FlagSave, Gp, TracerConfig, Width};

/// Exit code for success.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for failure.
pub const EXIT_FAILURE: i32 = 1;

#[derive(Parser)]
#[command(name = "xtr")]
#[command(about = "x86-64 assembler and register-trace instrumenter")]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output (only show errors)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub silent: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print a listing in canonical AT&T form
    Fmt {
        /// Input listing
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
    /// Assemble a listing and hex-dump the machine code
    Asm {
        /// Input listing
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
    /// Print the instrumented listing
    Instrument {
        /// Input listing
        #[arg(value_name = "FILE")]
        input: PathBuf,

        #[command(flatten)]
        tracer: TracerArgs,
    },
    /// Run the instrumented listing and print the recorded trace
    Run {
        /// Input listing
        #[arg(value_name = "FILE")]
        input: PathBuf,

        #[command(flatten)]
        tracer: TracerArgs,

        /// Execute on this CPU instead of the interpreter. The listing must
        /// behave as a function: balanced stack, callee-saved registers kept,
        /// ends in retq.
        #[arg(long)]
        native: bool,

        /// Initial register value for the interpreter (e.g. rax=5, rdi=0x1000)
        #[arg(long = "reg", value_name = "REG=VALUE", value_parser = parse_assignment)]
        regs: Vec<(Gp, u64)>,

        /// Interpreter step limit
        #[arg(long, default_value = "1000000")]
        max_steps: u64,
    },
}

/// Tracer options shared by `instrument` and `run`.
#[derive(Args, Clone, Debug, Default)]
pub struct TracerArgs {
    /// Registers to capture, in slot order (e.g. rax,rcx)
    #[arg(long, value_delimiter = ',', value_parser = parse_reg)]
    pub track: Vec<Gp>,

    /// Lines to capture before they execute
    #[arg(long, value_delimiter = ',')]
    pub before: Vec<usize>,

    /// Lines to capture after they execute
    #[arg(long, value_delimiter = ',')]
    pub after: Vec<usize>,

    /// How instrumentation saves the flags
    #[arg(long = "flags", value_enum, default_value = "pushf")]
    pub flag_save: FlagSaveArg,

    /// Do not step over the red zone below %rsp
    #[arg(long)]
    pub no_red_zone: bool,

    /// Trace capacity (defaults to one state per instrumented line)
    #[arg(long)]
    pub capacity: Option<usize>,
}

impl TracerArgs {
    pub fn to_config(&self) -> TracerConfig {
        TracerConfig::default()
            .with_regs(self.track.iter().copied())
            .with_before(self.before.iter().copied())
            .with_after(self.after.iter().copied())
            .with_flag_save(self.flag_save.into())
            .with_red_zone(!self.no_red_zone)
    }
}

#[derive(Clone, Copy, Debug, ValueEnum, Default)]
pub enum FlagSaveArg {
    /// pushfq/popfq, every flag restored
    #[default]
    Pushf,
    /// lahf/sahf, OF not restored
    Lahf,
}

impl From<FlagSaveArg> for FlagSave {
    fn from(arg: FlagSaveArg) -> Self {
        match arg {
            FlagSaveArg::Pushf => Self::Pushf,
            FlagSaveArg::Lahf => Self::Lahf,
        }
    }
}

/// Parse a 64-bit register name, with or without `%`.
pub fn parse_reg(s: &str) -> Result<Gp, String> {
    let name = s.trim().trim_start_matches('%');
    match Gp::from_name(name) {
        Some((reg, Width::Q)) => Ok(reg),
        Some(_) => Err(format!("`{s}` is not a 64-bit register")),
        None => Err(format!("unknown register `{s}`")),
    }
}

/// Parse `REG=VALUE`, VALUE decimal, negative decimal or `0x` hex.
pub fn parse_assignment(s: &str) -> Result<(Gp, u64), String> {
    let (reg, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected REG=VALUE, got `{s}`"))?;
    let reg = parse_reg(reg)?;
    let value = value.trim();
    let parsed = if let Some(hex) = value.strip_prefix("0x") {
        u64::from_str_radix(hex, 16).ok()
    } else if value.starts_with('-') {
        value.parse::<i64>().ok().map(|v| v as u64)
    } else {
        value.parse::<u64>().ok()
    };
    parsed
        .map(|v| (reg, v))
        .ok_or_else(|| format!("invalid value `{value}`"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_reg() {
        assert_eq!(parse_reg("rax"), Ok(Gp::Rax));
        assert_eq!(parse_reg("%r12"), Ok(Gp::R12));
        assert!(parse_reg("eax").is_err());
        assert!(parse_reg("xmm0").is_err());
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(parse_assignment("rdi=0x1000"), Ok((Gp::Rdi, 0x1000)));
        assert_eq!(parse_assignment("rax=-1"), Ok((Gp::Rax, u64::MAX)));
        assert_eq!(parse_assignment("%rcx=42"), Ok((Gp::Rcx, 42)));
        assert!(parse_assignment("rax").is_err());
        assert!(parse_assignment("rax=zz").is_err());
    }

    #[test]
    fn test_run_arguments() {
        let cli = Cli::try_parse_from([
            "xtr", "run", "prog.s", "--track", "rax,rsp", "--before", "0,2", "--after", "2",
            "--flags", "lahf", "--reg", "rax=3",
        ])
        .unwrap();
        let Commands::Run { tracer, regs, native, .. } = cli.command else {
            panic!("expected run");
        };
        assert!(!native);
        assert_eq!(regs, [(Gp::Rax, 3)]);
        let config = tracer.to_config();
        assert_eq!(config.regs, [Gp::Rax, Gp::Rsp]);
        assert_eq!(config.before.into_iter().collect::<Vec<_>>(), [0, 2]);
        assert_eq!(config.flag_save, FlagSave::Lahf);
        assert!(config.red_zone);
    }
}
