//! xtcc CLI - compile a C-subset source file to an Xtensa ELF object.
//!
//! Usage: `xtcc [INPUT] [-o OUTPUT]` with defaults `input.c` and
//! `output.elf`. Diagnostics go to stdout; the exit status is 0 on success
//! and 1 on any I/O or compile error.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use xtcc_drv::{Config, Session};

/// xtcc - a single-pass C-subset compiler emitting relocatable Xtensa ELF
/// objects (ESP32, windowed ABI).
#[derive(Parser, Debug)]
#[command(name = "xtcc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Compile a C subset to an Xtensa ELF object", long_about = None)]
struct Cli {
    /// Input source file
    #[arg(default_value = "input.c")]
    input: PathBuf,

    /// Output object file
    #[arg(short, long, default_value = "output.elf")]
    output: PathBuf,

    /// Enable verbose output
    #[arg(short, long, env = "XTCC_VERBOSE")]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let session = Session::new(Config {
        input: cli.input,
        output: cli.output,
    });

    match session.compile() {
        Ok(stats) => {
            println!("{stats}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            println!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system; logs go to stderr so diagnostics and the
/// build report keep stdout to themselves.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_defaults() {
        let cli = Cli::parse_from(["xtcc"]);
        assert_eq!(cli.input, PathBuf::from("input.c"));
        assert_eq!(cli.output, PathBuf::from("output.elf"));
        assert!(!cli.verbose);
    }

    #[test]
    fn test_cli_parse_input_positional() {
        let cli = Cli::parse_from(["xtcc", "prog.c"]);
        assert_eq!(cli.input, PathBuf::from("prog.c"));
        assert_eq!(cli.output, PathBuf::from("output.elf"));
    }

    #[test]
    fn test_cli_parse_output_flag() {
        let cli = Cli::parse_from(["xtcc", "prog.c", "-o", "prog.elf"]);
        assert_eq!(cli.output, PathBuf::from("prog.elf"));

        let cli = Cli::parse_from(["xtcc", "prog.c", "--output", "other.elf"]);
        assert_eq!(cli.output, PathBuf::from("other.elf"));
    }

    #[test]
    fn test_cli_parse_verbose() {
        let cli = Cli::parse_from(["xtcc", "--verbose"]);
        assert!(cli.verbose);
    }
}
