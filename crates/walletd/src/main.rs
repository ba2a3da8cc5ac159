//! Entry point of the `walletd` binary.
//!
//! Parses the command line and hands over to [`walletd::cli::run`], which
//! either runs the daemon or forwards the command to the running one.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

use clap::Parser;
use walletd::cli::{Cli, run};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    run(cli, &mut stdout, &mut stderr)
}
