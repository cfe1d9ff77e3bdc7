//! repomirror CLI - mirror an RPM package repository to a local directory.

mod commands;
mod error;
mod logging;
mod progress;

use std::process::ExitCode;

use clap::Parser;
use console::style;

use commands::{CommonArgs, Commands};

/// Mirror an RPM package repository to a local directory.
#[derive(Debug, Parser)]
#[command(name = "repomirror", version, about)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Commands,
}

fn main() -> ExitCode {
    let offset = logging::local_offset();
    let cli = Cli::parse();

    logging::init_logging(offset, cli.common.verbose, cli.common.quiet);
    let span = logging::prefix_span(cli.common.message_prefix.as_deref());
    let _entered = span.enter();

    match commands::run(cli.command, &cli.common) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            ExitCode::from(e.exit_code())
        }
    }
}
