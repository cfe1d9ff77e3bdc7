//! `packages` and `check` commands.

use repomirror::{Mirror, SyncReport};

use super::common::{print_summary, write_report, CommonArgs};
use crate::error::CliError;
use crate::progress::progress_callback;

/// Transfer every package that is missing or corrupt locally.
pub fn run(mirror: &Mirror, args: &CommonArgs) -> Result<(), CliError> {
    let progress = progress_callback(args.quiet);
    let report = mirror.sync_packages(progress.as_ref())?;
    finish(&report, args)?;

    if report.failures.is_empty() {
        Ok(())
    } else {
        Err(CliError::Incomplete {
            failed: report.failures.len(),
        })
    }
}

/// Report what `run` would transfer without transferring anything.
pub fn check(mirror: &Mirror, args: &CommonArgs) -> Result<(), CliError> {
    let progress = progress_callback(args.quiet);
    let report = mirror.check(progress.as_ref())?;
    finish(&report, args)?;

    if report.needs_sync == 0 {
        Ok(())
    } else {
        Err(CliError::OutOfSync {
            needs_sync: report.needs_sync,
        })
    }
}

fn finish(report: &SyncReport, args: &CommonArgs) -> Result<(), CliError> {
    print_summary(report);
    if let Some(path) = &args.report {
        write_report(path, report)?;
    }
    Ok(())
}
