//! Options shared by every command and the configuration they resolve to.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::Args;
use console::style;
use indicatif::HumanBytes;
use repomirror::config::default_config_path;
use repomirror::{MirrorConfig, SyncReport};

use crate::error::CliError;

/// Global options.
#[derive(Debug, Clone, Default, Args)]
pub struct CommonArgs {
    /// Base URL of the remote repository
    #[arg(long, global = true, value_name = "URL")]
    pub repo_url: Option<String>,

    /// Local directory the repository is mirrored into
    #[arg(long, global = true, value_name = "DIR")]
    pub base_dir: Option<PathBuf>,

    /// Maximum number of simultaneous package transfers
    #[arg(long, global = true, value_name = "N")]
    pub download_threads: Option<usize>,

    /// Number of threads checking local packages
    #[arg(long, global = true, value_name = "N")]
    pub check_threads: Option<usize>,

    /// Label attached to every log line
    #[arg(long, global = true, value_name = "TEXT")]
    pub message_prefix: Option<String>,

    /// Configuration file (default: <config dir>/repomirror/config.ini)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Fail when metadata does not match the repository index
    #[arg(long, global = true)]
    pub strict_metadata: bool,

    /// Skip size and checksum verification of transferred packages
    #[arg(long, global = true)]
    pub no_verify: bool,

    /// Write a JSON summary of the package pass to this file
    #[arg(long, global = true, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Log per-request detail
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors, and hide progress bars
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Build the mirror configuration.
///
/// Values come from the configuration file first; command-line options
/// override them. An explicit `--config` must exist, the default location is
/// optional.
pub fn resolve_config(args: &CommonArgs) -> Result<MirrorConfig, CliError> {
    let mut config = match &args.config {
        Some(path) => MirrorConfig::from_ini_file(path)?,
        None => match default_config_path().filter(|path| path.is_file()) {
            Some(path) => MirrorConfig::from_ini_file(&path)?,
            None => MirrorConfig::default(),
        },
    };

    if let Some(url) = &args.repo_url {
        config.repo_url = url.clone();
    }
    if let Some(dir) = &args.base_dir {
        config.base_dir = dir.clone();
    }
    if let Some(threads) = args.download_threads {
        config.download_workers = threads;
    }
    if let Some(threads) = args.check_threads {
        config.check_workers = threads;
    }
    if args.strict_metadata {
        config.strict_metadata = true;
    }
    if args.no_verify {
        config.verify_transfers = false;
    }

    if config.repo_url.trim().is_empty() {
        return Err(CliError::Config(
            "No repository URL specified. Use --repo-url or set repo_url in the [mirror] section of config.ini."
                .to_string(),
        ));
    }

    Ok(config)
}

/// Print the outcome of a package pass.
pub fn print_summary(report: &SyncReport) {
    println!(
        "{} packages, {} needed syncing ({})",
        report.packages,
        report.needs_sync,
        HumanBytes(report.bytes_to_transfer)
    );
    if report.transferred > 0 {
        println!(
            "{} transferred {} packages ({})",
            style("✓").green(),
            report.transferred,
            HumanBytes(report.bytes_transferred)
        );
    }
    if !report.failures.is_empty() {
        println!("{} failed to transfer:", style(report.failures.len()).red().bold());
        for reference in &report.failures {
            println!("  {}", reference);
        }
    }
}

/// Write the report as JSON.
pub fn write_report(path: &Path, report: &SyncReport) -> Result<(), CliError> {
    let report_error = |reason: String| CliError::Report {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::create(path).map_err(|e| report_error(e.to_string()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report).map_err(|e| report_error(e.to_string()))?;
    writer.flush().map_err(|e| report_error(e.to_string()))
}
