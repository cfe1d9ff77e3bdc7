//! Command implementations.

mod common;
mod metadata;
mod packages;

pub use common::CommonArgs;

use clap::Subcommand;
use repomirror::Mirror;
use tracing::info;

use crate::error::CliError;

/// Subcommands.
#[derive(Debug, Clone, Copy, Subcommand)]
pub enum Commands {
    /// Fetch repomd.xml, the metadata it lists and its signature
    Metadata,
    /// Transfer packages that are missing or corrupt, using local metadata
    Packages,
    /// Fetch metadata, then transfer packages
    Sync,
    /// Report which packages need syncing without transferring them
    Check,
}

/// Resolve configuration and run `command`.
pub fn run(command: Commands, args: &CommonArgs) -> Result<(), CliError> {
    let config = common::resolve_config(args)?;
    info!(
        repo_url = %config.repo_url,
        base_dir = %config.base_dir.display(),
        "mirror configured"
    );
    let mirror = Mirror::new(config)?;

    match command {
        Commands::Metadata => metadata::run(&mirror),
        Commands::Packages => packages::run(&mirror, args),
        Commands::Sync => {
            metadata::run(&mirror)?;
            packages::run(&mirror, args)
        }
        Commands::Check => packages::check(&mirror, args),
    }
}
