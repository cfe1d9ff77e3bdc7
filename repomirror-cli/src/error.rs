//! CLI error types.

use std::path::PathBuf;

use repomirror::MirrorError;
use thiserror::Error;

/// Errors surfaced by `repomirror` commands.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Mirror(#[from] MirrorError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to write report {}: {reason}", path.display())]
    Report { path: PathBuf, reason: String },

    /// The run finished but some packages could not be transferred.
    #[error("{failed} package(s) failed to transfer")]
    Incomplete { failed: usize },

    /// A dry run found packages that need syncing.
    #[error("{needs_sync} package(s) need syncing")]
    OutOfSync { needs_sync: usize },
}

impl CliError {
    /// Process exit code for this error.
    ///
    /// `2` means the run itself worked but the mirror is not complete; `1` is
    /// any fatal error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Incomplete { .. } | Self::OutOfSync { .. } => 2,
            _ => 1,
        }
    }
}
