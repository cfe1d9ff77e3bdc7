//! Error types for the mirror engine.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for mirror operations.
pub type MirrorResult<T> = Result<T, MirrorError>;

/// Errors that can occur while mirroring a repository.
///
/// Only run-level failures surface as a `MirrorError`. A single package failing
/// its local check or its transfer is recorded in the phase's report instead.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The repository index could not be retrieved.
    #[error("repository index {url} unavailable: {reason}")]
    IndexUnavailable { url: String, reason: String },

    /// The repository index could not be understood.
    #[error("malformed repository index: {reason}")]
    IndexMalformed { reason: String },

    /// A metadata file listed in the index could not be retrieved.
    #[error("failed to fetch metadata {url}: {reason}")]
    MetadataFetchFailed { url: String, reason: String },

    /// A metadata file did not match the index (strict mode only).
    #[error("metadata {location} failed verification: {reason}")]
    MetadataIntegrity { location: String, reason: String },

    /// A transferred package did not match its manifest record.
    #[error("package {location} failed verification: {reason}")]
    PackageIntegrity { location: String, reason: String },

    /// The detached index signature could not be retrieved.
    #[error("failed to fetch signature {url}: {reason}")]
    SignatureFetchFailed { url: String, reason: String },

    /// A package entry in the primary metadata is incomplete.
    #[error("malformed package entry #{position}: {reason}")]
    ManifestEntryMalformed { position: usize, reason: String },

    /// The local mirror has no repository index.
    #[error("repodata not found at {}", path.display())]
    RepodataMissing { path: PathBuf },

    /// The primary metadata file referenced by the local index is missing.
    #[error("primary metadata not found at {}", path.display())]
    PrimaryMissing { path: PathBuf },

    /// A metadata path would escape the mirror root.
    #[error("refusing unsafe repository path: {0}")]
    UnsafePath(String),

    /// Checksum algorithm not supported.
    #[error("unsupported checksum type: {0}")]
    UnsupportedChecksum(String),

    /// Transport-level failure (connection, TLS, timeout).
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    /// Failed to read a file.
    #[error("failed to read {}: {source}", path.display())]
    ReadFailed { path: PathBuf, source: io::Error },

    /// Failed to write a file.
    #[error("failed to write {}: {source}", path.display())]
    WriteFailed { path: PathBuf, source: io::Error },

    /// Failed to create a directory.
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDirFailed { path: PathBuf, source: io::Error },
}
