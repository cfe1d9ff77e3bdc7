//! repomirror - verified, incremental mirroring of RPM package repositories
//!
//! The engine mirrors a remote repository into a local directory in two
//! passes:
//!
//! 1. **Metadata**: [`MetadataFetcher`] downloads `repodata/repomd.xml`, every
//!    metadata file it lists and the detached signature, then writes them
//!    under the mirror root.
//! 2. **Packages**: [`Manifest::from_mirror`] parses the primary metadata,
//!    [`LocalStateReconciler`] works out which local packages are missing or
//!    corrupt, and [`TransferScheduler`] fetches exactly those with a bounded
//!    number of concurrent transfers.
//!
//! [`Mirror`] wraps both passes behind one configuration.
//!
//! ```no_run
//! use repomirror::{Mirror, MirrorConfig};
//!
//! let config = MirrorConfig::new("https://mirror.example.com/os/", "/srv/mirror/os");
//! let mirror = Mirror::new(config)?;
//! let report = mirror.sync(None)?;
//! println!("{} of {} packages transferred", report.transferred, report.needs_sync);
//! # Ok::<(), repomirror::MirrorError>(())
//! ```

pub mod checksum;
pub mod config;
pub mod error;
pub mod manifest;
pub mod mirror;
pub mod progress;
pub mod reconcile;
pub mod repodata;
pub mod store;
pub mod transfer;
pub mod transport;

mod pool;
mod xml;

#[cfg(test)]
mod testing;

pub use checksum::{Checksum, ChecksumAlgorithm};
pub use config::MirrorConfig;
pub use error::{MirrorError, MirrorResult};
pub use manifest::{Manifest, PackageRecord};
pub use mirror::{Mirror, SyncReport};
pub use progress::{Phase, Progress, ProgressCallback};
pub use reconcile::{LocalStateReconciler, SyncDecision, SyncReason};
pub use repodata::{MetadataFetcher, MetadataSummary};
pub use store::MirrorRoot;
pub use transfer::{TransferFailure, TransferOutcome, TransferReport, TransferScheduler};
pub use transport::{HttpTransport, Transport, TransportResponse};

pub use reqwest::Url;
