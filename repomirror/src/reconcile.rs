//! Local state reconciliation.
//!
//! Audits the local mirror against a [`Manifest`] and decides which packages
//! must be transferred. A package needs syncing when its file is missing, is
//! not a regular file, has the wrong size or has the wrong digest. The digest
//! is only computed once existence and size already match.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::checksum::digest_file;
use crate::config::DEFAULT_PROGRESS_INTERVAL;
use crate::manifest::{Manifest, PackageRecord};
use crate::pool::run_partitioned;
use crate::progress::{Phase, ProgressCallback, ProgressCounters, ProgressReporter};
use crate::store::MirrorRoot;

/// Why a package needs to be transferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncReason {
    /// No file at the package path.
    Missing,
    /// Something other than a regular file occupies the path.
    NotAFile,
    /// The local file has the wrong length.
    SizeMismatch { expected: u64, actual: u64 },
    /// The local file has the right length but the wrong digest.
    ChecksumMismatch,
    /// The local file could not be inspected.
    Unreadable(String),
}

impl fmt::Display for SyncReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "missing"),
            Self::NotAFile => write!(f, "not a regular file"),
            Self::SizeMismatch { expected, actual } => {
                write!(f, "size mismatch, expected {} got {}", expected, actual)
            }
            Self::ChecksumMismatch => write!(f, "checksum mismatch"),
            Self::Unreadable(reason) => write!(f, "unreadable: {}", reason),
        }
    }
}

/// The set of manifest positions that need syncing.
///
/// Only membership is meaningful; indices are kept in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncDecision {
    indices: Vec<usize>,
    reasons: HashMap<usize, SyncReason>,
}

impl SyncDecision {
    /// Build a decision from explicit positions, without reasons.
    pub fn from_indices(mut indices: Vec<usize>) -> Self {
        indices.sort_unstable();
        indices.dedup();
        Self {
            indices,
            reasons: HashMap::new(),
        }
    }

    fn from_flagged(mut flagged: Vec<(usize, SyncReason)>) -> Self {
        flagged.sort_unstable_by_key(|(index, _)| *index);
        let indices = flagged.iter().map(|(index, _)| *index).collect();
        Self {
            indices,
            reasons: flagged.into_iter().collect(),
        }
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn reason(&self, index: usize) -> Option<&SyncReason> {
        self.reasons.get(&index)
    }

    pub fn contains(&self, index: usize) -> bool {
        self.indices.binary_search(&index).is_ok()
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Compares local files against the manifest in parallel.
#[derive(Debug, Clone)]
pub struct LocalStateReconciler {
    root: MirrorRoot,
    workers: usize,
    progress_interval: Duration,
}

impl LocalStateReconciler {
    /// Create a reconciler using `workers` threads (minimum 1).
    pub fn new(root: MirrorRoot, workers: usize) -> Self {
        Self {
            root,
            workers: workers.max(1),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Check every manifest record and return those that need syncing.
    ///
    /// Blocks until all records are checked. Per-file I/O errors flag the file
    /// as [`SyncReason::Unreadable`] and never abort the pass.
    pub fn reconcile(
        &self,
        manifest: &Manifest,
        progress: Option<&Arc<ProgressCallback>>,
    ) -> SyncDecision {
        let total = manifest.len();
        info!(
            packages = total,
            workers = self.workers.min(total.max(1)),
            "checking local packages"
        );

        let counters = Arc::new(ProgressCounters::new(Phase::Checking, total));
        let reporter = ProgressReporter::maybe_start(&counters, progress, self.progress_interval);
        let flagged = Mutex::new(Vec::new());

        run_partitioned(total, self.workers, |index| {
            if let Some(record) = manifest.get(index) {
                if let Some(reason) = self.check(record) {
                    debug!(location = %record.location, %reason, "needs sync");
                    flagged.lock().push((index, reason));
                }
            }
            counters.item_done();
        });

        if let Some(reporter) = reporter {
            reporter.stop();
        }

        let decision = SyncDecision::from_flagged(flagged.into_inner());
        info!(
            packages = total,
            needs_sync = decision.len(),
            "local check complete"
        );
        decision
    }

    /// Check a single record, returning why it needs syncing, if it does.
    pub fn check(&self, record: &PackageRecord) -> Option<SyncReason> {
        let path = match self.root.resolve(&record.location) {
            Ok(path) => path,
            Err(e) => {
                warn!(location = %record.location, error = %e, "cannot check package");
                return Some(SyncReason::Unreadable(e.to_string()));
            }
        };

        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Some(SyncReason::Missing),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot stat package");
                return Some(SyncReason::Unreadable(e.to_string()));
            }
        };

        if !metadata.is_file() {
            return Some(SyncReason::NotAFile);
        }
        if metadata.len() != record.size {
            return Some(SyncReason::SizeMismatch {
                expected: record.size,
                actual: metadata.len(),
            });
        }

        match digest_file(record.checksum.algorithm, &path) {
            Ok(actual) if record.checksum.matches(&actual) => None,
            Ok(_) => Some(SyncReason::ChecksumMismatch),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot hash package");
                Some(SyncReason::Unreadable(e.to_string()))
            }
        }
    }
}
