//! Package transfer scheduling.
//!
//! Transfers every package in a [`SyncDecision`] with at most `budget`
//! requests in flight. Each body streams into a temporary file beside its
//! destination while being hashed, and is renamed into place only once it is
//! complete (and, by default, verified). A failed item is recorded and the
//! batch carries on; nothing is retried.

use std::collections::BTreeSet;
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::Url;
use tracing::{debug, info, warn};

use crate::checksum::BUFFER_SIZE;
use crate::config::{DEFAULT_DOWNLOAD_WORKERS, DEFAULT_PROGRESS_INTERVAL};
use crate::error::{MirrorError, MirrorResult};
use crate::manifest::{Manifest, PackageRecord};
use crate::pool::run_partitioned;
use crate::progress::{Phase, ProgressCallback, ProgressCounters, ProgressReporter};
use crate::reconcile::SyncDecision;
use crate::store::MirrorRoot;
use crate::transport::Transport;

/// A package that could not be transferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferFailure {
    /// Manifest position.
    pub index: usize,
    /// Fully-qualified remote URL.
    pub reference: String,
    pub reason: String,
}

/// Final state of one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Succeeded { index: usize, bytes: u64 },
    Failed(TransferFailure),
}

impl TransferOutcome {
    /// Manifest position the outcome belongs to.
    pub fn index(&self) -> usize {
        match self {
            Self::Succeeded { index, .. } => *index,
            Self::Failed(failure) => failure.index,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// Outcomes of a transfer batch, ordered by manifest position.
#[derive(Debug, Clone, Default)]
pub struct TransferReport {
    outcomes: Vec<TransferOutcome>,
}

impl TransferReport {
    fn new(mut outcomes: Vec<TransferOutcome>) -> Self {
        outcomes.sort_by_key(TransferOutcome::index);
        Self { outcomes }
    }

    pub fn outcomes(&self) -> &[TransferOutcome] {
        &self.outcomes
    }

    /// Number of packages transferred successfully.
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &TransferFailure> {
        self.outcomes.iter().filter_map(|o| match o {
            TransferOutcome::Failed(failure) => Some(failure),
            TransferOutcome::Succeeded { .. } => None,
        })
    }

    /// Remote URLs of every failed transfer.
    pub fn failed_references(&self) -> Vec<String> {
        self.failures().map(|f| f.reference.clone()).collect()
    }

    /// Bytes written by successful transfers.
    pub fn bytes_transferred(&self) -> u64 {
        self.outcomes
            .iter()
            .map(|o| match o {
                TransferOutcome::Succeeded { bytes, .. } => *bytes,
                TransferOutcome::Failed(_) => 0,
            })
            .sum()
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Runs package transfers with a bounded number of workers.
pub struct TransferScheduler {
    transport: Arc<dyn Transport>,
    base_url: Url,
    root: MirrorRoot,
    budget: usize,
    verify: bool,
    progress_interval: Duration,
}

impl TransferScheduler {
    /// Create a scheduler allowing `budget` simultaneous transfers (minimum 1).
    pub fn new(
        transport: Arc<dyn Transport>,
        base_url: Url,
        root: MirrorRoot,
        budget: usize,
    ) -> Self {
        Self {
            transport,
            base_url,
            root,
            budget: budget.max(1),
            verify: true,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    /// Create a scheduler with the default budget.
    pub fn with_defaults(transport: Arc<dyn Transport>, base_url: Url, root: MirrorRoot) -> Self {
        Self::new(transport, base_url, root, DEFAULT_DOWNLOAD_WORKERS)
    }

    /// Check size and digest of each body before it replaces the local file.
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Transfer every package in `decision`.
    ///
    /// Blocks until all transfers have finished. Individual failures are
    /// recorded in the report and never stop the batch.
    pub fn run(
        &self,
        manifest: &Manifest,
        decision: &SyncDecision,
        progress: Option<&Arc<ProgressCallback>>,
    ) -> TransferReport {
        let total = decision.len();
        info!(
            packages = total,
            bytes = manifest.total_size(decision),
            workers = self.budget.min(total.max(1)),
            "transferring packages"
        );

        self.sweep_stale_staging(manifest, decision);

        let counters = Arc::new(ProgressCounters::new(Phase::Transferring, total));
        let reporter = ProgressReporter::maybe_start(&counters, progress, self.progress_interval);
        let outcomes = Mutex::new(Vec::with_capacity(total));

        run_partitioned(total, self.budget, |position| {
            let index = decision.indices()[position];
            let outcome = match manifest.get(index) {
                Some(record) => self.transfer_one(index, record, &counters),
                None => TransferOutcome::Failed(TransferFailure {
                    index,
                    reference: format!("#{}", index),
                    reason: "not in manifest".to_string(),
                }),
            };
            counters.item_done();
            outcomes.lock().push(outcome);
        });

        if let Some(reporter) = reporter {
            reporter.stop();
        }

        let report = TransferReport::new(outcomes.into_inner());
        info!(
            succeeded = report.succeeded(),
            failed = report.len() - report.succeeded(),
            bytes = report.bytes_transferred(),
            "transfers complete"
        );
        report
    }

    /// Clear staging files an interrupted run left beside the packages about
    /// to be transferred. Runs before any worker starts staging.
    fn sweep_stale_staging(&self, manifest: &Manifest, decision: &SyncDecision) {
        let dirs: BTreeSet<_> = decision
            .indices()
            .iter()
            .filter_map(|&index| manifest.get(index))
            .filter_map(|record| self.root.resolve(&record.location).ok())
            .filter_map(|path| path.parent().map(|dir| dir.to_path_buf()))
            .collect();

        for dir in dirs {
            match self.root.sweep_staging(&dir) {
                Ok(0) => {}
                Ok(removed) => {
                    info!(dir = %dir.display(), removed, "removed stale staging files")
                }
                Err(e) => warn!(dir = %dir.display(), error = %e, "cannot sweep staging files"),
            }
        }
    }

    fn transfer_one(
        &self,
        index: usize,
        record: &PackageRecord,
        counters: &ProgressCounters,
    ) -> TransferOutcome {
        let url = match self.base_url.join(&record.location) {
            Ok(url) => url,
            Err(e) => {
                return TransferOutcome::Failed(TransferFailure {
                    index,
                    reference: format!("{}{}", self.base_url, record.location),
                    reason: e.to_string(),
                })
            }
        };

        debug!(%url, "transfer started");
        match self.fetch(&url, record, counters) {
            Ok(bytes) => {
                debug!(%url, bytes, "transfer finished");
                TransferOutcome::Succeeded { index, bytes }
            }
            Err(e) => {
                warn!(%url, error = %e, "transfer failed");
                TransferOutcome::Failed(TransferFailure {
                    index,
                    reference: url.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Stream one package into place, returning the bytes written.
    fn fetch(
        &self,
        url: &Url,
        record: &PackageRecord,
        counters: &ProgressCounters,
    ) -> MirrorResult<u64> {
        let path = self.root.resolve(&record.location)?;

        let mut response = self.transport.get(url)?;
        if !response.is_success() {
            return Err(MirrorError::Transport {
                url: url.to_string(),
                reason: format!("HTTP status {}", response.status),
            });
        }

        // Dropping the staged file without persisting it deletes it.
        let mut staged = self.root.staging_file(&path)?;
        let write_failed = |e| MirrorError::WriteFailed {
            path: path.clone(),
            source: e,
        };

        let mut hasher = record.checksum.algorithm.hasher();
        let mut buffer = vec![0u8; BUFFER_SIZE];
        let mut bytes = 0u64;

        loop {
            let bytes_read = response.body.read(&mut buffer).map_err(|e| MirrorError::Transport {
                url: url.to_string(),
                reason: format!("read error: {}", e),
            })?;
            if bytes_read == 0 {
                break;
            }

            staged.write_all(&buffer[..bytes_read]).map_err(write_failed)?;
            hasher.update(&buffer[..bytes_read]);
            bytes += bytes_read as u64;
            counters.add_bytes(bytes_read as u64);
        }
        staged.flush().map_err(write_failed)?;

        if self.verify {
            let integrity = |reason: String| MirrorError::PackageIntegrity {
                location: record.location.clone(),
                reason,
            };
            if bytes != record.size {
                return Err(integrity(format!(
                    "size mismatch, expected {} got {}",
                    record.size, bytes
                )));
            }
            let actual = hasher.finalize_hex();
            if !record.checksum.matches(&actual) {
                return Err(integrity(format!(
                    "checksum mismatch, expected {} got {}",
                    record.checksum, actual
                )));
            }
        }

        self.root.persist(staged, &path)?;
        Ok(bytes)
    }
}
