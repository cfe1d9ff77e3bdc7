//! Progress reporting for the check and transfer phases.
//!
//! Workers bump atomic counters; a dedicated reporter thread samples them at a
//! fixed interval and hands a [`Progress`] snapshot to the caller's callback.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::warn;

/// Which batch a progress report belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Auditing local files against the manifest.
    Checking,
    /// Transferring packages from the remote repository.
    Transferring,
}

impl Phase {
    /// Human-readable label.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Checking => "Checking",
            Self::Transferring => "Downloaded",
        }
    }
}

/// A point-in-time progress snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub phase: Phase,
    /// Items finished (successfully or not).
    pub completed: usize,
    /// Items in the batch.
    pub total: usize,
    /// Bytes moved so far (transfer phase only).
    pub bytes: u64,
}

/// Progress callback invoked from the reporter thread.
pub type ProgressCallback = Box<dyn Fn(Progress) + Send + Sync>;

/// Shared progress counters for one batch.
#[derive(Debug)]
pub struct ProgressCounters {
    phase: Phase,
    total: usize,
    completed: AtomicUsize,
    bytes: AtomicU64,
    done: AtomicBool,
}

impl ProgressCounters {
    /// Create counters for a batch of `total` items.
    pub fn new(phase: Phase, total: usize) -> Self {
        Self {
            phase,
            total,
            completed: AtomicUsize::new(0),
            bytes: AtomicU64::new(0),
            done: AtomicBool::new(false),
        }
    }

    /// Record one finished item.
    pub fn item_done(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    /// Add to the byte counter.
    pub fn add_bytes(&self, bytes: u64) {
        self.bytes.fetch_add(bytes, Ordering::SeqCst);
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Progress {
        Progress {
            phase: self.phase,
            completed: self.completed.load(Ordering::SeqCst),
            total: self.total,
            bytes: self.bytes.load(Ordering::SeqCst),
        }
    }

    /// Signal that the batch is finished.
    pub fn signal_done(&self) {
        self.done.store(true, Ordering::SeqCst);
    }

    /// Whether the batch is finished.
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }
}

/// Background reporter for a batch.
///
/// Dropping the reporter stops it after one final report.
pub struct ProgressReporter {
    handle: Option<JoinHandle<()>>,
    counters: Arc<ProgressCounters>,
}

impl ProgressReporter {
    /// Start reporting `counters` to `callback` every `interval`.
    pub fn start(
        counters: Arc<ProgressCounters>,
        callback: Arc<ProgressCallback>,
        interval: Duration,
    ) -> Self {
        let counters_clone = Arc::clone(&counters);

        let spawned = thread::Builder::new()
            .name("progress".to_string())
            .spawn(move || {
                while !counters_clone.is_done() {
                    callback(counters_clone.snapshot());
                    thread::sleep(interval);
                }

                // Final report
                callback(counters_clone.snapshot());
            });

        Self {
            handle: reporter_handle(spawned),
            counters,
        }
    }

    /// Start a reporter if a callback was supplied.
    pub fn maybe_start(
        counters: &Arc<ProgressCounters>,
        callback: Option<&Arc<ProgressCallback>>,
        interval: Duration,
    ) -> Option<Self> {
        callback.map(|cb| Self::start(Arc::clone(counters), Arc::clone(cb), interval))
    }

    /// Stop the reporter and wait for its final report.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.counters.signal_done();
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

/// Keep the reporter thread handle; a failed spawn only costs the progress
/// output.
fn reporter_handle(spawned: io::Result<JoinHandle<()>>) -> Option<JoinHandle<()>> {
    match spawned {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "cannot start progress reporter, continuing without progress");
            None
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.shutdown();
    }
}
