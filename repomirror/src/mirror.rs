//! High-level mirror engine.
//!
//! [`Mirror`] ties the phases together for one repository: metadata fetch,
//! manifest loading, local reconciliation and package transfer.

use std::sync::Arc;

use reqwest::Url;
use serde::Serialize;
use tracing::info;

use crate::config::MirrorConfig;
use crate::error::MirrorResult;
use crate::manifest::Manifest;
use crate::progress::ProgressCallback;
use crate::reconcile::{LocalStateReconciler, SyncDecision};
use crate::repodata::{MetadataFetcher, MetadataSummary};
use crate::store::MirrorRoot;
use crate::transfer::{TransferReport, TransferScheduler};
use crate::transport::{HttpTransport, Transport};

/// Summary of a package pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Packages listed in the manifest.
    pub packages: usize,
    /// Packages that were missing or corrupt locally.
    pub needs_sync: usize,
    /// Bytes the needed packages add up to.
    pub bytes_to_transfer: u64,
    /// Packages transferred successfully.
    pub transferred: usize,
    pub bytes_transferred: u64,
    /// Remote URLs that could not be transferred.
    pub failures: Vec<String>,
}

impl SyncReport {
    fn new(
        manifest: &Manifest,
        decision: &SyncDecision,
        transfers: Option<&TransferReport>,
    ) -> Self {
        Self {
            packages: manifest.len(),
            needs_sync: decision.len(),
            bytes_to_transfer: manifest.total_size(decision),
            transferred: transfers.map_or(0, TransferReport::succeeded),
            bytes_transferred: transfers.map_or(0, TransferReport::bytes_transferred),
            failures: transfers.map_or_else(Vec::new, TransferReport::failed_references),
        }
    }

    /// Whether the local mirror now matches the manifest.
    ///
    /// False when any transfer failed, or when packages still need syncing
    /// because none were transferred (a dry run).
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.transferred == self.needs_sync
    }
}

/// Mirror engine for one repository.
pub struct Mirror {
    config: MirrorConfig,
    base_url: Url,
    root: MirrorRoot,
    transport: Arc<dyn Transport>,
}

impl Mirror {
    /// Create an engine that talks HTTP(S).
    pub fn new(config: MirrorConfig) -> MirrorResult<Self> {
        let transport = HttpTransport::with_settings(config.timeout, &config.user_agent)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create an engine over a custom transport.
    pub fn with_transport(
        config: MirrorConfig,
        transport: Arc<dyn Transport>,
    ) -> MirrorResult<Self> {
        let base_url = config.validate()?;
        let root = MirrorRoot::new(&config.base_dir);
        Ok(Self {
            config,
            base_url,
            root,
            transport,
        })
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    /// Normalized repository URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn root(&self) -> &MirrorRoot {
        &self.root
    }

    /// Fetch and persist the repository metadata.
    pub fn fetch_metadata(&self) -> MirrorResult<MetadataSummary> {
        MetadataFetcher::new(
            Arc::clone(&self.transport),
            self.base_url.clone(),
            self.root.clone(),
        )
        .with_strict(self.config.strict_metadata)
        .fetch()
    }

    /// Load the manifest from the metadata already on disk.
    pub fn load_manifest(&self) -> MirrorResult<Manifest> {
        Manifest::from_mirror(&self.root)
    }

    /// Decide which packages need syncing.
    pub fn reconcile(
        &self,
        manifest: &Manifest,
        progress: Option<&Arc<ProgressCallback>>,
    ) -> SyncDecision {
        LocalStateReconciler::new(self.root.clone(), self.config.check_workers)
            .with_progress_interval(self.config.progress_interval)
            .reconcile(manifest, progress)
    }

    /// Transfer the packages in `decision`.
    pub fn transfer(
        &self,
        manifest: &Manifest,
        decision: &SyncDecision,
        progress: Option<&Arc<ProgressCallback>>,
    ) -> TransferReport {
        TransferScheduler::new(
            Arc::clone(&self.transport),
            self.base_url.clone(),
            self.root.clone(),
            self.config.download_workers,
        )
        .with_verify(self.config.verify_transfers)
        .with_progress_interval(self.config.progress_interval)
        .run(manifest, decision, progress)
    }

    /// Report what a package pass would transfer, without transferring.
    pub fn check(&self, progress: Option<&Arc<ProgressCallback>>) -> MirrorResult<SyncReport> {
        let manifest = self.load_manifest()?;
        let decision = self.reconcile(&manifest, progress);
        Ok(SyncReport::new(&manifest, &decision, None))
    }

    /// Bring the local packages in line with the local metadata.
    ///
    /// Loads the manifest, checks every package and transfers those that are
    /// missing or corrupt.
    pub fn sync_packages(
        &self,
        progress: Option<&Arc<ProgressCallback>>,
    ) -> MirrorResult<SyncReport> {
        let manifest = self.load_manifest()?;
        let decision = self.reconcile(&manifest, progress);

        info!(
            packages = manifest.len(),
            needs_sync = decision.len(),
            bytes = manifest.total_size(&decision),
            "packages need syncing"
        );

        if decision.is_empty() {
            return Ok(SyncReport::new(&manifest, &decision, None));
        }

        let transfers = self.transfer(&manifest, &decision, progress);
        Ok(SyncReport::new(&manifest, &decision, Some(&transfers)))
    }

    /// Fetch metadata, then sync packages.
    pub fn sync(&self, progress: Option<&Arc<ProgressCallback>>) -> MirrorResult<SyncReport> {
        self.fetch_metadata()?;
        self.sync_packages(progress)
    }
}
