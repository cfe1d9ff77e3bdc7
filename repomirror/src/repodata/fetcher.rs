//! Retrieval of repository metadata.
//!
//! Fetches the index, every metadata file it lists and the detached index
//! signature, checks sizes and digests against the index, and writes the
//! result under the mirror root.

use std::sync::Arc;

use reqwest::Url;
use tracing::{debug, info, warn};

use super::index::{MetadataEntry, RepoIndex};
use crate::checksum::digest_bytes;
use crate::error::{MirrorError, MirrorResult};
use crate::store::{MirrorRoot, INDEX_PATH, SIGNATURE_PATH};
use crate::transport::Transport;

/// What a metadata fetch wrote to disk.
#[derive(Debug, Clone, Default)]
pub struct MetadataSummary {
    /// `(kind, location, bytes)` per persisted metadata file.
    pub files: Vec<(String, String, u64)>,
    /// Integrity problems that were reported but tolerated.
    pub warnings: Vec<String>,
}

impl MetadataSummary {
    /// Whether the fetched metadata matched the index exactly.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Downloads and persists repository metadata.
pub struct MetadataFetcher {
    transport: Arc<dyn Transport>,
    base_url: Url,
    root: MirrorRoot,
    strict: bool,
}

impl MetadataFetcher {
    /// Create a fetcher for the repository at `base_url`.
    ///
    /// `base_url` must end in `/`; see
    /// [`normalize_base_url`](crate::config::normalize_base_url).
    pub fn new(transport: Arc<dyn Transport>, base_url: Url, root: MirrorRoot) -> Self {
        Self {
            transport,
            base_url,
            root,
            strict: false,
        }
    }

    /// Fail instead of warning when metadata does not match the index.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Fetch the index, all listed metadata and the signature, then persist
    /// them.
    ///
    /// Nothing is written unless every request succeeded.
    pub fn fetch(&self) -> MirrorResult<MetadataSummary> {
        let (raw_index, mut index) = self.fetch_index()?;
        info!(entries = index.len(), "repository index parsed");

        let mut summary = MetadataSummary::default();
        for entry in index.entries_mut() {
            self.fetch_entry(entry, &mut summary)?;
        }

        let signature = self.fetch_signature()?;

        info!("saving repodata to disk");
        for entry in index.entries_mut() {
            // Persisted bodies are dropped right away.
            let data = entry.data.take().unwrap_or_default();
            let path = self.root.write_atomic(&entry.location, &data)?;
            debug!(kind = %entry.kind, path = %path.display(), "metadata written");
            summary
                .files
                .push((entry.kind.clone(), entry.location.clone(), data.len() as u64));
        }
        self.root.write_atomic(INDEX_PATH, &raw_index)?;
        self.root.write_atomic(SIGNATURE_PATH, &signature)?;

        Ok(summary)
    }

    fn url_for(&self, location: &str) -> MirrorResult<Url> {
        self.base_url.join(location).map_err(|e| {
            MirrorError::InvalidConfig(format!(
                "cannot join '{}' onto {}: {}",
                location, self.base_url, e
            ))
        })
    }

    fn fetch_index(&self) -> MirrorResult<(Vec<u8>, RepoIndex)> {
        let url = self.url_for(INDEX_PATH)?;
        info!(%url, "requesting repository index");

        let unavailable = |reason: String| MirrorError::IndexUnavailable {
            url: url.to_string(),
            reason,
        };

        let response = self.transport.get(&url).map_err(|e| unavailable(e.to_string()))?;
        if !response.is_success() {
            return Err(unavailable(format!("HTTP status {}", response.status)));
        }
        let raw = response
            .into_bytes(&url)
            .map_err(|e| unavailable(e.to_string()))?;

        let index = RepoIndex::parse(&raw)?;
        Ok((raw, index))
    }

    fn fetch_entry(
        &self,
        entry: &mut MetadataEntry,
        summary: &mut MetadataSummary,
    ) -> MirrorResult<()> {
        let url = self.url_for(&entry.location)?;
        info!(kind = %entry.kind, %url, "requesting metadata");

        let failed = |reason: String| MirrorError::MetadataFetchFailed {
            url: url.to_string(),
            reason,
        };

        let response = self.transport.get(&url).map_err(|e| failed(e.to_string()))?;
        if !response.is_success() {
            return Err(failed(format!("HTTP status {}", response.status)));
        }
        let declared = response.content_length;
        let data = response.into_bytes(&url).map_err(|e| failed(e.to_string()))?;

        let received = declared.unwrap_or(data.len() as u64);
        if received != entry.size {
            self.report_mismatch(
                entry,
                format!("size mismatch, expected {} got {}", entry.size, received),
                summary,
            )?;
        }

        let actual = digest_bytes(entry.checksum.algorithm, &data);
        debug!(
            kind = %entry.kind,
            expected = %entry.checksum.value,
            actual = %actual,
            algorithm = %entry.checksum.algorithm,
            "metadata checksum"
        );
        if !entry.checksum.matches(&actual) {
            self.report_mismatch(
                entry,
                format!(
                    "checksum mismatch, expected {} got {}",
                    entry.checksum, actual
                ),
                summary,
            )?;
        }

        entry.data = Some(data);
        Ok(())
    }

    fn report_mismatch(
        &self,
        entry: &MetadataEntry,
        reason: String,
        summary: &mut MetadataSummary,
    ) -> MirrorResult<()> {
        if self.strict {
            return Err(MirrorError::MetadataIntegrity {
                location: entry.location.clone(),
                reason,
            });
        }
        warn!(kind = %entry.kind, location = %entry.location, "{}", reason);
        summary.warnings.push(format!("{}: {}", entry.location, reason));
        Ok(())
    }

    fn fetch_signature(&self) -> MirrorResult<Vec<u8>> {
        let url = self.url_for(SIGNATURE_PATH)?;
        info!(%url, "requesting index signature");

        let failed = |reason: String| MirrorError::SignatureFetchFailed {
            url: url.to_string(),
            reason,
        };

        let response = self.transport.get(&url).map_err(|e| failed(e.to_string()))?;
        if !response.is_success() {
            return Err(failed(format!("HTTP status {}", response.status)));
        }
        response.into_bytes(&url).map_err(|e| failed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::ChecksumAlgorithm;
    use crate::testing::MockTransport;
    use std::fs;
    use tempfile::TempDir;

    const PRIMARY_PATH: &str = "repodata/0123-primary.xml.gz";

    fn repomd(size: u64, checksum: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<repomd xmlns="http://linux.duke.edu/metadata/repo">
  <data type="primary">
    <checksum type="sha256">{checksum}</checksum>
    <location href="{PRIMARY_PATH}"/>
    <size>{size}</size>
  </data>
</repomd>"#
        )
    }

    fn fetcher(transport: &Arc<MockTransport>, temp: &TempDir) -> MetadataFetcher {
        let transport: Arc<dyn Transport> = transport.clone();
        MetadataFetcher::new(transport, MockTransport::base_url(), MirrorRoot::new(temp.path()))
    }

    fn serve_repository(transport: &MockTransport, body: &[u8], index: &str) {
        transport.serve(INDEX_PATH, index.as_bytes());
        transport.serve(PRIMARY_PATH, body);
        transport.serve(SIGNATURE_PATH, b"-----BEGIN PGP SIGNATURE-----");
    }

    #[test]
    fn test_fetch_persists_everything() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(MockTransport::new());
        let body = vec![b'x'; 120];
        let index = repomd(120, &digest_bytes(ChecksumAlgorithm::Sha256, &body));
        serve_repository(&transport, &body, &index);

        let summary = fetcher(&transport, &temp).fetch().unwrap();

        assert!(summary.is_clean());
        assert_eq!(
            summary.files,
            vec![("primary".to_string(), PRIMARY_PATH.to_string(), 120)]
        );
        assert_eq!(fs::read(temp.path().join(PRIMARY_PATH)).unwrap(), body);
        assert_eq!(
            fs::read_to_string(temp.path().join(INDEX_PATH)).unwrap(),
            index
        );
        assert!(temp.path().join(SIGNATURE_PATH).exists());
    }

    #[test]
    fn test_checksum_mismatch_warns_but_persists() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(MockTransport::new());
        let body = vec![b'x'; 120];
        serve_repository(&transport, &body, &repomd(120, "deadbeef"));

        let summary = fetcher(&transport, &temp).fetch().unwrap();

        assert_eq!(summary.warnings.len(), 1);
        assert!(summary.warnings[0].contains("checksum mismatch"));
        assert!(temp.path().join(PRIMARY_PATH).exists());
    }

    #[test]
    fn test_size_mismatch_warns_from_content_length() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(MockTransport::new());
        let body = vec![b'x'; 120];
        let index = repomd(120, &digest_bytes(ChecksumAlgorithm::Sha256, &body));
        serve_repository(&transport, &body, &index);
        transport.serve_with_length(PRIMARY_PATH, &body, Some(121));

        let summary = fetcher(&transport, &temp).fetch().unwrap();

        assert_eq!(summary.warnings.len(), 1);
        assert!(summary.warnings[0].contains("size mismatch"));
    }

    #[test]
    fn test_strict_mode_rejects_mismatch() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(MockTransport::new());
        serve_repository(&transport, &[b'x'; 120], &repomd(120, "deadbeef"));

        let result = fetcher(&transport, &temp).with_strict(true).fetch();

        assert!(matches!(result, Err(MirrorError::MetadataIntegrity { .. })));
        assert!(!temp.path().join(INDEX_PATH).exists());
    }

    #[test]
    fn test_index_unavailable() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(MockTransport::new());
        transport.serve_status(INDEX_PATH, 503);

        let result = fetcher(&transport, &temp).fetch();
        assert!(matches!(result, Err(MirrorError::IndexUnavailable { .. })));
    }

    #[test]
    fn test_index_connection_error() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(MockTransport::new());
        transport.refuse(INDEX_PATH);

        let result = fetcher(&transport, &temp).fetch();
        assert!(matches!(result, Err(MirrorError::IndexUnavailable { .. })));
    }

    #[test]
    fn test_metadata_fetch_failure_is_fatal() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(MockTransport::new());
        serve_repository(&transport, b"", &repomd(0, "00"));
        transport.serve_status(PRIMARY_PATH, 404);

        let result = fetcher(&transport, &temp).fetch();

        match result {
            Err(MirrorError::MetadataFetchFailed { url, .. }) => {
                assert!(url.ends_with(PRIMARY_PATH));
            }
            other => panic!("expected MetadataFetchFailed, got {:?}", other.map(|_| ())),
        }
        assert!(!temp.path().join(INDEX_PATH).exists());
    }

    #[test]
    fn test_signature_failure_is_fatal() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(MockTransport::new());
        let body = vec![b'x'; 10];
        let index = repomd(10, &digest_bytes(ChecksumAlgorithm::Sha256, &body));
        serve_repository(&transport, &body, &index);
        transport.serve_status(SIGNATURE_PATH, 404);

        let result = fetcher(&transport, &temp).fetch();
        assert!(matches!(result, Err(MirrorError::SignatureFetchFailed { .. })));
    }
}
