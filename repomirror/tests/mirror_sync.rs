//! Integration tests for the mirror engine.
//!
//! These tests drive complete mirror runs against an in-memory repository:
//! - Metadata fetch → index, primary and signature persisted
//! - Local reconciliation → only missing packages transferred
//! - Transfer failures → recorded per package, batch continues
//!
//! Run with: `cargo test --test mirror_sync`

use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Write};
use std::sync::Arc;

use flate2::write::GzEncoder;
use parking_lot::Mutex;
use tempfile::TempDir;

use repomirror::checksum::digest_bytes;
use repomirror::{
    ChecksumAlgorithm, Manifest, Mirror, MirrorConfig, MirrorError, MirrorResult, MirrorRoot,
    Transport, TransportResponse, Url,
};

const BASE_URL: &str = "https://repo.example.org/fedora/x86_64/os/";

// ============================================================================
// In-memory repository
// ============================================================================

/// Serves files keyed by their path below [`BASE_URL`]; anything else is 404.
#[derive(Default)]
struct StaticRepository {
    files: Mutex<HashMap<String, Vec<u8>>>,
    requests: Mutex<Vec<String>>,
}

impl StaticRepository {
    fn put(&self, path: &str, body: impl Into<Vec<u8>>) {
        self.files.lock().insert(path.to_string(), body.into());
    }

    fn remove(&self, path: &str) {
        self.files.lock().remove(path);
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

impl Transport for StaticRepository {
    fn get(&self, url: &Url) -> MirrorResult<TransportResponse> {
        let path = url.as_str().trim_start_matches(BASE_URL).to_string();
        self.requests.lock().push(path.clone());

        let (status, body) = match self.files.lock().get(&path) {
            Some(body) => (200, body.clone()),
            None => (404, Vec::new()),
        };

        Ok(TransportResponse {
            status,
            content_length: Some(body.len() as u64),
            body: Box::new(Cursor::new(body)),
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn sha256(data: &[u8]) -> String {
    digest_bytes(ChecksumAlgorithm::Sha256, data)
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// A `repomd.xml` listing a single primary entry.
fn repomd(primary_location: &str, primary: &[u8]) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<repomd xmlns="http://linux.duke.edu/metadata/repo" xmlns:rpm="http://linux.duke.edu/metadata/rpm">
  <revision>1700000000</revision>
  <data type="primary">
    <checksum type="sha256">{}</checksum>
    <open-checksum type="sha256">0000</open-checksum>
    <location href="{}"/>
    <timestamp>1700000000</timestamp>
    <size>{}</size>
    <open-size>1</open-size>
  </data>
</repomd>"#,
        sha256(primary),
        primary_location,
        primary.len()
    )
}

/// A primary metadata document for `(location, content)` pairs.
fn primary_xml(packages: &[(&str, &str)]) -> String {
    let mut xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <metadata xmlns=\"http://linux.duke.edu/metadata/common\" \
         xmlns:rpm=\"http://linux.duke.edu/metadata/rpm\" packages=\"{}\">\n",
        packages.len()
    );
    for (location, content) in packages {
        xml.push_str(&format!(
            r#"<package type="rpm">
  <name>pkg</name>
  <arch>x86_64</arch>
  <checksum type="sha256" pkgid="YES">{}</checksum>
  <size package="{}" installed="1" archive="1"/>
  <location href="{}"/>
  <format><rpm:license>MIT</rpm:license><rpm:header-range start="1" end="2"/></format>
</package>
"#,
            sha256(content.as_bytes()),
            content.len(),
            location
        ));
    }
    xml.push_str("</metadata>\n");
    xml
}

/// Publish a full repository: index, gzipped primary, signature, packages.
fn publish(repo: &StaticRepository, packages: &[(&str, &str)]) {
    let primary_location = "repodata/4a5b-primary.xml.gz";
    let primary = gzip(primary_xml(packages).as_bytes());

    repo.put("repodata/repomd.xml", repomd(primary_location, &primary));
    repo.put(primary_location, primary);
    repo.put("repodata/repomd.xml.asc", "-----BEGIN PGP SIGNATURE-----");
    for (location, content) in packages {
        repo.put(location, content.as_bytes());
    }
}

fn mirror(repo: &Arc<StaticRepository>, dir: &TempDir, download_threads: usize) -> Mirror {
    let config = MirrorConfig::new(BASE_URL, dir.path())
        .with_download_workers(download_threads)
        .with_check_workers(4);
    let transport: Arc<dyn Transport> = repo.clone();
    Mirror::with_transport(config, transport).unwrap()
}

// ============================================================================
// Integration Tests
// ============================================================================

/// An index with one primary entry whose size and sha256 match the served
/// body: no warnings, and the primary, the index and the signature all land
/// at their declared paths.
#[test]
fn test_metadata_fetch_persists_declared_paths() {
    let dir = TempDir::new().unwrap();
    let repo = Arc::new(StaticRepository::default());

    let primary = vec![7u8; 120];
    repo.put("repodata/repomd.xml", repomd("repodata/abc-primary.xml.gz", &primary));
    repo.put("repodata/abc-primary.xml.gz", primary.clone());
    repo.put("repodata/repomd.xml.asc", "sig");

    let summary = mirror(&repo, &dir, 4).fetch_metadata().unwrap();

    assert!(summary.is_clean());
    assert_eq!(
        fs::read(dir.path().join("repodata/abc-primary.xml.gz")).unwrap(),
        primary
    );
    assert!(dir.path().join("repodata/repomd.xml").is_file());
    assert_eq!(
        fs::read_to_string(dir.path().join("repodata/repomd.xml.asc")).unwrap(),
        "sig"
    );
}

/// Three packages, the first already mirrored: exactly the other two are
/// fetched, and a second pass finds nothing to do.
#[test]
fn test_sync_transfers_only_missing_packages() {
    let dir = TempDir::new().unwrap();
    let repo = Arc::new(StaticRepository::default());
    let packages: &[(&str, &str)] = &[
        ("Packages/a/alpha-1.0.rpm", "alpha package"),
        ("Packages/b/bravo-2.0.rpm", "bravo package"),
        ("Packages/c/charlie-3.0.rpm", "charlie package"),
    ];
    publish(&repo, packages);

    let mirror = mirror(&repo, &dir, 2);
    mirror.fetch_metadata().unwrap();
    MirrorRoot::new(dir.path())
        .write_atomic(packages[0].0, packages[0].1.as_bytes())
        .unwrap();

    let manifest = mirror.load_manifest().unwrap();
    let decision = mirror.reconcile(&manifest, None);
    assert_eq!(decision.indices(), &[1, 2]);

    let report = mirror.sync_packages(None).unwrap();
    assert_eq!(report.packages, 3);
    assert_eq!(report.needs_sync, 2);
    assert_eq!(report.transferred, 2);
    assert!(report.is_complete());

    let package_requests: Vec<_> = repo
        .requests()
        .into_iter()
        .filter(|path| path.starts_with("Packages/"))
        .collect();
    assert_eq!(package_requests.len(), 2);
    assert!(!package_requests.contains(&packages[0].0.to_string()));

    for (location, content) in packages {
        assert_eq!(fs::read_to_string(dir.path().join(location)).unwrap(), *content);
    }
    assert!(mirror.reconcile(&manifest, None).is_empty());
}

/// Two packages where the second cannot be fetched: the first is still
/// mirrored, and the failure names the remote URL.
#[test]
fn test_failed_transfer_is_reported() {
    let dir = TempDir::new().unwrap();
    let repo = Arc::new(StaticRepository::default());
    let packages: &[(&str, &str)] = &[
        ("Packages/a/alpha-1.0.rpm", "alpha package"),
        ("Packages/b/bravo-2.0.rpm", "bravo package"),
    ];
    publish(&repo, packages);
    repo.remove(packages[1].0);

    let report = mirror(&repo, &dir, 20).sync(None).unwrap();

    assert_eq!(report.needs_sync, 2);
    assert_eq!(report.transferred, 1);
    assert_eq!(
        report.failures,
        vec![format!("{}{}", BASE_URL, packages[1].0)]
    );
    assert!(!report.is_complete());
    assert_eq!(
        fs::read_to_string(dir.path().join(packages[0].0)).unwrap(),
        packages[0].1
    );
    assert!(!dir.path().join(packages[1].0).exists());
}

/// A corrupted local copy of the right size is detected by digest and
/// replaced.
#[test]
fn test_corrupt_package_is_replaced() {
    let dir = TempDir::new().unwrap();
    let repo = Arc::new(StaticRepository::default());
    let packages: &[(&str, &str)] = &[("Packages/a/alpha-1.0.rpm", "alpha package")];
    publish(&repo, packages);

    let mirror = mirror(&repo, &dir, 1);
    mirror.fetch_metadata().unwrap();
    MirrorRoot::new(dir.path())
        .write_atomic(packages[0].0, b"alpha packagf")
        .unwrap();

    let report = mirror.sync_packages(None).unwrap();

    assert_eq!(report.needs_sync, 1);
    assert!(report.is_complete());
    assert_eq!(
        fs::read(dir.path().join(packages[0].0)).unwrap(),
        b"alpha package"
    );
}

/// Metadata integrity problems are tolerated by default and fatal in strict
/// mode.
#[test]
fn test_strict_metadata() {
    let repo = Arc::new(StaticRepository::default());
    let primary = b"not what the index promised".to_vec();
    repo.put("repodata/repomd.xml", repomd("repodata/p.xml.gz", b"something else"));
    repo.put("repodata/p.xml.gz", primary);
    repo.put("repodata/repomd.xml.asc", "sig");

    let lenient_dir = TempDir::new().unwrap();
    let summary = mirror(&repo, &lenient_dir, 1).fetch_metadata().unwrap();
    assert_eq!(summary.warnings.len(), 2);

    let strict_dir = TempDir::new().unwrap();
    let config = MirrorConfig::new(BASE_URL, strict_dir.path()).with_strict_metadata(true);
    let transport: Arc<dyn Transport> = repo.clone();
    let result = Mirror::with_transport(config, transport)
        .unwrap()
        .fetch_metadata();
    assert!(matches!(result, Err(MirrorError::MetadataIntegrity { .. })));
}

/// The package pass works from local metadata alone.
#[test]
fn test_manifest_from_mirrored_metadata() {
    let dir = TempDir::new().unwrap();
    let repo = Arc::new(StaticRepository::default());
    publish(
        &repo,
        &[
            ("Packages/a/alpha-1.0.rpm", "alpha package"),
            ("Packages/b/bravo-2.0.rpm", "bravo package"),
        ],
    );
    mirror(&repo, &dir, 1).fetch_metadata().unwrap();

    let manifest = Manifest::from_mirror(&MirrorRoot::new(dir.path())).unwrap();

    assert_eq!(manifest.len(), 2);
    assert_eq!(manifest.records()[1].location, "Packages/b/bravo-2.0.rpm");
    assert_eq!(manifest.records()[1].size, 13);
}
