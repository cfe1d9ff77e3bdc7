//! Package manifest parsed from primary metadata.
//!
//! The primary metadata lists every package the repository serves. Only the
//! three fields needed for mirroring are kept: where the package lives, how
//! large it is and its digest. Records keep document order, and every later
//! phase refers to a package by its position in the [`Manifest`].

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use flate2::read::MultiGzDecoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, info, warn};

use crate::checksum::Checksum;
use crate::error::{MirrorError, MirrorResult};
use crate::reconcile::SyncDecision;
use crate::repodata::RepoIndex;
use crate::store::{MirrorRoot, INDEX_PATH};
use crate::xml::{attribute, set_once, text};

/// A package to mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    /// Path relative to the repository root.
    pub location: String,
    /// Package size in bytes.
    pub size: u64,
    /// Expected digest.
    pub checksum: Checksum,
}

/// Compression applied to a metadata file, decided by its suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Zstd,
}

impl Compression {
    /// Detect compression from a file extension.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| match ext.to_ascii_lowercase().as_str() {
                "gz" => Self::Gzip,
                "zst" => Self::Zstd,
                _ => Self::None,
            })
            .unwrap_or(Self::None)
    }

    /// Open `path` and return a reader over its decompressed content.
    pub fn open(&self, path: &Path) -> MirrorResult<Box<dyn BufRead>> {
        let read_failed = |e| MirrorError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        };

        let file = File::open(path).map_err(read_failed)?;
        let reader: Box<dyn BufRead> = match self {
            Self::None => Box::new(BufReader::new(file)),
            Self::Gzip => Box::new(BufReader::new(MultiGzDecoder::new(file))),
            Self::Zstd => Box::new(BufReader::new(
                zstd::stream::read::Decoder::new(file).map_err(read_failed)?,
            )),
        };
        Ok(reader)
    }
}

/// Ordered, immutable list of packages.
///
/// Cloning is cheap; clones share the same records.
#[derive(Debug, Clone)]
pub struct Manifest {
    records: Arc<[PackageRecord]>,
}

impl Manifest {
    pub fn new(records: Vec<PackageRecord>) -> Self {
        Self {
            records: records.into(),
        }
    }

    /// Load the manifest of an already-mirrored repository.
    ///
    /// Reads the local `repodata/repomd.xml`, finds the primary metadata it
    /// references and parses that.
    ///
    /// # Errors
    ///
    /// `RepodataMissing` when the mirror has no index, `PrimaryMissing` when
    /// the primary file the index names is absent.
    pub fn from_mirror(root: &MirrorRoot) -> MirrorResult<Self> {
        let index_path = root.resolve(INDEX_PATH)?;
        if !index_path.is_file() {
            return Err(MirrorError::RepodataMissing { path: index_path });
        }

        let raw = fs::read(&index_path).map_err(|e| MirrorError::ReadFailed {
            path: index_path.clone(),
            source: e,
        })?;
        let index = RepoIndex::parse(&raw)?;
        let primary = index.primary().ok_or_else(|| MirrorError::IndexMalformed {
            reason: "no primary metadata listed".to_string(),
        })?;

        let primary_path = root.resolve(&primary.location)?;
        if !primary_path.is_file() {
            return Err(MirrorError::PrimaryMissing { path: primary_path });
        }

        info!(path = %primary_path.display(), "loading primary metadata");
        Self::from_file(&primary_path)
    }

    /// Parse a primary metadata file, decompressing by suffix.
    pub fn from_file(path: &Path) -> MirrorResult<Self> {
        let reader = Compression::from_path(path).open(path)?;
        let records = parse_primary(reader)?;
        debug!(packages = records.len(), "primary metadata parsed");
        Ok(Self::new(records))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PackageRecord> {
        self.records.get(index)
    }

    pub fn records(&self) -> &[PackageRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &PackageRecord> {
        self.records.iter()
    }

    /// Bytes that transferring `decision` will move.
    pub fn total_size(&self, decision: &SyncDecision) -> u64 {
        decision
            .indices()
            .iter()
            .filter_map(|&i| self.get(i))
            .map(|record| record.size)
            .sum()
    }
}

#[derive(Default)]
struct PendingPackage {
    location: Option<String>,
    checksum_type: Option<String>,
    checksum: Option<String>,
    size: Option<String>,
}

impl PendingPackage {
    fn finish(self) -> Result<PackageRecord, String> {
        let location = self.location.ok_or("missing <location href>")?;
        let algorithm = self.checksum_type.ok_or("missing <checksum type>")?;
        let value = self.checksum.ok_or("missing <checksum>")?;
        let size = self.size.ok_or("missing <size package>")?;

        if location.is_empty() {
            return Err("empty <location href>".to_string());
        }
        let checksum = Checksum::parse(&algorithm, &value).map_err(|e| e.to_string())?;
        let size = size
            .trim()
            .parse::<u64>()
            .map_err(|_| format!("invalid package size '{}'", size))?;

        Ok(PackageRecord {
            location,
            size,
            checksum,
        })
    }
}

/// Stream the primary metadata XML into package records.
///
/// Only unprefixed `location`, `checksum` and `size` children of `<package>`
/// are read, so `rpm:`-namespaced format data never interferes.
///
/// # Errors
///
/// `ManifestEntryMalformed` for the first package with a missing, duplicated
/// or unparsable field, for a package whose location repeats an earlier one,
/// or when the document itself cannot be read.
pub fn parse_primary<R: BufRead>(source: R) -> MirrorResult<Vec<PackageRecord>> {
    let mut reader = Reader::from_reader(source);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut records = Vec::new();
    let mut seen = HashSet::new();
    let mut declared: Option<usize> = None;
    let mut pending: Option<PendingPackage> = None;
    let mut in_checksum = false;
    let mut checksum_text = String::new();

    loop {
        let position = records.len();
        let malformed = |reason: String| MirrorError::ManifestEntryMalformed { position, reason };
        let offset = reader.buffer_position();

        match reader
            .read_event_into(&mut buf)
            .map_err(|e| malformed(format!("XML error near byte {}: {}", offset, e)))?
        {
            Event::Start(e) => match e.name().as_ref() {
                b"metadata" => declared = declared_count(&e),
                b"package" => pending = Some(PendingPackage::default()),
                name => {
                    if let Some(package) = pending.as_mut() {
                        in_checksum = start_field(package, name, &e).map_err(malformed)?;
                        checksum_text.clear();
                    }
                }
            },
            Event::Empty(e) => {
                if let Some(package) = pending.as_mut() {
                    start_field(package, e.name().as_ref(), &e).map_err(malformed)?;
                }
            }
            Event::Text(t) => {
                if in_checksum {
                    checksum_text.push_str(&text(&t).map_err(malformed)?);
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"checksum" if in_checksum => {
                    in_checksum = false;
                    if let Some(package) = pending.as_mut() {
                        let value = std::mem::take(&mut checksum_text);
                        set_once(&mut package.checksum, value, "checksum").map_err(malformed)?;
                    }
                }
                b"package" => {
                    if let Some(package) = pending.take() {
                        let record = package.finish().map_err(malformed)?;
                        if !seen.insert(record.location.clone()) {
                            return Err(malformed(format!(
                                "duplicate location '{}'",
                                record.location
                            )));
                        }
                        records.push(record);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }

        buf.clear();
    }

    if pending.is_some() {
        return Err(MirrorError::ManifestEntryMalformed {
            position: records.len(),
            reason: "unterminated <package> element".to_string(),
        });
    }

    if let Some(declared) = declared.filter(|&n| n != records.len()) {
        warn!(
            declared,
            parsed = records.len(),
            "primary metadata package count differs from its header"
        );
    }

    Ok(records)
}

fn declared_count(element: &BytesStart<'_>) -> Option<usize> {
    attribute(element, "packages")
        .ok()
        .flatten()
        .and_then(|count| count.trim().parse().ok())
}

/// Record a child of `<package>`. Returns whether checksum text follows.
fn start_field(
    package: &mut PendingPackage,
    name: &[u8],
    element: &BytesStart<'_>,
) -> Result<bool, String> {
    match name {
        b"location" => {
            let href = attribute(element, "href")?.ok_or("<location> without href")?;
            set_once(&mut package.location, href, "location")?;
            Ok(false)
        }
        b"checksum" => {
            let algorithm = attribute(element, "type")?.ok_or("<checksum> without type")?;
            set_once(&mut package.checksum_type, algorithm, "checksum type")?;
            Ok(true)
        }
        b"size" => {
            let size = attribute(element, "package")?.ok_or("<size> without package attribute")?;
            set_once(&mut package.size, size, "size")?;
            Ok(false)
        }
        _ => Ok(false),
    }
}
