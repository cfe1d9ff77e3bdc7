//! Checksum calculation for repository metadata and packages.
//!
//! Repository metadata names the digest algorithm per file, so hashing is
//! dispatched at runtime through [`digest::DynDigest`]. All digests are
//! rendered as lowercase hexadecimal.

use std::fmt::{self, Write as _};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use digest::DynDigest;
use serde::Serialize;

use crate::error::{MirrorError, MirrorResult};

/// Buffer size for reading files during checksum calculation (64KB).
pub(crate) const BUFFER_SIZE: usize = 64 * 1024;

/// Digest algorithms that appear in repodata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl ChecksumAlgorithm {
    /// Canonical lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha224 => "sha224",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }

    /// Start a new streaming hasher for this algorithm.
    pub fn hasher(&self) -> Hasher {
        let inner: Box<dyn DynDigest + Send> = match self {
            Self::Md5 => Box::new(md5::Md5::default()),
            Self::Sha1 => Box::new(sha1::Sha1::default()),
            Self::Sha224 => Box::new(sha2::Sha224::default()),
            Self::Sha256 => Box::new(sha2::Sha256::default()),
            Self::Sha384 => Box::new(sha2::Sha384::default()),
            Self::Sha512 => Box::new(sha2::Sha512::default()),
        };
        Hasher { inner }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = MirrorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            // Old createrepo releases wrote "sha" for SHA-1.
            "sha" | "sha1" => Ok(Self::Sha1),
            "sha224" => Ok(Self::Sha224),
            "sha256" => Ok(Self::Sha256),
            "sha384" => Ok(Self::Sha384),
            "sha512" => Ok(Self::Sha512),
            _ => Err(MirrorError::UnsupportedChecksum(s.to_string())),
        }
    }
}

/// An expected digest: algorithm plus lowercase hex value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Checksum {
    pub algorithm: ChecksumAlgorithm,
    pub value: String,
}

impl Checksum {
    /// Create a checksum, normalizing the hex value to lowercase.
    pub fn new(algorithm: ChecksumAlgorithm, value: impl AsRef<str>) -> Self {
        Self {
            algorithm,
            value: value.as_ref().trim().to_ascii_lowercase(),
        }
    }

    /// Parse an algorithm name and value as found in repodata.
    pub fn parse(algorithm: &str, value: &str) -> MirrorResult<Self> {
        Ok(Self::new(algorithm.parse()?, value))
    }

    /// Whether `actual` (lowercase hex) matches this checksum.
    pub fn matches(&self, actual: &str) -> bool {
        self.value == actual
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.value)
    }
}

/// Streaming hasher over one of the supported algorithms.
pub struct Hasher {
    inner: Box<dyn DynDigest + Send>,
}

impl Hasher {
    /// Feed more bytes.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finish and return the lowercase hex digest.
    pub fn finalize_hex(self) -> String {
        to_hex(&self.inner.finalize())
    }
}

impl fmt::Debug for Hasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hasher")
            .field("output_size", &self.inner.output_size())
            .finish()
    }
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        // Writing to a String cannot fail.
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

/// Digest an in-memory buffer.
pub fn digest_bytes(algorithm: ChecksumAlgorithm, data: &[u8]) -> String {
    let mut hasher = algorithm.hasher();
    hasher.update(data);
    hasher.finalize_hex()
}

/// Digest everything a reader yields.
pub fn digest_reader<R: Read>(
    algorithm: ChecksumAlgorithm,
    reader: &mut R,
) -> std::io::Result<String> {
    let mut hasher = algorithm.hasher();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize_hex())
}

/// Digest a file on disk.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn digest_file(algorithm: ChecksumAlgorithm, path: &Path) -> MirrorResult<String> {
    let mut file = File::open(path).map_err(|e| MirrorError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    digest_reader(algorithm, &mut file).map_err(|e| MirrorError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })
}
