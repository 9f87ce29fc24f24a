//! Content fingerprints used to detect whether a file changed between
//! detection and archival.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use md5::Md5;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Size of each read while hashing. Memory use stays flat regardless of
/// file size.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Errors raised while fingerprinting a file.
#[derive(Debug, Error)]
pub enum FingerprintError {
    /// The requested digest algorithm is not available.
    #[error("hash algorithm '{0}' is not supported")]
    HashUnavailable(String),

    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

/// Digest algorithms available for fingerprinting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    #[default]
    Md5,
    Sha256,
    Blake3,
}

impl FromStr for HashAlgorithm {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "md5" => Ok(HashAlgorithm::Md5),
            "sha256" => Ok(HashAlgorithm::Sha256),
            "blake3" => Ok(HashAlgorithm::Blake3),
            _ => Err(FingerprintError::HashUnavailable(s.to_string())),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashAlgorithm::Md5 => write!(f, "MD5"),
            HashAlgorithm::Sha256 => write!(f, "SHA-256"),
            HashAlgorithm::Blake3 => write!(f, "BLAKE3"),
        }
    }
}

/// Lowercase hex digest of a file's content.
///
/// Two fingerprints are equal iff their hex strings are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap an existing hex digest, e.g. one recorded earlier.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint the file at `path`.
pub fn compute(path: &Path, algorithm: HashAlgorithm) -> Result<Fingerprint, FingerprintError> {
    let io_err = |source| FingerprintError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;

    let hex = match algorithm {
        HashAlgorithm::Md5 => digest_reader::<Md5>(file),
        HashAlgorithm::Sha256 => digest_reader::<Sha256>(file),
        HashAlgorithm::Blake3 => blake3_reader(file),
    }
    .map_err(io_err)?;

    Ok(Fingerprint(hex))
}

/// Fingerprint using an algorithm given by name, e.g. `"MD5"`.
pub fn compute_named(path: &Path, algorithm: &str) -> Result<Fingerprint, FingerprintError> {
    compute(path, algorithm.parse()?)
}

fn digest_reader<D: Digest>(reader: impl Read) -> io::Result<String> {
    let mut hasher = D::new();
    stream(reader, |chunk| hasher.update(chunk))?;
    Ok(hex::encode(hasher.finalize()))
}

fn blake3_reader(reader: impl Read) -> io::Result<String> {
    let mut hasher = blake3::Hasher::new();
    stream(reader, |chunk| {
        hasher.update(chunk);
    })?;
    Ok(hasher.finalize().to_hex().to_string())
}

/// Feed `reader` to `update` in [`CHUNK_SIZE`] pieces.
fn stream(mut reader: impl Read, mut update: impl FnMut(&[u8])) -> io::Result<()> {
    let mut buffer = [0u8; CHUNK_SIZE];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            return Ok(());
        }
        update(&buffer[..read]);
    }
}
