// src/hash.rs

//! Checksums for downloaded artifacts and cache content
//!
//! Indexes advertise `#md5=` (and sometimes `#sha256=`) fragments on
//! their links. The network cache addresses blobs by SHA-512 and derives
//! directory keys from the MD5 of the source URL.

use md5::Md5;
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Digest families we can check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Md5,
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// Digest length in hex characters
    pub const fn hex_len(self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Sha256 => 64,
            Self::Sha512 => 128,
        }
    }

    /// Fragment key, e.g. `md5` in `#md5=...`
    pub const fn name(self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    fn digest<R: Read>(self, reader: &mut R) -> io::Result<String> {
        match self {
            Self::Md5 => digest_hex::<Md5, R>(reader),
            Self::Sha256 => digest_hex::<Sha256, R>(reader),
            Self::Sha512 => digest_hex::<Sha512, R>(reader),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        [Self::Md5, Self::Sha256, Self::Sha512]
            .into_iter()
            .find(|alg| alg.name() == lower.replace('-', ""))
            .ok_or_else(|| HashError::UnknownAlgorithm(s.to_string()))
    }
}

/// A checksum that could not be parsed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    #[error("unknown hash algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("{algorithm} digest must be {expected} hex characters, got {got}")]
    InvalidLength {
        algorithm: HashAlgorithm,
        expected: usize,
        got: usize,
    },

    #[error("not a hex digest: {0}")]
    InvalidHex(String),
}

/// An expected or computed digest
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Hash {
    pub algorithm: HashAlgorithm,
    /// Lower-case hex
    pub value: String,
}

impl Hash {
    /// Validate `value` as a hex digest for `algorithm`
    pub fn new(algorithm: HashAlgorithm, value: impl Into<String>) -> Result<Self, HashError> {
        let value = value.into();
        if value.len() != algorithm.hex_len() {
            return Err(HashError::InvalidLength {
                algorithm,
                expected: algorithm.hex_len(),
                got: value.len(),
            });
        }
        if !value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(HashError::InvalidHex(value));
        }
        Ok(Self {
            algorithm,
            value: value.to_ascii_lowercase(),
        })
    }

    /// Checksum carried by a link fragment such as `#md5=...`
    ///
    /// Fragments without a recognised `<algorithm>=<digest>` part (for
    /// example `#egg=foo-1.0`) yield `None`.
    pub fn from_url_fragment(url: &str) -> Option<Self> {
        let (_, fragment) = url.split_once('#')?;
        fragment.split('&').find_map(|part| {
            let (key, digest) = part.split_once('=')?;
            Self::new(key.parse().ok()?, digest).ok()
        })
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.value)
    }
}

fn digest_hex<D: Digest, R: Read>(reader: &mut R) -> io::Result<String> {
    let mut digest = D::new();
    let mut chunk = [0u8; 16 * 1024];
    loop {
        match reader.read(&mut chunk)? {
            0 => break,
            n => digest.update(&chunk[..n]),
        }
    }
    Ok(hex::encode(digest.finalize()))
}

pub fn hash_bytes(algorithm: HashAlgorithm, data: &[u8]) -> Hash {
    let mut data = data;
    // reading from a slice cannot fail
    let value = algorithm.digest(&mut data).unwrap_or_default();
    Hash { algorithm, value }
}

/// Digest a file in chunks
pub fn hash_file(algorithm: HashAlgorithm, path: &Path) -> io::Result<Hash> {
    let value = algorithm.digest(&mut File::open(path)?)?;
    Ok(Hash { algorithm, value })
}

/// Cache directory key component for a URL
pub fn md5_hex(data: &str) -> String {
    hash_bytes(HashAlgorithm::Md5, data.as_bytes()).value
}

/// Content address used by the network cache
pub fn sha512_hex(data: &[u8]) -> String {
    hash_bytes(HashAlgorithm::Sha512, data).value
}

/// A file whose digest differs from the advertised one
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{algorithm} mismatch: expected {expected}, got {actual}")]
pub struct VerifyError {
    pub algorithm: HashAlgorithm,
    pub expected: String,
    pub actual: String,
}

/// Check a file against an expected digest
///
/// The outer error is I/O; the inner one is a mismatch.
pub fn verify_file(path: &Path, expected: &Hash) -> io::Result<Result<(), VerifyError>> {
    let actual = hash_file(expected.algorithm, path)?;
    if actual.value == expected.value {
        return Ok(Ok(()));
    }
    Ok(Err(VerifyError {
        algorithm: expected.algorithm,
        expected: expected.value.clone(),
        actual: actual.value,
    }))
}
