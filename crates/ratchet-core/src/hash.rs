//! Content hashing.
//!
//! All digests are explicitly parameterized; there is no implicit default
//! algorithm. Trusted metadata may declare several digests for one file so
//! the trust chain survives a future break of any single algorithm — every
//! declared algorithm must match exactly.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256, Sha512};

use crate::errors::{RatchetError, RatchetResult};

/// Hash algorithm identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlg {
    Sha256,
    Sha512,
}

impl HashAlg {
    /// Parse an algorithm name as it appears in metadata.
    pub fn parse(s: &str) -> RatchetResult<Self> {
        match s {
            "sha256" => Ok(HashAlg::Sha256),
            "sha512" => Ok(HashAlg::Sha512),
            _ => Err(RatchetError::format(format!(
                "unsupported hash algorithm: {s}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }
}

/// Hash raw bytes using the selected algorithm.
pub fn hash_bytes(alg: HashAlg, bytes: &[u8]) -> Vec<u8> {
    match alg {
        HashAlg::Sha256 => {
            let mut h = Sha256::new();
            h.update(bytes);
            h.finalize().to_vec()
        }
        HashAlg::Sha512 => {
            let mut h = Sha512::new();
            h.update(bytes);
            h.finalize().to_vec()
        }
    }
}

/// Hash raw bytes and return the lowercase hex digest.
pub fn hash_bytes_hex(alg: HashAlg, bytes: &[u8]) -> String {
    hex::encode(hash_bytes(alg, bytes))
}

/// Check `bytes` against a trusted hash set.
///
/// Every algorithm present in the set is recomputed over the full content;
/// a single mismatch is fatal. An empty set is a format error — trusted
/// fileinfo must name at least one digest.
pub fn verify_hashes(bytes: &[u8], hashes: &BTreeMap<String, String>) -> RatchetResult<()> {
    if hashes.is_empty() {
        return Err(RatchetError::format("trusted hash set is empty"));
    }

    for (name, expected) in hashes {
        let alg = HashAlg::parse(name)?;
        let observed = hash_bytes_hex(alg, bytes);
        if observed != *expected {
            return Err(RatchetError::BadHash {
                algorithm: name.clone(),
                expected: expected.clone(),
                observed,
            });
        }
    }
    Ok(())
}
