//! Error types for RATCHET.
//!
//! One flat taxonomy shared by `ratchet-core` and `ratchet-client`. The
//! variants mirror the trust decisions the engine makes: format violations
//! fail fast, integrity failures from a single source are accumulated into
//! a per-source map, and `NoWorkingMirror` is raised only once every source
//! has been exhausted.

use std::collections::BTreeMap;

use thiserror::Error;

/// Result alias used across the RATCHET crates.
pub type RatchetResult<T> = std::result::Result<T, RatchetError>;

#[derive(Debug, Error)]
pub enum RatchetError {
    /// Schema violation in configuration, metadata, or a delegation entry.
    #[error("format error: {0}")]
    Format(String),

    #[error("metadata for role '{role}' expired at {expires}")]
    ExpiredMetadata { role: String, expires: String },

    /// Version regression: the candidate is older than what we already trust.
    #[error(
        "rollback detected for role '{role}': candidate version {new_version} \
         is older than trusted version {trusted_version}"
    )]
    Rollback {
        role: String,
        trusted_version: u64,
        new_version: u64,
    },

    /// The candidate's version does not match the version its parent
    /// manifest declares for it.
    #[error("role '{role}' has version {received}, manifest declares {expected}")]
    BadVersionNumber {
        role: String,
        expected: u64,
        received: u64,
    },

    #[error("downloaded {observed} bytes, trusted length is {expected}")]
    LengthMismatch { observed: u64, expected: u64 },

    #[error("download of '{name}' exceeded the {limit}-byte cap")]
    DownloadTooLarge { name: String, limit: u64 },

    #[error("{algorithm} digest mismatch: expected {expected}, observed {observed}")]
    BadHash {
        algorithm: String,
        expected: String,
        observed: String,
    },

    #[error("role '{role}' satisfied by {verified} distinct keys, threshold is {threshold}")]
    InsufficientSignatures {
        role: String,
        verified: usize,
        threshold: u32,
    },

    /// Every source for a file was exhausted. Carries the per-source error
    /// map so callers can tell a partial outage from tampering.
    #[error("no working source for '{name}': {}", render_source_errors(.errors))]
    NoWorkingMirror {
        name: String,
        errors: BTreeMap<String, RatchetError>,
    },

    /// Structural misconfiguration of the repository instance itself.
    #[error("repository error: {0}")]
    Repository(String),

    #[error("unknown role '{0}'")]
    UnknownRole(String),

    #[error("unknown key '{0}'")]
    UnknownKey(String),

    #[error("target '{0}' is not listed by any trusted role")]
    UnknownTarget(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("git error: {0}")]
    Git(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl RatchetError {
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    pub fn repository(msg: impl Into<String>) -> Self {
        Self::Repository(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn git(msg: impl Into<String>) -> Self {
        Self::Git(msg.into())
    }
}

fn render_source_errors(errors: &BTreeMap<String, RatchetError>) -> String {
    if errors.is_empty() {
        return "no sources configured".to_string();
    }
    errors
        .iter()
        .map(|(source, err)| format!("{source}: {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}
