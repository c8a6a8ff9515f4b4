//! Mirror and refresh-limit configuration.
//!
//! Configuration objects are explicit and serializable; nothing is read
//! from the environment. The crate consuming RATCHET decides where mirror
//! maps come from (settings files, flags) and hands them over validated.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

use ratchet_core::{RatchetError, RatchetResult};

/// One named mirror of the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mirror {
    /// Base URL of the mirror, e.g. `https://mirror.example/repo`.
    pub url_prefix: String,
    /// Path under the prefix where metadata lives.
    #[serde(default = "default_metadata_path")]
    pub metadata_path: String,
    /// Path under the prefix where target files live. May be empty when
    /// targets sit at the repository root.
    #[serde(default)]
    pub targets_path: String,
    /// Target directories this mirror is allowed to serve. Empty means
    /// unconfined.
    #[serde(default)]
    pub confined_target_dirs: Vec<String>,
}

fn default_metadata_path() -> String {
    "metadata".to_string()
}

impl Mirror {
    pub fn new(url_prefix: impl Into<String>) -> Self {
        Self {
            url_prefix: url_prefix.into(),
            metadata_path: default_metadata_path(),
            targets_path: String::new(),
            confined_target_dirs: Vec::new(),
        }
    }

    pub fn validate(&self) -> RatchetResult<()> {
        Url::parse(&self.url_prefix).map_err(|e| {
            RatchetError::format(format!("invalid mirror url_prefix '{}': {e}", self.url_prefix))
        })?;
        Ok(())
    }

    /// Whether this mirror is allowed to serve `filepath`.
    pub fn confines(&self, filepath: &str) -> bool {
        if self.confined_target_dirs.is_empty() {
            return true;
        }
        self.confined_target_dirs.iter().any(|dir| {
            let dir = dir.trim_matches('/');
            dir.is_empty() || filepath.trim_start_matches('/').starts_with(&format!("{dir}/"))
        })
    }
}

/// A named, deterministically ordered set of mirrors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MirrorSet {
    mirrors: BTreeMap<String, Mirror>,
}

impl MirrorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, mirror: Mirror) -> &mut Self {
        self.mirrors.insert(name.into(), mirror);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Mirror)> {
        self.mirrors.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.mirrors.is_empty()
    }

    pub fn validate(&self) -> RatchetResult<()> {
        for (name, mirror) in &self.mirrors {
            mirror
                .validate()
                .map_err(|e| RatchetError::format(format!("mirror '{name}': {e}")))?;
        }
        Ok(())
    }
}

/// Resource bounds for one refresh.
///
/// The soft caps bound downloads whose exact size is not yet known from a
/// trusted manifest; they are the only resource bound in the core — there
/// is no timeout, callers wrap the refresh in their own deadline.
#[derive(Debug, Clone)]
pub struct RefreshLimits {
    pub max_root_length: u64,
    pub max_timestamp_length: u64,
    pub max_snapshot_length: u64,
    pub max_targets_length: u64,
    /// Cap on delegated roles visited while resolving one target.
    pub max_delegation_depth: usize,
    /// Cap on root chain-load steps in one refresh.
    pub max_root_rotations: u32,
}

impl Default for RefreshLimits {
    fn default() -> Self {
        Self {
            max_root_length: 512 * 1024,
            max_timestamp_length: 16 * 1024,
            max_snapshot_length: 2 * 1024 * 1024,
            max_targets_length: 5 * 1024 * 1024,
            max_delegation_depth: 32,
            max_root_rotations: 32,
        }
    }
}

impl RefreshLimits {
    pub fn validate(&self) -> RatchetResult<()> {
        if self.max_root_length == 0
            || self.max_timestamp_length == 0
            || self.max_snapshot_length == 0
            || self.max_targets_length == 0
        {
            return Err(RatchetError::format("refresh length caps must be non-zero"));
        }
        if self.max_root_rotations == 0 {
            return Err(RatchetError::format("max_root_rotations must be non-zero"));
        }
        Ok(())
    }
}
