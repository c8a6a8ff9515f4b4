//! Metadata models and the signed wire envelope.
//!
//! The wire shape is `{signed: {...}, signatures: [{keyid, sig}, ...]}`.
//! The envelope keeps `signed` as a raw JSON value: the bytes signatures
//! cover are the canonical encoding of exactly what arrived, never a
//! re-serialization of a typed struct. Typed views are parsed on demand.
//!
//! Models are deliberately "dumb" data; policy (thresholds, expiry,
//! rollback) lives in `verify` and in the client's refresh engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::canonical::canonical_json_bytes;
use crate::errors::{RatchetError, RatchetResult};
use crate::keys::PublicKey;

pub const ROLE_ROOT: &str = "root";
pub const ROLE_TIMESTAMP: &str = "timestamp";
pub const ROLE_SNAPSHOT: &str = "snapshot";
pub const ROLE_TARGETS: &str = "targets";

pub const TOP_LEVEL_ROLES: &[&str] = &[ROLE_ROOT, ROLE_TIMESTAMP, ROLE_SNAPSHOT, ROLE_TARGETS];

/// A single signature over the canonical `signed` bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub keyid: String,
    pub sig: String,
}

/// The signed wire envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub signed: Value,
    pub signatures: Vec<Signature>,
}

impl Metadata {
    pub fn from_bytes(bytes: &[u8]) -> RatchetResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| RatchetError::format(format!("unparseable metadata envelope: {e}")))
    }

    /// Serialize for on-disk persistence. Not canonical; never hashed.
    pub fn to_bytes(&self) -> RatchetResult<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| RatchetError::format(format!("unserializable metadata: {e}")))
    }

    /// The canonical bytes signatures are verified against.
    pub fn signed_bytes(&self) -> RatchetResult<Vec<u8>> {
        canonical_json_bytes(&self.signed)
    }

    pub fn signed_type(&self) -> RatchetResult<&str> {
        self.signed
            .get("_type")
            .and_then(Value::as_str)
            .ok_or_else(|| RatchetError::format("metadata is missing '_type'"))
    }

    pub fn version(&self) -> RatchetResult<u64> {
        self.signed
            .get("version")
            .and_then(Value::as_u64)
            .ok_or_else(|| RatchetError::format("metadata is missing an integer 'version'"))
    }

    pub fn expires(&self) -> RatchetResult<OffsetDateTime> {
        let raw = self
            .signed
            .get("expires")
            .and_then(Value::as_str)
            .ok_or_else(|| RatchetError::format("metadata is missing 'expires'"))?;
        OffsetDateTime::parse(raw, &Rfc3339)
            .map_err(|_| RatchetError::format(format!("unparseable expiration time: {raw}")))
    }

    fn parse_as<T: serde::de::DeserializeOwned>(&self, expected_type: &str) -> RatchetResult<T> {
        let actual = self.signed_type()?;
        if actual != expected_type {
            return Err(RatchetError::format(format!(
                "expected '{expected_type}' metadata, got '{actual}'"
            )));
        }
        serde_json::from_value(self.signed.clone())
            .map_err(|e| RatchetError::format(format!("malformed {expected_type} metadata: {e}")))
    }

    pub fn parse_root(&self) -> RatchetResult<RootMeta> {
        self.parse_as(ROLE_ROOT)
    }

    pub fn parse_timestamp(&self) -> RatchetResult<TimestampMeta> {
        self.parse_as(ROLE_TIMESTAMP)
    }

    pub fn parse_snapshot(&self) -> RatchetResult<SnapshotMeta> {
        self.parse_as(ROLE_SNAPSHOT)
    }

    pub fn parse_targets(&self) -> RatchetResult<TargetsMeta> {
        self.parse_as(ROLE_TARGETS)
    }
}

/// Keyids and threshold a top-level role is authorized with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleKeys {
    pub keyids: Vec<String>,
    pub threshold: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootMeta {
    #[serde(rename = "_type")]
    pub meta_type: String,
    pub version: u64,
    pub expires: String,
    #[serde(default)]
    pub consistent_snapshot: bool,
    pub keys: BTreeMap<String, PublicKey>,
    pub roles: BTreeMap<String, RoleKeys>,
}

/// Version/length/hashes a manifest declares for one metadata file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaFileInfo {
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashes: Option<BTreeMap<String, String>>,
}

impl MetaFileInfo {
    /// Content comparison: length and hashes only. Used by the fileinfo
    /// cache to decide whether a re-download is needed; version freshness
    /// is a separate question answered by the version cache.
    pub fn same_content(&self, other: &MetaFileInfo) -> bool {
        self.length == other.length && self.hashes == other.hashes
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampMeta {
    #[serde(rename = "_type")]
    pub meta_type: String,
    pub version: u64,
    pub expires: String,
    pub meta: BTreeMap<String, MetaFileInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMeta {
    #[serde(rename = "_type")]
    pub meta_type: String,
    pub version: u64,
    pub expires: String,
    pub meta: BTreeMap<String, MetaFileInfo>,
}

/// Trusted descriptor for one target file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetInfo {
    pub length: u64,
    pub hashes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<Value>,
}

/// A target path paired with its trusted fileinfo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDescriptor {
    pub filepath: String,
    pub info: TargetInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetsMeta {
    #[serde(rename = "_type")]
    pub meta_type: String,
    pub version: u64,
    pub expires: String,
    #[serde(default)]
    pub targets: BTreeMap<String, TargetInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegations: Option<Delegations>,
}

/// The delegation section of a targets role.
///
/// `keys` and `roles` stay raw: the importer applies an asymmetric policy
/// (skip unknown key types, reject structurally broken entries) that a
/// strict typed parse here would flatten.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Delegations {
    #[serde(default)]
    pub keys: BTreeMap<String, Value>,
    #[serde(default)]
    pub roles: Vec<Value>,
}

/// A delegated role entry, once it has passed the strict parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegatedRole {
    pub name: String,
    pub keyids: Vec<String>,
    pub threshold: u32,
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub path_hash_prefixes: Vec<String>,
    #[serde(default)]
    pub terminating: bool,
}

/// The flat filename a role's metadata lives under.
pub fn role_filename(role: &str) -> String {
    format!("{role}.json")
}

/// Rewrite a path so the basename embeds its digest, as repositories with
/// consistent snapshots lay files out: `targets/app.bin` with digest
/// `abc...` becomes `targets/abc....app.bin`. Applies to metadata
/// filenames and target paths alike.
pub fn consistent_path(path: &str, digest: &str) -> String {
    match path.rsplit_once('/') {
        Some((dir, base)) => format!("{dir}/{digest}.{base}"),
        None => format!("{digest}.{path}"),
    }
}

/// Pick the digest used for consistent-snapshot naming: sha256 when
/// declared, otherwise the first algorithm in the set.
pub fn naming_digest(hashes: &BTreeMap<String, String>) -> Option<&str> {
    hashes
        .get("sha256")
        .or_else(|| hashes.values().next())
        .map(String::as_str)
}
