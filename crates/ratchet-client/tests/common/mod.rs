//! Shared fixtures: a fully-signed in-memory repository and a fake git
//! history to refresh it from.
//!
//! Keys are derived from fixed seeds so fixtures are deterministic; every
//! envelope is signed over the same canonical bytes the engine verifies.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use ed25519_dalek::{Signer, SigningKey};
use serde_json::{json, Value};
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

use ratchet_client::git::{CommitId, GitHistory};
use ratchet_client::transport::GitCommitHandler;
use ratchet_client::{RefreshLimits, Transport, TrustEngine};
use ratchet_core::canonical::canonical_json_bytes;
use ratchet_core::hash::{hash_bytes_hex, HashAlg};
use ratchet_core::keys::PublicKey;

pub struct RoleKey {
    pub signing: SigningKey,
    pub public: PublicKey,
    pub keyid: String,
}

pub fn role_key(seed: u8) -> RoleKey {
    let signing = SigningKey::from_bytes(&[seed; 32]);
    let public = PublicKey::ed25519(hex::encode(signing.verifying_key().to_bytes()));
    let keyid = public.primary_keyid().unwrap();
    RoleKey {
        signing,
        public,
        keyid,
    }
}

pub fn expires_in(days: i64) -> String {
    (OffsetDateTime::now_utc() + Duration::days(days))
        .format(&Rfc3339)
        .unwrap()
}

/// Sign `signed` with every key and wrap it in the wire envelope.
pub fn sign_envelope(signed: &Value, keys: &[&RoleKey]) -> Vec<u8> {
    let bytes = canonical_json_bytes(signed).unwrap();
    let signatures: Vec<Value> = keys
        .iter()
        .map(|key| {
            json!({
                "keyid": key.keyid.clone(),
                "sig": hex::encode(key.signing.sign(&bytes).to_bytes()),
            })
        })
        .collect();
    serde_json::to_vec_pretty(&json!({"signed": signed, "signatures": signatures})).unwrap()
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hash_bytes_hex(HashAlg::Sha256, bytes)
}

/// Repository signing keys plus the knobs fixtures vary.
pub struct TestRepo {
    pub root_key: RoleKey,
    pub timestamp_key: RoleKey,
    pub snapshot_key: RoleKey,
    pub targets_key: RoleKey,
    pub consistent: bool,
    pub timestamp_threshold: u32,
    pub timestamp_expires: String,
}

impl TestRepo {
    pub fn new() -> Self {
        Self {
            root_key: role_key(1),
            timestamp_key: role_key(2),
            snapshot_key: role_key(3),
            targets_key: role_key(4),
            consistent: false,
            timestamp_threshold: 1,
            timestamp_expires: expires_in(30),
        }
    }

    pub fn root_signed(&self, version: u64) -> Value {
        let mut keys = serde_json::Map::new();
        for key in [
            &self.root_key,
            &self.timestamp_key,
            &self.snapshot_key,
            &self.targets_key,
        ] {
            keys.insert(key.keyid.clone(), serde_json::to_value(&key.public).unwrap());
        }
        json!({
            "_type": "root",
            "version": version,
            "expires": expires_in(365),
            "consistent_snapshot": self.consistent,
            "keys": keys,
            "roles": {
                "root": {"keyids": [self.root_key.keyid.clone()], "threshold": 1},
                "timestamp": {
                    "keyids": [self.timestamp_key.keyid.clone()],
                    "threshold": self.timestamp_threshold,
                },
                "snapshot": {"keyids": [self.snapshot_key.keyid.clone()], "threshold": 1},
                "targets": {"keyids": [self.targets_key.keyid.clone()], "threshold": 1},
            }
        })
    }

    pub fn root_bytes(&self, version: u64) -> Vec<u8> {
        sign_envelope(&self.root_signed(version), &[&self.root_key])
    }

    pub fn target_entry(content: &[u8]) -> Value {
        json!({
            "length": content.len(),
            "hashes": {"sha256": sha256_hex(content)},
        })
    }

    /// Build one complete repository state as a git tree: metadata under
    /// `metadata/`, target files at their own paths. All four roles share
    /// `version`; `targets` maps filepath -> content.
    pub fn state(
        &self,
        version: u64,
        targets: &[(&str, &[u8])],
        delegations: Option<Value>,
    ) -> BTreeMap<String, Vec<u8>> {
        let mut files = BTreeMap::new();

        let mut target_map = serde_json::Map::new();
        for (path, content) in targets {
            target_map.insert(path.to_string(), Self::target_entry(content));
            let stored = if self.consistent {
                consistent_name(path, &sha256_hex(content))
            } else {
                path.to_string()
            };
            files.insert(stored, content.to_vec());
        }

        let mut targets_signed = json!({
            "_type": "targets",
            "version": version,
            "expires": expires_in(30),
            "targets": target_map,
        });
        if let Some(delegations) = delegations {
            targets_signed["delegations"] = delegations;
        }
        let targets_bytes = sign_envelope(&targets_signed, &[&self.targets_key]);

        let snapshot_signed = json!({
            "_type": "snapshot",
            "version": version,
            "expires": expires_in(30),
            "meta": {
                "root.json": {"version": 1},
                "targets.json": {
                    "version": version,
                    "length": targets_bytes.len(),
                    "hashes": {"sha256": sha256_hex(&targets_bytes)},
                },
            }
        });
        let snapshot_bytes = sign_envelope(&snapshot_signed, &[&self.snapshot_key]);

        let timestamp_signed = json!({
            "_type": "timestamp",
            "version": version,
            "expires": self.timestamp_expires.clone(),
            "meta": {
                "snapshot.json": {
                    "version": version,
                    "length": snapshot_bytes.len(),
                    "hashes": {"sha256": sha256_hex(&snapshot_bytes)},
                },
            }
        });
        let timestamp_bytes = sign_envelope(&timestamp_signed, &[&self.timestamp_key]);

        files.insert("metadata/root.json".to_string(), self.root_bytes(1));
        self.insert_metadata(&mut files, "targets.json", targets_bytes);
        self.insert_metadata(&mut files, "snapshot.json", snapshot_bytes);
        files.insert("metadata/timestamp.json".to_string(), timestamp_bytes);
        files
    }

    /// Store a metadata file under its plain name and, for consistent
    /// repositories, under its digest-prefixed name as well.
    pub fn insert_metadata(
        &self,
        files: &mut BTreeMap<String, Vec<u8>>,
        name: &str,
        bytes: Vec<u8>,
    ) {
        if self.consistent {
            let digest = sha256_hex(&bytes);
            files.insert(
                format!("metadata/{}", consistent_name(name, &digest)),
                bytes.clone(),
            );
        }
        files.insert(format!("metadata/{name}"), bytes);
    }
}

pub fn consistent_name(path: &str, digest: &str) -> String {
    match path.rsplit_once('/') {
        Some((dir, base)) => format!("{dir}/{digest}.{base}"),
        None => format!("{digest}.{path}"),
    }
}

/// In-memory git history: an ordered list of commits, each a full tree.
pub struct FakeHistory {
    pub commits: Vec<(CommitId, BTreeMap<String, Vec<u8>>)>,
    pub head: usize,
}

impl FakeHistory {
    pub fn new(commits: Vec<(&str, BTreeMap<String, Vec<u8>>)>) -> Self {
        Self {
            commits: commits
                .into_iter()
                .map(|(id, tree)| (CommitId::from(id), tree))
                .collect(),
            head: 0,
        }
    }

    fn position(&self, commit: &CommitId) -> Option<usize> {
        self.commits.iter().position(|(id, _)| id == commit)
    }
}

impl GitHistory for FakeHistory {
    fn is_repository(&self) -> bool {
        true
    }

    fn checkout_branch(&mut self, _name: &str) -> ratchet_core::RatchetResult<()> {
        Ok(())
    }

    fn head_commit(&self) -> ratchet_core::RatchetResult<CommitId> {
        Ok(self.commits[self.head].0.clone())
    }

    fn commits_since(&self, commit: &CommitId) -> ratchet_core::RatchetResult<Vec<CommitId>> {
        let position = self
            .position(commit)
            .ok_or_else(|| ratchet_core::RatchetError::git(format!("unknown commit {commit}")))?;
        Ok(self.commits[position + 1..]
            .iter()
            .map(|(id, _)| id.clone())
            .collect())
    }

    fn list_files_at(&self, commit: &CommitId) -> ratchet_core::RatchetResult<BTreeSet<String>> {
        let position = self
            .position(commit)
            .ok_or_else(|| ratchet_core::RatchetError::git(format!("unknown commit {commit}")))?;
        Ok(self.commits[position].1.keys().cloned().collect())
    }

    fn show_file_at(
        &self,
        commit: &CommitId,
        path: &str,
    ) -> ratchet_core::RatchetResult<Vec<u8>> {
        let position = self
            .position(commit)
            .ok_or_else(|| ratchet_core::RatchetError::git(format!("unknown commit {commit}")))?;
        self.commits[position]
            .1
            .get(path)
            .cloned()
            .ok_or_else(|| ratchet_core::RatchetError::git(format!("'{path}' not at {commit}")))
    }
}

/// A git transport over `commits`, with the client's head at the first
/// commit.
pub fn git_transport(commits: Vec<(&str, BTreeMap<String, Vec<u8>>)>) -> Transport {
    let validation = FakeHistory::new(commits);
    let client = FakeHistory {
        commits: vec![validation.commits[0].clone()],
        head: 0,
    };
    let handler = GitCommitHandler::new(Box::new(validation), &client).unwrap();
    Transport::Git(handler)
}

/// Seed a client metadata directory with a trusted root (and optionally
/// more cached metadata), then open an engine over `transport`.
pub fn engine_with_cache(
    metadata_dir: &Path,
    cached: &[(&str, Vec<u8>)],
    transport: Transport,
) -> ratchet_core::RatchetResult<TrustEngine> {
    let current = metadata_dir.join("current");
    fs::create_dir_all(&current).unwrap();
    for (name, bytes) in cached {
        fs::write(current.join(name), bytes).unwrap();
    }
    TrustEngine::new("test-repository", metadata_dir, RefreshLimits::default(), transport)
}
