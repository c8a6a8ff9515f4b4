//! The metadata trust-chain refresh engine.
//!
//! One `TrustEngine` instance manages one repository: it owns the trust
//! store, the in-memory `current`/`previous` metadata sets, the version
//! and fileinfo caches, and the transport. A refresh runs the strictly
//! ordered pipeline root → timestamp → snapshot → targets; each stage
//! fully completes (download, verify, commit, persist) before the next
//! begins, because each stage's trust depends on the previous stage's
//! verified manifest. Delegated targets roles load lazily during target
//! resolution, re-validated against the snapshot manifest each time.
//!
//! Trusted metadata is persisted under `<metadata_dir>/current/`, with
//! the previously trusted copy archived to `<metadata_dir>/previous/`
//! before every replacement. A corrupt cache file for a non-root role is
//! logged and ignored; the cached root is the bootstrap trust anchor and
//! must parse.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use ratchet_core::delegations::import_delegations;
use ratchet_core::hash::verify_hashes;
use ratchet_core::metadata::{
    consistent_path, naming_digest, role_filename, DelegatedRole, MetaFileInfo, Metadata,
    RootMeta, SnapshotMeta, TargetDescriptor, TargetInfo, TargetsMeta, TimestampMeta, ROLE_ROOT,
    ROLE_SNAPSHOT, ROLE_TARGETS, ROLE_TIMESTAMP,
};
use ratchet_core::store::TrustStore;
use ratchet_core::verify;
use ratchet_core::{RatchetError, RatchetResult};

use crate::config::RefreshLimits;
use crate::transport::{download_verified, FileKind, Transport};

/// Hard bound on chain-load iterations, far above any real history; the
/// loops below terminate on their own, this only backstops a transport
/// that keeps fabricating fresh answers.
const MAX_CHAIN_STEPS: usize = 4096;

#[derive(Debug)]
pub struct TrustEngine {
    repository_name: String,
    metadata_dir: PathBuf,
    limits: RefreshLimits,
    pub(crate) transport: Transport,
    store: TrustStore,

    root: RootMeta,
    timestamp: Option<TimestampMeta>,
    snapshot: Option<SnapshotMeta>,
    /// Top-level `targets` plus every loaded delegated role, by name.
    pub(crate) targets: BTreeMap<String, TargetsMeta>,

    current: BTreeMap<String, Metadata>,
    previous: BTreeMap<String, Metadata>,
    pub(crate) previous_targets: BTreeMap<String, TargetsMeta>,

    /// role filename -> manifest-declared version at last acceptance.
    versioninfo: HashMap<String, u64>,
    /// role filename -> manifest-declared {length, hashes} at last acceptance.
    fileinfo: HashMap<String, MetaFileInfo>,

    /// Targets-family roles re-validated against the snapshot manifest
    /// during the current refresh.
    validated_roles: BTreeSet<String>,
    pub(crate) consistent_snapshot: bool,
}

impl TrustEngine {
    /// Open a repository instance rooted at `metadata_dir`.
    ///
    /// The directory must exist and `current/root.json` must hold a
    /// parseable root: it is the bootstrap trust anchor, nothing can be
    /// verified without it.
    pub fn new(
        repository_name: impl Into<String>,
        metadata_dir: impl Into<PathBuf>,
        limits: RefreshLimits,
        transport: Transport,
    ) -> RatchetResult<Self> {
        let repository_name = repository_name.into();
        let metadata_dir = metadata_dir.into();
        limits.validate()?;

        if !metadata_dir.is_dir() {
            return Err(RatchetError::repository(format!(
                "metadata directory '{}' does not exist",
                metadata_dir.display()
            )));
        }
        fs::create_dir_all(metadata_dir.join("current"))?;
        fs::create_dir_all(metadata_dir.join("previous"))?;

        let root_path = metadata_dir.join("current").join(role_filename(ROLE_ROOT));
        let root_bytes = fs::read(&root_path).map_err(|_| {
            RatchetError::repository(format!(
                "missing trust anchor '{}'",
                root_path.display()
            ))
        })?;
        let root_envelope = Metadata::from_bytes(&root_bytes)?;
        let root = root_envelope.parse_root()?;

        let mut store = TrustStore::new();
        store.rebuild_from_root(&root)?;

        let consistent_snapshot = root.consistent_snapshot;
        let mut engine = Self {
            repository_name,
            metadata_dir,
            limits,
            transport,
            store,
            root,
            timestamp: None,
            snapshot: None,
            targets: BTreeMap::new(),
            current: BTreeMap::new(),
            previous: BTreeMap::new(),
            previous_targets: BTreeMap::new(),
            versioninfo: HashMap::new(),
            fileinfo: HashMap::new(),
            validated_roles: BTreeSet::new(),
            consistent_snapshot,
        };
        engine.current.insert(ROLE_ROOT.to_string(), root_envelope);
        engine.load_cached_metadata();
        Ok(engine)
    }

    pub fn repository_name(&self) -> &str {
        &self.repository_name
    }

    pub fn trusted_root(&self) -> &RootMeta {
        &self.root
    }

    pub fn trusted_timestamp(&self) -> Option<&TimestampMeta> {
        self.timestamp.as_ref()
    }

    pub fn trusted_snapshot(&self) -> Option<&SnapshotMeta> {
        self.snapshot.as_ref()
    }

    pub fn trusted_targets(&self, role: &str) -> Option<&TargetsMeta> {
        self.targets.get(role)
    }

    pub fn store(&self) -> &TrustStore {
        &self.store
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn consistent_snapshot(&self) -> bool {
        self.consistent_snapshot
    }

    pub fn current_version(&self, role: &str) -> Option<u64> {
        self.current.get(role).and_then(|md| md.version().ok())
    }

    pub fn previous_version(&self, role: &str) -> Option<u64> {
        self.previous.get(role).and_then(|md| md.version().ok())
    }

    /// Run the full refresh pipeline.
    pub fn refresh(&mut self) -> RatchetResult<()> {
        info!(repository = %self.repository_name, "refreshing trust chain");
        self.validated_roles.clear();
        self.update_root()?;
        self.update_timestamp()?;
        self.update_snapshot()?;
        self.load_snapshot_listed_role(ROLE_TARGETS)?;
        info!(repository = %self.repository_name, "refresh complete");
        Ok(())
    }

    /// Stage 1-2: chain-load newer roots, then rebuild the key/role db.
    ///
    /// Each chain step must satisfy the currently trusted root's
    /// threshold AND the candidate's own threshold before trust switches
    /// over. The loop keeps scanning while sources still yield fresh
    /// material (a newer version, or the same version from a source not
    /// yet consulted — the latter is how the git transport walks its
    /// commit history); exhausting every source ends the chain cleanly
    /// unless one of them tried to roll the version back.
    fn update_root(&mut self) -> RatchetResult<()> {
        let filename = role_filename(ROLE_ROOT);
        let mut rotations = 0u32;
        let mut last_seen: Option<(crate::transport::Source, u64)> = None;

        for _ in 0..MAX_CHAIN_STEPS {
            let now = self.transport.earliest_valid_expiration();
            let trusted_version = self.root.version;
            let cap = self.limits.max_root_length;
            let (transport, store) = (&mut self.transport, &self.store);

            let result =
                download_verified(transport, FileKind::Metadata, &filename, cap, |bytes| {
                    let candidate = Metadata::from_bytes(bytes)?;
                    let candidate_root = candidate.parse_root()?;
                    if candidate_root.version < trusted_version {
                        return Err(RatchetError::Rollback {
                            role: ROLE_ROOT.to_string(),
                            trusted_version,
                            new_version: candidate_root.version,
                        });
                    }

                    // The previous (currently trusted) root must vouch...
                    verify::check_signatures(store, ROLE_ROOT, &candidate)?;
                    if candidate_root.version == trusted_version {
                        return Ok(());
                    }

                    // ...and the new root must vouch for itself.
                    let mut candidate_store = TrustStore::new();
                    candidate_store.rebuild_from_root(&candidate_root)?;
                    verify::check_signatures(&candidate_store, ROLE_ROOT, &candidate)?;
                    verify::check_expiration(ROLE_ROOT, &candidate, now)?;
                    Ok(())
                });

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(err) => {
                    self.end_of_chain(ROLE_ROOT, err, false)?;
                    break;
                }
            };

            let candidate = Metadata::from_bytes(&outcome.bytes)?;
            let candidate_root = candidate.parse_root()?;
            let version = candidate_root.version;

            if version > self.root.version {
                rotations += 1;
                if rotations > self.limits.max_root_rotations {
                    warn!(rotations, "root rotation cap reached, stopping chain-load");
                    break;
                }
                info!(
                    from = self.root.version,
                    to = version,
                    "switching trust to newer root"
                );
                self.move_current_to_previous(ROLE_ROOT);
                self.persist_current(ROLE_ROOT, &candidate)?;
                self.current.insert(ROLE_ROOT.to_string(), candidate);
                self.consistent_snapshot = candidate_root.consistent_snapshot;
                self.root = candidate_root;
                self.store.rebuild_from_root(&self.root)?;
            } else if last_seen == Some((outcome.source.clone(), version)) {
                // The same source answered with the same version twice:
                // nothing newer exists behind this transport.
                break;
            }
            last_seen = Some((outcome.source, version));
        }

        // Whatever root we ended on must itself be fresh.
        let now = self.transport.earliest_valid_expiration();
        let root_envelope = self
            .current
            .get(ROLE_ROOT)
            .expect("root is never deleted from current");
        verify::check_expiration(ROLE_ROOT, root_envelope, now)?;

        // Rebuild even when no newer root was found: the store must hold
        // exactly what the trusted root declares, with delegations
        // re-imported as targets roles reload.
        self.store.rebuild_from_root(&self.root)
    }

    /// Stage 3: the timestamp manifest, the freshness entry point.
    ///
    /// Runs the same chain-load loop as root: timestamp has no parent
    /// manifest to bind it, so freshness is established by scanning
    /// sources until none yields anything newer, then revalidating
    /// whatever copy trust ended on.
    fn update_timestamp(&mut self) -> RatchetResult<()> {
        let filename = role_filename(ROLE_TIMESTAMP);
        let mut last_seen: Option<(crate::transport::Source, u64)> = None;

        for _ in 0..MAX_CHAIN_STEPS {
            let now = self.transport.earliest_valid_expiration();
            let trusted_version = self.timestamp.as_ref().map(|t| t.version).unwrap_or(0);
            let cap = self.limits.max_timestamp_length;
            let (transport, store) = (&mut self.transport, &self.store);

            let result =
                download_verified(transport, FileKind::Metadata, &filename, cap, |bytes| {
                    let candidate = Metadata::from_bytes(bytes)?;
                    let ts = candidate.parse_timestamp()?;
                    verify::check_signatures(store, ROLE_TIMESTAMP, &candidate)?;
                    verify::check_expiration(ROLE_TIMESTAMP, &candidate, now)?;
                    if ts.version < trusted_version {
                        return Err(RatchetError::Rollback {
                            role: ROLE_TIMESTAMP.to_string(),
                            trusted_version,
                            new_version: ts.version,
                        });
                    }
                    Ok(())
                });

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(err) => {
                    self.end_of_chain(ROLE_TIMESTAMP, err, true)?;
                    break;
                }
            };

            let candidate = Metadata::from_bytes(&outcome.bytes)?;
            let ts = candidate.parse_timestamp()?;
            let version = ts.version;

            if Some(version) != self.timestamp.as_ref().map(|t| t.version) {
                debug!(version, "timestamp accepted");
                self.move_current_to_previous(ROLE_TIMESTAMP);
                self.persist_current(ROLE_TIMESTAMP, &candidate)?;
                self.current.insert(ROLE_TIMESTAMP.to_string(), candidate);
                self.timestamp = Some(ts);
            } else if last_seen == Some((outcome.source.clone(), version)) {
                break;
            }
            last_seen = Some((outcome.source, version));
        }

        if self.timestamp.is_none() {
            return Err(RatchetError::repository(
                "no timestamp metadata could be established",
            ));
        }
        Ok(())
    }

    /// Interpret the end of a chain-load scan. Exhausting every source is
    /// the normal terminator — unless a source answered with an older
    /// version than we trust, which is an attack signal, or the copy we
    /// are left with no longer stands on its own.
    fn end_of_chain(
        &self,
        role: &'static str,
        err: RatchetError,
        revalidate: bool,
    ) -> RatchetResult<()> {
        match err {
            RatchetError::NoWorkingMirror { name, mut errors } => {
                let rollback_source = errors
                    .iter()
                    .find(|(_, cause)| matches!(cause, RatchetError::Rollback { .. }))
                    .map(|(source, _)| source.clone());
                if let Some(source) = rollback_source {
                    warn!(role, %source, "source attempted a rollback");
                    return Err(errors.remove(&source).expect("source key just found"));
                }

                if !revalidate || self.revalidate_cached(role) {
                    debug!(role, "no newer metadata behind transport");
                    Ok(())
                } else {
                    Err(RatchetError::NoWorkingMirror { name, errors })
                }
            }
            other => Err(other),
        }
    }

    /// Stage 4: the snapshot manifest, bound by timestamp's fileinfo.
    fn update_snapshot(&mut self) -> RatchetResult<()> {
        let ts = self.timestamp.as_ref().ok_or_else(|| {
            RatchetError::repository("timestamp must be loaded before snapshot")
        })?;
        let snapshot_filename = role_filename(ROLE_SNAPSHOT);
        let declared = ts.meta.get(&snapshot_filename).cloned().ok_or_else(|| {
            RatchetError::format("timestamp manifest does not list snapshot.json")
        })?;

        // Freshness decision on timestamp's version claim alone: when it
        // still names the snapshot we already trust, skip the transport.
        // The cached copy must still stand on its own signatures and
        // expiry before it is reused.
        if let Some(current) = &self.snapshot {
            if !self.versioninfo_has_been_updated(&snapshot_filename, declared.version)
                && !self.fileinfo_has_changed(&snapshot_filename, &declared)
                && current.version == declared.version
                && self.revalidate_cached(ROLE_SNAPSHOT)
            {
                debug!(version = declared.version, "snapshot unchanged, reusing trusted copy");
                return Ok(());
            }
        }

        let fetch_name = self.fetch_filename(&snapshot_filename, &declared);
        let now = self.transport.earliest_valid_expiration();
        let trusted_version = self.snapshot.as_ref().map(|s| s.version).unwrap_or(0);
        let cap = declared.length.unwrap_or(self.limits.max_snapshot_length);
        let declared_check = declared.clone();
        let (transport, store) = (&mut self.transport, &self.store);

        let outcome =
            download_verified(transport, FileKind::Metadata, &fetch_name, cap, |bytes| {
                // Integrity against timestamp's declaration before parsing.
                if let Some(length) = declared_check.length {
                    verify::check_hard_length(bytes.len() as u64, length)?;
                }
                if let Some(hashes) = &declared_check.hashes {
                    verify_hashes(bytes, hashes)?;
                }

                let candidate = Metadata::from_bytes(bytes)?;
                let snapshot = candidate.parse_snapshot()?;
                verify::check_signatures(store, ROLE_SNAPSHOT, &candidate)?;
                verify::check_expiration(ROLE_SNAPSHOT, &candidate, now)?;
                if snapshot.version != declared_check.version {
                    return Err(RatchetError::BadVersionNumber {
                        role: ROLE_SNAPSHOT.to_string(),
                        expected: declared_check.version,
                        received: snapshot.version,
                    });
                }
                if snapshot.version < trusted_version {
                    return Err(RatchetError::Rollback {
                        role: ROLE_SNAPSHOT.to_string(),
                        trusted_version,
                        new_version: snapshot.version,
                    });
                }
                Ok(())
            })?;

        let candidate = Metadata::from_bytes(&outcome.bytes)?;
        let snapshot = candidate.parse_snapshot()?;
        debug!(version = snapshot.version, "snapshot accepted");

        self.move_current_to_previous(ROLE_SNAPSHOT);
        self.persist_current(ROLE_SNAPSHOT, &candidate)?;
        self.current.insert(ROLE_SNAPSHOT.to_string(), candidate);

        // Roles that vanished from the manifest are no longer trusted.
        let stale: Vec<String> = self
            .targets
            .keys()
            .filter(|role| !snapshot.meta.contains_key(&role_filename(role)))
            .cloned()
            .collect();
        for role in stale {
            info!(role = %role, "role left the snapshot manifest, evicting");
            self.delete_metadata(&role);
        }

        self.record_manifest_entry(&snapshot_filename, &declared);
        self.snapshot = Some(snapshot);
        Ok(())
    }

    /// Stage 5 and lazy delegated loads: fetch a targets-family role,
    /// bound by the snapshot manifest, then import its delegations.
    fn load_snapshot_listed_role(&mut self, role_name: &str) -> RatchetResult<()> {
        let snapshot = self.snapshot.as_ref().ok_or_else(|| {
            RatchetError::repository("snapshot must be loaded before targets roles")
        })?;
        let filename = role_filename(role_name);
        let declared = snapshot.meta.get(&filename).cloned().ok_or_else(|| {
            RatchetError::format(format!("'{filename}' is not listed in the snapshot manifest"))
        })?;

        let trusted_version = self.targets.get(role_name).map(|t| t.version);
        if trusted_version == Some(declared.version)
            && !self.versioninfo_has_been_updated(&filename, declared.version)
            && !self.fileinfo_has_changed(&filename, &declared)
            && self.revalidate_cached(role_name)
        {
            debug!(role = role_name, "role unchanged, reusing trusted copy");
            self.record_manifest_entry(&filename, &declared);
            self.validated_roles.insert(role_name.to_string());
            self.import_role_delegations(role_name);
            return Ok(());
        }

        let fetch_name = self.fetch_filename(&filename, &declared);
        let now = self.transport.earliest_valid_expiration();
        let trusted_version = trusted_version.unwrap_or(0);
        let cap = declared.length.unwrap_or(self.limits.max_targets_length);
        let declared_check = declared.clone();
        let role_owned = role_name.to_string();
        let (transport, store) = (&mut self.transport, &self.store);

        let outcome =
            download_verified(transport, FileKind::Metadata, &fetch_name, cap, |bytes| {
                if let Some(length) = declared_check.length {
                    verify::check_hard_length(bytes.len() as u64, length)?;
                }
                if let Some(hashes) = &declared_check.hashes {
                    verify_hashes(bytes, hashes)?;
                }

                let candidate = Metadata::from_bytes(bytes)?;
                let targets = candidate.parse_targets()?;
                verify::check_signatures(store, &role_owned, &candidate)?;
                verify::check_expiration(&role_owned, &candidate, now)?;
                if targets.version != declared_check.version {
                    return Err(RatchetError::BadVersionNumber {
                        role: role_owned.clone(),
                        expected: declared_check.version,
                        received: targets.version,
                    });
                }
                if targets.version < trusted_version {
                    return Err(RatchetError::Rollback {
                        role: role_owned.clone(),
                        trusted_version,
                        new_version: targets.version,
                    });
                }
                Ok(())
            })?;

        let candidate = Metadata::from_bytes(&outcome.bytes)?;
        let targets = candidate.parse_targets()?;
        debug!(role = role_name, version = targets.version, "targets role accepted");

        self.move_current_to_previous(role_name);
        self.persist_current(role_name, &candidate)?;
        self.current.insert(role_name.to_string(), candidate);
        self.targets.insert(role_name.to_string(), targets);
        self.record_manifest_entry(&filename, &declared);
        self.validated_roles.insert(role_name.to_string());
        self.import_role_delegations(role_name);
        Ok(())
    }

    /// Import a loaded role's delegation section. A format error aborts
    /// only this subtree's import, never the refresh: the delta is built
    /// whole or not merged at all.
    fn import_role_delegations(&mut self, role_name: &str) {
        let Some(delegations) = self
            .targets
            .get(role_name)
            .and_then(|t| t.delegations.clone())
        else {
            return;
        };

        match import_delegations(&delegations, role_name) {
            Ok(delta) => {
                for keyid in &delta.skipped {
                    warn!(role = role_name, keyid = %keyid, "skipping delegated key with unrecognized keytype");
                }
                self.store.merge(delta);
            }
            Err(err) => {
                warn!(role = role_name, %err, "delegation import failed, subtree skipped");
            }
        }
    }

    /// Resolve the trusted descriptor for a target path, loading
    /// delegated roles lazily along the delegation graph.
    pub fn target_info(&mut self, target_path: &str) -> RatchetResult<TargetDescriptor> {
        if self.snapshot.is_none() || !self.validated_roles.contains(ROLE_TARGETS) {
            return Err(RatchetError::repository(
                "refresh() must succeed before resolving targets",
            ));
        }

        let mut budget = self.limits.max_delegation_depth;
        match self.lookup_target(ROLE_TARGETS, target_path, &mut budget)? {
            Some(info) => Ok(TargetDescriptor {
                filepath: target_path.to_string(),
                info,
            }),
            None => Err(RatchetError::UnknownTarget(target_path.to_string())),
        }
    }

    fn lookup_target(
        &mut self,
        role_name: &str,
        target_path: &str,
        budget: &mut usize,
    ) -> RatchetResult<Option<TargetInfo>> {
        if *budget == 0 {
            warn!(role = role_name, "delegation budget exhausted, stopping walk");
            return Ok(None);
        }
        *budget -= 1;

        if !self.validated_roles.contains(role_name) {
            self.load_snapshot_listed_role(role_name)?;
        }

        let meta = self
            .targets
            .get(role_name)
            .ok_or_else(|| RatchetError::UnknownRole(role_name.to_string()))?;
        if let Some(info) = meta.targets.get(target_path) {
            return Ok(Some(info.clone()));
        }

        let Some(delegations) = meta.delegations.clone() else {
            return Ok(None);
        };

        for entry in &delegations.roles {
            let Ok(child) = serde_json::from_value::<DelegatedRole>(entry.clone()) else {
                // Already flagged when the import was attempted.
                continue;
            };
            let (matched, terminating) = match self.store.get_role(&child.name) {
                Ok(role) => (role.matches_path(target_path), role.terminating),
                Err(_) => continue,
            };
            if !matched {
                continue;
            }

            if let Some(info) = self.lookup_target(&child.name, target_path, budget)? {
                return Ok(Some(info));
            }
            if terminating {
                // A terminating role owns its namespace: a miss inside it
                // ends the search entirely.
                return Ok(None);
            }
        }
        Ok(None)
    }

    /// True when no fileinfo is cached for `name`, or the candidate's
    /// length/hashes differ from the cache. Used to skip redundant
    /// downloads.
    pub fn fileinfo_has_changed(&self, name: &str, candidate: &MetaFileInfo) -> bool {
        match self.fileinfo.get(name) {
            None => true,
            Some(cached) => !cached.same_content(candidate),
        }
    }

    /// True when the manifest-declared version for `name` differs from
    /// the cached last-seen version.
    pub fn versioninfo_has_been_updated(&self, name: &str, version: u64) -> bool {
        self.versioninfo.get(name).copied() != Some(version)
    }

    /// Archive the currently trusted copy of `role` before replacement,
    /// in memory and on disk, enabling diff-based obsolete-target
    /// detection and safe rebuild on corruption.
    pub fn move_current_to_previous(&mut self, role: &str) {
        let Some(envelope) = self.current.get(role) else {
            return;
        };
        self.previous.insert(role.to_string(), envelope.clone());
        if let Some(targets) = self.targets.get(role) {
            self.previous_targets.insert(role.to_string(), targets.clone());
        }

        let from = self.metadata_path("current", role);
        let to = self.metadata_path("previous", role);
        if from.exists() {
            if let Some(parent) = to.parent() {
                let _ = fs::create_dir_all(parent);
            }
            if let Err(err) = fs::rename(&from, &to) {
                warn!(role, %err, "could not archive metadata to previous");
            }
        }
    }

    /// Evict a role from the `current` set. Deleting `root` is a no-op:
    /// the trust anchor is never removed.
    pub fn delete_metadata(&mut self, role: &str) {
        if role == ROLE_ROOT {
            debug!("refusing to delete the root role");
            return;
        }
        self.move_current_to_previous(role);
        self.current.remove(role);
        self.targets.remove(role);
        self.validated_roles.remove(role);
        if role == ROLE_TIMESTAMP {
            self.timestamp = None;
        }
        if role == ROLE_SNAPSHOT {
            self.snapshot = None;
        }
        let filename = role_filename(role);
        self.versioninfo.remove(&filename);
        self.fileinfo.remove(&filename);

        let path = self.metadata_path("current", role);
        if path.exists() {
            if let Err(err) = fs::remove_file(&path) {
                warn!(role, %err, "could not remove evicted metadata file");
            }
        }
    }

    /// Whether the cached `current` copy of a role still satisfies its
    /// threshold and expiry. A stale cache is not an error here — the
    /// caller falls back to downloading a fresh copy.
    fn revalidate_cached(&self, role: &str) -> bool {
        let Some(envelope) = self.current.get(role) else {
            return false;
        };
        let now = self.transport.earliest_valid_expiration();
        verify::check_signatures(&self.store, role, envelope).is_ok()
            && verify::check_expiration(role, envelope, now).is_ok()
    }

    fn record_manifest_entry(&mut self, filename: &str, declared: &MetaFileInfo) {
        self.versioninfo
            .insert(filename.to_string(), declared.version);
        self.fileinfo.insert(filename.to_string(), declared.clone());
    }

    /// The filename to request from transport: digest-prefixed when the
    /// repository uses consistent snapshots and the parent manifest
    /// declares a digest. Root chain-loads and timestamp fetch the plain
    /// name — they are the entry points and have no parent manifest yet.
    fn fetch_filename(&self, filename: &str, declared: &MetaFileInfo) -> String {
        if self.consistent_snapshot {
            if let Some(digest) = declared.hashes.as_ref().and_then(naming_digest) {
                return consistent_path(filename, digest);
            }
        }
        filename.to_string()
    }

    fn metadata_path(&self, set: &str, role: &str) -> PathBuf {
        self.metadata_dir.join(set).join(role_filename(role))
    }

    fn persist_current(&self, role: &str, metadata: &Metadata) -> RatchetResult<()> {
        let path = self.metadata_path("current", role);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, metadata.to_bytes()?)?;
        Ok(())
    }

    /// Tolerant pass over the on-disk cache: anything except root that
    /// fails to parse is logged and skipped, the engine proceeds without
    /// it rather than failing construction.
    fn load_cached_metadata(&mut self) {
        for set in ["current", "previous"] {
            let base = self.metadata_dir.join(set);
            let mut files = Vec::new();
            collect_json_files(&base, &base, &mut files);

            for (path, role) in files {
                if set == "current" && role == ROLE_ROOT {
                    continue;
                }
                let Ok(bytes) = fs::read(&path) else {
                    warn!(role = %role, "unreadable cached metadata, skipping");
                    continue;
                };
                let envelope = match Metadata::from_bytes(&bytes) {
                    Ok(envelope) => envelope,
                    Err(err) => {
                        warn!(role = %role, %err, "corrupt cached metadata, skipping");
                        continue;
                    }
                };

                if set == "current" {
                    match envelope.signed_type() {
                        Ok("timestamp") => match envelope.parse_timestamp() {
                            Ok(ts) => {
                                for (name, info) in &ts.meta {
                                    self.record_manifest_entry(name, info);
                                }
                                self.timestamp = Some(ts);
                            }
                            Err(err) => {
                                warn!(%err, "corrupt cached timestamp, skipping");
                                continue;
                            }
                        },
                        Ok("snapshot") => match envelope.parse_snapshot() {
                            Ok(snapshot) => {
                                for (name, info) in &snapshot.meta {
                                    self.record_manifest_entry(name, info);
                                }
                                self.snapshot = Some(snapshot);
                            }
                            Err(err) => {
                                warn!(%err, "corrupt cached snapshot, skipping");
                                continue;
                            }
                        },
                        Ok("targets") => match envelope.parse_targets() {
                            Ok(targets) => {
                                self.targets.insert(role.clone(), targets);
                            }
                            Err(err) => {
                                warn!(role = %role, %err, "corrupt cached targets, skipping");
                                continue;
                            }
                        },
                        _ => {
                            warn!(role = %role, "cached metadata with unknown type, skipping");
                            continue;
                        }
                    }
                    self.current.insert(role, envelope);
                } else {
                    if let Ok(targets) = envelope.parse_targets() {
                        self.previous_targets.insert(role.clone(), targets);
                    }
                    self.previous.insert(role, envelope);
                }
            }
        }
    }
}

/// Collect `<base>/**/*.json` as `(path, role name)` pairs, where the
/// role name is the path relative to `base` minus the extension.
fn collect_json_files(base: &Path, dir: &Path, out: &mut Vec<(PathBuf, String)>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_json_files(base, &path, out);
        } else if path.extension().is_some_and(|ext| ext == "json") {
            let Ok(relative) = path.strip_prefix(base) else {
                continue;
            };
            let role = relative
                .with_extension("")
                .to_string_lossy()
                .replace('\\', "/");
            out.push((path.clone(), role));
        }
    }
}
