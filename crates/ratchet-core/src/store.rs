//! The per-repository trust store.
//!
//! One `TrustStore` instance holds everything a single repository's
//! verifier is allowed to trust: public keys by keyid and role
//! authorization rules by name. Each engine owns its own store — there is
//! no process-global state — so independent repositories can be refreshed
//! concurrently from one process.
//!
//! The store is a derived cache: its entire content is rebuildable from
//! the currently-trusted root metadata plus delegations imported from
//! currently-trusted targets metadata.

use std::collections::{BTreeSet, HashMap};

use crate::errors::{RatchetError, RatchetResult};
use crate::hash::{hash_bytes_hex, HashAlg};
use crate::keys::PublicKey;
use crate::metadata::{RoleKeys, RootMeta};

/// Authorization rule for one role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub name: String,
    pub threshold: u32,
    pub keyids: BTreeSet<String>,
    /// The delegating role, `None` for top-level roles.
    pub parent: Option<String>,
    pub paths: Vec<String>,
    pub path_hash_prefixes: Vec<String>,
    pub terminating: bool,
}

impl Role {
    pub fn top_level(name: &str, keys: &RoleKeys) -> Self {
        Self {
            name: name.to_string(),
            threshold: keys.threshold,
            keyids: keys.keyids.iter().cloned().collect(),
            parent: None,
            paths: Vec::new(),
            path_hash_prefixes: Vec::new(),
            terminating: false,
        }
    }

    /// Whether this role's delegation scope covers `path`.
    ///
    /// Top-level roles carry no scoping and match everything. Delegated
    /// roles match through glob-style path patterns or through hex
    /// prefixes of the path's sha256 digest.
    pub fn matches_path(&self, path: &str) -> bool {
        if self.paths.is_empty() && self.path_hash_prefixes.is_empty() {
            return true;
        }

        if self.paths.iter().any(|p| glob_match(p, path)) {
            return true;
        }

        if !self.path_hash_prefixes.is_empty() {
            let digest = hash_bytes_hex(HashAlg::Sha256, path.as_bytes());
            return self
                .path_hash_prefixes
                .iter()
                .any(|prefix| digest.starts_with(prefix));
        }

        false
    }
}

/// Glob matching for delegation path patterns: `*` matches any run of
/// characters (including `/`), `?` matches a single character.
fn glob_match(pattern: &str, path: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let s: Vec<char> = path.chars().collect();

    // Iterative wildcard match with backtracking over the last `*`.
    let (mut pi, mut si) = (0usize, 0usize);
    let (mut star, mut mark) = (None::<usize>, 0usize);

    while si < s.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == s[si]) {
            pi += 1;
            si += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = si;
            pi += 1;
        } else if let Some(sp) = star {
            pi = sp + 1;
            mark += 1;
            si = mark;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

/// An immutable batch of keys and roles produced by one delegation
/// import, merged into the store atomically.
#[derive(Debug, Default)]
pub struct StoreDelta {
    /// `(keyid alias, key)` pairs; one key appears once per alias.
    pub keys: Vec<(String, PublicKey)>,
    pub roles: Vec<Role>,
    /// Keyids whose entries were skipped for having an unrecognized or
    /// malformed `keytype`. Surfaced so the client can log them.
    pub skipped: Vec<String>,
}

/// Key store + role store for one repository instance.
#[derive(Debug, Default)]
pub struct TrustStore {
    keys: HashMap<String, PublicKey>,
    roles: HashMap<String, Role>,
}

impl TrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a key under every keyid it is known by.
    pub fn add_key(&mut self, key: &PublicKey) -> RatchetResult<()> {
        for keyid in key.keyids()? {
            self.keys.insert(keyid, key.clone());
        }
        Ok(())
    }

    pub fn key(&self, keyid: &str) -> RatchetResult<&PublicKey> {
        self.keys
            .get(keyid)
            .ok_or_else(|| RatchetError::UnknownKey(keyid.to_string()))
    }

    /// Add a role; an existing role of the same name is replaced. Used on
    /// root update and on delegation re-import.
    pub fn add_role(&mut self, role: Role) {
        self.roles.insert(role.name.clone(), role);
    }

    pub fn get_role(&self, name: &str) -> RatchetResult<&Role> {
        self.roles
            .get(name)
            .ok_or_else(|| RatchetError::UnknownRole(name.to_string()))
    }

    /// Every registered key authorized for `name`, deduplicated by key
    /// identity (aliased keyids collapse to one entry).
    pub fn keys_for_role(&self, name: &str) -> RatchetResult<Vec<&PublicKey>> {
        let role = self.get_role(name)?;
        let mut seen = BTreeSet::new();
        let mut keys = Vec::new();
        for keyid in &role.keyids {
            if let Some(key) = self.keys.get(keyid) {
                if seen.insert(key.primary_keyid()?) {
                    keys.push(key);
                }
            }
        }
        Ok(keys)
    }

    pub fn clear(&mut self) {
        self.keys.clear();
        self.roles.clear();
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub fn role_count(&self) -> usize {
        self.roles.len()
    }

    /// Clear and repopulate from a trusted root: every top-level role and
    /// every key root references, with all per-algorithm keyids.
    pub fn rebuild_from_root(&mut self, root: &RootMeta) -> RatchetResult<()> {
        self.clear();
        for key in root.keys.values() {
            self.add_key(key)?;
        }
        for (name, role_keys) in &root.roles {
            self.add_role(Role::top_level(name, role_keys));
        }
        Ok(())
    }

    /// Apply a delegation import in one step. A delta is only ever
    /// produced whole, so a failed import leaves the store untouched.
    pub fn merge(&mut self, delta: StoreDelta) {
        for (keyid, key) in delta.keys {
            self.keys.insert(keyid, key);
        }
        for role in delta.roles {
            self.add_role(role);
        }
    }
}
