//! Delegation import.
//!
//! Walks a parsed targets role's delegation section and produces the keys
//! and child roles it grants trust to, as an immutable [`StoreDelta`]
//! merged into the trust store in one step — a failed import of one
//! subtree can never leave the store half-updated.
//!
//! Key entries and role entries are treated asymmetrically on purpose:
//! a key row whose `keytype` is missing, non-string, or unrecognized is
//! skipped (forward compatibility with key types this build does not
//! understand), while a malformed `keyval` or a structurally broken role
//! entry aborts the whole import with a format error.

use serde_json::Value;

use crate::errors::{RatchetError, RatchetResult};
use crate::keys::{KeyVal, PublicKey};
use crate::metadata::{DelegatedRole, Delegations};
use crate::store::{Role, StoreDelta};
use crate::SUPPORTED_KEY_TYPES;

/// Build the store delta for `parent`'s delegation section.
pub fn import_delegations(
    delegations: &Delegations,
    parent: &str,
) -> RatchetResult<StoreDelta> {
    let mut delta = StoreDelta::default();

    for (keyid, entry) in &delegations.keys {
        let Some(keytype) = entry.get("keytype").and_then(Value::as_str) else {
            delta.skipped.push(keyid.clone());
            continue;
        };
        if !SUPPORTED_KEY_TYPES.contains(&keytype) {
            delta.skipped.push(keyid.clone());
            continue;
        }

        let key = parse_key(keyid, keytype, entry)?;
        for alias in key.keyids()? {
            delta.keys.push((alias, key.clone()));
        }
    }

    for entry in &delegations.roles {
        let role: DelegatedRole = serde_json::from_value(entry.clone()).map_err(|e| {
            RatchetError::format(format!(
                "malformed delegated role under '{parent}': {e}"
            ))
        })?;
        if role.name.is_empty() {
            return Err(RatchetError::format(format!(
                "delegated role under '{parent}' has an empty name"
            )));
        }
        if role.threshold == 0 {
            return Err(RatchetError::format(format!(
                "delegated role '{}' has a zero threshold",
                role.name
            )));
        }

        delta.roles.push(Role {
            name: role.name,
            threshold: role.threshold,
            keyids: role.keyids.into_iter().collect(),
            parent: Some(parent.to_string()),
            paths: role.paths,
            path_hash_prefixes: role.path_hash_prefixes,
            terminating: role.terminating,
        });
    }

    Ok(delta)
}

fn parse_key(keyid: &str, keytype: &str, entry: &Value) -> RatchetResult<PublicKey> {
    let public = entry
        .get("keyval")
        .and_then(|v| v.get("public"))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            RatchetError::format(format!("delegated key '{keyid}' has a malformed keyval"))
        })?;

    let decoded = hex::decode(public).map_err(|_| {
        RatchetError::format(format!("delegated key '{keyid}' has non-hex key material"))
    })?;
    if decoded.len() != 32 {
        return Err(RatchetError::format(format!(
            "delegated key '{keyid}' has {}-byte key material, expected 32",
            decoded.len()
        )));
    }

    let scheme = entry
        .get("scheme")
        .and_then(Value::as_str)
        .unwrap_or(keytype);

    Ok(PublicKey {
        keytype: keytype.to_string(),
        scheme: scheme.to_string(),
        keyval: KeyVal {
            public: public.to_string(),
        },
    })
}
