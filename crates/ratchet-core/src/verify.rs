//! Stateless verification checks.
//!
//! These functions consult the trust store and the candidate bytes; they
//! hold no state of their own and perform no I/O. The refresh engine
//! sequences them.

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::errors::{RatchetError, RatchetResult};
use crate::metadata::Metadata;
use crate::store::TrustStore;

/// Threshold signature check.
///
/// Counts signatures whose keyid is authorized for the role and whose
/// cryptographic verification succeeds, deduplicated by key identity so
/// that two keyid aliases of one key cannot satisfy a threshold of two.
/// Signatures that fail to verify, reference unknown keys, or carry
/// unsupported key types are ignored rather than fatal: only the final
/// count matters.
pub fn check_signatures(
    store: &TrustStore,
    role_name: &str,
    metadata: &Metadata,
) -> RatchetResult<()> {
    let role = store.get_role(role_name)?;
    let signed = metadata.signed_bytes()?;

    let mut verified = std::collections::BTreeSet::new();
    for signature in &metadata.signatures {
        if !role.keyids.contains(&signature.keyid) {
            continue;
        }
        let Ok(key) = store.key(&signature.keyid) else {
            continue;
        };
        if !key.is_supported() {
            continue;
        }
        if let Ok(true) = key.verify(&signed, &signature.sig) {
            verified.insert(key.keyval.public.clone());
        }
    }

    if verified.len() < role.threshold as usize {
        return Err(RatchetError::InsufficientSignatures {
            role: role_name.to_string(),
            verified: verified.len(),
            threshold: role.threshold,
        });
    }
    Ok(())
}

/// Hard length check: the downloaded length must equal the trusted length
/// exactly. Used for metadata and targets whose size is known a priori.
pub fn check_hard_length(observed: u64, expected: u64) -> RatchetResult<()> {
    if observed != expected {
        return Err(RatchetError::LengthMismatch { observed, expected });
    }
    Ok(())
}

/// Soft length check: the downloaded length must not exceed an upper
/// bound. Used before a file's own manifest entry is available, to bound
/// resource consumption against an oversized malicious response.
pub fn check_soft_length(name: &str, observed: u64, limit: u64) -> RatchetResult<()> {
    if observed > limit {
        return Err(RatchetError::DownloadTooLarge {
            name: name.to_string(),
            limit,
        });
    }
    Ok(())
}

/// Expiration check: `expires` must be strictly after `earliest_valid`,
/// which the active transport defines (wall clock for remote mirrors; a
/// git transport may pin it to a commit time). Signature validity never
/// overrides an expired timestamp.
pub fn check_expiration(
    role_name: &str,
    metadata: &Metadata,
    earliest_valid: OffsetDateTime,
) -> RatchetResult<()> {
    let expires = metadata.expires()?;
    if expires <= earliest_valid {
        return Err(RatchetError::ExpiredMetadata {
            role: role_name.to_string(),
            expires: expires
                .format(&Rfc3339)
                .unwrap_or_else(|_| expires.to_string()),
        });
    }
    Ok(())
}
