//! ratchet-core
//!
//! Core trust primitives for RATCHET:
//! - Metadata models and the signed wire envelope
//! - Canonical JSON encoding for signed bytes and keyid derivation
//! - Hashing utilities with explicit algorithm selection
//! - Public keys with per-algorithm keyid aliasing
//! - The per-repository trust store (keys + role authorization rules)
//! - Stateless verification checks (threshold, length, hash, expiration)
//! - The delegation importer
//!
//! This crate performs no I/O and reads no clocks: expiration checks take
//! the boundary time as an argument, and all bytes come from the caller.
//! Networking, persistence, and the refresh state machine live in
//! `ratchet-client`.

pub mod canonical;
pub mod delegations;
pub mod errors;
pub mod hash;
pub mod keys;
pub mod metadata;
pub mod store;
pub mod verify;

pub use crate::errors::{RatchetError, RatchetResult};

/// Key types the verifier understands. Delegation entries with other
/// well-formed key types are skipped, not rejected (see `delegations`).
pub const SUPPORTED_KEY_TYPES: &[&str] = &["ed25519"];

/// Convenience re-exports.
pub mod prelude {
    pub use crate::hash::{HashAlg, hash_bytes, hash_bytes_hex, verify_hashes};
    pub use crate::keys::PublicKey;
    pub use crate::metadata::{
        DelegatedRole, Delegations, MetaFileInfo, Metadata, RootMeta, Signature, SnapshotMeta,
        TargetDescriptor, TargetInfo, TargetsMeta, TimestampMeta, ROLE_ROOT, ROLE_SNAPSHOT,
        ROLE_TARGETS, ROLE_TIMESTAMP, TOP_LEVEL_ROLES,
    };
    pub use crate::store::{Role, StoreDelta, TrustStore};
    pub use crate::{RatchetError, RatchetResult};
}
