//! Public key material and keyid derivation.
//!
//! One logical key is known under several keyids — one per supported
//! digest algorithm, each computed over the key's canonical form — so
//! verifiers keyed on different hash algorithms all recognize the same
//! key. Keys are immutable once loaded.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::canonical::canonical_json_bytes;
use crate::errors::{RatchetError, RatchetResult};
use crate::hash::{hash_bytes_hex, HashAlg};
use crate::SUPPORTED_KEY_TYPES;

/// Digest algorithms a keyid is derived with, in alias order.
pub const KEYID_HASH_ALGORITHMS: &[HashAlg] = &[HashAlg::Sha256, HashAlg::Sha512];

/// Raw key material as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyVal {
    /// Hex-encoded public key bytes.
    pub public: String,
}

/// A public key loaded from root or delegation metadata.
///
/// `keytype` is an open string: unknown-but-well-formed types parse fine,
/// they just cannot verify anything (see [`PublicKey::is_supported`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    pub keytype: String,
    pub scheme: String,
    pub keyval: KeyVal,
}

impl PublicKey {
    pub fn ed25519(public_hex: impl Into<String>) -> Self {
        Self {
            keytype: "ed25519".to_string(),
            scheme: "ed25519".to_string(),
            keyval: KeyVal {
                public: public_hex.into(),
            },
        }
    }

    /// Whether the verifier understands this key type.
    pub fn is_supported(&self) -> bool {
        SUPPORTED_KEY_TYPES.contains(&self.keytype.as_str())
    }

    fn canonical_form(&self) -> RatchetResult<Vec<u8>> {
        canonical_json_bytes(&json!({
            "keytype": self.keytype,
            "scheme": self.scheme,
            "keyval": {"public": self.keyval.public},
        }))
    }

    /// Every keyid this key is known under, one per digest algorithm.
    pub fn keyids(&self) -> RatchetResult<Vec<String>> {
        let form = self.canonical_form()?;
        Ok(KEYID_HASH_ALGORITHMS
            .iter()
            .map(|alg| hash_bytes_hex(*alg, &form))
            .collect())
    }

    /// The sha256 keyid, used wherever a single stable identity is needed.
    pub fn primary_keyid(&self) -> RatchetResult<String> {
        let form = self.canonical_form()?;
        Ok(hash_bytes_hex(HashAlg::Sha256, &form))
    }

    /// Verify a hex-encoded signature over `message`.
    ///
    /// Returns `Ok(false)` on a well-formed but non-matching signature;
    /// malformed key material or signature bytes are format errors.
    pub fn verify(&self, message: &[u8], sig_hex: &str) -> RatchetResult<bool> {
        if !self.is_supported() {
            return Err(RatchetError::format(format!(
                "cannot verify with key type '{}'",
                self.keytype
            )));
        }

        let public = hex::decode(&self.keyval.public)
            .map_err(|_| RatchetError::format("public key is not valid hex"))?;
        let public: [u8; 32] = public
            .try_into()
            .map_err(|_| RatchetError::format("ed25519 public key must be 32 bytes"))?;
        let key = VerifyingKey::from_bytes(&public)
            .map_err(|_| RatchetError::format("invalid ed25519 public key"))?;

        let sig = hex::decode(sig_hex)
            .map_err(|_| RatchetError::format("signature is not valid hex"))?;
        let sig = Signature::from_slice(&sig)
            .map_err(|_| RatchetError::format("invalid ed25519 signature encoding"))?;

        Ok(key.verify(message, &sig).is_ok())
    }
}
