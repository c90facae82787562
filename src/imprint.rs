//! Imprints — the 56-byte tags that bind a blob to a codename key.
//!
//! An imprint is `nonce (24 B) ∥ digest (32 B)` where the digest is the
//! BLAKE3 keyed hash of the nonce under the codename key.  To anyone without
//! the key both halves are uniform random bytes; to the key holder the tag
//! is verifiable.  Because the nonce is sampled fresh from the CSRNG, two
//! imprints from the same key never repeat, so identical entries written
//! twice share no visible bytes.
//!
//! Imprint identity (frozen in format version 1): BLAKE3 keyed mode,
//! key = codename key, input = the 24-byte nonce, 32 bytes of output.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::kdf::CodenameKey;

/// Byte length of the random nonce half.
pub const NONCE_LEN: usize = 24;
/// Byte length of the keyed-hash half.
pub const DIGEST_LEN: usize = 32;
/// Total emitted length: `nonce ∥ digest`.
pub const FULL_LEN: usize = NONCE_LEN + DIGEST_LEN;

/// A freshly generated (nonce, digest) tag.
#[derive(Clone, PartialEq, Eq)]
pub struct Imprint {
    bytes: [u8; FULL_LEN],
}

impl Imprint {
    /// Sample a fresh nonce and compute its keyed digest.
    ///
    /// Every call consumes the CSRNG and yields distinct bytes, even for
    /// the same key.
    pub fn generate(key: &CodenameKey) -> Self {
        let mut bytes = [0u8; FULL_LEN];
        OsRng.fill_bytes(&mut bytes[..NONCE_LEN]);
        let digest = blake3::keyed_hash(key.as_bytes(), &bytes[..NONCE_LEN]);
        bytes[NONCE_LEN..].copy_from_slice(digest.as_bytes());
        Self { bytes }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; FULL_LEN] {
        &self.bytes
    }
}

/// Verify that `bytes` is an imprint generated under `key`.
///
/// Recomputes the digest from the embedded nonce and compares via
/// `blake3::Hash` equality, which is constant-time.  Anything that is not
/// exactly [`FULL_LEN`] bytes fails.
pub fn matches_key(key: &CodenameKey, bytes: &[u8]) -> bool {
    if bytes.len() != FULL_LEN {
        return false;
    }
    let stored: [u8; DIGEST_LEN] = bytes[NONCE_LEN..].try_into().unwrap();
    blake3::keyed_hash(key.as_bytes(), &bytes[..NONCE_LEN]) == blake3::Hash::from(stored)
}
