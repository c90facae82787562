//! Codename key derivation — Argon2id, parameters frozen in the format.
//!
//! A [`CodenameKey`] is the only secret in the system: 32 bytes derived from
//! a user-supplied codename and the container's 32-byte salt.  The same key
//! drives the stream cipher and the imprint hash, so any implementation that
//! derives a different key cannot read the container.  For that reason the
//! KDF identity below is part of the on-disk format:
//!
//! ```text
//! Argon2id, version 0x13
//!   memory      65536 KiB (64 MiB)
//!   iterations  3
//!   lanes       1
//!   output      32 bytes
//! ```
//!
//! Changing any of these values is a format version change, not a tuning
//! knob.  Derivation deliberately costs a noticeable fraction of a second;
//! callers derive once per logical operation and drop the key when done.

use argon2::{Algorithm, Argon2, Params, Version};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Byte length of a derived codename key.
pub const KEY_LEN: usize = 32;

/// Byte length of the per-container salt the KDF consumes.
pub const KEY_SALT_SIZE: usize = 32;

/// Argon2id memory cost in KiB.  Frozen.
pub const KDF_MEM_KIB: u32 = 64 * 1024;
/// Argon2id iteration count.  Frozen.
pub const KDF_ITERATIONS: u32 = 3;
/// Argon2id lane count.  Frozen.
pub const KDF_LANES: u32 = 1;

#[derive(Error, Debug)]
pub enum KdfError {
    /// Parameter rejection or allocation failure inside Argon2.
    #[error("key derivation failed: {0}")]
    Derivation(String),
}

/// 32-byte symmetric key derived from (codename, salt).
///
/// The key is zeroized when dropped.  `Debug` never prints key material.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CodenameKey {
    bytes: [u8; KEY_LEN],
}

impl CodenameKey {
    /// Derive the key for `codename` under a container's salt.
    ///
    /// Deterministic: the same (codename, salt) pair always yields the same
    /// key, on any implementation of this format.
    pub fn derive(codename: &str, salt: &[u8; KEY_SALT_SIZE]) -> Result<Self, KdfError> {
        let params = Params::new(KDF_MEM_KIB, KDF_ITERATIONS, KDF_LANES, Some(KEY_LEN))
            .map_err(|e| KdfError::Derivation(e.to_string()))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let mut bytes = [0u8; KEY_LEN];
        argon2
            .hash_password_into(codename.as_bytes(), salt, &mut bytes)
            .map_err(|e| KdfError::Derivation(e.to_string()))?;
        Ok(Self { bytes })
    }

    /// Wrap already-derived key material.
    ///
    /// Also the stand-in for "a random codename's key" when authoring decoy
    /// blobs: 32 uniform random bytes are indistinguishable from a real
    /// derivation output.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl std::fmt::Debug for CodenameKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodenameKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}
