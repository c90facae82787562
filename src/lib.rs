//! # lockstash — deniable encrypted key-value storage in a single file
//!
//! Entries are addressed by secret codenames.  The container holds
//! equal-sized encrypted blobs; which blobs carry data, which are decoys,
//! and how many entries exist is visible only to holders of the right
//! codename keys.
//!
//! Format guarantees (frozen in format version 1):
//! - All numeric fields are big-endian; never negotiated
//! - Every blob slot is exactly `CLUSTER_SIZE` bytes; length reveals nothing
//! - Blob identity is the imprint: BLAKE3 keyed hash over a fresh 24-byte
//!   nonce under the codename key — no names, IDs, or counts on disk
//! - Key derivation is Argon2id with fixed parameters (see `kdf`); changing
//!   them is a format version change
//! - The encrypted region is ChaCha20 (original 64-bit-nonce construction)
//!   with a per-blob random nonce; header and body carry encrypted CRC32s
//! - Containers are replaced atomically via a temp sibling + rename; a
//!   reader sees the old file or the new one, never a mixture
//! - Without a codename key, every byte of the container is
//!   indistinguishable from uniform random data

pub mod kdf;
pub mod imprint;
pub mod codec;
pub mod blob;
pub mod namegroup;
pub mod container;
pub mod store;

// Flat re-exports for the most common types.
pub use blob::{encode_blob, fake_blob, BlobError, BlobHeader, BlobReader, EncodeSpec,
               CLUSTER_SIZE, MAX_PARTS, MAX_PART_CONTENT_SIZE};
pub use container::{BlobsIndexedReader, Container, ContainerError};
pub use imprint::Imprint;
pub use kdf::{CodenameKey, KdfError, KEY_LEN, KEY_SALT_SIZE};
pub use namegroup::{BlobKind, NameGroup};
pub use store::{Store, StoreError, MIN_CONTAINER_BLOBS};
