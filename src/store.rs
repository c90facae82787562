//! The store — set/get entries by codename over one container file.
//!
//! ```no_run
//! use lockstash::store::Store;
//!
//! let store = Store::new("vault.bin");
//! store.set_text("rosebud", "meet at the old pier, 21:00")?;
//! assert_eq!(store.get_text("rosebud")?, "meet at the old pier, 21:00");
//! # Ok::<(), lockstash::store::StoreError>(())
//! ```
//!
//! Every operation derives the codename key (deliberately slow), resolves
//! the name group, and — for writes — rebuilds the whole container through
//! an atomic rename.  Blobs belonging to other codenames are carried over
//! byte for byte; this codename's superseded blobs and decoys are replaced.
//!
//! # Decoy policy
//! A write adds one to three fresh decoys under the written codename and
//! tops the container up with decoys authored under freshly sampled random
//! keys (indistinguishable from other codenames' keys) to a randomized
//! floor, then shuffles slot order.  The blob count is deliberately an
//! unreliable signal.

use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::{thread_rng, Rng, RngCore};
use tracing::debug;
use thiserror::Error;

use crate::blob::{encode_blob, fake_blob, BlobError, BlobReader, EncodeSpec};
use crate::blob::{MAX_PARTS, MAX_PART_CONTENT_SIZE};
use crate::container::{Container, ContainerError};
use crate::kdf::{CodenameKey, KdfError, KEY_LEN, KEY_SALT_SIZE};
use crate::namegroup::NameGroup;

/// Every rewrite pads the container to at least this many slots.
pub const MIN_CONTAINER_BLOBS: usize = 16;

#[derive(Error, Debug)]
pub enum StoreError {
    /// No complete entry exists under the codename.
    #[error("no entry under that codename")]
    NotFound,
    /// `get_text` on an entry whose bytes are not UTF-8.
    #[error("entry is not valid UTF-8 text")]
    NotText,
    /// Reassembled part sizes disagree with the recorded total.
    #[error("reassembled {actual} bytes but the entry records {expected}")]
    SizeMismatch { expected: u64, actual: u64 },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("container error: {0}")]
    Container(#[from] ContainerError),
    #[error("key derivation error: {0}")]
    Kdf(#[from] KdfError),
    #[error("blob error: {0}")]
    Blob(#[from] BlobError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Handle on a container file.  Cheap to construct; all I/O happens per
/// operation.
pub struct Store {
    path: PathBuf,
}

impl Store {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_owned() }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    // ── Write ────────────────────────────────────────────────────────────────

    /// Set the entry to a text value.
    pub fn set_text(&self, codename: &str, text: &str) -> Result<(), StoreError> {
        self.set_bytes(codename, text.as_bytes())
    }

    /// Set the entry to the contents of a binary file.
    pub fn set_file(&self, codename: &str, source: &Path) -> Result<(), StoreError> {
        let data = fs::read(source)?;
        self.set_bytes(codename, &data)
    }

    /// Set the entry to an arbitrary byte payload, creating the container
    /// (with a fresh random salt) if the file does not exist yet.
    pub fn set_bytes(&self, codename: &str, payload: &[u8]) -> Result<(), StoreError> {
        validate_codename(codename)?;

        let parts_len = if payload.is_empty() {
            1
        } else {
            payload.len().div_ceil(MAX_PART_CONTENT_SIZE)
        };
        if parts_len > MAX_PARTS {
            return Err(StoreError::InvalidArgument(format!(
                "payload of {} bytes exceeds the {}-byte entry maximum",
                payload.len(),
                MAX_PARTS * MAX_PART_CONTENT_SIZE
            )));
        }

        let container = match Container::open(&self.path) {
            Ok(container) => container,
            Err(ContainerError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                let mut salt = [0u8; KEY_SALT_SIZE];
                OsRng.fill_bytes(&mut salt);
                Container::empty(salt)
            }
            Err(e) => return Err(e.into()),
        };
        let salt = *container.salt();

        let key = CodenameKey::derive(codename, &salt)?;
        let group = NameGroup::resolve(&key, container.blobs());

        // Strictly increasing even when a higher, incomplete version is
        // lying around from an interrupted write.
        let data_version = group.latest_version().unwrap_or(0) + 1;

        // Foreign blobs survive byte for byte; our old parts and decoys die.
        let mut slots: Vec<Vec<u8>> = Vec::new();
        for (index, kind) in group.kinds().iter().enumerate() {
            if kind.is_foreign() {
                slots.push(container.blobs().blob(index).to_vec());
            }
        }
        let preserved = slots.len();

        let mut source = Cursor::new(payload);
        for part_idx in 0..parts_len {
            let offset = part_idx * MAX_PART_CONTENT_SIZE;
            let part_size = payload.len().saturating_sub(offset).min(MAX_PART_CONTENT_SIZE);
            let spec = EncodeSpec {
                data_version,
                part_idx:  part_idx as u8,
                parts_len: parts_len as u16,
                part_size: Some(part_size as u32),
            };
            slots.push(encode_blob(&key, &spec, &mut source)?);
        }

        let mut rng = thread_rng();
        for _ in 0..rng.gen_range(1..=3) {
            slots.push(fake_blob(&key));
        }
        let target = MIN_CONTAINER_BLOBS.max(slots.len()) + rng.gen_range(0..=4);
        while slots.len() < target {
            let mut random_key = [0u8; KEY_LEN];
            OsRng.fill_bytes(&mut random_key);
            slots.push(fake_blob(&CodenameKey::from_bytes(random_key)));
        }
        slots.shuffle(&mut rng);

        debug!(
            parts = parts_len,
            preserved,
            total = slots.len(),
            "rewriting container"
        );
        Container::rewrite(&self.path, &salt, &slots)?;
        Ok(())
    }

    // ── Read ─────────────────────────────────────────────────────────────────

    /// Fetch the entry as text.
    pub fn get_text(&self, codename: &str) -> Result<String, StoreError> {
        String::from_utf8(self.get_bytes(codename)?).map_err(|_| StoreError::NotText)
    }

    /// Fetch the entry and write it to a binary file.
    pub fn get_file(&self, codename: &str, target: &Path) -> Result<(), StoreError> {
        let data = self.get_bytes(codename)?;
        fs::write(target, data)?;
        Ok(())
    }

    /// Fetch the entry's bytes, reassembled from its freshest complete set
    /// of parts.  [`StoreError::NotFound`] when the container is missing or
    /// holds no complete entry under the codename.
    pub fn get_bytes(&self, codename: &str) -> Result<Vec<u8>, StoreError> {
        validate_codename(codename)?;

        let container = match Container::open(&self.path) {
            Ok(container) => container,
            Err(ContainerError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound)
            }
            Err(e) => return Err(e.into()),
        };

        let key = CodenameKey::derive(codename, container.salt())?;
        let group = NameGroup::resolve(&key, container.blobs());
        if !group.has_fresh_data() {
            return Err(StoreError::NotFound);
        }

        let mut out = Vec::new();
        let mut recorded_total = 0u64;
        for &index in group.fresh_indices() {
            let mut reader = BlobReader::new(&key, container.blobs().blob(index));
            let header = reader.header()?;
            recorded_total = header.full_size as u64;
            out.extend_from_slice(&reader.read_body()?);
        }
        if out.len() as u64 != recorded_total {
            return Err(StoreError::SizeMismatch {
                expected: recorded_total,
                actual:   out.len() as u64,
            });
        }
        Ok(out)
    }
}

fn validate_codename(codename: &str) -> Result<(), StoreError> {
    if codename.is_empty() {
        return Err(StoreError::InvalidArgument("codename must not be empty".into()));
    }
    Ok(())
}
