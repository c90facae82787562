//! The container file — a salt region followed by equal-sized blob slots.
//!
//! # On-disk layout
//!
//! ```text
//! Offset  Size            Field
//!    0     32             Salt — random, written once at creation
//!   32     N × 4096       Blob slots, each exactly CLUSTER_SIZE bytes
//! ```
//!
//! There is no index, no magic, and no count field: every byte of the file
//! is CSRNG output, imprint material, or keystream, so the whole container
//! is indistinguishable from random bytes.  `N` is recovered from the file
//! length; any remainder is a geometry error.
//!
//! # Atomic rewrite
//! Updates never touch the container in place.  A rewrite goes to the
//! `<name>.tmp` sibling (same directory, hence same filesystem), is fsynced
//! and closed, then renamed over the target.  A reader therefore sees
//! either the old container or the new one, never a mixture.  An aborted
//! rewrite leaves only the sibling, which the next `open` removes.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::blob::CLUSTER_SIZE;
use crate::kdf::KEY_SALT_SIZE;

#[derive(Error, Debug)]
pub enum ContainerError {
    /// File length is not a salt region plus whole blob slots.
    #[error("container length {0} does not split into whole blob slots")]
    Geometry(u64),
    /// A blob handed to `rewrite` has the wrong slot size.
    #[error("blob {index} is {len} bytes; every slot must be {CLUSTER_SIZE}")]
    SlotSize { index: usize, len: usize },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

// ── Indexed blob access ──────────────────────────────────────────────────────

/// Random access over the blob slots of a loaded container.
///
/// The whole slot region is held in memory; `blob(i)` is a zero-copy view.
pub struct BlobsIndexedReader {
    data: Vec<u8>,
}

impl BlobsIndexedReader {
    fn new(data: Vec<u8>) -> Result<Self, ContainerError> {
        if data.len() % CLUSTER_SIZE != 0 {
            return Err(ContainerError::Geometry((KEY_SALT_SIZE + data.len()) as u64));
        }
        Ok(Self { data })
    }

    /// Assemble a reader over an in-memory blob sequence, each entry
    /// exactly [`CLUSTER_SIZE`] bytes.
    pub fn from_blobs(blobs: &[Vec<u8>]) -> Result<Self, ContainerError> {
        let mut data = Vec::with_capacity(blobs.len() * CLUSTER_SIZE);
        for (index, blob) in blobs.iter().enumerate() {
            if blob.len() != CLUSTER_SIZE {
                return Err(ContainerError::SlotSize { index, len: blob.len() });
            }
            data.extend_from_slice(blob);
        }
        Ok(Self { data })
    }

    /// Number of blob slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() / CLUSTER_SIZE
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Byte view of slot `index`.
    #[inline]
    pub fn blob(&self, index: usize) -> &[u8] {
        &self.data[index * CLUSTER_SIZE..(index + 1) * CLUSTER_SIZE]
    }
}

// ── Container ────────────────────────────────────────────────────────────────

/// A loaded container: its salt plus indexed access to the blob slots.
pub struct Container {
    salt:  [u8; KEY_SALT_SIZE],
    blobs: BlobsIndexedReader,
}

impl Container {
    /// Load a container file.
    ///
    /// Removes a stale `<name>.tmp` sibling left by an aborted rewrite,
    /// then validates the file's geometry.
    pub fn open(path: &Path) -> Result<Self, ContainerError> {
        let tmp = tmp_sibling(path);
        if tmp.exists() {
            let _ = fs::remove_file(&tmp);
        }

        let data = fs::read(path)?;
        if data.len() < KEY_SALT_SIZE {
            return Err(ContainerError::Geometry(data.len() as u64));
        }
        let salt: [u8; KEY_SALT_SIZE] = data[..KEY_SALT_SIZE].try_into().unwrap();
        let blobs = BlobsIndexedReader::new(data[KEY_SALT_SIZE..].to_vec())?;

        debug!(slots = blobs.len(), "container opened");
        Ok(Self { salt, blobs })
    }

    /// An empty in-memory container with a caller-supplied salt; the state
    /// before the first write when no file exists yet.
    pub fn empty(salt: [u8; KEY_SALT_SIZE]) -> Self {
        Self { salt, blobs: BlobsIndexedReader { data: Vec::new() } }
    }

    #[inline]
    pub fn salt(&self) -> &[u8; KEY_SALT_SIZE] {
        &self.salt
    }

    #[inline]
    pub fn blobs(&self) -> &BlobsIndexedReader {
        &self.blobs
    }

    /// Replace the container at `path` with `salt` plus `blobs`, atomically.
    ///
    /// The new content is written to the `<name>.tmp` sibling, fsynced and
    /// closed, then renamed over the target.  The close must precede the
    /// rename (Windows refuses to replace an open file).
    pub fn rewrite(
        path:  &Path,
        salt:  &[u8; KEY_SALT_SIZE],
        blobs: &[Vec<u8>],
    ) -> Result<(), ContainerError> {
        for (index, blob) in blobs.iter().enumerate() {
            if blob.len() != CLUSTER_SIZE {
                return Err(ContainerError::SlotSize { index, len: blob.len() });
            }
        }

        let tmp = tmp_sibling(path);
        {
            let mut file = File::create(&tmp)?;
            file.write_all(salt)?;
            for blob in blobs {
                file.write_all(blob)?;
            }
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;

        debug!(slots = blobs.len(), "container rewritten");
        Ok(())
    }
}

/// The temp sibling used by `rewrite`: `<file name>.tmp` in the same
/// directory, so the final rename stays on one filesystem.
fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| std::ffi::OsString::from("container"));
    name.push(".tmp");
    path.with_file_name(name)
}
