//! Name-group resolution — classify every blob under one key and pick the
//! freshest complete data version.
//!
//! Resolution cost is linear in the number of blobs and, for blobs that
//! belong to other codenames, independent of blob size: a foreign blob is
//! dismissed after one 56-byte imprint check.  Only blobs carrying both
//! imprints pay for header decryption.
//!
//! A blob that fails to classify never raises out of the resolver.  Failure
//! is itself a classification: a bad header on a blob with two matching
//! imprints is indistinguishable from an imprint collision with random
//! bytes, so the blob is demoted to [`BlobKind::Foreign`] and ignored.

use tracing::debug;

use crate::blob::{BlobHeader, BlobReader};
use crate::container::BlobsIndexedReader;
use crate::kdf::CodenameKey;

// ── Classification ───────────────────────────────────────────────────────────

/// The resolver's verdict for one blob slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobKind {
    /// Another codename's blob, or pure random bytes.
    Foreign,
    /// An authored decoy for this codename: first imprint matches, second
    /// does not.
    Fake,
    /// A data-carrying part of some version of this codename's entry.
    Real(BlobHeader),
}

impl BlobKind {
    #[inline]
    pub fn is_foreign(&self) -> bool {
        matches!(self, BlobKind::Foreign)
    }

    #[inline]
    pub fn is_fake(&self) -> bool {
        matches!(self, BlobKind::Fake)
    }

    #[inline]
    pub fn is_real(&self) -> bool {
        matches!(self, BlobKind::Real(_))
    }
}

// ── NameGroup ────────────────────────────────────────────────────────────────

/// Classification of a whole container under one key, with the fresh data
/// version selected.
pub struct NameGroup {
    kinds:         Vec<BlobKind>,
    fresh:         Vec<usize>,
    fresh_version: Option<i64>,
    latest_version: Option<i64>,
}

impl NameGroup {
    /// Scan all blobs and resolve the fresh set.
    ///
    /// The fresh set is the highest `data_version` whose members agree on
    /// `parts_len`, number exactly `parts_len`, and cover every `part_idx`
    /// in `0..parts_len`.  If no version is complete, the fresh set is
    /// empty and a lookup reports "no entry".
    pub fn resolve(key: &CodenameKey, blobs: &BlobsIndexedReader) -> Self {
        let mut kinds = Vec::with_capacity(blobs.len());
        let mut real: Vec<(usize, BlobHeader)> = Vec::new();

        for index in 0..blobs.len() {
            let mut reader = BlobReader::new(key, blobs.blob(index));
            let kind = if !reader.belongs_to_namegroup() {
                BlobKind::Foreign
            } else if !reader.contains_data() {
                BlobKind::Fake
            } else {
                match reader.header() {
                    Ok(header) => {
                        real.push((index, header));
                        BlobKind::Real(header)
                    }
                    // Suspected imprint collision or corruption; not ours.
                    Err(_) => BlobKind::Foreign,
                }
            };
            kinds.push(kind);
        }

        let mut versions: Vec<i64> = real.iter().map(|(_, h)| h.data_version).collect();
        versions.sort_unstable();
        versions.dedup();
        let latest_version = versions.last().copied();

        let mut fresh = Vec::new();
        let mut fresh_version = None;
        for &version in versions.iter().rev() {
            let members: Vec<(usize, BlobHeader)> = real
                .iter()
                .copied()
                .filter(|(_, h)| h.data_version == version)
                .collect();
            if let Some(ordered) = complete_group(&members) {
                fresh = ordered;
                fresh_version = Some(version);
                break;
            }
        }

        debug!(
            blobs = blobs.len(),
            fakes = kinds.iter().filter(|k| k.is_fake()).count(),
            real = real.len(),
            fresh = fresh.len(),
            "name group resolved"
        );

        Self { kinds, fresh, fresh_version, latest_version }
    }

    /// Verdict for blob `index`.
    #[inline]
    pub fn kind(&self, index: usize) -> &BlobKind {
        &self.kinds[index]
    }

    /// Verdicts for all slots, in blob order.
    #[inline]
    pub fn kinds(&self) -> &[BlobKind] {
        &self.kinds
    }

    /// Blob indices of the fresh data version, ordered by `part_idx`.
    /// Empty when the codename has no complete entry.
    #[inline]
    pub fn fresh_indices(&self) -> &[usize] {
        &self.fresh
    }

    /// `data_version` of the fresh set, if any version is complete.
    #[inline]
    pub fn fresh_version(&self) -> Option<i64> {
        self.fresh_version
    }

    /// Highest `data_version` seen on any real blob, complete or not.
    /// The write path bumps past this so versions strictly increase.
    #[inline]
    pub fn latest_version(&self) -> Option<i64> {
        self.latest_version
    }

    #[inline]
    pub fn has_fresh_data(&self) -> bool {
        !self.fresh.is_empty()
    }
}

/// If `members` form a complete version group, return their blob indices
/// ordered by `part_idx`; otherwise `None`.
fn complete_group(members: &[(usize, BlobHeader)]) -> Option<Vec<usize>> {
    let parts_len = members.first()?.1.parts_len as usize;
    if members.len() != parts_len {
        return None;
    }
    if members.iter().any(|(_, h)| h.parts_len as usize != parts_len) {
        return None;
    }

    // part_idx < parts_len is guaranteed by header validation, so each
    // member lands in a slot; a duplicate index implies a missing one.
    let mut slots: Vec<Option<usize>> = vec![None; parts_len];
    for &(index, header) in members {
        let slot = &mut slots[header.part_idx as usize];
        if slot.is_some() {
            return None;
        }
        *slot = Some(index);
    }
    slots.into_iter().collect()
}
