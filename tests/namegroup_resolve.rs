//! Resolver behavior: classification, freshest-complete-version selection,
//! and fallback when a version is missing parts.

use std::io::Cursor;

use lockstash::blob::{encode_blob, fake_blob, EncodeSpec, CLUSTER_SIZE, MAX_PART_CONTENT_SIZE};
use lockstash::container::BlobsIndexedReader;
use lockstash::kdf::CodenameKey;
use lockstash::namegroup::NameGroup;

fn key(byte: u8) -> CodenameKey {
    CodenameKey::from_bytes([byte; 32])
}

fn random_blob() -> Vec<u8> {
    use rand::RngCore;
    let mut blob = vec![0u8; CLUSTER_SIZE];
    rand::thread_rng().fill_bytes(&mut blob);
    blob
}

/// Encode `payload` as a complete multi-part set under `key` at `version`.
fn encode_parts(key: &CodenameKey, version: i64, payload: &[u8], parts_len: u16) -> Vec<Vec<u8>> {
    let mut source = Cursor::new(payload);
    (0..parts_len)
        .map(|part_idx| {
            let offset = part_idx as usize * MAX_PART_CONTENT_SIZE;
            let part_size = payload.len().saturating_sub(offset).min(MAX_PART_CONTENT_SIZE);
            let spec = EncodeSpec {
                data_version: version,
                part_idx:     part_idx as u8,
                parts_len,
                part_size:    Some(part_size as u32),
            };
            encode_blob(key, &spec, &mut source).unwrap()
        })
        .collect()
}

fn reassemble(key: &CodenameKey, blobs: &BlobsIndexedReader, group: &NameGroup) -> Vec<u8> {
    let mut out = Vec::new();
    for &index in group.fresh_indices() {
        let mut reader = lockstash::blob::BlobReader::new(key, blobs.blob(index));
        out.extend_from_slice(&reader.read_body().unwrap());
    }
    out
}

#[test]
fn classifies_foreign_fake_and_real() {
    let mine = key(1);
    let theirs = key(2);

    let blobs = BlobsIndexedReader::from_blobs(&[
        random_blob(),
        fake_blob(&mine),
        encode_parts(&mine, 1, b"data", 1).remove(0),
        encode_parts(&theirs, 1, b"other", 1).remove(0),
    ])
    .unwrap();

    let group = NameGroup::resolve(&mine, &blobs);
    assert!(group.kind(0).is_foreign());
    assert!(group.kind(1).is_fake());
    assert!(group.kind(2).is_real());
    assert!(group.kind(3).is_foreign());
    assert_eq!(group.fresh_indices(), &[2]);
    assert_eq!(group.fresh_version(), Some(1));
}

#[test]
fn partial_version_falls_back_to_older_complete_one() {
    let k = key(3);
    let old = encode_parts(&k, 1, b"old", 1);
    // Version 2 claims two parts but only part 0 made it into the container.
    let mut newer = encode_parts(&k, 2, &vec![0x42u8; MAX_PART_CONTENT_SIZE + 10], 2);
    let newer_part0 = newer.remove(0);

    let blobs = BlobsIndexedReader::from_blobs(&[newer_part0, old[0].clone()]).unwrap();
    let group = NameGroup::resolve(&k, &blobs);

    assert_eq!(group.fresh_version(), Some(1));
    assert_eq!(group.latest_version(), Some(2));
    assert_eq!(reassemble(&k, &blobs, &group), b"old");
}

#[test]
fn no_complete_version_means_no_entry() {
    let k = key(4);
    let mut parts = encode_parts(&k, 1, &vec![0x43u8; MAX_PART_CONTENT_SIZE * 2], 3);
    parts.remove(1); // lose the middle part

    let blobs = BlobsIndexedReader::from_blobs(&parts).unwrap();
    let group = NameGroup::resolve(&k, &blobs);
    assert!(!group.has_fresh_data());
    assert!(group.fresh_indices().is_empty());
    assert_eq!(group.fresh_version(), None);
}

#[test]
fn duplicate_part_index_does_not_count_as_complete() {
    let k = key(5);
    let spec = EncodeSpec { data_version: 1, part_idx: 0, parts_len: 2, part_size: Some(2) };
    // Two copies of part 0 of a two-part entry: the cardinality matches
    // parts_len but the index set is not {0, 1}.
    let a = encode_blob(&k, &spec, &mut Cursor::new(b"aaaa")).unwrap();
    let b = encode_blob(&k, &spec, &mut Cursor::new(b"bbbb")).unwrap();

    let blobs = BlobsIndexedReader::from_blobs(&[a, b]).unwrap();
    let group = NameGroup::resolve(&k, &blobs);
    assert!(!group.has_fresh_data());
}

#[test]
fn fresh_parts_come_back_in_part_order() {
    let k = key(6);
    let payload: Vec<u8> = (0..(MAX_PART_CONTENT_SIZE * 2 + 99))
        .map(|i| (i % 251) as u8)
        .collect();
    let parts = encode_parts(&k, 7, &payload, 3);

    // Store them shuffled; the resolver must still order by part_idx.
    let shuffled = vec![parts[2].clone(), parts[0].clone(), parts[1].clone()];
    let blobs = BlobsIndexedReader::from_blobs(&shuffled).unwrap();

    let group = NameGroup::resolve(&k, &blobs);
    assert_eq!(group.fresh_indices().len(), 3);
    assert_eq!(reassemble(&k, &blobs, &group), payload);
}

#[test]
fn newest_complete_version_shadows_older_ones() {
    let k = key(7);
    let v1 = encode_parts(&k, 1, b"first", 1);
    let v2 = encode_parts(&k, 2, b"second", 1);
    let v3 = encode_parts(&k, 3, b"third", 1);

    let blobs =
        BlobsIndexedReader::from_blobs(&[v2[0].clone(), v3[0].clone(), v1[0].clone()]).unwrap();
    let group = NameGroup::resolve(&k, &blobs);

    assert_eq!(group.fresh_version(), Some(3));
    assert_eq!(group.fresh_indices(), &[1]);
    assert_eq!(reassemble(&k, &blobs, &group), b"third");
    // The stale versions still classify as real blobs of this codename.
    assert!(group.kind(0).is_real());
    assert!(group.kind(2).is_real());
}

#[test]
fn empty_container_resolves_to_nothing() {
    let k = key(8);
    let blobs = BlobsIndexedReader::from_blobs(&[]).unwrap();
    let group = NameGroup::resolve(&k, &blobs);
    assert!(!group.has_fresh_data());
    assert_eq!(group.latest_version(), None);
    assert!(group.kinds().is_empty());
}
