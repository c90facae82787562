//! Container file discipline: geometry validation, salt persistence,
//! temp-sibling cleanup, and whole-file replacement.

use std::fs;

use tempfile::TempDir;

use lockstash::blob::CLUSTER_SIZE;
use lockstash::container::{Container, ContainerError};
use lockstash::kdf::{CodenameKey, KEY_SALT_SIZE};

fn fake(byte: u8) -> Vec<u8> {
    lockstash::blob::fake_blob(&CodenameKey::from_bytes([byte; 32]))
}

#[test]
fn salt_and_blobs_survive_a_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vault.bin");

    let salt = [0xABu8; KEY_SALT_SIZE];
    let blobs = vec![fake(1), fake(2), fake(3)];
    Container::rewrite(&path, &salt, &blobs).unwrap();

    let container = Container::open(&path).unwrap();
    assert_eq!(
        hex::encode(container.salt()),
        hex::encode(salt),
        "salt changed across a reopen"
    );
    assert_eq!(container.blobs().len(), 3);
    for (i, blob) in blobs.iter().enumerate() {
        assert_eq!(container.blobs().blob(i), blob.as_slice());
    }
}

#[test]
fn file_length_must_align_to_slots() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vault.bin");

    let mut bytes = vec![0u8; KEY_SALT_SIZE + CLUSTER_SIZE + 17];
    bytes[0] = 1;
    fs::write(&path, &bytes).unwrap();

    assert!(matches!(Container::open(&path), Err(ContainerError::Geometry(_))));

    // Shorter than the salt region is also a geometry error.
    fs::write(&path, [0u8; 5]).unwrap();
    assert!(matches!(Container::open(&path), Err(ContainerError::Geometry(_))));
}

#[test]
fn missing_file_surfaces_as_io_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nowhere.bin");
    match Container::open(&path) {
        Err(ContainerError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
        Err(other) => panic!("expected NotFound, got {other:?}"),
        Ok(_) => panic!("opened a container that does not exist"),
    }
}

#[test]
fn wrong_slot_size_is_rejected_before_any_write() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vault.bin");

    let blobs = vec![fake(1), vec![0u8; CLUSTER_SIZE - 1]];
    let result = Container::rewrite(&path, &[0u8; KEY_SALT_SIZE], &blobs);
    assert!(matches!(result, Err(ContainerError::SlotSize { index: 1, .. })));
    assert!(!path.exists(), "a rejected rewrite must not create the target");
}

#[test]
fn stale_tmp_sibling_is_removed_on_open() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vault.bin");
    Container::rewrite(&path, &[0u8; KEY_SALT_SIZE], &[fake(1)]).unwrap();

    // Simulate an aborted rewrite.
    let tmp = dir.path().join("vault.bin.tmp");
    fs::write(&tmp, b"half-written junk").unwrap();

    Container::open(&path).unwrap();
    assert!(!tmp.exists(), "stale temp sibling survived open");
}

#[test]
fn rewrite_replaces_the_whole_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vault.bin");

    Container::rewrite(&path, &[1u8; KEY_SALT_SIZE], &[fake(1), fake(2)]).unwrap();
    Container::rewrite(&path, &[1u8; KEY_SALT_SIZE], &[fake(3)]).unwrap();

    let container = Container::open(&path).unwrap();
    assert_eq!(container.blobs().len(), 1);

    // No leftover temp sibling after a successful rewrite.
    assert!(!dir.path().join("vault.bin.tmp").exists());

    // The file is exactly salt + slots: nothing else is ever appended.
    let len = fs::metadata(&path).unwrap().len() as usize;
    assert_eq!(len, KEY_SALT_SIZE + CLUSTER_SIZE);
}
