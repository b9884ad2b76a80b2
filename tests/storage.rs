use seqsketch::index::storage::{FSStorage, Storage, TarStorage};

#[test]
fn fsstorage_save_then_load_roundtrips() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FSStorage::new(dir.path().to_str().unwrap(), "");

    let path = storage.save("leaf1.sig", b"hello signature").unwrap();
    let loaded = storage.load(&path).unwrap();
    assert_eq!(loaded, b"hello signature");
}

#[test]
fn fsstorage_rejects_empty_path() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FSStorage::new(dir.path().to_str().unwrap(), "");
    assert!(storage.save("", b"x").is_err());
}

#[test]
fn tarstorage_save_then_load_roundtrips() {
    let dir = tempfile::tempdir().unwrap();
    let tar_path = dir.path().join("archive.tar");
    let storage = TarStorage::new(&tar_path).unwrap();

    storage.save("a.sig", b"first").unwrap();
    storage.save("b.sig", b"second").unwrap();

    assert_eq!(storage.load("a.sig").unwrap(), b"first");
    assert_eq!(storage.load("b.sig").unwrap(), b"second");
}

#[test]
fn tarstorage_missing_member_errors() {
    let dir = tempfile::tempdir().unwrap();
    let tar_path = dir.path().join("archive.tar");
    let storage = TarStorage::new(&tar_path).unwrap();
    storage.save("a.sig", b"first").unwrap();

    assert!(storage.load("nope.sig").is_err());
}
