use super::*;

fn new_file(owner_id: UserId, name: &str, kind: FileKind, parent_id: Option<FileId>) -> NewFile {
    NewFile {
        owner_id,
        name: name.to_string(),
        kind,
        parent_id,
        is_public: false,
        content_ref: None,
    }
}

#[test]
fn insert_assigns_monotonic_ids() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileStore::open(tmp.path()).unwrap();
    let a = store.insert(new_file(1, "a", FileKind::Folder, None)).unwrap();
    let b = store.insert(new_file(1, "b", FileKind::Folder, None)).unwrap();
    assert!(b.id > a.id);
    assert_eq!(store.get(a.id).unwrap().name, "a");
}

#[test]
fn get_owned_filters_by_owner() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileStore::open(tmp.path()).unwrap();
    let rec = store.insert(new_file(1, "a", FileKind::Folder, None)).unwrap();
    assert!(store.get_owned(rec.id, 1).is_some());
    assert!(store.get_owned(rec.id, 2).is_none());
    assert!(store.get_owned(rec.id + 100, 1).is_none());
}

#[test]
fn scan_is_newest_first_with_offset_and_limit() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileStore::open(tmp.path()).unwrap();
    for i in 0..25 {
        store.insert(new_file(1, &format!("f{i}"), FileKind::Folder, None)).unwrap();
    }
    // Another owner's records must not bleed in
    store.insert(new_file(2, "other", FileKind::Folder, None)).unwrap();

    let page0 = store.scan(1, ParentFilter::Any, 0, 20);
    assert_eq!(page0.len(), 20);
    for pair in page0.windows(2) {
        assert!(pair[0].id > pair[1].id, "expected id-descending order");
    }
    let page1 = store.scan(1, ParentFilter::Any, 20, 20);
    assert_eq!(page1.len(), 5);
    assert!(page1.iter().all(|r| !page0.iter().any(|p| p.id == r.id)));
}

#[test]
fn scan_parent_filters() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileStore::open(tmp.path()).unwrap();
    let folder = store.insert(new_file(1, "docs", FileKind::Folder, None)).unwrap();
    store.insert(new_file(1, "top", FileKind::Folder, None)).unwrap();
    store.insert(new_file(1, "inner", FileKind::Folder, Some(folder.id))).unwrap();

    let root = store.scan(1, ParentFilter::Root, 0, 20);
    assert_eq!(root.len(), 2);
    assert!(root.iter().all(|r| r.parent_id.is_none()));

    let under = store.scan(1, ParentFilter::In(folder.id), 0, 20);
    assert_eq!(under.len(), 1);
    assert_eq!(under[0].name, "inner");
}

#[test]
fn set_public_is_conditional_on_owner() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FileStore::open(tmp.path()).unwrap();
    let rec = store.insert(new_file(1, "a", FileKind::Folder, None)).unwrap();

    // Wrong owner: no match, record unchanged
    assert!(store.set_public(rec.id, 2, true).unwrap().is_none());
    assert!(!store.get(rec.id).unwrap().is_public);

    // Owner: updated record returned
    let updated = store.set_public(rec.id, 1, true).unwrap().unwrap();
    assert!(updated.is_public);
    assert!(store.get(rec.id).unwrap().is_public);
}

#[test]
fn snapshot_reload_preserves_records_and_id_sequence() {
    let tmp = tempfile::tempdir().unwrap();
    let first;
    {
        let store = FileStore::open(tmp.path()).unwrap();
        first = store.insert(new_file(1, "a", FileKind::Folder, None)).unwrap();
        store.set_public(first.id, 1, true).unwrap();
    }
    let reopened = FileStore::open(tmp.path()).unwrap();
    let seen = reopened.get(first.id).unwrap();
    assert_eq!(seen.name, "a");
    assert!(seen.is_public);
    let next = reopened.insert(new_file(1, "b", FileKind::Folder, None)).unwrap();
    assert!(next.id > first.id);
}

#[test]
fn blob_roundtrip_and_missing() {
    let tmp = tempfile::tempdir().unwrap();
    let blobs = BlobStore::new(tmp.path()).unwrap();
    let handle = blobs.write(b"hello").unwrap();
    assert_eq!(blobs.read(&handle, None).unwrap().unwrap(), b"hello");
    assert!(blobs.read(&format!("{handle}-gone"), None).unwrap().is_none());
}

#[test]
fn blob_variant_resolves_by_suffix() {
    let tmp = tempfile::tempdir().unwrap();
    let blobs = BlobStore::new(tmp.path()).unwrap();
    let handle = blobs.write(b"full").unwrap();
    // Variant absent until a rendition is produced next to the original
    assert!(blobs.read(&handle, Some("100")).unwrap().is_none());
    std::fs::write(format!("{handle}_100"), b"thumb").unwrap();
    assert_eq!(blobs.read(&handle, Some("100")).unwrap().unwrap(), b"thumb");
}
