use std::collections::BTreeMap;

use quota_store::{FsStore, PersistenceStore, StoreError, load_json, save_json};
use tempfile::TempDir;

#[test]
fn reopened_store_sees_saved_documents() {
    let tmp = TempDir::new().expect("tmpdir");
    let mut owners = BTreeMap::new();
    owners.insert(7u32, 76561198000000001u64);
    owners.insert(9u32, 76561198000000002u64);

    {
        let store = FsStore::open(tmp.path()).expect("open");
        save_json(&store, "ownership-ledger", &owners).expect("save");
    }

    let store = FsStore::open(tmp.path()).expect("reopen");
    let loaded: BTreeMap<u32, u64> = load_json(&store, "ownership-ledger")
        .expect("load")
        .expect("present");
    assert_eq!(loaded, owners);
}

#[test]
fn corrupt_document_reports_json_error() {
    let tmp = TempDir::new().expect("tmpdir");
    let store = FsStore::open(tmp.path()).expect("open");
    store.save("ownership-ledger", b"{not json").expect("save raw");

    let err = load_json::<BTreeMap<u32, u64>>(&store, "ownership-ledger").unwrap_err();
    match err {
        StoreError::Json { key, .. } => assert_eq!(key, "ownership-ledger"),
        other => panic!("unexpected error: {other}"),
    }
}
