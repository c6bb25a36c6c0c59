//! Black-box persistence tests: everything here only uses the public API,
//! mirroring how a host embedding this crate would exercise it across
//! process restarts.

use radix_store::{Database, DatabaseParams, Error, TransactionParams};

fn put_many(tr: &mut radix_store::Transaction, pairs: &[(&str, &str)]) {
    for (k, v) in pairs {
        tr.put(k.as_bytes(), v.as_bytes()).unwrap();
    }
}

#[test]
fn commit_survives_reopen_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.rdx");

    {
        let db = Database::open(&path, DatabaseParams::default()).unwrap();
        let mut tr = db.transaction(TransactionParams::default());
        tr.begin().unwrap();
        put_many(&mut tr, &[("a", "1"), ("ab", "2"), ("b", "3")]);
        tr.commit().unwrap();
    }

    let db = Database::open(&path, DatabaseParams::default()).unwrap();
    let mut tr = db.transaction(TransactionParams::default());
    tr.begin().unwrap();
    assert_eq!(tr.get(b"a").unwrap(), b"1");
    assert_eq!(tr.get(b"ab").unwrap(), b"2");
    assert_eq!(tr.get(b"b").unwrap(), b"3");
}

#[test]
fn multiple_commits_accumulate_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.rdx");

    for i in 0..10 {
        let db = Database::open(&path, DatabaseParams::default()).unwrap();
        let mut tr = db.transaction(TransactionParams::default());
        tr.begin().unwrap();
        let key = format!("key{}", i);
        tr.put(key.as_bytes(), b"value").unwrap();
        tr.commit().unwrap();
    }

    let db = Database::open(&path, DatabaseParams::default()).unwrap();
    for i in 0..10 {
        let mut tr = db.transaction(TransactionParams::default());
        tr.begin().unwrap();
        let key = format!("key{}", i);
        assert_eq!(tr.get(key.as_bytes()).unwrap(), b"value");
    }
}

#[test]
fn concurrent_commit_attempt_fails_with_modified() {
    let db = Database::open_in_memory(DatabaseParams::default()).unwrap();

    let mut writer_a = db.transaction(TransactionParams::default());
    writer_a.begin().unwrap();
    let mut writer_b = db.transaction(TransactionParams::default());
    writer_b.begin().unwrap();

    writer_a.put(b"x", b"from-a").unwrap();
    writer_a.commit().unwrap();

    writer_b.put(b"y", b"from-b").unwrap();
    let err = writer_b.commit().unwrap_err();
    assert!(matches!(err, Error::Modified));

    // The winning commit's data is the only thing visible afterwards.
    let mut tr = db.transaction(TransactionParams::default());
    tr.begin().unwrap();
    assert_eq!(tr.get(b"x").unwrap(), b"from-a");
    assert!(tr.get(b"y").is_err());
}

#[test]
fn delete_and_reinsert_roundtrips_after_commit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.rdx");

    {
        let db = Database::open(&path, DatabaseParams::default()).unwrap();
        let mut tr = db.transaction(TransactionParams::default());
        tr.begin().unwrap();
        tr.put(b"k", b"v1").unwrap();
        tr.commit().unwrap();
    }
    {
        let db = Database::open(&path, DatabaseParams::default()).unwrap();
        let mut tr = db.transaction(TransactionParams::default());
        tr.begin().unwrap();
        tr.del(b"k", false).unwrap();
        tr.put(b"k", b"v2").unwrap();
        tr.commit().unwrap();
    }

    let db = Database::open(&path, DatabaseParams::default()).unwrap();
    let mut tr = db.transaction(TransactionParams::default());
    tr.begin().unwrap();
    assert_eq!(tr.get(b"k").unwrap(), b"v2");
}

#[test]
fn cursor_scan_matches_individual_gets_after_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.rdx");
    let keys = ["apple", "app", "application", "banana", "band"];

    {
        let db = Database::open(&path, DatabaseParams::default()).unwrap();
        let mut tr = db.transaction(TransactionParams::default());
        tr.begin().unwrap();
        for k in &keys {
            tr.put(k.as_bytes(), k.as_bytes()).unwrap();
        }
        tr.commit().unwrap();
    }

    let db = Database::open(&path, DatabaseParams::default()).unwrap();
    let mut tr = db.transaction(TransactionParams::default());
    tr.begin().unwrap();

    let mut expected: Vec<&str> = keys.to_vec();
    expected.sort();

    let mut seen = Vec::new();
    let mut cursor = tr.cursor();
    cursor.first().unwrap();
    loop {
        seen.push(String::from_utf8(cursor.key().to_vec()).unwrap());
        if cursor.next().is_err() {
            break;
        }
    }
    assert_eq!(seen, expected);
}

#[test]
fn bump_arena_transaction_roundtrips() {
    let db = Database::open_in_memory(DatabaseParams::default()).unwrap();
    let mut tr = db.transaction(TransactionParams::bump(1 << 20));
    tr.begin().unwrap();
    tr.put(b"a", b"1").unwrap();
    tr.put(b"b", b"2").unwrap();
    tr.commit().unwrap();

    let mut tr = db.transaction(TransactionParams::default());
    tr.begin().unwrap();
    assert_eq!(tr.get(b"a").unwrap(), b"1");
    assert_eq!(tr.get(b"b").unwrap(), b"2");
}
