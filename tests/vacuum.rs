//! Vacuum exercised end-to-end through the public API, including a
//! reopen-from-disk round trip after reclaiming space.

use radix_store::{vacuum, Database, DatabaseParams, TransactionParams};

#[test]
fn vacuum_reclaims_space_and_keys_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.rdx");

    {
        let db = Database::open(&path, DatabaseParams::default()).unwrap();
        let mut tr = db.transaction(TransactionParams::default());
        tr.begin().unwrap();
        tr.put(b"a", b"1").unwrap();
        tr.put(b"b", b"2").unwrap();
        tr.put(b"c", b"3").unwrap();
        tr.commit().unwrap();
    }
    {
        // Overwrite two of the three keys, leaving the first transaction's
        // region with exactly one still-live key ("a").
        let db = Database::open(&path, DatabaseParams::default()).unwrap();
        let mut tr = db.transaction(TransactionParams::default());
        tr.begin().unwrap();
        tr.put(b"b", b"22").unwrap();
        tr.put(b"c", b"33").unwrap();
        tr.commit().unwrap();
    }

    let db = Database::open(&path, DatabaseParams::default()).unwrap();
    let before = db.info().unwrap();

    let mut current = db.transaction(TransactionParams::default());
    current.begin().unwrap();
    let mut vacuumed = db.transaction(TransactionParams::default());
    vacuumed.begin().unwrap();
    let mut dest = db.transaction(TransactionParams::default());
    dest.begin().unwrap();
    vacuum(&mut current, &mut vacuumed, &mut dest).unwrap();

    let after = db.info().unwrap();
    assert!(after.gap_end > before.gap_end);

    drop(db);

    // Reopen from disk: all three keys still read back correctly, one of
    // them now served out of the vacuum's destination transaction.
    let db = Database::open(&path, DatabaseParams::default()).unwrap();
    let mut tr = db.transaction(TransactionParams::default());
    tr.begin().unwrap();
    assert_eq!(tr.get(b"a").unwrap(), b"1");
    assert_eq!(tr.get(b"b").unwrap(), b"22");
    assert_eq!(tr.get(b"c").unwrap(), b"33");
}
