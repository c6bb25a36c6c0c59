//! Property tests: whatever keys are inserted, a cursor must walk them back
//! out in strict lexicographic order, and `seek` must agree with a naive
//! linear scan over the same key set.

use std::collections::BTreeMap;

use quickcheck::{QuickCheck, TestResult};
use radix_store::{Database, DatabaseParams, SeekMode, TransactionParams};

fn build(keys: &[Vec<u8>]) -> BTreeMap<Vec<u8>, Vec<u8>> {
    let mut model = BTreeMap::new();
    for (i, k) in keys.iter().enumerate() {
        if k.is_empty() {
            continue;
        }
        model.insert(k.clone(), vec![i as u8]);
    }
    model
}

fn cursor_forward_keys(keys: Vec<Vec<u8>>) -> TestResult {
    let model = build(&keys);
    if model.is_empty() {
        return TestResult::discard();
    }

    let db = Database::open_in_memory(DatabaseParams::default()).unwrap();
    let mut tr = db.transaction(TransactionParams::default());
    tr.begin().unwrap();
    for (k, v) in &model {
        tr.put(k, v).unwrap();
    }

    let mut seen = Vec::new();
    let mut cursor = tr.cursor();
    cursor.first().unwrap();
    loop {
        seen.push(cursor.key().to_vec());
        if cursor.next().is_err() {
            break;
        }
    }

    let expected: Vec<Vec<u8>> = model.keys().cloned().collect();
    TestResult::from_bool(seen == expected)
}

fn seek_ge_matches_btreemap_range(keys: Vec<Vec<u8>>, target: Vec<u8>) -> TestResult {
    let model = build(&keys);
    if model.is_empty() {
        return TestResult::discard();
    }

    let db = Database::open_in_memory(DatabaseParams::default()).unwrap();
    let mut tr = db.transaction(TransactionParams::default());
    tr.begin().unwrap();
    for (k, v) in &model {
        tr.put(k, v).unwrap();
    }

    let expected = model.range(target.clone()..).next().map(|(k, _)| k.clone());

    let mut cursor = tr.cursor();
    let actual = match cursor.seek(&target, SeekMode::Ge) {
        Ok(()) => Some(cursor.key().to_vec()),
        Err(_) => None,
    };

    TestResult::from_bool(actual == expected)
}

fn seek_le_matches_btreemap_range(keys: Vec<Vec<u8>>, target: Vec<u8>) -> TestResult {
    let model = build(&keys);
    if model.is_empty() {
        return TestResult::discard();
    }

    let db = Database::open_in_memory(DatabaseParams::default()).unwrap();
    let mut tr = db.transaction(TransactionParams::default());
    tr.begin().unwrap();
    for (k, v) in &model {
        tr.put(k, v).unwrap();
    }

    let expected = model
        .range(..=target.clone())
        .next_back()
        .map(|(k, _)| k.clone());

    let mut cursor = tr.cursor();
    let actual = match cursor.seek(&target, SeekMode::Le) {
        Ok(()) => Some(cursor.key().to_vec()),
        Err(_) => None,
    };

    TestResult::from_bool(actual == expected)
}

#[test]
fn prop_cursor_forward_keys_are_lexicographically_sorted() {
    QuickCheck::new()
        .tests(200)
        .quickcheck(cursor_forward_keys as fn(Vec<Vec<u8>>) -> TestResult);
}

#[test]
fn prop_seek_ge_matches_btreemap_range() {
    QuickCheck::new()
        .tests(200)
        .quickcheck(seek_ge_matches_btreemap_range as fn(Vec<Vec<u8>>, Vec<u8>) -> TestResult);
}

#[test]
fn prop_seek_le_matches_btreemap_range() {
    QuickCheck::new()
        .tests(200)
        .quickcheck(seek_le_matches_btreemap_range as fn(Vec<Vec<u8>>, Vec<u8>) -> TestResult);
}
