//! Migrating live keys out of one historical transaction region so the gap
//! it occupied can be reclaimed.
//!
//! `vacuum` loads the transaction immediately following the current gap
//! (`vacuumed`), walks every node physically stored inside it, and for each
//! key whose lookup path from the *current* root actually touches that
//! region, re-`put`s it into a fresh destination transaction (`dest`).
//! Committing `dest` then extends the gap to swallow the vacuumed region
//! whole, including writing the footer's updated `gap_end`.

use log::{debug, trace};

use crate::codec::{FOOTER_SIZE, HEADER_SIZE};
use crate::error::{Error, Result};
use crate::io::RandomAccess;
use crate::node::NodeId;
use crate::transaction::Transaction;

/// Migrate every still-live key stored inside `vacuumed`'s on-disk region
/// into `dest`, then commit `dest` and extend the database's gap to cover
/// that region.
///
/// All three transactions must already be `begin`-ed. `current` is left
/// untouched (only read from); `vacuumed` is used purely as a scratch handle
/// to decode the historical region and is left exhausted afterwards; `dest`
/// is committed by this call.
pub fn vacuum(
    current: &mut Transaction,
    vacuumed: &mut Transaction,
    dest: &mut Transaction,
) -> Result<()> {
    current.require_started()?;
    vacuumed.require_started()?;
    dest.require_started()?;

    let db = current
        .db_handle()
        .ok_or(Error::Corrupted("vacuum requires a transaction backed by a database"))?;

    let info = db.info()?;
    let filesize = db.io.size()?;
    let lo = info.gap_end;
    if lo >= filesize {
        debug!("vacuum: gap_end at or past end of file, nothing to vacuum");
        return Ok(());
    }

    let mut header = [0u8; HEADER_SIZE as usize];
    db.io.read_at(lo, &mut header)?;
    if header[0] != crate::codec::BLOCKTYPE_TRANSACTION {
        return Err(Error::Corrupted("no transaction header at gap_end"));
    }
    let hi = u64::from_le_bytes(header[1..9].try_into().unwrap());
    if hi <= lo {
        return Err(Error::Corrupted("vacuumed transaction has non-positive size"));
    }
    if hi + FOOTER_SIZE >= filesize {
        debug!("vacuum: transaction at gap_end is the current head, nothing historical to reclaim");
        return Ok(());
    }

    trace!("vacuum: scanning transaction region [{}, {})", lo, hi);

    vacuumed.set_root_from_offset(lo + HEADER_SIZE)?;
    let root = vacuumed.root_id().expect("just set");

    let mut keys = Vec::new();
    let mut prefix = Vec::new();
    collect_keys(vacuumed, root, lo, hi, &mut prefix, &mut keys)?;

    let mut migrated = 0usize;
    for key in &keys {
        if let Some(value) = current.get_if_path_in_range(key, lo, hi)? {
            dest.put(key, &value)?;
            migrated += 1;
        }
    }

    debug!(
        "vacuum: {} of {} candidate keys still live, migrating and extending gap to {}",
        migrated,
        keys.len(),
        hi
    );

    dest.commit_with_gap_end(hi)
}

/// Depth-first walk of `vacuumed`'s trie, descending only into children
/// whose recorded disk offset falls inside `[lo, hi)` — children outside
/// that range belong to an earlier, still-valid transaction and are left
/// alone.
fn collect_keys(
    vacuumed: &mut Transaction,
    node: NodeId,
    lo: u64,
    hi: u64,
    prefix: &mut Vec<u8>,
    keys: &mut Vec<Vec<u8>>,
) -> Result<()> {
    let node = vacuumed.resolve(node);
    let own_prefix = vacuumed.node_prefix(node);
    let base = prefix.len();
    prefix.extend_from_slice(&own_prefix);

    if vacuumed.node_has_value(node) {
        keys.push(prefix.clone());
    }

    for edge in 0u16..256 {
        let edge = edge as u8;
        if let Some(child) = vacuumed.child_in_range(node, edge, lo, hi)? {
            prefix.push(edge);
            collect_keys(vacuumed, child, lo, hi, prefix, keys)?;
            prefix.pop();
        }
    }

    prefix.truncate(base);
    Ok(())
}
