//! A transaction: a private arena of nodes copy-on-written from whatever is
//! reachable from the database's current root, plus the bookkeeping needed
//! to commit that arena back as a new trailing region of the file.

use std::collections::HashMap;

use log::{debug, trace, warn};

use crate::codec::{self, Footer, TransactionHeader, FOOTER_SIZE, HEADER_SIZE};
use crate::database::Database;
use crate::error::{Error, Result};
use crate::node::{Arena, NodeId};
use crate::params::{AllocMode, TransactionParams};

/// A single read/write transaction.
///
/// Mutations (`put`/`del`) only ever touch this transaction's private arena;
/// nothing is visible to other transactions, or persisted, until `commit`
/// succeeds. `rollback` (or dropping the transaction without committing)
/// discards the arena entirely.
pub struct Transaction<'db> {
    pub(crate) db: Option<&'db Database>,
    pub(crate) arena: Arena,
    pub(crate) root: Option<NodeId>,
    pub(crate) started: bool,

    /// Footer as it stood when `begin` ran, with `transaction_id` already
    /// advanced by one — this is the footer `commit` will try to write.
    pub(crate) working_footer: Footer,
    pub(crate) snapshot_filesize: u64,

    /// Offset each node now resident in the arena was loaded from, recorded
    /// at load time since decoding clears a node's own `disk_off`. Consulted
    /// by vacuum to tell whether a lookup's path touched the region being
    /// reclaimed.
    pub(crate) loaded_from: HashMap<NodeId, u64>,
}

impl<'db> Transaction<'db> {
    pub(crate) fn new(db: &'db Database, params: TransactionParams) -> Self {
        let arena = match params.alloc_mode {
            AllocMode::Dynamic => Arena::dynamic(params.limit),
            AllocMode::Bump => Arena::bump(params.limit),
        };
        Transaction {
            db: Some(db),
            arena,
            root: None,
            started: false,
            working_footer: Footer::default(),
            snapshot_filesize: 0,
            loaded_from: HashMap::new(),
        }
    }

    /// A transaction with no backing database: useful for building a tree in
    /// memory and never persisting it, or as the scratch destination of a
    /// one-off computation.
    pub fn standalone(params: TransactionParams) -> Transaction<'static> {
        let arena = match params.alloc_mode {
            AllocMode::Dynamic => Arena::dynamic(params.limit),
            AllocMode::Bump => Arena::bump(params.limit),
        };
        Transaction {
            db: None,
            arena,
            root: None,
            started: false,
            working_footer: Footer::default(),
            snapshot_filesize: 0,
            loaded_from: HashMap::new(),
        }
    }

    /// Begin the transaction: snapshot the database's current footer so
    /// later commit can detect whether anyone else committed meanwhile.
    /// Idempotent — calling `begin` twice on an already-started transaction
    /// is a no-op.
    pub fn begin(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }
        match self.db {
            None => {}
            Some(db) => {
                let (footer, filesize) = codec::read_footer(db.io.as_ref())?;
                self.snapshot_filesize = filesize;
                self.working_footer = if filesize == 0 {
                    Footer::default()
                } else {
                    let mut f = footer;
                    f.transaction_id += 1;
                    f
                };
            }
        }
        self.started = true;
        Ok(())
    }

    /// Discard every change made in this transaction.
    pub fn rollback(&mut self) {
        self.reset();
    }

    fn reset(&mut self) {
        self.arena.reset();
        self.root = None;
        self.started = false;
        self.loaded_from.clear();
    }

    /// Commit this transaction, writing a new trailing (or gap-filling)
    /// region plus a fresh footer. On any error — including
    /// [`Error::Modified`] — the arena is left exactly as it was, so the
    /// caller may retry or roll back explicitly.
    pub fn commit(&mut self) -> Result<()> {
        self.commit_inner(None)
    }

    /// As `commit`, but also overwrites the new footer's `gap_end` — used by
    /// vacuum to extend the reclaimed region after migrating still-live keys
    /// out of it.
    pub(crate) fn commit_with_gap_end(&mut self, new_gap_end: u64) -> Result<()> {
        self.commit_inner(Some(new_gap_end))
    }

    fn commit_inner(&mut self, new_gap_end: Option<u64>) -> Result<()> {
        if !self.started {
            return Err(Error::NotStarted);
        }
        let db = match self.db {
            None => {
                self.reset();
                return Ok(());
            }
            Some(db) => db,
        };
        let root = match self.root {
            Some(r) => r,
            // A transaction that touched nothing normally has no reason to
            // commit. The one exception is vacuum's destination transaction
            // when every candidate key turned out to already be overwritten
            // elsewhere: it still needs to write a (trivial) transaction so
            // the new `gap_end` it's extending the reclaimed region to is
            // actually recorded in a footer.
            None if new_gap_end.is_some() => self.arena.new_branch(&[])?,
            None => {
                self.reset();
                return Ok(());
            }
        };

        let (current_footer, current_filesize) = codec::read_footer(db.io.as_ref())?;
        if current_filesize != self.snapshot_filesize {
            warn!(
                "commit: filesize changed since begin ({} -> {}), another writer got there first",
                self.snapshot_filesize, current_filesize
            );
            return Err(Error::Modified);
        }

        let mut footer = self.working_footer;

        let (transaction_off, append) = if current_filesize > 0 {
            if current_footer.transaction_id + 1 != footer.transaction_id {
                warn!(
                    "commit: transaction_id advanced past what begin observed ({} -> {}), concurrent writer",
                    footer.transaction_id - 1,
                    current_footer.transaction_id
                );
                return Err(Error::Modified);
            }
            let estimate = self.estimate_size(root);
            if current_footer.gap_end > current_footer.gap_begin
                && current_footer.gap_end - current_footer.gap_begin >= estimate
            {
                (current_footer.gap_begin, false)
            } else {
                (current_filesize, true)
            }
        } else {
            (0u64, true)
        };

        let (transaction_size, payload) = self.commit_dfs(root, transaction_off);

        let total_written = HEADER_SIZE as usize + payload.len() + FOOTER_SIZE as usize;
        if total_written > db.params.write_buf_limit {
            warn!(
                "commit: transaction of {} bytes exceeds write_buf_limit of {} bytes",
                total_written, db.params.write_buf_limit
            );
            return Err(Error::OutOfMemory);
        }

        footer.root_off = transaction_off + HEADER_SIZE;
        footer.transaction_size = transaction_size;
        footer.gap_begin = current_footer.gap_begin;
        footer.gap_end = new_gap_end.unwrap_or(current_footer.gap_end);

        let new_filesize = if append {
            trace!(
                "commit: appending transaction {} at offset {} ({} bytes)",
                footer.transaction_id, transaction_off, transaction_size
            );
            let footer_off = transaction_off + transaction_size;
            let header = TransactionHeader { footer_off };
            let mut buf = Vec::with_capacity(total_written);
            buf.extend_from_slice(&header.encode());
            buf.extend_from_slice(&payload);
            buf.extend_from_slice(&footer.encode());
            db.io.write_at(transaction_off, &buf)?;
            footer_off + FOOTER_SIZE
        } else {
            debug!(
                "commit: transaction {} fits the reclaimed gap, writing in place at offset {}",
                footer.transaction_id, transaction_off
            );
            let header = TransactionHeader { footer_off: current_filesize };
            let mut buf = Vec::with_capacity(HEADER_SIZE as usize + payload.len());
            buf.extend_from_slice(&header.encode());
            buf.extend_from_slice(&payload);
            db.io.write_at(transaction_off, &buf)?;
            footer.gap_begin = current_footer.gap_begin + transaction_size;
            db.io.write_at(current_filesize, &footer.encode())?;
            current_filesize + FOOTER_SIZE
        };
        let _ = new_filesize;

        self.reset();
        Ok(())
    }

    /// Total encoded size (header + every reachable in-memory node) a commit
    /// from `root` would produce, without mutating anything. Used only to
    /// decide whether the reclaimed gap is large enough to write in place.
    fn estimate_size(&self, root: NodeId) -> u64 {
        let mut total = HEADER_SIZE;
        let mut stack = vec![self.arena.resolve(root)];
        while let Some(id) = stack.pop() {
            let id = self.arena.resolve(id);
            let node = self.arena.get(id);
            total += codec::node_disk_size(node);
            for edge in 0..256usize {
                if let Some(child) = node.mem_next[edge] {
                    stack.push(child);
                }
            }
        }
        total
    }

    /// Walk every node reachable (in memory) from `root` in pre-order,
    /// assigning each a disk offset in `transaction_off`'s region and
    /// encoding it. A node whose `disk_size` is still zero has never been
    /// placed this commit (whether brand new or merely touched while
    /// loaded), so it gets a fresh offset; anything else is an unvisited
    /// disk-only child and is left untouched.
    fn commit_dfs(&mut self, root: NodeId, transaction_off: u64) -> (u64, Vec<u8>) {
        let mut buf = Vec::new();
        let mut stack: Vec<(NodeId, usize)> = Vec::new();
        let mut node = self.arena.resolve(root);
        let mut off = 0usize;
        let mut node_off = transaction_off + HEADER_SIZE;
        let mut last_node_size = 0u64;

        loop {
            node = self.arena.resolve(node);
            // Always recompute the encoded size from the node's current
            // shape: a loaded node can have its child table mutated in
            // place (a leaf attached at a previously-absent edge, or a
            // child detached) without going through `replaced_by`, which
            // changes its encoded length even though its cached `disk_size`
            // is stale.
            let size = codec::node_disk_size(self.arena.get(node));
            let n = self.arena.get_mut(node);
            n.disk_size = size;
            n.disk_off = node_off;
            last_node_size = size;

            let mut next: Option<NodeId> = None;
            while off < 256 {
                if let Some(c) = self.arena.get(node).mem_next[off] {
                    next = Some(c);
                    break;
                }
                off += 1;
            }

            if let Some(next_id) = next {
                let next_resolved = self.arena.resolve(next_id);
                node_off += last_node_size;
                self.arena.get_mut(node).disk_next[off] = node_off;
                stack.push((node, off));
                node = next_resolved;
                off = 0;
            } else {
                codec::encode_node(self.arena.get(node), &mut buf);
                match stack.pop() {
                    None => break,
                    Some((parent, parent_off)) => {
                        node = parent;
                        off = parent_off + 1;
                    }
                }
            }
        }

        node_off += last_node_size;
        let transaction_size = node_off - transaction_off;
        (transaction_size, buf)
    }
}
