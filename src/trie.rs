//! The trie engine itself: `get`/`put`/`del` plus the node-loading helpers
//! shared by the cursor and the vacuum walker.

use crate::codec;
use crate::error::{Error, Result};
use crate::node::{NodeId, HAS_VALUE};
use crate::transaction::Transaction;

impl<'db> Transaction<'db> {
    /// Look up `key`. `Err(Error::Empty)` if the transaction has no root yet
    /// (brand new, on-disk database with no committed data either);
    /// `Err(Error::NotFound)` if the key isn't present.
    pub fn get(&mut self, key: &[u8]) -> Result<Vec<u8>> {
        self.require_started()?;
        let mut node = match self.ensure_root()? {
            Some(r) => r,
            None => return Err(Error::Empty),
        };
        let mut ki = 0usize;

        'descend: loop {
            node = self.arena.resolve(node);
            let mut pi = 0usize;
            loop {
                let prefix_len = self.arena.get(node).prefix.len();
                if ki >= key.len() {
                    let n = self.arena.get(node);
                    return if pi == n.prefix.len() && n.has_value() {
                        Ok(n.value.clone())
                    } else {
                        Err(Error::NotFound)
                    };
                }
                if pi >= prefix_len {
                    break;
                }
                if self.arena.get(node).prefix[pi] != key[ki] {
                    return Err(Error::NotFound);
                }
                ki += 1;
                pi += 1;
            }

            let edge = key[ki];
            match self.child(node, edge)? {
                Some(next) => {
                    node = next;
                    ki += 1;
                    continue 'descend;
                }
                None => return Err(Error::NotFound),
            }
        }
    }

    /// Insert or overwrite `key` with `value`.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.require_started()?;

        if self.root.is_none() {
            match self.ensure_root()? {
                Some(id) => self.root = Some(id),
                None => {
                    let id = self.arena.new_leaf(key, value)?;
                    self.root = Some(id);
                    return Ok(());
                }
            }
        }

        let mut node = self.root.unwrap();
        let mut ki = 0usize;

        'descend: loop {
            node = self.arena.resolve(node);
            let mut pi = 0usize;
            loop {
                let prefix_len = self.arena.get(node).prefix.len();

                if ki >= key.len() {
                    if pi == prefix_len {
                        let overwrite_in_place = {
                            let n = self.arena.get(node);
                            !value.is_empty() && n.value.len() == value.len()
                        };
                        if overwrite_in_place {
                            self.arena.get_mut(node).value.copy_from_slice(value);
                            return Ok(());
                        }
                        let prefix = self.arena.get(node).prefix.clone();
                        let new_id = self.arena.new_like(HAS_VALUE, &prefix, value)?;
                        self.arena.clone_children(new_id, node);
                        self.arena.replace(node, new_id);
                        return Ok(());
                    } else {
                        let (old_prefix, old_value, old_flags) = {
                            let n = self.arena.get(node);
                            (n.prefix.clone(), n.value.clone(), n.flags)
                        };
                        let new_root = self.arena.new_like(HAS_VALUE, &old_prefix[..pi], value)?;
                        let edge_byte = old_prefix[pi];
                        let tail = self.arena.new_like(old_flags, &old_prefix[pi + 1..], &old_value)?;
                        self.arena.clone_children(tail, node);
                        self.arena.get_mut(new_root).mem_next[edge_byte as usize] = Some(tail);
                        self.arena.replace(node, new_root);
                        return Ok(());
                    }
                }

                if pi >= prefix_len {
                    break;
                }

                if self.arena.get(node).prefix[pi] != key[ki] {
                    let (old_prefix, old_value, old_flags) = {
                        let n = self.arena.get(node);
                        (n.prefix.clone(), n.value.clone(), n.flags)
                    };
                    let new_root = self.arena.new_branch(&old_prefix[..pi])?;
                    let old_edge = old_prefix[pi];
                    let tail = self.arena.new_like(old_flags, &old_prefix[pi + 1..], &old_value)?;
                    self.arena.clone_children(tail, node);
                    let new_edge = key[ki];
                    let key_tail = self.arena.new_leaf(&key[ki + 1..], value)?;
                    self.arena.get_mut(new_root).mem_next[old_edge as usize] = Some(tail);
                    self.arena.get_mut(new_root).mem_next[new_edge as usize] = Some(key_tail);
                    self.arena.replace(node, new_root);
                    return Ok(());
                }

                ki += 1;
                pi += 1;
            }

            let edge = key[ki];
            match self.child(node, edge)? {
                Some(next) => {
                    node = next;
                    ki += 1;
                    continue 'descend;
                }
                None => {
                    let leaf = self.arena.new_leaf(&key[ki + 1..], value)?;
                    self.arena.get_mut(node).mem_next[edge as usize] = Some(leaf);
                    return Ok(());
                }
            }
        }
    }

    /// Remove `key`. With `del_prefix`, also detach the entire subtree
    /// rooted at `key` (whether or not `key` itself holds a value).
    pub fn del(&mut self, key: &[u8], del_prefix: bool) -> Result<()> {
        self.require_started()?;
        let mut node = match self.ensure_root()? {
            Some(r) => r,
            None => return Err(Error::Empty),
        };
        let mut prev: Option<(NodeId, u8)> = None;
        let mut ki = 0usize;

        'descend: loop {
            node = self.arena.resolve(node);
            let mut pi = 0usize;
            loop {
                let prefix_len = self.arena.get(node).prefix.len();
                if ki >= key.len() {
                    if pi == prefix_len {
                        return self.do_del(node, prev, del_prefix);
                    }
                    return Err(Error::NotFound);
                }
                if pi >= prefix_len {
                    break;
                }
                if self.arena.get(node).prefix[pi] != key[ki] {
                    return Err(Error::NotFound);
                }
                ki += 1;
                pi += 1;
            }

            let edge = key[ki];
            match self.child(node, edge)? {
                Some(next) => {
                    prev = Some((node, edge));
                    node = next;
                    ki += 1;
                    continue 'descend;
                }
                None => return Err(Error::NotFound),
            }
        }
    }

    fn do_del(&mut self, node: NodeId, prev: Option<(NodeId, u8)>, del_prefix: bool) -> Result<()> {
        let (prev_node, prev_off) = match prev {
            None => {
                // Deleting the root itself: replace it with a fresh, empty
                // node. The root is the one place invariant 3.1 permits zero
                // children and no value.
                let empty = self.arena.new_branch(&[])?;
                self.root = Some(empty);
                return Ok(());
            }
            Some(p) => p,
        };

        if del_prefix {
            self.detach_child(prev_node, prev_off);
            return self.maybe_merge(prev_node);
        }

        if !self.arena.get(node).has_value() {
            return Err(Error::NotFound);
        }

        if self.arena.get(node).nsubnodes() == 0 {
            self.detach_child(prev_node, prev_off);
            return self.maybe_merge(prev_node);
        }

        // Has both a value and children: clear only the value, via a fresh
        // node (the old one may still be visible through an earlier cursor).
        let (prefix, new_flags) = {
            let n = self.arena.get(node);
            (n.prefix.clone(), n.flags & !HAS_VALUE)
        };
        let new_id = self.arena.new_like(new_flags, &prefix, &[])?;
        self.arena.clone_children(new_id, node);
        self.arena.replace(node, new_id);
        Ok(())
    }

    fn detach_child(&mut self, parent: NodeId, edge: u8) {
        let e = edge as usize;
        self.arena.get_mut(parent).mem_next[e] = None;
        self.arena.get_mut(parent).disk_next[e] = 0;
    }

    /// After detaching a child, collapse `parent` into its sole remaining
    /// child if `parent` now holds no value and exactly one child —
    /// restoring invariant 3.1 (an internal node without a value must have
    /// at least two children).
    fn maybe_merge(&mut self, parent: NodeId) -> Result<()> {
        let parent = self.arena.resolve(parent);
        if self.arena.get(parent).has_value() {
            return Ok(());
        }

        let mut only_edge: Option<u8> = None;
        let mut count = 0u8;
        for edge in 0..256usize {
            let present = {
                let n = self.arena.get(parent);
                n.mem_next[edge].is_some() || n.disk_next[edge] != 0
            };
            if present {
                count += 1;
                only_edge = Some(edge as u8);
                if count > 1 {
                    break;
                }
            }
        }
        if count != 1 {
            return Ok(());
        }
        let edge = only_edge.unwrap();
        let child = match self.child(parent, edge)? {
            Some(c) => c,
            None => return Ok(()),
        };

        let parent_prefix = self.arena.get(parent).prefix.clone();
        let (child_prefix, child_value, child_flags) = {
            let c = self.arena.get(child);
            (c.prefix.clone(), c.value.clone(), c.flags)
        };

        let mut merged = parent_prefix;
        merged.push(edge);
        merged.extend_from_slice(&child_prefix);

        let new_id = self.arena.new_like(child_flags, &merged, &child_value)?;
        self.arena.clone_children(new_id, child);
        self.arena.replace(parent, new_id);
        Ok(())
    }

    pub(crate) fn require_started(&self) -> Result<()> {
        if self.started {
            Ok(())
        } else {
            Err(Error::NotStarted)
        }
    }

    /// Return the root node, loading it from the database's last committed
    /// footer if this transaction hasn't touched it yet. `Ok(None)` means
    /// the database is genuinely empty.
    pub(crate) fn ensure_root(&mut self) -> Result<Option<NodeId>> {
        if let Some(id) = self.root {
            return Ok(Some(id));
        }
        if self.db.is_some() && self.snapshot_filesize > 0 {
            let id = self.load_node(self.working_footer.root_off)?;
            self.root = Some(id);
            return Ok(Some(id));
        }
        Ok(None)
    }

    /// Point this transaction's root directly at `off`, bypassing the
    /// database's own footer — used by vacuum to walk a specific historical
    /// transaction's region.
    pub(crate) fn set_root_from_offset(&mut self, off: u64) -> Result<()> {
        let id = self.load_node(off)?;
        self.root = Some(id);
        Ok(())
    }

    pub(crate) fn root_id(&self) -> Option<NodeId> {
        self.root
    }

    pub(crate) fn db_handle(&self) -> Option<&'db crate::database::Database> {
        self.db
    }

    pub(crate) fn resolve(&self, id: NodeId) -> NodeId {
        self.arena.resolve(id)
    }

    pub(crate) fn node_prefix(&self, id: NodeId) -> Vec<u8> {
        self.arena.get(id).prefix.clone()
    }

    pub(crate) fn node_prefix_len(&self, id: NodeId) -> usize {
        self.arena.get(id).prefix.len()
    }

    pub(crate) fn node_has_value(&self, id: NodeId) -> bool {
        self.arena.get(id).has_value()
    }

    pub(crate) fn node_value(&self, id: NodeId) -> &[u8] {
        &self.arena.get(id).value
    }

    fn load_node(&mut self, off: u64) -> Result<NodeId> {
        let db = self.db.ok_or(Error::Corrupted("no backing database for this transaction"))?;
        let node = codec::decode_node(db.io.as_ref(), off)?;
        let id = self.arena.insert(node)?;
        self.loaded_from.insert(id, off);
        Ok(id)
    }

    /// Resolve `node`'s child at `edge`, loading it from disk (and caching
    /// the load) if it isn't resident in memory yet.
    pub(crate) fn child(&mut self, node: NodeId, edge: u8) -> Result<Option<NodeId>> {
        let e = edge as usize;
        if let Some(id) = self.arena.get(node).mem_next[e] {
            return Ok(Some(self.arena.resolve(id)));
        }
        let disk_off = self.arena.get(node).disk_next[e];
        if disk_off == 0 || self.db.is_none() {
            return Ok(None);
        }
        let id = self.load_node(disk_off)?;
        self.arena.get_mut(node).mem_next[e] = Some(id);
        Ok(Some(id))
    }

    /// As [`Transaction::child`], but only follows an edge whose recorded
    /// disk offset falls in `[lo, hi)` — used by vacuum to walk a single
    /// historical transaction's nodes without wandering into the rest of the
    /// file.
    pub(crate) fn child_in_range(&mut self, node: NodeId, edge: u8, lo: u64, hi: u64) -> Result<Option<NodeId>> {
        let e = edge as usize;
        let disk_off = self.arena.get(node).disk_next[e];
        if disk_off < lo || disk_off >= hi {
            return Ok(None);
        }
        self.child(node, edge)
    }

    /// Look up `key` from this transaction's (typically the live, current)
    /// root, but only return a value if at least one node on the lookup
    /// path was loaded from an offset inside `[lo, hi)`. Used by vacuum to
    /// tell which still-live keys actually depend on the region about to be
    /// reclaimed.
    pub(crate) fn get_if_path_in_range(&mut self, key: &[u8], lo: u64, hi: u64) -> Result<Option<Vec<u8>>> {
        let root = match self.ensure_root()? {
            Some(r) => r,
            None => return Ok(None),
        };
        let mut node = self.arena.resolve(root);
        let mut in_range = self.offset_in_range(node, lo, hi);
        let mut ki = 0usize;

        'descend: loop {
            node = self.arena.resolve(node);
            if self.offset_in_range(node, lo, hi) {
                in_range = true;
            }
            let mut pi = 0usize;
            loop {
                let prefix_len = self.arena.get(node).prefix.len();
                if ki >= key.len() {
                    let n = self.arena.get(node);
                    return if pi == n.prefix.len() && n.has_value() && in_range {
                        Ok(Some(n.value.clone()))
                    } else {
                        Ok(None)
                    };
                }
                if pi >= prefix_len {
                    break;
                }
                if self.arena.get(node).prefix[pi] != key[ki] {
                    return Ok(None);
                }
                ki += 1;
                pi += 1;
            }

            let edge = key[ki];
            match self.child(node, edge)? {
                Some(next) => {
                    node = next;
                    ki += 1;
                    continue 'descend;
                }
                None => return Ok(None),
            }
        }
    }

    /// Whether `node` has a present child at `edge`, without loading it from
    /// disk. Used by the cursor to scan for the next/previous occupied edge
    /// before paying for a load.
    pub(crate) fn child_present(&self, node: NodeId, edge: u8) -> bool {
        let e = edge as usize;
        let n = self.arena.get(node);
        n.mem_next[e].is_some() || n.disk_next[e] != 0
    }

    fn offset_in_range(&self, node: NodeId, lo: u64, hi: u64) -> bool {
        match self.loaded_from.get(&node) {
            Some(off) => *off >= lo && *off < hi,
            None => false,
        }
    }
}
