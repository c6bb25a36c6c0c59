//! Ordered traversal over a transaction's trie.
//!
//! A cursor keeps a stack of `(node, edge-being-explored)` frames plus the
//! accumulated key prefix for the current position. The stack is a plain
//! `Vec` that grows as deep as the trie actually is, rather than a fixed-size
//! array with a hard depth cap.

use crate::error::{Error, Result};
use crate::node::NodeId;
use crate::transaction::Transaction;

/// How [`Cursor::seek`] should behave when the exact key is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    /// The key must be present exactly.
    Eq,
    /// Position at the greatest key ≤ the target.
    Le,
    /// Position at the smallest key ≥ the target.
    Ge,
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    node: NodeId,
    /// Edge byte currently being explored at this node: `-1` means "the
    /// node's own value", `0..=255` an edge already descended through, and
    /// anything outside that range means every edge has been tried.
    next_edge: i32,
    /// Length `prefix` had before this frame appended its own contribution
    /// (the node's prefix, plus the edge byte that led into it, if any).
    base_len: usize,
}

/// A read-only, ordered view over a [`Transaction`]'s trie.
///
/// Lazily loads on-disk children as it walks past them, attaching them into
/// the transaction's live arena — so a cursor can allocate, even though it
/// never changes trie topology itself.
pub struct Cursor<'tx, 'db> {
    tx: &'tx mut Transaction<'db>,
    stack: Vec<Frame>,
    prefix: Vec<u8>,
    current_value: Option<Vec<u8>>,
}

impl<'tx, 'db> Cursor<'tx, 'db> {
    pub(crate) fn new(tx: &'tx mut Transaction<'db>) -> Self {
        Cursor { tx, stack: Vec::new(), prefix: Vec::new(), current_value: None }
    }

    /// The key at the cursor's current position.
    pub fn key(&self) -> &[u8] {
        &self.prefix
    }

    /// The value at the cursor's current position.
    pub fn value(&self) -> &[u8] {
        self.current_value.as_deref().unwrap_or(&[])
    }

    /// Position at the smallest key in the trie.
    pub fn first(&mut self) -> Result<()> {
        self.reset();
        let root = self.load_root()?;
        self.descend_smallest(root)
    }

    /// Position at the greatest key in the trie.
    pub fn last(&mut self) -> Result<()> {
        self.reset();
        let root = self.load_root()?;
        self.descend_biggest(root)
    }

    /// Advance to the next key in ascending order. `Err(NotFound)` if
    /// already at (or past) the greatest key.
    pub fn next(&mut self) -> Result<()> {
        loop {
            if self.stack.is_empty() {
                return Err(Error::NotFound);
            }
            let frame = *self.stack.last().unwrap();
            let start = frame.next_edge + 1;

            if start <= 255 {
                if let Some((edge, child)) = self.first_child(frame.node, start)? {
                    let own_len = self.tx.node_prefix_len(frame.node);
                    self.stack.last_mut().unwrap().next_edge = edge as i32;
                    self.prefix.truncate(frame.base_len + own_len);
                    self.prefix.push(edge);
                    return self.descend_smallest(child);
                }
            }

            if self.stack.len() == 1 {
                self.stack.last_mut().unwrap().next_edge = 256;
                return Err(Error::NotFound);
            }
            self.pop_frame();
        }
    }

    /// Retreat to the previous key in ascending order. `Err(NotFound)` if
    /// already at (or before) the smallest key.
    pub fn prev(&mut self) -> Result<()> {
        loop {
            if self.stack.is_empty() {
                return Err(Error::NotFound);
            }
            let frame = *self.stack.last().unwrap();
            let new_off = frame.next_edge - 1;

            if new_off == -1 && self.tx.node_has_value(frame.node) {
                let own_len = self.tx.node_prefix_len(frame.node);
                self.stack.last_mut().unwrap().next_edge = -1;
                self.prefix.truncate(frame.base_len + own_len);
                self.current_value = Some(self.tx.node_value(frame.node).to_vec());
                return Ok(());
            }

            if new_off >= 0 {
                if let Some((edge, child)) = self.last_child(frame.node, new_off)? {
                    let own_len = self.tx.node_prefix_len(frame.node);
                    self.stack.last_mut().unwrap().next_edge = edge as i32;
                    self.prefix.truncate(frame.base_len + own_len);
                    self.prefix.push(edge);
                    return self.descend_biggest(child);
                }
            }

            if self.stack.len() == 1 {
                self.stack.last_mut().unwrap().next_edge = -2;
                return Err(Error::NotFound);
            }
            self.pop_frame();
        }
    }

    /// Position at `key` exactly (`Eq`), or at the nearest key on the
    /// requested side (`Le`/`Ge`).
    pub fn seek(&mut self, key: &[u8], mode: SeekMode) -> Result<()> {
        self.reset();
        let root = self.load_root()?;
        let mut node = self.tx.resolve(root);
        let mut ki = 0usize;

        loop {
            node = self.tx.resolve(node);
            let prefix = self.tx.node_prefix(node);
            let mut pi = 0usize;

            loop {
                if ki >= key.len() {
                    if pi == prefix.len() && self.tx.node_has_value(node) {
                        self.push_value_frame(node, &prefix);
                        return Ok(());
                    }
                    if mode == SeekMode::Eq {
                        self.reset();
                        return Err(Error::NotFound);
                    }
                    // The target ends strictly inside (or exactly at, with
                    // no value on) this node: everything reachable from
                    // here extends the target, so it's all > target.
                    return if mode == SeekMode::Le {
                        self.descend_smallest(node)?;
                        self.prev()
                    } else {
                        self.descend_smallest(node)
                    };
                }

                if pi >= prefix.len() {
                    break;
                }

                if prefix[pi] != key[ki] {
                    if mode == SeekMode::Eq {
                        self.reset();
                        return Err(Error::NotFound);
                    }
                    // Divergence inside `node`'s own prefix settles the
                    // ordering of `node`'s *entire* subtree against the
                    // target in one byte comparison.
                    return match mode {
                        SeekMode::Le if prefix[pi] < key[ki] => self.descend_biggest(node),
                        SeekMode::Le => self.prev(),
                        SeekMode::Ge if prefix[pi] > key[ki] => self.descend_smallest(node),
                        SeekMode::Ge => self.next(),
                        SeekMode::Eq => unreachable!(),
                    };
                }

                ki += 1;
                pi += 1;
            }

            let edge = key[ki];
            match self.tx.child(node, edge)? {
                Some(child) => {
                    self.push_descend_frame(node, &prefix, edge);
                    node = child;
                    ki += 1;
                }
                None => {
                    if mode == SeekMode::Eq {
                        self.reset();
                        return Err(Error::NotFound);
                    }
                    return match mode {
                        SeekMode::Le => {
                            if let Some((e, c)) = self.last_child(node, edge as i32 - 1)? {
                                self.push_descend_frame(node, &prefix, e);
                                self.descend_biggest(c)
                            } else if self.tx.node_has_value(node) {
                                self.push_value_frame(node, &prefix);
                                Ok(())
                            } else {
                                self.prev()
                            }
                        }
                        SeekMode::Ge => {
                            if let Some((e, c)) = self.first_child(node, edge as i32 + 1)? {
                                self.push_descend_frame(node, &prefix, e);
                                self.descend_smallest(c)
                            } else {
                                self.next()
                            }
                        }
                        SeekMode::Eq => unreachable!(),
                    };
                }
            }
        }
    }

    fn load_root(&mut self) -> Result<NodeId> {
        self.tx.ensure_root()?.ok_or(Error::Empty)
    }

    fn reset(&mut self) {
        self.stack.clear();
        self.prefix.clear();
        self.current_value = None;
    }

    fn pop_frame(&mut self) {
        let frame = self.stack.pop().expect("pop_frame called on empty stack");
        self.prefix.truncate(frame.base_len);
    }

    fn push_value_frame(&mut self, node: NodeId, prefix: &[u8]) {
        let base = self.prefix.len();
        self.prefix.extend_from_slice(prefix);
        self.stack.push(Frame { node, next_edge: -1, base_len: base });
        self.current_value = Some(self.tx.node_value(node).to_vec());
    }

    fn push_descend_frame(&mut self, node: NodeId, prefix: &[u8], edge: u8) {
        let base = self.prefix.len();
        self.prefix.extend_from_slice(prefix);
        self.prefix.push(edge);
        self.stack.push(Frame { node, next_edge: edge as i32, base_len: base });
    }

    /// Descend leftmost from `node` until a node carrying a value is
    /// reached, accumulating prefixes and lazily loading on-disk children.
    fn descend_smallest(&mut self, mut node: NodeId) -> Result<()> {
        loop {
            node = self.tx.resolve(node);
            let prefix = self.tx.node_prefix(node);
            if self.tx.node_has_value(node) {
                self.push_value_frame(node, &prefix);
                return Ok(());
            }
            match self.first_child(node, 0)? {
                Some((edge, child)) => {
                    self.push_descend_frame(node, &prefix, edge);
                    node = child;
                }
                None => {
                    return Err(Error::Corrupted("valueless node with no children"));
                }
            }
        }
    }

    /// Descend rightmost from `node` until a node carrying a value with no
    /// further (rightward) children is reached.
    fn descend_biggest(&mut self, mut node: NodeId) -> Result<()> {
        loop {
            node = self.tx.resolve(node);
            let prefix = self.tx.node_prefix(node);
            match self.last_child(node, 255)? {
                Some((edge, child)) => {
                    self.push_descend_frame(node, &prefix, edge);
                    node = child;
                }
                None => {
                    if self.tx.node_has_value(node) {
                        self.push_value_frame(node, &prefix);
                        return Ok(());
                    }
                    return Err(Error::Corrupted("valueless node with no children"));
                }
            }
        }
    }

    /// Smallest present child edge `>= from`, loading it on the way.
    fn first_child(&mut self, node: NodeId, from: i32) -> Result<Option<(u8, NodeId)>> {
        let start = from.max(0) as usize;
        for edge in start..=255usize {
            if self.tx.child_present(node, edge as u8) {
                let child = self.tx.child(node, edge as u8)?.expect("just checked present");
                return Ok(Some((edge as u8, child)));
            }
        }
        Ok(None)
    }

    /// Largest present child edge `<= from`, loading it on the way.
    fn last_child(&mut self, node: NodeId, from: i32) -> Result<Option<(u8, NodeId)>> {
        if from < 0 {
            return Ok(None);
        }
        let start = (from as usize).min(255);
        for edge in (0..=start).rev() {
            if self.tx.child_present(node, edge as u8) {
                let child = self.tx.child(node, edge as u8)?.expect("just checked present");
                return Ok(Some((edge as u8, child)));
            }
        }
        Ok(None)
    }
}

impl<'db> Transaction<'db> {
    /// Open a cursor over this transaction's current view of the trie.
    pub fn cursor(&mut self) -> Cursor<'_, 'db> {
        Cursor::new(self)
    }
}
