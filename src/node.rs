//! In-memory trie node representation and the transaction arena.
//!
//! A node carries a prefix, an optional value, an optional (reserved)
//! metadata blob, and two parallel 256-wide child tables — one for children
//! already resident in memory, one for children known only by their
//! on-disk offset. A non-zero disk offset is stale and ignored once the
//! in-memory slot for that edge is populated.

use crate::error::{Error, Result};

/// Handle to a node inside a transaction's arena. Never valid across
/// transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

pub(crate) const HAS_VALUE: u8 = 1 << 0;
pub(crate) const HAS_META: u8 = 1 << 1;

pub(crate) struct Node {
    pub(crate) flags: u8,
    pub(crate) prefix: Vec<u8>,
    pub(crate) value: Vec<u8>,
    pub(crate) meta: Vec<u8>,

    /// Children already loaded or created in this transaction's arena.
    pub(crate) mem_next: Box<[Option<NodeId>; 256]>,
    /// Children known only by their on-disk offset (0 = absent, or stale
    /// once `mem_next` for that edge is `Some`).
    pub(crate) disk_next: Box<[u64; 256]>,

    /// Forwarding pointer installed by copy-on-write mutation. Readers must
    /// follow this to its terminus before inspecting anything else.
    pub(crate) replaced_by: Option<NodeId>,

    pub(crate) disk_size: u64,
    pub(crate) disk_off: u64,
}

impl Node {
    fn new(flags: u8, prefix: &[u8], value: &[u8]) -> Self {
        Node {
            flags,
            prefix: prefix.to_vec(),
            value: value.to_vec(),
            meta: Vec::new(),
            mem_next: Box::new([None; 256]),
            disk_next: Box::new([0u64; 256]),
            replaced_by: None,
            disk_size: 0,
            disk_off: 0,
        }
    }

    pub(crate) fn has_value(&self) -> bool {
        self.flags & HAS_VALUE != 0
    }

    pub(crate) fn nsubnodes(&self) -> usize {
        let mut n = 0;
        for i in 0..256 {
            if self.mem_next[i].is_some() || self.disk_next[i] != 0 {
                n += 1;
            }
        }
        n
    }

    fn approx_bytes(&self) -> usize {
        std::mem::size_of::<Node>() + self.prefix.len() + self.value.len() + self.meta.len()
    }
}

/// Round `n` up to the next 16-byte boundary, the bump arena's allocation
/// granularity.
fn align16(n: usize) -> usize {
    (n + 15) & !15
}

/// Either a dynamically-growing arena (unbounded, nodes released wholesale
/// at transaction reset) or a bump arena: one contiguous byte budget,
/// handed out as 16-byte-aligned, monotonically advancing allocations.
pub(crate) enum Arena {
    Dynamic { nodes: Vec<Node>, limit: usize, used: usize },
    Bump { nodes: Vec<Node>, capacity: usize, used: usize },
}

impl Arena {
    pub(crate) fn dynamic(limit: usize) -> Self {
        Arena::Dynamic { nodes: Vec::new(), limit, used: 0 }
    }

    /// A bump arena backed by a `capacity`-byte budget.
    pub(crate) fn bump(capacity: usize) -> Self {
        Arena::Bump { nodes: Vec::new(), capacity, used: 0 }
    }

    /// Insert an already-constructed node (typically one just decoded from
    /// disk) under the same budget accounting as the `new_*` constructors.
    pub(crate) fn insert(&mut self, node: Node) -> Result<NodeId> {
        self.push(node)
    }

    fn push(&mut self, node: Node) -> Result<NodeId> {
        match self {
            Arena::Dynamic { nodes, limit, used } => {
                let size = node.approx_bytes();
                if *used + size > *limit {
                    return Err(Error::OutOfMemory);
                }
                *used += size;
                nodes.push(node);
                Ok(NodeId((nodes.len() - 1) as u32))
            }
            Arena::Bump { nodes, capacity, used } => {
                let size = align16(node.approx_bytes());
                if *used + size > *capacity {
                    return Err(Error::OutOfMemory);
                }
                *used += size;
                nodes.push(node);
                Ok(NodeId((nodes.len() - 1) as u32))
            }
        }
    }

    fn nodes(&self) -> &[Node] {
        match self {
            Arena::Dynamic { nodes, .. } => nodes,
            Arena::Bump { nodes, .. } => nodes,
        }
    }

    fn nodes_mut(&mut self) -> &mut Vec<Node> {
        match self {
            Arena::Dynamic { nodes, .. } => nodes,
            Arena::Bump { nodes, .. } => nodes,
        }
    }

    pub(crate) fn get(&self, id: NodeId) -> &Node {
        &self.nodes()[id.index()]
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes_mut()[id.index()]
    }

    /// Release every node. Bump arenas do this in O(1); dynamic arenas drop
    /// the backing `Vec`, freeing each node individually. A bump arena never
    /// frees a single node mid-transaction — only a full reset is possible,
    /// so `free_one` below is a no-op for it by construction.
    pub(crate) fn reset(&mut self) {
        match self {
            Arena::Dynamic { nodes, used, .. } => {
                nodes.clear();
                *used = 0;
            }
            Arena::Bump { nodes, used, .. } => {
                nodes.clear();
                *used = 0;
            }
        }
    }

    /// Follow `replaced_by` to its terminus.
    pub(crate) fn resolve(&self, mut id: NodeId) -> NodeId {
        while let Some(next) = self.get(id).replaced_by {
            id = next;
        }
        id
    }

    pub(crate) fn new_leaf(&mut self, prefix: &[u8], value: &[u8]) -> Result<NodeId> {
        self.push(Node::new(HAS_VALUE, prefix, value))
    }

    pub(crate) fn new_branch(&mut self, prefix: &[u8]) -> Result<NodeId> {
        self.push(Node::new(0, prefix, &[]))
    }

    pub(crate) fn new_like(&mut self, flags: u8, prefix: &[u8], value: &[u8]) -> Result<NodeId> {
        self.push(Node::new(flags, prefix, value))
    }

    /// Install `node_id`'s children to be a copy of `src`'s children table.
    pub(crate) fn clone_children(&mut self, node_id: NodeId, src: NodeId) {
        let src_next = *self.get(src).mem_next;
        let src_fnext = *self.get(src).disk_next;
        let node = self.get_mut(node_id);
        *node.mem_next = src_next;
        *node.disk_next = src_fnext;
    }

    /// Mark `old` as superseded by `new` — readers following `replaced_by`
    /// will be redirected.
    pub(crate) fn replace(&mut self, old: NodeId, new: NodeId) {
        self.get_mut(old).replaced_by = Some(new);
    }
}
