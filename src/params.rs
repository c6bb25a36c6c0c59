//! Configuration knobs for a database and for the transactions it creates.
//!
//! Every limit is explicit and has a sane default so a caller can just use
//! `Default::default()`.

/// Allocation strategy for a transaction's node arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocMode {
    /// Per-node heap allocation, unbounded growth up to `limit` bytes.
    Dynamic,
    /// One contiguous buffer of `capacity` bytes; O(1) reset, no
    /// per-node free.
    Bump,
}

/// Parameters a [`crate::Database`] is opened with.
#[derive(Debug, Clone)]
pub struct DatabaseParams {
    /// Maximum size, in bytes, the commit write buffer may grow to.
    pub write_buf_limit: usize,
    /// Whether the write buffer may grow (reallocate) up to `write_buf_limit`,
    /// or must be pre-sized and never grow.
    pub write_buf_dynalloc: bool,
}

impl Default for DatabaseParams {
    fn default() -> Self {
        DatabaseParams {
            write_buf_limit: 1 << 30,
            write_buf_dynalloc: true,
        }
    }
}

/// Parameters a single [`crate::Transaction`] is created with.
#[derive(Debug, Clone)]
pub struct TransactionParams {
    /// Allocation strategy for this transaction's node arena.
    pub alloc_mode: AllocMode,
    /// Byte budget for `Dynamic` mode, or buffer capacity for `Bump` mode.
    pub limit: usize,
}

impl Default for TransactionParams {
    fn default() -> Self {
        TransactionParams {
            alloc_mode: AllocMode::Dynamic,
            limit: usize::MAX,
        }
    }
}

impl TransactionParams {
    /// A transaction using a fixed-capacity bump arena of `capacity` bytes.
    pub fn bump(capacity: usize) -> Self {
        TransactionParams { alloc_mode: AllocMode::Bump, limit: capacity }
    }

    /// A transaction using the dynamic allocator with an explicit byte
    /// budget.
    pub fn dynamic_with_limit(limit: usize) -> Self {
        TransactionParams { alloc_mode: AllocMode::Dynamic, limit }
    }
}
