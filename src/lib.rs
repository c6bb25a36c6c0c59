//! `radix-store`: an embedded, single-file, ordered key-value store built
//! around a radix (Patricia) trie, persisted through append-only,
//! atomically committed transactions with a trailing footer.
//!
//! The trie lives entirely in memory while a [`Transaction`] is open, nodes
//! loaded lazily from disk as a `get`/`put`/`del`/[`Cursor`] traversal
//! reaches them. Mutation is copy-on-write: a changed node is never edited
//! in place once reachable from more than the current call, a fresh node is
//! allocated and linked in via a `replaced_by` forwarding pointer instead.
//! [`Transaction::commit`] walks whatever is reachable from the (possibly
//! partially rewritten) root, assigns each touched node a disk offset, and
//! appends the whole lot — or drops it into a previously reclaimed gap — as
//! one contiguous transaction block followed by a 49-byte footer.
//!
//! ```no_run
//! use radix_store::{Database, DatabaseParams, TransactionParams};
//!
//! # fn main() -> Result<(), radix_store::Error> {
//! let db = Database::open("example.rdx", DatabaseParams::default())?;
//! let mut tr = db.transaction(TransactionParams::default());
//! tr.begin()?;
//! tr.put(b"hello", b"world")?;
//! tr.commit()?;
//!
//! let mut tr = db.transaction(TransactionParams::default());
//! tr.begin()?;
//! assert_eq!(tr.get(b"hello")?, b"world");
//! # Ok(())
//! # }
//! ```

mod codec;
mod cursor;
mod database;
mod error;
mod io;
mod node;
mod params;
mod transaction;
mod trie;
mod vacuum;

pub use cursor::{Cursor, SeekMode};
pub use database::{DbInfo, Database};
pub use error::{Error, Result};
pub use io::{MemStorage, RandomAccess};
pub use params::{AllocMode, DatabaseParams, TransactionParams};
pub use transaction::Transaction;
pub use vacuum::vacuum;
