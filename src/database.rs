//! The database handle: an open file (or in-memory store) plus the footer
//! state needed to hand out transactions and answer `dbinfo`.

use std::fs::OpenOptions;
use std::path::Path;

use log::{debug, trace};
use parking_lot::Mutex;

use crate::codec::{self, Footer};
use crate::error::Result;
use crate::io::{FileStorage, MemStorage, RandomAccess};
use crate::params::{DatabaseParams, TransactionParams};
use crate::transaction::Transaction;

/// Root offset and gap bounds as recorded in the current footer, exposed
/// read-only to callers (the `dbinfo` operation).
#[derive(Debug, Clone, Copy, Default)]
pub struct DbInfo {
    pub root_off: u64,
    pub gap_begin: u64,
    pub gap_end: u64,
}

/// A single open database file (or in-memory store).
///
/// Opening performs no locking: nothing stops a second process from opening
/// the same file. Concurrent-write detection happens optimistically, at
/// `commit` (see [`crate::error::Error::Modified`]).
pub struct Database {
    pub(crate) io: Box<dyn RandomAccess>,
    pub(crate) params: DatabaseParams,
    state: Mutex<DbState>,
}

struct DbState {
    #[allow(dead_code)]
    footer: Footer,
    #[allow(dead_code)]
    filesize: u64,
}

impl Database {
    /// Open (creating if necessary) a single-file database at `path`.
    pub fn open<P: AsRef<Path>>(path: P, params: DatabaseParams) -> Result<Database> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let io: Box<dyn RandomAccess> = Box::new(FileStorage::new(file));
        let (footer, filesize) = codec::read_footer(io.as_ref())?;
        debug!(
            "open: recovered footer at filesize {} (root_off {}, transaction_id {})",
            filesize, footer.root_off, footer.transaction_id
        );
        Ok(Database {
            io,
            params,
            state: Mutex::new(DbState { footer, filesize }),
        })
    }

    /// Open a transient, non-persistent database backed by memory.
    pub fn open_in_memory(params: DatabaseParams) -> Result<Database> {
        let io: Box<dyn RandomAccess> = Box::new(MemStorage::new());
        let (footer, filesize) = codec::read_footer(io.as_ref())?;
        trace!("open_in_memory: starting from an empty in-memory store");
        Ok(Database {
            io,
            params,
            state: Mutex::new(DbState { footer, filesize }),
        })
    }

    /// Create a new transaction bound to this database.
    pub fn transaction(&self, params: TransactionParams) -> Transaction<'_> {
        Transaction::new(self, params)
    }

    /// Current footer contents: live root offset and the reclaimed gap.
    pub fn info(&self) -> Result<DbInfo> {
        let (footer, _) = codec::read_footer(self.io.as_ref())?;
        let mut state = self.state.lock();
        state.footer = footer;
        Ok(DbInfo {
            root_off: footer.root_off,
            gap_begin: footer.gap_begin,
            gap_end: footer.gap_end,
        })
    }

    /// `fsync`-equivalent passthrough to the backing store.
    pub fn sync(&self) -> Result<()> {
        trace!("sync: flushing backing store");
        self.io.sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freshly_opened_file_is_an_empty_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.rdx");
        let db = Database::open(&path, DatabaseParams::default()).unwrap();
        let info = db.info().unwrap();
        assert_eq!(info.gap_begin, 0);
        assert_eq!(info.gap_end, 0);
    }

    #[test]
    fn data_persists_across_reopen_of_the_same_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.rdx");
        {
            let db = Database::open(&path, DatabaseParams::default()).unwrap();
            let mut t = db.transaction(TransactionParams::default());
            t.begin().unwrap();
            t.put(b"hello", b"world").unwrap();
            t.commit().unwrap();
            db.sync().unwrap();
        }
        {
            let db = Database::open(&path, DatabaseParams::default()).unwrap();
            let mut t = db.transaction(TransactionParams::default());
            t.begin().unwrap();
            assert_eq!(t.get(b"hello").unwrap(), b"world");
        }
    }

    #[test]
    fn in_memory_database_does_not_touch_the_filesystem() {
        let db = Database::open_in_memory(DatabaseParams::default()).unwrap();
        let mut t = db.transaction(TransactionParams::default());
        t.begin().unwrap();
        t.put(b"k", b"v").unwrap();
        t.commit().unwrap();
        let mut t = db.transaction(TransactionParams::default());
        t.begin().unwrap();
        assert_eq!(t.get(b"k").unwrap(), b"v");
    }
}
