//! Positioned read/write/size over a single backing store.
//!
//! This is the only boundary the trie engine crosses to reach the host:
//! no buffering happens here, the transaction's write buffer does that.

use std::fs::File;

use parking_lot::Mutex;

use crate::error::Result;

/// Everything the trie engine needs from the host file system.
pub trait RandomAccess: Send + Sync {
    /// Read exactly `buf.len()` bytes starting at `offset`.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Write all of `buf` starting at `offset`.
    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()>;

    /// Current size of the backing store, in bytes.
    fn size(&self) -> Result<u64>;

    /// Flush any host-level buffering to stable storage.
    fn sync(&self) -> Result<()>;
}

/// A plain file on disk, opened once and shared by the database handle.
pub struct FileStorage {
    file: File,
}

impl FileStorage {
    pub fn new(file: File) -> Self {
        FileStorage { file }
    }
}

#[cfg(unix)]
impl RandomAccess for FileStorage {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        use std::os::unix::fs::FileExt;
        self.file.read_exact_at(buf, offset)?;
        Ok(())
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        use std::os::unix::fs::FileExt;
        self.file.write_all_at(buf, offset)?;
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

#[cfg(windows)]
impl RandomAccess for FileStorage {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        use std::os::windows::fs::FileExt;
        let mut read = 0;
        while read < buf.len() {
            read += self.file.seek_read(&mut buf[read..], offset + read as u64)?;
        }
        Ok(())
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        use std::os::windows::fs::FileExt;
        let mut written = 0;
        while written < buf.len() {
            written += self.file.seek_write(&buf[written..], offset + written as u64)?;
        }
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

/// In-memory backing store, for tests and for transient (non-persistent)
/// databases opened without a path.
#[derive(Default)]
pub struct MemStorage {
    bytes: Mutex<Vec<u8>>,
}

impl MemStorage {
    pub fn new() -> Self {
        MemStorage::default()
    }
}

impl RandomAccess for MemStorage {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let bytes = self.bytes.lock();
        let start = offset as usize;
        let end = start + buf.len();
        if end > bytes.len() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "read past end of in-memory store",
            )
            .into());
        }
        buf.copy_from_slice(&bytes[start..end]);
        Ok(())
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        let mut bytes = self.bytes.lock();
        let start = offset as usize;
        let end = start + buf.len();
        if end > bytes.len() {
            bytes.resize(end, 0);
        }
        bytes[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.bytes.lock().len() as u64)
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}
