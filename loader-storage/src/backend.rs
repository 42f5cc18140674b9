use std::io::{Read, Write};

use anyhow::Error;

/// A directory entry as reported by a [`StorageBackend`] listing.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
}

/// A write handle that may or may not support append/partial flush.
///
/// Local files implement this directly. Backends that cannot append or
/// partially flush (object stores reached over REST) instead buffer writes
/// in memory and re-upload the whole object on every `flush()`.
pub trait WriteHandle: Write + Send {
    /// Discards all previously written content, starting the object over
    /// at zero length (used by `reset_progress`).
    fn truncate(&mut self) -> std::io::Result<()>;
}

/// Uniform access to local files and remote object stores.
///
/// A backend is asked only for directory listing, existence, size and
/// opening files for sequential read or for (possibly rewrite-on-flush)
/// write; it never interprets file contents.
pub trait StorageBackend: Send + Sync {
    /// Lists immediate children of `path` within this backend's root.
    fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>, Error>;

    /// `true` if `path` exists (file or directory).
    fn exists(&self, path: &str) -> Result<bool, Error>;

    /// On-disk (possibly compressed) size of the file at `path`.
    fn file_size(&self, path: &str) -> Result<u64, Error>;

    /// Opens `path` for sequential read. The returned reader is the raw
    /// byte stream; callers apply [`crate::compressed_reader`] on top when
    /// the filename extension indicates compression.
    fn open_read(&self, path: &str) -> Result<Box<dyn Read + Send>, Error>;

    /// Opens `path` for writing, honoring this backend's append/rewrite
    /// capability.
    fn open_write(&self, path: &str) -> Result<Box<dyn WriteHandle>, Error>;

    /// Removes `path`, or makes it a fresh zero-length object.
    fn remove(&self, path: &str) -> Result<(), Error>;
}
