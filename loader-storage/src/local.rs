use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::PathBuf;

use anyhow::{format_err, Error};

use crate::backend::{DirEntry, StorageBackend, WriteHandle};

/// Plain filesystem backend, rooted at a base directory.
pub struct LocalBackend {
    base: PathBuf,
}

impl LocalBackend {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.base.join(path)
    }
}

impl StorageBackend for LocalBackend {
    fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>, Error> {
        let dir = self.resolve(path);
        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir)
            .map_err(|err| format_err!("unable to read directory {dir:?}: {err}"))?
        {
            let entry = entry?;
            let meta = entry.metadata()?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: meta.is_dir(),
                size: meta.len(),
            });
        }
        Ok(entries)
    }

    fn exists(&self, path: &str) -> Result<bool, Error> {
        Ok(self.resolve(path).exists())
    }

    fn file_size(&self, path: &str) -> Result<u64, Error> {
        let meta = fs::metadata(self.resolve(path))
            .map_err(|err| format_err!("unable to stat {path}: {err}"))?;
        Ok(meta.len())
    }

    fn open_read(&self, path: &str) -> Result<Box<dyn Read + Send>, Error> {
        let file = File::open(self.resolve(path))
            .map_err(|err| format_err!("unable to open {path}: {err}"))?;
        Ok(Box::new(file))
    }

    fn open_write(&self, path: &str) -> Result<Box<dyn WriteHandle>, Error> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        // Always a fresh, empty file: callers that want to keep existing
        // content (e.g. `ProgressLog::init` re-seeding its journal on
        // restart) read it first and rewrite it themselves through the
        // returned handle.
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&full)
            .map_err(|err| format_err!("unable to open {path} for write: {err}"))?;
        Ok(Box::new(LocalWriteHandle { file }))
    }

    fn remove(&self, path: &str) -> Result<(), Error> {
        let full = self.resolve(path);
        if full.exists() {
            fs::remove_file(&full)?;
        }
        Ok(())
    }
}

struct LocalWriteHandle {
    file: File,
}

impl Write for LocalWriteHandle {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

impl WriteHandle for LocalWriteHandle {
    fn truncate(&mut self) -> std::io::Result<()> {
        self.file.set_len(0)?;
        use std::io::Seek;
        self.file.seek(std::io::SeekFrom::Start(0))?;
        Ok(())
    }
}
