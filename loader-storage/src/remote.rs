use std::io::{Cursor, Read, Write};
use std::sync::{Arc, Mutex};

use anyhow::Error;

use crate::backend::{DirEntry, StorageBackend, WriteHandle};

/// The narrow contract a write-once remote object store must satisfy:
/// list a prefix, stat/read/delete an object, and replace an object's
/// entire contents in one shot. The OCI/AWS/Azure-specific glue that
/// implements this against a real service is out of scope;
/// this trait is the seam such an adapter would plug into.
pub trait ObjectStore: Send + Sync {
    fn list_prefix(&self, prefix: &str) -> Result<Vec<DirEntry>, Error>;
    fn object_exists(&self, key: &str) -> Result<bool, Error>;
    fn object_size(&self, key: &str) -> Result<u64, Error>;
    fn get_object(&self, key: &str) -> Result<Vec<u8>, Error>;
    fn put_object(&self, key: &str, data: &[u8]) -> Result<(), Error>;
    fn delete_object(&self, key: &str) -> Result<(), Error>;
}

/// [`StorageBackend`] over an [`ObjectStore`]. Reads are served as a
/// single buffered fetch; writes accumulate in memory and re-upload the
/// whole object on every `flush()`.
pub struct RewriteOnFlushBackend<S: ObjectStore> {
    store: Arc<S>,
}

impl<S: ObjectStore> RewriteOnFlushBackend<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

impl<S: ObjectStore> StorageBackend for RewriteOnFlushBackend<S> {
    fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>, Error> {
        self.store.list_prefix(path)
    }

    fn exists(&self, path: &str) -> Result<bool, Error> {
        self.store.object_exists(path)
    }

    fn file_size(&self, path: &str) -> Result<u64, Error> {
        self.store.object_size(path)
    }

    fn open_read(&self, path: &str) -> Result<Box<dyn Read + Send>, Error> {
        let data = self.store.get_object(path)?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn open_write(&self, path: &str) -> Result<Box<dyn WriteHandle>, Error> {
        Ok(Box::new(RewriteOnFlushHandle {
            store: Arc::clone(&self.store),
            key: path.to_string(),
            buffer: Arc::new(Mutex::new(Vec::new())),
        }))
    }

    fn remove(&self, path: &str) -> Result<(), Error> {
        self.store.delete_object(path)
    }
}

struct RewriteOnFlushHandle<S: ObjectStore> {
    store: Arc<S>,
    key: String,
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl<S: ObjectStore> Write for RewriteOnFlushHandle<S> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let contents = self.buffer.lock().unwrap();
        self.store
            .put_object(&self.key, &contents)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))
    }
}

impl<S: ObjectStore> WriteHandle for RewriteOnFlushHandle<S> {
    fn truncate(&mut self) -> std::io::Result<()> {
        self.buffer.lock().unwrap().clear();
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct MemoryStore {
        objects: StdMutex<HashMap<String, Vec<u8>>>,
    }

    impl ObjectStore for MemoryStore {
        fn list_prefix(&self, prefix: &str) -> Result<Vec<DirEntry>, Error> {
            let objects = self.objects.lock().unwrap();
            Ok(objects
                .keys()
                .filter(|k| k.starts_with(prefix))
                .map(|k| DirEntry {
                    name: k.clone(),
                    is_dir: false,
                    size: objects[k].len() as u64,
                })
                .collect())
        }

        fn object_exists(&self, key: &str) -> Result<bool, Error> {
            Ok(self.objects.lock().unwrap().contains_key(key))
        }

        fn object_size(&self, key: &str) -> Result<u64, Error> {
            Ok(self.objects.lock().unwrap().get(key).map(|v| v.len()).unwrap_or(0) as u64)
        }

        fn get_object(&self, key: &str) -> Result<Vec<u8>, Error> {
            Ok(self.objects.lock().unwrap().get(key).cloned().unwrap_or_default())
        }

        fn put_object(&self, key: &str, data: &[u8]) -> Result<(), Error> {
            self.objects.lock().unwrap().insert(key.to_string(), data.to_vec());
            Ok(())
        }

        fn delete_object(&self, key: &str) -> Result<(), Error> {
            self.objects.lock().unwrap().remove(key);
            Ok(())
        }
    }

    #[test]
    fn flush_rewrites_whole_object() {
        let backend = RewriteOnFlushBackend::new(Arc::new(MemoryStore::default()));
        let mut handle = backend.open_write("progress.json").unwrap();
        handle.write_all(b"line one\n").unwrap();
        handle.flush().unwrap();
        handle.write_all(b"line two\n").unwrap();
        handle.flush().unwrap();

        let mut data = Vec::new();
        backend
            .open_read("progress.json")
            .unwrap()
            .read_to_end(&mut data)
            .unwrap();
        assert_eq!(data, b"line one\nline two\n");
    }

    #[test]
    fn truncate_resets_to_empty() {
        let backend = RewriteOnFlushBackend::new(Arc::new(MemoryStore::default()));
        let mut handle = backend.open_write("progress.json").unwrap();
        handle.write_all(b"stale data").unwrap();
        handle.flush().unwrap();
        handle.truncate().unwrap();

        assert_eq!(backend.file_size("progress.json").unwrap(), 0);
    }
}
