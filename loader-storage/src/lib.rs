//! Storage fabric: uniform access to local files and remote object stores,
//! transparent decompression, and `.idx` sidecar accounting.

pub mod backend;
pub mod compressed_reader;
pub mod idx;
pub mod local;
pub mod remote;

pub use backend::{DirEntry, StorageBackend, WriteHandle};
pub use compressed_reader::CompressedReader;
pub use local::LocalBackend;
pub use remote::{ObjectStore, RewriteOnFlushBackend};
