//! Data model and configuration for the parallel dump loader.
//!
//! This crate holds only plain data: no I/O, no threading. `loader-storage`
//! builds the storage fabric on top of it; `loader-core` builds the dump
//! reader, scheduler, worker pool and coordinator.

pub mod dump;
pub mod error;
pub mod options;
pub mod progress;
pub mod schema;
pub mod table;

pub use dump::{DeferIndexMode, Dump, DumpStatus, Version};
pub use error::{LoaderError, Result};
pub use options::{AnalyzeMode, LoaderOptions};
pub use progress::{EntryStatus, ProgressEntry, ProgressOp};
pub use schema::{Schema, View};
pub use table::{Chunk, Compression, Histogram, Table};
