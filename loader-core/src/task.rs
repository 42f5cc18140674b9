//! Work items dispatched to workers and the events they report back
//!. Kept as plain data so the worker loop and the
//! coordinator's dispatch logic can be reasoned about independently of
//! the `crossbeam-channel` plumbing that carries them.

use loader_types::{Chunk, Histogram};

/// A unit of work handed to an idle worker.
#[derive(Debug, Clone)]
pub enum Task {
    /// Load one data chunk into `schema.table`. `resume` is set when the
    /// journal shows this exact chunk was started by a prior, abandoned
    /// run; `has_primary_key` tells the worker whether `REPLACE` alone is
    /// enough to dedupe a resumed reload or whether the table needs
    /// truncating first (see `run_task`).
    LoadChunk { schema: String, table: String, chunk: Chunk, resume: bool, has_primary_key: bool },
    /// Recreate the deferred secondary indexes and foreign keys for a
    /// table whose data chunks have all been loaded.
    RecreateIndexes { schema: String, table: String, statements: Vec<String> },
    /// Run `ANALYZE TABLE` (or build a histogram) once indexes exist.
    /// `histograms` is empty unless the target server supports them
    /// and the table has any.
    AnalyzeTable { schema: String, table: String, histograms: Vec<Histogram> },
}

impl Task {
    pub fn schema(&self) -> &str {
        match self {
            Task::LoadChunk { schema, .. } => schema,
            Task::RecreateIndexes { schema, .. } => schema,
            Task::AnalyzeTable { schema, .. } => schema,
        }
    }

    pub fn table(&self) -> &str {
        match self {
            Task::LoadChunk { table, .. } => table,
            Task::RecreateIndexes { table, .. } => table,
            Task::AnalyzeTable { table, .. } => table,
        }
    }
}

/// Reported back to the coordinator over the event channel as work
/// progresses. `worker_id` identifies which worker thread produced the
/// event, for logging.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// Worker is idle and wants another task.
    Ready { worker_id: usize },
    LoadStart { worker_id: usize, schema: String, table: String, chunk_index: Option<u64> },
    LoadEnd { worker_id: usize, schema: String, table: String, chunk_index: Option<u64>, raw_bytes: u64 },
    /// A second interrupt signal cut a chunk load short. The chunk stays
    /// `Interrupted` in the journal; a resumed run reloads it whole.
    LoadInterrupted { worker_id: usize, schema: String, table: String, chunk_index: Option<u64> },
    IndexStart { worker_id: usize, schema: String, table: String },
    IndexEnd { worker_id: usize, schema: String, table: String },
    AnalyzeStart { worker_id: usize, schema: String, table: String },
    AnalyzeEnd { worker_id: usize, schema: String, table: String },
    /// An `ALTER TABLE ... ADD ...` failed with "duplicate key name" and
    /// was skipped rather than treated as fatal.
    IndexStatementSkipped { worker_id: usize, schema: String, table: String, note: String },
    /// A task failed. Whether this ends the run is decided by the
    /// coordinator based on `LoaderOptions::stop_on_error`.
    TaskFailed { worker_id: usize, schema: String, table: String, message: String },
    /// Worker thread is shutting down.
    Exit { worker_id: usize },
}

impl WorkerEvent {
    pub fn worker_id(&self) -> usize {
        match self {
            WorkerEvent::Ready { worker_id }
            | WorkerEvent::LoadStart { worker_id, .. }
            | WorkerEvent::LoadEnd { worker_id, .. }
            | WorkerEvent::LoadInterrupted { worker_id, .. }
            | WorkerEvent::IndexStart { worker_id, .. }
            | WorkerEvent::IndexEnd { worker_id, .. }
            | WorkerEvent::AnalyzeStart { worker_id, .. }
            | WorkerEvent::AnalyzeEnd { worker_id, .. }
            | WorkerEvent::IndexStatementSkipped { worker_id, .. }
            | WorkerEvent::TaskFailed { worker_id, .. }
            | WorkerEvent::Exit { worker_id } => *worker_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_accessors_match_variant_fields() {
        let t = Task::AnalyzeTable { schema: "s".into(), table: "t".into(), histograms: Vec::new() };
        assert_eq!(t.schema(), "s");
        assert_eq!(t.table(), "t");
    }

    #[test]
    fn worker_event_carries_its_worker_id() {
        let e = WorkerEvent::Ready { worker_id: 3 };
        assert_eq!(e.worker_id(), 3);
    }
}
