//! The worker thread pool, grounded in the
//! `crossbeam-channel` thread-pool pattern of `ParallelHandler`:
//! a bounded channel of work, one long-lived thread
//! per worker, and a shared abort flag so the first fatal error stops
//! dispatch without any thread panicking the others.
//!
//! Unlike `ParallelHandler`, workers here are pull-based: each worker
//! reports `Ready` before blocking on its next `Task`, and every step of
//! a task's lifecycle is reported back as a `WorkerEvent` rather than
//! aggregated into a single completion error. The coordinator needs the
//! finer-grained stream to update the scheduler's in-flight accounting
//! and the progress journal as work actually happens.

use std::io::Read as _;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use loader_storage::{CompressedReader, StorageBackend};
use loader_types::LoaderError;

use crate::importer::BulkImporter;
use crate::session::{SessionFactory, SqlSession};
use crate::task::{Task, WorkerEvent};

/// Returns the first fatal error recorded, if any.
pub fn check_abort(abort: &Mutex<Option<String>>) -> Result<(), LoaderError> {
    let guard = abort.lock().unwrap();
    if let Some(msg) = &*guard {
        return Err(LoaderError::TaskFailed { kind: "worker-pool", message: msg.clone() });
    }
    Ok(())
}

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    task_tx: Option<Sender<Task>>,
    abort: Arc<Mutex<Option<String>>>,
}

impl WorkerPool {
    /// Spawns `threads` workers, each opening its own session via
    /// `sessions` and importing chunks via `importer`. `stop_on_error`
    /// mirrors `LoaderOptions::stop_on_error`: when true, the first task
    /// failure sets the abort flag and ends that worker's loop.
    pub fn new(
        threads: usize,
        backend: Arc<dyn StorageBackend>,
        sessions: Arc<dyn SessionFactory>,
        importer: Arc<dyn BulkImporter>,
        events: Sender<WorkerEvent>,
        hard_interrupt: Arc<AtomicBool>,
        stop_on_error: bool,
    ) -> Result<Self, LoaderError> {
        let (task_tx, task_rx) = crossbeam_channel::bounded::<Task>(threads);
        let abort = Arc::new(Mutex::new(None));
        let mut handles = Vec::with_capacity(threads);

        for worker_id in 0..threads {
            let task_rx: Receiver<Task> = task_rx.clone();
            let events = events.clone();
            let backend = Arc::clone(&backend);
            let sessions = Arc::clone(&sessions);
            let importer = Arc::clone(&importer);
            let abort = Arc::clone(&abort);
            let hard_interrupt = Arc::clone(&hard_interrupt);

            let handle = std::thread::Builder::new()
                .name(format!("loader-worker-{worker_id}"))
                .spawn(move || run_worker(worker_id, task_rx, events, backend, sessions, importer, abort, hard_interrupt, stop_on_error))
                .map_err(|e| LoaderError::SetupFatal(format!("spawning worker thread: {e}")))?;
            handles.push(handle);
        }

        Ok(Self { handles, task_tx: Some(task_tx), abort })
    }

    /// Dispatches a task to the pool. Fails if a prior fatal error has
    /// already aborted the run.
    pub fn dispatch(&self, task: Task) -> Result<(), LoaderError> {
        check_abort(&self.abort)?;
        self.task_tx
            .as_ref()
            .expect("pool not yet shut down")
            .send(task)
            .map_err(|_| LoaderError::SetupFatal("worker channel closed".into()))
    }

    /// Closes the task channel, letting workers exit once their current
    /// task (if any) finishes, then joins every thread.
    pub fn shutdown(mut self) {
        self.task_tx.take();
        while let Some(handle) = self.handles.pop() {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.task_tx.take();
        while let Some(handle) = self.handles.pop() {
            let _ = handle.join();
        }
    }
}

fn run_worker(
    worker_id: usize,
    task_rx: Receiver<Task>,
    events: Sender<WorkerEvent>,
    backend: Arc<dyn StorageBackend>,
    sessions: Arc<dyn SessionFactory>,
    importer: Arc<dyn BulkImporter>,
    abort: Arc<Mutex<Option<String>>>,
    hard_interrupt: Arc<AtomicBool>,
    stop_on_error: bool,
) {
    let mut session = match sessions.connect() {
        Ok(s) => s,
        Err(e) => {
            mark_abort(&abort, e.to_string());
            let _ = events.send(WorkerEvent::Exit { worker_id });
            return;
        }
    };

    loop {
        let _ = events.send(WorkerEvent::Ready { worker_id });
        let task = match task_rx.recv() {
            Ok(task) => task,
            Err(_) => break,
        };

        if let Err(msg) = run_task(worker_id, &task, backend.as_ref(), session.as_mut(), importer.as_ref(), hard_interrupt.as_ref(), &events) {
            if stop_on_error {
                mark_abort(&abort, msg);
                break;
            }
        }
    }

    let _ = events.send(WorkerEvent::Exit { worker_id });
}

/// Reads and transparently decompresses a chunk file.
fn read_chunk(backend: &dyn StorageBackend, filename: &str) -> Result<Vec<u8>, String> {
    let raw = backend.open_read(filename).map_err(|e| e.to_string())?;
    let mut decompressed = CompressedReader::open(filename, raw).map_err(|e| e.to_string())?;
    let mut data = Vec::new();
    decompressed.read_to_end(&mut data).map_err(|e| e.to_string())?;
    Ok(data)
}

fn run_task(
    worker_id: usize,
    task: &Task,
    backend: &dyn StorageBackend,
    session: &mut dyn SqlSession,
    importer: &dyn BulkImporter,
    hard_interrupt: &AtomicBool,
    events: &Sender<WorkerEvent>,
) -> Result<(), String> {
    match task {
        Task::LoadChunk { schema, table, chunk, resume, has_primary_key } => {
            let _ = events.send(WorkerEvent::LoadStart {
                worker_id,
                schema: schema.clone(),
                table: table.clone(),
                chunk_index: chunk.chunk_index,
            });
            // An unchunked table with no primary-key-equivalent has no
            // unique key for `REPLACE` to dedupe against, so a resumed
            // reload would just append a second copy of every row already
            // loaded before the interrupt; truncate first instead.
            if *resume && chunk.chunk_index.is_none() && !*has_primary_key {
                if let Err(e) = session.execute(&format!("TRUNCATE TABLE `{schema}`.`{table}`")) {
                    let message = e.to_string();
                    let _ = events.send(WorkerEvent::TaskFailed {
                        worker_id,
                        schema: schema.clone(),
                        table: table.clone(),
                        message: message.clone(),
                    });
                    return Err(message);
                }
            }
            let data = read_chunk(backend, &chunk.filename)?;
            match importer.import(session, schema, table, &data, hard_interrupt) {
                Ok(raw_bytes) => {
                    let _ = events.send(WorkerEvent::LoadEnd {
                        worker_id,
                        schema: schema.clone(),
                        table: table.clone(),
                        chunk_index: chunk.chunk_index,
                        raw_bytes,
                    });
                    Ok(())
                }
                Err(loader_types::LoaderError::Interrupted) => {
                    let _ = events.send(WorkerEvent::LoadInterrupted {
                        worker_id,
                        schema: schema.clone(),
                        table: table.clone(),
                        chunk_index: chunk.chunk_index,
                    });
                    Ok(())
                }
                Err(e) => {
                    let message = e.to_string();
                    let _ = events.send(WorkerEvent::TaskFailed {
                        worker_id,
                        schema: schema.clone(),
                        table: table.clone(),
                        message: message.clone(),
                    });
                    Err(message)
                }
            }
        }
        Task::RecreateIndexes { schema, table, statements } => {
            let _ = events.send(WorkerEvent::IndexStart { worker_id, schema: schema.clone(), table: table.clone() });
            if let Err(e) = session.execute("SET unique_checks = 0") {
                let message = e.to_string();
                let _ = events.send(WorkerEvent::TaskFailed {
                    worker_id,
                    schema: schema.clone(),
                    table: table.clone(),
                    message: message.clone(),
                });
                return Err(message);
            }
            for statement in statements {
                match execute_with_deadlock_retry(session, statement) {
                    Ok(()) => {}
                    Err(e) if is_duplicate_key_name(&e) => {
                        let note = format!("skipped `{statement}`: {e}");
                        let _ = events.send(WorkerEvent::IndexStatementSkipped {
                            worker_id,
                            schema: schema.clone(),
                            table: table.clone(),
                            note,
                        });
                    }
                    Err(message) => {
                        let _ = events.send(WorkerEvent::TaskFailed {
                            worker_id,
                            schema: schema.clone(),
                            table: table.clone(),
                            message: message.clone(),
                        });
                        return Err(message);
                    }
                }
            }
            let _ = events.send(WorkerEvent::IndexEnd { worker_id, schema: schema.clone(), table: table.clone() });
            Ok(())
        }
        Task::AnalyzeTable { schema, table, histograms } => {
            let _ = events.send(WorkerEvent::AnalyzeStart { worker_id, schema: schema.clone(), table: table.clone() });
            let statements = if histograms.is_empty() {
                vec![format!("ANALYZE TABLE `{schema}`.`{table}`")]
            } else {
                histograms
                    .iter()
                    .map(|h| format!("ANALYZE TABLE `{schema}`.`{table}` UPDATE HISTOGRAM ON `{}` WITH {} BUCKETS", h.column, h.buckets))
                    .collect()
            };
            for statement in &statements {
                if let Err(e) = session.execute(statement) {
                    let message = e.to_string();
                    let _ = events.send(WorkerEvent::TaskFailed {
                        worker_id,
                        schema: schema.clone(),
                        table: table.clone(),
                        message: message.clone(),
                    });
                    return Err(message);
                }
            }
            let _ = events.send(WorkerEvent::AnalyzeEnd { worker_id, schema: schema.clone(), table: table.clone() });
            Ok(())
        }
    }
}

/// `ALTER TABLE ... ADD ...` retried up to 20 times on deadlock, with
/// linear back-off: i seconds before the i-th retry.
fn execute_with_deadlock_retry(session: &mut dyn SqlSession, statement: &str) -> Result<(), String> {
    const MAX_RETRIES: u32 = 20;
    let mut attempt = 0;
    loop {
        match session.execute(statement) {
            Ok(()) => return Ok(()),
            Err(e) if is_deadlock(&e.to_string()) && attempt < MAX_RETRIES => {
                attempt += 1;
                std::thread::sleep(std::time::Duration::from_secs(attempt as u64));
            }
            Err(e) => return Err(e.to_string()),
        }
    }
}

fn is_deadlock(message: &str) -> bool {
    let m = message.to_ascii_lowercase();
    m.contains("deadlock")
}

fn is_duplicate_key_name(message: &str) -> bool {
    let m = message.to_ascii_lowercase();
    m.contains("duplicate key name")
}

fn mark_abort(abort: &Mutex<Option<String>>, message: String) {
    let mut guard = abort.lock().unwrap();
    if guard.is_none() {
        *guard = Some(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Row;
    use loader_storage::LocalBackend;
    use loader_types::Chunk;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeSession;
    impl SqlSession for FakeSession {
        fn execute(&mut self, _statement: &str) -> Result<(), LoaderError> {
            Ok(())
        }
        fn query(&mut self, _statement: &str) -> Result<Vec<Row>, LoaderError> {
            Ok(Vec::new())
        }
        fn bulk_load(&mut self, _schema: &str, _table: &str, data: &[u8]) -> Result<u64, LoaderError> {
            Ok(data.len() as u64)
        }
    }

    struct RecordingSession(Arc<Mutex<Vec<String>>>);
    impl SqlSession for RecordingSession {
        fn execute(&mut self, statement: &str) -> Result<(), LoaderError> {
            self.0.lock().unwrap().push(statement.to_string());
            Ok(())
        }
        fn query(&mut self, _statement: &str) -> Result<Vec<Row>, LoaderError> {
            Ok(Vec::new())
        }
        fn bulk_load(&mut self, _schema: &str, _table: &str, data: &[u8]) -> Result<u64, LoaderError> {
            Ok(data.len() as u64)
        }
    }

    struct FakeSessions(AtomicUsize);
    impl SessionFactory for FakeSessions {
        fn connect(&self) -> Result<Box<dyn SqlSession>, LoaderError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeSession))
        }
    }

    struct FailingImporter;
    impl BulkImporter for FailingImporter {
        fn import(&self, _session: &mut dyn SqlSession, _schema: &str, _table: &str, _data: &[u8], _hard_interrupt: &std::sync::atomic::AtomicBool) -> Result<u64, LoaderError> {
            Err(LoaderError::Recoverable("boom".into()))
        }
    }

    #[test]
    fn worker_pool_reports_ready_on_startup() {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let pool = WorkerPool::new(
            1,
            Arc::new(LocalBackend::new(std::env::temp_dir())),
            Arc::new(FakeSessions(AtomicUsize::new(0))),
            Arc::new(crate::importer::LineDelimitedImporter),
            events_tx,
            Arc::new(AtomicBool::new(false)),
            false,
        )
        .unwrap();

        let first = events_rx.recv_timeout(std::time::Duration::from_secs(1)).unwrap();
        assert!(matches!(first, WorkerEvent::Ready { worker_id: 0 }));
        pool.shutdown();
    }

    #[test]
    fn failing_task_with_stop_on_error_aborts_further_dispatch() {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let pool = WorkerPool::new(
            1,
            Arc::new(LocalBackend::new(std::env::temp_dir())),
            Arc::new(FakeSessions(AtomicUsize::new(0))),
            Arc::new(FailingImporter),
            events_tx,
            Arc::new(AtomicBool::new(false)),
            true,
        )
        .unwrap();

        // drain the initial Ready
        let _ = events_rx.recv_timeout(std::time::Duration::from_secs(1));

        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), b"data").unwrap();
        pool.dispatch(Task::LoadChunk {
            schema: "s".into(),
            table: "t".into(),
            chunk: Chunk {
                schema: "s".into(),
                table: "t".into(),
                chunk_index: Some(0),
                filename: tmp.path().to_string_lossy().into_owned(),
                on_disk_bytes: 4,
                raw_bytes: Some(4),
            },
            resume: false,
            has_primary_key: true,
        })
        .unwrap();

        std::thread::sleep(std::time::Duration::from_millis(200));
        assert!(pool
            .dispatch(Task::AnalyzeTable { schema: "s".into(), table: "t".into(), histograms: Vec::new() })
            .is_err());
        pool.shutdown();
    }

    #[test]
    fn resumed_chunk_on_table_without_primary_key_truncates_before_loading() {
        let (events_tx, _events_rx) = crossbeam_channel::unbounded();
        let executed = Arc::new(Mutex::new(Vec::new()));
        let mut session = RecordingSession(Arc::clone(&executed));
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), b"data").unwrap();
        let task = Task::LoadChunk {
            schema: "s".into(),
            table: "t".into(),
            chunk: Chunk {
                schema: "s".into(),
                table: "t".into(),
                chunk_index: None,
                filename: tmp.path().to_string_lossy().into_owned(),
                on_disk_bytes: 4,
                raw_bytes: Some(4),
            },
            resume: true,
            has_primary_key: false,
        };
        let hard_interrupt = AtomicBool::new(false);
        run_task(
            0,
            &task,
            &LocalBackend::new(std::env::temp_dir()),
            &mut session,
            &crate::importer::LineDelimitedImporter,
            &hard_interrupt,
            &events_tx,
        )
        .unwrap();
        assert!(executed.lock().unwrap().iter().any(|s| s.contains("TRUNCATE TABLE `s`.`t`")));
    }

    #[test]
    fn resumed_chunk_on_table_with_primary_key_does_not_truncate() {
        let (events_tx, _events_rx) = crossbeam_channel::unbounded();
        let executed = Arc::new(Mutex::new(Vec::new()));
        let mut session = RecordingSession(Arc::clone(&executed));
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), b"data").unwrap();
        let task = Task::LoadChunk {
            schema: "s".into(),
            table: "t".into(),
            chunk: Chunk {
                schema: "s".into(),
                table: "t".into(),
                chunk_index: None,
                filename: tmp.path().to_string_lossy().into_owned(),
                on_disk_bytes: 4,
                raw_bytes: Some(4),
            },
            resume: true,
            has_primary_key: true,
        };
        let hard_interrupt = AtomicBool::new(false);
        run_task(
            0,
            &task,
            &LocalBackend::new(std::env::temp_dir()),
            &mut session,
            &crate::importer::LineDelimitedImporter,
            &hard_interrupt,
            &events_tx,
        )
        .unwrap();
        assert!(!executed.lock().unwrap().iter().any(|s| s.contains("TRUNCATE")));
    }
}
