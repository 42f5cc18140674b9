//! The `Loader`: single-threaded coordinator that owns the dump reader,
//! the progress journal and the worker pool, and drives the main dispatch
//! loop. Everything else in this crate is a piece this module assembles;
//! nothing else calls the scheduler or dispatches tasks to workers.

use std::collections::HashMap;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use loader_storage::StorageBackend;
use loader_types::{AnalyzeMode, LoaderError, LoaderOptions, Version};

use crate::importer::BulkImporter;
use crate::journal::ProgressLog;
use crate::reader::DumpReader;
use crate::session::{ConnectionOptions, SessionFactory, SqlSession};
use crate::sql_transform::split_statements;
use crate::task::{Task, WorkerEvent};
use crate::worker::WorkerPool;

type TableKey = (String, String);

/// Error/warning/byte counters reported once `run()` returns.
#[derive(Debug, Default)]
pub struct Summary {
    pub chunks_loaded: usize,
    pub bytes_loaded: u64,
    pub raw_bytes_loaded: u64,
    pub tables_analyzed: usize,
    pub errors: usize,
    pub warnings: Vec<String>,
    pub aborted: bool,
    pub interrupted: bool,
}

pub struct Loader {
    options: LoaderOptions,
    backend: Arc<dyn StorageBackend>,
    sessions: Arc<dyn SessionFactory>,
    importer: Arc<dyn BulkImporter>,
    interrupt: Arc<AtomicBool>,
    hard_interrupt: Arc<AtomicBool>,
}

impl Loader {
    pub fn new(
        options: LoaderOptions,
        backend: Arc<dyn StorageBackend>,
        sessions: Arc<dyn SessionFactory>,
        importer: Arc<dyn BulkImporter>,
    ) -> Self {
        Self {
            options,
            backend,
            sessions,
            importer,
            interrupt: Arc::new(AtomicBool::new(false)),
            hard_interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handles the shell can flip from its own signal handler. Wiring an
    /// actual `SIGINT` handler is out of scope; this just
    /// gives the caller the atomics the main loop already reads.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    pub fn hard_interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.hard_interrupt)
    }

    pub fn run(&mut self) -> Result<Summary> {
        let mut reader = DumpReader::open(self.backend.as_ref(), self.options.clone())?;

        if !reader.dump.is_complete() && self.options.wait_dump_timeout == 0 {
            bail!("dump is not complete and wait_dump_timeout is 0");
        }

        let mut coordinator_session = self
            .sessions
            .connect()
            .context("opening the coordinator session")?;
        self.setup_session(coordinator_session.as_mut(), &reader)?;

        let target_version = self.target_server_version(coordinator_session.as_mut())?;
        if target_version.major != reader.dump.source_server_version.major {
            let message = format!(
                "target server is version {}.x but the dump was produced from a version {}.x server",
                target_version.major, reader.dump.source_server_version.major
            );
            if self.options.ignore_version {
                log::warn!("{message}; continuing because ignore_version is set");
            } else {
                bail!("{message} (pass ignore_version to load anyway)");
            }
        }

        let journal_path = self
            .options
            .progress_file
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| "load-progress.json".to_string());

        let (mut journal, restart) = ProgressLog::init(
            self.backend.as_ref(),
            &journal_path,
            self.options.dry_run,
            false,
        )?;
        if self.options.reset_progress {
            journal.reset_progress()?;
        }

        if !restart.is_resuming && self.options.load_ddl && !self.options.ignore_existing_objects {
            self.check_no_existing_objects(coordinator_session.as_mut(), &reader)?;
        }

        if self.requires_primary_key(coordinator_session.as_mut())? {
            let offenders = reader.tables_without_primary_key();
            if !offenders.is_empty() {
                let list: Vec<String> = offenders.iter().map(|(s, t)| format!("{s}.{t}")).collect();
                bail!("sql_require_primary_key is ON and these tables lack a primary key: {}", list.join(", "));
            }
        }

        let pre_data_done = self.run_root_script_once(coordinator_session.as_mut(), "@.sql")?;
        let _ = pre_data_done;

        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let pool = WorkerPool::new(
            self.options.threads,
            Arc::clone(&self.backend),
            Arc::clone(&self.sessions),
            Arc::clone(&self.importer),
            events_tx,
            Arc::clone(&self.hard_interrupt),
            true,
        )?;

        let mut summary = Summary::default();
        let mut in_flight: HashMap<TableKey, u64> = HashMap::new();
        let mut idle_workers: usize = 0;
        let mut active_workers = self.options.threads;
        let mut abort = false;
        let mut last_progress = Instant::now();

        loop {
            if !reader.dump.is_complete() {
                reader.rescan(self.backend.as_ref())?;
                if reader.dump.is_complete() {
                    last_progress = Instant::now();
                } else if last_progress.elapsed() > Duration::from_secs(self.options.wait_dump_timeout) {
                    bail!("dump_wait_timeout: dump did not complete within {}s", self.options.wait_dump_timeout);
                }
            }

            if self.options.load_ddl && !abort {
                let dispatched_any = self.dispatch_ready_ddl(&mut reader, &mut journal, coordinator_session.as_mut())?;
                if dispatched_any {
                    last_progress = Instant::now();
                }
            }

            match events_rx.recv_timeout(Duration::from_secs(1)) {
                Ok(event) => {
                    last_progress = Instant::now();
                    match event {
                        WorkerEvent::Ready { .. } => {
                            idle_workers += 1;
                            if !abort && !self.interrupt.load(Ordering::SeqCst) {
                                if let Some(task) = self.next_task(&mut reader, &mut journal, &mut in_flight, target_version)? {
                                    idle_workers -= 1;
                                    pool.dispatch(task)?;
                                }
                            }
                        }
                        WorkerEvent::LoadEnd { schema, table, chunk_index, raw_bytes, .. } => {
                            let key = (schema.clone(), table.clone());
                            let chunk_i = chunk_index.map(|c| c as i64).unwrap_or(-1);
                            let on_disk = reader
                                .table(&schema, &table)
                                .and_then(|t| t.chunks.iter().find(|c| c.chunk_index == chunk_index))
                                .map(|c| c.on_disk_bytes)
                                .unwrap_or(0);
                            if let Some(bytes) = in_flight.get_mut(&key) {
                                *bytes = bytes.saturating_sub(on_disk);
                            }
                            journal.end_table_chunk(&schema, &table, chunk_i, on_disk, raw_bytes)?;
                            summary.chunks_loaded += 1;
                            summary.bytes_loaded += on_disk;
                            summary.raw_bytes_loaded += raw_bytes;
                        }
                        WorkerEvent::LoadInterrupted { schema, table, chunk_index, .. } => {
                            let key = (schema.clone(), table.clone());
                            let on_disk = reader
                                .table(&schema, &table)
                                .and_then(|t| t.chunks.iter().find(|c| c.chunk_index == chunk_index))
                                .map(|c| c.on_disk_bytes)
                                .unwrap_or(0);
                            if let Some(bytes) = in_flight.get_mut(&key) {
                                *bytes = bytes.saturating_sub(on_disk);
                            }
                        }
                        WorkerEvent::IndexEnd { schema, table, .. } => {
                            reader.mark_indexes_created(&schema, &table);
                        }
                        WorkerEvent::AnalyzeEnd { .. } => {
                            summary.tables_analyzed += 1;
                        }
                        WorkerEvent::IndexStatementSkipped { schema, table, note, .. } => {
                            summary.warnings.push(format!("{schema}.{table}: {note}"));
                        }
                        WorkerEvent::TaskFailed { schema, table, message, .. } => {
                            summary.errors += 1;
                            summary.warnings.push(format!("{schema}.{table}: {message}"));
                            abort = true;
                        }
                        WorkerEvent::Exit { .. } => {
                            active_workers -= 1;
                        }
                        _ => {}
                    }
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            }

            if abort || self.hard_interrupt.load(Ordering::SeqCst) {
                break;
            }
            if active_workers == 0 {
                break;
            }
            if reader.dump.is_complete()
                && in_flight.values().all(|b| *b == 0)
                && idle_workers == active_workers
                && self.nothing_left(&reader, &journal)
            {
                break;
            }
        }

        pool.shutdown();

        if !abort && !self.interrupt.load(Ordering::SeqCst) {
            self.run_root_script_once(coordinator_session.as_mut(), "@.post.sql")?;
            if self.options.load_users {
                self.run_root_script_once(coordinator_session.as_mut(), "@.users.sql")?;
            }
            for schema in reader.schema_names().to_vec() {
                let fks = reader.take_schema_fk_statements(&schema);
                for stmt in fks {
                    coordinator_session.as_mut().execute(&stmt)?;
                }
            }
        }

        summary.aborted = abort;
        summary.interrupted = (self.interrupt.load(Ordering::SeqCst) || self.hard_interrupt.load(Ordering::SeqCst)) && !abort;
        Ok(summary)
    }

    fn setup_session(&self, session: &mut dyn SqlSession, reader: &DumpReader) -> Result<()> {
        session.execute("SET net_read_timeout = 1800")?;
        if self.options.skip_binlog {
            session.execute("SET sql_log_bin = 0")?;
        }
        session.execute("SET foreign_key_checks = 0")?;
        session.execute("SET unique_checks = 0")?;
        session.execute("SET SQL_MODE = 'NO_AUTO_VALUE_ON_ZERO'")?;
        if let Some(charset) = &self.options.character_set {
            session.execute(&format!("SET NAMES {charset}"))?;
        }
        if reader.dump.tz_utc {
            session.execute("SET TIME_ZONE = '+00:00'")?;
        }
        Ok(())
    }

    fn requires_primary_key(&self, session: &mut dyn SqlSession) -> Result<bool> {
        let rows = session.query("SHOW VARIABLES LIKE 'sql_require_primary_key'")?;
        Ok(rows.first().and_then(|r| r.get(1)).map(|v| v.eq_ignore_ascii_case("ON")).unwrap_or(false))
    }

    fn check_no_existing_objects(&self, session: &mut dyn SqlSession, reader: &DumpReader) -> Result<()> {
        for schema in reader.schema_names() {
            let rows = session.query(&format!("SHOW TABLES FROM `{}`", escape_ident(schema)))?;
            let existing: Vec<String> = rows.iter().filter_map(|r| r.get(0).map(|s| s.to_string())).collect();
            if !existing.is_empty() {
                bail!("Schema '{schema}' already contains a table named {}", existing[0]);
            }
        }
        Ok(())
    }

    /// Runs a root script (`@.sql`, `@.post.sql`, `@.users.sql`) statement
    /// by statement. Under `force`, a statement that fails with a
    /// force-skippable error abandons the rest of the script rather than
    /// failing the whole run.
    fn run_root_script_once(&self, session: &mut dyn SqlSession, path: &str) -> Result<bool> {
        if self.options.dry_run || !self.backend.exists(path)? {
            return Ok(false);
        }
        let script = read_text(self.backend.as_ref(), path)?;
        for stmt in split_statements(&script) {
            if stmt.trim().is_empty() {
                continue;
            }
            if let Err(e) = session.execute(&stmt) {
                if self.options.force && is_force_skippable(&e) {
                    log::warn!("force: skipping the rest of {path} after a DDL error: {e}");
                    break;
                }
                return Err(LoaderError::EntityDdl { schema: path.to_string(), table: None, message: e.to_string() }.into());
            }
        }
        Ok(true)
    }

    /// Executes one entity's DDL statements. Returns `Ok(true)` if every
    /// statement ran, `Ok(false)` if a force-skippable failure abandoned
    /// `schema`/`table` (recorded in the reader's skip sets so it is never
    /// scheduled again this run), or `Err` if the failure is fatal.
    fn exec_ddl(&self, session: &mut dyn SqlSession, reader: &mut DumpReader, schema: &str, table: Option<&str>, ddl: &str) -> Result<bool> {
        for stmt in split_statements(ddl) {
            if stmt.trim().is_empty() {
                continue;
            }
            if let Err(e) = session.execute(&stmt) {
                if self.options.force && is_force_skippable(&e) {
                    let qualified = table.map(|t| format!("{schema}.{t}")).unwrap_or_else(|| schema.to_string());
                    log::warn!("force: skipping {qualified} after a DDL error: {e}");
                    match table {
                        Some(t) => reader.skip_table(schema, t),
                        None => reader.skip_schema(schema),
                    }
                    return Ok(false);
                }
                return Err(LoaderError::EntityDdl { schema: schema.to_string(), table: table.map(|t| t.to_string()), message: e.to_string() }.into());
            }
        }
        Ok(true)
    }

    /// Applies every schema whose DDL (and its tables') is ready, via
    /// the coordinator's own session, recording journal milestones in
    /// schema-DDL-then-table-DDL order.
    fn dispatch_ready_ddl(&self, reader: &mut DumpReader, journal: &mut ProgressLog, session: &mut dyn SqlSession) -> Result<bool> {
        let mut dispatched = false;
        while let Some((schema, schema_ddl, placeholders, tables)) = reader.next_schema_and_tables() {
            dispatched = true;
            let schema_already_done = journal.schema_ddl_status(&schema) == loader_types::EntryStatus::Done;
            journal.start_schema_ddl(&schema)?;
            if !self.options.dry_run && !schema_already_done && !self.exec_ddl(session, reader, &schema, None, &schema_ddl)? {
                continue;
            }
            journal.end_schema_ddl(&schema)?;

            // Placeholders are `CREATE TABLE IF NOT EXISTS`, always safe to
            // re-run, so they are not journaled.
            if !self.options.dry_run {
                for stmt in &placeholders {
                    session.execute(stmt)?;
                }
            }

            for (table, ddl) in tables {
                let table_already_done = journal.table_ddl_status(&schema, &table) == loader_types::EntryStatus::Done;
                journal.start_table_ddl(&schema, &table)?;
                if !self.options.dry_run && !table_already_done && !self.exec_ddl(session, reader, &schema, Some(&table), &ddl)? {
                    continue;
                }
                journal.end_table_ddl(&schema, &table)?;
            }
        }

        if reader.all_schema_ddl_done() {
            while let Some((schema, views)) = reader.next_schema_and_views(self.backend.as_ref(), true)? {
                dispatched = true;
                for (view, ddl) in views {
                    let already_done = journal.table_ddl_status(&schema, &view) == loader_types::EntryStatus::Done;
                    journal.start_table_ddl(&schema, &view)?;
                    if !self.options.dry_run && !already_done && !self.exec_ddl(session, reader, &schema, Some(&view), &ddl)? {
                        continue;
                    }
                    journal.end_table_ddl(&schema, &view)?;
                }
            }
        }
        Ok(dispatched)
    }

    fn next_task(&self, reader: &mut DumpReader, journal: &mut ProgressLog, in_flight: &mut HashMap<TableKey, u64>, target_version: Version) -> Result<Option<Task>> {
        if self.options.load_data {
            if let Some((schema, table, chunk)) = reader.next_table_chunk(in_flight) {
                let key = (schema.clone(), table.clone());
                *in_flight.entry(key).or_insert(0) += chunk.on_disk_bytes;
                let chunk_i = chunk.chunk_index.map(|c| c as i64).unwrap_or(-1);
                // Read before `start_table_chunk` overwrites it: a prior,
                // abandoned run left this exact chunk `Interrupted`.
                let resume = journal.table_chunk_status(&schema, &table, chunk_i) == loader_types::EntryStatus::Interrupted;
                let has_primary_key = reader.table(&schema, &table).map(|t| t.has_primary_key).unwrap_or(true);
                journal.start_table_chunk(&schema, &table, chunk_i)?;
                return Ok(Some(Task::LoadChunk { schema, table, chunk, resume, has_primary_key }));
            }
        }

        if self.options.load_indexes {
            if let Some((schema, table, statements)) = reader.next_table_for_index_recreation(|s, t, indices| all_chunks_journaled_done(journal, s, t, indices)) {
                return Ok(Some(Task::RecreateIndexes { schema, table, statements }));
            }
        }

        let analyze_enabled = self.options.analyze_tables != AnalyzeMode::Off;
        if let Some((schema, table, histograms)) = reader.next_table_to_analyze(analyze_enabled) {
            let histograms = self.histograms_for_mode(histograms, &schema, &table, target_version);
            return Ok(Some(Task::AnalyzeTable { schema, table, histograms }));
        }

        Ok(None)
    }

    /// `AnalyzeMode::On` always runs a plain `ANALYZE TABLE`.
    /// `AnalyzeMode::Histogram` issues `UPDATE HISTOGRAM` when the target
    /// server supports it (MySQL > 8.0), and otherwise falls back to a
    /// plain `ANALYZE TABLE`, matching the behavior of the tool this
    /// loader supersedes.
    fn histograms_for_mode(&self, histograms: Vec<loader_types::Histogram>, schema: &str, table: &str, target_version: Version) -> Vec<loader_types::Histogram> {
        match self.options.analyze_tables {
            AnalyzeMode::Histogram if target_version > Version::new(8, 0) => histograms,
            AnalyzeMode::Histogram => {
                if !histograms.is_empty() {
                    log::warn!("target server {}.{} does not support histograms; running a plain ANALYZE TABLE on {schema}.{table}", target_version.major, target_version.minor);
                }
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn nothing_left(&self, reader: &DumpReader, journal: &ProgressLog) -> bool {
        if !reader.all_views_done() {
            return false;
        }
        if self.options.load_data && reader.has_ready_chunk() {
            return false;
        }
        if self.options.load_indexes && reader.has_index_recreation_work(|s, t, indices| all_chunks_journaled_done(journal, s, t, indices)) {
            return false;
        }
        let analyze_enabled = self.options.analyze_tables != AnalyzeMode::Off;
        if reader.has_analyze_work(analyze_enabled) {
            return false;
        }
        true
    }

    /// Queries the live target server's version for the major-version
    /// compatibility gate and the histogram-support gate.
    fn target_server_version(&self, session: &mut dyn SqlSession) -> Result<Version> {
        let rows = session.query("SELECT VERSION()").context("querying target server version")?;
        let raw = rows.first().and_then(|r| r.get(0)).unwrap_or("0.0").to_string();
        Ok(parse_server_version(&raw))
    }
}

/// Whether every chunk of `schema.table` (by journal index, `-1` for an
/// unchunked table) is recorded `DONE`. Used both to dispatch index
/// recreation and, read-only, to decide the main loop can terminate.
fn all_chunks_journaled_done(journal: &ProgressLog, schema: &str, table: &str, chunk_indices: &[i64]) -> bool {
    chunk_indices.iter().all(|&i| journal.table_chunk_status(schema, table, i) == loader_types::EntryStatus::Done)
}

/// Whether a DDL execution error can be downgraded to a skip under
/// `force`. Matched exhaustively so a new `LoaderError` variant must be
/// classified here rather than silently inheriting a default.
fn is_force_skippable(err: &LoaderError) -> bool {
    match err {
        LoaderError::Recoverable(_) => true,
        LoaderError::EntityDdl { .. } => true,
        LoaderError::SetupFatal(_) => false,
        LoaderError::TaskFailed { .. } => false,
        LoaderError::Interrupted => false,
        LoaderError::Io(_) => false,
        LoaderError::Json(_) => false,
    }
}

/// Parses the major/minor out of a `SELECT VERSION()` string such as
/// `"8.0.32-0ubuntu0.22.04.2"`. Unparseable input maps to 0.0 rather than
/// failing outright, so a driver that returns something unexpected still
/// surfaces as a version mismatch instead of a panic.
fn parse_server_version(raw: &str) -> Version {
    let mut parts = raw.split(|c: char| c == '.' || c == '-');
    let major = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let minor = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    Version::new(major, minor)
}

fn escape_ident(name: &str) -> String {
    name.replace('`', "``")
}

fn read_text(backend: &dyn StorageBackend, path: &str) -> Result<String> {
    let mut reader = backend.open_read(path).with_context(|| format!("opening {path}"))?;
    let mut out = String::new();
    reader.read_to_string(&mut out).with_context(|| format!("reading {path}"))?;
    Ok(out)
}

/// Builds the default connection options for the session factory from
/// loader options and a dump (character set, UTC handling are applied
/// per-session in [`Loader::setup_session`] instead, since those need a
/// live session).
pub fn default_connection_options(host: impl Into<String>, port: u16, user: impl Into<String>, password: Option<String>) -> ConnectionOptions {
    ConnectionOptions { host: host.into(), port, user: user.into(), password, schema: None }
}
