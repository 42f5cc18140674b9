//! Resumable progress journal: append-only, newline-delimited JSON,
//! rewrite-on-flush capable.

use std::collections::HashMap;
use std::io::{Read, Write};

use anyhow::{format_err, Error};
use loader_types::{EntryStatus, ProgressEntry, ProgressOp};
use loader_storage::{StorageBackend, WriteHandle};

fn key(op: ProgressOp, schema: &str, table: Option<&str>, chunk: Option<i64>) -> String {
    let mut key = op.as_str().to_string();
    key.push(':');
    key.push('`');
    key.push_str(schema);
    key.push('`');
    if let Some(table) = table {
        key.push_str(":`");
        key.push_str(table);
        key.push('`');
    }
    if let Some(chunk) = chunk {
        key.push(':');
        key.push_str(&chunk.to_string());
    }
    key
}

/// Aggregate byte counters recovered from a prior run, and whether this is
/// a restart at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct RestartStats {
    pub is_resuming: bool,
    pub bytes_completed: u64,
    pub raw_bytes_completed: u64,
}

/// Append-only log of per-entity DDL/data milestones.
pub struct ProgressLog {
    handle: Option<Box<dyn WriteHandle>>,
    last_state: HashMap<String, EntryStatus>,
    dry_run: bool,
}

impl ProgressLog {
    /// Reads any existing entries at `path` within `backend`, reconstructs
    /// per-key status, and opens the log for appending (or a dry-run
    /// no-op, writing nothing).
    pub fn init(
        backend: &dyn StorageBackend,
        path: &str,
        dry_run: bool,
        rewrite_on_flush: bool,
    ) -> Result<(Self, RestartStats), Error> {
        let _ = rewrite_on_flush; // chosen by the backend the caller passed in.

        let mut last_state = HashMap::new();
        let mut bytes_completed = 0u64;
        let mut raw_bytes_completed = 0u64;
        let mut existing_data = String::new();

        if backend.exists(path).unwrap_or(false) {
            let mut reader = backend
                .open_read(path)
                .map_err(|err| format_err!("Error loading load progress file '{path}': {err}"))?;
            reader
                .read_to_string(&mut existing_data)
                .map_err(|err| format_err!("Error loading load progress file '{path}': {err}"))?;

            for line in existing_data.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                let entry: ProgressEntry = serde_json::from_str(line)
                    .map_err(|err| format_err!("Error loading load progress file '{path}': {err}"))?;
                let entry_key = key(
                    entry.op,
                    entry.schema.as_deref().unwrap_or_default(),
                    entry.table.as_deref(),
                    entry.chunk,
                );

                let already_done = matches!(last_state.get(&entry_key), Some(EntryStatus::Done));
                if already_done || !entry.done {
                    last_state.insert(entry_key, EntryStatus::Interrupted);
                } else {
                    if let Some(bytes) = entry.bytes {
                        bytes_completed += bytes;
                    }
                    if let Some(raw_bytes) = entry.raw_bytes {
                        raw_bytes_completed += raw_bytes;
                    }
                    last_state.insert(entry_key, EntryStatus::Done);
                }
            }
        }

        let is_resuming = !last_state.is_empty();

        let handle = if dry_run {
            None
        } else {
            let mut handle = backend.open_write(path)?;
            if !existing_data.is_empty() {
                handle.write_all(existing_data.as_bytes())?;
                handle.write_all(b"\n")?; // separator for the new attempt
                handle.flush()?;
            }
            Some(handle)
        };

        Ok((
            Self {
                handle,
                last_state,
                dry_run,
            },
            RestartStats {
                is_resuming,
                bytes_completed,
                raw_bytes_completed,
            },
        ))
    }

    fn status(&self, key: &str) -> EntryStatus {
        self.last_state.get(key).copied().unwrap_or(EntryStatus::Pending)
    }

    pub fn schema_ddl_status(&self, schema: &str) -> EntryStatus {
        self.status(&key(ProgressOp::SchemaDdl, schema, None, None))
    }

    pub fn table_ddl_status(&self, schema: &str, table: &str) -> EntryStatus {
        self.status(&key(ProgressOp::TableDdl, schema, Some(table), None))
    }

    pub fn triggers_ddl_status(&self, schema: &str, table: &str) -> EntryStatus {
        self.status(&key(ProgressOp::TriggersDdl, schema, Some(table), None))
    }

    pub fn table_chunk_status(&self, schema: &str, table: &str, chunk: i64) -> EntryStatus {
        self.status(&key(ProgressOp::TableData, schema, Some(table), Some(chunk)))
    }

    fn log(&mut self, entry: ProgressEntry, status_key: String, status: EntryStatus) -> Result<(), Error> {
        self.last_state.insert(status_key, status);
        if let Some(handle) = &mut self.handle {
            let line = serde_json::to_string(&entry)?;
            handle.write_all(line.as_bytes())?;
            handle.write_all(b"\n")?;
            handle.flush()?;
        }
        Ok(())
    }

    pub fn start_schema_ddl(&mut self, schema: &str) -> Result<(), Error> {
        if self.schema_ddl_status(schema) == EntryStatus::Done {
            return Ok(());
        }
        let k = key(ProgressOp::SchemaDdl, schema, None, None);
        self.log(
            ProgressEntry { op: ProgressOp::SchemaDdl, schema: Some(schema.to_string()), table: None, chunk: None, done: false, bytes: None, raw_bytes: None },
            k,
            EntryStatus::Interrupted,
        )
    }

    pub fn end_schema_ddl(&mut self, schema: &str) -> Result<(), Error> {
        if self.schema_ddl_status(schema) == EntryStatus::Done {
            return Ok(());
        }
        let k = key(ProgressOp::SchemaDdl, schema, None, None);
        self.log(
            ProgressEntry { op: ProgressOp::SchemaDdl, schema: Some(schema.to_string()), table: None, chunk: None, done: true, bytes: None, raw_bytes: None },
            k,
            EntryStatus::Done,
        )
    }

    pub fn start_table_ddl(&mut self, schema: &str, table: &str) -> Result<(), Error> {
        if self.table_ddl_status(schema, table) == EntryStatus::Done {
            return Ok(());
        }
        let k = key(ProgressOp::TableDdl, schema, Some(table), None);
        self.log(
            ProgressEntry { op: ProgressOp::TableDdl, schema: Some(schema.to_string()), table: Some(table.to_string()), chunk: None, done: false, bytes: None, raw_bytes: None },
            k,
            EntryStatus::Interrupted,
        )
    }

    pub fn end_table_ddl(&mut self, schema: &str, table: &str) -> Result<(), Error> {
        if self.table_ddl_status(schema, table) == EntryStatus::Done {
            return Ok(());
        }
        let k = key(ProgressOp::TableDdl, schema, Some(table), None);
        self.log(
            ProgressEntry { op: ProgressOp::TableDdl, schema: Some(schema.to_string()), table: Some(table.to_string()), chunk: None, done: true, bytes: None, raw_bytes: None },
            k,
            EntryStatus::Done,
        )
    }

    pub fn start_triggers_ddl(&mut self, schema: &str, table: &str) -> Result<(), Error> {
        if self.triggers_ddl_status(schema, table) == EntryStatus::Done {
            return Ok(());
        }
        let k = key(ProgressOp::TriggersDdl, schema, Some(table), None);
        self.log(
            ProgressEntry { op: ProgressOp::TriggersDdl, schema: Some(schema.to_string()), table: Some(table.to_string()), chunk: None, done: false, bytes: None, raw_bytes: None },
            k,
            EntryStatus::Interrupted,
        )
    }

    pub fn end_triggers_ddl(&mut self, schema: &str, table: &str) -> Result<(), Error> {
        if self.triggers_ddl_status(schema, table) == EntryStatus::Done {
            return Ok(());
        }
        let k = key(ProgressOp::TriggersDdl, schema, Some(table), None);
        self.log(
            ProgressEntry { op: ProgressOp::TriggersDdl, schema: Some(schema.to_string()), table: Some(table.to_string()), chunk: None, done: true, bytes: None, raw_bytes: None },
            k,
            EntryStatus::Done,
        )
    }

    pub fn start_table_chunk(&mut self, schema: &str, table: &str, chunk: i64) -> Result<(), Error> {
        if self.table_chunk_status(schema, table, chunk) == EntryStatus::Done {
            return Ok(());
        }
        let k = key(ProgressOp::TableData, schema, Some(table), Some(chunk));
        self.log(
            ProgressEntry { op: ProgressOp::TableData, schema: Some(schema.to_string()), table: Some(table.to_string()), chunk: Some(chunk), done: false, bytes: Some(0), raw_bytes: Some(0) },
            k,
            EntryStatus::Interrupted,
        )
    }

    pub fn end_table_chunk(
        &mut self,
        schema: &str,
        table: &str,
        chunk: i64,
        bytes_loaded: u64,
        raw_bytes_loaded: u64,
    ) -> Result<(), Error> {
        if self.table_chunk_status(schema, table, chunk) == EntryStatus::Done {
            return Ok(());
        }
        let k = key(ProgressOp::TableData, schema, Some(table), Some(chunk));
        self.log(
            ProgressEntry {
                op: ProgressOp::TableData,
                schema: Some(schema.to_string()),
                table: Some(table.to_string()),
                chunk: Some(chunk),
                done: true,
                bytes: Some(bytes_loaded),
                raw_bytes: Some(raw_bytes_loaded),
            },
            k,
            EntryStatus::Done,
        )
    }

    /// Discards all prior entries: truncates locally, or re-creates a
    /// zero-length object remotely.
    pub fn reset_progress(&mut self) -> Result<(), Error> {
        self.last_state.clear();
        if let Some(handle) = &mut self.handle {
            handle.truncate()?;
        }
        Ok(())
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}
