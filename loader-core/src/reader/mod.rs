//! Dump reader: parses the directory of metadata and data
//! files a producer writes, which may still be growing, and answers
//! "what schema/table DDL, what view, what chunk is ready to load next."
//! By far the largest component; everything else in this crate consumes
//! its view of the world rather than touching the storage fabric
//! directly.

pub mod chunk_naming;
pub mod metadata;

use std::collections::{HashMap, HashSet};
use std::io::Read;

use anyhow::{bail, Context, Result};

use loader_storage::StorageBackend;
use loader_types::{Chunk, Compression, Dump, DumpStatus, Histogram, LoaderOptions, Schema, Table, Version};

use crate::sql_transform::extract_deferred_indexes;
use chunk_naming::parse_chunk_name;
use metadata::{DoneMarkerJson, RootMetadataJson, SchemaMetadataJson, TableMetadataJson};

type TableKey = (String, String);

/// Parses `@.json`, `@.done.json` and the per-schema/per-table files they
/// reference, exposing the topology and readiness the coordinator and
/// scheduler need. Owned exclusively by the coordinator; never shared.
pub struct DumpReader {
    options: LoaderOptions,
    pub dump: Dump,
    schema_order: Vec<String>,
    schemas: HashMap<String, Schema>,
    tables: HashMap<TableKey, Table>,
    schema_ddl: HashMap<String, String>,
    table_ddl: HashMap<TableKey, String>,
    table_triggers_ddl: HashMap<TableKey, String>,
    view_final_ddl: HashMap<TableKey, String>,
    ddl_yielded: HashSet<String>,
    views_yielded: HashSet<String>,
    dispatched: HashMap<TableKey, usize>,
    /// `(original_name, target_schema)` when `LoaderOptions::target_schema`
    /// renamed the dump's single schema on load.
    schema_rename: Option<(String, String)>,
    /// Schemas/tables abandoned mid-run by a `force`-gated DDL failure;
    /// never yielded again for DDL, data, index recreation or analyze.
    skip_schemas: HashSet<String>,
    skip_tables: HashSet<TableKey>,
}

impl DumpReader {
    /// Opens the dump, reading whatever metadata already exists. A
    /// freshly created producer directory (root metadata not yet
    /// written) yields a reader in `DumpStatus::Invalid`; the caller
    /// (`Loader::run`) decides whether to wait and rescan.
    pub fn open(backend: &dyn StorageBackend, options: LoaderOptions) -> Result<Self> {
        let mut reader = Self {
            options,
            dump: Dump::new(Version::new(0, 0), Version::new(0, 0), String::new(), false),
            schema_order: Vec::new(),
            schemas: HashMap::new(),
            tables: HashMap::new(),
            schema_ddl: HashMap::new(),
            table_ddl: HashMap::new(),
            table_triggers_ddl: HashMap::new(),
            view_final_ddl: HashMap::new(),
            ddl_yielded: HashSet::new(),
            views_yielded: HashSet::new(),
            dispatched: HashMap::new(),
            schema_rename: None,
            skip_schemas: HashSet::new(),
            skip_tables: HashSet::new(),
        };
        reader.rescan(backend)?;
        Ok(reader)
    }

    /// Relists the dump directory and folds in anything new: root
    /// metadata if this is the first successful scan, per-schema and
    /// per-table metadata as their files appear, new chunk files for
    /// already-known tables, and the done-marker once it lands
    ///.
    pub fn rescan(&mut self, backend: &dyn StorageBackend) -> Result<()> {
        if self.dump.status == DumpStatus::Invalid {
            self.load_root(backend)?;
        }
        if self.dump.status == DumpStatus::Invalid {
            return Ok(());
        }

        for schema_name in self.schema_order.clone() {
            self.discover_schema(backend, &schema_name)?;
        }

        let root_entries = backend.list_dir("")?;
        let table_keys: Vec<TableKey> = self.tables.keys().cloned().collect();
        for key in table_keys {
            self.discover_table(backend, &key, &root_entries)?;
        }

        if !self.dump.is_complete() && backend.exists("@.done.json")? {
            self.load_done_marker(backend)?;
        }

        Ok(())
    }

    fn load_root(&mut self, backend: &dyn StorageBackend) -> Result<()> {
        if !backend.exists("@.json")? {
            return Ok(());
        }
        let root: RootMetadataJson = read_json(backend, "@.json")?;
        if !root.version.is_supported() {
            bail!(
                "dump format version {}.{} is newer than the supported {}.{}",
                root.version.major,
                root.version.minor,
                Version::SUPPORTED.major,
                Version::SUPPORTED.minor
            );
        }

        let mut dump = Dump::new(root.version, root.server_version, root.default_character_set.clone(), root.tz_utc);
        dump.compatibility_flags = root.compatibility_options.clone();
        dump.defer_table_indexes = root.defer_table_indexes;
        dump.table_only = root.table_only;
        dump.status = DumpStatus::Dumping;
        self.dump = dump;

        let rename = match self.options.target_schema.as_ref().filter(|s| !s.is_empty()) {
            Some(target) => {
                if root.schemas.len() != 1 {
                    bail!(
                        "target_schema can only be used when loading a single schema, but this dump has {}",
                        root.schemas.len()
                    );
                }
                Some((root.schemas[0].clone(), target.clone()))
            }
            None => None,
        };

        for schema_name in &root.schemas {
            let basename = root.basenames.get(schema_name).cloned().unwrap_or_else(|| schema_name.clone());
            let effective_name = match &rename {
                Some((from, to)) if from == schema_name => to.clone(),
                _ => schema_name.clone(),
            };
            self.schema_order.push(effective_name.clone());
            self.schemas.insert(effective_name.clone(), Schema::new(effective_name, basename));
        }
        self.schema_rename = rename;
        Ok(())
    }

    fn discover_schema(&mut self, backend: &dyn StorageBackend, schema_name: &str) -> Result<()> {
        let basename = self.schemas[schema_name].basename.clone();

        if !self.schemas[schema_name].md_done {
            let json_path = format!("{basename}.json");
            if backend.exists(&json_path)? {
                let meta: SchemaMetadataJson = read_json(backend, &json_path)?;
                for table_name in &meta.tables {
                    let table_basename = meta
                        .basenames
                        .get(table_name)
                        .cloned()
                        .unwrap_or_else(|| format!("{basename}@{table_name}"));
                    self.tables
                        .entry((schema_name.to_string(), table_name.clone()))
                        .or_insert_with(|| Table::new(schema_name, table_name.clone(), table_basename));
                }
                let schema = self.schemas.get_mut(schema_name).expect("schema exists");
                schema.tables = meta.tables;
                schema.views = meta.views;
                schema.has_view_sql = meta.includes_views_ddl;
                schema.md_done = true;
            }
        }

        let sql_path = format!("{basename}.sql");
        if !self.schemas[schema_name].has_sql && backend.exists(&sql_path)? {
            let mut ddl = read_text(backend, &sql_path)?;
            if let Some((original, target)) = &self.schema_rename {
                if schema_name == target {
                    ddl = ddl.replace(&format!("`{original}`"), &format!("`{target}`"));
                }
            }
            self.schema_ddl.insert(schema_name.to_string(), ddl);
            self.schemas.get_mut(schema_name).expect("schema exists").has_sql = true;
        }

        Ok(())
    }

    fn discover_table(&mut self, backend: &dyn StorageBackend, key: &TableKey, root_entries: &[loader_storage::DirEntry]) -> Result<()> {
        let (schema_name, table_name) = key.clone();

        if !self.tables[key].md_done {
            let basename = self.tables[key].basename.clone();
            let json_path = format!("{basename}.json");
            if backend.exists(&json_path)? {
                let meta: TableMetadataJson = read_json(backend, &json_path)?;
                let table = self.tables.get_mut(key).expect("table exists");
                table.chunked = meta.chunking;
                table.compression = meta
                    .compression
                    .as_deref()
                    .map(compression_from_name)
                    .unwrap_or(Compression::None);
                table.has_primary_key = meta.primary_index.is_some();
                table.has_triggers = !meta.triggers.is_empty();
                table.no_data = meta.no_data;
                table.histograms = meta.histograms.into_iter().map(|h| Histogram { column: h.column, buckets: h.buckets }).collect();
                table.md_done = true;
            }
        }

        if !self.table_ddl.contains_key(key) {
            let basename = self.tables[key].basename.clone();
            let sql_path = format!("{basename}.sql");
            if backend.exists(&sql_path)? {
                let ddl = read_text(backend, &sql_path)?;
                let table_quoted = format!("`{schema_name}`.`{table_name}`");
                let extracted = extract_deferred_indexes(&ddl, &table_quoted, self.options.defer_table_indexes);

                self.tables.get_mut(key).expect("table exists").deferred_index_statements = extracted.deferred_index_statements;
                self.table_ddl.insert(key.clone(), extracted.rewritten_ddl);

                if !extracted.deferred_fk_statements.is_empty() {
                    let schema = self.schemas.get_mut(&schema_name).expect("schema exists");
                    schema.deferred_fk_statements.extend(extracted.deferred_fk_statements);
                }
            }
        }

        if self.tables[key].has_triggers && !self.table_triggers_ddl.contains_key(key) {
            let basename = self.tables[key].basename.clone();
            let triggers_path = format!("{basename}.triggers.sql");
            if backend.exists(&triggers_path)? {
                self.table_triggers_ddl.insert(key.clone(), read_text(backend, &triggers_path)?);
            }
        }

        if !self.tables[key].no_data && !self.tables[key].last_chunk_seen {
            self.discover_chunks(backend, key, root_entries)?;
        }

        Ok(())
    }

    fn discover_chunks(&mut self, backend: &dyn StorageBackend, key: &TableKey, root_entries: &[loader_storage::DirEntry]) -> Result<()> {
        let basename = self.tables[key].basename.clone();
        let mut new_chunks: Vec<Chunk> = Vec::new();
        let mut last_seen = false;

        let known_indices: HashSet<Option<u64>> = self.tables[key].chunks.iter().map(|c| c.chunk_index).collect();

        for entry in root_entries {
            if entry.is_dir || entry.name.ends_with(".idx") {
                continue;
            }
            let Some((parsed, _compression)) = parse_chunk_name(&entry.name, &basename) else {
                continue;
            };
            if parsed.is_last {
                last_seen = true;
            }
            if known_indices.contains(&parsed.index) {
                continue;
            }
            // The done marker's `chunkFileBytes` map is the authoritative
            // source for a chunk's uncompressed size and overwrites this in
            // `load_done_marker`; the `.idx` sidecar is only
            // read here as a fallback for chunks that finish loading before
            // the dump itself completes.
            let raw_bytes = read_idx_sidecar(backend, &entry.name)?;
            new_chunks.push(Chunk {
                schema: key.0.clone(),
                table: key.1.clone(),
                chunk_index: parsed.index,
                filename: entry.name.clone(),
                on_disk_bytes: entry.size,
                raw_bytes,
            });
        }

        if !new_chunks.is_empty() {
            let table = self.tables.get_mut(key).expect("table exists");
            table.chunks.extend(new_chunks);
            table.chunks.sort_by_key(|c| c.chunk_index.unwrap_or(0));
            if table.compression == Compression::None {
                if let Some(first) = table.chunks.first() {
                    table.compression = Compression::from_filename(&first.filename);
                }
            }
        }
        if last_seen {
            self.tables.get_mut(key).expect("table exists").last_chunk_seen = true;
        }
        Ok(())
    }

    fn load_done_marker(&mut self, backend: &dyn StorageBackend) -> Result<()> {
        let done: DoneMarkerJson = read_json(backend, "@.done.json")?;
        self.dump.total_uncompressed_bytes = done.data_bytes;
        self.dump.status = DumpStatus::Complete;
        for table in self.tables.values_mut() {
            for chunk in table.chunks.iter_mut() {
                if let Some(bytes) = done.chunk_file_bytes.get(&chunk.filename) {
                    chunk.raw_bytes = Some(*bytes);
                }
            }
        }
        Ok(())
    }

    /// Abandons a schema after a `force`-gated DDL failure: neither it nor
    /// any of its tables is ever yielded again this run.
    pub fn skip_schema(&mut self, schema: &str) {
        self.skip_schemas.insert(schema.to_string());
    }

    /// Abandons a single table after a `force`-gated DDL failure: its data
    /// chunks, index recreation and analyze are never scheduled.
    pub fn skip_table(&mut self, schema: &str, table: &str) {
        self.skip_tables.insert((schema.to_string(), table.to_string()));
    }

    fn is_skipped(&self, schema: &str, table: &str) -> bool {
        self.skip_schemas.contains(schema) || self.skip_tables.contains(&(schema.to_string(), table.to_string()))
    }

    /// A table is skipped entirely (never yielded for DDL or data) when
    /// it's excluded by the filters, the producer marked it as containing
    /// no rows, or it (or its schema) was abandoned via [`Self::skip_table`]
    /// / [`Self::skip_schema`].
    fn table_is_loadable(&self, schema: &str, table: &str) -> bool {
        self.options.table_included(schema, table)
            && !self.is_skipped(schema, table)
            && !self.tables.get(&(schema.to_string(), table.to_string())).map(|t| t.no_data).unwrap_or(false)
    }

    /// Yields the next schema whose DDL (its own plus every included
    /// table's) is fully available: the schema's own `CREATE DATABASE`
    /// script, the synthesized placeholder for each view, and
    /// `(name, ddl)` for each table. Each schema is yielded at most once.
    pub fn next_schema_and_tables(&mut self) -> Option<(String, String, Vec<String>, Vec<(String, String)>)> {
        for schema_name in self.schema_order.clone() {
            if self.ddl_yielded.contains(&schema_name) {
                continue;
            }
            let schema = self.schemas.get(&schema_name)?;
            if !schema.md_done || !schema.has_sql {
                continue;
            }
            let tables = schema.tables.clone();
            let views = schema.views.clone();
            let all_table_ddl_ready = tables
                .iter()
                .filter(|t| self.table_is_loadable(&schema_name, t))
                .all(|t| self.table_ddl.contains_key(&(schema_name.clone(), t.clone())));
            if !all_table_ddl_ready {
                continue;
            }

            self.ddl_yielded.insert(schema_name.clone());
            let schema_ddl = self.schema_ddl.get(&schema_name).cloned().unwrap_or_default();
            // Ordering guarantee (iii): view placeholders precede table DDL
            // in a schema that has views, so a view defined in terms of
            // another view can resolve regardless of creation order.
            let placeholders: Vec<String> = views
                .iter()
                .map(|v| format!("CREATE TABLE IF NOT EXISTS `{schema_name}`.`{v}` (placeholder INT)"))
                .collect();
            let mut table_ddl = Vec::new();
            for t in &tables {
                if !self.table_is_loadable(&schema_name, t) {
                    continue;
                }
                if let Some(ddl) = self.table_ddl.get(&(schema_name.clone(), t.clone())) {
                    table_ddl.push((t.clone(), ddl.clone()));
                }
            }
            return Some((schema_name, schema_ddl, placeholders, table_ddl));
        }
        None
    }

    /// Whether every schema named in the root metadata has had its table
    /// DDL yielded by [`Self::next_schema_and_tables`] — the gate for
    /// [`Self::next_schema_and_views`].
    pub fn all_schema_ddl_done(&self) -> bool {
        self.dump.is_complete() && self.schema_order.iter().all(|s| self.ddl_yielded.contains(s))
    }

    /// Whether every schema's final `CREATE VIEW` pass has been yielded
    /// (or had none to yield). Lets the coordinator's main loop withhold
    /// termination until view DDL has actually been applied.
    pub fn all_views_done(&self) -> bool {
        self.all_schema_ddl_done() && self.schema_order.iter().all(|s| self.views_yielded.contains(s))
    }

    /// Second pass: final `CREATE VIEW` DDL, once all
    /// table DDL across the whole dump has been applied. Reads
    /// `<viewBase>.sql`, sharing the schema's basenames map.
    pub fn next_schema_and_views(&mut self, backend: &dyn StorageBackend, all_table_ddl_done: bool) -> Result<Option<(String, Vec<(String, String)>)>> {
        if !all_table_ddl_done {
            return Ok(None);
        }
        for schema_name in self.schema_order.clone() {
            if self.views_yielded.contains(&schema_name) {
                continue;
            }
            let schema = match self.schemas.get(&schema_name) {
                Some(s) => s,
                None => continue,
            };
            if !schema.md_done || schema.views.is_empty() {
                if schema.md_done {
                    self.views_yielded.insert(schema_name.clone());
                }
                continue;
            }
            let basename = schema.basename.clone();
            let views = schema.views.clone();
            let mut ready = Vec::with_capacity(views.len());
            for v in &views {
                let key = (schema_name.clone(), v.clone());
                if !self.view_final_ddl.contains_key(&key) {
                    let path = format!("{basename}@{v}.sql");
                    if !backend.exists(&path)? {
                        ready.clear();
                        break;
                    }
                    self.view_final_ddl.insert(key.clone(), read_text(backend, &path)?);
                }
                ready.push((v.clone(), self.view_final_ddl[&key].clone()));
            }
            if ready.len() != views.len() {
                continue;
            }
            self.views_yielded.insert(schema_name.clone());
            return Ok(Some((schema_name, ready)));
        }
        Ok(None)
    }

    /// Picks the next data chunk via proportional scheduling and hands back ownership of its identity. `in_flight` is
    /// maintained by the coordinator; this reader only tracks how much
    /// of each table has already been dispatched.
    pub fn next_table_chunk(&mut self, in_flight: &HashMap<TableKey, u64>) -> Option<(String, String, Chunk)> {
        let mut candidates = Vec::new();
        for (key, table) in &self.tables {
            if !self.table_is_loadable(&key.0, &key.1) {
                continue;
            }
            let cursor = *self.dispatched.get(key).unwrap_or(&0);
            if cursor >= table.chunks.len() {
                continue;
            }
            let available_bytes: u64 = table.chunks[cursor..].iter().map(|c| c.on_disk_bytes).sum();
            candidates.push(crate::scheduler::TableCandidate {
                schema: key.0.clone(),
                table: key.1.clone(),
                available_bytes,
                started: cursor > 0,
            });
        }

        let (schema, table) = crate::scheduler::pick_next_table(&candidates, in_flight, self.options.threads)?;
        let key = (schema.clone(), table.clone());
        let cursor = *self.dispatched.get(&key).unwrap_or(&0);
        let chunk = self.tables.get(&key)?.chunks.get(cursor)?.clone();
        self.dispatched.insert(key, cursor + 1);
        Some((schema, table, chunk))
    }

    /// Offers the next table whose data is fully dispatched and
    /// journaled `DONE` for index recreation. `all_chunks_done(schema, table, chunk_indices)`
    /// lets the coordinator consult the journal rather than duplicate
    /// its bookkeeping here; it receives the table's chunk indices
    /// (journal sentinel `-1` for an unchunked table) from this reader
    /// so it never needs to borrow the reader itself, which would
    /// conflict with `self.tables` already being mutably borrowed below.
    pub fn next_table_for_index_recreation(&mut self, all_chunks_done: impl Fn(&str, &str, &[i64]) -> bool) -> Option<(String, String, Vec<String>)> {
        for (key, table) in self.tables.iter_mut() {
            if table.indexes_scheduled || table.no_data {
                continue;
            }
            if self.skip_schemas.contains(&key.0) || self.skip_tables.contains(key) {
                continue;
            }
            if !table.last_chunk_seen || *self.dispatched.get(key).unwrap_or(&0) < table.chunks.len() {
                continue;
            }
            let indices = chunk_journal_indices(table);
            if !all_chunks_done(&key.0, &key.1, &indices) {
                continue;
            }
            table.indexes_scheduled = true;
            return Some((key.0.clone(), key.1.clone(), table.deferred_index_statements.clone()));
        }
        None
    }

    /// Non-mutating check for "is there a table whose data is fully
    /// dispatched and DONE, waiting on index recreation" — used only to
    /// decide whether the main loop can terminate, never to dispatch
    /// (dispatching must go through [`Self::next_table_for_index_recreation`]
    /// so `indexes_scheduled` only flips when a task is actually handed
    /// to a worker).
    pub fn has_index_recreation_work(&self, all_chunks_done: impl Fn(&str, &str, &[i64]) -> bool) -> bool {
        self.tables.iter().any(|(key, table)| {
            !table.indexes_scheduled
                && !table.no_data
                && !self.is_skipped(&key.0, &key.1)
                && table.last_chunk_seen
                && *self.dispatched.get(key).unwrap_or(&0) >= table.chunks.len()
                && all_chunks_done(&key.0, &key.1, &chunk_journal_indices(table))
        })
    }

    /// Non-mutating counterpart to [`Self::next_table_to_analyze`]; see
    /// [`Self::has_index_recreation_work`] for why a separate read-only
    /// check exists.
    pub fn has_analyze_work(&self, analyze_tables_enabled: bool) -> bool {
        analyze_tables_enabled
            && self
                .tables
                .iter()
                .any(|(key, table)| !table.analyze_scheduled && !table.no_data && table.indexes_created && !self.is_skipped(&key.0, &key.1))
    }

    /// Non-mutating counterpart to [`Self::next_table_chunk`]: whether
    /// any loadable table still has undispatched chunks, regardless of
    /// scheduler fairness.
    pub fn has_ready_chunk(&self) -> bool {
        self.tables.iter().any(|(key, table)| {
            self.table_is_loadable(&key.0, &key.1) && *self.dispatched.get(key).unwrap_or(&0) < table.chunks.len()
        })
    }

    pub fn mark_indexes_created(&mut self, schema: &str, table: &str) {
        if let Some(t) = self.tables.get_mut(&(schema.to_string(), table.to_string())) {
            t.indexes_created = true;
        }
    }

    /// Offers the next table whose indexes exist for `ANALYZE`, or `None` if `analyze_tables=off`.
    pub fn next_table_to_analyze(&mut self, analyze_tables_enabled: bool) -> Option<(String, String, Vec<Histogram>)> {
        if !analyze_tables_enabled {
            return None;
        }
        for (key, table) in self.tables.iter_mut() {
            if table.analyze_scheduled || table.no_data || !table.indexes_created {
                continue;
            }
            if self.skip_schemas.contains(&key.0) || self.skip_tables.contains(key) {
                continue;
            }
            table.analyze_scheduled = true;
            return Some((key.0.clone(), key.1.clone(), table.histograms.clone()));
        }
        None
    }

    /// Drains a schema's deferred foreign-key `ALTER TABLE` statements,
    /// to be applied once at `on_schema_end`. Returns an empty vector if already drained.
    pub fn take_schema_fk_statements(&mut self, schema: &str) -> Vec<String> {
        self.schemas.get_mut(schema).map(|s| std::mem::take(&mut s.deferred_fk_statements)).unwrap_or_default()
    }

    pub fn triggers_ddl(&self, schema: &str, table: &str) -> Option<&str> {
        self.table_triggers_ddl.get(&(schema.to_string(), table.to_string())).map(|s| s.as_str())
    }

    /// Tables lacking a primary-key-equivalent among those actually
    /// included by the current filters.
    pub fn tables_without_primary_key(&self) -> Vec<(String, String)> {
        self.tables
            .iter()
            .filter(|(key, t)| self.table_is_loadable(&key.0, &key.1) && !t.has_primary_key)
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn schema_names(&self) -> &[String] {
        &self.schema_order
    }

    pub fn table(&self, schema: &str, table: &str) -> Option<&Table> {
        self.tables.get(&(schema.to_string(), table.to_string()))
    }
}

/// Chunk indices of `table` in the journal's numbering: `-1` stands for
/// the single chunk of an unchunked table, matching how the coordinator
/// records `LoadChunk` milestones (see `Chunk::chunk_index.unwrap_or(-1)`
/// at the dispatch site).
fn chunk_journal_indices(table: &Table) -> Vec<i64> {
    table.chunks.iter().map(|c| c.chunk_index.map(|i| i as i64).unwrap_or(-1)).collect()
}

/// Best-effort read of a chunk's `.idx` sidecar for its uncompressed byte
/// count. Missing sidecar is not an error: most chunks only
/// ever get their raw size from `@.done.json` once the dump completes.
fn read_idx_sidecar(backend: &dyn StorageBackend, chunk_filename: &str) -> Result<Option<u64>> {
    let idx_path = format!("{chunk_filename}.idx");
    if !backend.exists(&idx_path)? {
        return Ok(None);
    }
    let mut buf = Vec::new();
    backend.open_read(&idx_path)?.read_to_end(&mut buf).with_context(|| format!("reading {idx_path}"))?;
    match loader_storage::idx::read_uncompressed_size(std::io::Cursor::new(buf)) {
        Ok(size) => Ok(Some(size)),
        Err(_) => Ok(None),
    }
}

fn compression_from_name(name: &str) -> Compression {
    match name {
        "zstd" => Compression::Zstd,
        "gzip" => Compression::Gzip,
        _ => Compression::None,
    }
}

fn read_text(backend: &dyn StorageBackend, path: &str) -> Result<String> {
    let mut reader = backend.open_read(path).with_context(|| format!("opening {path}"))?;
    let mut out = String::new();
    reader.read_to_string(&mut out).with_context(|| format!("reading {path}"))?;
    Ok(out)
}

fn read_json<T: serde::de::DeserializeOwned>(backend: &dyn StorageBackend, path: &str) -> Result<T> {
    let text = read_text(backend, path)?;
    serde_json::from_str(&text).with_context(|| format!("parsing {path}"))
}
