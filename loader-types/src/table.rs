/// Compression applied to a table's chunk files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Zstd,
    Gzip,
}

impl Compression {
    /// Picks compression from a chunk file name's extension.
    pub fn from_filename(name: &str) -> Self {
        if name.ends_with(".zst") {
            Compression::Zstd
        } else if name.ends_with(".gz") {
            Compression::Gzip
        } else {
            Compression::None
        }
    }
}

/// (column, bucket count) histogram captured by the producer.
#[derive(Debug, Clone)]
pub struct Histogram {
    pub column: String,
    pub buckets: u32,
}

/// Identity and accounting for a single chunk file of a table's data.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub schema: String,
    pub table: String,
    /// `None` for an unchunked table.
    pub chunk_index: Option<u64>,
    pub filename: String,
    pub on_disk_bytes: u64,
    /// Uncompressed byte count, when known (done-marker `chunkFileBytes`
    /// or the `.idx` sidecar).
    pub raw_bytes: Option<u64>,
}

/// One table within a schema.
#[derive(Debug, Clone)]
pub struct Table {
    pub schema: String,
    pub name: String,
    pub basename: String,
    pub chunks: Vec<Chunk>,
    pub chunked: bool,
    pub last_chunk_seen: bool,
    pub compression: Compression,
    pub has_primary_key: bool,
    pub deferred_index_statements: Vec<String>,
    pub histograms: Vec<Histogram>,
    pub has_triggers: bool,
    pub md_done: bool,
    pub indexes_scheduled: bool,
    pub indexes_created: bool,
    pub analyze_scheduled: bool,
    /// The producer marked this table as containing no rows: it must
    /// never be scheduled for data load, even if stray chunk files
    /// surface during a rescan.
    pub no_data: bool,
}

impl Table {
    pub fn new(schema: impl Into<String>, name: impl Into<String>, basename: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            basename: basename.into(),
            chunks: Vec::new(),
            chunked: false,
            last_chunk_seen: false,
            compression: Compression::None,
            has_primary_key: true,
            deferred_index_statements: Vec::new(),
            histograms: Vec::new(),
            has_triggers: false,
            md_done: false,
            indexes_scheduled: false,
            indexes_created: false,
            analyze_scheduled: false,
            no_data: false,
        }
    }

    pub fn key(&self) -> (String, String) {
        (self.schema.clone(), self.name.clone())
    }

    /// Total on-disk bytes across all currently-known chunks.
    pub fn total_chunk_bytes(&self) -> u64 {
        self.chunks.iter().map(|c| c.on_disk_bytes).sum()
    }

    /// Invariant: once `last_chunk_seen`, the chunk vector is final and
    /// dense `[0..N-1]`.
    pub fn chunk_count_is_final(&self) -> bool {
        self.last_chunk_seen
    }
}
