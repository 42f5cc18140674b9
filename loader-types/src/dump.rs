use serde::{Deserialize, Serialize};

/// Major.minor version of a dump format, or of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Highest dump format version this loader understands.
    pub const SUPPORTED: Version = Version::new(2, 0);

    /// Rejects a dump whose major is newer, or whose minor is newer within
    /// the same major.
    pub fn is_supported(self) -> bool {
        self.major < Self::SUPPORTED.major
            || (self.major == Self::SUPPORTED.major && self.minor <= Self::SUPPORTED.minor)
    }
}

/// Lifecycle of a dump as observed by the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpStatus {
    /// No root metadata has been read yet.
    Invalid,
    /// Root metadata present, done-marker absent.
    Dumping,
    /// Done-marker present.
    Complete,
}

/// How a deferred index is selected out of a `CREATE TABLE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeferIndexMode {
    Off,
    All,
    Fulltext,
}

impl Default for DeferIndexMode {
    fn default() -> Self {
        DeferIndexMode::Fulltext
    }
}

/// Process-wide aggregate describing one producer artifact.
#[derive(Debug, Clone)]
pub struct Dump {
    pub dump_version: Version,
    pub source_server_version: Version,
    pub default_charset: String,
    pub tz_utc: bool,
    pub compatibility_flags: Vec<String>,
    pub defer_table_indexes: DeferIndexMode,
    pub table_only: bool,
    pub total_uncompressed_bytes: u64,

    pub status: DumpStatus,
}

impl Dump {
    pub fn new(
        dump_version: Version,
        source_server_version: Version,
        default_charset: String,
        tz_utc: bool,
    ) -> Self {
        Self {
            dump_version,
            source_server_version,
            default_charset,
            tz_utc,
            compatibility_flags: Vec::new(),
            defer_table_indexes: DeferIndexMode::default(),
            table_only: false,
            total_uncompressed_bytes: 0,
            status: DumpStatus::Invalid,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == DumpStatus::Complete
    }
}
