//! On-disk JSON shapes for dump metadata. These mirror the
//! producer's files closely; [`super::DumpReader`] is what turns them
//! into this crate's domain types.

use std::collections::HashMap;

use loader_types::{DeferIndexMode, Version};
use serde::Deserialize;

fn default_true() -> bool {
    true
}

/// `@.json`
#[derive(Debug, Clone, Deserialize)]
pub struct RootMetadataJson {
    pub version: Version,
    #[serde(rename = "serverVersion")]
    pub server_version: Version,
    #[serde(rename = "defaultCharacterSet")]
    pub default_character_set: String,
    #[serde(rename = "tzUtc", default)]
    pub tz_utc: bool,
    #[serde(rename = "compatibilityOptions", default)]
    pub compatibility_options: Vec<String>,
    #[serde(rename = "deferTableIndexes", default)]
    pub defer_table_indexes: DeferIndexMode,
    #[serde(rename = "tableOnly", default)]
    pub table_only: bool,
    pub schemas: Vec<String>,
    #[serde(default)]
    pub basenames: HashMap<String, String>,
}

/// `@.done.json`
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DoneMarkerJson {
    #[serde(rename = "dataBytes", default)]
    pub data_bytes: u64,
    #[serde(rename = "tableDataBytes", default)]
    pub table_data_bytes: HashMap<String, HashMap<String, u64>>,
    #[serde(rename = "chunkFileBytes", default)]
    pub chunk_file_bytes: HashMap<String, u64>,
    #[serde(default)]
    pub issues: Vec<String>,
}

/// `<schemaBase>.json`
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaMetadataJson {
    pub tables: Vec<String>,
    #[serde(default)]
    pub views: Vec<String>,
    #[serde(default)]
    pub basenames: HashMap<String, String>,
    #[serde(rename = "includesDdl", default = "default_true")]
    pub includes_ddl: bool,
    #[serde(rename = "includesViewsDdl", default)]
    pub includes_views_ddl: bool,
}

/// `<tableBase>.json`
#[derive(Debug, Clone, Deserialize)]
pub struct TableMetadataJson {
    #[serde(default)]
    pub extension: String,
    #[serde(default)]
    pub chunking: bool,
    pub compression: Option<String>,
    #[serde(rename = "primaryIndex", default)]
    pub primary_index: Option<String>,
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub histograms: Vec<HistogramJson>,
    #[serde(rename = "noData", default)]
    pub no_data: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistogramJson {
    pub column: String,
    pub buckets: u32,
}
