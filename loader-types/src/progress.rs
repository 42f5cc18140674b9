use serde::{Deserialize, Serialize};

/// Kind of milestone recorded in the progress journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressOp {
    #[serde(rename = "SCHEMA-DDL")]
    SchemaDdl,
    #[serde(rename = "TABLE-DDL")]
    TableDdl,
    #[serde(rename = "TRIGGERS-DDL")]
    TriggersDdl,
    #[serde(rename = "TABLE-DATA")]
    TableData,
}

impl ProgressOp {
    pub fn as_str(self) -> &'static str {
        match self {
            ProgressOp::SchemaDdl => "SCHEMA-DDL",
            ProgressOp::TableDdl => "TABLE-DDL",
            ProgressOp::TriggersDdl => "TRIGGERS-DDL",
            ProgressOp::TableData => "TABLE-DATA",
        }
    }
}

/// One line of the newline-delimited-JSON progress journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub op: ProgressOp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk: Option<i64>,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_bytes: Option<u64>,
}

/// Reconstructed status of one journal key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Pending,
    Interrupted,
    Done,
}
