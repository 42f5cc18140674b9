use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::dump::DeferIndexMode;

/// `analyze_tables` option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalyzeMode {
    Off,
    On,
    Histogram,
}

impl Default for AnalyzeMode {
    fn default() -> Self {
        AnalyzeMode::Off
    }
}

fn default_threads() -> usize {
    4
}

fn default_true() -> bool {
    true
}

/// Coordinator configuration. Deliberately a plain
/// `Deserialize` struct independent of any CLI flag parser: the shell that
/// builds it (flags, config file, embedding application) is out of scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderOptions {
    pub threads: usize,
    pub load_data: bool,
    pub load_ddl: bool,
    pub load_users: bool,
    pub load_indexes: bool,
    pub defer_table_indexes: DeferIndexMode,
    pub analyze_tables: AnalyzeMode,
    pub dry_run: bool,
    pub force: bool,
    pub reset_progress: bool,
    pub progress_file: Option<PathBuf>,
    pub include_schemas: Vec<String>,
    pub exclude_schemas: Vec<String>,
    pub include_tables: Vec<String>,
    pub exclude_tables: Vec<String>,
    pub character_set: Option<String>,
    pub skip_binlog: bool,
    pub ignore_existing_objects: bool,
    pub ignore_version: bool,
    pub wait_dump_timeout: u64,
    pub target_schema: Option<String>,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            load_data: default_true(),
            load_ddl: default_true(),
            load_users: default_true(),
            load_indexes: default_true(),
            defer_table_indexes: DeferIndexMode::default(),
            analyze_tables: AnalyzeMode::default(),
            dry_run: false,
            force: false,
            reset_progress: false,
            progress_file: None,
            include_schemas: Vec::new(),
            exclude_schemas: Vec::new(),
            include_tables: Vec::new(),
            exclude_tables: Vec::new(),
            character_set: None,
            skip_binlog: false,
            ignore_existing_objects: false,
            ignore_version: false,
            wait_dump_timeout: 0,
            target_schema: None,
        }
    }
}

impl LoaderOptions {
    /// A table is included iff it is not excluded, its schema is not
    /// excluded, and either no include sets are given, or its schema is
    /// included, or it is itself included.
    pub fn table_included(&self, schema: &str, table: &str) -> bool {
        let fq = format!("{schema}.{table}");
        if self.exclude_tables.iter().any(|t| t == &fq) {
            return false;
        }
        if self.exclude_schemas.iter().any(|s| s == schema) {
            return false;
        }
        if self.include_schemas.is_empty() && self.include_tables.is_empty() {
            return true;
        }
        self.include_schemas.iter().any(|s| s == schema) || self.include_tables.iter().any(|t| t == &fq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_filters_includes_everything() {
        let opts = LoaderOptions::default();
        assert!(opts.table_included("s", "t"));
    }

    #[test]
    fn exclude_table_wins_over_include_schema() {
        let mut opts = LoaderOptions::default();
        opts.include_schemas.push("s".into());
        opts.exclude_tables.push("s.t".into());
        assert!(!opts.table_included("s", "t"));
        assert!(opts.table_included("s", "u"));
    }

    #[test]
    fn include_table_admits_despite_schema_not_listed() {
        let mut opts = LoaderOptions::default();
        opts.include_schemas.push("other".into());
        opts.include_tables.push("s.t".into());
        assert!(opts.table_included("s", "t"));
        assert!(!opts.table_included("s", "u"));
    }

    #[test]
    fn exclude_schema_wins_over_include_table() {
        let mut opts = LoaderOptions::default();
        opts.exclude_schemas.push("s".into());
        opts.include_tables.push("s.t".into());
        assert!(!opts.table_included("s", "t"));
    }
}
