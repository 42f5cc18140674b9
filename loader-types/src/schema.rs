/// One schema (database) within a dump.
#[derive(Debug, Clone)]
pub struct Schema {
    pub name: String,
    pub basename: String,
    pub tables: Vec<String>,
    pub views: Vec<String>,
    pub has_sql: bool,
    pub has_view_sql: bool,
    pub sql_seen: bool,
    pub md_done: bool,
    /// `ALTER TABLE ... ADD CONSTRAINT ... FOREIGN KEY` statements deferred
    /// from table DDL preprocessing, replayed on `on_schema_end`.
    pub deferred_fk_statements: Vec<String>,
}

impl Schema {
    pub fn new(name: impl Into<String>, basename: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            basename: basename.into(),
            tables: Vec::new(),
            views: Vec::new(),
            has_sql: false,
            has_view_sql: false,
            sql_seen: false,
            md_done: false,
            deferred_fk_statements: Vec::new(),
        }
    }
}

/// A view, emitted twice: once as a placeholder table, once as the final
/// `CREATE VIEW`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct View {
    pub schema: String,
    pub name: String,
}
