use thiserror::Error;

/// The kinds of error a load run can produce.
///
/// Fatal setup errors abort before any worker starts. Per-entity DDL
/// errors are either fatal or, under `force`, downgrade to a skip.
/// Per-worker task errors always end that worker. Recoverable errors
/// never reach the coordinator as a failure. `Interrupted` is a second
/// interrupt signal cutting a chunk load short, not a real failure.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("{0}")]
    SetupFatal(String),

    #[error("error loading DDL for {schema}{}: {message}", table.as_deref().map(|t| format!(".{t}")).unwrap_or_default())]
    EntityDdl {
        schema: String,
        table: Option<String>,
        message: String,
    },

    #[error("worker task failed ({kind}): {message}")]
    TaskFailed { kind: &'static str, message: String },

    #[error("{0}")]
    Recoverable(String),

    /// A second interrupt signal was observed mid-import; the caller
    /// leaves the in-progress chunk unfinished rather than treating this
    /// as a task failure.
    #[error("interrupted")]
    Interrupted,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LoaderError>;
