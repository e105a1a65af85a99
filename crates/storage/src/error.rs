use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rejected by backend: {0}")]
    Rejected(String),

    #[error("backend connection lock poisoned")]
    LockPoisoned,

    #[error("database task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("core error: {0}")]
    Core(#[from] mapplan_core::CoreError),
}
