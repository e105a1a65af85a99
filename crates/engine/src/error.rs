use mapplan_core::CoreError;
use mapplan_storage::BackendError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("no map loaded")]
    NoActiveMap,

    #[error("invalid configuration: {0}")]
    Config(String),
}
