pub mod error;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use error::BackendError;
pub use sqlite::SqliteBackend;
pub use traits::*;
