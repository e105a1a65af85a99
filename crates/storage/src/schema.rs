use rusqlite::Connection;

use crate::error::BackendError;

pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection) -> Result<(), BackendError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
    ",
    )?;
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, unixepoch())",
        [SCHEMA_VERSION],
    )?;
    Ok(())
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS plantings (
    id BLOB NOT NULL CHECK (length(id) = 16),
    map_id INTEGER NOT NULL,
    layer_id INTEGER NOT NULL,
    plant_id INTEGER NOT NULL,
    x INTEGER NOT NULL,
    y INTEGER NOT NULL,
    width INTEGER NOT NULL,
    height INTEGER NOT NULL,
    rotation REAL NOT NULL,
    scale_x REAL NOT NULL,
    scale_y REAL NOT NULL,
    last_action BLOB NOT NULL CHECK (length(last_action) = 16),
    PRIMARY KEY (map_id, id)
);
CREATE INDEX IF NOT EXISTS idx_plantings_layer ON plantings (map_id, layer_id);

CREATE TABLE IF NOT EXISTS base_layer_images (
    id BLOB NOT NULL CHECK (length(id) = 16),
    map_id INTEGER NOT NULL,
    layer_id INTEGER NOT NULL,
    rotation REAL NOT NULL,
    scale REAL NOT NULL,
    path TEXT NOT NULL,
    last_action BLOB NOT NULL CHECK (length(last_action) = 16),
    PRIMARY KEY (map_id, id)
);
CREATE INDEX IF NOT EXISTS idx_base_layer_images_layer ON base_layer_images (map_id, layer_id);

CREATE TABLE IF NOT EXISTS action_log (
    rowid INTEGER PRIMARY KEY,
    map_id INTEGER NOT NULL,
    action_id BLOB NOT NULL CHECK (length(action_id) = 16),
    edit_type TEXT NOT NULL,
    edit BLOB NOT NULL,
    received_at INTEGER NOT NULL DEFAULT (CAST(unixepoch('now','subsec') * 1000 AS INTEGER))
);
CREATE INDEX IF NOT EXISTS idx_action_log_map ON action_log (map_id, rowid);
CREATE INDEX IF NOT EXISTS idx_action_log_action ON action_log (action_id);
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_version_is_recorded_once() -> Result<(), BackendError> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        init_schema(&conn)?;
        let versions: Vec<i32> = conn
            .prepare("SELECT version FROM schema_version")?
            .query_map([], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        assert_eq!(versions, vec![SCHEMA_VERSION]);
        Ok(())
    }
}
