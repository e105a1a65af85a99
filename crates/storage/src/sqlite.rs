use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, Transaction};
use tokio::sync::Mutex;

use mapplan_core::{
    edit::MapEdit,
    ids::*,
    planting::{BaseLayerImage, PlantingDto, PlantingMove, PlantingTransform},
};

use crate::error::BackendError;
use crate::traits::{ActionLogRecord, MapBackend};

/// Convert Vec<u8> to fixed-size array with proper error handling.
fn to_array<const N: usize>(v: Vec<u8>, label: &str) -> Result<[u8; N], BackendError> {
    v.try_into()
        .map_err(|_| BackendError::Serialization(format!("invalid {label} length")))
}

const PLANTING_COLUMNS: &str =
    "id, layer_id, plant_id, x, y, width, height, rotation, scale_x, scale_y";

const IMAGE_COLUMNS: &str = "id, layer_id, rotation, scale, path";

/// A map backend persisting to SQLite.
///
/// Queries run on the blocking pool. The connection lock is fair, so calls
/// reach the database in the order they asked for it.
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    pub fn open(path: &str) -> Result<Self, BackendError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        tracing::debug!("opened map database at {}", path);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self, BackendError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` inside one transaction, committing on success.
    async fn with_tx<T, F>(&self, f: F) -> Result<T, BackendError>
    where
        T: Send + 'static,
        F: FnOnce(&Transaction) -> Result<T, BackendError> + Send + 'static,
    {
        let guard = self.conn.clone().lock_owned().await;
        tokio::task::spawn_blocking(move || -> Result<T, BackendError> {
            let mut conn = guard;
            let tx = conn.transaction()?;
            let result = f(&tx)?;
            tx.commit()?;
            Ok(result)
        })
        .await?
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, BackendError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, BackendError> + Send + 'static,
    {
        let guard = self.conn.clone().lock_owned().await;
        tokio::task::spawn_blocking(move || f(&*guard)).await?
    }

    /// Every edit persisted for `map_id`, oldest first.
    pub async fn action_log(&self, map_id: MapId) -> Result<Vec<ActionLogRecord>, BackendError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT rowid, map_id, action_id, edit_type, edit FROM action_log WHERE map_id = ?1 ORDER BY rowid",
            )?;
            let rows = stmt.query_map([map_id.get()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i32>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Vec<u8>>(4)?,
                ))
            })?;

            let mut records = Vec::new();
            for row in rows {
                let (rowid, map_id, action_id, edit_type, edit) = row?;
                records.push(ActionLogRecord {
                    rowid,
                    map_id: MapId::new(map_id),
                    action_id: ActionId::from_bytes(to_array::<16>(action_id, "action_id")?),
                    edit_type,
                    edit: MapEdit::from_msgpack(&edit)?,
                });
            }
            Ok(records)
        })
        .await
    }

    /// Number of plantings stored for `map_id` across all layers.
    pub async fn planting_count(&self, map_id: MapId) -> Result<u64, BackendError> {
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM plantings WHERE map_id = ?1",
                [map_id.get()],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
    }
}

fn log_edit(
    tx: &Transaction,
    map_id: MapId,
    action_id: ActionId,
    edit: &MapEdit,
) -> Result<(), BackendError> {
    tx.execute(
        "INSERT INTO action_log (map_id, action_id, edit_type, edit) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            map_id.get(),
            action_id.as_bytes().as_slice(),
            edit.edit_type_name(),
            edit.to_msgpack()?,
        ],
    )?;
    Ok(())
}

fn read_planting(row: &rusqlite::Row) -> Result<PlantingDto, BackendError> {
    let id: Vec<u8> = row.get(0)?;
    Ok(PlantingDto {
        id: EntityId::from_bytes(to_array::<16>(id, "planting id")?),
        layer_id: LayerId::new(row.get(1)?),
        plant_id: PlantId::new(row.get(2)?),
        x: row.get(3)?,
        y: row.get(4)?,
        width: row.get(5)?,
        height: row.get(6)?,
        rotation: row.get::<_, f64>(7)? as f32,
        scale_x: row.get::<_, f64>(8)? as f32,
        scale_y: row.get::<_, f64>(9)? as f32,
    })
}

fn read_image(row: &rusqlite::Row) -> Result<BaseLayerImage, BackendError> {
    let id: Vec<u8> = row.get(0)?;
    Ok(BaseLayerImage {
        id: EntityId::from_bytes(to_array::<16>(id, "image id")?),
        layer_id: LayerId::new(row.get(1)?),
        rotation: row.get::<_, f64>(2)? as f32,
        scale: row.get::<_, f64>(3)? as f32,
        path: row.get(4)?,
    })
}

fn get_planting(
    conn: &Connection,
    map_id: MapId,
    id: EntityId,
) -> Result<Option<PlantingDto>, BackendError> {
    let sql = format!("SELECT {PLANTING_COLUMNS} FROM plantings WHERE id = ?1 AND map_id = ?2");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(rusqlite::params![id.as_bytes().as_slice(), map_id.get()])?;
    match rows.next()? {
        Some(row) => Ok(Some(read_planting(row)?)),
        None => Ok(None),
    }
}

fn require_planting(
    conn: &Connection,
    map_id: MapId,
    id: EntityId,
) -> Result<PlantingDto, BackendError> {
    get_planting(conn, map_id, id)?
        .ok_or_else(|| BackendError::NotFound(format!("planting {id}")))
}

fn upsert_image(
    tx: &Transaction,
    map_id: MapId,
    action_id: ActionId,
    image: &BaseLayerImage,
) -> Result<(), BackendError> {
    tx.execute(
        "INSERT OR REPLACE INTO base_layer_images (id, map_id, layer_id, rotation, scale, path, last_action) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            image.id.as_bytes().as_slice(),
            map_id.get(),
            image.layer_id.get(),
            image.rotation as f64,
            image.scale as f64,
            image.path,
            action_id.as_bytes().as_slice(),
        ],
    )?;
    Ok(())
}

#[async_trait]
impl MapBackend for SqliteBackend {
    async fn create_plantings(
        &self,
        map_id: MapId,
        action_id: ActionId,
        plantings: &[PlantingDto],
    ) -> Result<Vec<PlantingDto>, BackendError> {
        let plantings = plantings.to_vec();
        self.with_tx(move |tx| {
            for p in &plantings {
                // Replace keeps a re-sent create (redo) idempotent.
                tx.execute(
                    "INSERT OR REPLACE INTO plantings (id, map_id, layer_id, plant_id, x, y, width, height, rotation, scale_x, scale_y, last_action) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    rusqlite::params![
                        p.id.as_bytes().as_slice(),
                        map_id.get(),
                        p.layer_id.get(),
                        p.plant_id.get(),
                        p.x,
                        p.y,
                        p.width,
                        p.height,
                        p.rotation as f64,
                        p.scale_x as f64,
                        p.scale_y as f64,
                        action_id.as_bytes().as_slice(),
                    ],
                )?;
            }
            let stored = plantings
                .iter()
                .map(|p| require_planting(tx, map_id, p.id))
                .collect::<Result<Vec<_>, _>>()?;
            log_edit(tx, map_id, action_id, &MapEdit::CreatePlanting(plantings))?;
            Ok(stored)
        })
        .await
    }

    async fn move_plantings(
        &self,
        map_id: MapId,
        action_id: ActionId,
        moves: &[PlantingMove],
    ) -> Result<Vec<PlantingDto>, BackendError> {
        let moves = moves.to_vec();
        self.with_tx(move |tx| {
            for m in &moves {
                let changed = tx.execute(
                    "UPDATE plantings SET x = ?1, y = ?2, last_action = ?3 WHERE id = ?4 AND map_id = ?5",
                    rusqlite::params![
                        m.x,
                        m.y,
                        action_id.as_bytes().as_slice(),
                        m.id.as_bytes().as_slice(),
                        map_id.get(),
                    ],
                )?;
                if changed == 0 {
                    return Err(BackendError::NotFound(format!("planting {}", m.id)));
                }
            }
            let stored = moves
                .iter()
                .map(|m| require_planting(tx, map_id, m.id))
                .collect::<Result<Vec<_>, _>>()?;
            log_edit(tx, map_id, action_id, &MapEdit::MovePlanting(moves))?;
            Ok(stored)
        })
        .await
    }

    async fn transform_plantings(
        &self,
        map_id: MapId,
        action_id: ActionId,
        transforms: &[PlantingTransform],
    ) -> Result<Vec<PlantingDto>, BackendError> {
        let transforms = transforms.to_vec();
        self.with_tx(move |tx| {
            for t in &transforms {
                let changed = tx.execute(
                    "UPDATE plantings SET x = ?1, y = ?2, rotation = ?3, scale_x = ?4, scale_y = ?5, last_action = ?6 WHERE id = ?7 AND map_id = ?8",
                    rusqlite::params![
                        t.x,
                        t.y,
                        t.rotation as f64,
                        t.scale_x as f64,
                        t.scale_y as f64,
                        action_id.as_bytes().as_slice(),
                        t.id.as_bytes().as_slice(),
                        map_id.get(),
                    ],
                )?;
                if changed == 0 {
                    return Err(BackendError::NotFound(format!("planting {}", t.id)));
                }
            }
            let stored = transforms
                .iter()
                .map(|t| require_planting(tx, map_id, t.id))
                .collect::<Result<Vec<_>, _>>()?;
            log_edit(tx, map_id, action_id, &MapEdit::TransformPlanting(transforms))?;
            Ok(stored)
        })
        .await
    }

    async fn delete_plantings(
        &self,
        map_id: MapId,
        action_id: ActionId,
        ids: &[EntityId],
    ) -> Result<(), BackendError> {
        let ids = ids.to_vec();
        self.with_tx(move |tx| {
            // Deleting an absent planting is not an error.
            for id in &ids {
                tx.execute(
                    "DELETE FROM plantings WHERE id = ?1 AND map_id = ?2",
                    rusqlite::params![id.as_bytes().as_slice(), map_id.get()],
                )?;
            }
            log_edit(tx, map_id, action_id, &MapEdit::DeletePlanting(ids))
        })
        .await
    }

    async fn create_base_layer_image(
        &self,
        map_id: MapId,
        action_id: ActionId,
        image: &BaseLayerImage,
    ) -> Result<BaseLayerImage, BackendError> {
        let image = image.clone();
        self.with_tx(move |tx| {
            upsert_image(tx, map_id, action_id, &image)?;
            log_edit(tx, map_id, action_id, &MapEdit::CreateBaseLayerImage(image.clone()))?;
            Ok(image)
        })
        .await
    }

    async fn update_base_layer_image(
        &self,
        map_id: MapId,
        action_id: ActionId,
        image: &BaseLayerImage,
    ) -> Result<BaseLayerImage, BackendError> {
        let image = image.clone();
        self.with_tx(move |tx| {
            let exists: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM base_layer_images WHERE id = ?1 AND map_id = ?2",
                    rusqlite::params![image.id.as_bytes().as_slice(), map_id.get()],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_none() {
                return Err(BackendError::NotFound(format!("base layer image {}", image.id)));
            }
            upsert_image(tx, map_id, action_id, &image)?;
            log_edit(tx, map_id, action_id, &MapEdit::UpdateBaseLayerImage(image.clone()))?;
            Ok(image)
        })
        .await
    }

    async fn delete_base_layer_image(
        &self,
        map_id: MapId,
        action_id: ActionId,
        id: EntityId,
    ) -> Result<(), BackendError> {
        self.with_tx(move |tx| {
            tx.execute(
                "DELETE FROM base_layer_images WHERE id = ?1 AND map_id = ?2",
                rusqlite::params![id.as_bytes().as_slice(), map_id.get()],
            )?;
            log_edit(tx, map_id, action_id, &MapEdit::DeleteBaseLayerImage(id))
        })
        .await
    }

    async fn find_plantings(
        &self,
        map_id: MapId,
        layer_id: LayerId,
    ) -> Result<Vec<PlantingDto>, BackendError> {
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {PLANTING_COLUMNS} FROM plantings WHERE map_id = ?1 AND layer_id = ?2 ORDER BY id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(rusqlite::params![map_id.get(), layer_id.get()])?;
            let mut plantings = Vec::new();
            while let Some(row) = rows.next()? {
                plantings.push(read_planting(row)?);
            }
            Ok(plantings)
        })
        .await
    }

    async fn find_base_layer_images(
        &self,
        map_id: MapId,
        layer_id: LayerId,
    ) -> Result<Vec<BaseLayerImage>, BackendError> {
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {IMAGE_COLUMNS} FROM base_layer_images WHERE map_id = ?1 AND layer_id = ?2 ORDER BY id"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(rusqlite::params![map_id.get(), layer_id.get()])?;
            let mut images = Vec::new();
            while let Some(row) = rows.next()? {
                images.push(read_image(row)?);
            }
            Ok(images)
        })
        .await
    }
}
