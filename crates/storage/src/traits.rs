use async_trait::async_trait;

use mapplan_core::{
    ids::*,
    planting::{BaseLayerImage, PlantingDto, PlantingMove, PlantingTransform},
};

use crate::error::BackendError;

/// Persistence calls an action's `execute` delegates to.
///
/// Every mutating call carries the id of the action that caused it so the
/// server side can attribute the change when it broadcasts it. Implementations
/// must tolerate the same action being executed more than once (redo re-sends
/// the original action id).
#[async_trait]
pub trait MapBackend: Send + Sync {
    async fn create_plantings(
        &self,
        map_id: MapId,
        action_id: ActionId,
        plantings: &[PlantingDto],
    ) -> Result<Vec<PlantingDto>, BackendError>;

    async fn move_plantings(
        &self,
        map_id: MapId,
        action_id: ActionId,
        moves: &[PlantingMove],
    ) -> Result<Vec<PlantingDto>, BackendError>;

    async fn transform_plantings(
        &self,
        map_id: MapId,
        action_id: ActionId,
        transforms: &[PlantingTransform],
    ) -> Result<Vec<PlantingDto>, BackendError>;

    async fn delete_plantings(
        &self,
        map_id: MapId,
        action_id: ActionId,
        ids: &[EntityId],
    ) -> Result<(), BackendError>;

    async fn create_base_layer_image(
        &self,
        map_id: MapId,
        action_id: ActionId,
        image: &BaseLayerImage,
    ) -> Result<BaseLayerImage, BackendError>;

    async fn update_base_layer_image(
        &self,
        map_id: MapId,
        action_id: ActionId,
        image: &BaseLayerImage,
    ) -> Result<BaseLayerImage, BackendError>;

    async fn delete_base_layer_image(
        &self,
        map_id: MapId,
        action_id: ActionId,
        id: EntityId,
    ) -> Result<(), BackendError>;

    /// Initial content of a plants layer, for hydration.
    async fn find_plantings(
        &self,
        map_id: MapId,
        layer_id: LayerId,
    ) -> Result<Vec<PlantingDto>, BackendError>;

    /// Images of a base layer, for hydration.
    async fn find_base_layer_images(
        &self,
        map_id: MapId,
        layer_id: LayerId,
    ) -> Result<Vec<BaseLayerImage>, BackendError>;
}

/// One row of the append-only action log.
#[derive(Debug, Clone)]
pub struct ActionLogRecord {
    pub rowid: i64,
    pub map_id: MapId,
    pub action_id: ActionId,
    pub edit_type: String,
    pub edit: mapplan_core::MapEdit,
}
