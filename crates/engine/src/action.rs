//! User edits as self-contained commands.
//!
//! An [`Action`] pairs a client-generated [`ActionId`] with the [`MapEdit`]
//! it performs. `reverse` and `apply` are pure functions over
//! [`TrackedMapState`]; `execute` is the only place that talks to the backend.

use mapplan_core::{
    edit::MapEdit,
    ids::*,
    planting::{BaseLayerImage, PlantSummary, PlantingDto, PlantingMove, PlantingTransform},
    tracked::TrackedMapState,
    untracked::UntrackedMapState,
    LayerType, RemoteEvent,
};
use mapplan_storage::{BackendError, MapBackend};

/// What a backend call returned for an executed action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutput {
    Plantings(Vec<PlantingDto>),
    BaseLayerImage(BaseLayerImage),
    Deleted(Vec<EntityId>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    action_id: ActionId,
    edit: MapEdit,
}

impl Action {
    /// Wrap `edit` with a fresh action id.
    pub fn new(edit: MapEdit) -> Self {
        Self {
            action_id: ActionId::new(),
            edit,
        }
    }

    pub fn with_id(action_id: ActionId, edit: MapEdit) -> Self {
        Self { action_id, edit }
    }

    /// The action an incoming realtime event describes, keeping its id so it
    /// can be matched against the ledger.
    pub fn from_remote(event: RemoteEvent) -> Self {
        Self::with_id(event.action_id, event.edit)
    }

    pub fn action_id(&self) -> ActionId {
        self.action_id
    }

    pub fn edit(&self) -> &MapEdit {
        &self.edit
    }

    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.edit.entity_ids()
    }

    // ========================================================================
    // Constructors
    // ========================================================================

    pub fn create_plantings(plantings: Vec<PlantingDto>) -> Self {
        Self::new(MapEdit::CreatePlanting(plantings))
    }

    pub fn delete_plantings(ids: Vec<EntityId>) -> Self {
        Self::new(MapEdit::DeletePlanting(ids))
    }

    pub fn move_plantings(moves: Vec<PlantingMove>) -> Self {
        Self::new(MapEdit::MovePlanting(moves))
    }

    pub fn transform_plantings(transforms: Vec<PlantingTransform>) -> Self {
        Self::new(MapEdit::TransformPlanting(transforms))
    }

    pub fn create_base_layer_image(image: BaseLayerImage) -> Self {
        Self::new(MapEdit::CreateBaseLayerImage(image))
    }

    pub fn update_base_layer_image(image: BaseLayerImage) -> Self {
        Self::new(MapEdit::UpdateBaseLayerImage(image))
    }

    pub fn delete_base_layer_image(id: EntityId) -> Self {
        Self::new(MapEdit::DeleteBaseLayerImage(id))
    }

    /// Place the plant currently selected for planting at (`x`, `y`).
    ///
    /// The planting goes onto the selected layer, or the loaded plants layer
    /// when no layer is selected. Returns `None` when there is no plant
    /// selected or no plants layer to place it on.
    pub fn plant_selected_at(
        tracked: &TrackedMapState,
        untracked: &UntrackedMapState,
        x: i32,
        y: i32,
    ) -> Option<Self> {
        let plant: &PlantSummary = untracked.plants.selected_plant_for_planting.as_ref()?;
        let layer_id = untracked
            .selected_layer
            .as_ref()
            .filter(|l| l.layer_type == LayerType::Plants)
            .map(|l| l.id)
            .or(tracked.layer_id(LayerType::Plants))?;
        let planting = PlantingDto::new(EntityId::new(), layer_id, plant.id, x, y, plant.spread);
        Some(Self::create_plantings(vec![planting]))
    }

    // ========================================================================
    // Command contract
    // ========================================================================

    /// The action that undoes this one, computed from the state as it is
    /// immediately before [`Action::apply`] runs. `None` if the edit cannot be
    /// reversed from this state.
    pub fn reverse(&self, state: &TrackedMapState) -> Option<Action> {
        let edit = match &self.edit {
            MapEdit::CreatePlanting(plantings) => {
                // Recreating an existing planting would overwrite it; a plain
                // delete could not restore what was there.
                if plantings.iter().any(|p| state.planting(p.id).is_some()) {
                    return None;
                }
                MapEdit::DeletePlanting(plantings.iter().map(|p| p.id).collect())
            }

            MapEdit::DeletePlanting(ids) => {
                let existing: Vec<PlantingDto> = ids
                    .iter()
                    .filter_map(|id| state.planting(*id).cloned())
                    .collect();
                if existing.is_empty() {
                    return None;
                }
                MapEdit::CreatePlanting(existing)
            }

            MapEdit::MovePlanting(moves) => {
                let previous: Vec<PlantingMove> = moves
                    .iter()
                    .filter_map(|m| state.planting(m.id).map(PlantingDto::position))
                    .collect();
                if previous.is_empty() {
                    return None;
                }
                MapEdit::MovePlanting(previous)
            }

            MapEdit::TransformPlanting(transforms) => {
                let previous: Vec<PlantingTransform> = transforms
                    .iter()
                    .filter_map(|t| state.planting(t.id).map(PlantingDto::transform))
                    .collect();
                if previous.is_empty() {
                    return None;
                }
                MapEdit::TransformPlanting(previous)
            }

            MapEdit::CreateBaseLayerImage(image) | MapEdit::UpdateBaseLayerImage(image) => {
                match state.base_image() {
                    Some(previous) => MapEdit::UpdateBaseLayerImage(previous.clone()),
                    None => MapEdit::DeleteBaseLayerImage(image.id),
                }
            }

            MapEdit::DeleteBaseLayerImage(id) => match state.base_image() {
                Some(previous) if previous.id == *id => {
                    MapEdit::CreateBaseLayerImage(previous.clone())
                }
                _ => return None,
            },
        };
        Some(Action::new(edit))
    }

    /// Next tracked state with this edit applied. Objects the edit refers to
    /// but the state lacks are skipped; a remote delete may have won the race.
    pub fn apply(&self, mut state: TrackedMapState) -> TrackedMapState {
        let plants = &mut state.layers.plants.objects;
        match &self.edit {
            MapEdit::CreatePlanting(plantings) => {
                for p in plantings {
                    plants.insert(p.id, p.clone());
                }
            }

            MapEdit::DeletePlanting(ids) => {
                for id in ids {
                    plants.remove(id);
                }
            }

            MapEdit::MovePlanting(moves) => {
                for m in moves {
                    if let Some(p) = plants.get_mut(&m.id) {
                        p.x = m.x;
                        p.y = m.y;
                    }
                }
            }

            MapEdit::TransformPlanting(transforms) => {
                for t in transforms {
                    if let Some(p) = plants.get_mut(&t.id) {
                        p.x = t.x;
                        p.y = t.y;
                        p.rotation = t.rotation;
                        p.scale_x = t.scale_x;
                        p.scale_y = t.scale_y;
                    }
                }
            }

            MapEdit::CreateBaseLayerImage(image) | MapEdit::UpdateBaseLayerImage(image) => {
                state.layers.base.image = Some(image.clone());
            }

            MapEdit::DeleteBaseLayerImage(id) => {
                if state.layers.base.image.as_ref().is_some_and(|i| i.id == *id) {
                    state.layers.base.image = None;
                }
            }
        }
        state
    }

    /// Persist this edit through `backend`.
    pub async fn execute(
        &self,
        backend: &dyn MapBackend,
        map_id: MapId,
    ) -> Result<ActionOutput, BackendError> {
        let id = self.action_id;
        match &self.edit {
            MapEdit::CreatePlanting(plantings) => backend
                .create_plantings(map_id, id, plantings)
                .await
                .map(ActionOutput::Plantings),
            MapEdit::DeletePlanting(ids) => {
                backend.delete_plantings(map_id, id, ids).await?;
                Ok(ActionOutput::Deleted(ids.clone()))
            }
            MapEdit::MovePlanting(moves) => backend
                .move_plantings(map_id, id, moves)
                .await
                .map(ActionOutput::Plantings),
            MapEdit::TransformPlanting(transforms) => backend
                .transform_plantings(map_id, id, transforms)
                .await
                .map(ActionOutput::Plantings),
            MapEdit::CreateBaseLayerImage(image) => backend
                .create_base_layer_image(map_id, id, image)
                .await
                .map(ActionOutput::BaseLayerImage),
            MapEdit::UpdateBaseLayerImage(image) => backend
                .update_base_layer_image(map_id, id, image)
                .await
                .map(ActionOutput::BaseLayerImage),
            MapEdit::DeleteBaseLayerImage(image_id) => {
                backend.delete_base_layer_image(map_id, id, *image_id).await?;
                Ok(ActionOutput::Deleted(vec![*image_id]))
            }
        }
    }
}
