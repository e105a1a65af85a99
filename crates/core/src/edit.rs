use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::EntityId;
use crate::planting::{BaseLayerImage, PlantingDto, PlantingMove, PlantingTransform};

/// The serializable description of one edit to a map.
///
/// Serialized as `{ "type": "<Variant>", "payload": ... }`, the shape the
/// realtime channel broadcasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum MapEdit {
    CreatePlanting(Vec<PlantingDto>),
    DeletePlanting(Vec<EntityId>),
    MovePlanting(Vec<PlantingMove>),
    TransformPlanting(Vec<PlantingTransform>),
    CreateBaseLayerImage(BaseLayerImage),
    UpdateBaseLayerImage(BaseLayerImage),
    DeleteBaseLayerImage(EntityId),
}

impl MapEdit {
    /// Ids of the map objects this edit touches, in payload order.
    pub fn entity_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = match self {
            Self::CreatePlanting(plantings) => plantings.iter().map(|p| p.id).collect(),
            Self::DeletePlanting(ids) => ids.clone(),
            Self::MovePlanting(moves) => moves.iter().map(|m| m.id).collect(),
            Self::TransformPlanting(transforms) => transforms.iter().map(|t| t.id).collect(),
            Self::CreateBaseLayerImage(image) | Self::UpdateBaseLayerImage(image) => vec![image.id],
            Self::DeleteBaseLayerImage(id) => vec![*id],
        };
        // Ordered set: keep the first occurrence of each id.
        let mut seen = Vec::with_capacity(ids.len());
        ids.retain(|id| {
            if seen.contains(id) {
                false
            } else {
                seen.push(*id);
                true
            }
        });
        ids
    }

    /// String name of the edit type for logs and the action log.
    pub fn edit_type_name(&self) -> &'static str {
        match self {
            Self::CreatePlanting(_) => "CreatePlanting",
            Self::DeletePlanting(_) => "DeletePlanting",
            Self::MovePlanting(_) => "MovePlanting",
            Self::TransformPlanting(_) => "TransformPlanting",
            Self::CreateBaseLayerImage(_) => "CreateBaseLayerImage",
            Self::UpdateBaseLayerImage(_) => "UpdateBaseLayerImage",
            Self::DeleteBaseLayerImage(_) => "DeleteBaseLayerImage",
        }
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, CoreError> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, CoreError> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
