use serde::{Deserialize, Serialize};

use crate::ids::{EntityId, LayerId, PlantId};

/// A plant placed on a plants layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlantingDto {
    pub id: EntityId,
    pub layer_id: LayerId,
    pub plant_id: PlantId,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
}

impl PlantingDto {
    /// A planting of `plant_id` at (`x`, `y`) with no rotation or scaling.
    pub fn new(
        id: EntityId,
        layer_id: LayerId,
        plant_id: PlantId,
        x: i32,
        y: i32,
        size: i32,
    ) -> Self {
        Self {
            id,
            layer_id,
            plant_id,
            x,
            y,
            width: size,
            height: size,
            rotation: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }

    pub fn position(&self) -> PlantingMove {
        PlantingMove {
            id: self.id,
            x: self.x,
            y: self.y,
        }
    }

    pub fn transform(&self) -> PlantingTransform {
        PlantingTransform {
            id: self.id,
            x: self.x,
            y: self.y,
            rotation: self.rotation,
            scale_x: self.scale_x,
            scale_y: self.scale_y,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlantingMove {
    pub id: EntityId,
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlantingTransform {
    pub id: EntityId,
    pub x: i32,
    pub y: i32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
}

/// The plant a user has picked in the search panel and is about to place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlantSummary {
    pub id: PlantId,
    pub unique_name: String,
    pub common_name_en: Option<String>,
    /// Default footprint in canvas units.
    pub spread: i32,
}

/// The background image of the base layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseLayerImage {
    pub id: EntityId,
    pub layer_id: LayerId,
    pub rotation: f32,
    pub scale: f32,
    pub path: String,
}
