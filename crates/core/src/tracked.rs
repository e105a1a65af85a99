use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::{EntityId, LayerId};
use crate::layer::LayerType;
use crate::planting::{BaseLayerImage, PlantingDto};

/// Map content subject to undo/redo. Only actions may produce a new value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedMapState {
    pub layers: TrackedLayers,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedLayers {
    pub plants: TrackedPlantLayerState,
    pub base: TrackedBaseLayerState,
    /// Every layer other than plants and base.
    pub other: BTreeMap<LayerType, TrackedLayerState>,
}

impl Default for TrackedLayers {
    fn default() -> Self {
        let other = LayerType::ALL
            .into_iter()
            .filter(|t| !matches!(t, LayerType::Plants | LayerType::Base))
            .map(|t| (t, TrackedLayerState::default()))
            .collect();
        Self {
            plants: TrackedPlantLayerState::default(),
            base: TrackedBaseLayerState::default(),
            other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedPlantLayerState {
    pub layer_id: Option<LayerId>,
    pub objects: BTreeMap<EntityId, PlantingDto>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedBaseLayerState {
    pub layer_id: Option<LayerId>,
    pub image: Option<BaseLayerImage>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedLayerState {
    pub layer_id: Option<LayerId>,
    pub objects: Vec<ObjectState>,
}

/// A generic shape on one of the layers without dedicated content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectState {
    pub id: EntityId,
    #[serde(rename = "type")]
    pub object_type: String,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub rotation: f32,
    pub scale_x: f32,
    pub scale_y: f32,
}

impl TrackedMapState {
    pub fn planting(&self, id: EntityId) -> Option<&PlantingDto> {
        self.layers.plants.objects.get(&id)
    }

    pub fn plantings(&self) -> impl Iterator<Item = &PlantingDto> {
        self.layers.plants.objects.values()
    }

    pub fn base_image(&self) -> Option<&BaseLayerImage> {
        self.layers.base.image.as_ref()
    }

    /// The layer id recorded for `layer_type`, if the layer has been loaded.
    pub fn layer_id(&self, layer_type: LayerType) -> Option<LayerId> {
        match layer_type {
            LayerType::Plants => self.layers.plants.layer_id,
            LayerType::Base => self.layers.base.layer_id,
            other => self.layers.other.get(&other).and_then(|l| l.layer_id),
        }
    }

    pub fn set_layer_id(&mut self, layer_type: LayerType, layer_id: LayerId) {
        match layer_type {
            LayerType::Plants => self.layers.plants.layer_id = Some(layer_id),
            LayerType::Base => self.layers.base.layer_id = Some(layer_id),
            other => self.layers.other.entry(other).or_default().layer_id = Some(layer_id),
        }
    }
}
