use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::{LayerId, MapId};
use crate::layer::{LayerDto, LayerType};
use crate::planting::{PlantSummary, PlantingDto};

/// View state that never enters history: selection, visibility, viewport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UntrackedMapState {
    pub map_id: Option<MapId>,
    pub selected_layer: Option<LayerDto>,
    pub tool: ToolMode,
    pub viewport: Viewport,
    pub layers: BTreeMap<LayerType, UntrackedLayerState>,
    pub plants: UntrackedPlantLayerState,
}

impl Default for UntrackedMapState {
    fn default() -> Self {
        Self {
            map_id: None,
            selected_layer: None,
            tool: ToolMode::default(),
            viewport: Viewport::default(),
            layers: LayerType::ALL
                .into_iter()
                .map(|t| (t, UntrackedLayerState::default()))
                .collect(),
            plants: UntrackedPlantLayerState::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolMode {
    #[default]
    Select,
    Place,
    Pan,
}

/// Visible canvas rectangle in map coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 1000.0,
            height: 1000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UntrackedLayerState {
    pub visible: bool,
    pub opacity: f32,
}

impl Default for UntrackedLayerState {
    fn default() -> Self {
        Self {
            visible: true,
            opacity: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UntrackedPlantLayerState {
    pub selected_plant_for_planting: Option<PlantSummary>,
    pub selected_planting: Option<PlantingDto>,
}

impl UntrackedMapState {
    pub fn update_selected_layer(&mut self, layer: LayerDto) {
        self.selected_layer = Some(layer);
    }

    pub fn selected_layer_id(&self) -> Option<LayerId> {
        self.selected_layer.as_ref().map(|l| l.id)
    }

    pub fn update_layer_visible(&mut self, layer_type: LayerType, visible: bool) {
        self.layers.entry(layer_type).or_default().visible = visible;
    }

    /// Opacity is clamped to `[0, 1]`.
    pub fn update_layer_opacity(&mut self, layer_type: LayerType, opacity: f32) {
        self.layers.entry(layer_type).or_default().opacity = opacity.clamp(0.0, 1.0);
    }

    /// Picking a plant switches to placement mode; clearing it returns to select.
    pub fn select_plant_for_planting(&mut self, plant: Option<PlantSummary>) {
        self.tool = if plant.is_some() {
            ToolMode::Place
        } else {
            ToolMode::Select
        };
        self.plants.selected_plant_for_planting = plant;
    }

    pub fn select_planting(&mut self, planting: Option<PlantingDto>) {
        self.plants.selected_planting = planting;
    }

    pub fn set_tool(&mut self, tool: ToolMode) {
        self.tool = tool;
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }
}
