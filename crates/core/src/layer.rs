use serde::{Deserialize, Serialize};

use crate::ids::{LayerId, MapId};

/// The kinds of layers a map is composed of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerType {
    Base,
    Drawing,
    Fertilization,
    Habitats,
    Hydrology,
    Infrastructure,
    Labels,
    Landscape,
    Paths,
    Plants,
    Shade,
    Soil,
    Terrain,
    Trees,
    Warnings,
    Watering,
    Winds,
    Zones,
}

impl LayerType {
    pub const ALL: [LayerType; 18] = [
        Self::Base,
        Self::Drawing,
        Self::Fertilization,
        Self::Habitats,
        Self::Hydrology,
        Self::Infrastructure,
        Self::Labels,
        Self::Landscape,
        Self::Paths,
        Self::Plants,
        Self::Shade,
        Self::Soil,
        Self::Terrain,
        Self::Trees,
        Self::Warnings,
        Self::Watering,
        Self::Winds,
        Self::Zones,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::Drawing => "drawing",
            Self::Fertilization => "fertilization",
            Self::Habitats => "habitats",
            Self::Hydrology => "hydrology",
            Self::Infrastructure => "infrastructure",
            Self::Labels => "labels",
            Self::Landscape => "landscape",
            Self::Paths => "paths",
            Self::Plants => "plants",
            Self::Shade => "shade",
            Self::Soil => "soil",
            Self::Terrain => "terrain",
            Self::Trees => "trees",
            Self::Warnings => "warnings",
            Self::Watering => "watering",
            Self::Winds => "winds",
            Self::Zones => "zones",
        }
    }
}

/// A layer as the backend describes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerDto {
    pub id: LayerId,
    pub map_id: MapId,
    #[serde(rename = "type")]
    pub layer_type: LayerType,
    pub name: String,
    pub is_alternative: bool,
}
