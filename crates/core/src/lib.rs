pub mod edit;
pub mod error;
pub mod events;
pub mod ids;
pub mod layer;
pub mod planting;
pub mod tracked;
pub mod untracked;

pub use edit::MapEdit;
pub use error::CoreError;
pub use events::RemoteEvent;
pub use ids::*;
pub use layer::{LayerDto, LayerType};
pub use planting::{BaseLayerImage, PlantSummary, PlantingDto, PlantingMove, PlantingTransform};
pub use tracked::TrackedMapState;
pub use untracked::UntrackedMapState;
