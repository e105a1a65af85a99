use std::sync::Arc;

use mapplan_core::{
    ids::*,
    planting::{BaseLayerImage, PlantingDto, PlantingMove},
};
use mapplan_engine::{Action, MapStore, TransportMessage};
use mapplan_storage::MapBackend;
use tokio::sync::mpsc;

use crate::network::{MAP_ID, PLANTS_LAYER};

/// One client: a store plus its inbox from the realtime channel.
pub struct TestPeer {
    pub user_id: UserId,
    pub store: MapStore,
    inbox: Option<mpsc::UnboundedReceiver<TransportMessage>>,
}

impl TestPeer {
    /// A peer with no realtime channel, writing straight to `backend`.
    pub fn standalone(backend: Arc<dyn MapBackend>) -> Self {
        let mut store = MapStore::new(backend);
        store.init_map_id(MAP_ID);
        store.init_layer_id(mapplan_core::LayerType::Plants, PLANTS_LAYER);
        Self {
            user_id: UserId::new(),
            store,
            inbox: None,
        }
    }

    pub(crate) fn connected(
        user_id: UserId,
        backend: Arc<dyn MapBackend>,
        inbox: mpsc::UnboundedReceiver<TransportMessage>,
    ) -> Self {
        Self {
            user_id,
            store: MapStore::new(backend),
            inbox: Some(inbox),
        }
    }

    /// Replace the realtime channel. Messages still queued on the old one
    /// are dropped with it.
    pub(crate) fn reconnect(&mut self, inbox: mpsc::UnboundedReceiver<TransportMessage>) {
        self.inbox = Some(inbox);
    }

    /// Hand every message already delivered to the store. Returns how many
    /// were handled.
    pub fn pump(&mut self) -> usize {
        let Some(inbox) = self.inbox.as_mut() else {
            return 0;
        };
        let mut handled = 0;
        while let Ok(message) = inbox.try_recv() {
            self.store.handle_transport(message);
            handled += 1;
        }
        handled
    }

    /// Place a planting of `size` at (`x`, `y`) on the plants layer.
    pub fn create_planting(
        &mut self,
        x: i32,
        y: i32,
        size: i32,
    ) -> Result<EntityId, Box<dyn std::error::Error>> {
        let layer_id = self
            .store
            .tracked_state()
            .layer_id(mapplan_core::LayerType::Plants)
            .unwrap_or(PLANTS_LAYER);
        let id = EntityId::new();
        let planting = PlantingDto::new(id, layer_id, PlantId::new(1), x, y, size);
        self.store.execute_action(Action::create_plantings(vec![planting]))?;
        Ok(id)
    }

    pub fn move_planting(
        &mut self,
        id: EntityId,
        x: i32,
        y: i32,
    ) -> Result<ActionId, Box<dyn std::error::Error>> {
        let action_id = self
            .store
            .execute_action(Action::move_plantings(vec![PlantingMove { id, x, y }]))?;
        Ok(action_id)
    }

    pub fn delete_planting(
        &mut self,
        id: EntityId,
    ) -> Result<ActionId, Box<dyn std::error::Error>> {
        let action_id = self.store.execute_action(Action::delete_plantings(vec![id]))?;
        Ok(action_id)
    }

    pub fn set_base_image(
        &mut self,
        image: BaseLayerImage,
    ) -> Result<ActionId, Box<dyn std::error::Error>> {
        let action = if self.store.tracked_state().base_image().is_some() {
            Action::update_base_layer_image(image)
        } else {
            Action::create_base_layer_image(image)
        };
        let action_id = self.store.execute_action(action)?;
        Ok(action_id)
    }

    pub fn planting(&self, id: EntityId) -> Option<&PlantingDto> {
        self.store.tracked_state().planting(id)
    }
}
