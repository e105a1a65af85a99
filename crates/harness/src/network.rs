use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mapplan_core::{
    ids::*,
    layer::{LayerDto, LayerType},
    planting::{BaseLayerImage, PlantingDto, PlantingMove, PlantingTransform},
    MapEdit, RemoteEvent,
};
use mapplan_engine::{EngineError, TransportMessage};
use mapplan_storage::{BackendError, MapBackend, SqliteBackend};
use tokio::sync::mpsc;

use crate::TestPeer;

/// Fans every persisted edit out to the clients connected to its map, the
/// author included.
#[derive(Default)]
pub struct Broadcaster {
    maps: Mutex<BTreeMap<MapId, Vec<mpsc::UnboundedSender<TransportMessage>>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &self,
        map_id: MapId,
    ) -> Result<mpsc::UnboundedReceiver<TransportMessage>, BackendError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.maps
            .lock()
            .map_err(|_| BackendError::LockPoisoned)?
            .entry(map_id)
            .or_default()
            .push(tx);
        Ok(rx)
    }

    /// Deliver `message` to every live subscriber of `map_id`. Returns how
    /// many got it.
    pub fn publish(&self, map_id: MapId, message: TransportMessage) -> Result<usize, BackendError> {
        let mut maps = self.maps.lock().map_err(|_| BackendError::LockPoisoned)?;
        let Some(subscribers) = maps.get_mut(&map_id) else {
            return Ok(0);
        };
        subscribers.retain(|tx| tx.send(message.clone()).is_ok());
        Ok(subscribers.len())
    }
}

/// One user's view of the server: writes go to the shared SQLite backend and,
/// once committed, are broadcast as that user's [`RemoteEvent`].
pub struct BroadcastingBackend {
    inner: Arc<SqliteBackend>,
    broadcaster: Arc<Broadcaster>,
    user_id: UserId,
}

impl BroadcastingBackend {
    pub fn new(inner: Arc<SqliteBackend>, broadcaster: Arc<Broadcaster>, user_id: UserId) -> Self {
        Self {
            inner,
            broadcaster,
            user_id,
        }
    }

    fn broadcast(
        &self,
        map_id: MapId,
        action_id: ActionId,
        edit: MapEdit,
    ) -> Result<(), BackendError> {
        let event = RemoteEvent::new(map_id, action_id, self.user_id, edit);
        let delivered = self
            .broadcaster
            .publish(map_id, TransportMessage::Event(event))?;
        tracing::debug!("broadcast {} to {} clients of map {}", action_id, delivered, map_id);
        Ok(())
    }
}

#[async_trait]
impl MapBackend for BroadcastingBackend {
    async fn create_plantings(
        &self,
        map_id: MapId,
        action_id: ActionId,
        plantings: &[PlantingDto],
    ) -> Result<Vec<PlantingDto>, BackendError> {
        let created = self.inner.create_plantings(map_id, action_id, plantings).await?;
        self.broadcast(map_id, action_id, MapEdit::CreatePlanting(created.clone()))?;
        Ok(created)
    }

    async fn move_plantings(
        &self,
        map_id: MapId,
        action_id: ActionId,
        moves: &[PlantingMove],
    ) -> Result<Vec<PlantingDto>, BackendError> {
        let moved = self.inner.move_plantings(map_id, action_id, moves).await?;
        self.broadcast(map_id, action_id, MapEdit::MovePlanting(moves.to_vec()))?;
        Ok(moved)
    }

    async fn transform_plantings(
        &self,
        map_id: MapId,
        action_id: ActionId,
        transforms: &[PlantingTransform],
    ) -> Result<Vec<PlantingDto>, BackendError> {
        let transformed = self
            .inner
            .transform_plantings(map_id, action_id, transforms)
            .await?;
        self.broadcast(map_id, action_id, MapEdit::TransformPlanting(transforms.to_vec()))?;
        Ok(transformed)
    }

    async fn delete_plantings(
        &self,
        map_id: MapId,
        action_id: ActionId,
        ids: &[EntityId],
    ) -> Result<(), BackendError> {
        self.inner.delete_plantings(map_id, action_id, ids).await?;
        self.broadcast(map_id, action_id, MapEdit::DeletePlanting(ids.to_vec()))
    }

    async fn create_base_layer_image(
        &self,
        map_id: MapId,
        action_id: ActionId,
        image: &BaseLayerImage,
    ) -> Result<BaseLayerImage, BackendError> {
        let created = self
            .inner
            .create_base_layer_image(map_id, action_id, image)
            .await?;
        self.broadcast(map_id, action_id, MapEdit::CreateBaseLayerImage(created.clone()))?;
        Ok(created)
    }

    async fn update_base_layer_image(
        &self,
        map_id: MapId,
        action_id: ActionId,
        image: &BaseLayerImage,
    ) -> Result<BaseLayerImage, BackendError> {
        let updated = self
            .inner
            .update_base_layer_image(map_id, action_id, image)
            .await?;
        self.broadcast(map_id, action_id, MapEdit::UpdateBaseLayerImage(updated.clone()))?;
        Ok(updated)
    }

    async fn delete_base_layer_image(
        &self,
        map_id: MapId,
        action_id: ActionId,
        id: EntityId,
    ) -> Result<(), BackendError> {
        self.inner.delete_base_layer_image(map_id, action_id, id).await?;
        self.broadcast(map_id, action_id, MapEdit::DeleteBaseLayerImage(id))
    }

    async fn find_plantings(
        &self,
        map_id: MapId,
        layer_id: LayerId,
    ) -> Result<Vec<PlantingDto>, BackendError> {
        self.inner.find_plantings(map_id, layer_id).await
    }

    async fn find_base_layer_images(
        &self,
        map_id: MapId,
        layer_id: LayerId,
    ) -> Result<Vec<BaseLayerImage>, BackendError> {
        self.inner.find_base_layer_images(map_id, layer_id).await
    }
}

pub const MAP_ID: MapId = MapId::new(1);
pub const PLANTS_LAYER: LayerId = LayerId::new(1);
pub const BASE_LAYER: LayerId = LayerId::new(2);

/// Several peers editing maps through one database and one broadcaster.
pub struct TestNetwork {
    db: Arc<SqliteBackend>,
    broadcaster: Arc<Broadcaster>,
    peers: Vec<TestPeer>,
}

impl TestNetwork {
    pub fn new() -> Result<Self, BackendError> {
        Ok(Self::with_backend(SqliteBackend::open_in_memory()?))
    }

    /// A network over an on-disk database.
    pub fn open(path: &str) -> Result<Self, BackendError> {
        Ok(Self::with_backend(SqliteBackend::open(path)?))
    }

    fn with_backend(db: SqliteBackend) -> Self {
        Self {
            db: Arc::new(db),
            broadcaster: Arc::new(Broadcaster::new()),
            peers: Vec::new(),
        }
    }

    pub fn db(&self) -> &SqliteBackend {
        &self.db
    }

    /// The plants and base layer of `map_id`. Every map uses the same layer
    /// ids.
    pub fn layers(map_id: MapId) -> Vec<LayerDto> {
        let layer = |id: LayerId, layer_type: LayerType| LayerDto {
            id,
            map_id,
            layer_type,
            name: layer_type.as_str().to_string(),
            is_alternative: false,
        };
        vec![
            layer(PLANTS_LAYER, LayerType::Plants),
            layer(BASE_LAYER, LayerType::Base),
        ]
    }

    /// Connect a new peer to [`MAP_ID`] and load the map into its store.
    pub async fn add_peer(&mut self) -> Result<usize, EngineError> {
        let inbox = self.broadcaster.subscribe(MAP_ID)?;
        let user_id = UserId::new();
        let backend = BroadcastingBackend::new(self.db.clone(), self.broadcaster.clone(), user_id);
        let mut peer = TestPeer::connected(user_id, Arc::new(backend), inbox);
        peer.store.hydrate(MAP_ID, &Self::layers(MAP_ID)).await?;
        let index = self.peers.len();
        self.peers.push(peer);
        Ok(index)
    }

    /// Reconnect a peer to `map_id` and load that map.
    pub async fn switch_map(&mut self, index: usize, map_id: MapId) -> Result<(), EngineError> {
        let inbox = self.broadcaster.subscribe(map_id)?;
        let peer = &mut self.peers[index];
        peer.reconnect(inbox);
        peer.store.hydrate(map_id, &Self::layers(map_id)).await
    }

    pub fn peer(&self, index: usize) -> &TestPeer {
        &self.peers[index]
    }

    pub fn peer_mut(&mut self, index: usize) -> &mut TestPeer {
        &mut self.peers[index]
    }

    /// Wait for every peer's persistence calls, then deliver everything that
    /// was broadcast.
    pub async fn sync(&mut self) {
        for peer in &mut self.peers {
            peer.store.settle().await;
        }
        for peer in &mut self.peers {
            peer.pump();
        }
    }
}
