pub mod action;
pub mod config;
pub mod error;
pub mod history;
pub mod ledger;
pub mod remote;

pub use action::{Action, ActionOutput};
pub use config::EngineConfig;
pub use error::EngineError;
pub use history::{History, HistoryEntry};
pub use ledger::{LastAction, Ledger, Match};
pub use remote::{ExecuteFailure, TransportMessage};

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use mapplan_core::{
    RemoteEvent,
    ids::*,
    layer::{LayerDto, LayerType},
    planting::{BaseLayerImage, PlantingDto},
    tracked::TrackedMapState,
    untracked::UntrackedMapState,
};
use mapplan_storage::MapBackend;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Failures kept for [`MapStore::drain_failures`]; older ones are dropped.
pub const MAX_PENDING_FAILURES: usize = 256;

/// The map editor's state: tracked content with its undo history, view
/// state, and the ledger of edits awaiting their echo.
///
/// Tracked state changes only through [`MapStore::execute_action`],
/// [`MapStore::undo`], [`MapStore::redo`], [`MapStore::apply_remote_action`]
/// and the `init_*` hydration calls. Local changes are synchronous; each
/// persistence call runs as its own tokio task, so these methods must be
/// called from within a runtime.
pub struct MapStore {
    config: EngineConfig,
    backend: Arc<dyn MapBackend>,
    tracked: TrackedMapState,
    untracked: UntrackedMapState,
    history: History,
    ledger: Ledger,
    in_flight: Vec<JoinHandle<()>>,
    /// Bumped by every reset; failures from earlier sessions are discarded.
    session: u64,
    failures_tx: mpsc::UnboundedSender<(u64, ExecuteFailure)>,
    failures_rx: mpsc::UnboundedReceiver<(u64, ExecuteFailure)>,
    failures: VecDeque<ExecuteFailure>,
}

impl MapStore {
    pub fn new(backend: Arc<dyn MapBackend>) -> Self {
        Self::with_config(backend, EngineConfig::default())
    }

    pub fn with_config(backend: Arc<dyn MapBackend>, config: EngineConfig) -> Self {
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();
        Self {
            history: History::new(config.max_history),
            config,
            backend,
            tracked: TrackedMapState::default(),
            untracked: UntrackedMapState::default(),
            ledger: Ledger::new(),
            in_flight: Vec::new(),
            session: 0,
            failures_tx,
            failures_rx,
            failures: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tracked_state(&self) -> &TrackedMapState {
        &self.tracked
    }

    pub fn untracked_state(&self) -> &UntrackedMapState {
        &self.untracked
    }

    /// View state setters live on [`UntrackedMapState`].
    pub fn untracked_state_mut(&mut self) -> &mut UntrackedMapState {
        &mut self.untracked
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn step(&self) -> usize {
        self.history.step()
    }

    fn map_id(&self) -> Result<MapId, EngineError> {
        self.untracked.map_id.ok_or(EngineError::NoActiveMap)
    }

    // ========================================================================
    // Undoable edits
    // ========================================================================

    /// Apply a user edit locally, record it for undo, and persist it in the
    /// background.
    ///
    /// Irreversible actions (whose reverse is `None`) are applied and persisted
    /// but not pushed; the redo branch is discarded either way.
    pub fn execute_action(&mut self, action: Action) -> Result<ActionId, EngineError> {
        let map_id = self.map_id()?;
        let action_id = action.action_id();

        let reverse = action.reverse(&self.tracked);
        self.tracked = action.apply(std::mem::take(&mut self.tracked));

        match reverse {
            Some(reverse) => {
                self.history.push(HistoryEntry {
                    action: action.clone(),
                    reverse,
                });
                tracing::debug!(
                    "executed {} {} (step {})",
                    action.edit().edit_type_name(),
                    action_id,
                    self.history.step()
                );
            }
            None => {
                let discarded = self.history.truncate_redo();
                tracing::debug!(
                    "executed irreversible {} {}, discarded {} redo entries",
                    action.edit().edit_type_name(),
                    action_id,
                    discarded
                );
            }
        }

        self.send(action, map_id);
        Ok(action_id)
    }

    /// Undo the most recent applied action. Returns `false` when there is
    /// nothing to undo.
    pub fn undo(&mut self) -> Result<bool, EngineError> {
        if !self.history.can_undo() {
            return Ok(false);
        }
        let map_id = self.map_id()?;
        let Some(entry) = self.history.step_back() else {
            return Ok(false);
        };
        let undone = entry.action.action_id();
        let reverse = entry.reverse.clone();
        self.tracked = reverse.apply(std::mem::take(&mut self.tracked));
        tracing::debug!(
            "undo {} via {} (step {})",
            undone,
            reverse.action_id(),
            self.history.step()
        );
        self.send(reverse, map_id);
        Ok(true)
    }

    /// Re-apply the next undone action. Returns `false` when there is nothing
    /// to redo.
    pub fn redo(&mut self) -> Result<bool, EngineError> {
        if !self.history.can_redo() {
            return Ok(false);
        }
        let map_id = self.map_id()?;
        let Some(entry) = self.history.step_forward() else {
            return Ok(false);
        };
        // Refresh the reverse so a later undo restores what is there now.
        if let Some(fresh) = entry.action.reverse(&self.tracked) {
            entry.reverse = fresh;
        }
        let action = entry.action.clone();
        self.tracked = action.apply(std::mem::take(&mut self.tracked));
        tracing::debug!("redo {} (step {})", action.action_id(), self.history.step());
        self.send(action, map_id);
        Ok(true)
    }

    /// Record `action` in the ledger and spawn its persistence call.
    fn send(&mut self, action: Action, map_id: MapId) {
        self.collect_failures();
        self.expire_last_actions(Instant::now());
        self.ledger.record(action.action_id(), &action.entity_ids());

        self.in_flight.retain(|h| !h.is_finished());
        let backend = Arc::clone(&self.backend);
        let failures = self.failures_tx.clone();
        let session = self.session;
        let handle = tokio::spawn(async move {
            let action_id = action.action_id();
            let edit_type = action.edit().edit_type_name();
            match action.execute(backend.as_ref(), map_id).await {
                Ok(_) => tracing::debug!("persisted {} {}", edit_type, action_id),
                Err(error) => {
                    tracing::warn!("persisting {} {} failed: {}", edit_type, action_id, error);
                    // The store may already be gone; nothing left to notify.
                    let _ = failures.send((
                        session,
                        ExecuteFailure {
                            action_id,
                            edit_type,
                            error,
                        },
                    ));
                }
            }
        });
        self.in_flight.push(handle);
    }

    /// Wait for every persistence call spawned so far.
    pub async fn settle(&mut self) {
        for handle in std::mem::take(&mut self.in_flight) {
            if let Err(e) = handle.await {
                tracing::warn!("persistence task ended abnormally: {}", e);
            }
        }
    }

    /// Failed persistence calls of the current map reported since the last
    /// drain. At most [`MAX_PENDING_FAILURES`] are kept.
    pub fn drain_failures(&mut self) -> Vec<ExecuteFailure> {
        self.collect_failures();
        self.failures.drain(..).collect()
    }

    /// Move reported failures into the pending buffer. Their ledger entries
    /// are dropped; no echo will come for them.
    fn collect_failures(&mut self) {
        while let Ok((session, failure)) = self.failures_rx.try_recv() {
            if session != self.session {
                tracing::debug!("ignoring failure of {} from a previous map", failure.action_id);
                continue;
            }
            self.ledger.remove_action(failure.action_id);
            if self.failures.len() == MAX_PENDING_FAILURES
                && let Some(dropped) = self.failures.pop_front()
            {
                tracing::warn!("dropping unread failure of {}", dropped.action_id);
            }
            self.failures.push_back(failure);
        }
    }

    // ========================================================================
    // Remote reconciliation
    // ========================================================================

    /// Apply an action delivered by the realtime channel for the current map.
    ///
    /// Echoes of our own edits are dropped. Anything else is applied directly
    /// to tracked state and never enters history.
    pub fn apply_remote_action(&mut self, action: Action) -> Match {
        let entity_ids = action.entity_ids();
        let matched = self.ledger.reconcile(action.action_id(), &entity_ids);
        match matched {
            Match::Echo => {
                tracing::debug!("dropped echo of {}", action.action_id());
            }
            Match::Foreign => {
                self.tracked = action.apply(std::mem::take(&mut self.tracked));
                tracing::debug!(
                    "applied remote {} {}",
                    action.edit().edit_type_name(),
                    action.action_id()
                );
            }
        }
        matched
    }

    /// Evict a ledger entry the transport has acknowledged.
    pub fn remove_last_action(&mut self, last: LastAction) -> bool {
        self.ledger.remove(last)
    }

    /// Drop ledger entries older than the configured TTL.
    pub fn expire_last_actions(&mut self, now: Instant) -> usize {
        let expired = self.ledger.expire(now, self.config.ledger_ttl);
        for last in &expired {
            tracing::info!(
                "no echo for {} on {} within {:?}",
                last.action_id,
                last.entity_id,
                self.config.ledger_ttl
            );
        }
        expired.len()
    }

    /// Apply a broadcast edit. Events for any map other than the loaded one
    /// are ignored and yield `None`.
    pub fn apply_remote_event(&mut self, event: RemoteEvent) -> Option<Match> {
        if self.untracked.map_id != Some(event.map_id) {
            tracing::debug!("ignoring {} for map {}", event.action_id, event.map_id);
            return None;
        }
        Some(self.apply_remote_action(Action::from_remote(event)))
    }

    /// Handle one message from the realtime channel to completion.
    pub fn handle_transport(&mut self, message: TransportMessage) {
        match message {
            TransportMessage::Event(event) => {
                self.apply_remote_event(event);
            }
            TransportMessage::Ack(last) => {
                if !self.remove_last_action(last) {
                    tracing::debug!("ack for unknown ledger entry {:?}", last);
                }
            }
        }
        self.expire_last_actions(Instant::now());
    }

    /// Handle the data line of a server-sent event.
    pub fn handle_sse_data(&mut self, data: &str) -> Result<(), EngineError> {
        let message = TransportMessage::from_sse_data(data)?;
        self.handle_transport(message);
        Ok(())
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Forget everything about the current map. In-flight persistence calls
    /// keep running; their failures are no longer reported.
    pub fn reset_store(&mut self) {
        self.tracked = TrackedMapState::default();
        self.untracked = UntrackedMapState::default();
        self.history.clear();
        self.ledger.clear();
        self.session += 1;
        self.failures.clear();
        while self.failures_rx.try_recv().is_ok() {}
    }

    pub fn init_map_id(&mut self, map_id: MapId) {
        self.untracked.map_id = Some(map_id);
    }

    pub fn init_layer_id(&mut self, layer_type: LayerType, layer_id: LayerId) {
        self.tracked.set_layer_id(layer_type, layer_id);
    }

    pub fn init_plant_layer(&mut self, plantings: Vec<PlantingDto>) {
        self.tracked.layers.plants.objects = plantings.into_iter().map(|p| (p.id, p)).collect();
    }

    pub fn init_base_layer(&mut self, image: BaseLayerImage) {
        self.tracked.layers.base.image = Some(image);
    }

    /// Reset and load `map_id` from the backend.
    ///
    /// Alternative layers are skipped; the plants layer becomes the selected
    /// layer.
    pub async fn hydrate(&mut self, map_id: MapId, layers: &[LayerDto]) -> Result<(), EngineError> {
        self.reset_store();
        self.init_map_id(map_id);

        for layer in layers.iter().filter(|l| !l.is_alternative) {
            self.init_layer_id(layer.layer_type, layer.id);
            match layer.layer_type {
                LayerType::Plants => {
                    let plantings = self.backend.find_plantings(map_id, layer.id).await?;
                    self.init_plant_layer(plantings);
                    self.untracked.update_selected_layer(layer.clone());
                }
                LayerType::Base => {
                    let images = self.backend.find_base_layer_images(map_id, layer.id).await?;
                    if let Some(image) = images.into_iter().next() {
                        self.init_base_layer(image);
                    }
                }
                _ => {}
            }
        }

        tracing::info!(
            "loaded map {} with {} plantings",
            map_id,
            self.tracked.layers.plants.objects.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mapplan_core::{MapEdit, PlantingMove, PlantingTransform};
    use mapplan_storage::BackendError;
    use proptest::prelude::*;
    use std::sync::Mutex;

    /// Records every call; fails those whose action id is in `reject`.
    #[derive(Default)]
    struct RecordingBackend {
        calls: Mutex<Vec<(ActionId, &'static str)>>,
        reject: Mutex<Vec<ActionId>>,
    }

    impl RecordingBackend {
        fn record(&self, action_id: ActionId, call: &'static str) -> Result<(), BackendError> {
            self.calls.lock().unwrap().push((action_id, call));
            if self.reject.lock().unwrap().contains(&action_id) {
                return Err(BackendError::Rejected("forbidden".into()));
            }
            Ok(())
        }

        fn calls(&self) -> Vec<(ActionId, &'static str)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MapBackend for RecordingBackend {
        async fn create_plantings(
            &self,
            _: MapId,
            id: ActionId,
            plantings: &[PlantingDto],
        ) -> Result<Vec<PlantingDto>, BackendError> {
            self.record(id, "create_plantings")?;
            Ok(plantings.to_vec())
        }

        async fn move_plantings(
            &self,
            _: MapId,
            id: ActionId,
            _: &[PlantingMove],
        ) -> Result<Vec<PlantingDto>, BackendError> {
            self.record(id, "move_plantings")?;
            Ok(Vec::new())
        }

        async fn transform_plantings(
            &self,
            _: MapId,
            id: ActionId,
            _: &[PlantingTransform],
        ) -> Result<Vec<PlantingDto>, BackendError> {
            self.record(id, "transform_plantings")?;
            Ok(Vec::new())
        }

        async fn delete_plantings(
            &self,
            _: MapId,
            id: ActionId,
            _: &[EntityId],
        ) -> Result<(), BackendError> {
            self.record(id, "delete_plantings")
        }

        async fn create_base_layer_image(
            &self,
            _: MapId,
            id: ActionId,
            image: &BaseLayerImage,
        ) -> Result<BaseLayerImage, BackendError> {
            self.record(id, "create_base_layer_image")?;
            Ok(image.clone())
        }

        async fn update_base_layer_image(
            &self,
            _: MapId,
            id: ActionId,
            image: &BaseLayerImage,
        ) -> Result<BaseLayerImage, BackendError> {
            self.record(id, "update_base_layer_image")?;
            Ok(image.clone())
        }

        async fn delete_base_layer_image(
            &self,
            _: MapId,
            id: ActionId,
            _: EntityId,
        ) -> Result<(), BackendError> {
            self.record(id, "delete_base_layer_image")
        }

        async fn find_plantings(
            &self,
            _: MapId,
            _: LayerId,
        ) -> Result<Vec<PlantingDto>, BackendError> {
            Ok(Vec::new())
        }

        async fn find_base_layer_images(
            &self,
            _: MapId,
            _: LayerId,
        ) -> Result<Vec<BaseLayerImage>, BackendError> {
            Ok(Vec::new())
        }
    }

    fn store() -> (MapStore, Arc<RecordingBackend>) {
        let backend = Arc::new(RecordingBackend::default());
        let mut store = MapStore::new(backend.clone());
        store.init_map_id(MapId::new(1));
        store.init_layer_id(LayerType::Plants, LayerId::new(1));
        (store, backend)
    }

    fn planting_at(id: EntityId, x: i32, y: i32) -> PlantingDto {
        PlantingDto::new(id, LayerId::new(1), PlantId::new(1), x, y, 50)
    }

    #[tokio::test]
    async fn create_undo_redo_planting() {
        let (mut store, backend) = store();
        let p1 = EntityId::new();

        store
            .execute_action(Action::create_plantings(vec![planting_at(p1, 10, 20)]))
            .unwrap();
        let placed = store.tracked_state().planting(p1).unwrap();
        assert_eq!((placed.x, placed.y), (10, 20));

        assert!(store.undo().unwrap());
        assert!(store.tracked_state().layers.plants.objects.is_empty());
        assert!(store.can_redo());

        assert!(store.redo().unwrap());
        let placed = store.tracked_state().planting(p1).unwrap();
        assert_eq!((placed.x, placed.y), (10, 20));
        assert!(!store.can_redo());

        store.settle().await;
        let calls: Vec<_> = backend.calls().into_iter().map(|(_, c)| c).collect();
        assert_eq!(calls, vec!["create_plantings", "delete_plantings", "create_plantings"]);
    }

    #[tokio::test]
    async fn boundaries_are_no_ops() {
        let (mut store, _) = store();
        assert!(!store.undo().unwrap());
        assert!(!store.redo().unwrap());
        assert_eq!(store.step(), 0);
    }

    #[tokio::test]
    async fn execute_without_map_is_rejected_untouched() {
        let mut store = MapStore::new(Arc::new(RecordingBackend::default()));
        let planting = planting_at(EntityId::new(), 0, 0);
        let result = store.execute_action(Action::create_plantings(vec![planting]));
        assert!(matches!(result, Err(EngineError::NoActiveMap)));
        assert_eq!(store.tracked_state(), &TrackedMapState::default());
        assert!(!store.can_undo());
    }

    #[tokio::test]
    async fn irreversible_action_is_applied_but_not_undoable() {
        let (mut store, backend) = store();
        let p = EntityId::new();
        store
            .execute_action(Action::create_plantings(vec![planting_at(p, 0, 0)]))
            .unwrap();
        store.undo().unwrap();
        assert!(store.can_redo());

        // Deleting a planting that is not there cannot be reversed.
        let ghost = Action::delete_plantings(vec![EntityId::new()]);
        let ghost_id = ghost.action_id();
        store.execute_action(ghost).unwrap();
        assert!(!store.can_undo());
        assert!(!store.can_redo());
        assert_eq!(store.history().len(), 0);

        store.settle().await;
        assert!(backend.calls().contains(&(ghost_id, "delete_plantings")));
    }

    #[tokio::test]
    async fn executed_action_is_recorded_per_entity() {
        let (mut store, _) = store();
        let (a, b) = (EntityId::new(), EntityId::new());
        let id = store
            .execute_action(Action::create_plantings(vec![
                planting_at(a, 0, 0),
                planting_at(b, 1, 1),
            ]))
            .unwrap();
        let entries: Vec<_> = store.ledger().entries().collect();
        assert_eq!(
            entries,
            vec![
                LastAction { action_id: id, entity_id: a },
                LastAction { action_id: id, entity_id: b },
            ]
        );
    }

    #[tokio::test]
    async fn echo_is_dropped_and_foreign_applied() {
        let (mut store, _) = store();
        let p1 = EntityId::new();
        let p2 = EntityId::new();
        store.init_plant_layer(vec![planting_at(p1, 0, 0), planting_at(p2, 3, 3)]);

        let m1 = Action::move_plantings(vec![PlantingMove { id: p1, x: 5, y: 5 }]);
        let echo = m1.clone();
        store.execute_action(m1).unwrap();
        let after_local = store.tracked_state().clone();

        assert_eq!(store.apply_remote_action(echo), Match::Echo);
        assert_eq!(store.tracked_state(), &after_local);
        assert!(store.ledger().is_empty());

        let step = store.step();
        let len = store.history().len();
        let foreign = Action::delete_plantings(vec![p2]);
        assert_eq!(store.apply_remote_action(foreign), Match::Foreign);
        assert!(store.tracked_state().planting(p2).is_none());
        assert_eq!(store.step(), step);
        assert_eq!(store.history().len(), len);
    }

    #[tokio::test]
    async fn failed_persistence_keeps_local_edit_and_clears_ledger() {
        let (mut store, backend) = store();
        let p = EntityId::new();
        let action = Action::create_plantings(vec![planting_at(p, 1, 1)]);
        backend.reject.lock().unwrap().push(action.action_id());
        let id = store.execute_action(action).unwrap();

        store.settle().await;
        let failures = store.drain_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].action_id, id);
        assert!(matches!(failures[0].error, BackendError::Rejected(_)));

        assert!(store.tracked_state().planting(p).is_some());
        assert!(store.can_undo());
        assert!(store.ledger().is_empty());
        assert!(store.drain_failures().is_empty());
    }

    #[tokio::test]
    async fn ack_and_expiry_empty_the_ledger() {
        let (mut store, _) = store();
        let (a, b) = (EntityId::new(), EntityId::new());
        let id = store
            .execute_action(Action::create_plantings(vec![
                planting_at(a, 0, 0),
                planting_at(b, 0, 0),
            ]))
            .unwrap();

        store.handle_transport(TransportMessage::Ack(LastAction { action_id: id, entity_id: a }));
        assert_eq!(store.ledger().len(), 1);

        let later = Instant::now() + store.config().ledger_ttl + std::time::Duration::from_secs(1);
        assert_eq!(store.expire_last_actions(later), 1);
        assert!(store.ledger().is_empty());
    }

    #[tokio::test]
    async fn history_depth_follows_config() {
        let config = EngineConfig {
            max_history: Some(2),
            ..EngineConfig::default()
        };
        let mut store = MapStore::with_config(Arc::new(RecordingBackend::default()), config);
        store.init_map_id(MapId::new(1));
        let ids: Vec<EntityId> = (0..3).map(|_| EntityId::new()).collect();
        for (i, id) in ids.iter().enumerate() {
            store
                .execute_action(Action::create_plantings(vec![planting_at(*id, i as i32, 0)]))
                .unwrap();
        }
        assert_eq!(store.history().len(), 2);

        while store.undo().unwrap() {}
        // The oldest create fell off the stack.
        assert!(store.tracked_state().planting(ids[0]).is_some());
        assert!(store.tracked_state().planting(ids[1]).is_none());
    }

    #[tokio::test]
    async fn reset_clears_everything() {
        let (mut store, _) = store();
        store
            .execute_action(Action::create_plantings(vec![planting_at(EntityId::new(), 0, 0)]))
            .unwrap();
        store.untracked_state_mut().update_layer_visible(LayerType::Plants, false);

        store.reset_store();
        assert_eq!(store.tracked_state(), &TrackedMapState::default());
        assert_eq!(store.untracked_state(), &UntrackedMapState::default());
        assert!(!store.can_undo());
        assert!(!store.can_redo());
        assert!(store.ledger().is_empty());

        // The create spawned before the reset still completes.
        store.settle().await;
        assert_eq!(store.tracked_state(), &TrackedMapState::default());
        assert!(store.drain_failures().is_empty());
    }

    #[tokio::test]
    async fn failures_from_before_a_reset_are_not_reported() {
        let (mut store, backend) = store();
        let old = Action::create_plantings(vec![planting_at(EntityId::new(), 0, 0)]);
        backend.reject.lock().unwrap().push(old.action_id());
        store.execute_action(old).unwrap();

        store.reset_store();
        store.init_map_id(MapId::new(2));
        store.settle().await;
        assert!(store.drain_failures().is_empty());

        let current = Action::create_plantings(vec![planting_at(EntityId::new(), 1, 1)]);
        backend.reject.lock().unwrap().push(current.action_id());
        let current_id = store.execute_action(current).unwrap();
        store.settle().await;
        let failures = store.drain_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].action_id, current_id);
    }

    #[tokio::test]
    async fn unread_failures_are_bounded() {
        let (mut store, backend) = store();
        let total = MAX_PENDING_FAILURES + 3;
        let mut last = None;
        for i in 0..total {
            let action = Action::create_plantings(vec![planting_at(EntityId::new(), i as i32, 0)]);
            backend.reject.lock().unwrap().push(action.action_id());
            last = Some(store.execute_action(action).unwrap());
            // Let each task finish so the next send collects its failure.
            store.settle().await;
        }
        let failures = store.drain_failures();
        assert_eq!(failures.len(), MAX_PENDING_FAILURES);
        assert_eq!(failures.last().map(|f| f.action_id), last);
    }

    #[tokio::test]
    async fn events_for_another_map_are_ignored() {
        let (mut store, _) = store();
        let p = EntityId::new();
        let edit = MapEdit::CreatePlanting(vec![planting_at(p, 0, 0)]);

        let elsewhere =
            RemoteEvent::new(MapId::new(2), ActionId::new(), UserId::new(), edit.clone());
        assert_eq!(store.apply_remote_event(elsewhere), None);
        assert!(store.tracked_state().planting(p).is_none());

        let here = RemoteEvent::new(MapId::new(1), ActionId::new(), UserId::new(), edit);
        assert_eq!(store.apply_remote_event(here), Some(Match::Foreign));
        assert!(store.tracked_state().planting(p).is_some());
    }

    #[tokio::test]
    async fn sse_data_is_decoded_and_applied() {
        let (mut store, _) = store();
        let p = EntityId::new();
        let event = RemoteEvent::new(
            MapId::new(1),
            ActionId::new(),
            UserId::new(),
            MapEdit::CreatePlanting(vec![planting_at(p, 2, 2)]),
        );
        store.handle_sse_data(&event.to_json().unwrap()).unwrap();
        assert!(store.tracked_state().planting(p).is_some());

        let garbage = store.handle_sse_data("{not json");
        assert!(matches!(garbage, Err(EngineError::Core(_))));
    }

    #[tokio::test]
    async fn stale_ledger_entries_expire_while_handling_messages() {
        let config = EngineConfig {
            ledger_ttl: std::time::Duration::ZERO,
            ..EngineConfig::default()
        };
        let mut store = MapStore::with_config(Arc::new(RecordingBackend::default()), config);
        store.init_map_id(MapId::new(1));
        let p = EntityId::new();
        let id = store
            .execute_action(Action::create_plantings(vec![planting_at(p, 0, 0)]))
            .unwrap();
        assert_eq!(store.ledger().len(), 1);

        std::thread::sleep(std::time::Duration::from_millis(2));
        store.handle_transport(TransportMessage::Ack(LastAction {
            action_id: ActionId::new(),
            entity_id: p,
        }));
        assert!(!store.ledger().contains(LastAction { action_id: id, entity_id: p }));
    }

    #[tokio::test]
    async fn undo_after_remote_edit_restores_pre_action_values() {
        let (mut store, _) = store();
        let p = EntityId::new();
        store.init_plant_layer(vec![planting_at(p, 0, 0)]);

        store
            .execute_action(Action::move_plantings(vec![PlantingMove { id: p, x: 10, y: 10 }]))
            .unwrap();
        store.apply_remote_action(Action::new(MapEdit::MovePlanting(vec![PlantingMove {
            id: p,
            x: 50,
            y: 50,
        }])));

        store.undo().unwrap();
        let planting = store.tracked_state().planting(p).unwrap();
        assert_eq!((planting.x, planting.y), (0, 0));
    }

    // ========================================================================
    // Properties
    // ========================================================================

    #[derive(Debug, Clone)]
    enum Op {
        Create(i32, i32),
        Move(usize, i32, i32),
        Transform(usize, f32),
        Delete(usize),
        Image(f32),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (-500..500i32, -500..500i32).prop_map(|(x, y)| Op::Create(x, y)),
            (any::<usize>(), -500..500i32, -500..500i32).prop_map(|(i, x, y)| Op::Move(i, x, y)),
            (any::<usize>(), 0.0f32..360.0).prop_map(|(i, r)| Op::Transform(i, r)),
            any::<usize>().prop_map(Op::Delete),
            (0.0f32..360.0).prop_map(Op::Image),
        ]
    }

    /// Turn an op into an action against the current state. Ops that refer to
    /// plantings pick one of the existing ones; with none, they create.
    fn to_action(op: &Op, state: &TrackedMapState, image_id: EntityId) -> Action {
        let ids: Vec<EntityId> = state.layers.plants.objects.keys().copied().collect();
        let pick = |i: usize| ids[i % ids.len()];
        match op {
            Op::Move(i, x, y) if !ids.is_empty() => {
                Action::move_plantings(vec![PlantingMove { id: pick(*i), x: *x, y: *y }])
            }
            Op::Transform(i, r) if !ids.is_empty() => {
                let p = state.planting(pick(*i)).unwrap();
                Action::transform_plantings(vec![PlantingTransform {
                    rotation: *r,
                    scale_x: 2.0,
                    ..p.transform()
                }])
            }
            Op::Delete(i) if !ids.is_empty() => Action::delete_plantings(vec![pick(*i)]),
            Op::Image(r) => Action::update_base_layer_image(BaseLayerImage {
                id: image_id,
                layer_id: LayerId::new(2),
                rotation: *r,
                scale: 1.0,
                path: "/base.png".into(),
            }),
            Op::Create(x, y) | Op::Move(_, x, y) => {
                Action::create_plantings(vec![planting_at(EntityId::new(), *x, *y)])
            }
            Op::Transform(..) | Op::Delete(_) => {
                Action::create_plantings(vec![planting_at(EntityId::new(), 0, 0)])
            }
        }
    }

    proptest! {
        #[test]
        fn undo_all_then_redo_all_restores_state(ops in prop::collection::vec(op(), 1..25)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let _guard = rt.enter();
            let (mut store, _) = store();
            let image_id = EntityId::new();
            let initial = store.tracked_state().clone();

            for op in &ops {
                let action = to_action(op, store.tracked_state(), image_id);
                store.execute_action(action).unwrap();
            }
            let expected = store.tracked_state().clone();
            let n = store.history().len();
            prop_assert_eq!(store.step(), n);

            for _ in 0..n {
                prop_assert!(store.undo().unwrap());
                prop_assert!(store.can_redo());
            }
            prop_assert!(!store.can_undo());
            prop_assert_eq!(store.tracked_state(), &initial);

            for _ in 0..n {
                prop_assert!(store.redo().unwrap());
            }
            prop_assert!(!store.can_redo());
            prop_assert_eq!(store.tracked_state(), &expected);
        }

        #[test]
        fn new_action_after_undos_discards_tail(creates in 2..10usize, undos in 0..10usize) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let _guard = rt.enter();
            let (mut store, _) = store();
            for i in 0..creates {
                let planting = planting_at(EntityId::new(), i as i32, 0);
                store.execute_action(Action::create_plantings(vec![planting])).unwrap();
            }
            let undos = undos.min(creates);
            for _ in 0..undos {
                store.undo().unwrap();
            }
            prop_assert_eq!(store.can_undo(), store.step() > 0);
            prop_assert_eq!(store.can_redo(), store.step() < store.history().len());

            let step = store.step();
            let planting = planting_at(EntityId::new(), -1, -1);
            store.execute_action(Action::create_plantings(vec![planting])).unwrap();
            prop_assert_eq!(store.history().len(), step + 1);
            prop_assert!(!store.can_redo());
            prop_assert!(!store.redo().unwrap());
        }
    }
}
