//! In-process multi-client fixtures: a shared SQLite backend, a broadcaster
//! standing in for the realtime channel, and peers each driving a `MapStore`.

mod network;
mod peer;

pub use network::{BroadcastingBackend, Broadcaster, TestNetwork, BASE_LAYER, MAP_ID, PLANTS_LAYER};
pub use peer::TestPeer;
