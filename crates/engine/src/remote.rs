use mapplan_core::{CoreError, RemoteEvent};
use mapplan_storage::BackendError;

use crate::ledger::LastAction;

/// What the realtime channel hands to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportMessage {
    /// An edit broadcast by the server, ours or someone else's.
    Event(RemoteEvent),
    /// The server confirmed delivery of one of our edits.
    Ack(LastAction),
}

impl TransportMessage {
    /// Decode the data line of a server-sent event.
    pub fn from_sse_data(data: &str) -> Result<Self, CoreError> {
        RemoteEvent::from_json(data).map(Self::Event)
    }
}

/// A locally executed action whose persistence call failed.
///
/// The edit stays applied locally; it is not retried.
#[derive(Debug)]
pub struct ExecuteFailure {
    pub action_id: mapplan_core::ActionId,
    pub edit_type: &'static str,
    pub error: BackendError,
}
