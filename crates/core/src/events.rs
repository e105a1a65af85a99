use serde::{Deserialize, Serialize};

use crate::edit::MapEdit;
use crate::error::CoreError;
use crate::ids::{ActionId, MapId, UserId};

/// An edit as broadcast to every client connected to a map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEvent {
    pub map_id: MapId,
    pub action_id: ActionId,
    pub user_id: UserId,
    pub edit: MapEdit,
}

impl RemoteEvent {
    pub fn new(map_id: MapId, action_id: ActionId, user_id: UserId, edit: MapEdit) -> Self {
        Self {
            map_id,
            action_id,
            user_id,
            edit,
        }
    }

    /// Encode as the data line of a server-sent event.
    pub fn to_json(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(data: &str) -> Result<Self, CoreError> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, CoreError> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, CoreError> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
