use serde::{Deserialize, Serialize};

use crate::domain::{null_as_empty, User, UserId};

pub const TRAVERSE: &str = "user.traverse";
pub const FILTER: &str = "user.filter";
pub const SYNC: &str = "user.sync";
pub const LOAD: &str = "user.load";
pub const SYNC_USER: &str = "user.sync_user";
pub const UNLOAD: &str = "user.unload";

/// A tagged state change routed through the dispatcher.
///
/// Serialized as `{"type": "<tag>", "data": {...}}`; unit variants carry no `data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Action {
    #[serde(rename = "user.traverse")]
    Traverse { page: u32 },
    #[serde(rename = "user.filter")]
    Filter {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filter: Option<String>,
    },
    #[serde(rename = "user.sync")]
    Sync { users: Vec<User>, count: u64 },
    #[serde(rename = "user.load")]
    Load { id: UserId },
    #[serde(rename = "user.sync_user")]
    SyncUser { user: User },
    #[serde(rename = "user.unload")]
    Unload,
}

impl Action {
    pub fn tag(&self) -> &'static str {
        match self {
            Action::Traverse { .. } => TRAVERSE,
            Action::Filter { .. } => FILTER,
            Action::Sync { .. } => SYNC,
            Action::Load { .. } => LOAD,
            Action::SyncUser { .. } => SYNC_USER,
            Action::Unload => UNLOAD,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserListQuery {
    pub page: u32,
    pub page_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserListResponse {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub users: Vec<User>,
    #[serde(default)]
    pub count: u64,
}
