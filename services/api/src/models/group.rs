//! Todo group (category) model

use serde::{Deserialize, Serialize};

/// Name of the group every account starts with
pub const DEFAULT_GROUP_NAME: &str = "Notes";

/// Todo group entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoGroup {
    pub id: i64,
    pub name: String,
    pub created_unix: i64,
    pub owner_email: String,
    pub removable: bool,
}

/// New group creation payload
#[derive(Debug, Clone)]
pub struct NewTodoGroup {
    pub name: String,
    pub created_unix: i64,
    pub owner_email: String,
    pub removable: bool,
}

impl NewTodoGroup {
    /// A regular, user-created group
    pub fn removable(name: impl Into<String>, owner_email: impl Into<String>, now: i64) -> Self {
        Self {
            name: name.into(),
            created_unix: now,
            owner_email: owner_email.into(),
            removable: true,
        }
    }

    /// The non-removable group created at registration
    pub fn default_for(owner_email: impl Into<String>, now: i64) -> Self {
        Self {
            name: DEFAULT_GROUP_NAME.to_string(),
            created_unix: now,
            owner_email: owner_email.into(),
            removable: false,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateGroupRequest {
    pub name: String,
}
