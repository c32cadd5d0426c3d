//! Todo model and related payloads

use serde::{Deserialize, Serialize};

/// Todo entity
///
/// Timestamps are unix seconds; `0` means the value is unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub id: i64,
    pub group_id: i64,
    pub text: String,
    pub created_unix: i64,
    pub due_unix: i64,
    pub completion_unix: i64,
    pub owner_email: String,
    pub is_done: bool,
    #[serde(default, with = "base64_blob")]
    pub image: Option<Vec<u8>>,
    #[serde(default, with = "base64_blob")]
    pub file: Option<Vec<u8>>,
}

impl Todo {
    /// Whether a notification sweep looking up to `horizon` reports this todo
    pub fn is_due_by(&self, horizon: i64) -> bool {
        self.due_unix > 0 && !self.is_done && self.due_unix <= horizon
    }

    /// The mutable part of this todo, as stored
    pub fn to_update(&self) -> TodoUpdate {
        TodoUpdate {
            group_id: self.group_id,
            text: self.text.clone(),
            due_unix: self.due_unix,
            is_done: self.is_done,
            completion_unix: self.completion_unix,
            image: self.image.clone(),
            file: self.file.clone(),
        }
    }
}

/// New todo creation payload
#[derive(Debug, Clone)]
pub struct NewTodo {
    pub group_id: i64,
    pub text: String,
    pub created_unix: i64,
    pub due_unix: i64,
    pub owner_email: String,
    pub image: Option<Vec<u8>>,
    pub file: Option<Vec<u8>>,
}

/// Replacement values for every mutable todo column.
/// Id, owner and creation time never change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoUpdate {
    pub group_id: i64,
    pub text: String,
    pub due_unix: i64,
    pub is_done: bool,
    pub completion_unix: i64,
    pub image: Option<Vec<u8>>,
    pub file: Option<Vec<u8>>,
}

impl TodoUpdate {
    pub fn mark_done(&mut self, now: i64) {
        self.is_done = true;
        self.completion_unix = now;
    }

    pub fn mark_undone(&mut self) {
        self.is_done = false;
        self.completion_unix = 0;
    }
}

/// Attachments travel as base64 strings
#[derive(Debug, Deserialize)]
pub struct CreateTodoRequest {
    pub group_id: i64,
    pub text: String,
    #[serde(default)]
    pub due_unix: i64,
    pub image: Option<String>,
    pub file: Option<String>,
}

/// Every field is optional; an empty attachment string removes the attachment
#[derive(Debug, Default, Deserialize)]
pub struct UpdateTodoRequest {
    pub text: Option<String>,
    pub due_unix: Option<i64>,
    pub group_id: Option<i64>,
    pub is_done: Option<bool>,
    pub image: Option<String>,
    pub file: Option<String>,
}

mod base64_blob {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|encoded| STANDARD.decode(encoded).map_err(serde::de::Error::custom))
            .transpose()
    }
}
