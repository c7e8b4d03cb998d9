use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;

/// A JSON object stored as one record.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// The record collections the application keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Notes,
    Tasks,
    ChatMessages,
    UserProfiles,
    Subscriptions,
}

impl Collection {
    /// Return the collection's storage name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Notes => "notes",
            Self::Tasks => "tasks",
            Self::ChatMessages => "chat_messages",
            Self::UserProfiles => "user_profiles",
            Self::Subscriptions => "subscriptions",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored record: its id plus its document body.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub data: Document,
}

impl Record {
    /// Deserialize the document body into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, PersistenceError> {
        serde_json::from_value(serde_json::Value::Object(self.data.clone())).map_err(Into::into)
    }
}

/// Serialize `value` into a [`Document`].
///
/// Fails if `value` does not serialize to a JSON object.
pub fn to_document<T: Serialize>(value: &T) -> Result<Document, PersistenceError> {
    match serde_json::to_value(value)? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(PersistenceError::Serialization(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}
