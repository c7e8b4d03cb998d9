use async_trait::async_trait;
use serde_json::Value;

use crate::collection::{Collection, Document, Record};
use crate::error::PersistenceError;
use crate::query::{Filter, Order};

/// Trait for the remote structured-record store.
///
/// Implementations must be `Send + Sync` and safe for concurrent access.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Fetch one record. Returns `None` if it does not exist.
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>, PersistenceError>;

    /// Return every record matching all `filters`, sorted by `order` when
    /// given, truncated to `limit` when given.
    async fn query(
        &self,
        collection: Collection,
        filters: &[Filter],
        order: Option<&Order>,
        limit: Option<usize>,
    ) -> Result<Vec<Record>, PersistenceError>;

    /// Create a record and return its id.
    ///
    /// When `id` is `None` the backend assigns one. Fails with
    /// [`PersistenceError::Conflict`] if a record with `id` already exists.
    async fn create(
        &self,
        collection: Collection,
        id: Option<&str>,
        data: Document,
    ) -> Result<String, PersistenceError>;

    /// Merge the top-level fields of `partial` into an existing record.
    ///
    /// Fails with [`PersistenceError::NotFound`] if the record is missing.
    async fn update(
        &self,
        collection: Collection,
        id: &str,
        partial: Document,
    ) -> Result<(), PersistenceError>;

    /// Delete a record. Returns `true` if it existed.
    async fn delete(&self, collection: Collection, id: &str) -> Result<bool, PersistenceError>;

    /// Append `value` to the array `field` unless an equal element is already
    /// present. Returns `true` if the array changed.
    ///
    /// The default implementation is a read-modify-write and is not atomic;
    /// backends with a native array-union should override it.
    async fn array_union(
        &self,
        collection: Collection,
        id: &str,
        field: &str,
        value: Value,
    ) -> Result<bool, PersistenceError> {
        let record = self
            .get(collection, id)
            .await?
            .ok_or_else(|| not_found(collection, id))?;
        let mut items = array_field(&record.data, field)?;
        if items.contains(&value) {
            return Ok(false);
        }
        items.push(value);
        let mut partial = Document::new();
        partial.insert(field.to_owned(), Value::Array(items));
        self.update(collection, id, partial).await?;
        Ok(true)
    }

    /// Remove every element equal to `value` from the array `field`.
    /// Returns `true` if the array changed.
    ///
    /// The default implementation is a read-modify-write and is not atomic.
    async fn array_remove(
        &self,
        collection: Collection,
        id: &str,
        field: &str,
        value: &Value,
    ) -> Result<bool, PersistenceError> {
        let record = self
            .get(collection, id)
            .await?
            .ok_or_else(|| not_found(collection, id))?;
        let mut items = array_field(&record.data, field)?;
        let before = items.len();
        items.retain(|item| item != value);
        if items.len() == before {
            return Ok(false);
        }
        let mut partial = Document::new();
        partial.insert(field.to_owned(), Value::Array(items));
        self.update(collection, id, partial).await?;
        Ok(true)
    }
}

/// Build a [`PersistenceError::NotFound`] for a record.
#[must_use]
pub fn not_found(collection: Collection, id: &str) -> PersistenceError {
    PersistenceError::NotFound {
        collection: collection.to_string(),
        id: id.to_owned(),
    }
}

/// Read `field` as an array. A missing or null field is an empty array.
pub fn array_field(doc: &Document, field: &str) -> Result<Vec<Value>, PersistenceError> {
    match doc.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(other) => Err(PersistenceError::Serialization(format!(
            "field `{field}` is not an array: {other}"
        ))),
    }
}
