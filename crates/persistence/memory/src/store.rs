use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;

use atrium_persistence::{
    Collection, Document, Filter, Order, PersistenceError, PersistenceGateway, Record,
    array_field, not_found,
};

/// In-memory [`PersistenceGateway`] backed by a [`DashMap`].
///
/// Records are keyed by `"{collection}/{id}"`. Array operations hold the
/// entry's shard lock for the whole read-modify-write, so they are atomic
/// with respect to other writers.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    data: DashMap<String, Document>,
}

impl MemoryPersistence {
    /// Create a new, empty in-memory gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records across all collections.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if no records are stored.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn render_key(collection: Collection, id: &str) -> String {
        format!("{collection}/{id}")
    }

    fn records_in(&self, collection: Collection) -> Vec<Record> {
        let prefix = format!("{collection}/");
        self.data
            .iter()
            .filter_map(|entry| {
                entry.key().strip_prefix(&prefix).map(|id| Record {
                    id: id.to_owned(),
                    data: entry.value().clone(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryPersistence {
    async fn get(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<Record>, PersistenceError> {
        let key = Self::render_key(collection, id);
        Ok(self.data.get(&key).map(|data| Record {
            id: id.to_owned(),
            data: data.clone(),
        }))
    }

    async fn query(
        &self,
        collection: Collection,
        filters: &[Filter],
        order: Option<&Order>,
        limit: Option<usize>,
    ) -> Result<Vec<Record>, PersistenceError> {
        let mut records: Vec<Record> = self
            .records_in(collection)
            .into_iter()
            .filter(|r| filters.iter().all(|f| f.matches(&r.data)))
            .collect();

        // Stable base order so results do not depend on shard iteration.
        records.sort_by(|a, b| a.id.cmp(&b.id));
        if let Some(order) = order {
            records.sort_by(|a, b| order.compare(&a.data, &b.data));
        }
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    async fn create(
        &self,
        collection: Collection,
        id: Option<&str>,
        data: Document,
    ) -> Result<String, PersistenceError> {
        let id = id.map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_owned);
        match self.data.entry(Self::render_key(collection, &id)) {
            Entry::Occupied(_) => Err(PersistenceError::Conflict {
                collection: collection.to_string(),
                id,
            }),
            Entry::Vacant(vacant) => {
                vacant.insert(data);
                tracing::trace!(%collection, id = %id, "record created");
                Ok(id)
            }
        }
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        partial: Document,
    ) -> Result<(), PersistenceError> {
        let key = Self::render_key(collection, id);
        let mut existing = self
            .data
            .get_mut(&key)
            .ok_or_else(|| not_found(collection, id))?;
        for (field, value) in partial {
            existing.insert(field, value);
        }
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<bool, PersistenceError> {
        let key = Self::render_key(collection, id);
        Ok(self.data.remove(&key).is_some())
    }

    async fn array_union(
        &self,
        collection: Collection,
        id: &str,
        field: &str,
        value: Value,
    ) -> Result<bool, PersistenceError> {
        let key = Self::render_key(collection, id);
        let mut existing = self
            .data
            .get_mut(&key)
            .ok_or_else(|| not_found(collection, id))?;
        let mut items = array_field(&existing, field)?;
        if items.contains(&value) {
            return Ok(false);
        }
        items.push(value);
        existing.insert(field.to_owned(), Value::Array(items));
        Ok(true)
    }

    async fn array_remove(
        &self,
        collection: Collection,
        id: &str,
        field: &str,
        value: &Value,
    ) -> Result<bool, PersistenceError> {
        let key = Self::render_key(collection, id);
        let mut existing = self
            .data
            .get_mut(&key)
            .ok_or_else(|| not_found(collection, id))?;
        let mut items = array_field(&existing, field)?;
        let before = items.len();
        items.retain(|item| item != value);
        if items.len() == before {
            return Ok(false);
        }
        existing.insert(field.to_owned(), Value::Array(items));
        Ok(true)
    }
}
