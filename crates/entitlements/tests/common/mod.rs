//! Shared fixtures for the entitlement scenario tests.
//!
//! The wrappers delegate to the in-memory backends and fail selected
//! operations on demand, so the partial-failure paths can be driven.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use atrium_blob::{
    BlobError, BlobListing, BlobMetadata, BlobStore, ProgressFn, StoredBlob, UploadMetadata,
};
use atrium_blob_memory::MemoryBlobStore;
use atrium_core::{UserId, UserProfile};
use atrium_entitlements::{Entitlements, EntitlementsBuilder, EntitlementsConfig, ManualClock};
use atrium_persistence::{
    Collection, Document, Filter, Order, PersistenceError, PersistenceGateway, Record,
};
use atrium_persistence_memory::MemoryPersistence;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};

// -- Fault-injecting persistence --

#[derive(Default)]
pub struct FaultyPersistence {
    pub inner: MemoryPersistence,
    fail_array_ops: AtomicBool,
    fail_profile_updates: AtomicBool,
}

impl FaultyPersistence {
    pub fn fail_array_ops(&self, fail: bool) {
        self.fail_array_ops.store(fail, Ordering::SeqCst);
    }

    pub fn fail_profile_updates(&self, fail: bool) {
        self.fail_profile_updates.store(fail, Ordering::SeqCst);
    }

    fn injected() -> PersistenceError {
        PersistenceError::Transport("injected failure".into())
    }
}

#[async_trait]
impl PersistenceGateway for FaultyPersistence {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>, PersistenceError> {
        self.inner.get(collection, id).await
    }

    async fn query(
        &self,
        collection: Collection,
        filters: &[Filter],
        order: Option<&Order>,
        limit: Option<usize>,
    ) -> Result<Vec<Record>, PersistenceError> {
        self.inner.query(collection, filters, order, limit).await
    }

    async fn create(
        &self,
        collection: Collection,
        id: Option<&str>,
        data: Document,
    ) -> Result<String, PersistenceError> {
        self.inner.create(collection, id, data).await
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        partial: Document,
    ) -> Result<(), PersistenceError> {
        if collection == Collection::UserProfiles && self.fail_profile_updates.load(Ordering::SeqCst)
        {
            return Err(Self::injected());
        }
        self.inner.update(collection, id, partial).await
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<bool, PersistenceError> {
        self.inner.delete(collection, id).await
    }

    async fn array_union(
        &self,
        collection: Collection,
        id: &str,
        field: &str,
        value: Value,
    ) -> Result<bool, PersistenceError> {
        if self.fail_array_ops.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.array_union(collection, id, field, value).await
    }

    async fn array_remove(
        &self,
        collection: Collection,
        id: &str,
        field: &str,
        value: &Value,
    ) -> Result<bool, PersistenceError> {
        if self.fail_array_ops.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.array_remove(collection, id, field, value).await
    }
}

// -- Fault-injecting blob store --

#[derive(Default)]
pub struct FaultyBlobs {
    pub inner: MemoryBlobStore,
    fail_deletes: AtomicBool,
}

impl FaultyBlobs {
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlobStore for FaultyBlobs {
    async fn put(
        &self,
        path: &str,
        data: Bytes,
        metadata: UploadMetadata,
        progress: Option<&ProgressFn<'_>>,
    ) -> Result<StoredBlob, BlobError> {
        self.inner.put(path, data, metadata, progress).await
    }

    async fn url(&self, path: &str) -> Result<String, BlobError> {
        self.inner.url(path).await
    }

    async fn metadata(&self, path: &str) -> Result<BlobMetadata, BlobError> {
        self.inner.metadata(path).await
    }

    async fn delete(&self, path: &str) -> Result<(), BlobError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(BlobError::Transport("injected failure".into()));
        }
        self.inner.delete(path).await
    }

    async fn list(&self, prefix: &str) -> Result<BlobListing, BlobError> {
        self.inner.list(prefix).await
    }
}

// -- Harness --

pub struct Harness {
    pub entitlements: Entitlements,
    pub persistence: Arc<FaultyPersistence>,
    pub blobs: Arc<FaultyBlobs>,
    pub clock: Arc<ManualClock>,
}

/// 2026-01-01T00:00:00Z.
pub fn start() -> DateTime<Utc> {
    DateTime::from_timestamp(1_767_225_600, 0).unwrap()
}

pub fn harness() -> Harness {
    harness_with(EntitlementsConfig::default())
}

pub fn harness_with(config: EntitlementsConfig) -> Harness {
    let persistence = Arc::new(FaultyPersistence::default());
    let blobs = Arc::new(FaultyBlobs::default());
    let clock = Arc::new(ManualClock::new(start()));
    let entitlements = EntitlementsBuilder::new()
        .persistence(Arc::clone(&persistence) as Arc<dyn PersistenceGateway>)
        .blobs(Arc::clone(&blobs) as Arc<dyn BlobStore>)
        .clock(Arc::clone(&clock) as Arc<dyn atrium_entitlements::Clock>)
        .config(config)
        .build()
        .unwrap();
    Harness {
        entitlements,
        persistence,
        blobs,
        clock,
    }
}

impl Harness {
    /// Create an empty note owned by `user`.
    pub async fn note(&self, user: &str, id: &str) {
        let Value::Object(doc) = json!({
            "userId": user,
            "title": format!("note {id}"),
            "attachments": [],
        }) else {
            unreachable!()
        };
        self.persistence
            .create(Collection::Notes, Some(id), doc)
            .await
            .unwrap();
    }

    /// Store `size` bytes directly in the user's namespace, bypassing
    /// admission.
    pub async fn seed_blob(&self, user: &str, name: &str, size: u64) {
        let path = format!("users/{user}/notes/seed/{name}");
        let data = Bytes::from(vec![0u8; usize::try_from(size).unwrap()]);
        self.blobs
            .inner
            .put(&path, data, UploadMetadata::new(name, "application/octet-stream"), None)
            .await
            .unwrap();
    }

    pub async fn profile(&self, user: &UserId) -> Option<UserProfile> {
        self.entitlements.profile(user).await.unwrap()
    }
}
