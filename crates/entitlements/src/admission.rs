use std::sync::Arc;

use atrium_blob::{BlobEntry, BlobStore, ProgressFn, TransferProgress, UploadMetadata};
use atrium_core::{
    EntityRef, EntityType, FileAttachment, Subscription, UploadState, UserId, entity_folder,
    file_extension, is_valid_path_segment, storage_path, thumbnail_url_for,
};
use atrium_persistence::{Collection, Document, PersistenceGateway, array_field};
use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::accountant::{AdmissionDecision, DenialReason, StorageAccountant};
use crate::clock::{Clock, MonotonicMillis};
use crate::error::EntitlementError;
use crate::evaluator::EntitlementEvaluator;
use crate::metrics::EntitlementMetrics;
use crate::profile::{ensure_profile, timestamp};

/// Field holding the attachment set on every owning document.
pub const ATTACHMENTS_FIELD: &str = "attachments";

/// MIME type recorded when the caller supplies none.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Custom metadata key holding the attachment's `uploaded_at` millis.
pub const UPLOAD_TIME_KEY: &str = "uploadTime";

/// Blob metadata lookups in flight at once when listing a folder.
const DESCRIBE_CONCURRENCY: usize = 16;

/// Collection holding the documents of an entity type.
pub fn collection_for(entity_type: EntityType) -> Collection {
    match entity_type {
        EntityType::Notes => Collection::Notes,
        EntityType::Tasks => Collection::Tasks,
        EntityType::Chats => Collection::ChatMessages,
        EntityType::Profile => Collection::UserProfiles,
    }
}

/// One file to be stored and attached to an entity.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub user_id: UserId,
    pub entity: EntityRef,
    /// Original file name; becomes the attachment's display name.
    pub file_name: String,
    pub mime_type: String,
    pub data: Bytes,
}

impl UploadRequest {
    pub fn new(
        user_id: impl Into<UserId>,
        entity: EntityRef,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            entity,
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.data.len() as u64
    }

    fn validate(&self) -> Result<(), EntitlementError> {
        if !is_valid_path_segment(&self.user_id) {
            return Err(EntitlementError::Validation(format!(
                "invalid user id: {:?}",
                self.user_id.as_str()
            )));
        }
        if !is_valid_path_segment(&self.entity.entity_id) {
            return Err(EntitlementError::Validation(format!(
                "invalid entity id: {:?}",
                self.entity.entity_id.as_str()
            )));
        }
        if !is_valid_path_segment(&self.file_name) {
            return Err(EntitlementError::Validation(format!(
                "invalid file name: {:?}",
                self.file_name
            )));
        }
        Ok(())
    }
}

/// Receives the progress of one upload attempt.
///
/// Both methods are called synchronously from the uploading task.
pub trait UploadObserver: Send + Sync {
    fn on_state(&self, _state: UploadState) {}

    fn on_progress(&self, _progress: TransferProgress) {}
}

/// Drives one attempt through the upload state machine and reports each
/// step to the observer.
struct Attempt<'a> {
    state: UploadState,
    observer: Option<&'a dyn UploadObserver>,
}

impl<'a> Attempt<'a> {
    fn new(observer: Option<&'a dyn UploadObserver>) -> Self {
        if let Some(o) = observer {
            o.on_state(UploadState::Pending);
        }
        Self {
            state: UploadState::Pending,
            observer,
        }
    }

    fn advance(&mut self, to: UploadState) -> Result<(), EntitlementError> {
        self.state = self.state.transition(to)?;
        if let Some(o) = self.observer {
            o.on_state(to);
        }
        Ok(())
    }

    /// Move to `Failed` and hand back `err`.
    fn fail(&mut self, err: EntitlementError) -> EntitlementError {
        if self.advance(UploadState::Failed).is_err() {
            debug!(state = %self.state, "attempt already terminal");
        }
        err
    }
}

/// Validates, stores and attaches uploads, and deletes them again.
pub struct UploadController {
    persistence: Arc<dyn PersistenceGateway>,
    blobs: Arc<dyn BlobStore>,
    accountant: Arc<StorageAccountant>,
    evaluator: Arc<EntitlementEvaluator>,
    clock: Arc<dyn Clock>,
    timestamps: MonotonicMillis,
    storage_root: String,
    metrics: Arc<EntitlementMetrics>,
}

impl UploadController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        persistence: Arc<dyn PersistenceGateway>,
        blobs: Arc<dyn BlobStore>,
        accountant: Arc<StorageAccountant>,
        evaluator: Arc<EntitlementEvaluator>,
        clock: Arc<dyn Clock>,
        storage_root: impl Into<String>,
        metrics: Arc<EntitlementMetrics>,
    ) -> Self {
        Self {
            persistence,
            blobs,
            accountant,
            evaluator,
            clock,
            timestamps: MonotonicMillis::new(),
            storage_root: storage_root.into(),
            metrics,
        }
    }

    /// Store `request.data` and attach it to `request.entity`.
    ///
    /// Limits come from `sub` (the free defaults when `None`). On success
    /// the returned attachment is already part of the entity's set. If the
    /// attach step fails after the blob was written, the blob is deleted
    /// best-effort and the call returns [`EntitlementError::PartialFailure`].
    #[instrument(
        name = "uploads.upload",
        skip_all,
        fields(
            user_id = %request.user_id,
            entity = %request.entity,
            size_bytes = request.size_bytes(),
        )
    )]
    pub async fn upload(
        &self,
        request: UploadRequest,
        sub: Option<&Subscription>,
        observer: Option<&dyn UploadObserver>,
    ) -> Result<FileAttachment, EntitlementError> {
        self.metrics.increment_uploads_started();
        let mut attempt = Attempt::new(observer);
        let result = self.run(&request, sub, observer, &mut attempt).await;
        match &result {
            Ok(_) => self.metrics.increment_uploads_completed(),
            Err(EntitlementError::FileTooLarge { .. }) => {
                self.metrics.increment_rejected_file_too_large();
            }
            Err(EntitlementError::QuotaExceeded { .. }) => self.metrics.increment_rejected_quota(),
            Err(EntitlementError::SubscriptionLapsed { .. }) => {
                self.metrics.increment_rejected_lapsed();
            }
            Err(_) => self.metrics.increment_uploads_failed(),
        }
        result
    }

    async fn run(
        &self,
        request: &UploadRequest,
        sub: Option<&Subscription>,
        observer: Option<&dyn UploadObserver>,
        attempt: &mut Attempt<'_>,
    ) -> Result<FileAttachment, EntitlementError> {
        request.validate().map_err(|e| attempt.fail(e))?;
        if let Some(reason) = self.accountant.lapse_denial(sub) {
            info!(?reason, "upload denied");
            return Err(attempt.fail(reason.into()));
        }

        let size = request.size_bytes();
        let max_file = self.evaluator.max_file_size_bytes(sub);
        if size > max_file {
            debug!(limit = max_file, "rejected before any remote call");
            return Err(attempt.fail(EntitlementError::FileTooLarge {
                size,
                limit: max_file,
            }));
        }
        attempt.advance(UploadState::SizeChecked)?;

        let decision = self
            .accountant
            .can_admit(&request.user_id, size, sub)
            .await
            .map_err(|e| attempt.fail(e))?;
        if let AdmissionDecision::Denied { reason } = decision {
            info!(?reason, "upload denied");
            return Err(attempt.fail(reason.into()));
        }
        attempt.advance(UploadState::QuotaChecked)?;

        // Transfer.
        attempt.advance(UploadState::Transferring)?;
        let now = self.clock.now();
        let ts = self.timestamps.next(now.timestamp_millis());
        let path = storage_path(
            &self.storage_root,
            &request.user_id,
            &request.entity,
            ts,
            &request.file_name,
        );
        let mime_type = if request.mime_type.is_empty() {
            DEFAULT_MIME_TYPE.to_owned()
        } else {
            request.mime_type.clone()
        };
        let metadata = UploadMetadata::new(&request.file_name, &mime_type)
            .with_custom("userId", request.user_id.as_str())
            .with_custom("entityType", request.entity.entity_type.as_str())
            .with_custom("entityId", request.entity.entity_id.as_str())
            .with_custom(UPLOAD_TIME_KEY, ts.to_string());
        let forward = observer.map(|o| move |p: TransferProgress| o.on_progress(p));
        let progress: Option<&ProgressFn<'_>> = forward.as_ref().map(|f| f as &ProgressFn<'_>);
        let stored = self
            .blobs
            .put(&path, request.data.clone(), metadata, progress)
            .await
            .map_err(|e| attempt.fail(e.into()))?;
        debug!(path = %stored.path, "blob stored");

        let attachment = FileAttachment {
            display_name: request.file_name.clone(),
            size_bytes: stored.size_bytes,
            extension: file_extension(&request.file_name),
            thumbnail_url: thumbnail_url_for(&mime_type, &stored.url),
            mime_type,
            storage_path: stored.path,
            public_url: stored.url,
            uploaded_at: ts,
        };

        // Attach, compensating on failure.
        if let Err(e) = self.attach(&request.user_id, &request.entity, &attachment).await {
            let compensated = self.compensate(&attachment.storage_path).await;
            self.metrics.increment_partial_failures();
            return Err(attempt.fail(EntitlementError::PartialFailure {
                operation: "upload",
                detail: format!("blob stored but attach failed: {e}"),
                compensated,
            }));
        }
        attempt.advance(UploadState::Attached)?;
        attempt.advance(UploadState::Complete)?;
        info!(path = %attachment.storage_path, "upload complete");
        Ok(attachment)
    }

    async fn attach(
        &self,
        user_id: &UserId,
        entity: &EntityRef,
        attachment: &FileAttachment,
    ) -> Result<(), EntitlementError> {
        let collection = collection_for(entity.entity_type);
        let now = self.clock.now();
        if entity.entity_type == EntityType::Profile {
            ensure_profile(self.persistence.as_ref(), user_id, now).await?;
        }
        let value = serde_json::to_value(attachment)
            .map_err(atrium_persistence::PersistenceError::from)?;
        self.persistence
            .array_union(collection, &entity.entity_id, ATTACHMENTS_FIELD, value)
            .await?;

        let mut touch = Document::new();
        touch.insert("updatedAt".into(), timestamp(now));
        if let Err(e) = self
            .persistence
            .update(collection, &entity.entity_id, touch)
            .await
        {
            warn!(error = %e, "attachment added but updatedAt not touched");
        }
        Ok(())
    }

    /// Delete a just-written blob. Returns `true` if it is gone.
    async fn compensate(&self, path: &str) -> bool {
        match self.blobs.delete(path).await {
            Ok(()) => {
                self.metrics.increment_compensations();
                info!(path, "orphaned blob removed");
                true
            }
            Err(e) if e.is_not_found() => true,
            Err(e) => {
                self.metrics.increment_compensation_failures();
                warn!(path, error = %e, "compensating blob delete failed");
                false
            }
        }
    }

    /// Delete an attachment: the blob first, then the entity's reference.
    ///
    /// A blob that is already gone counts as deleted so retries converge.
    /// If the reference cannot be removed after the blob is gone the call
    /// returns [`EntitlementError::PartialFailure`].
    #[instrument(
        name = "uploads.delete",
        skip_all,
        fields(user_id = %user_id, entity = %entity, path = storage_path)
    )]
    pub async fn delete(
        &self,
        user_id: &UserId,
        entity: &EntityRef,
        storage_path: &str,
    ) -> Result<(), EntitlementError> {
        let folder = entity_folder(&self.storage_root, user_id, entity);
        let owned = storage_path
            .strip_prefix(folder.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .is_some_and(is_valid_path_segment);
        if !owned {
            return Err(EntitlementError::Validation(format!(
                "{storage_path} does not belong to {entity}"
            )));
        }

        match self.blobs.delete(storage_path).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => debug!("blob already gone"),
            Err(e) => return Err(e.into()),
        }

        if let Err(e) = self.detach(entity, storage_path).await {
            warn!(error = %e, "blob deleted but reference remains");
            self.metrics.increment_partial_failures();
            return Err(EntitlementError::PartialFailure {
                operation: "delete",
                detail: format!("blob deleted but reference not removed: {e}"),
                compensated: false,
            });
        }
        self.metrics.increment_deletions();
        info!("attachment deleted");
        Ok(())
    }

    async fn detach(&self, entity: &EntityRef, storage_path: &str) -> Result<(), EntitlementError> {
        let collection = collection_for(entity.entity_type);
        let Some(record) = self.persistence.get(collection, &entity.entity_id).await? else {
            return Ok(());
        };
        let items = array_field(&record.data, ATTACHMENTS_FIELD)?;
        let matching: Vec<Value> = items
            .into_iter()
            .filter(|item| {
                item.get("storagePath").and_then(Value::as_str) == Some(storage_path)
            })
            .collect();
        for item in &matching {
            self.persistence
                .array_remove(collection, &entity.entity_id, ATTACHMENTS_FIELD, item)
                .await?;
        }
        if !matching.is_empty() {
            let mut touch = Document::new();
            touch.insert("updatedAt".into(), timestamp(self.clock.now()));
            self.persistence
                .update(collection, &entity.entity_id, touch)
                .await?;
        }
        Ok(())
    }

    /// The attachment set stored on the entity.
    #[instrument(name = "uploads.attachments", skip_all, fields(user_id = %user_id, entity = %entity))]
    pub async fn attachments(
        &self,
        user_id: &UserId,
        entity: &EntityRef,
    ) -> Result<Vec<FileAttachment>, EntitlementError> {
        let collection = collection_for(entity.entity_type);
        let Some(record) = self.persistence.get(collection, &entity.entity_id).await? else {
            return Ok(Vec::new());
        };
        let items = array_field(&record.data, ATTACHMENTS_FIELD)?;
        let attachments = items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<FileAttachment>, _>>()
            .map_err(atrium_persistence::PersistenceError::from)?;
        Ok(attachments)
    }

    /// Rebuild attachment descriptors from the blobs in the entity's folder,
    /// oldest first.
    #[instrument(name = "uploads.entity_files", skip_all, fields(user_id = %user_id, entity = %entity))]
    pub async fn entity_files(
        &self,
        user_id: &UserId,
        entity: &EntityRef,
    ) -> Result<Vec<FileAttachment>, EntitlementError> {
        use futures::stream::{self, StreamExt};

        let folder = entity_folder(&self.storage_root, user_id, entity);
        let listing = self.blobs.list(&folder).await?;
        let mut files = stream::iter(listing.items)
            .map(|item| self.describe(item))
            .buffer_unordered(DESCRIBE_CONCURRENCY)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;
        files.sort_by(|a, b| {
            a.uploaded_at
                .cmp(&b.uploaded_at)
                .then_with(|| a.storage_path.cmp(&b.storage_path))
        });
        Ok(files)
    }

    /// Rebuild one attachment descriptor from blob metadata.
    ///
    /// `uploaded_at` comes from the recorded upload time, falling back to
    /// the store's own timestamp for blobs written without one.
    async fn describe(&self, item: BlobEntry) -> Result<FileAttachment, EntitlementError> {
        let meta = self.blobs.metadata(&item.path).await?;
        let url = self.blobs.url(&item.path).await?;
        let uploaded_at = meta
            .custom
            .get(UPLOAD_TIME_KEY)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or_else(|| meta.uploaded_at.timestamp_millis());
        let display_name = if meta.file_name.is_empty() {
            item.name
        } else {
            meta.file_name
        };
        Ok(FileAttachment {
            extension: file_extension(&display_name),
            display_name,
            size_bytes: meta.size_bytes,
            thumbnail_url: thumbnail_url_for(&meta.content_type, &url),
            mime_type: meta.content_type,
            storage_path: item.path,
            public_url: url,
            uploaded_at,
        })
    }
}
