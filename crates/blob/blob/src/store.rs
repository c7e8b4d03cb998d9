use async_trait::async_trait;
use bytes::Bytes;

use crate::error::BlobError;
use crate::types::{BlobListing, BlobMetadata, StoredBlob, TransferProgress, UploadMetadata};

/// Callback invoked with transfer progress during [`BlobStore::put`].
pub type ProgressFn<'a> = dyn Fn(TransferProgress) + Send + Sync + 'a;

/// Hierarchical blob storage backend for file attachments.
///
/// Paths are `/`-separated. Implementors provide the actual storage
/// mechanism (e.g. a managed cloud bucket).
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` at `path`, replacing any existing blob.
    ///
    /// `progress` is called zero or more times with monotonically increasing
    /// byte counts; the last call, if any, reports the full size.
    async fn put(
        &self,
        path: &str,
        data: Bytes,
        metadata: UploadMetadata,
        progress: Option<&ProgressFn<'_>>,
    ) -> Result<StoredBlob, BlobError>;

    /// Return the public download locator for a blob.
    async fn url(&self, path: &str) -> Result<String, BlobError>;

    /// Retrieve the metadata for a blob.
    async fn metadata(&self, path: &str) -> Result<BlobMetadata, BlobError>;

    /// Delete a blob. Fails with [`BlobError::NotFound`] if it does not exist.
    async fn delete(&self, path: &str) -> Result<(), BlobError>;

    /// List the direct children of `prefix`.
    ///
    /// A prefix with no children yields an empty listing, not an error.
    async fn list(&self, prefix: &str) -> Result<BlobListing, BlobError>;
}
