use std::collections::BTreeSet;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;

use atrium_blob::{
    BlobEntry, BlobError, BlobListing, BlobMetadata, BlobStore, ProgressFn, StoredBlob,
    TransferProgress, UploadMetadata, file_name, validate_path, validate_prefix,
};

/// Base URL used for download locators when none is configured.
pub const DEFAULT_BASE_URL: &str = "memory://blobs";

/// Granularity of progress callbacks during `put`.
pub const PROGRESS_CHUNK_BYTES: u64 = 64 * 1024;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    metadata: BlobMetadata,
}

/// In-memory [`BlobStore`] backed by a [`DashMap`] keyed by full path.
///
/// Folders are implicit: a prefix exists while at least one blob lives
/// under it.
#[derive(Debug)]
pub struct MemoryBlobStore {
    objects: DashMap<String, StoredObject>,
    base_url: String,
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBlobStore {
    /// Create a new, empty store using [`DEFAULT_BASE_URL`].
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Create a new, empty store whose URLs start with `base_url`.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            objects: DashMap::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        }
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns `true` if no blobs are stored.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Returns `true` if a blob exists at `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.objects.contains_key(path)
    }

    /// Return a copy of the content stored at `path`.
    pub fn content(&self, path: &str) -> Option<Bytes> {
        self.objects.get(path).map(|o| o.data.clone())
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }
}

fn report_progress(total: u64, progress: &ProgressFn<'_>) {
    let mut transferred = 0;
    loop {
        transferred = (transferred + PROGRESS_CHUNK_BYTES).min(total);
        progress(TransferProgress {
            transferred_bytes: transferred,
            total_bytes: total,
        });
        if transferred >= total {
            break;
        }
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(
        &self,
        path: &str,
        data: Bytes,
        metadata: UploadMetadata,
        progress: Option<&ProgressFn<'_>>,
    ) -> Result<StoredBlob, BlobError> {
        validate_path(path)?;
        let size_bytes = data.len() as u64;

        if let Some(progress) = progress {
            report_progress(size_bytes, progress);
        }

        let object = StoredObject {
            data,
            metadata: BlobMetadata {
                path: path.to_owned(),
                content_type: metadata.content_type,
                file_name: metadata.file_name,
                size_bytes,
                uploaded_at: Utc::now(),
                custom: metadata.custom,
            },
        };
        self.objects.insert(path.to_owned(), object);
        tracing::trace!(path, size_bytes, "blob stored");

        Ok(StoredBlob {
            path: path.to_owned(),
            url: self.url_for(path),
            size_bytes,
        })
    }

    async fn url(&self, path: &str) -> Result<String, BlobError> {
        validate_path(path)?;
        if !self.objects.contains_key(path) {
            return Err(BlobError::NotFound(path.to_owned()));
        }
        Ok(self.url_for(path))
    }

    async fn metadata(&self, path: &str) -> Result<BlobMetadata, BlobError> {
        validate_path(path)?;
        self.objects
            .get(path)
            .map(|o| o.metadata.clone())
            .ok_or_else(|| BlobError::NotFound(path.to_owned()))
    }

    async fn delete(&self, path: &str) -> Result<(), BlobError> {
        validate_path(path)?;
        self.objects
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| BlobError::NotFound(path.to_owned()))
    }

    async fn list(&self, prefix: &str) -> Result<BlobListing, BlobError> {
        validate_prefix(prefix)?;
        let scope = if prefix.is_empty() {
            String::new()
        } else {
            format!("{prefix}/")
        };

        let mut items = Vec::new();
        let mut subfolders = BTreeSet::new();
        for entry in &self.objects {
            let Some(rest) = entry.key().strip_prefix(&scope) else {
                continue;
            };
            match rest.split_once('/') {
                Some((folder, _)) => {
                    subfolders.insert(format!("{scope}{folder}"));
                }
                None => items.push(BlobEntry {
                    path: entry.key().clone(),
                    name: file_name(entry.key()).to_owned(),
                    size_bytes: entry.metadata.size_bytes,
                }),
            }
        }
        items.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(BlobListing {
            items,
            subfolders: subfolders.into_iter().collect(),
        })
    }
}
