use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Caller-supplied metadata attached to a blob at upload time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMetadata {
    /// MIME content type (e.g. `"application/pdf"`).
    pub content_type: String,
    /// The file name as the user chose it.
    pub file_name: String,
    /// Free-form key/value pairs stored alongside the blob.
    #[serde(default)]
    pub custom: BTreeMap<String, String>,
}

impl UploadMetadata {
    #[must_use]
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            file_name: file_name.into(),
            custom: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_custom(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom.insert(key.into(), value.into());
        self
    }
}

/// Metadata for a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobMetadata {
    /// Full path of the blob.
    pub path: String,
    pub content_type: String,
    pub file_name: String,
    /// Size in bytes.
    pub size_bytes: u64,
    /// When the blob was written.
    pub uploaded_at: DateTime<Utc>,
    #[serde(default)]
    pub custom: BTreeMap<String, String>,
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredBlob {
    pub path: String,
    /// Public download locator.
    pub url: String,
    pub size_bytes: u64,
}

/// One blob directly under a listed prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobEntry {
    /// Full path of the blob.
    pub path: String,
    /// Last path segment.
    pub name: String,
    pub size_bytes: u64,
}

/// The direct children of a prefix: blobs and sub-prefixes.
///
/// `subfolders` holds full prefixes that can be passed back to `list`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobListing {
    pub items: Vec<BlobEntry>,
    pub subfolders: Vec<String>,
}

impl BlobListing {
    /// Returns `true` if the prefix has no children at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.subfolders.is_empty()
    }

    /// Sum of the sizes of the direct items.
    #[must_use]
    pub fn item_bytes(&self) -> u64 {
        self.items.iter().map(|e| e.size_bytes).sum()
    }
}

/// Transfer progress reported during an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferProgress {
    pub transferred_bytes: u64,
    pub total_bytes: u64,
}

impl TransferProgress {
    /// Completed fraction in `0.0..=1.0`. An empty transfer is complete.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            1.0
        } else {
            self.transferred_bytes as f64 / self.total_bytes as f64
        }
    }
}
