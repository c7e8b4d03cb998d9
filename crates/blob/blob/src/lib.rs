pub mod error;
pub mod path;
pub mod store;
pub mod testing;
pub mod types;

pub use error::BlobError;
pub use path::{file_name, validate_path, validate_prefix};
pub use store::{BlobStore, ProgressFn};
pub use types::{BlobEntry, BlobListing, BlobMetadata, StoredBlob, TransferProgress, UploadMetadata};
