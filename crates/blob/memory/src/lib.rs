mod store;

pub use store::{DEFAULT_BASE_URL, MemoryBlobStore, PROGRESS_CHUNK_BYTES};
