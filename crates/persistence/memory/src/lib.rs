mod store;

pub use store::MemoryPersistence;
