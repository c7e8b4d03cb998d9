pub mod collection;
pub mod error;
pub mod gateway;
pub mod query;
pub mod testing;

pub use collection::{Collection, Document, Record, to_document};
pub use error::PersistenceError;
pub use gateway::{PersistenceGateway, array_field, not_found};
pub use query::{Direction, Filter, FilterOp, Order, compare_values};
