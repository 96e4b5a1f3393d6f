pub mod dedup;
pub mod persistence;

pub use dedup::DedupStore;
pub use persistence::{ConnectionState, PersistenceAdapter, RetryPolicy};
