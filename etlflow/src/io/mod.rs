//! External collaborators: remote fetch, relational storage and the CSV codec.

pub mod csv;
mod fetch;
mod storage;

#[cfg(feature = "http")]
pub use fetch::HttpFetcher;
pub use fetch::Fetcher;
pub use storage::{MemoryStorage, SqliteConnector, SqliteStorage, Storage, StorageConnector};
