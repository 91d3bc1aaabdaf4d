//! Key/value store implementations behind `KvStorePort`.

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryKvStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteKvStore;
