#![forbid(unsafe_code)]

pub mod catalog;
pub mod repository;
pub mod sqlite;

pub use catalog::JsonCatalog;
pub use repository::{
    InMemoryRepository, KeyValueStore, KitRepository, ReactivoRepository, Storage, StorageError,
};
pub use sqlite::{SqliteConfig, SqliteInitError, SqliteRepository};
