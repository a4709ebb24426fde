use async_trait::async_trait;
use kit_core::model::{ExerciseId, Kit, KitId, ReactivoListing};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(String),
}

/// Source of kits and their ordered exercise lists.
#[async_trait]
pub trait KitRepository: Send + Sync {
    /// Fetch a kit with its exercises.
    ///
    /// Returns `Ok(None)` when the kit does not exist.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backing service is unreachable or
    /// returns malformed data.
    async fn get_kit(&self, id: KitId) -> Result<Option<Kit>, StorageError>;
}

/// Source of the reactivos that make up each exercise.
#[async_trait]
pub trait ReactivoRepository: Send + Sync {
    /// List reactivos for an exercise. An exercise without reactivos yields an
    /// empty listing, not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on transport or decoding failures.
    async fn list_reactivos(&self, exercise: ExerciseId) -> Result<ReactivoListing, StorageError>;
}

/// String-keyed blob storage, one value per well-known key.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the blob stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be read.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replace the blob stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the value cannot be written.
    async fn set(&self, key: &str, value: String) -> Result<(), StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    kits: Arc<Mutex<HashMap<KitId, Kit>>>,
    reactivos: Arc<Mutex<HashMap<ExerciseId, ReactivoListing>>>,
    blobs: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a kit.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn insert_kit(&self, kit: Kit) -> Result<(), StorageError> {
        let mut guard = self
            .kits
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(kit.id(), kit);
        Ok(())
    }

    /// Register or replace the reactivo listing of an exercise.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn insert_reactivos(
        &self,
        exercise: ExerciseId,
        listing: ReactivoListing,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .reactivos
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(exercise, listing);
        Ok(())
    }
}

#[async_trait]
impl KitRepository for InMemoryRepository {
    async fn get_kit(&self, id: KitId) -> Result<Option<Kit>, StorageError> {
        let guard = self
            .kits
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&id).cloned())
    }
}

#[async_trait]
impl ReactivoRepository for InMemoryRepository {
    async fn list_reactivos(&self, exercise: ExerciseId) -> Result<ReactivoListing, StorageError> {
        let guard = self
            .reactivos
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&exercise).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl KeyValueStore for InMemoryRepository {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let guard = self
            .blobs
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        let mut guard = self
            .blobs
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(key.to_owned(), value);
        Ok(())
    }
}

/// Aggregates the collaborator contracts behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub kits: Arc<dyn KitRepository>,
    pub reactivos: Arc<dyn ReactivoRepository>,
    pub blobs: Arc<dyn KeyValueStore>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repository(InMemoryRepository::new())
    }

    /// Use one in-memory repository for every contract, so tests can seed it
    /// directly and still hand the services trait objects.
    #[must_use]
    pub fn from_repository(repo: InMemoryRepository) -> Self {
        let kits: Arc<dyn KitRepository> = Arc::new(repo.clone());
        let reactivos: Arc<dyn ReactivoRepository> = Arc::new(repo.clone());
        let blobs: Arc<dyn KeyValueStore> = Arc::new(repo);
        Self {
            kits,
            reactivos,
            blobs,
        }
    }
}
