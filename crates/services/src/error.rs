//! Shared error types for the services crate.

use thiserror::Error;

use kit_core::model::KitId;
use storage::repository::StorageError;

/// Errors emitted while opening a kit board.
///
/// Only orchestration failures surface here; metadata and progress problems
/// degrade in place instead.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BoardError {
    #[error("kit {0} not found")]
    KitNotFound(KitId),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
