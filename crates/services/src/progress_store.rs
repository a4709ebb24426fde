use std::sync::Arc;

use kit_core::model::{ExerciseId, KitId, ProgressMap, clamp_done};
use kit_core::progression::ProgressCorrection;
use storage::repository::{KeyValueStore, StorageError};
use tracing::{debug, warn};

/// Well-known key under which the whole progress map is persisted.
pub const DEFAULT_PROGRESS_KEY: &str = "kit_progress";

/// Best-effort persistence of completed-reactivo counts.
///
/// The whole map is stored as one JSON blob. A missing or corrupt blob reads
/// as an empty map. Storage failures are logged and treated as no change: a
/// write that needs the current blob is skipped when the blob cannot be
/// read, so a transient outage never replaces stored progress. Concurrent
/// writers are last-write-wins.
#[derive(Clone)]
pub struct ProgressStore {
    blobs: Arc<dyn KeyValueStore>,
    key: String,
}

impl std::fmt::Debug for ProgressStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressStore")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl ProgressStore {
    #[must_use]
    pub fn new(blobs: Arc<dyn KeyValueStore>) -> Self {
        Self::with_key(blobs, DEFAULT_PROGRESS_KEY)
    }

    #[must_use]
    pub fn with_key(blobs: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            blobs,
            key: key.into(),
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read the entire persisted map. A read failure yields an empty map.
    pub async fn load(&self) -> ProgressMap {
        match self.try_load().await {
            Ok(map) => map,
            Err(err) => {
                warn!(key = %self.key, error = %err, "failed to read progress, using empty map");
                ProgressMap::new()
            }
        }
    }

    /// Like [`ProgressStore::load`], but keeps a read failure distinct from an
    /// empty or corrupt blob.
    async fn try_load(&self) -> Result<ProgressMap, StorageError> {
        let Some(raw) = self.blobs.get(&self.key).await? else {
            return Ok(ProgressMap::new());
        };

        match ProgressMap::try_decode(&raw) {
            Ok(map) => Ok(map),
            Err(err) => {
                warn!(key = %self.key, error = %err, "discarding corrupt progress blob");
                Ok(ProgressMap::new())
            }
        }
    }

    /// Current blob for a read-merge-write, or `None` (logged) when it cannot
    /// be read and the write must be skipped.
    async fn load_for_update(&self) -> Option<ProgressMap> {
        match self.try_load().await {
            Ok(map) => Some(map),
            Err(err) => {
                warn!(key = %self.key, error = %err, "failed to read progress, skipping write");
                None
            }
        }
    }

    /// Write the entire map. Returns whether the write reached storage.
    pub async fn save(&self, map: &ProgressMap) -> bool {
        match self.blobs.set(&self.key, map.encode()).await {
            Ok(()) => {
                debug!(key = %self.key, entries = map.len(), "saved progress");
                true
            }
            Err(err) => {
                warn!(key = %self.key, error = %err, "failed to save progress");
                false
            }
        }
    }

    /// Completed count for one exercise, 0 when absent.
    pub async fn get(&self, kit: KitId, exercise: ExerciseId) -> u32 {
        self.load().await.get(kit, exercise)
    }

    /// Read-merge-write a single entry. Returns whether the write reached
    /// storage; nothing is written if the current blob cannot be read.
    pub async fn set(&self, kit: KitId, exercise: ExerciseId, value: u32) -> bool {
        let Some(mut map) = self.load_for_update().await else {
            return false;
        };
        map.set(kit, exercise, value);
        self.save(&map).await
    }

    /// Runner callback for one finished reactivo: bump the stored count by one,
    /// clamped to `total` when known.
    ///
    /// Returns the new count, or `None` when the stored count could not be
    /// read and therefore was left unchanged.
    pub async fn record_completion(
        &self,
        kit: KitId,
        exercise: ExerciseId,
        total: Option<u32>,
    ) -> Option<u32> {
        let mut map = self.load_for_update().await?;
        let next = clamp_done(map.get(kit, exercise).saturating_add(1), total);
        map.set(kit, exercise, next);
        self.save(&map).await;
        Some(next)
    }

    /// Persist clamp corrections found by the unlock evaluator.
    ///
    /// Entries are rewritten only if storage still holds the stale value, so
    /// a concurrent update is not clobbered by an older correction. Returns
    /// `false` when storage could not be read or written.
    pub async fn apply_corrections(&self, corrections: &[ProgressCorrection]) -> bool {
        if corrections.is_empty() {
            return true;
        }
        let Some(mut map) = self.load_for_update().await else {
            return false;
        };
        let mut changed = false;
        for fix in corrections {
            if map.get(fix.key.kit, fix.key.exercise) > fix.clamped {
                warn!(
                    key = %fix.key,
                    stored = fix.stored,
                    clamped = fix.clamped,
                    "clamping stale progress to exercise length"
                );
                map.set(fix.key.kit, fix.key.exercise, fix.clamped);
                changed = true;
            }
        }
        if !changed {
            return true;
        }
        self.save(&map).await
    }
}
