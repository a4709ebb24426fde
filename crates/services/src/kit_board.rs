use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::join_all;
use kit_core::model::{
    ExerciseId, Kit, KitId, MetaMap, ProgressKey, ProgressMap, ReactivoListing, ResolvedMeta,
    clamp_done,
};
use kit_core::progression::{
    ExerciseCard, ModalityCounts, ModalityFilter, ProgressCorrection, RunnerManifest,
    UnlockReport, build_manifest, count_by_modality, evaluate_locks, resolve_meta, visible_cards,
};
use storage::repository::{KitRepository, ReactivoRepository, Storage};
use tracing::{debug, warn};

use crate::error::BoardError;
use crate::progress_store::ProgressStore;

/// Liveness flag shared between a board and the fetches feeding it.
///
/// Once closed, results that arrive late are dropped instead of being written
/// into a board nobody is looking at.
#[derive(Debug, Clone)]
pub struct BoardHandle {
    alive: Arc<AtomicBool>,
}

impl BoardHandle {
    fn new() -> Self {
        Self {
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn close(&self) {
        self.alive.store(false, Ordering::Release);
    }
}

/// In-memory state of one kit's progression view.
///
/// Owns the three inputs of lock evaluation (kit, resolved metadata, progress)
/// and recomputes the unlock report whenever one of them changes.
#[derive(Debug)]
pub struct KitBoard {
    kit: Kit,
    meta: MetaMap,
    progress: ProgressMap,
    report: UnlockReport,
    pending: BTreeMap<ProgressKey, ProgressCorrection>,
    filter: ModalityFilter,
    store: ProgressStore,
    handle: BoardHandle,
}

impl KitBoard {
    #[must_use]
    pub fn new(kit: Kit, progress: ProgressMap, store: ProgressStore) -> Self {
        let mut board = Self {
            kit,
            meta: MetaMap::new(),
            progress,
            report: UnlockReport::default(),
            pending: BTreeMap::new(),
            filter: ModalityFilter::All,
            store,
            handle: BoardHandle::new(),
        };
        board.recompute();
        board
    }

    // Accessors
    #[must_use]
    pub fn kit(&self) -> &Kit {
        &self.kit
    }

    #[must_use]
    pub fn meta(&self, exercise: ExerciseId) -> Option<&ResolvedMeta> {
        self.meta.get(&exercise)
    }

    #[must_use]
    pub fn progress(&self) -> &ProgressMap {
        &self.progress
    }

    #[must_use]
    pub fn report(&self) -> &UnlockReport {
        &self.report
    }

    #[must_use]
    pub fn filter(&self) -> ModalityFilter {
        self.filter
    }

    #[must_use]
    pub fn handle(&self) -> BoardHandle {
        self.handle.clone()
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.handle.is_alive()
    }

    /// Tear the board down; later metadata or refresh results are ignored.
    pub fn close(&self) {
        self.handle.close();
    }

    /// Store resolved metadata for one exercise.
    ///
    /// Returns `false` without recomputing when the board is closed, the
    /// exercise is not part of the kit, or the metadata is unchanged.
    pub fn apply_meta(&mut self, exercise: ExerciseId, meta: ResolvedMeta) -> bool {
        let changed = self.store_meta(exercise, meta);
        if changed {
            self.recompute();
        }
        changed
    }

    /// Resolve a freshly fetched listing and store it.
    pub fn apply_listing(&mut self, exercise: ExerciseId, listing: &ReactivoListing) -> bool {
        let Some(ex) = self.kit.exercise(exercise) else {
            return false;
        };
        let meta = resolve_meta(ex, listing);
        self.apply_meta(exercise, meta)
    }

    /// Apply several listings, recomputing locks once at the end.
    pub fn apply_listings(
        &mut self,
        listings: impl IntoIterator<Item = (ExerciseId, ReactivoListing)>,
    ) -> bool {
        let mut changed = false;
        for (exercise, listing) in listings {
            let Some(ex) = self.kit.exercise(exercise) else {
                continue;
            };
            let meta = resolve_meta(ex, &listing);
            changed |= self.store_meta(exercise, meta);
        }
        if changed {
            self.recompute();
        }
        changed
    }

    fn store_meta(&mut self, exercise: ExerciseId, meta: ResolvedMeta) -> bool {
        if !self.is_open() {
            debug!(exercise = %exercise, "board closed, dropping metadata");
            return false;
        }
        if self.kit.exercise(exercise).is_none() {
            return false;
        }
        if self.meta.get(&exercise) == Some(&meta) {
            return false;
        }
        self.meta.insert(exercise, meta);
        true
    }

    /// Re-read persisted progress (e.g. when the view regains focus) and merge
    /// it into the in-memory map. Returns `false` if the board is closed.
    pub async fn refresh(&mut self) -> bool {
        if !self.is_open() {
            return false;
        }
        let loaded = self.store.load().await;
        if !self.is_open() {
            return false;
        }
        self.progress.merge(&loaded);
        self.recompute();
        self.sync_corrections().await;
        true
    }

    /// Runner callback: one more reactivo of `exercise` was completed.
    ///
    /// The count is advanced from the in-memory map, which stays
    /// authoritative for the session, then persisted best-effort. Returns the
    /// new count, or `None` if the exercise is not on this board.
    pub async fn record_completion(&mut self, exercise: ExerciseId) -> Option<u32> {
        if self.kit.exercise(exercise).is_none() {
            return None;
        }
        let kit = self.kit.id();
        let total = self.meta.get(&exercise).and_then(|m| m.total_reactivos);
        let done = clamp_done(self.progress.get(kit, exercise).saturating_add(1), total);
        self.progress.set(kit, exercise, done);
        self.recompute();
        if !self.store.set(kit, exercise, done).await {
            debug!(kit = %kit, exercise = %exercise, done, "completion kept in memory only");
        }
        Some(done)
    }

    /// Persist clamp corrections found by previous recomputations.
    pub async fn sync_corrections(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let pending: Vec<ProgressCorrection> =
            std::mem::take(&mut self.pending).into_values().collect();
        if !self.store.apply_corrections(&pending).await {
            // Best effort: keep them for the next attempt, unless a newer
            // correction for the same entry was queued meanwhile.
            for fix in pending {
                self.pending.entry(fix.key).or_insert(fix);
            }
        }
    }

    /// Corrections not yet persisted, at most one per progress entry.
    #[must_use]
    pub fn pending_corrections(&self) -> Vec<ProgressCorrection> {
        self.pending.values().copied().collect()
    }

    pub fn set_filter(&mut self, filter: ModalityFilter) {
        self.filter = filter;
    }

    /// Visible exercises for the current filter, with lock flags.
    #[must_use]
    pub fn cards(&self) -> Vec<ExerciseCard<'_>> {
        visible_cards(&self.kit, &self.meta, &self.report, self.filter)
    }

    #[must_use]
    pub fn counts(&self) -> ModalityCounts {
        count_by_modality(&self.kit, &self.meta)
    }

    /// Build the runner manifest for an exercise the learner tapped.
    /// Locked, hidden or unknown exercises yield `None`.
    #[must_use]
    pub fn activate(&self, exercise: ExerciseId) -> Option<RunnerManifest> {
        let manifest = build_manifest(&self.kit, exercise, &self.meta, &self.report);
        if manifest.is_none() {
            debug!(kit = %self.kit.id(), exercise = %exercise, "activation ignored");
        }
        manifest
    }

    fn recompute(&mut self) {
        let report = evaluate_locks(&self.kit, &self.meta, &self.progress);
        for fix in report.corrections() {
            self.progress.set(fix.key.kit, fix.key.exercise, fix.clamped);
            self.pending.insert(fix.key, *fix);
        }
        debug!(
            kit = %self.kit.id(),
            exercises = report.states().len(),
            corrections = report.corrections().len(),
            "recomputed locks"
        );
        self.report = report;
    }
}

/// Opens kit boards by wiring the kit and reactivo services to the progress
/// store.
#[derive(Clone)]
pub struct KitBoardService {
    kits: Arc<dyn KitRepository>,
    reactivos: Arc<dyn ReactivoRepository>,
    progress: ProgressStore,
}

impl KitBoardService {
    #[must_use]
    pub fn new(
        kits: Arc<dyn KitRepository>,
        reactivos: Arc<dyn ReactivoRepository>,
        progress: ProgressStore,
    ) -> Self {
        Self {
            kits,
            reactivos,
            progress,
        }
    }

    #[must_use]
    pub fn from_storage(storage: &Storage) -> Self {
        Self::new(
            Arc::clone(&storage.kits),
            Arc::clone(&storage.reactivos),
            ProgressStore::new(Arc::clone(&storage.blobs)),
        )
    }

    #[must_use]
    pub fn progress_store(&self) -> &ProgressStore {
        &self.progress
    }

    /// Load a kit, its progress and every exercise's reactivos, then evaluate
    /// locks and persist any clamp corrections.
    ///
    /// # Errors
    ///
    /// Returns `BoardError::KitNotFound` if the kit does not exist, or
    /// `BoardError::Storage` if the kit service fails. Reactivo fetch failures
    /// are not errors: the exercise just keeps an unknown total.
    pub async fn open(&self, kit_id: KitId) -> Result<KitBoard, BoardError> {
        let kit = self
            .kits
            .get_kit(kit_id)
            .await?
            .ok_or(BoardError::KitNotFound(kit_id))?;
        let progress = self.progress.load().await;

        let mut board = KitBoard::new(kit, progress, self.progress.clone());
        let listings = self.fetch_listings(board.kit(), &board.handle()).await;
        board.apply_listings(listings);
        board.sync_corrections().await;
        Ok(board)
    }

    /// Fetch every exercise's reactivos concurrently.
    ///
    /// Failed fetches are logged and skipped. If `handle` is closed by the
    /// time the fetches settle, nothing is returned.
    pub async fn fetch_listings(
        &self,
        kit: &Kit,
        handle: &BoardHandle,
    ) -> Vec<(ExerciseId, ReactivoListing)> {
        let fetches = kit.exercises().iter().map(|exercise| {
            let id = exercise.id();
            let reactivos = Arc::clone(&self.reactivos);
            async move { (id, reactivos.list_reactivos(id).await) }
        });
        let results = join_all(fetches).await;

        if !handle.is_alive() {
            debug!(kit = %kit.id(), "board closed before reactivos arrived");
            return Vec::new();
        }

        results
            .into_iter()
            .filter_map(|(id, result)| match result {
                Ok(listing) => Some((id, listing)),
                Err(err) => {
                    warn!(exercise = %id, error = %err, "failed to fetch reactivos");
                    None
                }
            })
            .collect()
    }
}
