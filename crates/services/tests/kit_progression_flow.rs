use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use kit_core::model::{
    Exercise, ExerciseId, Kit, KitId, Modality, Reactivo, ReactivoId, ReactivoListing, SubtypeId,
};
use kit_core::progression::{ModalityFilter, RunnerKind};
use services::{BoardError, DEFAULT_PROGRESS_KEY, KitBoardService, ProgressStore};
use storage::JsonCatalog;
use storage::repository::{
    InMemoryRepository, KeyValueStore, ReactivoRepository, Storage, StorageError,
};

const KIT: KitId = KitId::new(7);

fn reactivos(ids: &[u64], modality: i64) -> ReactivoListing {
    ReactivoListing::new(
        ids.iter()
            .enumerate()
            .map(|(i, id)| {
                Reactivo::new(ReactivoId::new(*id), i as i64).with_modality_tag(modality)
            })
            .collect(),
    )
}

fn seed(repo: &InMemoryRepository) {
    let kit = Kit::new(
        KIT,
        "Kit de prueba",
        vec![
            Exercise::new(ExerciseId::new(1), "Uno", 1),
            Exercise::new(ExerciseId::new(2), "Dos", 2),
            Exercise::new(ExerciseId::new(3), "Tres", 3).with_modality_hint(Some(3)),
        ],
    )
    .unwrap();
    repo.insert_kit(kit).unwrap();
    repo.insert_reactivos(ExerciseId::new(1), reactivos(&[11, 12], 1))
        .unwrap();
    repo.insert_reactivos(ExerciseId::new(2), reactivos(&[21, 22, 23], 2))
        .unwrap();
    // Exercise 3 has no listing yet: total unknown.
}

async fn write_progress(repo: &InMemoryRepository, entries: &[(u64, u32)]) {
    let store = ProgressStore::new(Arc::new(repo.clone()));
    for (exercise, done) in entries {
        store.set(KIT, ExerciseId::new(*exercise), *done).await;
    }
}

#[tokio::test]
async fn incomplete_middle_exercise_locks_the_rest() {
    let repo = InMemoryRepository::new();
    seed(&repo);
    write_progress(&repo, &[(1, 2), (2, 1), (3, 0)]).await;

    let service = KitBoardService::from_storage(&Storage::from_repository(repo));
    let board = service.open(KIT).await.unwrap();

    let locks: Vec<bool> = board.report().states().iter().map(|s| s.locked).collect();
    assert_eq!(locks, vec![false, false, true]);
    assert_eq!(board.report().next_playable(), Some(ExerciseId::new(2)));
    assert!(board.activate(ExerciseId::new(3)).is_none());
}

#[tokio::test]
async fn runner_progress_is_picked_up_on_refresh() {
    let repo = InMemoryRepository::new();
    seed(&repo);
    write_progress(&repo, &[(1, 2)]).await;

    let service = KitBoardService::from_storage(&Storage::from_repository(repo));
    let mut board = service.open(KIT).await.unwrap();

    let manifest = board.activate(ExerciseId::new(2)).expect("unlocked");
    assert_eq!(manifest.runner(), Some(RunnerKind::Writing));
    assert_eq!(manifest.reactivo_ids, "21,22,23");
    assert_eq!(manifest.total_reactivos, "3");

    // The runner reports each finished reactivo through the store.
    let runner = service.progress_store().clone();
    for _ in 0..3 {
        runner
            .record_completion(manifest.kit_id, manifest.exercise_id, Some(3))
            .await;
    }
    assert_eq!(board.report().is_locked(ExerciseId::new(3)), Some(true));

    assert!(board.refresh().await);
    assert_eq!(board.report().is_locked(ExerciseId::new(3)), Some(false));
    assert_eq!(board.report().summary().completed, 2);
}

#[tokio::test]
async fn stale_progress_is_healed_in_storage() {
    let repo = InMemoryRepository::new();
    seed(&repo);
    write_progress(&repo, &[(1, 5)]).await;

    let service = KitBoardService::from_storage(&Storage::from_repository(repo.clone()));
    let board = service.open(KIT).await.unwrap();

    assert_eq!(board.report().state(ExerciseId::new(1)).unwrap().done, 2);
    assert!(board.pending_corrections().is_empty());
    assert_eq!(
        service.progress_store().get(KIT, ExerciseId::new(1)).await,
        2
    );
}

#[tokio::test]
async fn corrupt_progress_blob_starts_from_zero() {
    let repo = InMemoryRepository::new();
    seed(&repo);
    repo.set(DEFAULT_PROGRESS_KEY, "not json at all".into())
        .await
        .unwrap();

    let service = KitBoardService::from_storage(&Storage::from_repository(repo));
    let board = service.open(KIT).await.unwrap();

    assert!(board.progress().is_empty());
    assert!(board.report().states().iter().all(|s| s.done == 0));
}

#[tokio::test]
async fn missing_kit_is_reported() {
    let service = KitBoardService::from_storage(&Storage::in_memory());
    let err = service.open(KitId::new(404)).await.unwrap_err();
    assert!(matches!(err, BoardError::KitNotFound(id) if id == KitId::new(404)));
}

struct FlakyReactivos {
    inner: InMemoryRepository,
    failing: ExerciseId,
}

#[async_trait]
impl ReactivoRepository for FlakyReactivos {
    async fn list_reactivos(&self, exercise: ExerciseId) -> Result<ReactivoListing, StorageError> {
        if exercise == self.failing {
            return Err(StorageError::Connection("timeout".into()));
        }
        self.inner.list_reactivos(exercise).await
    }
}

#[tokio::test]
async fn failed_fetch_leaves_total_unknown_and_never_unlocks() {
    let repo = InMemoryRepository::new();
    seed(&repo);
    write_progress(&repo, &[(1, 9)]).await;

    let reactivos = Arc::new(FlakyReactivos {
        inner: repo.clone(),
        failing: ExerciseId::new(1),
    });
    let service = KitBoardService::new(
        Arc::new(repo.clone()),
        reactivos,
        ProgressStore::new(Arc::new(repo)),
    );
    let board = service.open(KIT).await.unwrap();

    assert!(board.meta(ExerciseId::new(1)).is_none());
    let first = board.report().state(ExerciseId::new(1)).unwrap();
    assert!(!first.completed);
    assert_eq!(first.done, 9);
    assert_eq!(board.report().is_locked(ExerciseId::new(2)), Some(true));
}

#[tokio::test]
async fn closing_the_board_discards_in_flight_listings() {
    let repo = InMemoryRepository::new();
    seed(&repo);
    let service = KitBoardService::from_storage(&Storage::from_repository(repo));
    let mut board = service.open(KIT).await.unwrap();

    let handle = board.handle();
    handle.close();
    let kit = board.kit().clone();
    let late = service.fetch_listings(&kit, &handle).await;
    assert!(late.is_empty());
    assert!(!board.apply_listing(ExerciseId::new(3), &reactivos(&[31], 3)));
}

const CATALOG: &str = r#"{
    "kits": [{
        "id": 3,
        "name": "Lectura inicial",
        "exercises": [
            { "id": 30, "title": "Vacío", "order": 0, "reportedTotal": 0 },
            { "id": 31, "title": "Vocales", "order": 1,
              "reactivos": [
                { "id": 1, "order": 1, "modalityTag": 1, "subtypeId": 5, "subtypeName": "Fonema" },
                { "id": 2, "order": 2, "modalityTag": 1, "subtypeId": 5 },
                { "id": 3, "order": 3, "modalityTag": 2, "subtypeId": 7, "subtypeName": "Trazo" }
              ] },
            { "id": 32, "title": "Dibujos", "modality": 3, "order": 2 }
        ]
    }]
}"#;

#[tokio::test]
async fn catalog_backed_board_resolves_majorities_and_hides_empty_exercises() {
    let catalog = Arc::new(JsonCatalog::from_json(CATALOG).unwrap());
    let blobs: Arc<dyn KeyValueStore> = Arc::new(InMemoryRepository::new());
    let storage = Storage {
        kits: catalog.clone(),
        reactivos: catalog,
        blobs,
    };
    let service = KitBoardService::from_storage(&storage);
    let mut board = service.open(KitId::new(3)).await.unwrap();

    let meta = board.meta(ExerciseId::new(31)).unwrap();
    assert_eq!(meta.modality, Some(Modality::Reading));
    assert_eq!(meta.subtype_id, Some(SubtypeId::new(5)));
    assert_eq!(meta.subtype_name.as_deref(), Some("Fonema"));

    // The empty exercise is hidden: not counted, not listed, not gating.
    let counts = board.counts();
    assert_eq!(counts.total, 2);
    assert_eq!(counts.reading, 1);
    assert_eq!(counts.visual, 1);
    let ids: Vec<ExerciseId> = board.cards().iter().map(|c| c.id()).collect();
    assert_eq!(ids, vec![ExerciseId::new(31), ExerciseId::new(32)]);
    assert_eq!(board.report().is_locked(ExerciseId::new(31)), Some(false));
    assert!(board.activate(ExerciseId::new(30)).is_none());

    board.set_filter(ModalityFilter::Only(Modality::Visual));
    let cards = board.cards();
    assert_eq!(cards.len(), 1);
    assert!(cards[0].locked);
    assert_eq!(cards[0].total, None);
}

/// Blob store whose reads or writes can be switched off to simulate outages.
#[derive(Default)]
struct OutageStore {
    inner: InMemoryRepository,
    reads_down: AtomicBool,
    writes_down: AtomicBool,
}

impl OutageStore {
    fn reads_down(&self, down: bool) {
        self.reads_down.store(down, Ordering::SeqCst);
    }

    fn writes_down(&self, down: bool) {
        self.writes_down.store(down, Ordering::SeqCst);
    }
}

#[async_trait]
impl KeyValueStore for OutageStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        if self.reads_down.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("read timeout".into()));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        if self.writes_down.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("write timeout".into()));
        }
        self.inner.set(key, value).await
    }
}

fn service_with_outages(repo: &InMemoryRepository) -> (Arc<OutageStore>, KitBoardService) {
    let blobs = Arc::new(OutageStore::default());
    let service = KitBoardService::new(
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        ProgressStore::new(blobs.clone()),
    );
    (blobs, service)
}

#[tokio::test]
async fn completion_during_read_outage_keeps_in_memory_progress() {
    let repo = InMemoryRepository::new();
    seed(&repo);
    let (blobs, service) = service_with_outages(&repo);
    let store = service.progress_store().clone();
    store.set(KIT, ExerciseId::new(1), 2).await;
    store.set(KIT, ExerciseId::new(2), 2).await;

    let mut board = service.open(KIT).await.unwrap();
    assert_eq!(board.report().is_locked(ExerciseId::new(3)), Some(true));

    blobs.reads_down(true);
    assert_eq!(board.record_completion(ExerciseId::new(2)).await, Some(3));
    assert_eq!(board.progress().get(KIT, ExerciseId::new(2)), 3);
    assert_eq!(board.report().is_locked(ExerciseId::new(3)), Some(false));

    // The skipped write left every stored entry as it was.
    blobs.reads_down(false);
    let stored = store.load().await;
    assert_eq!(stored.get(KIT, ExerciseId::new(1)), 2);
    assert_eq!(stored.get(KIT, ExerciseId::new(2)), 2);
}

#[tokio::test]
async fn read_outage_never_wipes_stored_progress() {
    let repo = InMemoryRepository::new();
    seed(&repo);
    let (blobs, service) = service_with_outages(&repo);
    let store = service.progress_store().clone();
    store.set(KIT, ExerciseId::new(1), 5).await;
    store.set(KIT, ExerciseId::new(2), 1).await;

    blobs.reads_down(true);
    let mut board = service.open(KIT).await.unwrap();
    assert!(board.progress().is_empty());
    assert_eq!(board.record_completion(ExerciseId::new(1)).await, Some(1));
    assert!(board.refresh().await);

    blobs.reads_down(false);
    let stored = store.load().await;
    assert_eq!(stored.get(KIT, ExerciseId::new(1)), 5);
    assert_eq!(stored.get(KIT, ExerciseId::new(2)), 1);
}

#[tokio::test]
async fn failed_correction_writes_queue_once_per_entry() {
    let repo = InMemoryRepository::new();
    seed(&repo);
    let (blobs, service) = service_with_outages(&repo);
    let store = service.progress_store().clone();
    store.set(KIT, ExerciseId::new(1), 5).await;

    blobs.writes_down(true);
    let mut board = service.open(KIT).await.unwrap();
    assert_eq!(board.progress().get(KIT, ExerciseId::new(1)), 2);
    assert_eq!(board.pending_corrections().len(), 1);

    // Each refresh merges the stale stored 5 back and clamps it again.
    assert!(board.refresh().await);
    assert!(board.refresh().await);
    let pending = board.pending_corrections();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].clamped, 2);
    assert_eq!(store.get(KIT, ExerciseId::new(1)).await, 5);

    blobs.writes_down(false);
    board.sync_corrections().await;
    assert!(board.pending_corrections().is_empty());
    assert_eq!(store.get(KIT, ExerciseId::new(1)).await, 2);
}
