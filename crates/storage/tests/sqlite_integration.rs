use std::sync::Arc;

use storage::repository::{InMemoryRepository, KeyValueStore, Storage};
use storage::sqlite::SqliteRepository;

#[tokio::test]
async fn sqlite_kv_roundtrip_overwrites_value() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_kv_roundtrip?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    assert!(repo.get("kit_progress").await.unwrap().is_none());

    repo.set("kit_progress", r#"{"1-10":2}"#.to_string())
        .await
        .unwrap();
    repo.set("kit_progress", r#"{"1-10":3}"#.to_string())
        .await
        .unwrap();

    let value = repo.get("kit_progress").await.unwrap();
    assert_eq!(value.as_deref(), Some(r#"{"1-10":3}"#));
    assert!(repo.get("other").await.unwrap().is_none());
}

#[tokio::test]
async fn sqlite_migrations_are_idempotent() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_migrate_twice?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("first migrate");
    repo.set("k", "v".to_string()).await.unwrap();
    repo.migrate().await.expect("second migrate");

    assert_eq!(repo.get("k").await.unwrap().as_deref(), Some("v"));
}

#[tokio::test]
async fn storage_sqlite_wires_blob_store() {
    let catalog = InMemoryRepository::new();
    let storage = Storage::sqlite(
        "sqlite:file:memdb_storage_wiring?mode=memory&cache=shared",
        Arc::new(catalog.clone()),
        Arc::new(catalog),
    )
    .await
    .expect("storage");

    storage.blobs.set("k", "v".to_string()).await.unwrap();
    assert_eq!(storage.blobs.get("k").await.unwrap().as_deref(), Some("v"));
}
