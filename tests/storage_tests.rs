mod common;

use common::{dummy, endpoint, timeline};
use serde_json::json;
use soshalthing::{
    ActionKind, ArticleId, DUMMY_SERVICE, EndpointType, Engine, FileStorage, LockMode,
    MemoryStorage, Storage, StorageError,
};
use std::fs;
use tempfile::tempdir;

#[test]
fn test_file_storage_creates_directory() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("subdir");
    let storage = FileStorage::open(&path).unwrap();

    assert!(path.exists());
    assert!(path.join("storage.lock").exists());
    assert_eq!(storage.dir(), path.as_path());
}

#[test]
fn test_file_storage_round_trip() {
    let dir = tempdir().unwrap();
    let mut storage = FileStorage::open(dir.path()).unwrap();

    assert_eq!(storage.get("SoshalThingYew").unwrap(), None);

    let value = json!({"display_mode": {"type": "Multiple"}});
    storage.set("SoshalThingYew", &value).unwrap();
    assert_eq!(storage.get("SoshalThingYew").unwrap(), Some(value));

    let path = storage.key_path("SoshalThingYew Timelines");
    assert_eq!(path.file_name().unwrap(), "SoshalThingYew_Timelines.json");
}

#[test]
fn test_file_storage_leaves_no_tmp_file() {
    let dir = tempdir().unwrap();
    let mut storage = FileStorage::open(dir.path()).unwrap();
    storage.set("key", &json!([1, 2, 3])).unwrap();
    storage.set("key", &json!([4])).unwrap();

    let names: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert!(names.contains(&"key.json".to_string()));
    assert!(!names.iter().any(|name| name.ends_with(".tmp")));
    assert_eq!(storage.get("key").unwrap(), Some(json!([4])));
}

#[test]
fn test_file_storage_remove_is_idempotent() {
    let dir = tempdir().unwrap();
    let mut storage = FileStorage::open(dir.path()).unwrap();
    storage.set("key", &json!(true)).unwrap();

    storage.remove("key").unwrap();
    storage.remove("key").unwrap();
    assert_eq!(storage.get("key").unwrap(), None);
}

#[test]
fn test_file_storage_corrupt_file_is_json_error() {
    let dir = tempdir().unwrap();
    let storage = FileStorage::open(dir.path()).unwrap();
    fs::write(storage.key_path("key"), "{ truncated").unwrap();

    assert!(matches!(storage.get("key"), Err(StorageError::Json(_))));
}

#[test]
fn test_second_writer_is_locked_out() {
    let dir = tempdir().unwrap();
    let _first = FileStorage::open(dir.path()).unwrap();

    let second = FileStorage::open(dir.path());
    assert!(matches!(second, Err(StorageError::Locked(_))));

    let unlocked = FileStorage::open_with_lock(dir.path(), LockMode::None);
    assert!(unlocked.is_ok());
}

#[test]
fn test_lock_released_on_drop() {
    let dir = tempdir().unwrap();
    {
        let _storage = FileStorage::open(dir.path()).unwrap();
    }
    assert!(FileStorage::open(dir.path()).is_ok());
}

#[test]
fn test_memory_storage_clones_share_entries() {
    let storage = MemoryStorage::new();
    let mut writer = storage.clone();
    writer.set("key", &json!({"a": 1})).unwrap();

    assert_eq!(storage.get("key").unwrap(), Some(json!({"a": 1})));
    assert_eq!(storage.get_raw("key").unwrap(), r#"{"a":1}"#);

    writer.remove("key").unwrap();
    assert_eq!(storage.get("key").unwrap(), None);
}

#[tokio::test]
async fn test_engine_over_file_storage_survives_reopen() {
    let dir = tempdir().unwrap();
    let dummy = dummy();

    {
        let mut engine = Engine::builder(FileStorage::open(dir.path()).unwrap())
            .service(dummy.clone())
            .open()
            .unwrap();
        engine
            .add_timeline(timeline("Home", vec![endpoint(EndpointType::Home)]))
            .unwrap();
        engine.start().await;
        engine
            .perform_action(&ArticleId::new(DUMMY_SERVICE, "0"), ActionKind::Like)
            .await
            .unwrap();
    }

    let mut engine = Engine::builder(FileStorage::open(dir.path()).unwrap())
        .service(dummy.clone())
        .open()
        .unwrap();
    assert_eq!(engine.timelines().len(), 1);
    assert_eq!(engine.timelines()[0].title(), "Home");

    // Articles live in memory only and are fetched again.
    assert!(engine.store().is_empty());
    engine.start().await;
    assert_eq!(engine.timelines()[0].articles().len(), 1);
}
