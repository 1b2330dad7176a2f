use std::sync::Arc;

use proptest::prelude::*;
use storykeep_core::store::MemoryStorage;
use storykeep_core::{
    Category, ClearScope, ErrorPolicy, ExportBundle, LocalStore, ManagerConfig, StorageError,
    Story, StoryKeepError, UserStoryManager,
};

fn manager() -> UserStoryManager {
    UserStoryManager::new(Arc::new(LocalStore::in_memory()), ManagerConfig::default())
}

fn strict_manager(store: LocalStore) -> UserStoryManager {
    UserStoryManager::new(
        Arc::new(store),
        ManagerConfig {
            error_policy: ErrorPolicy::Strict,
        },
    )
}

#[tokio::test]
async fn test_categories_are_independent() {
    let manager = manager();
    let story = Story::new("s1", "Test");

    manager.save_for_later(&story).await.unwrap();
    let status = manager.status("s1").await.unwrap();
    assert!(status.is_saved && !status.is_liked && !status.is_offline);

    manager.like(&story).await.unwrap();
    let status = manager.status("s1").await.unwrap();
    assert!(status.is_saved && status.is_liked && !status.is_offline);

    manager
        .clear(ClearScope::Category(Category::Saved))
        .await
        .unwrap();
    let status = manager.status("s1").await.unwrap();
    assert!(!status.is_saved && status.is_liked && !status.is_offline);
    assert!(status.has_any_status);
}

#[tokio::test]
async fn test_like_then_unlike_restores_status() {
    let manager = manager();
    let story = Story::new("s1", "Test");
    manager.save_for_later(&story).await.unwrap();

    let before = manager.status("s1").await.unwrap();
    manager.like(&story).await.unwrap();
    assert!(manager.status("s1").await.unwrap().is_liked);
    manager.unlike("s1").await.unwrap();

    assert_eq!(manager.status("s1").await.unwrap(), before);
}

#[tokio::test]
async fn test_like_then_unlike_keeps_auto_download() {
    let manager = manager();
    manager.set_auto_save_liked(true).await.unwrap();
    let story = Story::new("s1", "Test");
    manager.save_for_later(&story).await.unwrap();

    let before = manager.status("s1").await.unwrap();
    assert!(!before.is_offline);
    manager.like(&story).await.unwrap();
    manager.unlike("s1").await.unwrap();

    let after = manager.status("s1").await.unwrap();
    assert!(!after.is_liked);
    assert_eq!(after.is_saved, before.is_saved);
    assert!(after.is_offline);
    assert_eq!(
        manager.all_user_stories().await.unwrap().offline[0].id(),
        "s1"
    );
}

#[tokio::test]
async fn test_put_replaces_by_id() {
    let manager = manager();
    manager.save_for_later(&Story::new("s1", "Old")).await.unwrap();
    manager.save_for_later(&Story::new("s1", "New")).await.unwrap();

    let stories = manager.all_user_stories().await.unwrap();
    assert_eq!(stories.saved.len(), 1);
    assert_eq!(stories.saved[0].story.name, "New");
}

#[tokio::test]
async fn test_remove_missing_is_not_an_error() {
    let manager = manager();
    assert!(manager.unsave("never-saved").await.unwrap());
    assert!(manager.remove_offline("never-saved").await.unwrap());
}

#[tokio::test]
async fn test_unique_stories_first_occurrence_wins() {
    let manager = manager();
    manager.save_for_later(&Story::new("a", "Saved copy")).await.unwrap();
    manager.like(&Story::new("a", "Liked copy")).await.unwrap();
    manager.download_for_offline(&Story::new("b", "B")).await.unwrap();

    let stories = manager.all_user_stories().await.unwrap();
    assert_eq!(stories.total, 3);

    let unique = stories.unique_stories();
    assert_eq!(unique.len(), 2);
    assert_eq!(unique[0].name, "Saved copy");
    assert_eq!(unique[1].id, "b");
}

#[tokio::test]
async fn test_export_import_reproduces_state() {
    let source = manager();
    source.save_for_later(&Story::new("s1", "One")).await.unwrap();
    source.like(&Story::new("s2", "Two")).await.unwrap();
    source.download_for_offline(&Story::new("s1", "One")).await.unwrap();
    source.set_offline_mode(true).await.unwrap();

    let bundle = source.export_all().await.unwrap();
    let json = bundle.to_json_pretty().unwrap();

    let target = manager();
    target.save_for_later(&Story::new("stale", "Gone")).await.unwrap();
    let parsed = ExportBundle::from_json(&json).unwrap();
    let imported = target.import_all(&parsed).await.unwrap();

    assert_eq!(imported, 3);
    assert_eq!(
        target.all_user_stories().await.unwrap(),
        source.all_user_stories().await.unwrap()
    );
    assert!(target.offline_mode().await.unwrap());
    assert!(!target.status("stale").await.unwrap().has_any_status);
}

#[tokio::test]
async fn test_import_rejects_invalid_bundle_without_touching_store() {
    let manager = manager();
    manager.save_for_later(&Story::new("keep", "Keep")).await.unwrap();

    let err = ExportBundle::from_json(r#"{"version":"9.0.0"}"#).unwrap_err();
    assert!(matches!(err, StoryKeepError::InvalidExport(_)));

    let mut bundle = manager.export_all().await.unwrap();
    bundle.version = "1.0.0".into();
    assert!(manager.import_all(&bundle).await.is_err());
    assert!(manager.status("keep").await.unwrap().is_saved);
}

#[tokio::test]
async fn test_lenient_policy_degrades_on_broken_store() {
    let store = LocalStore::with_backend(Arc::new(ReadOnlyStorage::default()));
    let manager = UserStoryManager::new(Arc::new(store), ManagerConfig::default());

    assert!(!manager.save_for_later(&Story::new("s1", "x")).await.unwrap());
    assert!(!manager.status("s1").await.unwrap().has_any_status);
    assert_eq!(manager.all_user_stories().await.unwrap().total, 0);
    assert!(!manager.auto_save_liked().await.unwrap());
}

#[tokio::test]
async fn test_strict_policy_surfaces_errors() {
    let store = LocalStore::with_backend(Arc::new(ReadOnlyStorage::default()));
    let manager = strict_manager(store);

    let err = manager
        .save_for_later(&Story::new("s1", "x"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Backend(_)));
}

#[tokio::test]
async fn test_strict_policy_succeeds_on_healthy_store() {
    let manager = strict_manager(LocalStore::with_backend(Arc::new(MemoryStorage::new())));
    assert!(manager.like(&Story::new("s1", "x")).await.unwrap());
    assert!(manager.status("s1").await.unwrap().is_liked);
}

#[tokio::test]
async fn test_clear_all_resets_preferences() {
    let manager = manager();
    manager.set_auto_save_liked(true).await.unwrap();
    manager.like(&Story::new("s1", "x")).await.unwrap();

    manager.clear(ClearScope::All).await.unwrap();
    assert!(!manager.auto_save_liked().await.unwrap());
    assert_eq!(manager.all_user_stories().await.unwrap().total, 0);
}

/// Accepts the schema bootstrap, then rejects every story write.
#[derive(Default)]
struct ReadOnlyStorage {
    inner: MemoryStorage,
}

impl storykeep_core::store::StorageBackend for ReadOnlyStorage {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        if key.starts_with(b"meta/") {
            return self.inner.put(key, value);
        }
        Err(StorageError::Backend("read-only".into()))
    }
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.inner.get(key)
    }
    fn remove(&self, _key: &[u8]) -> Result<(), StorageError> {
        Err(StorageError::Backend("read-only".into()))
    }
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        if prefix.starts_with(b"meta/") {
            return self.inner.scan_prefix(prefix);
        }
        Err(StorageError::Backend("read-only".into()))
    }
    fn count_prefix(&self, prefix: &[u8]) -> Result<usize, StorageError> {
        self.inner.count_prefix(prefix)
    }
    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_put_then_remove_leaves_no_trace(
        ids in proptest::collection::vec("[a-z0-9-]{1,12}", 1..8),
        category in prop_oneof![
            Just(Category::Saved),
            Just(Category::Liked),
            Just(Category::Offline),
        ],
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let store = LocalStore::in_memory();
            for id in &ids {
                store
                    .put(category, storykeep_core::StoryRecord::new(category, Story::new(id.as_str(), "p")))
                    .await
                    .unwrap();
                prop_assert!(store.exists(category, id).await.unwrap());
            }

            let mut unique = ids.clone();
            unique.sort();
            unique.dedup();
            prop_assert_eq!(store.count(category).await.unwrap(), unique.len());

            for id in &ids {
                store.remove(category, id).await.unwrap();
                prop_assert!(!store.exists(category, id).await.unwrap());
            }
            prop_assert_eq!(store.count(category).await.unwrap(), 0);
            Ok(())
        })?;
    }
}
