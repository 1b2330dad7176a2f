// User story manager: category-aware actions over the local store
//
// Translates save/like/download actions into LocalStore operations, derives
// per-story status, and owns preferences, backup and the storage report.
// Storage failures go through the configured ErrorPolicy.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::export::ExportBundle;
use crate::model::{Category, Story, StoryRecord, StoryStatus, UserStories};
use crate::store::{ClearScope, LocalStore, StorageError};
use crate::StoryKeepError;

pub const PREF_AUTO_SAVE_LIKED: &str = "autoSaveLiked";
pub const PREF_OFFLINE_MODE: &str = "offlineMode";

/// How storage errors reach callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Log and degrade to the empty result (`[]`, `false`, defaults).
    #[default]
    Lenient,
    /// Return the error.
    Strict,
}

#[derive(Debug, Clone, Default)]
pub struct ManagerConfig {
    pub error_policy: ErrorPolicy,
}

/// User-facing feedback for a completed action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionNotice {
    Saved { name: String },
    Unsaved { id: String },
    Liked { name: String },
    Unliked { id: String },
    Downloaded { name: String },
    RemovedOffline { id: String },
    BatchDownloaded { downloaded: usize, total: usize },
    Imported { records: usize },
    Cleared { scope: ClearScope },
}

impl fmt::Display for ActionNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionNotice::Saved { name } => write!(f, "\"{}\" saved for later", name),
            ActionNotice::Unsaved { id } => write!(f, "{} removed from saved stories", id),
            ActionNotice::Liked { name } => write!(f, "\"{}\" added to favorites", name),
            ActionNotice::Unliked { id } => write!(f, "{} removed from favorites", id),
            ActionNotice::Downloaded { name } => write!(f, "\"{}\" available offline", name),
            ActionNotice::RemovedOffline { id } => write!(f, "{} removed from offline stories", id),
            ActionNotice::BatchDownloaded { downloaded, total } => {
                write!(f, "{}/{} stories downloaded for offline", downloaded, total)
            }
            ActionNotice::Imported { records } => write!(f, "{} stories imported", records),
            ActionNotice::Cleared { scope } => match scope {
                ClearScope::All => f.write_str("All local data cleared"),
                ClearScope::Category(c) => write!(f, "{} stories cleared", c),
            },
        }
    }
}

/// Receives action notices (toasts, desktop notifications, terminal lines).
///
/// A failing notifier never fails the action that triggered it.
pub trait ActionNotifier: Send + Sync {
    fn notify(&self, notice: &ActionNotice) -> anyhow::Result<()>;
}

/// Default notifier: writes notices to the log.
pub struct LogNotifier;

impl ActionNotifier for LogNotifier {
    fn notify(&self, notice: &ActionNotice) -> anyhow::Result<()> {
        tracing::info!("{}", notice);
        Ok(())
    }
}

/// Size and freshness of one category.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryReport {
    pub count: usize,
    pub bytes: usize,
    pub size: String,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageReport {
    pub saved: CategoryReport,
    pub liked: CategoryReport,
    pub offline: CategoryReport,
    pub total_count: usize,
    pub total_size: String,
}

pub struct UserStoryManager {
    store: Arc<LocalStore>,
    notifier: Arc<dyn ActionNotifier>,
    config: ManagerConfig,
}

impl UserStoryManager {
    pub fn new(store: Arc<LocalStore>, config: ManagerConfig) -> Self {
        Self::with_notifier(store, config, Arc::new(LogNotifier))
    }

    pub fn with_notifier(
        store: Arc<LocalStore>,
        config: ManagerConfig,
        notifier: Arc<dyn ActionNotifier>,
    ) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    pub fn error_policy(&self) -> ErrorPolicy {
        self.config.error_policy
    }

    // ------------------------------------------------------------------------
    // CATEGORY ACTIONS
    // ------------------------------------------------------------------------

    pub async fn save_for_later(&self, story: &Story) -> Result<bool, StorageError> {
        let ok = self.insert(Category::Saved, story).await?;
        if ok {
            self.announce(ActionNotice::Saved {
                name: story.name.clone(),
            });
        }
        Ok(ok)
    }

    pub async fn unsave(&self, id: &str) -> Result<bool, StorageError> {
        let ok = self.delete(Category::Saved, id).await?;
        if ok {
            self.announce(ActionNotice::Unsaved { id: id.to_string() });
        }
        Ok(ok)
    }

    /// Like a story; with `autoSaveLiked` on, it is also downloaded for offline.
    pub async fn like(&self, story: &Story) -> Result<bool, StorageError> {
        let ok = self.insert(Category::Liked, story).await?;
        if !ok {
            return Ok(false);
        }
        self.announce(ActionNotice::Liked {
            name: story.name.clone(),
        });

        if self.auto_save_liked().await? {
            tracing::debug!("autoSaveLiked on, downloading {}", story.id);
            self.download_for_offline(story).await?;
        }
        Ok(true)
    }

    pub async fn unlike(&self, id: &str) -> Result<bool, StorageError> {
        let ok = self.delete(Category::Liked, id).await?;
        if ok {
            self.announce(ActionNotice::Unliked { id: id.to_string() });
        }
        Ok(ok)
    }

    pub async fn download_for_offline(&self, story: &Story) -> Result<bool, StorageError> {
        let ok = self.insert(Category::Offline, story).await?;
        if ok {
            self.announce(ActionNotice::Downloaded {
                name: story.name.clone(),
            });
        }
        Ok(ok)
    }

    pub async fn remove_offline(&self, id: &str) -> Result<bool, StorageError> {
        let ok = self.delete(Category::Offline, id).await?;
        if ok {
            self.announce(ActionNotice::RemovedOffline { id: id.to_string() });
        }
        Ok(ok)
    }

    /// Download stories one at a time.
    ///
    /// `on_progress(completed, total)` runs after every successful item.
    /// Failed items are logged and skipped. Returns the number downloaded.
    pub async fn download_many<F>(&self, stories: &[Story], mut on_progress: F) -> usize
    where
        F: FnMut(usize, usize),
    {
        let total = stories.len();
        let mut downloaded = 0usize;

        for story in stories {
            let record = StoryRecord::new(Category::Offline, story.clone());
            match self.store.put(Category::Offline, record).await {
                Ok(_) => {
                    downloaded += 1;
                    on_progress(downloaded, total);
                }
                Err(e) => tracing::warn!("Failed to download story {}: {}", story.id, e),
            }
        }

        tracing::info!("Batch download finished: {}/{}", downloaded, total);
        self.announce(ActionNotice::BatchDownloaded { downloaded, total });
        downloaded
    }

    // ------------------------------------------------------------------------
    // QUERIES
    // ------------------------------------------------------------------------

    /// Membership of `id` in each category, recomputed on every call.
    pub async fn status(&self, id: &str) -> Result<StoryStatus, StorageError> {
        let is_saved = self.membership(Category::Saved, id).await?;
        let is_liked = self.membership(Category::Liked, id).await?;
        let is_offline = self.membership(Category::Offline, id).await?;
        Ok(StoryStatus::new(id, is_saved, is_liked, is_offline))
    }

    pub async fn all_user_stories(&self) -> Result<UserStories, StorageError> {
        let saved = self.records(Category::Saved).await?;
        let liked = self.records(Category::Liked).await?;
        let offline = self.records(Category::Offline).await?;
        Ok(UserStories::new(saved, liked, offline))
    }

    pub async fn storage_report(&self) -> Result<StorageReport, StorageError> {
        let stories = self.all_user_stories().await?;

        let saved = category_report(&stories.saved)?;
        let liked = category_report(&stories.liked)?;
        let offline = category_report(&stories.offline)?;
        let total_bytes = saved.bytes + liked.bytes + offline.bytes;

        Ok(StorageReport {
            total_count: stories.total,
            total_size: format_bytes(total_bytes),
            saved,
            liked,
            offline,
        })
    }

    // ------------------------------------------------------------------------
    // PREFERENCES
    // ------------------------------------------------------------------------

    pub async fn auto_save_liked(&self) -> Result<bool, StorageError> {
        let result = self.store.get_preference(PREF_AUTO_SAVE_LIKED, false).await;
        self.settle("read autoSaveLiked", result, false)
    }

    pub async fn set_auto_save_liked(&self, enabled: bool) -> Result<bool, StorageError> {
        let result = self
            .store
            .set_preference(PREF_AUTO_SAVE_LIKED, enabled)
            .await
            .map(|_| true);
        self.settle("write autoSaveLiked", result, false)
    }

    pub async fn offline_mode(&self) -> Result<bool, StorageError> {
        let result = self.store.get_preference(PREF_OFFLINE_MODE, false).await;
        self.settle("read offlineMode", result, false)
    }

    pub async fn set_offline_mode(&self, enabled: bool) -> Result<bool, StorageError> {
        let result = self
            .store
            .set_preference(PREF_OFFLINE_MODE, enabled)
            .await
            .map(|_| true);
        self.settle("write offlineMode", result, false)
    }

    // ------------------------------------------------------------------------
    // MAINTENANCE
    // ------------------------------------------------------------------------

    pub async fn clear(&self, scope: ClearScope) -> Result<bool, StorageError> {
        let result = self.store.clear(scope).await.map(|_| true);
        let ok = self.settle("clear", result, false)?;
        if ok {
            self.announce(ActionNotice::Cleared { scope });
        }
        Ok(ok)
    }

    pub async fn export_all(&self) -> Result<ExportBundle, StorageError> {
        let user_stories = self.all_user_stories().await?;
        let preferences = self.store.preferences().await;
        let preferences = self.settle("read preferences", preferences, BTreeMap::new())?;
        Ok(ExportBundle::new(user_stories, preferences))
    }

    /// Replace all local state with the bundle's content.
    ///
    /// Always strict: a half-applied import is reported, never hidden.
    pub async fn import_all(&self, bundle: &ExportBundle) -> Result<usize, StoryKeepError> {
        bundle.validate()?;

        self.store.clear(ClearScope::All).await?;

        let mut records = 0usize;
        for category in Category::ALL {
            for record in bundle.user_stories.category(category) {
                self.store.put(category, record.clone()).await?;
                records += 1;
            }
        }
        for (name, value) in &bundle.preferences {
            self.store.set_preference(name, value).await?;
        }
        self.store.flush().await?;

        tracing::info!(
            "Imported {} records and {} preferences from export dated {}",
            records,
            bundle.preferences.len(),
            bundle.export_date
        );
        self.announce(ActionNotice::Imported { records });
        Ok(records)
    }

    // ------------------------------------------------------------------------
    // HELPERS
    // ------------------------------------------------------------------------

    async fn insert(&self, category: Category, story: &Story) -> Result<bool, StorageError> {
        let record = StoryRecord::new(category, story.clone());
        let result = self.store.put(category, record).await.map(|_| true);
        self.settle(category.collection(), result, false)
    }

    async fn delete(&self, category: Category, id: &str) -> Result<bool, StorageError> {
        let result = self.store.remove(category, id).await.map(|_| true);
        self.settle(category.collection(), result, false)
    }

    async fn membership(&self, category: Category, id: &str) -> Result<bool, StorageError> {
        let result = self.store.exists(category, id).await;
        self.settle(category.collection(), result, false)
    }

    async fn records(&self, category: Category) -> Result<Vec<StoryRecord>, StorageError> {
        let result = self.store.list(category).await;
        self.settle(category.collection(), result, Vec::new())
    }

    fn settle<T>(
        &self,
        operation: &str,
        result: Result<T, StorageError>,
        fallback: T,
    ) -> Result<T, StorageError> {
        match (result, self.config.error_policy) {
            (Ok(value), _) => Ok(value),
            (Err(e), ErrorPolicy::Strict) => Err(e),
            (Err(e), ErrorPolicy::Lenient) => {
                tracing::warn!("Storage operation {} failed, degrading: {}", operation, e);
                Ok(fallback)
            }
        }
    }

    fn announce(&self, notice: ActionNotice) {
        if let Err(e) = self.notifier.notify(&notice) {
            tracing::warn!("Notifier failed for \"{}\": {}", notice, e);
        }
    }
}

fn category_report(records: &[StoryRecord]) -> Result<CategoryReport, StorageError> {
    let bytes = serde_json::to_vec(records)?.len();
    Ok(CategoryReport {
        count: records.len(),
        bytes,
        size: format_bytes(bytes),
        last_updated: records.iter().filter_map(StoryRecord::stamp).max(),
    })
}

/// Human-readable size, base 1024.
pub fn format_bytes(bytes: usize) -> String {
    const SIZES: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let exponent = ((bytes as f64).ln() / 1024f64.ln()).floor() as usize;
    let exponent = exponent.min(SIZES.len() - 1);
    let value = bytes as f64 / 1024f64.powi(exponent as i32);
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, SIZES[exponent])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStorage, StorageBackend};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        notices: Mutex<Vec<ActionNotice>>,
    }

    impl ActionNotifier for RecordingNotifier {
        fn notify(&self, notice: &ActionNotice) -> anyhow::Result<()> {
            self.notices.lock().push(notice.clone());
            Ok(())
        }
    }

    struct FailingNotifier;

    impl ActionNotifier for FailingNotifier {
        fn notify(&self, _notice: &ActionNotice) -> anyhow::Result<()> {
            anyhow::bail!("notification permission denied")
        }
    }

    fn manager_with(notifier: Arc<dyn ActionNotifier>) -> UserStoryManager {
        UserStoryManager::with_notifier(
            Arc::new(LocalStore::in_memory()),
            ManagerConfig::default(),
            notifier,
        )
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 Bytes");
        assert_eq!(format_bytes(500), "500 Bytes");
        assert_eq!(format_bytes(1024), "1 KB");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5 MB");
    }

    #[tokio::test]
    async fn test_notices_sent_on_success() {
        let notifier = Arc::new(RecordingNotifier::default());
        let manager = manager_with(notifier.clone());
        let story = Story::new("s1", "Test");

        manager.save_for_later(&story).await.unwrap();
        manager.unsave("s1").await.unwrap();

        let notices = notifier.notices.lock();
        assert_eq!(
            *notices,
            vec![
                ActionNotice::Saved {
                    name: "Test".into()
                },
                ActionNotice::Unsaved { id: "s1".into() },
            ]
        );
    }

    #[tokio::test]
    async fn test_failing_notifier_does_not_fail_action() {
        let manager = manager_with(Arc::new(FailingNotifier));
        let story = Story::new("s1", "Test");
        assert!(manager.like(&story).await.unwrap());
        assert!(manager.status("s1").await.unwrap().is_liked);
    }

    #[tokio::test]
    async fn test_like_with_auto_save_downloads() {
        let manager = manager_with(Arc::new(LogNotifier));
        manager.set_auto_save_liked(true).await.unwrap();

        manager.like(&Story::new("s1", "Test")).await.unwrap();
        let status = manager.status("s1").await.unwrap();
        assert!(status.is_liked);
        assert!(status.is_offline);
        assert!(!status.is_saved);
    }

    #[tokio::test]
    async fn test_like_without_auto_save_stays_liked_only() {
        let manager = manager_with(Arc::new(LogNotifier));
        manager.like(&Story::new("s1", "Test")).await.unwrap();
        let status = manager.status("s1").await.unwrap();
        assert!(status.is_liked);
        assert!(!status.is_offline);
    }

    #[tokio::test]
    async fn test_download_many_reports_progress() {
        let notifier = Arc::new(RecordingNotifier::default());
        let manager = manager_with(notifier.clone());
        let stories = vec![
            Story::new("a", "A"),
            Story::new("b", "B"),
            Story::new("c", "C"),
        ];

        let mut progress = Vec::new();
        let downloaded = manager
            .download_many(&stories, |done, total| progress.push((done, total)))
            .await;

        assert_eq!(downloaded, 3);
        assert_eq!(progress, vec![(1, 3), (2, 3), (3, 3)]);
        assert_eq!(
            notifier.notices.lock().last(),
            Some(&ActionNotice::BatchDownloaded {
                downloaded: 3,
                total: 3
            })
        );
    }

    /// Memory backend that refuses writes to one key.
    struct RejectKey {
        inner: MemoryStorage,
        rejected: &'static [u8],
    }

    impl StorageBackend for RejectKey {
        fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
            if key == self.rejected {
                return Err(StorageError::Backend("quota exceeded".into()));
            }
            self.inner.put(key, value)
        }
        fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
            self.inner.get(key)
        }
        fn remove(&self, key: &[u8]) -> Result<(), StorageError> {
            self.inner.remove(key)
        }
        fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
            self.inner.scan_prefix(prefix)
        }
        fn count_prefix(&self, prefix: &[u8]) -> Result<usize, StorageError> {
            self.inner.count_prefix(prefix)
        }
        fn flush(&self) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_download_many_skips_failed_items() {
        let backend = RejectKey {
            inner: MemoryStorage::new(),
            rejected: b"offline_stories/b",
        };
        let notifier = Arc::new(RecordingNotifier::default());
        let manager = UserStoryManager::with_notifier(
            Arc::new(LocalStore::with_backend(Arc::new(backend))),
            ManagerConfig::default(),
            notifier.clone(),
        );
        let stories = vec![
            Story::new("a", "A"),
            Story::new("b", "B"),
            Story::new("c", "C"),
        ];

        let mut progress = Vec::new();
        let downloaded = manager
            .download_many(&stories, |done, total| progress.push((done, total)))
            .await;

        assert_eq!(downloaded, 2);
        assert_eq!(progress, vec![(1, 3), (2, 3)]);
        assert_eq!(
            notifier.notices.lock().last(),
            Some(&ActionNotice::BatchDownloaded {
                downloaded: 2,
                total: 3
            })
        );
        assert!(manager.status("a").await.unwrap().is_offline);
        assert!(!manager.status("b").await.unwrap().is_offline);
        assert!(manager.status("c").await.unwrap().is_offline);
    }

    #[tokio::test]
    async fn test_storage_report() {
        let manager = manager_with(Arc::new(LogNotifier));
        let empty = manager.storage_report().await.unwrap();
        assert_eq!(empty.total_count, 0);
        assert_eq!(empty.saved.last_updated, None);

        manager.save_for_later(&Story::new("a", "A")).await.unwrap();
        manager.save_for_later(&Story::new("b", "B")).await.unwrap();
        manager.download_for_offline(&Story::new("a", "A")).await.unwrap();

        let report = manager.storage_report().await.unwrap();
        assert_eq!(report.saved.count, 2);
        assert_eq!(report.liked.count, 0);
        assert_eq!(report.offline.count, 1);
        assert_eq!(report.total_count, 3);
        assert!(report.saved.last_updated.is_some());
        assert!(report.saved.bytes > 0);
        assert_eq!(report.liked.size, "2 Bytes");
    }

    #[test]
    fn test_notice_messages() {
        assert_eq!(
            ActionNotice::BatchDownloaded {
                downloaded: 2,
                total: 3
            }
            .to_string(),
            "2/3 stories downloaded for offline"
        );
        assert_eq!(
            ActionNotice::Cleared {
                scope: ClearScope::Category(Category::Liked)
            }
            .to_string(),
            "liked stories cleared"
        );
    }
}
