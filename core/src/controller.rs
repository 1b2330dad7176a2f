// List controller: remote-first story listing with local fallback
//
// One load cycle:
//   Idle -> CheckingAuth -> Unauthenticated (redirect)
//                        -> LoadingRemote -> Rendered
//                                         -> LoadingLocal -> Rendered
// A second load while one is in flight is dropped, not queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::api::{ApiError, StoryApi};
use crate::manager::UserStoryManager;
use crate::model::{Category, Story, StoryStatus, UserStories};
use crate::StoryKeepError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    CheckingAuth,
    Unauthenticated,
    LoadingRemote,
    LoadingLocal,
    Rendered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingSource {
    Remote,
    Local,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoryCard {
    pub story: Story,
    pub status: StoryStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoryListing {
    pub source: ListingSource,
    pub cards: Vec<StoryCard>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    Online,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Another load was already running.
    Coalesced,
    Unauthenticated,
    Remote(usize),
    Local(usize),
}

/// Presentation seam. Implementations only format; they hold no state the
/// controller depends on.
pub trait ListView: Send + Sync {
    fn render(&self, listing: &StoryListing);
    fn show_message(&self, kind: MessageKind, message: &str);
    fn redirect_to_login(&self);
    fn update_badge(&self, id: &str, category: Category, active: bool);
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Wait after a network transition before reloading.
    pub settle_delay: Duration,
    /// Initial connectivity assumption.
    pub start_online: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(1),
            start_online: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Route {
    Auto,
    Remote,
    Local,
}

pub struct ListController {
    api: Arc<dyn StoryApi>,
    manager: Arc<UserStoryManager>,
    view: Arc<dyn ListView>,
    config: ControllerConfig,
    state: Mutex<LoadState>,
    loading: AtomicBool,
    online: AtomicBool,
    current: RwLock<Vec<Story>>,
}

impl ListController {
    pub fn new(
        api: Arc<dyn StoryApi>,
        manager: Arc<UserStoryManager>,
        view: Arc<dyn ListView>,
        config: ControllerConfig,
    ) -> Self {
        let online = AtomicBool::new(config.start_online);
        Self {
            api,
            manager,
            view,
            config,
            state: Mutex::new(LoadState::Idle),
            loading: AtomicBool::new(false),
            online,
            current: RwLock::new(Vec::new()),
        }
    }

    pub fn state(&self) -> LoadState {
        *self.state.lock()
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Stories currently on screen.
    pub fn current_stories(&self) -> Vec<Story> {
        self.current.read().clone()
    }

    // ------------------------------------------------------------------------
    // LOAD CYCLES
    // ------------------------------------------------------------------------

    /// Remote when online, local otherwise (or when offline mode is on).
    pub async fn load(&self) -> LoadOutcome {
        self.run_cycle(Route::Auto).await
    }

    /// Force a fresh remote load; falls back to local data when offline.
    pub async fn refresh(&self) -> LoadOutcome {
        if !self.is_online() {
            self.view.show_message(
                MessageKind::Error,
                "No internet connection. Showing saved stories.",
            );
            return self.run_cycle(Route::Local).await;
        }
        self.run_cycle(Route::Remote).await
    }

    /// React to a connectivity change after the settle delay.
    pub async fn on_network_change(&self, event: NetworkEvent) -> LoadOutcome {
        let route = match event {
            NetworkEvent::Online => {
                tracing::info!("Network: back online");
                self.online.store(true, Ordering::SeqCst);
                self.view
                    .show_message(MessageKind::Info, "Back online. Loading latest stories...");
                Route::Remote
            }
            NetworkEvent::Offline => {
                tracing::info!("Network: gone offline");
                self.online.store(false, Ordering::SeqCst);
                self.view.show_message(
                    MessageKind::Info,
                    "Offline mode active. Showing saved stories.",
                );
                Route::Local
            }
        };
        tokio::time::sleep(self.config.settle_delay).await;
        self.run_cycle(route).await
    }

    async fn run_cycle(&self, route: Route) -> LoadOutcome {
        let Some(_guard) = LoadGuard::acquire(&self.loading) else {
            tracing::debug!("Load already in flight, ignoring request");
            return LoadOutcome::Coalesced;
        };

        self.transition(LoadState::CheckingAuth);
        if !self.api.has_token() {
            self.transition(LoadState::Unauthenticated);
            self.view
                .show_message(MessageKind::Warning, "You need to log in first");
            self.view.redirect_to_login();
            return LoadOutcome::Unauthenticated;
        }

        let remote = match route {
            Route::Remote => true,
            Route::Local => false,
            Route::Auto => {
                let offline_mode = self.manager.offline_mode().await.unwrap_or(false);
                self.is_online() && !offline_mode
            }
        };

        if remote {
            self.load_remote().await
        } else {
            self.load_local().await
        }
    }

    async fn load_remote(&self) -> LoadOutcome {
        self.transition(LoadState::LoadingRemote);

        let stories = match self.api.list_stories().await {
            Ok(stories) => stories,
            Err(e) => {
                tracing::warn!("Remote load failed, falling back to local stories: {}", e);
                self.view
                    .show_message(MessageKind::Warning, fallback_message(&e));
                return self.load_local().await;
            }
        };

        let mut cards = Vec::with_capacity(stories.len());
        for story in &stories {
            cards.push(StoryCard {
                status: self.status_or_empty(&story.id).await,
                story: story.clone(),
            });
        }
        let count = stories.len();
        *self.current.write() = stories;

        self.view.render(&StoryListing {
            source: ListingSource::Remote,
            cards,
        });
        if count == 0 {
            self.view
                .show_message(MessageKind::Info, "No stories available yet");
        } else {
            self.view
                .show_message(MessageKind::Success, &format!("{} stories loaded", count));
        }
        self.transition(LoadState::Rendered);
        LoadOutcome::Remote(count)
    }

    async fn load_local(&self) -> LoadOutcome {
        self.transition(LoadState::LoadingLocal);

        let user_stories = match self.manager.all_user_stories().await {
            Ok(user_stories) => user_stories,
            Err(e) => {
                tracing::error!("Offline loading failed: {}", e);
                self.view.show_message(
                    MessageKind::Error,
                    &format!("Could not read saved stories: {}", e),
                );
                UserStories::default()
            }
        };

        let stories = user_stories.unique_stories();
        let cards: Vec<StoryCard> = stories
            .iter()
            .map(|story| StoryCard {
                status: local_status(&user_stories, &story.id),
                story: story.clone(),
            })
            .collect();
        let count = stories.len();
        *self.current.write() = stories;

        self.view.render(&StoryListing {
            source: ListingSource::Local,
            cards,
        });
        if count == 0 {
            self.view.show_message(
                MessageKind::Info,
                "No saved stories yet. Save or download stories while online to read them offline.",
            );
        } else {
            self.view.show_message(
                MessageKind::Info,
                &format!("Offline: showing {} saved stories", count),
            );
        }
        self.transition(LoadState::Rendered);
        LoadOutcome::Local(count)
    }

    // ------------------------------------------------------------------------
    // PER-STORY ACTIONS
    // ------------------------------------------------------------------------

    pub async fn toggle_save(&self, id: &str) -> Result<bool, StoryKeepError> {
        self.toggle(id, Category::Saved).await
    }

    pub async fn toggle_like(&self, id: &str) -> Result<bool, StoryKeepError> {
        self.toggle(id, Category::Liked).await
    }

    pub async fn toggle_download(&self, id: &str) -> Result<bool, StoryKeepError> {
        self.toggle(id, Category::Offline).await
    }

    /// Flip membership of a displayed story in `category`. Returns the new membership.
    async fn toggle(&self, id: &str, category: Category) -> Result<bool, StoryKeepError> {
        let story = self
            .find_story(id)
            .ok_or_else(|| StoryKeepError::StoryNotFound(id.to_string()))?;
        let was_active = self.manager.status(id).await?.contains(category);

        let ok = match (category, was_active) {
            (Category::Saved, true) => self.manager.unsave(id).await?,
            (Category::Saved, false) => self.manager.save_for_later(&story).await?,
            (Category::Liked, true) => self.manager.unlike(id).await?,
            (Category::Liked, false) => self.manager.like(&story).await?,
            (Category::Offline, true) => self.manager.remove_offline(id).await?,
            (Category::Offline, false) => self.manager.download_for_offline(&story).await?,
        };

        if !ok {
            self.view.show_message(
                MessageKind::Error,
                &format!("Could not update {} stories", category),
            );
            return Ok(was_active);
        }

        self.view.update_badge(id, category, !was_active);
        if category == Category::Liked && !was_active {
            // a like may have pulled the story offline too
            let status = self.status_or_empty(id).await;
            self.view
                .update_badge(id, Category::Offline, status.is_offline);
        }
        Ok(!was_active)
    }

    /// Download every displayed story for offline reading.
    pub async fn download_all_visible<F>(&self, on_progress: F) -> Result<usize, StoryKeepError>
    where
        F: FnMut(usize, usize),
    {
        let stories = self.current_stories();
        if stories.is_empty() {
            self.view
                .show_message(MessageKind::Error, "No stories to download");
            return Err(StoryKeepError::NothingToDownload);
        }

        let downloaded = self.manager.download_many(&stories, on_progress).await;
        for story in &stories {
            let status = self.status_or_empty(&story.id).await;
            self.view
                .update_badge(&story.id, Category::Offline, status.is_offline);
        }
        Ok(downloaded)
    }

    fn find_story(&self, id: &str) -> Option<Story> {
        self.current.read().iter().find(|s| s.id == id).cloned()
    }

    async fn status_or_empty(&self, id: &str) -> StoryStatus {
        match self.manager.status(id).await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!("Status lookup for {} failed: {}", id, e);
                StoryStatus::new(id, false, false, false)
            }
        }
    }

    fn transition(&self, next: LoadState) {
        let mut state = self.state.lock();
        tracing::debug!("List state {:?} -> {:?}", *state, next);
        *state = next;
    }
}

fn fallback_message(error: &ApiError) -> &'static str {
    match error {
        ApiError::Status { status: 503, .. } => {
            "Server under maintenance. Showing offline data..."
        }
        ApiError::Unauthorized { .. } => "Session expired. Showing offline data...",
        _ => "Connection problem. Showing offline data...",
    }
}

fn local_status(user_stories: &UserStories, id: &str) -> StoryStatus {
    let has = |category: Category| user_stories.category(category).iter().any(|r| r.id() == id);
    StoryStatus::new(
        id,
        has(Category::Saved),
        has(Category::Liked),
        has(Category::Offline),
    )
}

/// Clears the in-flight flag when the cycle ends, however it ends.
struct LoadGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> LoadGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::ManagerConfig;
    use crate::model::{NewStory, Session};
    use crate::store::LocalStore;
    use async_trait::async_trait;

    mockall::mock! {
        pub Api {}

        #[async_trait]
        impl StoryApi for Api {
            async fn register(&self, name: &str, email: &str, password: &str) -> Result<String, ApiError>;
            async fn login(&self, email: &str, password: &str) -> Result<Session, ApiError>;
            fn set_token(&self, token: Option<String>);
            fn has_token(&self) -> bool;
            async fn list_stories(&self) -> Result<Vec<Story>, ApiError>;
            async fn get_story(&self, id: &str) -> Result<Story, ApiError>;
            async fn add_story(&self, story: NewStory) -> Result<String, ApiError>;
        }
    }

    #[derive(Default)]
    struct RecordingView {
        listings: Mutex<Vec<StoryListing>>,
        messages: Mutex<Vec<(MessageKind, String)>>,
        redirects: Mutex<usize>,
        badges: Mutex<Vec<(String, Category, bool)>>,
    }

    impl ListView for RecordingView {
        fn render(&self, listing: &StoryListing) {
            self.listings.lock().push(listing.clone());
        }
        fn show_message(&self, kind: MessageKind, message: &str) {
            self.messages.lock().push((kind, message.to_string()));
        }
        fn redirect_to_login(&self) {
            *self.redirects.lock() += 1;
        }
        fn update_badge(&self, id: &str, category: Category, active: bool) {
            self.badges.lock().push((id.to_string(), category, active));
        }
    }

    fn setup(api: MockApi) -> (ListController, Arc<UserStoryManager>, Arc<RecordingView>) {
        let manager = Arc::new(UserStoryManager::new(
            Arc::new(LocalStore::in_memory()),
            ManagerConfig::default(),
        ));
        let view = Arc::new(RecordingView::default());
        let controller = ListController::new(
            Arc::new(api),
            manager.clone(),
            view.clone(),
            ControllerConfig {
                settle_delay: Duration::from_millis(10),
                start_online: true,
            },
        );
        (controller, manager, view)
    }

    #[tokio::test]
    async fn test_unauthenticated_redirects() {
        let mut api = MockApi::new();
        api.expect_has_token().return_const(false);
        api.expect_list_stories().never();

        let (controller, _, view) = setup(api);
        assert_eq!(controller.load().await, LoadOutcome::Unauthenticated);
        assert_eq!(controller.state(), LoadState::Unauthenticated);
        assert_eq!(*view.redirects.lock(), 1);
        assert!(view.listings.lock().is_empty());
    }

    #[tokio::test]
    async fn test_remote_listing_carries_status() {
        let mut api = MockApi::new();
        api.expect_has_token().return_const(true);
        api.expect_list_stories()
            .times(1)
            .returning(|| Ok(vec![Story::new("a", "A"), Story::new("b", "B")]));

        let (controller, manager, view) = setup(api);
        manager.like(&Story::new("b", "B")).await.unwrap();

        assert_eq!(controller.load().await, LoadOutcome::Remote(2));
        assert_eq!(controller.state(), LoadState::Rendered);

        let listings = view.listings.lock();
        assert_eq!(listings[0].source, ListingSource::Remote);
        assert!(!listings[0].cards[0].status.has_any_status);
        assert!(listings[0].cards[1].status.is_liked);
    }

    #[tokio::test]
    async fn test_remote_failure_falls_back_to_local() {
        let mut api = MockApi::new();
        api.expect_has_token().return_const(true);
        api.expect_list_stories().returning(|| {
            Err(ApiError::Status {
                status: 503,
                message: "Service Unavailable".into(),
            })
        });

        let (controller, manager, view) = setup(api);
        manager.save_for_later(&Story::new("s1", "Saved")).await.unwrap();
        manager.like(&Story::new("s1", "Saved")).await.unwrap();
        manager.download_for_offline(&Story::new("s2", "Offline")).await.unwrap();

        assert_eq!(controller.load().await, LoadOutcome::Local(2));
        let listings = view.listings.lock();
        assert_eq!(listings[0].source, ListingSource::Local);
        assert_eq!(listings[0].cards[0].status.categories(), vec![Category::Saved, Category::Liked]);
        assert!(view
            .messages
            .lock()
            .iter()
            .any(|(kind, m)| *kind == MessageKind::Warning && m.contains("maintenance")));
    }

    #[tokio::test]
    async fn test_toggle_unknown_story() {
        let mut api = MockApi::new();
        api.expect_has_token().return_const(true);
        api.expect_list_stories().returning(|| Ok(vec![Story::new("a", "A")]));

        let (controller, _, _) = setup(api);
        controller.load().await;
        let err = controller.toggle_save("zzz").await.unwrap_err();
        assert!(matches!(err, StoryKeepError::StoryNotFound(id) if id == "zzz"));
    }

    #[tokio::test]
    async fn test_toggle_flips_and_updates_badge() {
        let mut api = MockApi::new();
        api.expect_has_token().return_const(true);
        api.expect_list_stories().returning(|| Ok(vec![Story::new("a", "A")]));

        let (controller, manager, view) = setup(api);
        controller.load().await;

        assert!(controller.toggle_download("a").await.unwrap());
        assert!(manager.status("a").await.unwrap().is_offline);
        assert!(!controller.toggle_download("a").await.unwrap());
        assert!(!manager.status("a").await.unwrap().is_offline);

        assert_eq!(
            *view.badges.lock(),
            vec![
                ("a".to_string(), Category::Offline, true),
                ("a".to_string(), Category::Offline, false),
            ]
        );
    }

    #[tokio::test]
    async fn test_download_all_requires_listing() {
        let mut api = MockApi::new();
        api.expect_has_token().return_const(true);
        let (controller, _, _) = setup(api);
        let err = controller.download_all_visible(|_, _| {}).await.unwrap_err();
        assert!(matches!(err, StoryKeepError::NothingToDownload));
    }

    #[tokio::test]
    async fn test_offline_event_loads_local() {
        let mut api = MockApi::new();
        api.expect_has_token().return_const(true);
        api.expect_list_stories().never();

        let (controller, _, view) = setup(api);
        let outcome = controller.on_network_change(NetworkEvent::Offline).await;
        assert_eq!(outcome, LoadOutcome::Local(0));
        assert!(!controller.is_online());
        assert_eq!(view.listings.lock()[0].source, ListingSource::Local);
    }

    #[tokio::test]
    async fn test_offline_mode_preference_forces_local() {
        let mut api = MockApi::new();
        api.expect_has_token().return_const(true);
        api.expect_list_stories().never();

        let (controller, manager, _) = setup(api);
        manager.set_offline_mode(true).await.unwrap();
        assert_eq!(controller.load().await, LoadOutcome::Local(0));
    }

    #[test]
    fn test_load_guard_is_exclusive() {
        let flag = AtomicBool::new(false);
        let first = LoadGuard::acquire(&flag);
        assert!(first.is_some());
        assert!(LoadGuard::acquire(&flag).is_none());
        drop(first);
        assert!(LoadGuard::acquire(&flag).is_some());
    }
}
