// StoryKeep Core — offline-first story curation
//
// "Can the user still read what they kept when the network is gone?"
//
// Remote API access, categorized local persistence, and the list
// controller that decides which of the two feeds the screen.

pub mod api;
pub mod controller;
pub mod export;
pub mod manager;
pub mod model;
pub mod store;

use thiserror::Error;

pub use api::{ApiError, ClientConfig, StoryApi};
#[cfg(not(target_arch = "wasm32"))]
pub use api::HttpStoryClient;
pub use controller::{
    ControllerConfig, ListController, ListView, ListingSource, LoadOutcome, LoadState,
    MessageKind, NetworkEvent, StoryCard, StoryListing,
};
pub use export::{ExportBundle, EXPORT_FORMAT_VERSION};
pub use manager::{
    ActionNotice, ActionNotifier, ErrorPolicy, LogNotifier, ManagerConfig, StorageReport,
    UserStoryManager,
};
pub use model::{Category, NewStory, Session, Story, StoryRecord, StoryStatus, UserStories};
pub use store::{BackendKind, ClearScope, LocalStore, StorageError};

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Error)]
pub enum StoryKeepError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("invalid export file: {0}")]
    InvalidExport(String),
    #[error("story {0} is not in the current list")]
    StoryNotFound(String),
    #[error("no stories to download")]
    NothingToDownload,
}
