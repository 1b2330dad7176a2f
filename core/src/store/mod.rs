// Store module: local persistence of curated stories and preferences

pub mod backend;
pub mod local;

pub use backend::{MemoryStorage, StorageBackend};
#[cfg(not(target_arch = "wasm32"))]
pub use backend::SledStorage;
#[cfg(target_arch = "wasm32")]
pub use backend::IndexedDbStorage;
pub use local::{BackendKind, ClearScope, LocalStore, Preference, STORAGE_SCHEMA_VERSION};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("failed to encode or decode record: {0}")]
    Serialization(String),
    #[error("stored schema version {found} is newer than supported version {supported}")]
    SchemaTooNew { found: u32, supported: u32 },
    #[error("store initialization failed: {0}")]
    InitializationFailed(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
