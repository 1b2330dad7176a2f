// Local story store: categorized records and preferences over a StorageBackend
//
// Key layout:
//   meta/schema_version          u32 (JSON)
//   saved_stories/<id>           StoryRecord
//   liked_stories/<id>           StoryRecord
//   offline_stories/<id>         StoryRecord
//   user_preferences/<name>      Preference
//   session/current              Session
//
// Collections are key prefixes, so a schema upgrade that adds one never
// touches the others.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use super::backend::{MemoryStorage, StorageBackend};
use super::StorageError;
use crate::model::{Category, Session, StoryRecord};

pub const STORAGE_SCHEMA_VERSION: u32 = 2;

const SCHEMA_VERSION_KEY: &[u8] = b"meta/schema_version";
const PREFERENCES_COLLECTION: &str = "user_preferences";
const SESSION_KEY: &[u8] = b"session/current";

/// Which backend the store opens on first use.
#[derive(Clone)]
pub enum BackendKind {
    /// Fresh in-memory map, gone when the store is dropped.
    Memory,
    /// Sled database at the given directory.
    #[cfg(not(target_arch = "wasm32"))]
    Sled { path: std::path::PathBuf },
    /// Browser IndexedDB database with the given name.
    #[cfg(target_arch = "wasm32")]
    IndexedDb { db_name: String },
    /// An already constructed backend.
    Provided(Arc<dyn StorageBackend>),
}

impl std::fmt::Debug for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Memory => f.write_str("Memory"),
            #[cfg(not(target_arch = "wasm32"))]
            BackendKind::Sled { path } => f.debug_struct("Sled").field("path", path).finish(),
            #[cfg(target_arch = "wasm32")]
            BackendKind::IndexedDb { db_name } => {
                f.debug_struct("IndexedDb").field("db_name", db_name).finish()
            }
            BackendKind::Provided(_) => f.write_str("Provided"),
        }
    }
}

/// Which collections `clear` wipes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearScope {
    Category(Category),
    /// All three story categories plus preferences. The session survives.
    All,
}

impl std::str::FromStr for ClearScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            Ok(ClearScope::All)
        } else {
            s.parse::<Category>().map(ClearScope::Category)
        }
    }
}

/// A stored user preference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preference {
    pub key: String,
    pub value: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

/// Structured local store.
///
/// The backend is opened lazily by the first operation. Concurrent first
/// callers share one initialization; its outcome, success or failure, is
/// kept for the lifetime of the store.
pub struct LocalStore {
    kind: BackendKind,
    backend: OnceCell<Result<Arc<dyn StorageBackend>, StorageError>>,
    open_attempts: AtomicUsize,
}

impl LocalStore {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            backend: OnceCell::new(),
            open_attempts: AtomicUsize::new(0),
        }
    }

    /// Ephemeral store backed by a fresh in-memory map.
    pub fn in_memory() -> Self {
        Self::new(BackendKind::Memory)
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn persistent(path: impl Into<std::path::PathBuf>) -> Self {
        Self::new(BackendKind::Sled { path: path.into() })
    }

    pub fn with_backend(backend: Arc<dyn StorageBackend>) -> Self {
        Self::new(BackendKind::Provided(backend))
    }

    /// Open the backend now instead of on first use.
    pub async fn init(&self) -> Result<(), StorageError> {
        self.backend().await.map(|_| ())
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.backend.get(), Some(Ok(_)))
    }

    /// How many times the backend open sequence has run (0 or 1).
    pub fn open_attempts(&self) -> usize {
        self.open_attempts.load(Ordering::SeqCst)
    }

    async fn backend(&self) -> Result<Arc<dyn StorageBackend>, StorageError> {
        self.backend
            .get_or_init(|| async {
                self.open_attempts.fetch_add(1, Ordering::SeqCst);
                let opened = open_backend(&self.kind).await.and_then(|backend| {
                    ensure_schema(backend.as_ref())?;
                    Ok(backend)
                });
                match &opened {
                    Ok(_) => tracing::info!("Local store opened ({:?})", self.kind),
                    Err(e) => tracing::error!("Local store failed to open ({:?}): {}", self.kind, e),
                }
                opened
            })
            .await
            .clone()
    }

    // ------------------------------------------------------------------------
    // STORY RECORDS
    // ------------------------------------------------------------------------

    /// Insert or replace a record by id, stamping the category timestamp if absent.
    pub async fn put(
        &self,
        category: Category,
        mut record: StoryRecord,
    ) -> Result<StoryRecord, StorageError> {
        let backend = self.backend().await?;
        record.category = category;
        record.stamp_mut().get_or_insert_with(Utc::now);

        let value = serde_json::to_vec(&record)?;
        backend.put(&record_key(category, record.id()), &value)?;
        tracing::debug!("Stored {} in {}", record.id(), category.collection());
        Ok(record)
    }

    /// Delete a record by id. Missing ids are not an error.
    pub async fn remove(&self, category: Category, id: &str) -> Result<(), StorageError> {
        let backend = self.backend().await?;
        backend.remove(&record_key(category, id))?;
        tracing::debug!("Removed {} from {}", id, category.collection());
        Ok(())
    }

    pub async fn get(
        &self,
        category: Category,
        id: &str,
    ) -> Result<Option<StoryRecord>, StorageError> {
        let backend = self.backend().await?;
        match backend.get(&record_key(category, id))? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    pub async fn exists(&self, category: Category, id: &str) -> Result<bool, StorageError> {
        Ok(self.get(category, id).await?.is_some())
    }

    /// All records of a category, in key order. Undecodable entries are skipped.
    pub async fn list(&self, category: Category) -> Result<Vec<StoryRecord>, StorageError> {
        let backend = self.backend().await?;
        let entries = backend.scan_prefix(&collection_prefix(category.collection()))?;

        let mut records = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            match serde_json::from_slice::<StoryRecord>(&value) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(
                    "Skipping undecodable record {}: {}",
                    String::from_utf8_lossy(&key),
                    e
                ),
            }
        }
        Ok(records)
    }

    /// Raw entry count for a category, without decoding. Undecodable entries
    /// that `list` skips are still counted.
    pub async fn count(&self, category: Category) -> Result<usize, StorageError> {
        let backend = self.backend().await?;
        backend.count_prefix(&collection_prefix(category.collection()))
    }

    pub async fn clear(&self, scope: ClearScope) -> Result<(), StorageError> {
        let backend = self.backend().await?;
        let collections: Vec<&str> = match scope {
            ClearScope::Category(category) => vec![category.collection()],
            ClearScope::All => Category::ALL
                .iter()
                .map(|c| c.collection())
                .chain(std::iter::once(PREFERENCES_COLLECTION))
                .collect(),
        };

        for collection in collections {
            let mut removed = 0usize;
            for (key, _) in backend.scan_prefix(&collection_prefix(collection))? {
                backend.remove(&key)?;
                removed += 1;
            }
            tracing::info!("Cleared {} ({} entries)", collection, removed);
        }
        backend.flush()
    }

    // ------------------------------------------------------------------------
    // PREFERENCES
    // ------------------------------------------------------------------------

    pub async fn get_preference<T: DeserializeOwned>(
        &self,
        name: &str,
        default: T,
    ) -> Result<T, StorageError> {
        let backend = self.backend().await?;
        let Some(data) = backend.get(&preference_key(name))? else {
            return Ok(default);
        };
        let preference: Preference = serde_json::from_slice(&data)?;
        Ok(serde_json::from_value(preference.value).unwrap_or(default))
    }

    pub async fn set_preference<T: Serialize>(
        &self,
        name: &str,
        value: T,
    ) -> Result<(), StorageError> {
        let backend = self.backend().await?;
        let preference = Preference {
            key: name.to_string(),
            value: serde_json::to_value(value)?,
            updated_at: Utc::now(),
        };
        backend.put(&preference_key(name), &serde_json::to_vec(&preference)?)?;
        tracing::debug!("Preference {} = {}", name, preference.value);
        Ok(())
    }

    /// Every stored preference, keyed by name.
    pub async fn preferences(&self) -> Result<BTreeMap<String, serde_json::Value>, StorageError> {
        let backend = self.backend().await?;
        let mut preferences = BTreeMap::new();
        for (_, value) in backend.scan_prefix(&collection_prefix(PREFERENCES_COLLECTION))? {
            let preference: Preference = serde_json::from_slice(&value)?;
            preferences.insert(preference.key, preference.value);
        }
        Ok(preferences)
    }

    // ------------------------------------------------------------------------
    // SESSION
    // ------------------------------------------------------------------------

    pub async fn load_session(&self) -> Result<Option<Session>, StorageError> {
        let backend = self.backend().await?;
        match backend.get(SESSION_KEY)? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    pub async fn save_session(&self, session: &Session) -> Result<(), StorageError> {
        let backend = self.backend().await?;
        backend.put(SESSION_KEY, &serde_json::to_vec(session)?)?;
        backend.flush()
    }

    pub async fn clear_session(&self) -> Result<(), StorageError> {
        let backend = self.backend().await?;
        backend.remove(SESSION_KEY)?;
        backend.flush()
    }

    pub async fn flush(&self) -> Result<(), StorageError> {
        self.backend().await?.flush()
    }
}

async fn open_backend(kind: &BackendKind) -> Result<Arc<dyn StorageBackend>, StorageError> {
    match kind {
        BackendKind::Memory => Ok(Arc::new(MemoryStorage::new())),
        #[cfg(not(target_arch = "wasm32"))]
        BackendKind::Sled { path } => {
            std::fs::create_dir_all(path)
                .map_err(|e| StorageError::InitializationFailed(e.to_string()))?;
            Ok(Arc::new(super::backend::SledStorage::open(path)?))
        }
        #[cfg(target_arch = "wasm32")]
        BackendKind::IndexedDb { db_name } => {
            Ok(Arc::new(super::backend::IndexedDbStorage::open(db_name).await?))
        }
        BackendKind::Provided(backend) => Ok(backend.clone()),
    }
}

fn ensure_schema(backend: &dyn StorageBackend) -> Result<(), StorageError> {
    let current = match backend.get(SCHEMA_VERSION_KEY)? {
        Some(data) => serde_json::from_slice::<u32>(&data)?,
        None => 0,
    };

    if current > STORAGE_SCHEMA_VERSION {
        return Err(StorageError::SchemaTooNew {
            found: current,
            supported: STORAGE_SCHEMA_VERSION,
        });
    }

    if current != STORAGE_SCHEMA_VERSION {
        if current > 0 {
            tracing::info!(
                "Upgrading local store schema {} -> {}",
                current,
                STORAGE_SCHEMA_VERSION
            );
        }
        backend.put(
            SCHEMA_VERSION_KEY,
            &serde_json::to_vec(&STORAGE_SCHEMA_VERSION)?,
        )?;
        backend.flush()?;
    }
    Ok(())
}

fn collection_prefix(collection: &str) -> Vec<u8> {
    format!("{}/", collection).into_bytes()
}

fn record_key(category: Category, id: &str) -> Vec<u8> {
    format!("{}/{}", category.collection(), id).into_bytes()
}

fn preference_key(name: &str) -> Vec<u8> {
    format!("{}/{}", PREFERENCES_COLLECTION, name).into_bytes()
}
