// Storage abstraction for cross-platform persistence
//
// The local store talks to raw bytes through this trait. Sled backs native
// builds, IndexedDB backs the browser, and the in-memory map backs tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::StorageError;

/// Unified storage trait for cross-platform data persistence
pub trait StorageBackend: Send + Sync {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;
    fn remove(&self, key: &[u8]) -> Result<(), StorageError>;
    /// Entries whose key starts with `prefix`, in ascending key order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError>;
    fn count_prefix(&self, prefix: &[u8]) -> Result<usize, StorageError>;
    fn flush(&self) -> Result<(), StorageError>;
}

/// In-memory storage useful for testing and ephemeral sessions.
///
/// Ordered so that scans come back in the same order sled would give.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    data: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl StorageBackend for MemoryStorage {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.data.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.data.read().get(key).cloned())
    }

    fn remove(&self, key: &[u8]) -> Result<(), StorageError> {
        self.data.write().remove(key);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let data = self.data.read();
        let results = data
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Ok(results)
    }

    fn count_prefix(&self, prefix: &[u8]) -> Result<usize, StorageError> {
        let count = self
            .data
            .read()
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .count();
        Ok(count)
    }

    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub struct SledStorage {
    db: sled::Db,
}

#[cfg(not(target_arch = "wasm32"))]
impl SledStorage {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, StorageError> {
        let db = sled::open(path.as_ref()).map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(Self { db })
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl StorageBackend for SledStorage {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.db
            .insert(key, value)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let value = self
            .db
            .get(key)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(value.map(|ivec| ivec.to_vec()))
    }

    fn remove(&self, key: &[u8]) -> Result<(), StorageError> {
        self.db
            .remove(key)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let mut results = Vec::new();
        for item in self.db.scan_prefix(prefix) {
            let (k, v) = item.map_err(|e| StorageError::Backend(e.to_string()))?;
            results.push((k.to_vec(), v.to_vec()));
        }
        Ok(results)
    }

    fn count_prefix(&self, prefix: &[u8]) -> Result<usize, StorageError> {
        Ok(self.db.scan_prefix(prefix).count())
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.db
            .flush()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }
}

/// Browser-side storage: an in-memory mirror hydrated from IndexedDB on open,
/// with every write persisted back in the background.
#[cfg(target_arch = "wasm32")]
#[derive(Clone)]
pub struct IndexedDbStorage {
    db_name: String,
    store_name: String,
    mirror: MemoryStorage,
}

#[cfg(target_arch = "wasm32")]
const INDEXED_DB_VERSION: u32 = 2;

#[cfg(target_arch = "wasm32")]
impl IndexedDbStorage {
    pub async fn open(db_name: &str) -> Result<Self, StorageError> {
        use rexie::{ObjectStore, Rexie, TransactionMode};

        let store_name = "storykeep";
        let rexie = Rexie::builder(db_name)
            .version(INDEXED_DB_VERSION)
            .add_object_store(ObjectStore::new(store_name))
            .build()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let transaction = rexie
            .transaction(&[store_name], TransactionMode::ReadOnly)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let store = transaction
            .store(store_name)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let all_keys_js = store
            .get_all_keys(None, None)
            .await
            .map_err(|e| StorageError::Backend(format!("{:?}", e)))?;

        let mirror = MemoryStorage::new();
        for key_js in all_keys_js {
            if let Ok(Some(value_js)) = store.get(key_js.clone()).await {
                let key = js_sys::Uint8Array::new(&key_js).to_vec();
                let value = js_sys::Uint8Array::new(&value_js).to_vec();
                mirror.put(&key, &value)?;
            }
        }

        Ok(Self {
            db_name: db_name.to_string(),
            store_name: store_name.to_string(),
            mirror,
        })
    }

    fn persist(&self, key: Vec<u8>, value: Option<Vec<u8>>) {
        let db_name = self.db_name.clone();
        let store_name = self.store_name.clone();

        wasm_bindgen_futures::spawn_local(async move {
            let Ok(rexie) = rexie::Rexie::builder(&db_name)
                .version(INDEXED_DB_VERSION)
                .build()
                .await
            else {
                tracing::warn!("IndexedDB {} unavailable, write not persisted", db_name);
                return;
            };
            let tx = match rexie.transaction(&[&store_name], rexie::TransactionMode::ReadWrite) {
                Ok(tx) => tx,
                Err(e) => {
                    report_background_write(&db_name, &key, Err(e));
                    return;
                }
            };
            let written = match tx.store(&store_name) {
                Ok(store) => {
                    let key_js = js_sys::Uint8Array::from(key.as_slice());
                    match value {
                        Some(value) => {
                            let value_js = js_sys::Uint8Array::from(value.as_slice());
                            store.put(&value_js, Some(&key_js)).await.map(|_| ())
                        }
                        None => store.delete(key_js.into()).await,
                    }
                }
                Err(e) => Err(e),
            };
            if report_background_write(&db_name, &key, written) {
                report_background_write(&db_name, &key, tx.done().await);
            }
        });
    }
}

#[cfg(target_arch = "wasm32")]
impl StorageBackend for IndexedDbStorage {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.mirror.put(key, value)?;
        self.persist(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.mirror.get(key)
    }

    fn remove(&self, key: &[u8]) -> Result<(), StorageError> {
        self.mirror.remove(key)?;
        self.persist(key.to_vec(), None);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        self.mirror.scan_prefix(prefix)
    }

    fn count_prefix(&self, prefix: &[u8]) -> Result<usize, StorageError> {
        self.mirror.count_prefix(prefix)
    }

    /// Writes reach IndexedDB from background tasks; failures are logged there.
    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Log a background write that did not reach disk. Returns whether it did.
#[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
fn report_background_write<E: std::fmt::Debug>(
    db_name: &str,
    key: &[u8],
    result: Result<(), E>,
) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(
                "IndexedDB {}: write of {} not persisted: {:?}",
                db_name,
                String::from_utf8_lossy(key),
                e
            );
            false
        }
    }
}
