pub mod disk;
pub mod memory;

pub use disk::DiskStore;
pub use memory::MemoryStore;

use crate::core::store::{
    DocumentStore, Precondition, Snapshot, StoreError, Subscription, is_child, merge,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::{Mutex, broadcast};
use tracing::debug;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Field set by the store on appended documents.
pub const TIMESTAMP_FIELD: &str = "timestamp";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDoc {
    pub version: u64,
    pub data: Value,
}

/// Raw key-value persistence underneath a [`DocumentDb`].
pub trait Backend: Send + Sync {
    fn read(&self, path: &str) -> Result<Option<StoredDoc>, StoreError>;
    fn write(&self, path: &str, doc: &StoredDoc) -> Result<(), StoreError>;
    /// Every document whose path starts with `prefix`.
    fn scan(&self, prefix: &str) -> Result<Vec<(String, StoredDoc)>, StoreError>;
}

/// Hands out strictly increasing server timestamps.
struct ServerClock {
    last_micros: AtomicI64,
}

impl ServerClock {
    fn new() -> Self {
        Self {
            last_micros: AtomicI64::new(0),
        }
    }

    /// Ensures later stamps come after `micros`.
    fn observe(&self, micros: i64) {
        self.last_micros.fetch_max(micros, Ordering::SeqCst);
    }

    fn next(&self) -> DateTime<Utc> {
        let now = Utc::now().timestamp_micros();
        let prev = match self.last_micros.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last + 1))
        }) {
            Ok(prev) | Err(prev) => prev,
        };
        DateTime::from_timestamp_micros(now.max(prev + 1)).unwrap_or_else(Utc::now)
    }
}

/// Document store over any [`Backend`]. Writes are serialized so that
/// conditional creates and versioned updates are atomic.
pub struct DocumentDb<B: Backend> {
    backend: B,
    write_lock: Mutex<()>,
    changes: broadcast::Sender<String>,
    clock: ServerClock,
}

impl<B: Backend> DocumentDb<B> {
    pub fn with_backend(backend: B) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            backend,
            write_lock: Mutex::new(()),
            changes,
            clock: ServerClock::new(),
        }
    }

    fn latest_append_micros(&self, collection: &str) -> Result<Option<i64>, StoreError> {
        let prefix = format!("{collection}/");
        Ok(self
            .backend
            .scan(&prefix)?
            .into_iter()
            .filter(|(path, _)| is_child(path, collection))
            .filter_map(|(path, _)| {
                let id = path.rsplit('/').next()?;
                i64::from_str_radix(id, 16).ok()
            })
            .max())
    }

    fn commit(&self, path: &str, doc: StoredDoc) -> Result<Snapshot, StoreError> {
        self.backend.write(path, &doc)?;
        debug!(path, version = doc.version, "Document written");
        // No receivers is fine.
        let _ = self.changes.send(path.to_string());
        Ok(Snapshot {
            path: path.to_string(),
            version: doc.version,
            data: doc.data,
        })
    }
}

fn to_snapshot(path: &str, doc: StoredDoc) -> Snapshot {
    Snapshot {
        path: path.to_string(),
        version: doc.version,
        data: doc.data,
    }
}

#[async_trait]
impl<B: Backend + 'static> DocumentStore for DocumentDb<B> {
    async fn get(&self, path: &str) -> Result<Option<Snapshot>, StoreError> {
        Ok(self.backend.read(path)?.map(|doc| to_snapshot(path, doc)))
    }

    async fn set(&self, path: &str, data: Value) -> Result<Snapshot, StoreError> {
        let _guard = self.write_lock.lock().await;
        let version = self.backend.read(path)?.map_or(0, |doc| doc.version) + 1;
        self.commit(path, StoredDoc { version, data })
    }

    async fn create(&self, path: &str, data: Value) -> Result<Option<Snapshot>, StoreError> {
        let _guard = self.write_lock.lock().await;
        if self.backend.read(path)?.is_some() {
            debug!(path, "Create skipped, document exists");
            return Ok(None);
        }
        self.commit(path, StoredDoc { version: 1, data }).map(Some)
    }

    async fn update(
        &self,
        path: &str,
        patch: Value,
        precondition: Precondition,
    ) -> Result<Snapshot, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self
            .backend
            .read(path)?
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;

        if let Precondition::Version(expected) = precondition {
            if doc.version != expected {
                debug!(path, expected, actual = doc.version, "Version mismatch");
                return Err(StoreError::Conflict(path.to_string()));
            }
        }

        merge(&mut doc.data, patch);
        doc.version += 1;
        self.commit(path, doc)
    }

    async fn append(&self, collection: &str, mut data: Value) -> Result<Snapshot, StoreError> {
        let _guard = self.write_lock.lock().await;
        // Ids already written by an earlier run may be ahead of this clock.
        if let Some(latest) = self.latest_append_micros(collection)? {
            self.clock.observe(latest);
        }
        let stamp = self.clock.next();
        let fields = data.as_object_mut().ok_or_else(|| {
            StoreError::Backend(format!("Appended document in {collection} is not an object"))
        })?;
        fields.insert(TIMESTAMP_FIELD.to_string(), serde_json::to_value(stamp)?);

        let path = format!("{collection}/{:016x}", stamp.timestamp_micros());
        self.commit(&path, StoredDoc { version: 1, data })
    }

    async fn list(&self, collection: &str) -> Result<Vec<Snapshot>, StoreError> {
        let prefix = format!("{collection}/");
        let mut docs: Vec<Snapshot> = self
            .backend
            .scan(&prefix)?
            .into_iter()
            .filter(|(path, _)| is_child(path, collection))
            .map(|(path, doc)| to_snapshot(&path, doc))
            .collect();
        docs.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(docs)
    }

    fn subscribe(&self, path: &str) -> Subscription {
        Subscription::new(path, self.changes.subscribe())
    }
}

/// Store contract tests shared by every backend.
#[cfg(test)]
pub(crate) mod contract {
    use super::*;
    use serde_json::json;

    pub async fn conditional_create(store: &dyn DocumentStore) {
        let first = store.create("users/u1", json!({"n": 1})).await.unwrap();
        assert_eq!(first.map(|s| s.version), Some(1));

        let second = store.create("users/u1", json!({"n": 2})).await.unwrap();
        assert!(second.is_none());
        assert_eq!(store.get("users/u1").await.unwrap().unwrap().data, json!({"n": 1}));
    }

    pub async fn versioned_update(store: &dyn DocumentStore) {
        store
            .set("users/u1", json!({"balances": {"USD": 10.0}}))
            .await
            .unwrap();
        let current = store.get("users/u1").await.unwrap().unwrap();

        let updated = store
            .update(
                "users/u1",
                json!({"balances": {"BTC": 1.0}}),
                Precondition::Version(current.version),
            )
            .await
            .unwrap();
        assert_eq!(updated.version, current.version + 1);
        assert_eq!(updated.data, json!({"balances": {"USD": 10.0, "BTC": 1.0}}));

        let stale = store
            .update(
                "users/u1",
                json!({"balances": {"USD": 0.0}}),
                Precondition::Version(current.version),
            )
            .await;
        assert!(matches!(stale, Err(StoreError::Conflict(_))));

        let missing = store
            .update("users/nobody", json!({}), Precondition::Exists)
            .await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    pub async fn append_and_list(store: &dyn DocumentStore) {
        let a = store.append("users/u1/transactions", json!({"n": 1})).await.unwrap();
        let b = store.append("users/u1/transactions", json!({"n": 2})).await.unwrap();
        store.append("users/u2/transactions", json!({"n": 3})).await.unwrap();
        store.set("users/u1", json!({})).await.unwrap();

        assert_ne!(a.id(), b.id());
        assert!(a.id() < b.id());
        let stamp_a: DateTime<Utc> = serde_json::from_value(a.data["timestamp"].clone()).unwrap();
        let stamp_b: DateTime<Utc> = serde_json::from_value(b.data["timestamp"].clone()).unwrap();
        assert!(stamp_a < stamp_b);

        let listed = store.list("users/u1/transactions").await.unwrap();
        let numbers: Vec<_> = listed.iter().map(|s| s.data["n"].clone()).collect();
        assert_eq!(numbers, vec![json!(1), json!(2)]);
    }

    pub async fn append_after_existing_ids(store: &dyn DocumentStore) {
        // Written by a run whose clock was an hour ahead.
        let ahead = (Utc::now() + chrono::Duration::hours(1)).timestamp_micros();
        let existing = format!("users/u1/transactions/{ahead:016x}");
        store.set(&existing, json!({"n": 1})).await.unwrap();

        let appended = store.append("users/u1/transactions", json!({"n": 2})).await.unwrap();
        assert_ne!(appended.path, existing);
        assert!(appended.path > existing);
        assert_eq!(store.get(&existing).await.unwrap().unwrap().data, json!({"n": 1}));

        let listed = store.list("users/u1/transactions").await.unwrap();
        let numbers: Vec<_> = listed.iter().map(|s| s.data["n"].clone()).collect();
        assert_eq!(numbers, vec![json!(1), json!(2)]);
    }

    pub async fn subscription_filters_by_prefix(store: &dyn DocumentStore) {
        let mut sub = store.subscribe("users/u1");
        store.set("users/u2", json!({})).await.unwrap();
        store.append("users/u1/transactions", json!({})).await.unwrap();

        let changed = sub.changed().await.unwrap();
        assert!(changed.starts_with("users/u1/transactions/"));
    }
}
