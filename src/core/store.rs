//! Document store abstractions
//!
//! Documents are JSON values addressed by slash separated paths such as
//! `users/{uid}` or `users/{uid}/transactions/{id}`. A collection is the set of
//! documents exactly one segment below a path.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::warn;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Precondition failed for document: {0}")]
    Conflict(String),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A point-in-time read of one document.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub path: String,
    pub version: u64,
    pub data: Value,
}

impl Snapshot {
    /// Last path segment.
    pub fn id(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}

/// Guard for a merge update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// Document must exist.
    Exists,
    /// Document must still be at this version.
    Version(u64),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &str) -> Result<Option<Snapshot>, StoreError>;

    /// Unconditional write of the whole document.
    async fn set(&self, path: &str, data: Value) -> Result<Snapshot, StoreError>;

    /// Writes only if no document exists at `path`. Returns `None` when another
    /// writer got there first.
    async fn create(&self, path: &str, data: Value) -> Result<Option<Snapshot>, StoreError>;

    /// Deep-merges `patch` into the document at `path`.
    async fn update(
        &self,
        path: &str,
        patch: Value,
        precondition: Precondition,
    ) -> Result<Snapshot, StoreError>;

    /// Adds a document with a store generated id and a server `timestamp` field.
    async fn append(&self, collection: &str, data: Value) -> Result<Snapshot, StoreError>;

    /// Direct children of `collection`, in id order.
    async fn list(&self, collection: &str) -> Result<Vec<Snapshot>, StoreError>;

    /// Live notifications for `path` and everything below it.
    fn subscribe(&self, path: &str) -> Subscription;
}

/// Receives the paths of changed documents under a prefix until dropped.
pub struct Subscription {
    prefix: String,
    rx: broadcast::Receiver<String>,
}

impl Subscription {
    pub fn new(prefix: &str, rx: broadcast::Receiver<String>) -> Self {
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
            rx,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Waits for the next change under the prefix. Returns `None` once the store
    /// is gone. A lagging receiver reports the prefix itself so the caller
    /// re-reads everything.
    pub async fn changed(&mut self) -> Option<String> {
        loop {
            match self.rx.recv().await {
                Ok(path) if is_under(&path, &self.prefix) => return Some(path),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(prefix = %self.prefix, skipped, "Subscription lagged, resyncing");
                    return Some(self.prefix.clone());
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

pub(crate) fn is_under(path: &str, prefix: &str) -> bool {
    path == prefix
        || (path.len() > prefix.len()
            && path.starts_with(prefix)
            && path.as_bytes()[prefix.len()] == b'/')
}

/// True when `path` sits exactly one segment below `collection`.
pub(crate) fn is_child(path: &str, collection: &str) -> bool {
    is_under(path, collection)
        && path.len() > collection.len()
        && !path[collection.len() + 1..].contains('/')
}

/// Recursively merges object fields of `patch` into `target`. Non-object values
/// replace whatever was there.
pub fn merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                merge(target.entry(key).or_insert(Value::Null), value);
            }
        }
        (target, patch) => *target = patch,
    }
}
