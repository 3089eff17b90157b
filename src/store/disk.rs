use super::{Backend, DocumentDb, StoredDoc};
use crate::core::store::StoreError;
use anyhow::{Context, Result};
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use std::fmt::Display;
use std::fs::{File, OpenOptions, TryLockError};
use std::path::Path;
use tracing::debug;

const PARTITION: &str = "documents";
const LOCK_FILE: &str = "store.lock";

/// Persistent backend on a fjall keyspace. Every write is synced.
///
/// One process owns a data directory at a time: the lock file is held for the
/// lifetime of the backend, so version checks and writes cannot interleave
/// with another `xtrade` process.
pub struct FjallBackend {
    keyspace: Keyspace,
    docs: PartitionHandle,
    // Declared last so the keyspace is closed before the lock is released.
    _lock: File,
}

pub type DiskStore = DocumentDb<FjallBackend>;

impl DiskStore {
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let lock = lock_data_dir(data_dir)?;
        let keyspace = Config::new(data_dir.join("store"))
            .open()
            .with_context(|| format!("Failed to open store in {}", data_dir.display()))?;
        let docs = keyspace.open_partition(PARTITION, PartitionCreateOptions::default())?;
        debug!("Opened document store at {}", data_dir.display());

        Ok(DocumentDb::with_backend(FjallBackend {
            keyspace,
            docs,
            _lock: lock,
        }))
    }
}

fn lock_data_dir(data_dir: &Path) -> Result<File> {
    let path = data_dir.join(LOCK_FILE);
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)
        .with_context(|| format!("Failed to open lock file: {}", path.display()))?;

    match file.try_lock() {
        Ok(()) => Ok(file),
        Err(TryLockError::WouldBlock) => anyhow::bail!(
            "The data directory {} is in use by another xtrade process. Close it (for example a running `xtrade watch`) and try again.",
            data_dir.display()
        ),
        Err(TryLockError::Error(e)) => {
            Err(e).with_context(|| format!("Failed to lock {}", path.display()))
        }
    }
}

fn backend_err(err: impl Display) -> StoreError {
    StoreError::Backend(err.to_string())
}

impl Backend for FjallBackend {
    fn read(&self, path: &str) -> Result<Option<StoredDoc>, StoreError> {
        match self.docs.get(path.as_bytes()).map_err(backend_err)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write(&self, path: &str, doc: &StoredDoc) -> Result<(), StoreError> {
        self.docs
            .insert(path.as_bytes(), serde_json::to_vec(doc)?)
            .map_err(backend_err)?;
        self.keyspace
            .persist(PersistMode::SyncAll)
            .map_err(backend_err)
    }

    fn scan(&self, prefix: &str) -> Result<Vec<(String, StoredDoc)>, StoreError> {
        let mut docs = Vec::new();
        for item in self.docs.prefix(prefix.as_bytes()) {
            let (key, value) = item.map_err(backend_err)?;
            let path = String::from_utf8(key.to_vec()).map_err(backend_err)?;
            docs.push((path, serde_json::from_slice(&value)?));
        }
        Ok(docs)
    }
}
