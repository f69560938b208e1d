//! Shared, scoped key-value storage backend.
//!
//! One [`SyncStorage`] holds the values of a scope, cached in memory and
//! optionally backed by `<dir>/<scope>.json`. Every writer works through its
//! own [`StoreSession`], so change notifications can tell sessions apart.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::broadcast;

use super::{
    preference_from_value, PreferenceFeed, PreferenceStore, SessionId, StorageChange,
};
use crate::error::{ExpandError, ExpandResult};
use crate::state::{Preference, ALWAYS_EXPAND_KEY};

/// Capacity of the change broadcast channel.
const CHANGE_BUFFER: usize = 64;

/// Scoped key-value storage shared by every session of a user.
#[derive(Clone)]
pub struct SyncStorage {
    inner: Arc<StorageInner>,
}

struct StorageInner {
    scope: String,
    /// Backing file, if persistent.
    storage_path: Option<PathBuf>,
    values: Mutex<StoredValues>,
    changes: broadcast::Sender<StorageChange>,
    next_session: AtomicU64,
    /// Forces writes to fail (used to exercise persistence failures).
    fail_writes: AtomicBool,
}

#[derive(Default)]
struct StoredValues {
    cache: HashMap<String, Value>,
    revision: u64,
}

impl SyncStorage {
    /// Open the storage for `scope`, loading `<dir>/<scope>.json` if it exists.
    ///
    /// A missing or unreadable file starts the scope empty.
    pub fn open(dir: Option<PathBuf>, scope: &str) -> Self {
        let storage_path = dir.map(|d| d.join(format!("{}.json", scope)));

        let cache = match &storage_path {
            Some(path) if path.exists() => match fs::read_to_string(path) {
                Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                    tracing::warn!("Ignoring corrupt storage file {}: {}", path.display(), e);
                    HashMap::new()
                }),
                Err(e) => {
                    tracing::warn!("Failed to read storage file {}: {}", path.display(), e);
                    HashMap::new()
                }
            },
            _ => HashMap::new(),
        };

        let (changes, _) = broadcast::channel(CHANGE_BUFFER);

        Self {
            inner: Arc::new(StorageInner {
                scope: scope.to_string(),
                storage_path,
                values: Mutex::new(StoredValues { cache, revision: 0 }),
                changes,
                next_session: AtomicU64::new(1),
                fail_writes: AtomicBool::new(false),
            }),
        }
    }

    /// Storage that lives only as long as this process.
    pub fn in_memory(scope: &str) -> Self {
        Self::open(None, scope)
    }

    pub fn scope(&self) -> &str {
        &self.inner.scope
    }

    /// Open a new writer session.
    pub fn session(&self) -> StoreSession {
        StoreSession {
            id: self.inner.next_session.fetch_add(1, Ordering::SeqCst),
            storage: self.clone(),
        }
    }

    /// Make every subsequent write fail until switched off again.
    pub fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> MutexGuard<'_, StoredValues> {
        self.inner
            .values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.lock().cache.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.lock().cache.keys().cloned().collect()
    }

    fn revision(&self) -> u64 {
        self.lock().revision
    }

    /// Commit `value` under `key` on behalf of `origin`.
    ///
    /// The file is replaced as a whole (write to a temp file, then rename),
    /// and the in-memory cache only changes once that succeeded.
    fn set(&self, origin: SessionId, key: &str, value: Value) -> ExpandResult<Option<u64>> {
        let mut values = self.lock();

        let old_value = values.cache.get(key).cloned();
        if old_value.as_ref() == Some(&value) {
            return Ok(None);
        }

        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(ExpandError::PersistenceFailure(format!(
                "storage scope '{}' is not writable",
                self.inner.scope
            )));
        }

        let mut next = values.cache.clone();
        next.insert(key.to_string(), value.clone());
        self.persist(&next)?;

        values.cache = next;
        values.revision += 1;
        let revision = values.revision;

        // No subscribers is fine.
        let _ = self.inner.changes.send(StorageChange {
            scope: self.inner.scope.clone(),
            key: key.to_string(),
            old_value,
            new_value: Some(value),
            origin,
            revision,
        });

        Ok(Some(revision))
    }

    fn persist(&self, values: &HashMap<String, Value>) -> ExpandResult<()> {
        let Some(path) = &self.inner.storage_path else {
            return Ok(());
        };

        let failure = |e: &dyn std::fmt::Display| {
            ExpandError::PersistenceFailure(format!(
                "Failed to write storage for scope '{}': {}",
                self.inner.scope, e
            ))
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| failure(&e))?;
        }

        let contents = serde_json::to_string_pretty(values)?;
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, contents).map_err(|e| failure(&e))?;
        if let Err(e) = fs::rename(&tmp_path, path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(failure(&e));
        }

        Ok(())
    }
}

/// One session's handle on a [`SyncStorage`].
#[derive(Clone)]
pub struct StoreSession {
    id: SessionId,
    storage: SyncStorage,
}

impl StoreSession {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Raw value stored under `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.storage.get(key)
    }

    /// Store a raw value under `key`.
    pub fn set(&self, key: &str, value: Value) -> ExpandResult<Option<u64>> {
        self.storage.set(self.id, key, value)
    }

    pub fn keys(&self) -> Vec<String> {
        self.storage.keys()
    }
}

impl PreferenceStore for StoreSession {
    fn read(&self) -> ExpandResult<Preference> {
        Ok(preference_from_value(self.get(ALWAYS_EXPAND_KEY).as_ref()))
    }

    fn revision(&self) -> u64 {
        self.storage.revision()
    }

    fn read_versioned(&self) -> ExpandResult<(Preference, u64)> {
        let values = self.storage.lock();
        Ok((
            preference_from_value(values.cache.get(ALWAYS_EXPAND_KEY)),
            values.revision,
        ))
    }

    fn write(&self, preference: Preference) -> ExpandResult<Option<u64>> {
        self.set(ALWAYS_EXPAND_KEY, Value::Bool(preference.always_expand))
    }

    fn subscribe(&self) -> PreferenceFeed {
        PreferenceFeed::new(
            self.storage.inner.changes.subscribe(),
            self.storage.inner.scope.clone(),
            self.id,
        )
    }
}
