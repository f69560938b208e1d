//! Durable preference storage shared between sessions.
//!
//! A [`PreferenceStore`] is one session's view of the shared storage: it reads
//! and writes the `alwaysExpand` preference and hands out a
//! [`PreferenceFeed`] reporting writes made by *other* sessions.

pub mod sync;

use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::error::ExpandResult;
use crate::state::{Preference, ALWAYS_EXPAND_KEY};

pub use sync::{StoreSession, SyncStorage};

/// Identifies one writer of the shared storage.
pub type SessionId = u64;

/// A committed write, as broadcast to every subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    pub scope: String,
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    /// Session that made the write.
    pub origin: SessionId,
    /// Store-wide sequence number, strictly increasing per write.
    pub revision: u64,
}

/// A change of the preference made by another session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreferenceChange {
    pub old: Preference,
    pub new: Preference,
    pub revision: u64,
}

/// One session's handle on the persisted preference.
pub trait PreferenceStore: Send + Sync {
    /// Current preference, defaulting to `alwaysExpand = false`.
    fn read(&self) -> ExpandResult<Preference>;

    /// Revision of the most recent committed write (0 if none).
    fn revision(&self) -> u64;

    /// The preference together with the revision it was read at.
    fn read_versioned(&self) -> ExpandResult<(Preference, u64)>;

    /// Persist the preference. Returns the revision of the write, or `None`
    /// when the stored value was already equal and nothing changed.
    fn write(&self, preference: Preference) -> ExpandResult<Option<u64>>;

    /// Subscribe to writes made by other sessions.
    fn subscribe(&self) -> PreferenceFeed;
}

/// Interpret a raw stored value the way the preference is defined: only a
/// literal `true` enables it.
pub fn preference_from_value(value: Option<&Value>) -> Preference {
    Preference::new(matches!(value, Some(Value::Bool(true))))
}

/// Stream of preference changes made by other sessions.
///
/// Delivery follows the underlying broadcast channel; callers must tolerate
/// duplicates and use [`PreferenceChange::revision`] to order what they see.
pub struct PreferenceFeed {
    rx: broadcast::Receiver<StorageChange>,
    scope: String,
    origin: SessionId,
}

impl PreferenceFeed {
    pub fn new(rx: broadcast::Receiver<StorageChange>, scope: String, origin: SessionId) -> Self {
        Self { rx, scope, origin }
    }

    /// Wait for the next relevant change. Returns `None` once the storage is gone.
    pub async fn recv(&mut self) -> Option<PreferenceChange> {
        loop {
            match self.rx.recv().await {
                Ok(change) => {
                    if change.origin == self.origin
                        || change.scope != self.scope
                        || change.key != ALWAYS_EXPAND_KEY
                    {
                        continue;
                    }
                    return Some(PreferenceChange {
                        old: preference_from_value(change.old_value.as_ref()),
                        new: preference_from_value(change.new_value.as_ref()),
                        revision: change.revision,
                    });
                }
                // The newest writes are still buffered, so skipping ahead converges.
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Preference feed lagged, skipped {} changes", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
