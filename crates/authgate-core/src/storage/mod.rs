//! Persistent key-value storage for the credential token.
//!
//! This module provides:
//! - `KeyValueStore`: the capability the session state is built on
//! - `MemoryBackend` / `MemoryStore`: process-local storage shared by several contexts
//! - `FileStore`: a JSON file, watched by polling so writes from other processes are observed
//! - `KeyringStore`: the OS keychain, without change notifications
//!
//! Every store handle belongs to one context. Writes made through a handle are
//! announced to every other context sharing the same backing storage, never to
//! the writer itself.

pub mod error;
pub mod file;
pub mod keyring;
pub mod memory;

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::warn;

pub use error::StorageError;
pub use file::FileStore;
pub use self::keyring::KeyringStore;
pub use memory::{MemoryBackend, MemoryStore};

/// Capacity of the change notification channel per backend.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Identifies the context (tab, process, handle) a write originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    /// Writes observed from outside this process (e.g. another process editing a file).
    pub const EXTERNAL: ContextId = ContextId(0);

    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ContextId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A change to the backing storage.
///
/// `key` is `None` when the receiver missed events and can no longer tell
/// which keys changed; listeners should treat it as "anything may have changed".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub origin: ContextId,
    pub at: DateTime<Utc>,
}

impl StorageEvent {
    pub fn new(
        key: impl Into<String>,
        old_value: Option<String>,
        new_value: Option<String>,
        origin: ContextId,
    ) -> Self {
        Self {
            key: Some(key.into()),
            old_value,
            new_value,
            origin,
            at: Utc::now(),
        }
    }

    fn unknown(origin: ContextId) -> Self {
        Self {
            key: None,
            old_value: None,
            new_value: None,
            origin,
            at: Utc::now(),
        }
    }

    /// Whether this event may have changed `key`.
    pub fn affects(&self, key: &str) -> bool {
        self.key.as_deref().map_or(true, |k| k == key)
    }
}

/// Receiver of change notifications for one context.
///
/// Events written by the owning context are filtered out.
pub struct StorageEvents {
    rx: broadcast::Receiver<StorageEvent>,
    context: ContextId,
}

impl StorageEvents {
    pub(crate) fn new(rx: broadcast::Receiver<StorageEvent>, context: ContextId) -> Self {
        Self { rx, context }
    }

    /// Wait for the next change made by another context.
    ///
    /// Returns `None` once the backing storage has gone away.
    pub async fn recv(&mut self) -> Option<StorageEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.origin == self.context => continue,
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Storage listener lagged, forcing resync");
                    return Some(StorageEvent::unknown(ContextId::EXTERNAL));
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

pub(crate) fn event_channel() -> broadcast::Sender<StorageEvent> {
    broadcast::channel(EVENT_CHANNEL_CAPACITY).0
}

/// A persistent string-to-string store.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Subscribe to changes made by other contexts.
    ///
    /// Returns `None` for backends that cannot observe foreign writes.
    fn subscribe(&self) -> Option<StorageEvents> {
        None
    }

    /// Short backend name for logging.
    fn backend_name(&self) -> &'static str;
}
