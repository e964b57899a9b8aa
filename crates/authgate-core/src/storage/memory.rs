use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;
use tracing::debug;

use super::{event_channel, ContextId, KeyValueStore, StorageError, StorageEvent, StorageEvents};

struct Shared {
    data: Mutex<HashMap<String, String>>,
    events: broadcast::Sender<StorageEvent>,
    fail_writes: AtomicBool,
}

/// Process-local storage shared by any number of contexts.
///
/// Each call to [`MemoryBackend::context`] returns a new handle, the way each
/// browser tab gets its own view onto the same origin storage.
#[derive(Clone)]
pub struct MemoryBackend {
    shared: Arc<Shared>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                data: Mutex::new(HashMap::new()),
                events: event_channel(),
                fail_writes: AtomicBool::new(false),
            }),
        }
    }

    /// Open a new context onto this backend.
    pub fn context(&self) -> MemoryStore {
        MemoryStore {
            backend: self.clone(),
            context: ContextId::next(),
        }
    }

    /// Make every subsequent write fail, simulating a full or locked store.
    pub fn set_fail_writes(&self, fail: bool) {
        self.shared.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn data(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.shared.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One context's handle onto a [`MemoryBackend`].
#[derive(Clone)]
pub struct MemoryStore {
    backend: MemoryBackend,
    context: ContextId,
}

impl MemoryStore {
    /// A store with a private backend, for callers that only need one context.
    pub fn standalone() -> Self {
        MemoryBackend::new().context()
    }

    pub fn context_id(&self) -> ContextId {
        self.context
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.backend.shared.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("storage quota exceeded".to_string()));
        }
        Ok(())
    }

    fn announce(&self, key: &str, old_value: Option<String>, new_value: Option<String>) {
        if old_value == new_value {
            return;
        }
        debug!(key, context = ?self.context, "Memory storage changed");
        // No receivers is fine: nobody is listening yet.
        let _ = self
            .backend
            .shared
            .events
            .send(StorageEvent::new(key, old_value, new_value, self.context));
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.backend.data().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check_writable()?;
        let old = self.backend.data().insert(key.to_string(), value.to_string());
        self.announce(key, old, Some(value.to_string()));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.check_writable()?;
        let old = self.backend.data().remove(key);
        self.announce(key, old, None);
        Ok(())
    }

    fn subscribe(&self) -> Option<StorageEvents> {
        Some(StorageEvents::new(
            self.backend.shared.events.subscribe(),
            self.context,
        ))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
