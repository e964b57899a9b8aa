use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::storage::{KeyValueStore, StorageError};

/// Storage key the token is kept under unless configured otherwise.
pub const DEFAULT_TOKEN_KEY: &str = "token";

/// Observable authentication state.
///
/// `is_authenticated` is a cache of "a non-empty token is stored", nothing
/// more: the token is never validated here. The current user's email is kept
/// alongside it so that a route guard or UI can share one resolved profile.
pub struct SessionState {
    store: Arc<dyn KeyValueStore>,
    token_key: String,
    authenticated: watch::Sender<bool>,
    email: watch::Sender<Option<String>>,
    // Held across a storage access and the publish that follows it, so the
    // flag always ends on the value of the last write or read.
    write_lock: Mutex<()>,
}

impl SessionState {
    /// Build the session, seeding the flag from what is currently stored.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        token_key: impl Into<String>,
    ) -> Result<Self, StorageError> {
        let token_key = token_key.into();
        let present = read_token(store.as_ref(), &token_key)?.is_some();
        debug!(backend = store.backend_name(), key = %token_key, authenticated = present, "Session seeded from storage");

        Ok(Self {
            store,
            token_key,
            authenticated: watch::channel(present).0,
            email: watch::channel(None).0,
            write_lock: Mutex::new(()),
        })
    }

    pub fn token_key(&self) -> &str {
        &self.token_key
    }

    pub fn is_authenticated(&self) -> bool {
        *self.authenticated.borrow()
    }

    /// Receiver that starts with the current flag and sees every change.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.authenticated.subscribe()
    }

    /// The stored token, read fresh from storage. Empty strings count as absent.
    pub fn token(&self) -> Result<Option<String>, StorageError> {
        read_token(self.store.as_ref(), &self.token_key)
    }

    /// Store `token` and mark the session authenticated, or, for `None` or an
    /// empty string, remove it and mark the session signed out.
    ///
    /// If the write fails the flag keeps its previous value.
    pub fn set_token(&self, token: Option<&str>) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        match token.filter(|t| !t.is_empty()) {
            Some(token) => {
                self.store.set(&self.token_key, token)?;
                info!(key = %self.token_key, "Session token stored");
                self.publish(true);
            }
            None => {
                self.store.remove(&self.token_key)?;
                info!(key = %self.token_key, "Session token cleared");
                self.publish(false);
            }
        }
        Ok(())
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.set_token(None)
    }

    pub fn email(&self) -> Option<String> {
        self.email.borrow().clone()
    }

    pub fn subscribe_email(&self) -> watch::Receiver<Option<String>> {
        self.email.subscribe()
    }

    pub fn set_email(&self, email: Option<String>) {
        self.email.send_if_modified(|current| {
            if *current == email {
                return false;
            }
            *current = email;
            true
        });
    }

    /// Re-read storage and update the flag. Returns the new flag value.
    pub fn resync(&self) -> Result<bool, StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let present = self.token()?.is_some();
        self.publish(present);
        Ok(present)
    }

    /// Listen for token changes made by other contexts and mirror them into
    /// the flag. The listener stops when the returned handle is shut down or
    /// dropped.
    pub fn start_sync(self: &Arc<Self>) -> SyncHandle {
        let Some(mut events) = self.store.subscribe() else {
            debug!(backend = self.store.backend_name(), "Storage has no change notifications, sync disabled");
            return SyncHandle { task: None };
        };

        let session: Weak<Self> = Arc::downgrade(self);
        let key = self.token_key.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if !event.affects(&key) {
                    continue;
                }
                let Some(session) = session.upgrade() else {
                    break;
                };
                match session.resync() {
                    Ok(present) => {
                        debug!(origin = ?event.origin, authenticated = present, "Session resynced from storage event")
                    }
                    Err(e) => warn!(error = %e, "Failed to resync session from storage"),
                }
            }
            debug!("Session sync listener stopped");
        });

        SyncHandle { task: Some(task) }
    }

    fn publish(&self, present: bool) {
        let changed = self.authenticated.send_if_modified(|current| {
            if *current == present {
                return false;
            }
            *current = present;
            true
        });
        if changed {
            debug!(authenticated = present, "Session flag changed");
        }
        if !present {
            self.set_email(None);
        }
    }
}

fn read_token(store: &dyn KeyValueStore, key: &str) -> Result<Option<String>, StorageError> {
    Ok(store.get(key)?.filter(|t| !t.is_empty()))
}

/// Owns the background listener started by [`SessionState::start_sync`].
pub struct SyncHandle {
    task: Option<JoinHandle<()>>,
}

impl SyncHandle {
    /// Whether a listener is running (false for stores without notifications).
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the listener and wait for it to finish.
    pub async fn shutdown(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
