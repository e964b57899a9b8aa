use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tempfile::NamedTempFile;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{event_channel, ContextId, KeyValueStore, StorageError, StorageEvent, StorageEvents};

/// Default polling interval for detecting writes from other processes.
pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_millis(1000);

struct Shared {
    path: PathBuf,
    /// Contents as last written or observed by this handle.
    snapshot: Mutex<HashMap<String, String>>,
    events: broadcast::Sender<StorageEvent>,
    watch_interval: Duration,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        let watcher = self
            .watcher
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = watcher {
            task.abort();
        }
    }
}

/// Storage backed by a JSON object in a single file.
///
/// Each `FileStore` is its own context. Other contexts are whoever else
/// writes the file: another `FileStore` on the same path, or another process.
/// Their writes are picked up by a polling watcher started on the first
/// [`KeyValueStore::subscribe`].
#[derive(Clone)]
pub struct FileStore {
    shared: Arc<Shared>,
    context: ContextId,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        Self::with_watch_interval(path, DEFAULT_WATCH_INTERVAL)
    }

    pub fn with_watch_interval(
        path: impl Into<PathBuf>,
        watch_interval: Duration,
    ) -> Result<Self, StorageError> {
        if watch_interval.is_zero() {
            return Err(StorageError::InvalidConfig(
                "watch interval must be greater than zero".to_string(),
            ));
        }
        let path = path.into();
        let snapshot = read_map(&path)?;
        debug!(path = %path.display(), keys = snapshot.len(), "Opened file storage");

        Ok(Self {
            shared: Arc::new(Shared {
                path,
                snapshot: Mutex::new(snapshot),
                events: event_channel(),
                watch_interval,
                watcher: Mutex::new(None),
            }),
            context: ContextId::next(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Read-modify-write the file.
    ///
    /// Anything another process changed since the last poll is announced
    /// before our own change is folded into the snapshot, so a local write
    /// never hides a foreign one from the watcher.
    fn update(&self, key: &str, value: Option<&str>) -> Result<(), StorageError> {
        let mut snapshot = self.shared.snapshot.lock().unwrap_or_else(PoisonError::into_inner);
        let mut map = read_map(&self.shared.path)?;
        let foreign = diff(&snapshot, &map);

        match value {
            Some(v) => map.insert(key.to_string(), v.to_string()),
            None => map.remove(key),
        };
        write_map(&self.shared.path, &map)?;
        *snapshot = map;
        drop(snapshot);

        announce_external(&self.shared, foreign);
        Ok(())
    }

    fn ensure_watcher(&self) -> bool {
        let mut watcher = self.shared.watcher.lock().unwrap_or_else(PoisonError::into_inner);
        if watcher.is_some() {
            return true;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(path = %self.shared.path.display(), "No async runtime, file storage changes will not be observed");
            return false;
        };
        let shared = Arc::downgrade(&self.shared);
        *watcher = Some(runtime.spawn(watch_file(shared, self.shared.watch_interval)));
        true
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let map = read_map(&self.shared.path)?;
        Ok(map.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.update(key, Some(value))
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.update(key, None)
    }

    fn subscribe(&self) -> Option<StorageEvents> {
        if !self.ensure_watcher() {
            return None;
        }
        Some(StorageEvents::new(self.shared.events.subscribe(), self.context))
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}

/// Poll the file and announce every key whose value differs from the snapshot.
async fn watch_file(shared: Weak<Shared>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(store) = shared.upgrade() else {
            break;
        };

        // Hold the snapshot lock across the read so a concurrent local write
        // cannot slip between reading the file and comparing.
        let changes = {
            let mut snapshot = store.snapshot.lock().unwrap_or_else(PoisonError::into_inner);
            let current = match read_map(&store.path) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %store.path.display(), error = %e, "Failed to poll storage file");
                    continue;
                }
            };
            let changes = diff(&snapshot, &current);
            *snapshot = current;
            changes
        };

        announce_external(&store, changes);
    }
}

fn announce_external(shared: &Shared, changes: Vec<Change>) {
    for (key, old_value, new_value) in changes {
        debug!(key = %key, "Storage file changed externally");
        let _ = shared
            .events
            .send(StorageEvent::new(key, old_value, new_value, ContextId::EXTERNAL));
    }
}

type Change = (String, Option<String>, Option<String>);

fn diff(old: &HashMap<String, String>, new: &HashMap<String, String>) -> Vec<Change> {
    let mut changes: Vec<Change> = new
        .iter()
        .filter(|(k, v)| old.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), old.get(k).cloned(), Some(v.clone())))
        .collect();
    changes.extend(
        old.iter()
            .filter(|(k, _)| !new.contains_key(*k))
            .map(|(k, v)| (k.clone(), Some(v.clone()), None)),
    );
    changes.sort_by(|a, b| a.0.cmp(&b.0));
    changes
}

fn read_map(path: &Path) -> Result<HashMap<String, String>, StorageError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let contents = std::fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(HashMap::new());
    }
    Ok(serde_json::from_str(&contents)?)
}

/// Write to a uniquely named sibling temp file and rename it into place, so
/// readers never see a half-written file and concurrent writers never share
/// a temp file.
fn write_map(path: &Path, map: &HashMap<String, String>) -> Result<(), StorageError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let contents = serde_json::to_string_pretty(map)?;
    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
