//! Integration tests for keeping several contexts in agreement.
//!
//! A "context" is anything with its own handle onto the same storage: a
//! second session on a shared memory backend, or a second process writing
//! the same storage file.

use std::sync::Arc;
use std::time::Duration;

use authgate_core::storage::{FileStore, MemoryBackend};
use authgate_core::{AuthContext, Config, RecordingNavigator, SessionState};
use tempfile::TempDir;
use tokio::sync::watch;

async fn wait_for(rx: &mut watch::Receiver<bool>, expected: bool) {
    tokio::time::timeout(Duration::from_secs(3), rx.wait_for(|v| *v == expected))
        .await
        .expect("flag settled before timeout")
        .expect("session still alive");
}

#[tokio::test]
async fn test_memory_contexts_follow_each_other() {
    let backend = MemoryBackend::new();
    let navigator = Arc::new(RecordingNavigator::new());
    let mut tab_a = AuthContext::new(Config::default(), Arc::new(backend.context()), navigator.clone()).unwrap();
    let mut tab_b = AuthContext::new(Config::default(), Arc::new(backend.context()), navigator.clone()).unwrap();
    tab_a.start();
    tab_b.start();

    let mut rx_b = tab_b.session().subscribe();
    tab_a.login("abc").unwrap();
    wait_for(&mut rx_b, true).await;

    let mut rx_a = tab_a.session().subscribe();
    tab_b.logout().unwrap();
    wait_for(&mut rx_a, false).await;

    // Guard in the other tab now redirects without any action there
    assert!(!tab_a.guard().check("/dashboard").await.is_allowed());
    assert_eq!(navigator.last().as_deref(), Some("/login"));

    tab_a.shutdown().await;
    tab_b.shutdown().await;
}

#[tokio::test]
async fn test_file_store_picks_up_other_process() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("storage.json");

    let ours = Arc::new(FileStore::with_watch_interval(&path, Duration::from_millis(20)).unwrap());
    let session = Arc::new(SessionState::new(ours, "token").unwrap());
    let _sync = session.start_sync();
    let mut rx = session.subscribe();
    assert!(!session.is_authenticated());

    // Simulate another process editing the file by hand
    std::fs::write(&path, r#"{"token": "from-elsewhere"}"#).unwrap();
    wait_for(&mut rx, true).await;
    assert_eq!(session.token().unwrap().as_deref(), Some("from-elsewhere"));

    std::fs::write(&path, "{}").unwrap();
    wait_for(&mut rx, false).await;
}

#[tokio::test]
async fn test_last_write_wins() {
    let backend = MemoryBackend::new();
    let a = Arc::new(SessionState::new(Arc::new(backend.context()), "token").unwrap());
    let b = Arc::new(SessionState::new(Arc::new(backend.context()), "token").unwrap());

    a.set_token(Some("first")).unwrap();
    b.set_token(Some("second")).unwrap();

    assert_eq!(a.token().unwrap().as_deref(), Some("second"));
    assert_eq!(b.token().unwrap().as_deref(), Some("second"));
}
