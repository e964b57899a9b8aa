//! Composition root for the authentication state.
//!
//! `AuthContext` owns the store, the session, the API client and the guard,
//! and ties cross-context syncing to an explicit `start` / `shutdown`
//! lifecycle instead of module-level globals.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::api::{ApiClient, ApiError};
use crate::auth::{GuardMode, Navigator, RouteGuard, SessionState, SyncHandle};
use crate::config::{Config, StorageBackend};
use crate::models::CurrentUser;
use crate::storage::{FileStore, KeyValueStore, KeyringStore, MemoryStore};

pub struct AuthContext {
    config: Config,
    session: Arc<SessionState>,
    api: ApiClient,
    guard: RouteGuard,
    sync: Option<SyncHandle>,
}

impl AuthContext {
    /// Build everything from `config`, opening the configured storage backend.
    pub fn from_config(config: Config, navigator: Arc<dyn Navigator>) -> Result<Self> {
        let store = open_store(&config)?;
        Self::new(config, store, navigator)
    }

    /// Build with an explicit store, e.g. a shared in-memory backend.
    pub fn new(
        config: Config,
        store: Arc<dyn KeyValueStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self> {
        config.validate()?;
        let session = Arc::new(
            SessionState::new(store, config.token_key.clone())
                .context("Failed to read session token")?,
        );
        let api = ApiClient::with_timeout(config.api_base_url.clone(), config.request_timeout())
            .context("Failed to build API client")?;

        let mut guard = RouteGuard::new(Arc::clone(&session), navigator)
            .with_public_routes(config.public_routes())
            .with_login_path(config.login_path.clone());
        if config.guard_mode == GuardMode::Remote {
            guard = guard.remote(api.clone());
        }

        debug!(mode = %config.guard_mode, storage = %config.storage, "Auth context built");

        Ok(Self {
            config,
            session,
            api,
            guard,
            sync: None,
        })
    }

    /// Start mirroring token changes made by other contexts. Idempotent.
    pub fn start(&mut self) {
        if self.sync.is_none() {
            self.sync = Some(self.session.start_sync());
            info!("Auth context started");
        }
    }

    pub fn is_started(&self) -> bool {
        self.sync.is_some()
    }

    /// Stop syncing. The context can be started again afterwards.
    pub async fn shutdown(&mut self) {
        if let Some(sync) = self.sync.take() {
            sync.shutdown().await;
            info!("Auth context stopped");
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    pub fn guard(&self) -> &RouteGuard {
        &self.guard
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn login(&self, token: &str) -> Result<()> {
        self.session
            .set_token(Some(token))
            .context("Failed to store session token")
    }

    pub fn logout(&self) -> Result<()> {
        self.session.clear().context("Failed to clear session token")
    }

    /// Resolve the current user with the stored token and publish the email.
    pub async fn refresh_profile(&self) -> Result<CurrentUser, ApiError> {
        let client = match self.session.token() {
            Ok(Some(token)) => self.api.with_token(token),
            _ => return Err(ApiError::Unauthorized),
        };
        let user = client.fetch_current_user().await?;
        self.session.set_email(Some(user.email.clone()));
        Ok(user)
    }
}

fn open_store(config: &Config) -> Result<Arc<dyn KeyValueStore>> {
    let store: Arc<dyn KeyValueStore> = match config.storage {
        StorageBackend::File => {
            let path = config.storage_path()?;
            Arc::new(
                FileStore::with_watch_interval(&path, config.watch_interval())
                    .with_context(|| format!("Failed to open storage file {}", path.display()))?,
            )
        }
        StorageBackend::Memory => Arc::new(MemoryStore::standalone()),
        StorageBackend::Keyring => Arc::new(KeyringStore::default()),
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::auth::RecordingNavigator;
    use crate::storage::MemoryBackend;
    use tempfile::TempDir;

    fn context_on(backend: &MemoryBackend, config: Config) -> (AuthContext, Arc<RecordingNavigator>) {
        let navigator = Arc::new(RecordingNavigator::new());
        let ctx = AuthContext::new(config, Arc::new(backend.context()), navigator.clone()).unwrap();
        (ctx, navigator)
    }

    #[test]
    fn test_login_logout() {
        let backend = MemoryBackend::new();
        let (ctx, _) = context_on(&backend, Config::default());
        assert!(!ctx.session().is_authenticated());

        ctx.login("abc").unwrap();
        assert!(ctx.session().is_authenticated());
        ctx.logout().unwrap();
        assert!(!ctx.session().is_authenticated());
    }

    #[test]
    fn test_guard_follows_config() {
        let backend = MemoryBackend::new();
        let config = Config {
            guard_mode: GuardMode::Remote,
            login_path: "/signin".to_string(),
            public_routes: vec!["/".to_string()],
            ..Config::default()
        };
        let (ctx, _) = context_on(&backend, config);
        assert_eq!(ctx.guard().mode(), GuardMode::Remote);
        assert_eq!(ctx.guard().login_path(), "/signin");
        assert!(ctx.guard().public_routes().contains("/"));
        assert!(!ctx.guard().public_routes().contains("/about"));
    }

    #[tokio::test]
    async fn test_start_and_shutdown_lifecycle() {
        let backend = MemoryBackend::new();
        let (mut ctx, _) = context_on(&backend, Config::default());
        let (other, _) = context_on(&backend, Config::default());
        let mut rx = ctx.session().subscribe();

        ctx.start();
        ctx.start();
        assert!(ctx.is_started());

        other.login("abc").unwrap();
        tokio::time::timeout(Duration::from_secs(1), rx.changed())
            .await
            .expect("synced before timeout")
            .unwrap();
        assert!(ctx.session().is_authenticated());

        ctx.shutdown().await;
        assert!(!ctx.is_started());
        other.logout().unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(ctx.session().is_authenticated());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let backend = MemoryBackend::new();
        let config = Config {
            request_timeout_secs: 0,
            ..Config::default()
        };
        let result = AuthContext::new(
            config,
            Arc::new(backend.context()),
            Arc::new(RecordingNavigator::new()),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_refresh_profile_without_token() {
        let backend = MemoryBackend::new();
        let (ctx, _) = context_on(&backend, Config::default());
        assert!(matches!(ctx.refresh_profile().await, Err(ApiError::Unauthorized)));
    }

    #[test]
    fn test_from_config_file_storage() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            storage_path: Some(dir.path().join("storage.json")),
            ..Config::default()
        };
        let navigator = Arc::new(RecordingNavigator::new());

        let ctx = AuthContext::from_config(config.clone(), navigator.clone()).unwrap();
        ctx.login("abc").unwrap();

        let reopened = AuthContext::from_config(config, navigator).unwrap();
        assert!(reopened.session().is_authenticated());
    }
}
