//! authgate core - client-side authentication state.
//!
//! This crate provides:
//! - `storage`: the persistent key-value capability (memory, file, keyring)
//! - `auth`: the observable session flag, the navigator capability and the route guard
//! - `api`: the REST client used to resolve the current user
//! - `config`: configuration loading with environment overrides
//! - `context`: the composition root tying the pieces together with a start/shutdown lifecycle

pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod models;
pub mod storage;

pub use api::{ApiClient, ApiError};
pub use auth::{
    GuardMode, GuardOutcome, Navigator, PublicRoutes, RecordingNavigator, RouteGuard,
    SessionState, SyncHandle,
};
pub use config::{Config, StorageBackend};
pub use context::AuthContext;
pub use models::CurrentUser;
pub use storage::{KeyValueStore, StorageError, StorageEvent};
