//! Authentication state and navigation guarding.
//!
//! This module provides:
//! - `SessionState`: the observable "token present" flag and current-user email
//! - `Navigator`: the redirect capability, with `RecordingNavigator` for tests and tools
//! - `PublicRoutes`: the allow-list of routes reachable without a session
//! - `RouteGuard`: per-navigation check that redirects to the login route
//!
//! The flag is a cache of storage state and is never checked for expiry.

pub mod guard;
pub mod navigator;
pub mod routes;
pub mod session;

pub use guard::{GuardMode, GuardOutcome, RouteGuard};
pub use navigator::{Navigator, RecordingNavigator};
pub use routes::{PublicRoutes, DEFAULT_LOGIN_PATH, DEFAULT_PUBLIC_ROUTES, LEGACY_PUBLIC_ROUTES};
pub use session::{SessionState, SyncHandle, DEFAULT_TOKEN_KEY};
