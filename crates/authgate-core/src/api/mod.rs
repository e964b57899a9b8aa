//! REST API client module for the authentication backend.
//!
//! This module provides the `ApiClient` used by the route guard and the
//! auth context to resolve the current user from `GET /auth/me`.
//!
//! The backend authenticates requests with a bearer token: the same opaque
//! string the session stores.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;
