//! Navigation guard for protected routes.
//!
//! The guard is a UX convenience: it sends users without a session to the
//! login route. It does not enforce anything, the backend must still reject
//! requests carrying a bad token.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::ApiClient;

use super::navigator::Navigator;
use super::routes::{PublicRoutes, DEFAULT_LOGIN_PATH};
use super::session::SessionState;

/// How the guard decides whether the user is signed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardMode {
    /// A stored token is enough. No network.
    #[default]
    Local,
    /// Ask the backend who the token belongs to; any failure counts as signed out.
    Remote,
}

impl fmt::Display for GuardMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardMode::Local => write!(f, "local"),
            GuardMode::Remote => write!(f, "remote"),
        }
    }
}

impl FromStr for GuardMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(GuardMode::Local),
            "remote" => Ok(GuardMode::Remote),
            other => Err(format!("unknown guard mode '{}', expected 'local' or 'remote'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    Allowed,
    Redirected(String),
}

impl GuardOutcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GuardOutcome::Allowed)
    }
}

enum Strategy {
    Local,
    Remote(ApiClient),
}

pub struct RouteGuard {
    session: Arc<SessionState>,
    navigator: Arc<dyn Navigator>,
    public_routes: PublicRoutes,
    login_path: String,
    strategy: Strategy,
}

impl RouteGuard {
    /// A local guard with the default allow-list and login path.
    pub fn new(session: Arc<SessionState>, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            session,
            navigator,
            public_routes: PublicRoutes::default(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            strategy: Strategy::Local,
        }
    }

    pub fn with_public_routes(mut self, public_routes: PublicRoutes) -> Self {
        self.public_routes = public_routes;
        self
    }

    pub fn with_login_path(mut self, login_path: impl Into<String>) -> Self {
        self.login_path = login_path.into();
        self
    }

    /// Switch to remote checks against `GET /auth/me`. The stored token is
    /// attached per check; any token already on `api` is dropped.
    pub fn remote(mut self, api: ApiClient) -> Self {
        self.strategy = Strategy::Remote(api.without_token());
        self
    }

    pub fn mode(&self) -> GuardMode {
        match self.strategy {
            Strategy::Local => GuardMode::Local,
            Strategy::Remote(_) => GuardMode::Remote,
        }
    }

    pub fn public_routes(&self) -> &PublicRoutes {
        &self.public_routes
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    /// Run the configured check for a navigation to `route`.
    pub async fn check(&self, route: &str) -> GuardOutcome {
        match &self.strategy {
            Strategy::Local => self.check_local(route),
            Strategy::Remote(api) => self.check_remote(api, route).await,
        }
    }

    /// Redirect iff no token is stored and `route` is not public.
    pub fn check_local(&self, route: &str) -> GuardOutcome {
        let has_token = match self.session.token() {
            Ok(token) => token.is_some(),
            Err(e) => {
                warn!(error = %e, "Failed to read token, treating as signed out");
                false
            }
        };

        if has_token || self.public_routes.contains(route) {
            debug!(route, has_token, "Route allowed");
            return GuardOutcome::Allowed;
        }
        self.deny(route)
    }

    async fn check_remote(&self, api: &ApiClient, route: &str) -> GuardOutcome {
        let client = match self.session.token() {
            Ok(Some(token)) => api.with_token(token),
            Ok(None) => api.clone(),
            Err(e) => {
                warn!(error = %e, "Failed to read token, checking without one");
                api.clone()
            }
        };

        match client.fetch_current_user().await {
            Ok(user) => {
                debug!(route, email = %user.email, "Route allowed for current user");
                self.session.set_email(Some(user.email));
                GuardOutcome::Allowed
            }
            Err(e) if self.public_routes.contains(route) => {
                debug!(route, kind = e.kind(), "Profile fetch failed on public route");
                GuardOutcome::Allowed
            }
            Err(e) => {
                warn!(route, kind = e.kind(), error = %e, "Profile fetch failed");
                self.deny(route)
            }
        }
    }

    fn deny(&self, route: &str) -> GuardOutcome {
        info!(route, to = %self.login_path, "Route requires a session");
        self.navigator.redirect(&self.login_path);
        GuardOutcome::Redirected(self.login_path.clone())
    }
}
