use std::collections::BTreeSet;

/// Routes reachable without a session.
pub const DEFAULT_PUBLIC_ROUTES: &[&str] = &["/login", "/register", "/verify", "/about"];

/// The earlier allow-list, before verification moved and `/about` was opened up.
pub const LEGACY_PUBLIC_ROUTES: &[&str] = &["/login", "/register", "/auth/verify"];

/// Route the guard sends unauthenticated users to.
pub const DEFAULT_LOGIN_PATH: &str = "/login";

/// Allow-list of public route identifiers. Matching is exact: no prefixes,
/// no trailing-slash or case normalisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicRoutes {
    routes: BTreeSet<String>,
}

impl Default for PublicRoutes {
    fn default() -> Self {
        Self::new(DEFAULT_PUBLIC_ROUTES.iter().copied())
    }
}

impl PublicRoutes {
    pub fn new<I, S>(routes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            routes: routes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn legacy() -> Self {
        Self::new(LEGACY_PUBLIC_ROUTES.iter().copied())
    }

    pub fn contains(&self, route: &str) -> bool {
        self.routes.contains(route)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(String::as_str)
    }
}
