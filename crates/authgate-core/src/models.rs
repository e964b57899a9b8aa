use serde::{Deserialize, Serialize};

/// The signed-in user as reported by `GET /auth/me`.
///
/// Only `email` is required; any other fields in the response are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct CurrentUser {
    pub email: String,
}
