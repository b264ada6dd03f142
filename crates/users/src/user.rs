use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use userhub_core::UserId;

/// One user account.
///
/// # Invariants
/// - `id` is assigned by storage and never reassigned.
/// - `email` is unique across all users; `username` is unique when present.
/// - `created` is set once; `modified` is storage-assigned on every update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub username: Option<String>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}
