//! The signed-in user

use serde::{Deserialize, Serialize};

/// Identity of the local user, resolved from the auth collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    /// Stable user ID
    pub id: String,
    /// Login name
    pub username: String,
}
