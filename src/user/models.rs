//! User data models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A registered user.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    /// Unique user ID.
    pub id: String,
    /// Unique username.
    pub username: String,
    /// Unique email address (login identifier).
    pub email: String,
    /// Bcrypt password hash.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// When the user registered (RFC 3339).
    pub created_at: String,
    /// Last successful login (RFC 3339).
    pub last_login_at: Option<String>,
}

/// Repository-level request to create a user. The password is already hashed
/// by the time it reaches the repository.
#[derive(Debug, Clone)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// Public user info returned by the API.
#[derive(Debug, Clone, Serialize)]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    pub email: String,
    pub created_at: String,
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            created_at: user.created_at,
        }
    }
}
