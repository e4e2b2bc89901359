//! Administrative user domain models
//!
//! Back-office users are distinct from storefront customers; they are never
//! hard-deleted, only suspended.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Administrative user account
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role_id: Uuid,

    // Account state
    pub status: String, // active, suspended

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User status enumeration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Suspended,
}

impl From<String> for UserStatus {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "active" => UserStatus::Active,
            _ => UserStatus::Suspended,
        }
    }
}

impl From<UserStatus> for String {
    fn from(status: UserStatus) -> Self {
        match status {
            UserStatus::Active => "active".to_string(),
            UserStatus::Suspended => "suspended".to_string(),
        }
    }
}

impl User {
    pub fn is_suspended(&self) -> bool {
        UserStatus::from(self.status.clone()) == UserStatus::Suspended
    }
}

/// Create user request
#[derive(Debug, Deserialize, validator::Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    pub password: String,
    pub role_id: Uuid,
}

/// Update user request
#[derive(Debug, Deserialize, validator::Validate)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 128))]
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub role_id: Option<Uuid>,
}

/// Change password request
#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

/// User response (without sensitive data)
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role_id: Uuid,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role_id: user.role_id,
            status: user.status,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}
