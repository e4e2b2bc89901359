//! Authentication domain models

use crate::models::user::UserResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Resolved session identity.
///
/// Derived on demand from the user and role registries, never stored as its
/// own entity, so it always reflects the latest role/user state.
#[derive(Debug, Clone, Serialize)]
pub struct Identity {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub permissions: HashSet<String>,
}

impl Identity {
    /// 权限成员检查：全函数，永不报错
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    /// 任一权限命中即通过
    pub fn has_any_permission(&self, permissions: &[&str]) -> bool {
        permissions.iter().any(|p| self.permissions.contains(*p))
    }
}

/// Login request
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Login response
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub user: UserResponse,
    pub role: String,
    pub permissions: Vec<String>,
}

/// Refresh token request
#[derive(Debug, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

/// Logout request
#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    pub refresh_token: String,
}

/// Stored refresh token (hash only, never the raw token)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RefreshToken {
    pub id: Uuid,
    pub token_hash: String,
    pub user_id: Uuid,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub replaced_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_with(permissions: &[&str]) -> Identity {
        Identity {
            id: Uuid::new_v4(),
            name: "Test".to_string(),
            email: "test@example.com".to_string(),
            role: "manager".to_string(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn test_has_permission_membership() {
        let identity = identity_with(&["rma:read", "rma:write"]);
        assert!(identity.has_permission("rma:read"));
        assert!(!identity.has_permission("rma:complete"));
    }

    #[test]
    fn test_has_permission_fails_closed_on_empty_set() {
        // 角色缺失时身份携带空权限集，所有检查必须返回 false
        let identity = identity_with(&[]);
        assert!(!identity.has_permission("rma:read"));
        assert!(!identity.has_any_permission(&["rma:read", "user:write"]));
    }

    #[test]
    fn test_has_any_permission() {
        let identity = identity_with(&["order:read"]);
        assert!(identity.has_any_permission(&["rma:read", "order:read"]));
        assert!(!identity.has_any_permission(&["rma:read", "user:read"]));
        assert!(!identity.has_any_permission(&[]));
    }
}
