//! Role and permission domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

/// Closed permission vocabulary.
///
/// Permissions are opaque string tags and are never composed at runtime;
/// everything a role can grant is listed here.
pub mod permissions {
    pub const USER_READ: &str = "user:read";
    pub const USER_WRITE: &str = "user:write";
    pub const ROLE_READ: &str = "role:read";
    pub const ROLE_WRITE: &str = "role:write";
    pub const ORDER_READ: &str = "order:read";
    pub const PRODUCT_READ: &str = "product:read";
    pub const PRODUCT_WRITE: &str = "product:write";
    pub const RMA_READ: &str = "rma:read";
    pub const RMA_WRITE: &str = "rma:write";
    pub const RMA_APPROVE: &str = "rma:approve";
    pub const RMA_COMPLETE: &str = "rma:complete";
    pub const RMA_CANCEL: &str = "rma:cancel";
    pub const AUDIT_READ: &str = "audit:read";

    /// 全部权限标签
    pub const ALL: &[&str] = &[
        USER_READ,
        USER_WRITE,
        ROLE_READ,
        ROLE_WRITE,
        ORDER_READ,
        PRODUCT_READ,
        PRODUCT_WRITE,
        RMA_READ,
        RMA_WRITE,
        RMA_APPROVE,
        RMA_COMPLETE,
        RMA_CANCEL,
        AUDIT_READ,
    ];

    /// 校验权限标签是否属于固定词汇表
    pub fn is_known(permission: &str) -> bool {
        ALL.contains(&permission)
    }
}

/// Role
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub permissions: Json<Vec<String>>,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create role request
#[derive(Debug, Deserialize, validator::Validate)]
pub struct CreateRoleRequest {
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    pub description: Option<String>,
    pub permissions: Vec<String>,
}

/// Update role request
#[derive(Debug, Deserialize, validator::Validate)]
pub struct UpdateRoleRequest {
    #[validate(length(min = 1, max = 64))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub permissions: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_vocabulary_is_closed() {
        assert!(permissions::is_known("rma:complete"));
        assert!(permissions::is_known("order:read"));
        assert!(!permissions::is_known("rma:invent"));
        assert!(!permissions::is_known(""));
    }

    #[test]
    fn test_permission_tags_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for p in permissions::ALL {
            assert!(seen.insert(*p), "duplicate permission tag: {}", p);
        }
    }
}
