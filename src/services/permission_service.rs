//! 权限检查服务
//!
//! 每次检查都从用户/角色注册表实时解析身份，令牌里的权限快照仅供
//! 客户端展示，不作为判定依据。

use crate::{
    error::AppError,
    models::auth::Identity,
    repository::{role_repo::RoleRepository, user_repo::UserRepository},
};
use sqlx::PgPool;
use std::collections::HashSet;
use uuid::Uuid;

pub struct PermissionService {
    db: PgPool,
}

impl PermissionService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// 解析当前身份
    ///
    /// 用户记录缺失 → Unauthorized（不回退到任何替代身份）。
    /// 角色记录缺失 → 空权限集（fail-closed）。
    pub async fn resolve_identity(&self, user_id: Uuid) -> Result<Identity, AppError> {
        let user_repo = UserRepository::new(self.db.clone());
        let user = user_repo
            .find_by_id(&user_id)
            .await?
            .ok_or(AppError::Unauthorized)?;

        let role_repo = RoleRepository::new(self.db.clone());
        let (role_name, permissions): (String, HashSet<String>) =
            match role_repo.find_by_id(&user.role_id).await? {
                Some(role) => (role.name, role.permissions.0.into_iter().collect()),
                None => {
                    tracing::warn!(
                        user_id = %user.id,
                        role_id = %user.role_id,
                        "User references a missing role; resolving with empty permission set"
                    );
                    (String::new(), HashSet::new())
                }
            };

        Ok(Identity {
            id: user.id,
            name: user.name,
            email: user.email,
            role: role_name,
            permissions,
        })
    }

    /// 检查用户是否拥有权限
    ///
    /// 全函数：身份无法解析时返回 false，而不是错误。
    pub async fn check_permission(
        &self,
        user_id: Uuid,
        permission: &str,
    ) -> Result<bool, AppError> {
        match self.resolve_identity(user_id).await {
            Ok(identity) => Ok(identity.has_permission(permission)),
            Err(AppError::Unauthorized) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// 任一权限命中即通过
    pub async fn check_any_permission(
        &self,
        user_id: Uuid,
        permissions: &[&str],
    ) -> Result<bool, AppError> {
        match self.resolve_identity(user_id).await {
            Ok(identity) => Ok(identity.has_any_permission(permissions)),
            Err(AppError::Unauthorized) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// 检查权限，如果无权限则返回错误
    pub async fn require_permission(
        &self,
        user_id: Uuid,
        permission: &str,
    ) -> Result<(), AppError> {
        let has_permission = self.check_permission(user_id, permission).await?;

        if !has_permission {
            tracing::warn!(
                user_id = %user_id,
                permission = %permission,
                "Permission denied"
            );
            return Err(AppError::Forbidden);
        }

        Ok(())
    }
}
