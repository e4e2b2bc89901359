//! 审计日志服务

use crate::{
    auth::middleware::AuthContext,
    error::AppError,
    models::audit::{AuditLog, AuditLogFilters},
    repository::audit_repo::AuditRepository,
};
use sqlx::PgPool;
use uuid::Uuid;

/// 审计操作类型
#[derive(Debug, Clone, Copy)]
pub enum AuditAction {
    // 用户相关
    UserCreate,
    UserUpdate,
    UserSuspend,
    UserActivate,
    UserPasswordChange,
    UserLogin,
    UserLoginFailure,
    UserLogout,

    // 角色相关
    RoleCreate,
    RoleUpdate,

    // 商品相关
    ProductCreate,
    ProductStockAdjust,

    // RMA 相关
    RmaCreate,
    RmaUpdate,
    RmaStatusChange,
    RmaComplete,
    RmaCancel,

    // RMA 完成时的库存联动
    InventoryRestockFromReturn,
    InventoryConsumeForExchange,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::UserCreate => "user.create",
            AuditAction::UserUpdate => "user.update",
            AuditAction::UserSuspend => "user.suspend",
            AuditAction::UserActivate => "user.activate",
            AuditAction::UserPasswordChange => "user.password_change",
            AuditAction::UserLogin => "user.login",
            AuditAction::UserLoginFailure => "user.login_failure",
            AuditAction::UserLogout => "user.logout",

            AuditAction::RoleCreate => "role.create",
            AuditAction::RoleUpdate => "role.update",

            AuditAction::ProductCreate => "product.create",
            AuditAction::ProductStockAdjust => "product.stock_adjust",

            AuditAction::RmaCreate => "rma.create",
            AuditAction::RmaUpdate => "rma.update",
            AuditAction::RmaStatusChange => "rma.status_change",
            AuditAction::RmaComplete => "rma.complete",
            AuditAction::RmaCancel => "rma.cancel",

            AuditAction::InventoryRestockFromReturn => "inventory.restock_from_return",
            AuditAction::InventoryConsumeForExchange => "inventory.consume_for_exchange",
        }
    }
}

/// 操作主体
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: Uuid,
    pub name: String,
    pub role: Option<String>,
}

impl From<&AuthContext> for Actor {
    fn from(ctx: &AuthContext) -> Self {
        Self {
            id: ctx.user_id,
            name: ctx.name.clone(),
            role: Some(ctx.role.clone()),
        }
    }
}

/// 审计日志参数结构体
#[derive(Debug, Clone)]
pub struct AuditLogParams<'a> {
    pub actor: &'a Actor,
    pub action: AuditAction,
    pub entity_type: Option<&'a str>,
    pub entity_id: Option<Uuid>,
    pub entity_name: Option<&'a str>,
    pub changes: Option<serde_json::Value>,
    pub metadata: Option<serde_json::Value>,
}

pub struct AuditService {
    db: PgPool,
}

impl AuditService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// 由参数构造一条日志记录
    ///
    /// RMA 的事务路径也用它来组装事务内写入的条目。
    pub fn build_entry(params: AuditLogParams<'_>) -> AuditLog {
        AuditLog {
            id: Uuid::new_v4(),
            actor_id: params.actor.id,
            actor_name: params.actor.name.clone(),
            actor_role: params.actor.role.clone(),
            action: params.action.as_str().to_string(),
            entity_type: params.entity_type.map(|s| s.to_string()),
            entity_id: params.entity_id,
            entity_name: params.entity_name.map(|s| s.to_string()),
            changes: params.changes,
            metadata: params.metadata,
            occurred_at: chrono::Utc::now(),
        }
    }

    /// 记录审计日志条目
    pub async fn log_action(&self, params: AuditLogParams<'_>) -> Result<(), AppError> {
        let log = Self::build_entry(params);

        let repo = AuditRepository::new(self.db.clone());
        repo.insert(&log).await?;

        Ok(())
    }

    /// 简化的审计日志记录方法
    pub async fn log_action_simple(
        &self,
        actor: &Actor,
        action: AuditAction,
        entity_type: Option<&str>,
        entity_id: Option<Uuid>,
        entity_name: Option<&str>,
    ) -> Result<(), AppError> {
        self.log_action(AuditLogParams {
            actor,
            action,
            entity_type,
            entity_id,
            entity_name,
            changes: None,
            metadata: None,
        })
        .await
    }

    /// 查询审计日志
    pub async fn query_logs(
        &self,
        filters: &AuditLogFilters,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AuditLog>, AppError> {
        let repo = AuditRepository::new(self.db.clone());
        repo.query(filters, limit, offset).await
    }

    /// 查询审计日志数量
    pub async fn count_logs(&self, filters: &AuditLogFilters) -> Result<i64, AppError> {
        let repo = AuditRepository::new(self.db.clone());
        repo.count(filters).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_strings_are_dotted_and_unique() {
        let actions = [
            AuditAction::UserCreate,
            AuditAction::UserLogin,
            AuditAction::RoleCreate,
            AuditAction::RmaCreate,
            AuditAction::RmaComplete,
            AuditAction::RmaCancel,
            AuditAction::InventoryRestockFromReturn,
            AuditAction::InventoryConsumeForExchange,
        ];

        let mut seen = std::collections::HashSet::new();
        for action in actions {
            let s = action.as_str();
            assert!(s.contains('.'), "action {} should be namespaced", s);
            assert!(seen.insert(s), "duplicate action string: {}", s);
        }
    }

    #[test]
    fn test_build_entry_stamps_actor() {
        let actor = Actor {
            id: Uuid::new_v4(),
            name: "Ops Admin".to_string(),
            role: Some("super_admin".to_string()),
        };

        let entry = AuditService::build_entry(AuditLogParams {
            actor: &actor,
            action: AuditAction::RmaComplete,
            entity_type: Some("rma"),
            entity_id: None,
            entity_name: Some("RMA-000001"),
            changes: None,
            metadata: None,
        });

        assert_eq!(entry.actor_id, actor.id);
        assert_eq!(entry.actor_name, "Ops Admin");
        assert_eq!(entry.action, "rma.complete");
        assert_eq!(entry.entity_name.as_deref(), Some("RMA-000001"));
    }
}
