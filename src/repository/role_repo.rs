//! Role repository (数据库访问层)

use crate::{error::AppError, models::role::*};
use sqlx::{types::Json, PgPool};
use uuid::Uuid;

pub struct RoleRepository {
    db: PgPool,
}

impl RoleRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// 根据 ID 查找角色
    pub async fn find_by_id(&self, id: &Uuid) -> Result<Option<Role>, AppError> {
        let role = sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        Ok(role)
    }

    /// 根据名称查找角色
    pub async fn find_by_name(&self, name: &str) -> Result<Option<Role>, AppError> {
        let role = sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.db)
            .await?;

        Ok(role)
    }

    /// 角色名是否可用
    pub async fn is_name_available(
        &self,
        name: &str,
        exclude_id: Option<Uuid>,
    ) -> Result<bool, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM roles WHERE name = $1 AND ($2::uuid IS NULL OR id <> $2)",
        )
        .bind(name)
        .bind(exclude_id)
        .fetch_one(&self.db)
        .await?;

        Ok(count == 0)
    }

    /// 创建角色
    pub async fn create(&self, req: &CreateRoleRequest) -> Result<Role, AppError> {
        let role = sqlx::query_as::<_, Role>(
            r#"
            INSERT INTO roles (name, description, permissions, is_system)
            VALUES ($1, $2, $3, FALSE)
            RETURNING *
            "#,
        )
        .bind(&req.name)
        .bind(&req.description)
        .bind(Json(&req.permissions))
        .fetch_one(&self.db)
        .await?;

        Ok(role)
    }

    /// 更新角色（is_system 守卫在服务层执行）
    pub async fn update(&self, id: Uuid, req: &UpdateRoleRequest) -> Result<Option<Role>, AppError> {
        let role = sqlx::query_as::<_, Role>(
            r#"
            UPDATE roles
            SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                permissions = COALESCE($4, permissions),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&req.name)
        .bind(&req.description)
        .bind(req.permissions.as_ref().map(Json))
        .fetch_optional(&self.db)
        .await?;

        Ok(role)
    }

    /// 列出所有角色
    pub async fn list(&self) -> Result<Vec<Role>, AppError> {
        let roles = sqlx::query_as::<_, Role>("SELECT * FROM roles ORDER BY created_at")
            .fetch_all(&self.db)
            .await?;

        Ok(roles)
    }
}
