//! User repository (数据库访问层)

use crate::{error::AppError, models::user::*};
use sqlx::PgPool;
use uuid::Uuid;

pub struct UserRepository {
    db: PgPool,
}

impl UserRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// 根据 ID 查找用户
    pub async fn find_by_id(&self, id: &Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        Ok(user)
    }

    /// 根据邮箱查找用户（不区分大小写）
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(&self.db)
            .await?;

        Ok(user)
    }

    /// 邮箱是否可用（不区分大小写）
    pub async fn is_email_available(
        &self,
        email: &str,
        exclude_id: Option<Uuid>,
    ) -> Result<bool, AppError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM users
            WHERE LOWER(email) = LOWER($1) AND ($2::uuid IS NULL OR id <> $2)
            "#,
        )
        .bind(email)
        .bind(exclude_id)
        .fetch_one(&self.db)
        .await?;

        Ok(count == 0)
    }

    /// 创建用户
    pub async fn create(
        &self,
        req: &CreateUserRequest,
        password_hash: &str,
    ) -> Result<User, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, password_hash, role_id)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&req.name)
        .bind(&req.email)
        .bind(password_hash)
        .bind(req.role_id)
        .fetch_one(&self.db)
        .await?;

        Ok(user)
    }

    /// 更新用户
    pub async fn update(&self, id: Uuid, req: &UpdateUserRequest) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET
                name = COALESCE($2, name),
                email = COALESCE($3, email),
                role_id = COALESCE($4, role_id),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&req.name)
        .bind(&req.email)
        .bind(req.role_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(user)
    }

    /// 设置账户状态（active / suspended）
    pub async fn set_status(&self, id: Uuid, status: UserStatus) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(String::from(status))
        .fetch_optional(&self.db)
        .await?;

        Ok(user)
    }

    /// 更新密码
    pub async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<bool, AppError> {
        let result =
            sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(password_hash)
                .execute(&self.db)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 列出所有用户
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>, AppError> {
        let users = sqlx::query_as::<_, User>(
            "SELECT * FROM users ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        Ok(users)
    }

    /// 统计用户数量
    pub async fn count(&self) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.db)
            .await?;

        Ok(count)
    }
}
