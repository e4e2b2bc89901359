//! Refresh token repository (数据库访问层)
//! 只保存令牌哈希，从不落库原始令牌。

use crate::{error::AppError, models::auth::RefreshToken};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

pub struct AuthRepository {
    db: PgPool,
}

impl AuthRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// 计算令牌哈希（SHA-256，十六进制）
    pub fn hash_token(token: &str) -> String {
        let digest = Sha256::digest(token.as_bytes());
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// 存储刷新令牌
    pub async fn store_refresh_token(&self, token: &RefreshToken) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (
                id, token_hash, user_id, user_agent, ip_address,
                expires_at, revoked_at, replaced_by, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(token.id)
        .bind(&token.token_hash)
        .bind(token.user_id)
        .bind(&token.user_agent)
        .bind(&token.ip_address)
        .bind(token.expires_at)
        .bind(token.revoked_at)
        .bind(token.replaced_by)
        .bind(token.created_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// 根据哈希查找刷新令牌
    pub async fn find_refresh_token_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshToken>, AppError> {
        let token = sqlx::query_as::<_, RefreshToken>(
            "SELECT * FROM refresh_tokens WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.db)
        .await?;

        Ok(token)
    }

    /// 撤销刷新令牌
    pub async fn revoke_refresh_token(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE refresh_tokens SET revoked_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// 按哈希撤销某用户的刷新令牌
    pub async fn revoke_refresh_token_by_hash(
        &self,
        token_hash: &str,
        user_id: Uuid,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = NOW() WHERE token_hash = $1 AND user_id = $2",
        )
        .bind(token_hash)
        .bind(user_id)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// 撤销某用户的全部刷新令牌
    pub async fn revoke_all_refresh_tokens(&self, user_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = NOW() WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_token_is_deterministic() {
        let a = AuthRepository::hash_token("some-refresh-token");
        let b = AuthRepository::hash_token("some-refresh-token");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_hash_token_differs_per_input() {
        let a = AuthRepository::hash_token("token-a");
        let b = AuthRepository::hash_token("token-b");
        assert_ne!(a, b);
    }
}
