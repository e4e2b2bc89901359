//! Audit log repository (数据库访问层)
//! 审计日志只追加，核心从不读取自己写入的事件。

use crate::{
    error::AppError,
    models::audit::{AuditLog, AuditLogFilters},
};
use sqlx::{PgPool, Postgres, Transaction};

pub struct AuditRepository {
    db: PgPool,
}

const INSERT_AUDIT_LOG: &str = r#"
INSERT INTO audit_logs (
    actor_id, actor_name, actor_role, action,
    entity_type, entity_id, entity_name,
    changes, metadata, occurred_at
) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
"#;

impl AuditRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// 写入审计日志
    pub async fn insert(&self, log: &AuditLog) -> Result<(), AppError> {
        sqlx::query(INSERT_AUDIT_LOG)
            .bind(log.actor_id)
            .bind(&log.actor_name)
            .bind(&log.actor_role)
            .bind(&log.action)
            .bind(&log.entity_type)
            .bind(log.entity_id)
            .bind(&log.entity_name)
            .bind(&log.changes)
            .bind(&log.metadata)
            .bind(log.occurred_at)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// 在既有事务内写入审计日志
    ///
    /// RMA 完成/取消要求状态变更、库存调整和审计发射在同一事务提交。
    pub async fn insert_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        log: &AuditLog,
    ) -> Result<(), AppError> {
        sqlx::query(INSERT_AUDIT_LOG)
            .bind(log.actor_id)
            .bind(&log.actor_name)
            .bind(&log.actor_role)
            .bind(&log.action)
            .bind(&log.entity_type)
            .bind(log.entity_id)
            .bind(&log.entity_name)
            .bind(&log.changes)
            .bind(&log.metadata)
            .bind(log.occurred_at)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    /// 条件查询审计日志
    pub async fn query(
        &self,
        filters: &AuditLogFilters,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AuditLog>, AppError> {
        let logs = sqlx::query_as::<_, AuditLog>(
            r#"
            SELECT * FROM audit_logs
            WHERE ($1::uuid IS NULL OR actor_id = $1)
              AND ($2::text IS NULL OR action = $2)
              AND ($3::text IS NULL OR entity_type = $3)
              AND ($4::uuid IS NULL OR entity_id = $4)
              AND ($5::timestamptz IS NULL OR occurred_at >= $5)
              AND ($6::timestamptz IS NULL OR occurred_at <= $6)
            ORDER BY occurred_at DESC
            LIMIT $7 OFFSET $8
            "#,
        )
        .bind(filters.actor_id)
        .bind(&filters.action)
        .bind(&filters.entity_type)
        .bind(filters.entity_id)
        .bind(filters.date_from)
        .bind(filters.date_to)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        Ok(logs)
    }

    /// 统计匹配的日志数量
    pub async fn count(&self, filters: &AuditLogFilters) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM audit_logs
            WHERE ($1::uuid IS NULL OR actor_id = $1)
              AND ($2::text IS NULL OR action = $2)
              AND ($3::text IS NULL OR entity_type = $3)
              AND ($4::uuid IS NULL OR entity_id = $4)
              AND ($5::timestamptz IS NULL OR occurred_at >= $5)
              AND ($6::timestamptz IS NULL OR occurred_at <= $6)
            "#,
        )
        .bind(filters.actor_id)
        .bind(&filters.action)
        .bind(&filters.entity_type)
        .bind(filters.entity_id)
        .bind(filters.date_from)
        .bind(filters.date_to)
        .fetch_one(&self.db)
        .await?;

        Ok(count)
    }
}
