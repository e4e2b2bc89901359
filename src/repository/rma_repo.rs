//! RMA repository (数据库访问层)

use crate::{
    error::AppError,
    models::rma::{format_rma_number, NewRma, Rma, RmaListFilters, RmaStatus},
};
use sqlx::{types::Json, PgPool};
use uuid::Uuid;

pub struct RmaRepository {
    db: PgPool,
}

impl RmaRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// 分配下一个 RMA 编号
    ///
    /// 序列独立于 rmas 表持久化，编号单调递增且不复用。
    pub async fn next_rma_number(&self) -> Result<String, AppError> {
        let seq: i64 = sqlx::query_scalar("SELECT nextval('rma_number_seq')")
            .fetch_one(&self.db)
            .await?;

        Ok(format_rma_number(seq))
    }

    /// 插入新的 RMA 记录
    pub async fn insert(&self, new: &NewRma) -> Result<Rma, AppError> {
        let rma = sqlx::query_as::<_, Rma>(
            r#"
            INSERT INTO rmas (
                rma_number, rma_type, status, order_id, order_number,
                return_items, replacement_items,
                subtotal_return, subtotal_replacement, difference, settlement,
                payment_method, payment_reference, notes, created_by
            ) VALUES (
                $1, $2, $3, $4, $5,
                $6, $7,
                $8, $9, $10, $11,
                $12, $13, $14, $15
            ) RETURNING *
            "#,
        )
        .bind(&new.rma_number)
        .bind(new.rma_type)
        .bind(new.status)
        .bind(new.order_id)
        .bind(&new.order_number)
        .bind(Json(&new.return_items))
        .bind(Json(&new.replacement_items))
        .bind(new.money.subtotal_return)
        .bind(new.money.subtotal_replacement)
        .bind(new.money.difference)
        .bind(new.money.settlement)
        .bind(&new.payment_method)
        .bind(&new.payment_reference)
        .bind(&new.notes)
        .bind(new.created_by)
        .fetch_one(&self.db)
        .await?;

        Ok(rma)
    }

    /// 根据 ID 查找 RMA
    pub async fn find_by_id(&self, id: &Uuid) -> Result<Option<Rma>, AppError> {
        let rma = sqlx::query_as::<_, Rma>("SELECT * FROM rmas WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        Ok(rma)
    }

    /// 保存行项、金额与支付字段的变更
    pub async fn save(&self, rma: &Rma) -> Result<Rma, AppError> {
        let rma = sqlx::query_as::<_, Rma>(
            r#"
            UPDATE rmas
            SET
                return_items = $2,
                replacement_items = $3,
                subtotal_return = $4,
                subtotal_replacement = $5,
                difference = $6,
                settlement = $7,
                payment_method = $8,
                payment_reference = $9,
                notes = $10,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(rma.id)
        .bind(&rma.return_items)
        .bind(&rma.replacement_items)
        .bind(rma.subtotal_return)
        .bind(rma.subtotal_replacement)
        .bind(rma.difference)
        .bind(rma.settlement)
        .bind(&rma.payment_method)
        .bind(&rma.payment_reference)
        .bind(&rma.notes)
        .fetch_one(&self.db)
        .await?;

        Ok(rma)
    }

    /// 低层状态变更原语（业务守卫在服务层）
    pub async fn change_status(
        &self,
        id: Uuid,
        status: RmaStatus,
    ) -> Result<Option<Rma>, AppError> {
        let rma = sqlx::query_as::<_, Rma>(
            "UPDATE rmas SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status)
        .fetch_optional(&self.db)
        .await?;

        Ok(rma)
    }

    /// 某订单的全部 RMA（退货配额计算的输入）
    pub async fn list_by_order(&self, order_id: &Uuid) -> Result<Vec<Rma>, AppError> {
        let rmas = sqlx::query_as::<_, Rma>(
            "SELECT * FROM rmas WHERE order_id = $1 ORDER BY created_at",
        )
        .bind(order_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rmas)
    }

    /// 条件查询 RMA 列表
    pub async fn list(
        &self,
        filters: &RmaListFilters,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Rma>, AppError> {
        let rmas = sqlx::query_as::<_, Rma>(
            r#"
            SELECT * FROM rmas
            WHERE ($1::rma_status IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR order_id = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(filters.status)
        .bind(filters.order_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        Ok(rmas)
    }
}
