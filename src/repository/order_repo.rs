//! Order repository (数据库访问层)
//!
//! 订单由店面系统写入，后台只读。

use crate::{
    error::AppError,
    models::order::{Order, OrderItem, OrderWithItems},
};
use sqlx::PgPool;
use uuid::Uuid;

pub struct OrderRepository {
    db: PgPool,
}

impl OrderRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// 根据 ID 查找订单
    pub async fn find_by_id(&self, id: &Uuid) -> Result<Option<Order>, AppError> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        Ok(order)
    }

    /// 查找订单行项
    pub async fn find_items(&self, order_id: &Uuid) -> Result<Vec<OrderItem>, AppError> {
        let items = sqlx::query_as::<_, OrderItem>(
            "SELECT * FROM order_items WHERE order_id = $1 ORDER BY sku",
        )
        .bind(order_id)
        .fetch_all(&self.db)
        .await?;

        Ok(items)
    }

    /// 查找订单及其行项
    pub async fn find_with_items(&self, id: &Uuid) -> Result<Option<OrderWithItems>, AppError> {
        let Some(order) = self.find_by_id(id).await? else {
            return Ok(None);
        };

        let items = self.find_items(id).await?;

        Ok(Some(OrderWithItems { order, items }))
    }

    /// 列出订单
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Order>, AppError> {
        let orders = sqlx::query_as::<_, Order>(
            "SELECT * FROM orders ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        Ok(orders)
    }
}
