//! Product repository (数据库访问层)
//!
//! 库存调整接口：正数补货，负数扣减。RMA 完成/取消走事务内的行锁版本，
//! 这里的池上版本供人工调整使用。

use crate::{error::AppError, models::product::*};
use sqlx::PgPool;
use uuid::Uuid;

pub struct ProductRepository {
    db: PgPool,
}

impl ProductRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// 根据 ID 查找商品
    pub async fn find_by_id(&self, id: &Uuid) -> Result<Option<Product>, AppError> {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        Ok(product)
    }

    /// 查找商品的所有变体
    pub async fn find_variants(&self, product_id: &Uuid) -> Result<Vec<ProductVariant>, AppError> {
        let variants = sqlx::query_as::<_, ProductVariant>(
            "SELECT * FROM product_variants WHERE product_id = $1 ORDER BY name",
        )
        .bind(product_id)
        .fetch_all(&self.db)
        .await?;

        Ok(variants)
    }

    /// 查找商品及其变体
    pub async fn find_with_variants(
        &self,
        id: &Uuid,
    ) -> Result<Option<ProductWithVariants>, AppError> {
        let Some(product) = self.find_by_id(id).await? else {
            return Ok(None);
        };

        let variants = if product.has_variants {
            self.find_variants(id).await?
        } else {
            Vec::new()
        };

        Ok(Some(ProductWithVariants { product, variants }))
    }

    /// 创建商品（连同变体）
    pub async fn create(&self, req: &CreateProductRequest) -> Result<Product, AppError> {
        let mut tx = self.db.begin().await?;

        let product = sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (sku, name, stock, has_variants)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&req.sku)
        .bind(&req.name)
        .bind(req.stock)
        .bind(!req.variants.is_empty())
        .fetch_one(&mut *tx)
        .await?;

        for variant in &req.variants {
            sqlx::query(
                "INSERT INTO product_variants (product_id, name, stock) VALUES ($1, $2, $3)",
            )
            .bind(product.id)
            .bind(&variant.name)
            .bind(variant.stock)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(product)
    }

    /// 调整库存（商品级或指定变体）
    pub async fn adjust_stock(
        &self,
        product_id: Uuid,
        delta: i32,
        variant_id: Option<Uuid>,
    ) -> Result<bool, AppError> {
        let result = match variant_id {
            Some(variant_id) => {
                sqlx::query(
                    r#"
                    UPDATE product_variants
                    SET stock = stock + $3
                    WHERE id = $2 AND product_id = $1
                    "#,
                )
                .bind(product_id)
                .bind(variant_id)
                .bind(delta)
                .execute(&self.db)
                .await?
            }
            None => {
                sqlx::query("UPDATE products SET stock = stock + $2, updated_at = NOW() WHERE id = $1")
                    .bind(product_id)
                    .bind(delta)
                    .execute(&self.db)
                    .await?
            }
        };

        Ok(result.rows_affected() > 0)
    }

    /// 列出所有商品
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Product>, AppError> {
        let products =
            sqlx::query_as::<_, Product>("SELECT * FROM products ORDER BY sku LIMIT $1 OFFSET $2")
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.db)
                .await?;

        Ok(products)
    }
}
