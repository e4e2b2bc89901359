//! Product and inventory domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Product
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    /// 商品级库存；有变体时以变体库存为准
    pub stock: i32,
    pub has_variants: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Product variant
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProductVariant {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub stock: i32,
}

/// Product with its variants
#[derive(Debug, Serialize)]
pub struct ProductWithVariants {
    #[serde(flatten)]
    pub product: Product,
    pub variants: Vec<ProductVariant>,
}

/// Create product request
#[derive(Debug, Deserialize, validator::Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 64))]
    pub sku: String,
    #[validate(length(min = 1, max = 256))]
    pub name: String,
    #[validate(range(min = 0))]
    pub stock: i32,
    #[serde(default)]
    pub variants: Vec<CreateVariantRequest>,
}

/// Create variant request
#[derive(Debug, Deserialize, validator::Validate)]
pub struct CreateVariantRequest {
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    #[validate(range(min = 0))]
    pub stock: i32,
}

/// Manual stock adjustment request
#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    /// 正数补货，负数扣减
    pub delta: i32,
    pub variant_id: Option<Uuid>,
    pub reason: Option<String>,
}
