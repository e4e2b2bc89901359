//! Order domain models
//!
//! Orders are placed by the storefront; the back office only reads them as
//! the reference point for RMAs.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Order line item with its price snapshot at time of sale
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub sku: String,
    pub name: String,
    pub options: Option<String>,
    pub qty: i32,
    pub unit_price_at_sale: Decimal,
}

/// Order with items
#[derive(Debug, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Per-item returnable quantity report for the RMA creation flow
#[derive(Debug, Serialize)]
pub struct ReturnableItem {
    pub order_item_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub sku: String,
    pub name: String,
    pub original_qty: i32,
    pub max_returnable_qty: i32,
}
