//! RMA (Return Merchandise Authorization) domain models
//!
//! The RMA is the central mutable aggregate of the back office: a return or
//! exchange request raised against a previously placed order. Return lines
//! are snapshots frozen at the unit price the customer actually paid;
//! replacement lines carry an editable price. Money fields are always
//! derived from the stored lines via [`compute_rma_money`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

use crate::models::order::OrderItem;

/// RMA kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "rma_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RmaType {
    Return,
    Exchange,
}

/// RMA lifecycle state
///
/// draft → approved → completed；cancelled 可从任意非终态进入，
/// 也可按策略从 completed 进入（事后冲正）。cancelled 无出边。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "rma_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RmaStatus {
    Draft,
    Approved,
    Completed,
    Cancelled,
}

impl RmaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RmaStatus::Draft => "draft",
            RmaStatus::Approved => "approved",
            RmaStatus::Completed => "completed",
            RmaStatus::Cancelled => "cancelled",
        }
    }

    /// 统计已占用退货数量时计入的状态
    pub fn counts_against_returnable(&self) -> bool {
        matches!(self, RmaStatus::Approved | RmaStatus::Completed)
    }
}

/// Settlement direction derived from the money difference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "rma_settlement", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RmaSettlement {
    RefundCustomer,
    ChargeCustomer,
    Even,
}

/// Returned line — snapshot taken from the order item at RMA creation.
/// Immutable once captured; `unit_price_at_sale` is what the customer paid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RmaItem {
    pub product_id: Option<Uuid>,
    pub variant_id: Option<Uuid>,
    pub sku: String,
    pub name: String,
    pub options: Option<String>,
    pub qty: i32,
    pub unit_price_at_sale: Decimal,
}

/// Replacement line shipped out in an exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RmaReplacementItem {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub sku: String,
    pub name: String,
    pub qty: i32,
    pub unit_price: Decimal,
}

/// Derived money summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RmaMoney {
    pub subtotal_return: Decimal,
    pub subtotal_replacement: Decimal,
    pub difference: Decimal,
    pub settlement: RmaSettlement,
}

/// RMA aggregate
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Rma {
    pub id: Uuid,
    pub rma_number: String,
    pub rma_type: RmaType,
    pub status: RmaStatus,
    pub order_id: Uuid,
    pub order_number: String,

    pub return_items: Json<Vec<RmaItem>>,
    pub replacement_items: Json<Vec<RmaReplacementItem>>,

    pub subtotal_return: Decimal,
    pub subtotal_replacement: Decimal,
    pub difference: Decimal,
    pub settlement: RmaSettlement,
    pub payment_method: Option<String>,
    pub payment_reference: Option<String>,

    pub notes: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Rma {
    pub fn money(&self) -> RmaMoney {
        RmaMoney {
            subtotal_return: self.subtotal_return,
            subtotal_replacement: self.subtotal_replacement,
            difference: self.difference,
            settlement: self.settlement,
        }
    }
}

/// Compute the money summary for a pair of item sets.
///
/// subtotal_return = Σ qty × unit_price_at_sale,
/// subtotal_replacement = Σ qty × unit_price,
/// difference = subtotal_replacement − subtotal_return,
/// settlement 按差额符号决定。
pub fn compute_rma_money(
    return_items: &[RmaItem],
    replacement_items: &[RmaReplacementItem],
) -> RmaMoney {
    let subtotal_return: Decimal = return_items
        .iter()
        .map(|item| Decimal::from(item.qty) * item.unit_price_at_sale)
        .sum();

    let subtotal_replacement: Decimal = replacement_items
        .iter()
        .map(|item| Decimal::from(item.qty) * item.unit_price)
        .sum();

    let difference = subtotal_replacement - subtotal_return;

    let settlement = match difference.cmp(&Decimal::ZERO) {
        std::cmp::Ordering::Greater => RmaSettlement::ChargeCustomer,
        std::cmp::Ordering::Less => RmaSettlement::RefundCustomer,
        std::cmp::Ordering::Equal => RmaSettlement::Even,
    };

    RmaMoney {
        subtotal_return,
        subtotal_replacement,
        difference,
        settlement,
    }
}

/// Maximum quantity of an order item still claimable by a new RMA.
///
/// Sums the returned quantity for the same product/variant across every
/// approved or completed RMA of the order (excluding the RMA being edited,
/// if any) and clamps the remainder at zero.
pub fn max_returnable_qty(
    order_item: &OrderItem,
    order_rmas: &[Rma],
    exclude_rma_id: Option<Uuid>,
) -> i32 {
    let already_returned: i32 = order_rmas
        .iter()
        .filter(|rma| Some(rma.id) != exclude_rma_id)
        .filter(|rma| rma.status.counts_against_returnable())
        .flat_map(|rma| rma.return_items.0.iter())
        .filter(|item| {
            item.product_id == Some(order_item.product_id)
                && item.variant_id == order_item.variant_id
        })
        .map(|item| item.qty)
        .sum();

    (order_item.qty - already_returned).max(0)
}

/// Format a sequence value as a customer-facing RMA number
pub fn format_rma_number(seq: i64) -> String {
    format!("RMA-{:06}", seq)
}

/// Fully resolved RMA record ready for insertion
#[derive(Debug, Clone)]
pub struct NewRma {
    pub rma_number: String,
    pub rma_type: RmaType,
    pub status: RmaStatus,
    pub order_id: Uuid,
    pub order_number: String,
    pub return_items: Vec<RmaItem>,
    pub replacement_items: Vec<RmaReplacementItem>,
    pub money: RmaMoney,
    pub payment_method: Option<String>,
    pub payment_reference: Option<String>,
    pub notes: Option<String>,
    pub created_by: Uuid,
}

// ==================== Requests ====================

/// Return line as submitted by the caller; the engine re-reads the price
/// snapshot from the order item rather than trusting the request.
#[derive(Debug, Clone, Deserialize)]
pub struct RmaItemRequest {
    pub order_item_id: Uuid,
    pub qty: i32,
}

/// Replacement line request
#[derive(Debug, Clone, Deserialize)]
pub struct RmaReplacementItemRequest {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub qty: i32,
    pub unit_price: Decimal,
}

/// Create RMA request
#[derive(Debug, Deserialize)]
pub struct CreateRmaRequest {
    pub order_id: Uuid,
    pub rma_type: RmaType,
    /// 允许 draft 或直接 approved；缺省 draft
    pub status: Option<RmaStatus>,
    pub return_items: Vec<RmaItemRequest>,
    #[serde(default)]
    pub replacement_items: Vec<RmaReplacementItemRequest>,
    pub payment_method: Option<String>,
    pub payment_reference: Option<String>,
    pub notes: Option<String>,
}

/// Update RMA request (non-terminal RMAs only)
#[derive(Debug, Deserialize)]
pub struct UpdateRmaRequest {
    pub return_items: Option<Vec<RmaItemRequest>>,
    pub replacement_items: Option<Vec<RmaReplacementItemRequest>>,
    pub payment_method: Option<String>,
    pub payment_reference: Option<String>,
    pub notes: Option<String>,
}

/// Status change request
#[derive(Debug, Deserialize)]
pub struct ChangeRmaStatusRequest {
    pub status: RmaStatus,
}

/// Cancel RMA request
#[derive(Debug, Deserialize, Default)]
pub struct CancelRmaRequest {
    /// 已完成的 RMA 取消时是否回滚库存
    #[serde(default)]
    pub revert_inventory: bool,
}

/// List filters
#[derive(Debug, Deserialize, Default)]
pub struct RmaListFilters {
    pub status: Option<RmaStatus>,
    pub order_id: Option<Uuid>,
}
