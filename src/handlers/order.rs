//! 订单查询的 HTTP 处理器
//! 订单由店面系统产生，这里只读

use crate::{
    auth::middleware::AuthContext,
    error::AppError,
    middleware::AppState,
    models::role::permissions,
    repository::OrderRepository,
};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// 列出订单
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    state
        .permission_service
        .require_permission(auth_context.user_id, permissions::ORDER_READ)
        .await?;

    let repo = OrderRepository::new(state.db.clone());
    let orders = repo
        .list(
            pagination.limit.unwrap_or(50).clamp(1, 200),
            pagination.offset.unwrap_or(0).max(0),
        )
        .await?;

    Ok(Json(json!({
        "orders": orders,
        "count": orders.len()
    })))
}

/// 订单详情（含行项）
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state
        .permission_service
        .require_permission(auth_context.user_id, permissions::ORDER_READ)
        .await?;

    let repo = OrderRepository::new(state.db.clone());
    let order = repo
        .find_with_items(&id)
        .await?
        .ok_or_else(|| AppError::not_found("Order not found"))?;

    Ok(Json(order))
}

/// 各行项可退余量报告
pub async fn get_returnable_items(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state
        .permission_service
        .require_permission(auth_context.user_id, permissions::ORDER_READ)
        .await?;

    let report = state.rma_service.returnable_report(id).await?;

    Ok(Json(json!({ "items": report })))
}
