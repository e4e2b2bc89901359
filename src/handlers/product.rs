//! 商品与库存的 HTTP 处理器

use crate::{
    auth::middleware::AuthContext,
    error::AppError,
    middleware::AppState,
    models::product::{AdjustStockRequest, CreateProductRequest},
    models::role::permissions,
    repository::ProductRepository,
    services::audit_service::{Actor, AuditAction, AuditLogParams},
};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::order::Pagination;

/// 列出商品
pub async fn list_products(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    state
        .permission_service
        .require_permission(auth_context.user_id, permissions::PRODUCT_READ)
        .await?;

    let repo = ProductRepository::new(state.db.clone());
    let products = repo
        .list(
            pagination.limit.unwrap_or(50).clamp(1, 200),
            pagination.offset.unwrap_or(0).max(0),
        )
        .await?;

    Ok(Json(json!({
        "products": products,
        "count": products.len()
    })))
}

/// 商品详情（含变体）
pub async fn get_product(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state
        .permission_service
        .require_permission(auth_context.user_id, permissions::PRODUCT_READ)
        .await?;

    let repo = ProductRepository::new(state.db.clone());
    let product = repo
        .find_with_variants(&id)
        .await?
        .ok_or_else(|| AppError::not_found("Product not found"))?;

    Ok(Json(product))
}

/// 创建商品
pub async fn create_product(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Json(req): Json<CreateProductRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .permission_service
        .require_permission(auth_context.user_id, permissions::PRODUCT_WRITE)
        .await?;

    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let repo = ProductRepository::new(state.db.clone());
    let product = repo.create(&req).await?;

    let actor = Actor::from(&auth_context);
    state
        .audit_service
        .log_action_simple(
            &actor,
            AuditAction::ProductCreate,
            Some("product"),
            Some(product.id),
            Some(&product.sku),
        )
        .await?;

    Ok(Json(json!({
        "message": "Product created",
        "product": product
    })))
}

/// 人工库存调整（正数补货，负数扣减）
pub async fn adjust_stock(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<AdjustStockRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .permission_service
        .require_permission(auth_context.user_id, permissions::PRODUCT_WRITE)
        .await?;

    if req.delta == 0 {
        return Err(AppError::validation("Stock delta cannot be zero"));
    }

    let repo = ProductRepository::new(state.db.clone());
    let product = repo
        .find_by_id(&id)
        .await?
        .ok_or_else(|| AppError::not_found("Product not found"))?;

    let adjusted = repo.adjust_stock(id, req.delta, req.variant_id).await?;
    if !adjusted {
        return Err(AppError::not_found("Product variant not found"));
    }

    let actor = Actor::from(&auth_context);
    state
        .audit_service
        .log_action(AuditLogParams {
            actor: &actor,
            action: AuditAction::ProductStockAdjust,
            entity_type: Some("product"),
            entity_id: Some(product.id),
            entity_name: Some(&product.sku),
            changes: None,
            metadata: Some(json!({
                "delta": req.delta,
                "variant_id": req.variant_id,
                "reason": req.reason,
            })),
        })
        .await?;

    Ok(Json(json!({ "message": "Stock adjusted" })))
}
