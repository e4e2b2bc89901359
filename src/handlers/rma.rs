//! RMA 的 HTTP 处理器

use crate::{
    auth::middleware::AuthContext,
    error::AppError,
    middleware::AppState,
    models::rma::{
        CancelRmaRequest, ChangeRmaStatusRequest, CreateRmaRequest, RmaListFilters,
        UpdateRmaRequest,
    },
    models::role::permissions,
    services::audit_service::Actor,
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
pub struct RmaListQuery {
    pub status: Option<crate::models::rma::RmaStatus>,
    pub order_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// 列出 RMA
pub async fn list_rmas(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Query(query): Query<RmaListQuery>,
) -> Result<impl IntoResponse, AppError> {
    state
        .permission_service
        .require_permission(auth_context.user_id, permissions::RMA_READ)
        .await?;

    let filters = RmaListFilters {
        status: query.status,
        order_id: query.order_id,
    };
    let rmas = state
        .rma_service
        .list_rmas(
            &filters,
            query.limit.unwrap_or(50).clamp(1, 200),
            query.offset.unwrap_or(0).max(0),
        )
        .await?;

    Ok(Json(json!({
        "rmas": rmas,
        "count": rmas.len()
    })))
}

/// RMA 详情
pub async fn get_rma(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state
        .permission_service
        .require_permission(auth_context.user_id, permissions::RMA_READ)
        .await?;

    let rma = state.rma_service.get_rma(id).await?;

    Ok(Json(rma))
}

/// 创建 RMA
pub async fn create_rma(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Json(req): Json<CreateRmaRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .permission_service
        .require_permission(auth_context.user_id, permissions::RMA_WRITE)
        .await?;

    let actor = Actor::from(&auth_context);
    let rma = state.rma_service.create_rma(req, &actor).await?;

    Ok(Json(json!({
        "message": "RMA created",
        "rma": rma
    })))
}

/// 更新 RMA
pub async fn update_rma(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateRmaRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .permission_service
        .require_permission(auth_context.user_id, permissions::RMA_WRITE)
        .await?;

    let actor = Actor::from(&auth_context);
    let rma = state.rma_service.update_rma(id, req, &actor).await?;

    Ok(Json(json!({
        "message": "RMA updated",
        "rma": rma
    })))
}

/// 状态变更（draft/approved 之间）
pub async fn change_rma_status(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<ChangeRmaStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .permission_service
        .require_permission(auth_context.user_id, permissions::RMA_APPROVE)
        .await?;

    let actor = Actor::from(&auth_context);
    let rma = state
        .rma_service
        .change_status(id, req.status, &actor)
        .await?;

    Ok(Json(json!({
        "message": "RMA status changed",
        "rma": rma
    })))
}

/// 完成 RMA（应用库存效果）
pub async fn complete_rma(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state
        .permission_service
        .require_permission(auth_context.user_id, permissions::RMA_COMPLETE)
        .await?;

    let actor = Actor::from(&auth_context);
    let rma = state.rma_service.complete_rma(id, &actor).await?;

    Ok(Json(json!({
        "message": "RMA completed",
        "rma": rma
    })))
}

/// 取消 RMA（可选回滚库存）
pub async fn cancel_rma(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<CancelRmaRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .permission_service
        .require_permission(auth_context.user_id, permissions::RMA_CANCEL)
        .await?;

    let actor = Actor::from(&auth_context);
    let rma = state
        .rma_service
        .cancel_rma(id, req.revert_inventory, &actor)
        .await?;

    Ok(Json(json!({
        "message": "RMA cancelled",
        "rma": rma
    })))
}
