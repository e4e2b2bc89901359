//! 审计日志查询的 HTTP 处理器
//! 仅供后台展示；核心逻辑从不回读这些事件

use crate::{
    auth::middleware::AuthContext,
    error::AppError,
    middleware::AppState,
    models::audit::AuditLogFilters,
    models::role::permissions,
};
use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct AuditListQuery {
    pub actor_id: Option<Uuid>,
    pub action: Option<String>,
    pub entity_type: Option<String>,
    pub entity_id: Option<Uuid>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// 查询审计日志
pub async fn list_audit_logs(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Query(query): Query<AuditListQuery>,
) -> Result<impl IntoResponse, AppError> {
    state
        .permission_service
        .require_permission(auth_context.user_id, permissions::AUDIT_READ)
        .await?;

    let filters = AuditLogFilters {
        actor_id: query.actor_id,
        action: query.action,
        entity_type: query.entity_type,
        entity_id: query.entity_id,
        date_from: query.date_from,
        date_to: query.date_to,
    };

    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let offset = query.offset.unwrap_or(0).max(0);

    let logs = state.audit_service.query_logs(&filters, limit, offset).await?;
    let total = state.audit_service.count_logs(&filters).await?;

    Ok(Json(json!({
        "logs": logs,
        "total": total
    })))
}
