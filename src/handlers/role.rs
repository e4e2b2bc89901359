//! 角色管理的 HTTP 处理器
//! 系统角色不可修改；角色名唯一；权限必须来自固定词汇表

use crate::{
    auth::middleware::AuthContext,
    error::AppError,
    middleware::AppState,
    models::role::{permissions, CreateRoleRequest, UpdateRoleRequest},
    repository::role_repo::RoleRepository,
    services::audit_service::{Actor, AuditAction},
};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// 校验权限标签集合
fn validate_permission_tags(tags: &[String]) -> Result<(), AppError> {
    for tag in tags {
        if !permissions::is_known(tag) {
            return Err(AppError::Validation(format!(
                "Unknown permission tag: {}",
                tag
            )));
        }
    }
    Ok(())
}

/// 列出所有角色
pub async fn list_roles(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    // 检查权限
    state
        .permission_service
        .require_permission(auth_context.user_id, permissions::ROLE_READ)
        .await?;

    let repo = RoleRepository::new(state.db.clone());
    let roles = repo.list().await?;

    Ok(Json(json!({
        "roles": roles,
        "count": roles.len()
    })))
}

/// 权限词汇表（前端编辑角色时的数据源）
pub async fn list_permissions(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    state
        .permission_service
        .require_permission(auth_context.user_id, permissions::ROLE_READ)
        .await?;

    Ok(Json(json!({ "permissions": permissions::ALL })))
}

/// 创建角色
pub async fn create_role(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Json(req): Json<CreateRoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .permission_service
        .require_permission(auth_context.user_id, permissions::ROLE_WRITE)
        .await?;

    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    validate_permission_tags(&req.permissions)?;

    let repo = RoleRepository::new(state.db.clone());

    if !repo.is_name_available(&req.name, None).await? {
        return Err(AppError::validation("Role name is already in use"));
    }

    let role = repo.create(&req).await?;

    // 审计日志
    let actor = Actor::from(&auth_context);
    state
        .audit_service
        .log_action_simple(
            &actor,
            AuditAction::RoleCreate,
            Some("role"),
            Some(role.id),
            Some(&role.name),
        )
        .await?;

    Ok(Json(json!({
        "message": "Role created",
        "role": role
    })))
}

/// 获取角色详情
pub async fn get_role(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state
        .permission_service
        .require_permission(auth_context.user_id, permissions::ROLE_READ)
        .await?;

    let repo = RoleRepository::new(state.db.clone());
    let role = repo
        .find_by_id(&id)
        .await?
        .ok_or_else(|| AppError::not_found("Role not found"))?;

    Ok(Json(role))
}

/// 更新角色
pub async fn update_role(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateRoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .permission_service
        .require_permission(auth_context.user_id, permissions::ROLE_WRITE)
        .await?;

    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    if let Some(tags) = &req.permissions {
        validate_permission_tags(tags)?;
    }

    let repo = RoleRepository::new(state.db.clone());
    let existing = repo
        .find_by_id(&id)
        .await?
        .ok_or_else(|| AppError::not_found("Role not found"))?;

    // 系统角色不可修改
    if existing.is_system {
        return Err(AppError::validation("System roles cannot be modified"));
    }

    if let Some(name) = &req.name {
        if !repo.is_name_available(name, Some(id)).await? {
            return Err(AppError::validation("Role name is already in use"));
        }
    }

    let role = repo
        .update(id, &req)
        .await?
        .ok_or_else(|| AppError::not_found("Role not found"))?;

    let actor = Actor::from(&auth_context);
    state
        .audit_service
        .log_action_simple(
            &actor,
            AuditAction::RoleUpdate,
            Some("role"),
            Some(role.id),
            Some(&role.name),
        )
        .await?;

    Ok(Json(json!({
        "message": "Role updated",
        "role": role
    })))
}
