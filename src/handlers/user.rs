//! 用户管理的 HTTP 处理器
//! 管理端用户只挂起/恢复，不做物理删除

use crate::{
    auth::middleware::AuthContext,
    auth::password::PasswordHasher,
    error::AppError,
    middleware::AppState,
    models::role::permissions,
    models::user::*,
    repository::{RoleRepository, UserRepository},
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

/// 列出用户
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    // 检查权限
    state
        .permission_service
        .require_permission(auth_context.user_id, permissions::USER_READ)
        .await?;

    let repo = UserRepository::new(state.db.clone());
    let users = repo.list(50, 0).await?;

    let user_responses: Vec<UserResponse> = users.into_iter().map(|u| u.into()).collect();

    Ok(Json(json!({
        "users": user_responses,
        "count": user_responses.len()
    })))
}

/// 创建用户
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    // 检查权限
    state
        .permission_service
        .require_permission(auth_context.user_id, permissions::USER_WRITE)
        .await?;

    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let repo = UserRepository::new(state.db.clone());

    // 邮箱不区分大小写唯一
    if !repo.is_email_available(&req.email, None).await? {
        return Err(AppError::validation("Email is already in use"));
    }

    // 角色必须存在
    let role_repo = RoleRepository::new(state.db.clone());
    role_repo
        .find_by_id(&req.role_id)
        .await?
        .ok_or_else(|| AppError::validation("Unknown role"))?;

    // 验证密码策略
    PasswordHasher::validate_password_policy(&req.password, &state.config)?;

    // 哈希密码
    let hasher = PasswordHasher::new();
    let password_hash = hasher.hash(&req.password)?;

    let user = repo.create(&req, &password_hash).await?;

    // 审计日志
    let actor = Actor::from(&auth_context);
    state
        .audit_service
        .log_action_simple(
            &actor,
            AuditAction::UserCreate,
            Some("user"),
            Some(user.id),
            Some(&user.email),
        )
        .await?;

    Ok(Json(json!({
        "message": "User created",
        "user": UserResponse::from(user)
    })))
}

/// 获取用户详情
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state
        .permission_service
        .require_permission(auth_context.user_id, permissions::USER_READ)
        .await?;

    let repo = UserRepository::new(state.db.clone());
    let user = repo
        .find_by_id(&id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    Ok(Json(UserResponse::from(user)))
}

/// 更新用户
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .permission_service
        .require_permission(auth_context.user_id, permissions::USER_WRITE)
        .await?;

    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let repo = UserRepository::new(state.db.clone());

    if let Some(email) = &req.email {
        if !repo.is_email_available(email, Some(id)).await? {
            return Err(AppError::validation("Email is already in use"));
        }
    }

    if let Some(role_id) = req.role_id {
        let role_repo = RoleRepository::new(state.db.clone());
        role_repo
            .find_by_id(&role_id)
            .await?
            .ok_or_else(|| AppError::validation("Unknown role"))?;
    }

    let user = repo
        .update(id, &req)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    let actor = Actor::from(&auth_context);
    state
        .audit_service
        .log_action_simple(
            &actor,
            AuditAction::UserUpdate,
            Some("user"),
            Some(user.id),
            Some(&user.email),
        )
        .await?;

    Ok(Json(json!({
        "message": "User updated",
        "user": UserResponse::from(user)
    })))
}

/// 挂起用户
pub async fn suspend_user(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state
        .permission_service
        .require_permission(auth_context.user_id, permissions::USER_WRITE)
        .await?;

    // 不允许挂起自己
    if id == auth_context.user_id {
        return Err(AppError::BadRequest(
            "Cannot suspend your own account".to_string(),
        ));
    }

    let repo = UserRepository::new(state.db.clone());
    let user = repo
        .set_status(id, UserStatus::Suspended)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    // 挂起同时吊销该用户的全部刷新令牌
    state.auth_service.logout_all(id).await?;

    let actor = Actor::from(&auth_context);
    state
        .audit_service
        .log_action_simple(
            &actor,
            AuditAction::UserSuspend,
            Some("user"),
            Some(user.id),
            Some(&user.email),
        )
        .await?;

    Ok(Json(json!({
        "message": "User suspended",
        "user": UserResponse::from(user)
    })))
}

/// 恢复用户
pub async fn activate_user(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state
        .permission_service
        .require_permission(auth_context.user_id, permissions::USER_WRITE)
        .await?;

    let repo = UserRepository::new(state.db.clone());
    let user = repo
        .set_status(id, UserStatus::Active)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    let actor = Actor::from(&auth_context);
    state
        .audit_service
        .log_action_simple(
            &actor,
            AuditAction::UserActivate,
            Some("user"),
            Some(user.id),
            Some(&user.email),
        )
        .await?;

    Ok(Json(json!({
        "message": "User activated",
        "user": UserResponse::from(user)
    })))
}

/// 修改密码
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let repo = UserRepository::new(state.db.clone());
    let user = repo
        .find_by_id(&auth_context.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    let hasher = PasswordHasher::new();
    hasher.verify(&req.old_password, &user.password_hash)?;

    // 验证新密码策略
    PasswordHasher::validate_password_policy(&req.new_password, &state.config)?;

    // 哈希新密码
    let new_password_hash = hasher.hash(&req.new_password)?;

    repo.update_password(auth_context.user_id, &new_password_hash)
        .await?;

    let actor = Actor::from(&auth_context);
    state
        .audit_service
        .log_action_simple(
            &actor,
            AuditAction::UserPasswordChange,
            Some("user"),
            Some(user.id),
            None,
        )
        .await?;

    Ok(Json(json!({
        "message": "Password changed"
    })))
}
