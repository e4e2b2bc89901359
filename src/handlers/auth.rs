//! 认证相关的 HTTP 处理器

use crate::{
    auth::middleware::AuthContext,
    error::AppError,
    middleware::{get_client_ip, AppState},
    models::auth::*,
    services::audit_service::Actor,
};
use axum::{
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;

/// 登录
pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let client_ip = get_client_ip(&headers, state.config.security.trust_proxy);
    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let response = state
        .auth_service
        .login(req, &client_ip, user_agent.as_deref())
        .await?;

    Ok(Json(response))
}

/// 刷新令牌
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<RefreshTokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    let client_ip = get_client_ip(&headers, state.config.security.trust_proxy);

    let token_pair = state.auth_service.refresh_token(req, &client_ip).await?;

    Ok(Json(token_pair))
}

/// 当前用户信息（从注册表实时解析，始终反映最新角色/权限）
pub async fn get_current_user(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    let identity = state
        .permission_service
        .resolve_identity(auth_context.user_id)
        .await?;

    let mut permissions: Vec<String> = identity.permissions.iter().cloned().collect();
    permissions.sort();

    Ok(Json(json!({
        "id": identity.id,
        "name": identity.name,
        "email": identity.email,
        "role": identity.role,
        "permissions": permissions,
    })))
}

/// 登出
pub async fn logout(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
    Json(req): Json<LogoutRequest>,
) -> Result<impl IntoResponse, AppError> {
    let actor = Actor::from(&auth_context);
    state.auth_service.logout(&req.refresh_token, &actor).await?;

    Ok(Json(json!({ "message": "Logged out" })))
}

/// 从所有设备登出
pub async fn logout_all(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    let revoked = state.auth_service.logout_all(auth_context.user_id).await?;

    Ok(Json(json!({ "message": "Logged out", "revoked": revoked })))
}
