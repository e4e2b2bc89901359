//! 路由注册
//! 创建所有 API 路由并应用中间件

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};

use crate::{handlers, middleware::AppState};

/// 创建应用路由
pub fn create_router(state: Arc<AppState>) -> Router {
    // 公开端点（健康检查）
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check));

    // 认证路由（无需认证）
    let auth_routes = Router::new()
        .route("/api/v1/auth/login", post(handlers::auth::login))
        .route("/api/v1/auth/refresh", post(handlers::auth::refresh_token));

    // 需要认证的路由
    let authenticated_routes = Router::new()
        // 当前用户信息
        .route("/api/v1/auth/me", get(handlers::auth::get_current_user))
        .route("/api/v1/auth/logout", post(handlers::auth::logout))
        .route("/api/v1/auth/logout-all", post(handlers::auth::logout_all))
        // 用户管理（需要权限）
        .route(
            "/api/v1/users",
            get(handlers::user::list_users).post(handlers::user::create_user),
        )
        .route(
            "/api/v1/users/{id}",
            get(handlers::user::get_user).put(handlers::user::update_user),
        )
        .route(
            "/api/v1/users/{id}/suspend",
            post(handlers::user::suspend_user),
        )
        .route(
            "/api/v1/users/{id}/activate",
            post(handlers::user::activate_user),
        )
        .route(
            "/api/v1/users/me/password",
            put(handlers::user::change_password),
        )
        // 角色管理
        .route(
            "/api/v1/roles",
            get(handlers::role::list_roles).post(handlers::role::create_role),
        )
        .route(
            "/api/v1/roles/{id}",
            get(handlers::role::get_role).put(handlers::role::update_role),
        )
        .route(
            "/api/v1/permissions",
            get(handlers::role::list_permissions),
        )
        // 订单（只读）
        .route("/api/v1/orders", get(handlers::order::list_orders))
        .route("/api/v1/orders/{id}", get(handlers::order::get_order))
        .route(
            "/api/v1/orders/{id}/returnable",
            get(handlers::order::get_returnable_items),
        )
        // 商品与库存
        .route(
            "/api/v1/products",
            get(handlers::product::list_products).post(handlers::product::create_product),
        )
        .route("/api/v1/products/{id}", get(handlers::product::get_product))
        .route(
            "/api/v1/products/{id}/stock",
            post(handlers::product::adjust_stock),
        )
        // RMA
        .route(
            "/api/v1/rmas",
            get(handlers::rma::list_rmas).post(handlers::rma::create_rma),
        )
        .route(
            "/api/v1/rmas/{id}",
            get(handlers::rma::get_rma).put(handlers::rma::update_rma),
        )
        .route(
            "/api/v1/rmas/{id}/status",
            post(handlers::rma::change_rma_status),
        )
        .route(
            "/api/v1/rmas/{id}/complete",
            post(handlers::rma::complete_rma),
        )
        .route("/api/v1/rmas/{id}/cancel", post(handlers::rma::cancel_rma))
        // 审计日志（需要审计权限）
        .route("/api/v1/audit/logs", get(handlers::audit::list_audit_logs))
        .layer(axum::middleware::from_fn_with_state(
            state.jwt_service.clone(),
            crate::auth::middleware::jwt_auth_middleware,
        ));

    // 指标端点
    let metrics_routes = Router::new().route("/metrics", get(handlers::metrics::metrics_export));

    // 组合所有路由
    Router::new()
        .merge(public_routes)
        .merge(auth_routes)
        .merge(authenticated_routes)
        .merge(metrics_routes)
        .layer(axum::middleware::from_fn(
            crate::middleware::request_tracking_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .with_state(state)
}
