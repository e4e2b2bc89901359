//! 服务层集成测试
//! 覆盖：登录失败语义、身份解析的 fail-closed 行为、权限检查

use backoffice_system::{
    auth::jwt::JwtService,
    config::AppConfig,
    error::AppError,
    models::auth::LoginRequest,
    services::{AuditService, AuthService, PermissionService},
};
use std::sync::Arc;
use uuid::Uuid;

mod common;
use common::{create_test_config, create_test_role, create_test_user, setup_test_db, suspend_test_user};

fn create_auth_service(pool: &sqlx::PgPool, config: &AppConfig) -> AuthService {
    let jwt_service = Arc::new(JwtService::from_config(config).unwrap());
    let permission_service = Arc::new(PermissionService::new(pool.clone()));
    let audit_service = Arc::new(AuditService::new(pool.clone()));

    AuthService::new(
        pool.clone(),
        jwt_service,
        permission_service,
        audit_service,
        Arc::new(config.clone()),
    )
}

#[tokio::test]
#[ignore] // 需要数据库
async fn test_login_success_resolves_role_and_permissions() {
    let config = create_test_config();
    let pool = setup_test_db(&config).await;

    let role_id = create_test_role(&pool, "ops", &["rma:read", "rma:write"])
        .await
        .unwrap();
    create_test_user(&pool, "Operator", "Ops@Example.com", "TestPass123", role_id)
        .await
        .unwrap();

    let auth_service = create_auth_service(&pool, &config);

    // 邮箱匹配不区分大小写
    let response = auth_service
        .login(
            LoginRequest {
                email: "ops@example.com".to_string(),
                password: "TestPass123".to_string(),
            },
            "127.0.0.1",
            Some("test-agent"),
        )
        .await
        .expect("login should succeed");

    assert!(!response.access_token.is_empty());
    assert!(!response.refresh_token.is_empty());
    assert_eq!(response.role, "ops");
    assert!(response.permissions.contains(&"rma:write".to_string()));
}

#[tokio::test]
#[ignore] // 需要数据库
async fn test_login_failure_modes() {
    let config = create_test_config();
    let pool = setup_test_db(&config).await;

    let role_id = create_test_role(&pool, "ops", &["rma:read"]).await.unwrap();
    create_test_user(&pool, "Active", "active@example.com", "TestPass123", role_id)
        .await
        .unwrap();
    let suspended = create_test_user(
        &pool,
        "Suspended",
        "suspended@example.com",
        "TestPass123",
        role_id,
    )
    .await
    .unwrap();
    suspend_test_user(&pool, suspended).await.unwrap();

    let auth_service = create_auth_service(&pool, &config);

    // 未知邮箱 → UserNotFound
    let result = auth_service
        .login(
            LoginRequest {
                email: "x@x.com".to_string(),
                password: "TestPass123".to_string(),
            },
            "127.0.0.1",
            None,
        )
        .await;
    assert!(matches!(result, Err(AppError::UserNotFound)));

    // 挂起账户 → UserSuspended
    let result = auth_service
        .login(
            LoginRequest {
                email: "suspended@example.com".to_string(),
                password: "TestPass123".to_string(),
            },
            "127.0.0.1",
            None,
        )
        .await;
    assert!(matches!(result, Err(AppError::UserSuspended)));

    // 密码错误 → Unauthorized
    let result = auth_service
        .login(
            LoginRequest {
                email: "active@example.com".to_string(),
                password: "WrongPassword1".to_string(),
            },
            "127.0.0.1",
            None,
        )
        .await;
    assert!(matches!(result, Err(AppError::Unauthorized)));
}

#[tokio::test]
#[ignore] // 需要数据库
async fn test_refresh_token_rotation() {
    let config = create_test_config();
    let pool = setup_test_db(&config).await;

    let role_id = create_test_role(&pool, "ops", &["rma:read"]).await.unwrap();
    create_test_user(&pool, "Operator", "ops@example.com", "TestPass123", role_id)
        .await
        .unwrap();

    let auth_service = create_auth_service(&pool, &config);

    let login = auth_service
        .login(
            LoginRequest {
                email: "ops@example.com".to_string(),
                password: "TestPass123".to_string(),
            },
            "127.0.0.1",
            None,
        )
        .await
        .unwrap();

    let refreshed = auth_service
        .refresh_token(
            backoffice_system::models::auth::RefreshTokenRequest {
                refresh_token: login.refresh_token.clone(),
            },
            "127.0.0.1",
        )
        .await
        .expect("refresh should succeed");

    assert!(!refreshed.access_token.is_empty());

    // 旧刷新令牌已被撤销，不能再次使用
    let reused = auth_service
        .refresh_token(
            backoffice_system::models::auth::RefreshTokenRequest {
                refresh_token: login.refresh_token,
            },
            "127.0.0.1",
        )
        .await;
    assert!(matches!(reused, Err(AppError::Unauthorized)));
}

#[tokio::test]
#[ignore] // 需要数据库
async fn test_resolve_identity_fails_closed_on_missing_role() {
    let config = create_test_config();
    let pool = setup_test_db(&config).await;

    // 用户指向一个不存在的角色（软引用允许悬挂）
    let dangling_role = Uuid::new_v4();
    let user_id = create_test_user(
        &pool,
        "Orphan",
        "orphan@example.com",
        "TestPass123",
        dangling_role,
    )
    .await
    .unwrap();

    let permission_service = PermissionService::new(pool.clone());

    let identity = permission_service
        .resolve_identity(user_id)
        .await
        .expect("identity resolution should succeed");

    // 角色缺失 → 空权限集，所有检查为 false
    assert!(identity.permissions.is_empty());
    assert!(!identity.has_permission("rma:read"));

    let allowed = permission_service
        .check_permission(user_id, "rma:read")
        .await
        .unwrap();
    assert!(!allowed);
}

#[tokio::test]
#[ignore] // 需要数据库
async fn test_permission_checks_never_error_for_unknown_user() {
    let config = create_test_config();
    let pool = setup_test_db(&config).await;

    let permission_service = PermissionService::new(pool.clone());

    // 用户不存在：检查返回 false，而不是错误
    let allowed = permission_service
        .check_permission(Uuid::new_v4(), "rma:read")
        .await
        .unwrap();
    assert!(!allowed);

    // 但 require_permission 会拒绝
    let result = permission_service
        .require_permission(Uuid::new_v4(), "rma:read")
        .await;
    assert!(matches!(result, Err(AppError::Forbidden)));
}

#[tokio::test]
#[ignore] // 需要数据库
async fn test_require_permission_enforces_membership() {
    let config = create_test_config();
    let pool = setup_test_db(&config).await;

    let role_id = create_test_role(&pool, "readonly", &["rma:read"]).await.unwrap();
    let user_id = create_test_user(&pool, "Reader", "reader@example.com", "TestPass123", role_id)
        .await
        .unwrap();

    let permission_service = PermissionService::new(pool.clone());

    permission_service
        .require_permission(user_id, "rma:read")
        .await
        .expect("granted permission should pass");

    let result = permission_service
        .require_permission(user_id, "rma:complete")
        .await;
    assert!(matches!(result, Err(AppError::Forbidden)));
}
