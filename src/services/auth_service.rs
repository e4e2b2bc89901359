//! 认证服务：登录、登出、令牌刷新、首次启动引导

use crate::{
    auth::jwt::{JwtService, TokenPair},
    auth::password::PasswordHasher,
    config::AppConfig,
    error::AppError,
    models::{auth::*, user::*},
    repository::{auth_repo::AuthRepository, role_repo::RoleRepository, user_repo::UserRepository},
    services::audit_service::{Actor, AuditAction, AuditService},
    services::permission_service::PermissionService,
};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

pub struct AuthService {
    db: PgPool,
    jwt_service: Arc<JwtService>,
    permission_service: Arc<PermissionService>,
    audit_service: Arc<AuditService>,
    config: Arc<AppConfig>,
}

impl AuthService {
    pub fn new(
        db: PgPool,
        jwt_service: Arc<JwtService>,
        permission_service: Arc<PermissionService>,
        audit_service: Arc<AuditService>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            jwt_service,
            permission_service,
            audit_service,
            config,
        }
    }

    /// 用户登录
    ///
    /// 失败语义：邮箱无匹配（不区分大小写）→ UserNotFound；
    /// 账户挂起 → UserSuspended；口令校验失败 → Unauthorized。
    pub async fn login(
        &self,
        req: LoginRequest,
        client_ip: &str,
        user_agent: Option<&str>,
    ) -> Result<LoginResponse, AppError> {
        let user_repo = UserRepository::new(self.db.clone());

        // 获取用户
        let Some(user) = user_repo.find_by_email(&req.email).await? else {
            tracing::warn!(email = %req.email, "Login attempt for unknown email");
            return Err(AppError::UserNotFound);
        };

        // 检查账户状态
        if user.is_suspended() {
            self.record_login_failure(&user, "suspended").await;
            return Err(AppError::UserSuspended);
        }

        // 验证密码
        let hasher = PasswordHasher::new();
        if hasher.verify(&req.password, &user.password_hash).is_err() {
            self.record_login_failure(&user, "invalid_credentials").await;
            return Err(AppError::Unauthorized);
        }

        // 解析身份（角色名 + 权限集）
        let identity = self.permission_service.resolve_identity(user.id).await?;

        // 生成令牌
        let token_pair = self.jwt_service.generate_token_pair(&identity)?;

        // 存储刷新令牌
        self.store_refresh_token(
            &token_pair.refresh_token,
            user.id,
            client_ip,
            user_agent,
            None,
        )
        .await?;

        // 记录成功登录（审计失败不阻断登录流程）
        let actor = Actor {
            id: user.id,
            name: user.name.clone(),
            role: Some(identity.role.clone()),
        };
        let _ = self
            .audit_service
            .log_action_simple(&actor, AuditAction::UserLogin, Some("user"), Some(user.id), None)
            .await;

        let mut permissions: Vec<String> = identity.permissions.iter().cloned().collect();
        permissions.sort();

        Ok(LoginResponse {
            access_token: token_pair.access_token,
            refresh_token: token_pair.refresh_token,
            expires_in: token_pair.expires_in,
            user: UserResponse::from(user),
            role: identity.role,
            permissions,
        })
    }

    /// 刷新令牌
    pub async fn refresh_token(
        &self,
        req: RefreshTokenRequest,
        client_ip: &str,
    ) -> Result<TokenPair, AppError> {
        // 验证刷新令牌
        let _claims = self.jwt_service.validate_refresh_token(&req.refresh_token)?;

        // 检查令牌是否被撤销
        let auth_repo = AuthRepository::new(self.db.clone());
        let token_hash = AuthRepository::hash_token(&req.refresh_token);
        let refresh_token_record: RefreshToken = auth_repo
            .find_refresh_token_by_hash(&token_hash)
            .await?
            .ok_or(AppError::Unauthorized)?;

        if refresh_token_record.revoked_at.is_some() {
            return Err(AppError::Unauthorized);
        }

        if refresh_token_record.expires_at < chrono::Utc::now() {
            return Err(AppError::Unauthorized);
        }

        // 获取用户
        let user_repo = UserRepository::new(self.db.clone());
        let user: User = user_repo
            .find_by_id(&refresh_token_record.user_id)
            .await?
            .ok_or(AppError::Unauthorized)?;

        if user.is_suspended() {
            return Err(AppError::UserSuspended);
        }

        // 重新解析身份，令牌始终反映最新的角色/权限状态
        let identity = self.permission_service.resolve_identity(user.id).await?;

        let new_token_pair = self.jwt_service.generate_token_pair(&identity)?;

        // 撤销旧的刷新令牌并登记替换关系
        let _ = auth_repo
            .revoke_refresh_token(refresh_token_record.id)
            .await;

        self.store_refresh_token(
            &new_token_pair.refresh_token,
            user.id,
            client_ip,
            None,
            Some(refresh_token_record.id),
        )
        .await?;

        Ok(new_token_pair)
    }

    /// 登出（撤销刷新令牌；注册表不受影响）
    pub async fn logout(&self, refresh_token: &str, actor: &Actor) -> Result<(), AppError> {
        let auth_repo = AuthRepository::new(self.db.clone());
        let token_hash = AuthRepository::hash_token(refresh_token);

        auth_repo
            .revoke_refresh_token_by_hash(&token_hash, actor.id)
            .await?;

        let _ = self
            .audit_service
            .log_action_simple(actor, AuditAction::UserLogout, Some("user"), Some(actor.id), None)
            .await;

        Ok(())
    }

    /// 从所有设备登出
    pub async fn logout_all(&self, user_id: Uuid) -> Result<u64, AppError> {
        let auth_repo = AuthRepository::new(self.db.clone());
        auth_repo.revoke_all_refresh_tokens(user_id).await
    }

    /// 首次启动引导：用户表为空时创建 super_admin 管理员
    pub async fn ensure_bootstrap_admin(&self) -> Result<(), AppError> {
        let user_repo = UserRepository::new(self.db.clone());

        if user_repo.count().await? > 0 {
            return Ok(());
        }

        let role_repo = RoleRepository::new(self.db.clone());
        let role = role_repo
            .find_by_name("super_admin")
            .await?
            .ok_or_else(|| AppError::internal("super_admin role missing; run migrations first"))?;

        let hasher = PasswordHasher::new();
        let password_hash =
            hasher.hash(self.config.security.bootstrap_admin_password.expose_secret())?;

        let req = CreateUserRequest {
            name: "Administrator".to_string(),
            email: self.config.security.bootstrap_admin_email.clone(),
            password: String::new(), // 已散列，原文不再使用
            role_id: role.id,
        };
        let user = user_repo.create(&req, &password_hash).await?;

        tracing::info!(
            user_id = %user.id,
            email = %user.email,
            "Bootstrap administrator created; change the password after first login"
        );

        Ok(())
    }

    /// 存储刷新令牌哈希
    async fn store_refresh_token(
        &self,
        refresh_token: &str,
        user_id: Uuid,
        client_ip: &str,
        user_agent: Option<&str>,
        replaced_by: Option<Uuid>,
    ) -> Result<(), AppError> {
        let auth_repo = AuthRepository::new(self.db.clone());

        let record = RefreshToken {
            id: Uuid::new_v4(),
            token_hash: AuthRepository::hash_token(refresh_token),
            user_id,
            user_agent: user_agent.map(|s| s.to_string()),
            ip_address: Some(client_ip.to_string()),
            expires_at: chrono::Utc::now()
                + chrono::Duration::seconds(self.config.security.refresh_token_exp_secs as i64),
            revoked_at: None,
            replaced_by,
            created_at: chrono::Utc::now(),
        };

        auth_repo.store_refresh_token(&record).await
    }

    /// 记录登录失败（审计失败不阻断请求流程）
    async fn record_login_failure(&self, user: &User, reason: &str) {
        let actor = Actor {
            id: user.id,
            name: user.name.clone(),
            role: None,
        };

        let _ = self
            .audit_service
            .log_action(crate::services::audit_service::AuditLogParams {
                actor: &actor,
                action: AuditAction::UserLoginFailure,
                entity_type: Some("user"),
                entity_id: Some(user.id),
                entity_name: None,
                changes: None,
                metadata: Some(serde_json::json!({ "reason": reason })),
            })
            .await;
    }
}
