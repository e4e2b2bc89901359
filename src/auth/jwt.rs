//! JWT token generation and validation
//! Implements access token + refresh token pattern

use crate::{config::AppConfig, error::AppError, models::auth::Identity};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT claims
///
/// Access tokens carry the identity resolved at login time (role name and
/// permission set); permission checks against registries stay authoritative,
/// the claims are a snapshot for clients.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,

    /// Display name
    pub name: String,

    /// User email
    pub email: String,

    /// Token type (access or refresh)
    pub token_type: String,

    /// Role name at issue time
    pub role: String,

    /// Permission tags at issue time
    pub permissions: Vec<String>,

    /// Issued at
    pub iat: i64,

    /// Expiration
    pub exp: i64,

    /// JWT ID (unique token identifier)
    pub jti: String,
}

/// Token pair response
#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64, // seconds until access token expires
}

/// JWT service
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_exp_secs: u64,
    refresh_token_exp_secs: u64,
}

impl JwtService {
    /// Create JWT service from config
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let secret = config.security.jwt_secret.expose_secret();

        // Ensure secret is at least 32 bytes for HS256
        if secret.len() < 32 {
            return Err(AppError::Config(
                "JWT secret too short (min 32 chars)".to_string(),
            ));
        }

        let encoding_key = EncodingKey::from_secret(secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(secret.as_bytes());

        Ok(Self {
            encoding_key,
            decoding_key,
            access_token_exp_secs: config.security.access_token_exp_secs,
            refresh_token_exp_secs: config.security.refresh_token_exp_secs,
        })
    }

    /// Generate access token carrying the resolved identity
    pub fn generate_access_token(&self, identity: &Identity) -> Result<String, AppError> {
        let now = Utc::now();
        let expiration = now + Duration::seconds(self.access_token_exp_secs as i64);

        let mut permissions: Vec<String> = identity.permissions.iter().cloned().collect();
        permissions.sort();

        let claims = Claims {
            sub: identity.id.to_string(),
            name: identity.name.clone(),
            email: identity.email.clone(),
            token_type: "access".to_string(),
            role: identity.role.clone(),
            permissions,
            iat: now.timestamp(),
            exp: expiration.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| {
            tracing::error!("Failed to encode access token: {:?}", e);
            AppError::Internal(format!("Failed to encode access token: {}", e))
        })
    }

    /// Generate refresh token
    pub fn generate_refresh_token(&self, user_id: &Uuid, email: &str) -> Result<String, AppError> {
        let now = Utc::now();
        let expiration = now + Duration::seconds(self.refresh_token_exp_secs as i64);

        let claims = Claims {
            sub: user_id.to_string(),
            name: String::new(),
            email: email.to_string(),
            token_type: "refresh".to_string(),
            role: String::new(),
            permissions: vec![],
            iat: now.timestamp(),
            exp: expiration.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| {
            tracing::error!("Failed to encode refresh token: {:?}", e);
            AppError::Internal(format!("Failed to encode refresh token: {}", e))
        })
    }

    /// Generate token pair
    pub fn generate_token_pair(&self, identity: &Identity) -> Result<TokenPair, AppError> {
        let access_token = self.generate_access_token(identity)?;

        let refresh_token = self.generate_refresh_token(&identity.id, &identity.email)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.access_token_exp_secs,
        })
    }

    /// Validate and decode token
    pub fn validate_token(&self, token: &str) -> Result<Claims, AppError> {
        Ok(
            decode::<Claims>(token, &self.decoding_key, &Validation::new(Algorithm::HS256))
                .map_err(|e| {
                    tracing::debug!("Token validation failed: {:?}", e);
                    AppError::Unauthorized
                })?
                .claims,
        )
    }

    /// Validate access token specifically
    pub fn validate_access_token(&self, token: &str) -> Result<Claims, AppError> {
        let claims = self.validate_token(token)?;

        if claims.token_type != "access" {
            tracing::debug!(
                "Token type mismatch: expected 'access', got '{}'",
                claims.token_type
            );
            return Err(AppError::Unauthorized);
        }

        Ok(claims)
    }

    /// Validate refresh token specifically
    pub fn validate_refresh_token(&self, token: &str) -> Result<Claims, AppError> {
        let claims = self.validate_token(token)?;

        if claims.token_type != "refresh" {
            tracing::debug!(
                "Token type mismatch: expected 'refresh', got '{}'",
                claims.token_type
            );
            return Err(AppError::Unauthorized);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, DatabaseConfig, LoggingConfig, SecurityConfig, ServerConfig};
    use secrecy::Secret;

    // Mock config for testing
    fn test_config() -> AppConfig {
        AppConfig {
            server: ServerConfig {
                addr: "127.0.0.1:3000".to_string(),
                graceful_shutdown_timeout_secs: 30,
            },
            database: DatabaseConfig {
                url: Secret::new("postgresql://localhost/test".to_string()),
                max_connections: 10,
                min_connections: 1,
                acquire_timeout_secs: 30,
                idle_timeout_secs: 600,
                max_lifetime_secs: 1800,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "json".to_string(),
            },
            security: SecurityConfig {
                jwt_secret: Secret::new("test_secret_key_32_characters_long!".to_string()),
                access_token_exp_secs: 900,
                refresh_token_exp_secs: 604800,
                password_min_length: 8,
                password_require_uppercase: true,
                password_require_digit: true,
                password_require_special: false,
                bootstrap_admin_email: "admin@example.com".to_string(),
                bootstrap_admin_password: Secret::new("ChangeMe123!".to_string()),
                trust_proxy: true,
            },
        }
    }

    fn test_identity() -> Identity {
        Identity {
            id: Uuid::new_v4(),
            name: "Admin".to_string(),
            email: "admin@example.com".to_string(),
            role: "super_admin".to_string(),
            permissions: ["rma:complete".to_string()].into_iter().collect(),
        }
    }

    #[test]
    fn test_generate_and_validate_access_token() {
        let service = JwtService::from_config(&test_config()).unwrap();
        let identity = test_identity();

        let token = service.generate_access_token(&identity).unwrap();

        let claims = service.validate_access_token(&token).unwrap();
        assert_eq!(claims.sub, identity.id.to_string());
        assert_eq!(claims.name, "Admin");
        assert_eq!(claims.email, "admin@example.com");
        assert_eq!(claims.token_type, "access");
        assert_eq!(claims.role, "super_admin");
        assert!(claims.permissions.contains(&"rma:complete".to_string()));
    }

    #[test]
    fn test_generate_and_validate_refresh_token() {
        let service = JwtService::from_config(&test_config()).unwrap();
        let user_id = Uuid::new_v4();

        let token = service
            .generate_refresh_token(&user_id, "admin@example.com")
            .unwrap();

        let claims = service.validate_refresh_token(&token).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.token_type, "refresh");
        assert!(claims.permissions.is_empty());
    }

    #[test]
    fn test_token_type_validation() {
        let service = JwtService::from_config(&test_config()).unwrap();
        let identity = test_identity();

        let access_token = service.generate_access_token(&identity).unwrap();

        // Should fail: trying to validate access token as refresh token
        assert!(service.validate_refresh_token(&access_token).is_err());

        let refresh_token = service
            .generate_refresh_token(&identity.id, &identity.email)
            .unwrap();

        // Should fail: trying to validate refresh token as access token
        assert!(service.validate_access_token(&refresh_token).is_err());
    }

    #[test]
    fn test_invalid_token_fails() {
        let service = JwtService::from_config(&test_config()).unwrap();
        assert!(service.validate_access_token("invalid_token").is_err());
        assert!(service.validate_refresh_token("invalid_token").is_err());
    }
}
