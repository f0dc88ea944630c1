//! Token verification and role checks

use crate::{config::AuthConfig, error::AppError, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

pub const JWT_ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Clone)]
pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_ttl: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Subject (user ID)
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Single-role tokens issued by older auth services.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub exp: i64, // Expiration time
    pub iat: i64, // Issued at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

/// Caller identity attached to the request once the token checks out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub email: Option<String>,
    pub roles: Vec<String>,
}

impl UserContext {
    pub fn has_role(&self, required_role: &str) -> bool {
        self.roles.iter().any(|role| role.eq_ignore_ascii_case(required_role))
    }
}

impl From<Claims> for UserContext {
    fn from(claims: Claims) -> Self {
        let mut roles = claims.roles;
        if let Some(role) = claims.role {
            if !roles.contains(&role) {
                roles.push(role);
            }
        }

        UserContext {
            user_id: claims.sub,
            email: claims.email,
            roles,
        }
    }
}

impl AuthService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            access_token_ttl: Duration::seconds(config.access_token_ttl_seconds as i64),
        }
    }

    /// Issue an access token. Used by tooling and tests; the service itself only verifies.
    pub fn issue_token(&self, user_id: &str, email: Option<&str>, roles: Vec<String>) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            email: email.map(str::to_string),
            roles,
            role: None,
            exp: (now + self.access_token_ttl).timestamp(),
            iat: now.timestamp(),
            jti: Some(uuid::Uuid::new_v4().to_string()),
        };

        encode(&Header::new(JWT_ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("Failed to generate access token: {}", e)))
    }

    /// Validate and decode a token
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let validation = Validation::new(JWT_ALGORITHM);

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    AppError::authentication("Token has expired")
                }
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    AppError::authentication("Invalid token signature")
                }
                _ => AppError::authentication(format!("Token validation failed: {}", e)),
            })?;

        Ok(token_data.claims)
    }

    /// Extract user context from token
    pub fn extract_user_context(&self, token: &str) -> Result<UserContext> {
        Ok(self.validate_token(token)?.into())
    }

    /// Extract token from Authorization header
    pub fn extract_token_from_header<'a>(&self, auth_header: &'a str) -> Result<&'a str> {
        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::authentication("Invalid authorization header format"))?
            .trim();

        if token.is_empty() {
            return Err(AppError::authentication("Empty token"));
        }

        Ok(token)
    }
}

/// Roles known to the billing service
pub struct Roles;

impl Roles {
    pub const ADMIN: &'static str = "admin";
    pub const USER: &'static str = "user";
}
