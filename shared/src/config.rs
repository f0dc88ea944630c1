//! Configuration management for the billing service

use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
    pub max_lifetime_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_token_ttl_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(anyhow::anyhow!("unknown STORAGE_BACKEND '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: String,
    pub log_level: String,
    pub port: u16,
    pub frontend_url: Option<String>,
    pub storage: StorageBackend,
    pub max_request_size_kb: usize,
}

const DEV_JWT_SECRET: &str = "facturacion-dev-secret-change-me";

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(secret) if !secret.trim().is_empty() => secret,
            _ if environment == "production" => {
                return Err(anyhow::anyhow!("JWT_SECRET must be set in production"));
            }
            _ => DEV_JWT_SECRET.to_string(),
        };

        Ok(Config {
            database: DatabaseConfig {
                url: database_url_from_env(),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()?,
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()?,
                acquire_timeout_seconds: env::var("DATABASE_ACQUIRE_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()?,
                idle_timeout_seconds: env::var("DATABASE_IDLE_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()?,
                max_lifetime_seconds: env::var("DATABASE_MAX_LIFETIME_SECONDS")
                    .unwrap_or_else(|_| "1800".to_string())
                    .parse()?,
            },
            auth: AuthConfig {
                jwt_secret,
                access_token_ttl_seconds: env::var("JWT_ACCESS_TOKEN_TTL_SECONDS")
                    .unwrap_or_else(|_| "3600".to_string())
                    .parse()?,
            },
            app: AppConfig {
                environment,
                log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "4004".to_string())
                    .parse()?,
                frontend_url: env::var("FRONTEND_URL").ok().filter(|url| !url.trim().is_empty()),
                storage: env::var("STORAGE_BACKEND")
                    .unwrap_or_else(|_| "postgres".to_string())
                    .parse()?,
                max_request_size_kb: env::var("MAX_REQUEST_SIZE_KB")
                    .unwrap_or_else(|_| "1024".to_string())
                    .parse()?,
            },
        })
    }

    pub fn is_development(&self) -> bool {
        self.app.environment == "development"
    }
}

/// `DATABASE_URL` wins; otherwise the URL is assembled from the `DB_*` parts.
fn database_url_from_env() -> String {
    if let Ok(url) = env::var("DATABASE_URL") {
        return url;
    }

    let host = env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string());
    let port = env::var("DB_PORT").unwrap_or_else(|_| "5432".to_string());
    let database = env::var("DB_DATABASE").unwrap_or_else(|_| "facturacion".to_string());

    build_database_url(
        &host,
        &port,
        &database,
        env::var("DB_USERNAME").ok().as_deref(),
        env::var("DB_PASSWORD").ok().as_deref(),
    )
}

pub fn build_database_url(
    host: &str,
    port: &str,
    database: &str,
    username: Option<&str>,
    password: Option<&str>,
) -> String {
    let credentials = match (username, password) {
        (Some(user), Some(pass)) if !user.is_empty() => format!(
            "{}:{}@",
            urlencoding::encode(user),
            urlencoding::encode(pass)
        ),
        (Some(user), _) if !user.is_empty() => format!("{}@", urlencoding::encode(user)),
        _ => String::new(),
    };

    format!("postgresql://{}{}:{}/{}", credentials, host, port, database)
}
