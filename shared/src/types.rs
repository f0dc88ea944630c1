//! Common types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Service health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub service: String,
    pub status: ServiceStatus,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub dependencies: Vec<DependencyStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub name: String,
    pub status: ServiceStatus,
    pub response_time_ms: Option<u64>,
    pub error: Option<String>,
}

impl HealthStatus {
    pub fn from_dependencies(service: &str, dependencies: Vec<DependencyStatus>) -> Self {
        let status = if dependencies
            .iter()
            .all(|dep| dep.status == ServiceStatus::Healthy)
        {
            ServiceStatus::Healthy
        } else {
            ServiceStatus::Unhealthy
        };

        Self {
            service: service.to_string(),
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            dependencies,
        }
    }
}
