// Container models

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalized container state; serializes to lowercase JSON (e.g. "running").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Running,
    Stopped,
    Exited,
    Restarting,
    Paused,
    #[serde(other)]
    Unknown,
}

impl ContainerState {
    /// Parse from a Docker state string (e.g. "running", "exited").
    pub fn from_docker(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "running" => ContainerState::Running,
            "created" | "stopped" => ContainerState::Stopped,
            "exited" | "dead" => ContainerState::Exited,
            "restarting" => ContainerState::Restarting,
            "paused" => ContainerState::Paused,
            _ => ContainerState::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContainerState::Running => "running",
            ContainerState::Stopped => "stopped",
            ContainerState::Exited => "exited",
            ContainerState::Restarting => "restarting",
            ContainerState::Paused => "paused",
            ContainerState::Unknown => "unknown",
        }
    }

    pub fn is_running(self) -> bool {
        self == ContainerState::Running
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Starting,
    #[serde(other)]
    None,
}

impl HealthStatus {
    pub fn from_docker(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "healthy" => HealthStatus::Healthy,
            "unhealthy" => HealthStatus::Unhealthy,
            "starting" => HealthStatus::Starting,
            _ => HealthStatus::None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Starting => "starting",
            HealthStatus::None => "none",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One container of the project, as seen at list time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub service: String,
    pub image: String,
    pub status: String,
    pub state: ContainerState,
    /// Human-readable uptime; empty unless running.
    #[serde(default)]
    pub running_for: String,
    #[serde(default)]
    pub ports: Vec<String>,
    pub health: HealthStatus,
    pub created_at: DateTime<Utc>,
}

impl ContainerInfo {
    /// Compose service label, or the service part of the container name.
    pub fn service_or_name(&self) -> &str {
        if self.service.is_empty() {
            crate::runtime::service_from_container_name(&self.name)
        } else {
            &self.service
        }
    }
}

/// Point-in-time resource usage derived from one runtime stats sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStats {
    pub id: String,
    pub name: String,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    /// `used / limit`
    pub memory_usage: String,
    /// `rx / tx`
    pub network_io: String,
    /// `read / write`
    pub block_io: String,
}
