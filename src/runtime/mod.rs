// Container runtime gateway: one contract, two backends (Engine API and docker CLI).

mod api;
mod cli;
pub mod logs;
pub mod stats;

pub use api::DockerApiRuntime;
pub use cli::DockerCliRuntime;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{ErrorKind, RuntimeError};
use crate::models::{ContainerInfo, ContainerState, ContainerStats, HealthStatus};

pub const SERVICE_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);
pub const LIST_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);
pub const QUERY_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

pub const LABEL_COMPOSE_PROJECT: &str = "com.docker.compose.project";
pub const LABEL_COMPOSE_SERVICE: &str = "com.docker.compose.service";
pub const DEFAULT_GAME_LABEL: &str = "game.type";

const SHORT_ID_LEN: usize = 12;

/// The compose project whose containers are managed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    name: String,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// An explicit override wins; otherwise the project is named after the
    /// directory holding the compose file, as compose itself does.
    pub fn resolve(compose_path: &Path, name_override: Option<&str>) -> Self {
        if let Some(name) = name_override.filter(|n| !n.trim().is_empty()) {
            return Self::new(name.trim());
        }
        let dir = compose_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .or_else(|| std::env::current_dir().ok());
        let name = dir
            .as_deref()
            .and_then(|d| {
                d.canonicalize()
                    .ok()
                    .and_then(|c| c.file_name().map(|n| n.to_string_lossy().into_owned()))
                    .or_else(|| d.file_name().map(|n| n.to_string_lossy().into_owned()))
            })
            .unwrap_or_else(|| "default".to_string());
        Self::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn label_filter(&self) -> String {
        format!("{LABEL_COMPOSE_PROJECT}={}", self.name)
    }
}

impl fmt::Display for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Lifecycle operation applied to every container of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceOp {
    Start,
    Stop,
    Restart,
}

impl ServiceOp {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceOp::Start => "start",
            ServiceOp::Stop => "stop",
            ServiceOp::Restart => "restart",
        }
    }
}

impl fmt::Display for ServiceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `^[A-Za-z0-9_-]+$`
pub fn is_valid_service_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

pub fn validate_service_name(operation: &'static str, name: &str) -> Result<(), RuntimeError> {
    if is_valid_service_name(name) {
        Ok(())
    } else {
        Err(RuntimeError::service(
            operation,
            name,
            ErrorKind::InvalidServiceName(name.to_string()),
        ))
    }
}

/// Compose names containers `project_service_1` (or `project-service-1`);
/// recover the service part, or the whole name if it does not look like that.
pub fn service_from_container_name(name: &str) -> &str {
    let sep = if name.contains('_') { '_' } else { '-' };
    let mut parts = name.split(sep);
    match (parts.next(), parts.next()) {
        (Some(_), Some(service)) if !service.is_empty() => service,
        _ => name,
    }
}

/// The 12-character id prefix both backends report.
pub fn short_id(id: &str) -> String {
    id.chars().take(SHORT_ID_LEN).collect()
}

/// Runs `fut` under `limit`, turning expiry into [`ErrorKind::OperationTimeout`].
pub(crate) async fn bounded<T, E, F>(limit: Duration, fut: F) -> Result<T, ErrorKind>
where
    F: Future<Output = Result<T, E>>,
    E: Into<ErrorKind>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(ErrorKind::OperationTimeout),
    }
}

/// A container as reported by either backend, before normalisation.
#[derive(Debug, Clone, Default)]
pub(crate) struct RawContainer {
    pub id: String,
    pub name: String,
    pub labels: HashMap<String, String>,
    pub image: String,
    pub status: String,
    pub state: String,
    pub started_at: Option<String>,
    pub health: Option<String>,
    /// `(public, private, protocol)`
    pub ports: Vec<(Option<u16>, u16, String)>,
    pub created: i64,
}

impl RawContainer {
    pub fn into_info(self, now: DateTime<Utc>) -> ContainerInfo {
        let state = ContainerState::from_docker(&self.state);
        let running_for = match (state, self.started_at.as_deref()) {
            (ContainerState::Running, Some(started)) => DateTime::parse_from_rfc3339(started)
                .ok()
                .and_then(|t| (now - t.with_timezone(&Utc)).to_std().ok())
                .map(stats::format_duration)
                .unwrap_or_default(),
            _ => String::new(),
        };

        let mut ports: Vec<String> = self
            .ports
            .iter()
            .filter_map(|(public, private, proto)| match public {
                Some(p) if *p > 0 => Some(format!("{p}:{private}/{proto}")),
                _ => None,
            })
            .collect();
        ports.dedup();

        ContainerInfo {
            id: short_id(&self.id),
            name: self.name.trim_start_matches('/').to_string(),
            service: self
                .labels
                .get(LABEL_COMPOSE_SERVICE)
                .cloned()
                .unwrap_or_default(),
            image: self.image,
            status: self.status,
            state,
            running_for,
            ports,
            health: self
                .health
                .as_deref()
                .map_or(HealthStatus::None, HealthStatus::from_docker),
            created_at: DateTime::from_timestamp(self.created, 0).unwrap_or_default(),
        }
    }
}

/// Queries and mutates the containers of one compose project.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// All containers of the project, stopped ones included.
    async fn list_containers(&self, project: &Project) -> Result<Vec<ContainerInfo>, RuntimeError>;

    /// Containers of the project that also carry the game capability label.
    async fn list_game_containers(
        &self,
        project: &Project,
    ) -> Result<Vec<ContainerInfo>, RuntimeError>;

    /// Applies `op` to every container of `service`. Fails with
    /// `ServiceNotFound` when none match; stops at the first container that fails.
    async fn apply(
        &self,
        project: &Project,
        service: &str,
        op: ServiceOp,
    ) -> Result<(), RuntimeError>;

    /// One stats sample for the container called `name`.
    async fn container_stats(&self, name: &str) -> Result<ContainerStats, RuntimeError>;

    /// Tail of combined stdout/stderr of the service's first container.
    async fn container_logs(
        &self,
        project: &Project,
        service: &str,
        lines: i64,
    ) -> Result<String, RuntimeError>;

    /// Releases the client. Safe to call more than once.
    async fn close(&self);

    async fn start_service(&self, project: &Project, service: &str) -> Result<(), RuntimeError> {
        self.apply(project, service, ServiceOp::Start).await
    }

    async fn stop_service(&self, project: &Project, service: &str) -> Result<(), RuntimeError> {
        self.apply(project, service, ServiceOp::Stop).await
    }

    async fn restart_service(&self, project: &Project, service: &str) -> Result<(), RuntimeError> {
        self.apply(project, service, ServiceOp::Restart).await
    }

    /// Stats for every running container of the project. A container whose
    /// stats call fails is left out rather than failing the whole call.
    async fn all_container_stats(
        &self,
        project: &Project,
    ) -> Result<Vec<ContainerStats>, RuntimeError> {
        let containers = self.list_containers(project).await?;
        let mut out = Vec::with_capacity(containers.len());
        for c in containers.iter().filter(|c| c.state.is_running()) {
            match self.container_stats(&c.name).await {
                Ok(s) => out.push(s),
                Err(e) => {
                    tracing::debug!(container = %c.name, error = %e, "skipping container stats");
                }
            }
        }
        Ok(out)
    }
}
