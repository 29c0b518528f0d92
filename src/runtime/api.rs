// Runtime backend talking to the Docker Engine API over the local socket via bollard

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::Docker;
use bollard::query_parameters::{
    InspectContainerOptions, ListContainersOptions, LogsOptions, RestartContainerOptions,
    StartContainerOptions, StatsOptions, StopContainerOptions,
};
use bollard::models::ContainerSummary;
use bytes::BytesMut;
use chrono::Utc;
use futures_util::StreamExt;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use super::logs::{clamp_log_lines, log_text};
use super::{
    ContainerRuntime, LABEL_COMPOSE_SERVICE, LIST_OPERATION_TIMEOUT, Project,
    QUERY_OPERATION_TIMEOUT, RawContainer, SERVICE_OPERATION_TIMEOUT, ServiceOp, bounded, short_id,
    stats, validate_service_name,
};
use crate::error::{ErrorKind, RuntimeError};
use crate::models::{ContainerInfo, ContainerStats};

pub struct DockerApiRuntime {
    docker: RwLock<Option<Docker>>,
    game_label: String,
}

impl DockerApiRuntime {
    pub fn connect(game_label: impl Into<String>) -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| RuntimeError::new("connect", ErrorKind::ConnectionFailed(e.to_string())))?;
        Ok(Self::with_client(docker, game_label))
    }

    pub fn with_client(docker: Docker, game_label: impl Into<String>) -> Self {
        Self {
            docker: RwLock::new(Some(docker)),
            game_label: game_label.into(),
        }
    }

    /// Round-trips a ping so an unreachable daemon is reported up front.
    pub async fn ping(&self) -> Result<(), RuntimeError> {
        let docker = self.client("ping").await?;
        bounded(QUERY_OPERATION_TIMEOUT, docker.ping())
            .await
            .map(|_| ())
            .map_err(|k| RuntimeError::new("ping", k))
    }

    async fn client(&self, operation: &'static str) -> Result<Docker, RuntimeError> {
        self.docker.read().await.clone().ok_or_else(|| {
            RuntimeError::new(
                operation,
                ErrorKind::ConnectionFailed("client closed".to_string()),
            )
        })
    }

    async fn list_filtered(
        &self,
        operation: &'static str,
        labels: Vec<String>,
    ) -> Result<Vec<ContainerInfo>, RuntimeError> {
        let docker = self.client(operation).await?;
        // one budget covers the list call and every inspect after it
        let out = bounded(LIST_OPERATION_TIMEOUT, self.list_and_inspect(&docker, labels))
            .await
            .map_err(|k| RuntimeError::new(operation, k))?;
        debug!(operation, count = out.len(), "listed containers");
        Ok(out)
    }

    async fn list_and_inspect(
        &self,
        docker: &Docker,
        labels: Vec<String>,
    ) -> Result<Vec<ContainerInfo>, ErrorKind> {
        let options = ListContainersOptions {
            all: true,
            filters: Some(HashMap::from([("label".to_string(), labels)])),
            ..Default::default()
        };
        let summaries = docker.list_containers(Some(options)).await?;

        let now = Utc::now();
        let mut out = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let mut raw = raw_from_summary(summary);
            self.fill_from_inspect(docker, &mut raw).await;
            out.push(raw.into_info(now));
        }
        Ok(out)
    }

    /// Start time and health only come from inspect. A failed inspect leaves
    /// them blank rather than failing the listing.
    async fn fill_from_inspect(&self, docker: &Docker, raw: &mut RawContainer) {
        let inspect = bounded(
            QUERY_OPERATION_TIMEOUT,
            docker.inspect_container(&raw.id, None::<InspectContainerOptions>),
        )
        .await;
        match inspect {
            Ok(details) => {
                if let Some(state) = details.state {
                    raw.started_at = state.started_at;
                    raw.health = state
                        .health
                        .and_then(|h| h.status)
                        .map(|s| s.to_string());
                }
            }
            Err(e) => debug!(container = %raw.name, error = %e, "inspect failed"),
        }
    }

    async fn service_container_ids(
        &self,
        docker: &Docker,
        operation: &'static str,
        project: &Project,
        service: &str,
    ) -> Result<Vec<String>, RuntimeError> {
        let options = ListContainersOptions {
            all: true,
            filters: Some(HashMap::from([(
                "label".to_string(),
                vec![
                    project.label_filter(),
                    format!("{LABEL_COMPOSE_SERVICE}={service}"),
                ],
            )])),
            ..Default::default()
        };
        let summaries = bounded(LIST_OPERATION_TIMEOUT, docker.list_containers(Some(options)))
            .await
            .map_err(|k| RuntimeError::service(operation, service, k))?;
        let ids: Vec<String> = summaries.into_iter().filter_map(|c| c.id).collect();
        if ids.is_empty() {
            return Err(RuntimeError::service(
                operation,
                service,
                ErrorKind::ServiceNotFound(service.to_string()),
            ));
        }
        Ok(ids)
    }
}

fn raw_from_summary(c: ContainerSummary) -> RawContainer {
    let id = c.id.unwrap_or_default();
    let name = c
        .names
        .and_then(|n| n.into_iter().next())
        .unwrap_or_else(|| id.clone());
    let ports = c
        .ports
        .unwrap_or_default()
        .into_iter()
        .map(|p| {
            let proto = p
                .typ
                .map(|t| t.to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "tcp".to_string());
            (p.public_port, p.private_port, proto)
        })
        .collect();
    RawContainer {
        id,
        name,
        labels: c.labels.unwrap_or_default(),
        image: c.image.unwrap_or_default(),
        status: c.status.unwrap_or_default(),
        state: c.state.map(|s| s.to_string()).unwrap_or_default(),
        started_at: None,
        health: None,
        ports,
        created: c.created.unwrap_or_default(),
    }
}

#[async_trait]
impl ContainerRuntime for DockerApiRuntime {
    #[instrument(skip(self, project), fields(project = %project))]
    async fn list_containers(&self, project: &Project) -> Result<Vec<ContainerInfo>, RuntimeError> {
        self.list_filtered("list containers", vec![project.label_filter()])
            .await
    }

    #[instrument(skip(self, project), fields(project = %project))]
    async fn list_game_containers(
        &self,
        project: &Project,
    ) -> Result<Vec<ContainerInfo>, RuntimeError> {
        self.list_filtered(
            "list game containers",
            vec![project.label_filter(), self.game_label.clone()],
        )
        .await
    }

    #[instrument(skip(self, project), fields(project = %project))]
    async fn apply(
        &self,
        project: &Project,
        service: &str,
        op: ServiceOp,
    ) -> Result<(), RuntimeError> {
        let operation = op.as_str();
        validate_service_name(operation, service)?;
        let docker = self.client(operation).await?;

        let work = async {
            let ids = self
                .service_container_ids(&docker, operation, project, service)
                .await?;
            for id in &ids {
                let result = match op {
                    ServiceOp::Start => {
                        docker
                            .start_container(id, None::<StartContainerOptions>)
                            .await
                    }
                    ServiceOp::Stop => {
                        docker
                            .stop_container(id, None::<StopContainerOptions>)
                            .await
                    }
                    ServiceOp::Restart => {
                        docker
                            .restart_container(id, None::<RestartContainerOptions>)
                            .await
                    }
                };
                result.map_err(|e| RuntimeError::container(operation, id.as_str(), e))?;
            }
            Ok::<usize, RuntimeError>(ids.len())
        };

        match tokio::time::timeout(SERVICE_OPERATION_TIMEOUT, work).await {
            Ok(Ok(count)) => {
                info!(service, containers = count, "service {operation} complete");
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(RuntimeError::service(
                operation,
                service,
                ErrorKind::OperationTimeout,
            )),
        }
    }

    #[instrument(skip(self))]
    async fn container_stats(&self, name: &str) -> Result<ContainerStats, RuntimeError> {
        let docker = self.client("stats").await?;
        let options = StatsOptions {
            stream: false,
            ..Default::default()
        };
        let first = async {
            let mut stream = std::pin::pin!(docker.stats(name, Some(options)));
            stream.next().await.transpose()
        };
        let sample = bounded(QUERY_OPERATION_TIMEOUT, first)
            .await
            .map_err(|k| RuntimeError::container("stats", name, k))?
            .ok_or_else(|| {
                RuntimeError::container("stats", name, ErrorKind::StatsUnavailable(name.to_string()))
            })?;

        let id = short_id(sample.id.as_deref().unwrap_or(name));
        let display = sample
            .name
            .as_deref()
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_else(|| name.to_string());
        stats::process_statistics(&sample, &id, &display).ok_or_else(|| {
            RuntimeError::container("stats", name, ErrorKind::StatsUnavailable(name.to_string()))
        })
    }

    #[instrument(skip(self, project), fields(project = %project))]
    async fn container_logs(
        &self,
        project: &Project,
        service: &str,
        lines: i64,
    ) -> Result<String, RuntimeError> {
        validate_service_name("logs", service)?;
        let docker = self.client("logs").await?;
        let ids = self
            .service_container_ids(&docker, "logs", project, service)
            .await?;
        let Some(id) = ids.first() else {
            return Err(RuntimeError::service(
                "logs",
                service,
                ErrorKind::ServiceNotFound(service.to_string()),
            ));
        };

        let options = LogsOptions {
            stdout: true,
            stderr: true,
            tail: clamp_log_lines(lines).to_string(),
            ..Default::default()
        };
        // bollard decodes the multiplexed stream, chunks carry bare payloads
        let collect = async {
            let mut stream = std::pin::pin!(docker.logs(id, Some(options)));
            let mut buf = BytesMut::new();
            while let Some(chunk) = stream.next().await {
                buf.extend_from_slice(&chunk?.into_bytes());
            }
            Ok::<BytesMut, bollard::errors::Error>(buf)
        };
        let raw = bounded(QUERY_OPERATION_TIMEOUT, collect)
            .await
            .map_err(|k| RuntimeError::service("logs", service, k))?;

        Ok(log_text(&raw))
    }

    async fn close(&self) {
        if self.docker.write().await.take().is_some() {
            debug!("docker api client closed");
        }
    }
}
