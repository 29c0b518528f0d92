// Runtime backend that shells out to the docker CLI. Used where the engine
// socket is not mounted but the binary and its context are.

use std::collections::HashMap;
use std::ffi::OsString;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info, instrument};

use super::logs::{clamp_log_lines, log_text};
use super::{
    ContainerRuntime, LABEL_COMPOSE_SERVICE, LIST_OPERATION_TIMEOUT, Project,
    QUERY_OPERATION_TIMEOUT, RawContainer, SERVICE_OPERATION_TIMEOUT, ServiceOp, bounded, short_id,
    stats, validate_service_name,
};
use crate::error::{ErrorKind, RuntimeError};
use crate::models::{ContainerInfo, ContainerStats};

const DEFAULT_DOCKER_BIN: &str = "docker";

pub struct DockerCliRuntime {
    docker_bin: OsString,
    game_label: String,
    closed: AtomicBool,
}

/// One line of `docker ps --format '{{json .}}'`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PsLine {
    #[serde(rename = "ID")]
    id: String,
    names: String,
    #[serde(default)]
    image: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    labels: String,
    #[serde(default)]
    ports: String,
    #[serde(default)]
    created_at: String,
}

/// `docker inspect --format '{{json .State}}'`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    #[serde(default)]
    started_at: Option<String>,
    #[serde(default)]
    health: Option<InspectHealth>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectHealth {
    status: String,
}

/// One line of `docker stats --no-stream --format '{{json .}}'`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StatsLine {
    #[serde(rename = "ID", default)]
    id: String,
    name: String,
    #[serde(rename = "CPUPerc")]
    cpu_perc: String,
    mem_perc: String,
    mem_usage: String,
    #[serde(rename = "NetIO")]
    net_io: String,
    #[serde(rename = "BlockIO")]
    block_io: String,
}

impl DockerCliRuntime {
    pub fn new(game_label: impl Into<String>) -> Self {
        Self::with_binary(DEFAULT_DOCKER_BIN, game_label)
    }

    pub fn with_binary(docker_bin: impl Into<OsString>, game_label: impl Into<String>) -> Self {
        Self {
            docker_bin: docker_bin.into(),
            game_label: game_label.into(),
            closed: AtomicBool::new(false),
        }
    }

    /// Runs `docker <args>` and returns stdout. Stderr is folded into the error.
    async fn run(&self, args: &[&str], limit: Duration) -> Result<Output, ErrorKind> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ErrorKind::ConnectionFailed("client closed".to_string()));
        }
        let mut cmd = Command::new(&self.docker_bin);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = bounded(limit, cmd.output()).await.map_err(|e| match e {
            ErrorKind::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                ErrorKind::ConnectionFailed(format!(
                    "{} binary not found",
                    self.docker_bin.to_string_lossy()
                ))
            }
            other => other,
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(classify_failure(
                &format!("docker {}", args.join(" ")),
                &output.status.to_string(),
                stderr,
            ));
        }
        Ok(Output {
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    async fn list_filtered(
        &self,
        operation: &'static str,
        labels: &[String],
    ) -> Result<Vec<ContainerInfo>, RuntimeError> {
        // one budget covers `ps` and every inspect after it; a timeout drops
        // the in-flight child, which kill_on_drop reaps
        let out = bounded(LIST_OPERATION_TIMEOUT, self.list_and_inspect(labels))
            .await
            .map_err(|k| RuntimeError::new(operation, k))?;
        debug!(operation, count = out.len(), "listed containers");
        Ok(out)
    }

    async fn list_and_inspect(&self, labels: &[String]) -> Result<Vec<ContainerInfo>, ErrorKind> {
        let filters: Vec<String> = labels.iter().map(|l| format!("label={l}")).collect();
        let mut args = vec!["ps", "-a", "--no-trunc", "--format", "{{json .}}"];
        for f in &filters {
            args.push("--filter");
            args.push(f.as_str());
        }
        let output = self.run(&args, LIST_OPERATION_TIMEOUT).await?;

        let now = Utc::now();
        let mut out = Vec::new();
        for line in output.stdout_lines() {
            let ps: PsLine = serde_json::from_str(line)?;
            let mut raw = raw_from_ps(ps);
            self.fill_from_inspect(&mut raw).await;
            out.push(raw.into_info(now));
        }
        Ok(out)
    }

    async fn fill_from_inspect(&self, raw: &mut RawContainer) {
        let result = self
            .run(
                &["inspect", "--format", "{{json .State}}", raw.id.as_str()],
                QUERY_OPERATION_TIMEOUT,
            )
            .await
            .and_then(|o| {
                serde_json::from_slice::<InspectState>(&o.stdout).map_err(ErrorKind::from)
            });
        match result {
            Ok(state) => {
                raw.started_at = state.started_at;
                raw.health = state.health.map(|h| h.status);
            }
            Err(e) => debug!(container = %raw.name, error = %e, "inspect failed"),
        }
    }

    async fn service_container_ids(
        &self,
        operation: &'static str,
        project: &Project,
        service: &str,
    ) -> Result<Vec<String>, RuntimeError> {
        let project_filter = format!("label={}", project.label_filter());
        let service_filter = format!("label={LABEL_COMPOSE_SERVICE}={service}");
        let output = self
            .run(
                &[
                    "ps",
                    "-a",
                    "-q",
                    "--no-trunc",
                    "--filter",
                    project_filter.as_str(),
                    "--filter",
                    service_filter.as_str(),
                ],
                LIST_OPERATION_TIMEOUT,
            )
            .await
            .map_err(|k| RuntimeError::service(operation, service, k))?;

        let ids: Vec<String> = output.stdout_lines().map(str::to_string).collect();
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

struct Output {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl Output {
    fn stdout_lines(&self) -> impl Iterator<Item = &str> {
        std::str::from_utf8(&self.stdout)
            .unwrap_or_default()
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
    }
}

fn classify_failure(command: &str, status: &str, stderr: String) -> ErrorKind {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("no such container") || lower.contains("no such object") {
        ErrorKind::ContainerNotFound(stderr)
    } else if lower.contains("cannot connect to the docker daemon")
        || lower.contains("error during connect")
    {
        ErrorKind::ConnectionFailed(stderr)
    } else {
        ErrorKind::Command {
            command: command.to_string(),
            status: status.to_string(),
            stderr,
        }
    }
}

/// `a=b,c=d`. Values containing commas are not representable in this format.
fn parse_labels(s: &str) -> HashMap<String, String> {
    s.split(',')
        .filter_map(|kv| kv.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .collect()
}

/// `0.0.0.0:25565->25565/tcp, :::25565->25565/tcp, 25575/tcp`
fn parse_ports(s: &str) -> Vec<(Option<u16>, u16, String)> {
    s.split(", ")
        .filter(|p| !p.trim().is_empty())
        .filter_map(|p| {
            let (public, private) = match p.split_once("->") {
                Some((host, container)) => {
                    let port = host.rsplit(':').next()?;
                    (port.parse::<u16>().ok(), container)
                }
                None => (None, p),
            };
            let (port, proto) = private.split_once('/').unwrap_or((private, "tcp"));
            Some((public, port.trim().parse().ok()?, proto.trim().to_string()))
        })
        .collect()
}

/// `2024-05-01 10:00:00 +0000 UTC`
fn parse_created_at(s: &str) -> i64 {
    let head: Vec<&str> = s.split_whitespace().take(3).collect();
    DateTime::parse_from_str(&head.join(" "), "%Y-%m-%d %H:%M:%S %z")
        .map(|t| t.with_timezone(&Utc).timestamp())
        .unwrap_or_default()
}

fn parse_percent(s: &str) -> f64 {
    s.trim().trim_end_matches('%').parse().unwrap_or(0.0)
}

/// Byte count from the CLI's human units. `kB`/`MB`/`GB` are decimal and
/// `KiB`/`MiB`/`GiB` binary; anything unreadable counts as zero.
fn parse_size(s: &str) -> u64 {
    let s = s.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let Ok(value) = number.parse::<f64>() else {
        return 0;
    };
    let scale: f64 = match unit.trim() {
        "" | "B" => 1.0,
        "kB" | "KB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        "TB" => 1e12,
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "TiB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => return 0,
    };
    (value * scale).round() as u64
}

/// "used / total" columns as two byte counts.
fn parse_size_pair(s: &str) -> (u64, u64) {
    match s.split_once('/') {
        Some((a, b)) => (parse_size(a), parse_size(b)),
        None => (parse_size(s), 0),
    }
}

fn raw_from_ps(ps: PsLine) -> RawContainer {
    let name = ps.names.split(',').next().unwrap_or_default().to_string();
    RawContainer {
        id: ps.id,
        name,
        labels: parse_labels(&ps.labels),
        image: ps.image,
        status: ps.status,
        state: ps.state,
        started_at: None,
        health: None,
        ports: parse_ports(&ps.ports),
        created: parse_created_at(&ps.created_at),
    }
}

/// Re-renders the CLI's size columns so both backends print the same units.
fn stats_from_line(line: StatsLine) -> ContainerStats {
    let (mem_used, mem_limit) = parse_size_pair(&line.mem_usage);
    let (rx, tx) = parse_size_pair(&line.net_io);
    let (read, write) = parse_size_pair(&line.block_io);
    ContainerStats {
        id: short_id(&line.id),
        name: line.name,
        cpu_percent: parse_percent(&line.cpu_perc),
        memory_percent: parse_percent(&line.mem_perc),
        memory_usage: stats::format_memory_usage(mem_used, mem_limit),
        network_io: stats::format_io_pair(rx, tx),
        block_io: stats::format_io_pair(read, write),
    }
}

#[async_trait]
impl ContainerRuntime for DockerCliRuntime {
    #[instrument(skip(self, project), fields(project = %project))]
    async fn list_containers(&self, project: &Project) -> Result<Vec<ContainerInfo>, RuntimeError> {
        self.list_filtered("list containers", &[project.label_filter()])
            .await
    }

    #[instrument(skip(self, project), fields(project = %project))]
    async fn list_game_containers(
        &self,
        project: &Project,
    ) -> Result<Vec<ContainerInfo>, RuntimeError> {
        self.list_filtered(
            "list game containers",
            &[project.label_filter(), self.game_label.clone()],
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

        let work = async {
            let ids = self.service_container_ids(operation, project, service).await?;
            for id in &ids {
                self.run(&[operation, id.as_str()], SERVICE_OPERATION_TIMEOUT)
                    .await
                    .map_err(|k| RuntimeError::container(operation, id.as_str(), k))?;
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
        let output = self
            .run(
                &["stats", "--no-stream", "--format", "{{json .}}", name],
                QUERY_OPERATION_TIMEOUT,
            )
            .await
            .map_err(|k| RuntimeError::container("stats", name, k))?;

        let line = output.stdout_lines().next().ok_or_else(|| {
            RuntimeError::container("stats", name, ErrorKind::StatsUnavailable(name.to_string()))
        })?;
        let parsed: StatsLine =
            serde_json::from_str(line).map_err(|e| RuntimeError::container("stats", name, e))?;
        Ok(stats_from_line(parsed))
    }

    #[instrument(skip(self, project), fields(project = %project))]
    async fn container_logs(
        &self,
        project: &Project,
        service: &str,
        lines: i64,
    ) -> Result<String, RuntimeError> {
        validate_service_name("logs", service)?;
        let ids = self.service_container_ids("logs", project, service).await?;
        let Some(id) = ids.first() else {
            return Err(RuntimeError::service(
                "logs",
                service,
                ErrorKind::ServiceNotFound(service.to_string()),
            ));
        };

        let tail = clamp_log_lines(lines).to_string();
        let output = self
            .run(&["logs", "--tail", tail.as_str(), id.as_str()], QUERY_OPERATION_TIMEOUT)
            .await
            .map_err(|k| RuntimeError::service("logs", service, k))?;

        // stdout and stderr arrive on separate pipes; their relative order is lost.
        let mut text = output.stdout;
        if !output.stderr.trim_ascii().is_empty() {
            if !text.is_empty() && !text.ends_with(b"\n") {
                text.push(b'\n');
            }
            text.extend_from_slice(&output.stderr);
        }
        Ok(log_text(&text))
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("docker cli runtime closed");
        }
    }
}
