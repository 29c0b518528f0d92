// Monitoring aggregator: fan out to the probe and the runtime under one
// deadline, keep each source's failure to itself.

mod alerts;
mod report;

pub use alerts::{Alert, AlertThresholds, Component, Metric, check_alerts};
pub use report::{Report, ReportRenderer, TextRenderer, assemble_report, summarize};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::models::{ContainerInfo, ContainerStats, MonitorData, SourceError};
use crate::probe::HostMonitor;
use crate::runtime::{ContainerRuntime, Project};

pub const MONITOR_DEADLINE: Duration = Duration::from_secs(60);

pub struct Aggregator {
    runtime: Arc<dyn ContainerRuntime>,
    host: Arc<dyn HostMonitor>,
    project: Project,
    deadline: Duration,
}

/// Outcome of the list-then-stats path; the two halves fail separately.
struct ContainerPath {
    containers: Vec<ContainerInfo>,
    container_error: Option<SourceError>,
    stats: Vec<ContainerStats>,
    stats_error: Option<SourceError>,
}

impl Aggregator {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        host: Arc<dyn HostMonitor>,
        project: Project,
    ) -> Self {
        Self {
            runtime,
            host,
            project,
            deadline: MONITOR_DEADLINE,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// One monitoring round. Always returns a snapshot: sources that failed,
    /// ran past the deadline or were canceled carry an error instead of data.
    #[instrument(skip_all, fields(project = %self.project))]
    pub async fn collect(&self, cancel: &CancellationToken) -> MonitorData {
        let deadline = Instant::now() + self.deadline;

        let system = self.within(deadline, cancel, self.host.system_info());
        let containers = self.container_path(deadline, cancel);
        let games = self.within(
            deadline,
            cancel,
            self.runtime.list_game_containers(&self.project),
        );

        let (system, containers, games) = tokio::join!(system, containers, games);

        let (system, system_error) = split(system);
        let (game_containers, game_error) = split(games);
        let data = MonitorData {
            system,
            system_error,
            containers: containers.containers,
            container_error: containers.container_error,
            stats: containers.stats,
            stats_error: containers.stats_error,
            game_containers: game_containers.unwrap_or_default(),
            game_error,
        };

        for source in data.unavailable() {
            if let Some(e) = data.error_for(source) {
                warn!(%source, error = %e, "monitoring source unavailable");
            }
        }
        data
    }

    async fn container_path(&self, deadline: Instant, cancel: &CancellationToken) -> ContainerPath {
        let containers = match self
            .within(deadline, cancel, self.runtime.list_containers(&self.project))
            .await
        {
            Ok(c) => c,
            Err(e) => {
                return ContainerPath {
                    containers: Vec::new(),
                    container_error: Some(e),
                    stats: Vec::new(),
                    stats_error: None,
                };
            }
        };

        let (stats, stats_error) = match self
            .within(
                deadline,
                cancel,
                self.runtime.all_container_stats(&self.project),
            )
            .await
        {
            Ok(s) => (s, None),
            Err(e) => (Vec::new(), Some(e)),
        };
        ContainerPath {
            containers,
            container_error: None,
            stats,
            stats_error,
        }
    }

    /// Races `fut` against the shared deadline and the caller's token.
    async fn within<T, E, F>(
        &self,
        deadline: Instant,
        cancel: &CancellationToken,
        fut: F,
    ) -> Result<T, SourceError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<SourceError>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SourceError::Canceled),
            r = tokio::time::timeout_at(deadline, fut) => match r {
                Ok(r) => r.map_err(Into::into),
                Err(_) => Err(SourceError::DeadlineExceeded(self.deadline)),
            },
        }
    }
}

fn split<T>(r: Result<T, SourceError>) -> (Option<T>, Option<SourceError>) {
    match r {
        Ok(v) => (Some(v), None),
        Err(e) => (None, Some(e)),
    }
}
