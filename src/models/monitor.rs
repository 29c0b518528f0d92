// Monitoring snapshot assembled from independently failing sources

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use super::{ContainerInfo, ContainerStats, SystemInfo};
use crate::error::{ProbeError, RuntimeError};

/// Why one data source is missing from a [`MonitorData`].
#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error("deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("monitoring request canceled")]
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    System,
    Containers,
    Stats,
    Games,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataSource::System => "system",
            DataSource::Containers => "containers",
            DataSource::Stats => "stats",
            DataSource::Games => "games",
        })
    }
}

/// One monitoring round. Each source has its own error slot; a failure in
/// one never blanks the others. `stats` is only attempted when `containers`
/// was fetched without error.
#[derive(Debug, Default)]
pub struct MonitorData {
    pub system: Option<SystemInfo>,
    pub system_error: Option<SourceError>,
    pub containers: Vec<ContainerInfo>,
    pub container_error: Option<SourceError>,
    pub stats: Vec<ContainerStats>,
    pub stats_error: Option<SourceError>,
    pub game_containers: Vec<ContainerInfo>,
    pub game_error: Option<SourceError>,
}

impl MonitorData {
    /// Sources that should be shown as "data unavailable".
    pub fn unavailable(&self) -> Vec<DataSource> {
        [
            (DataSource::System, self.system_error.is_some()),
            (DataSource::Containers, self.container_error.is_some()),
            (DataSource::Stats, self.stats_error.is_some()),
            (DataSource::Games, self.game_error.is_some()),
        ]
        .into_iter()
        .filter_map(|(source, failed)| failed.then_some(source))
        .collect()
    }

    pub fn error_for(&self, source: DataSource) -> Option<&SourceError> {
        match source {
            DataSource::System => self.system_error.as_ref(),
            DataSource::Containers => self.container_error.as_ref(),
            DataSource::Stats => self.stats_error.as_ref(),
            DataSource::Games => self.game_error.as_ref(),
        }
    }

    pub fn stats_by_name(&self) -> HashMap<&str, &ContainerStats> {
        self.stats.iter().map(|s| (s.name.as_str(), s)).collect()
    }

    pub fn running_containers(&self) -> usize {
        self.containers
            .iter()
            .filter(|c| c.state.is_running())
            .count()
    }
}

/// Reduced report used when the full one would not fit: headline
/// percentages and counts only.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSummary {
    pub cpu_usage_percent: Option<f64>,
    pub memory_used_percent: Option<f64>,
    pub disk_used_percent: Option<f64>,
    pub running_containers: Option<usize>,
    pub total_containers: Option<usize>,
    pub alert_count: usize,
    pub unavailable: Vec<DataSource>,
}
