use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::retry::{self, RetryConfig};
use crate::runtime::{DEFAULT_GAME_LABEL, Project, is_valid_service_name};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub docker: DockerConfig,
    pub monitoring: MonitoringConfig,
    pub retry: RetrySettings,
    pub lifecycle: LifecycleConfig,
    pub probe: ProbeConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Api,
    Cli,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    pub compose_path: PathBuf,
    /// Overrides the project name derived from the compose file location.
    pub project_name: Option<String>,
    pub backend: Backend,
    /// Label key marking a container as a game server.
    pub game_label: String,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            compose_path: PathBuf::from("docker-compose.yml"),
            project_name: None,
            backend: Backend::Api,
            game_label: DEFAULT_GAME_LABEL.to_string(),
        }
    }
}

impl DockerConfig {
    pub fn project(&self) -> Project {
        Project::resolve(&self.compose_path, self.project_name.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub deadline_secs: u64,
    /// Character ceiling for a rendered report before falling back to the summary.
    pub report_limit: usize,
    pub cpu_alert_percent: f64,
    pub memory_alert_percent: f64,
    pub disk_alert_percent: f64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            deadline_secs: 60,
            report_limit: 2000,
            cpu_alert_percent: 85.0,
            memory_alert_percent: 90.0,
            disk_alert_percent: 90.0,
        }
    }
}

impl MonitoringConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    #[default]
    Exponential,
    Linear,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub strategy: BackoffStrategy,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: retry::DEFAULT_MAX_RETRIES,
            base_delay_ms: retry::DEFAULT_RETRY_DELAY.as_millis() as u64,
            max_delay_ms: retry::MAX_RETRY_DELAY.as_millis() as u64,
            strategy: BackoffStrategy::Exponential,
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff: match self.strategy {
                BackoffStrategy::Exponential => retry::exponential_backoff,
                BackoffStrategy::Linear => retry::linear_backoff,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Budget for one background start/stop/restart, independent of the caller.
    pub timeout_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self { timeout_secs: 60 }
    }
}

impl LifecycleConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Where the host's /proc is bind-mounted when running in a container.
    pub host_proc: PathBuf,
    /// Where the host's root filesystem is bind-mounted.
    pub host_root: PathBuf,
    pub cpu_sample_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            host_proc: PathBuf::from("/host/proc"),
            host_root: PathBuf::from("/host"),
            cpu_sample_ms: 1000,
        }
    }
}

impl ProbeConfig {
    pub fn cpu_sample(&self) -> Duration {
        Duration::from_millis(self.cpu_sample_ms)
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("WATCHDOG_CONFIG").unwrap_or_else(|_| "watchdog.toml".into());
        Self::load_from_path(Path::new(&path))
    }

    /// A missing file means defaults; an unreadable or invalid one is an error.
    pub fn load_from_path(path: &Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(s) => Self::load_from_str(&s),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
            Err(e) => Err(anyhow::anyhow!("read config {}: {e}", path.display())),
        }
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.docker.compose_path.as_os_str().is_empty(),
            "docker.compose_path must be non-empty"
        );
        if let Some(name) = &self.docker.project_name {
            anyhow::ensure!(
                is_valid_service_name(name),
                "docker.project_name must contain only alphanumerics, '-' or '_', got {name:?}"
            );
        }
        anyhow::ensure!(
            !self.docker.game_label.trim().is_empty() && !self.docker.game_label.contains(','),
            "docker.game_label must be a single non-empty label key, got {:?}",
            self.docker.game_label
        );
        anyhow::ensure!(
            self.monitoring.deadline_secs > 0,
            "monitoring.deadline_secs must be > 0, got {}",
            self.monitoring.deadline_secs
        );
        anyhow::ensure!(
            self.monitoring.report_limit > 0,
            "monitoring.report_limit must be > 0, got {}",
            self.monitoring.report_limit
        );
        for (name, value) in [
            ("cpu_alert_percent", self.monitoring.cpu_alert_percent),
            ("memory_alert_percent", self.monitoring.memory_alert_percent),
            ("disk_alert_percent", self.monitoring.disk_alert_percent),
        ] {
            anyhow::ensure!(
                value > 0.0 && value <= 100.0,
                "monitoring.{name} must be in (0, 100], got {value}"
            );
        }
        anyhow::ensure!(
            self.retry.base_delay_ms > 0,
            "retry.base_delay_ms must be > 0, got {}",
            self.retry.base_delay_ms
        );
        anyhow::ensure!(
            self.retry.max_delay_ms >= self.retry.base_delay_ms,
            "retry.max_delay_ms must be >= retry.base_delay_ms, got {} < {}",
            self.retry.max_delay_ms,
            self.retry.base_delay_ms
        );
        anyhow::ensure!(
            self.lifecycle.timeout_secs > 0,
            "lifecycle.timeout_secs must be > 0, got {}",
            self.lifecycle.timeout_secs
        );
        anyhow::ensure!(
            self.probe.cpu_sample_ms > 0,
            "probe.cpu_sample_ms must be > 0, got {}",
            self.probe.cpu_sample_ms
        );
        Ok(())
    }
}
