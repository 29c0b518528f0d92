// Host resource probe. Inside a container it reads the host's bind-mounted
// /proc and root filesystem; outside it asks sysinfo about the local machine.

mod procfs;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sysinfo::System;
use tracing::{debug, instrument};

use crate::config::ProbeConfig;
use crate::error::ProbeError;
use crate::models::SystemInfo;

const DOCKER_SENTINEL: &str = "/.dockerenv";
const SELF_CGROUP: &str = "/proc/self/cgroup";
const CONTAINER_CGROUP_MARKER: &str = "docker";

/// Source of host metrics for the monitoring aggregator.
#[async_trait]
pub trait HostMonitor: Send + Sync {
    async fn system_info(&self) -> Result<SystemInfo, ProbeError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMode {
    Standalone,
    Containerized,
}

/// Containerized when the sentinel file exists or our cgroup membership
/// names the container runtime.
pub fn detect_mode(sentinel: &Path, cgroup: &Path) -> ProbeMode {
    if sentinel.exists() {
        return ProbeMode::Containerized;
    }
    match std::fs::read_to_string(cgroup) {
        Ok(s) if s.contains(CONTAINER_CGROUP_MARKER) => ProbeMode::Containerized,
        _ => ProbeMode::Standalone,
    }
}

/// Filesystem locations consulted by the probe. Host paths win; local
/// paths are the fallback when a host mount is missing.
#[derive(Debug, Clone)]
pub struct ProbePaths {
    pub host_proc: PathBuf,
    pub host_root: PathBuf,
    pub local_proc: PathBuf,
    pub local_root: PathBuf,
}

impl ProbePaths {
    pub fn from_config(config: &ProbeConfig) -> Self {
        Self {
            host_proc: config.host_proc.clone(),
            host_root: config.host_root.clone(),
            local_proc: PathBuf::from("/proc"),
            local_root: PathBuf::from("/"),
        }
    }

    fn proc_file(&self, name: &str) -> [PathBuf; 2] {
        [self.host_proc.join(name), self.local_proc.join(name)]
    }

    fn disk_root(&self) -> &Path {
        if self.host_root.is_dir() {
            &self.host_root
        } else {
            &self.local_root
        }
    }
}

pub struct HostProbe {
    mode: ProbeMode,
    paths: ProbePaths,
    cpu_sample: Duration,
    sys: Arc<Mutex<System>>,
}

impl HostProbe {
    /// Detects the mode once; it never changes for the life of the probe.
    pub fn new(config: &ProbeConfig) -> Self {
        let mode = detect_mode(Path::new(DOCKER_SENTINEL), Path::new(SELF_CGROUP));
        debug!(?mode, "host probe mode detected");
        Self::with_mode(mode, ProbePaths::from_config(config), config.cpu_sample())
    }

    pub fn with_mode(mode: ProbeMode, paths: ProbePaths, cpu_sample: Duration) -> Self {
        Self {
            mode,
            paths,
            cpu_sample,
            sys: Arc::new(Mutex::new(System::new())),
        }
    }

    pub fn mode(&self) -> ProbeMode {
        self.mode
    }

    async fn host_view(&self) -> Result<SystemInfo, ProbeError> {
        let stat_paths = self.paths.proc_file("stat");

        let first = {
            let p = stat_paths.clone();
            tokio::task::spawn_blocking(move || {
                procfs::read_first(&p)
                    .as_deref()
                    .and_then(procfs::parse_cpu_times)
            })
            .await?
        };
        if first.is_some() {
            tokio::time::sleep(self.cpu_sample).await;
        }
        let paths = self.paths.clone();
        tokio::task::spawn_blocking(move || {
            let mut info = SystemInfo::default();
            let second = procfs::read_first(&stat_paths)
                .as_deref()
                .and_then(procfs::parse_cpu_times);
            if let (Some(a), Some(b)) = (first, second) {
                info.cpu_usage_percent = procfs::cpu_usage_between(a, b);
            }
            if let Some((used, total)) = procfs::read_first(&paths.proc_file("meminfo"))
                .as_deref()
                .and_then(procfs::parse_meminfo)
            {
                info.set_memory(used, total);
            }
            if let Some((free, total)) = procfs::disk_usage(paths.disk_root()) {
                info.set_disk(free, total);
            }
            info
        })
        .await
        .map_err(ProbeError::from)
    }

    async fn local_view(&self) -> Result<SystemInfo, ProbeError> {
        let sys = self.sys.clone();
        tokio::task::spawn_blocking(move || {
            sys.lock().map_err(|_| ProbeError::Poisoned)?.refresh_cpu_all();
            Ok::<(), ProbeError>(())
        })
        .await??;

        tokio::time::sleep(self.cpu_sample.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL)).await;

        let sys = self.sys.clone();
        let root = self.paths.local_root.clone();
        tokio::task::spawn_blocking(move || {
            let mut info = SystemInfo::default();
            {
                let mut sys = sys.lock().map_err(|_| ProbeError::Poisoned)?;
                sys.refresh_cpu_all();
                sys.refresh_memory();
                info.cpu_usage_percent = (sys.global_cpu_usage() as f64).clamp(0.0, 100.0);
                let total = sys.total_memory();
                info.set_memory(total.saturating_sub(sys.available_memory()), total);
            }
            if let Some((free, total)) = procfs::disk_usage(&root) {
                info.set_disk(free, total);
            }
            Ok::<SystemInfo, ProbeError>(info)
        })
        .await?
    }
}

#[async_trait]
impl HostMonitor for HostProbe {
    #[instrument(skip(self))]
    async fn system_info(&self) -> Result<SystemInfo, ProbeError> {
        debug!(mode = ?self.mode, "probing host");
        match self.mode {
            ProbeMode::Containerized => self.host_view().await,
            ProbeMode::Standalone => self.local_view().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_file_means_containerized() {
        let dir = tempfile::TempDir::new().unwrap();
        let sentinel = dir.path().join(".dockerenv");
        std::fs::write(&sentinel, "").unwrap();
        let mode = detect_mode(&sentinel, &dir.path().join("missing"));
        assert_eq!(mode, ProbeMode::Containerized);
    }

    #[test]
    fn cgroup_marker_means_containerized() {
        let dir = tempfile::TempDir::new().unwrap();
        let cgroup = dir.path().join("cgroup");
        std::fs::write(&cgroup, "0::/system.slice/docker-4f1c2d.scope\n").unwrap();
        assert_eq!(
            detect_mode(&dir.path().join("none"), &cgroup),
            ProbeMode::Containerized
        );
        std::fs::write(&cgroup, "0::/user.slice/user-1000.slice\n").unwrap();
        assert_eq!(
            detect_mode(&dir.path().join("none"), &cgroup),
            ProbeMode::Standalone
        );
    }
}
