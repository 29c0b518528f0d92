// Shared test helpers: in-memory container runtime and host monitor

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use watchdog::error::{ErrorKind, ProbeError, RuntimeError};
use watchdog::models::{ContainerInfo, ContainerState, ContainerStats, HealthStatus, SystemInfo};
use watchdog::probe::HostMonitor;
use watchdog::runtime::{ContainerRuntime, Project, ServiceOp};

pub fn container(name: &str, service: &str, state: ContainerState) -> ContainerInfo {
    ContainerInfo {
        id: format!("{:0<12}", &name[..name.len().min(12)]),
        name: name.to_string(),
        service: service.to_string(),
        image: format!("{service}:latest"),
        status: String::new(),
        state,
        running_for: if state.is_running() { "5m".into() } else { String::new() },
        ports: vec![],
        health: HealthStatus::None,
        created_at: chrono::DateTime::default(),
    }
}

pub fn stats_for(name: &str, cpu: f64, mem: f64) -> ContainerStats {
    ContainerStats {
        id: name.to_string(),
        name: name.to_string(),
        cpu_percent: cpu,
        memory_percent: mem,
        memory_usage: "0.10GiB / 1.00GiB".into(),
        network_io: "1.0KB / 2.0KB".into(),
        block_io: "0B / 0B".into(),
    }
}

/// How `apply` behaves on each call.
#[derive(Debug, Clone, Copy)]
pub enum ApplyBehavior {
    Succeed,
    /// Fail with a recoverable error this many times, then succeed.
    FailTimes(u32),
    /// Always fail with a recoverable error.
    AlwaysFail,
    NotFound,
    /// Never return.
    Hang,
    Panic,
    /// Park until `release_apply` is called.
    WaitForRelease,
}

pub struct MockRuntime {
    pub containers: Vec<ContainerInfo>,
    pub games: Vec<ContainerInfo>,
    pub apply_behavior: Mutex<ApplyBehavior>,
    pub fail_list: AtomicBool,
    pub fail_games: AtomicBool,
    pub hang_list: AtomicBool,
    pub stats_fail_for: Mutex<HashSet<String>>,
    pub apply_calls: AtomicU32,
    pub list_calls: AtomicU32,
    pub stats_calls: AtomicU32,
    pub closed: AtomicBool,
    pub apply_entered: Notify,
    release: Notify,
}

impl MockRuntime {
    pub fn new(containers: Vec<ContainerInfo>) -> Self {
        Self {
            containers,
            games: vec![],
            apply_behavior: Mutex::new(ApplyBehavior::Succeed),
            fail_list: AtomicBool::new(false),
            fail_games: AtomicBool::new(false),
            hang_list: AtomicBool::new(false),
            stats_fail_for: Mutex::new(HashSet::new()),
            apply_calls: AtomicU32::new(0),
            list_calls: AtomicU32::new(0),
            stats_calls: AtomicU32::new(0),
            closed: AtomicBool::new(false),
            apply_entered: Notify::new(),
            release: Notify::new(),
        }
    }

    /// A project with a running minecraft server and a stopped valheim one.
    pub fn game_project() -> Self {
        let mc = container("games-minecraft-1", "minecraft", ContainerState::Running);
        let vh = container("games-valheim-1", "valheim", ContainerState::Exited);
        let proxy = container("games-proxy-1", "proxy", ContainerState::Running);
        let mut rt = Self::new(vec![mc.clone(), vh.clone(), proxy]);
        rt.games = vec![mc, vh];
        rt
    }

    pub fn with_apply(self, behavior: ApplyBehavior) -> Self {
        *self.apply_behavior.lock().unwrap() = behavior;
        self
    }

    pub fn fail_stats_for(&self, name: &str) {
        self.stats_fail_for.lock().unwrap().insert(name.to_string());
    }

    pub fn release_apply(&self) {
        self.release.notify_one();
    }

    pub fn apply_count(&self) -> u32 {
        self.apply_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn list_containers(&self, _project: &Project) -> Result<Vec<ContainerInfo>, RuntimeError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_list.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(RuntimeError::new(
                "list containers",
                ErrorKind::ConnectionFailed("daemon unreachable".into()),
            ));
        }
        Ok(self.containers.clone())
    }

    async fn list_game_containers(
        &self,
        _project: &Project,
    ) -> Result<Vec<ContainerInfo>, RuntimeError> {
        if self.fail_games.load(Ordering::SeqCst) {
            return Err(RuntimeError::new(
                "list game containers",
                ErrorKind::OperationTimeout,
            ));
        }
        Ok(self.games.clone())
    }

    async fn apply(
        &self,
        _project: &Project,
        service: &str,
        op: ServiceOp,
    ) -> Result<(), RuntimeError> {
        let n = self.apply_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let behavior = *self.apply_behavior.lock().unwrap();
        self.apply_entered.notify_one();
        match behavior {
            ApplyBehavior::Succeed => Ok(()),
            ApplyBehavior::FailTimes(k) if n > k => Ok(()),
            ApplyBehavior::FailTimes(_) | ApplyBehavior::AlwaysFail => Err(RuntimeError::service(
                op.as_str(),
                service,
                ErrorKind::OperationTimeout,
            )),
            ApplyBehavior::NotFound => Err(RuntimeError::service(
                op.as_str(),
                service,
                ErrorKind::ServiceNotFound(service.to_string()),
            )),
            ApplyBehavior::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
            ApplyBehavior::Panic => panic!("runtime exploded while applying {op}"),
            ApplyBehavior::WaitForRelease => {
                self.release.notified().await;
                Ok(())
            }
        }
    }

    async fn container_stats(&self, name: &str) -> Result<ContainerStats, RuntimeError> {
        self.stats_calls.fetch_add(1, Ordering::SeqCst);
        if self.stats_fail_for.lock().unwrap().contains(name) {
            return Err(RuntimeError::container(
                "container stats",
                name,
                ErrorKind::StatsUnavailable(name.to_string()),
            ));
        }
        Ok(stats_for(name, 10.0, 20.0))
    }

    async fn container_logs(
        &self,
        _project: &Project,
        service: &str,
        _lines: i64,
    ) -> Result<String, RuntimeError> {
        Ok(format!("[{service}] ready"))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Host monitor returning a fixed snapshot, an error, or nothing at all.
pub enum MockHost {
    Fixed(SystemInfo),
    Failing,
    Hanging,
}

#[async_trait]
impl HostMonitor for MockHost {
    async fn system_info(&self) -> Result<SystemInfo, ProbeError> {
        match self {
            MockHost::Fixed(info) => Ok(info.clone()),
            MockHost::Failing => Err(ProbeError::Poisoned),
            MockHost::Hanging => {
                std::future::pending::<()>().await;
                Ok(SystemInfo::default())
            }
        }
    }
}

pub fn busy_host() -> SystemInfo {
    let mut info = SystemInfo {
        cpu_usage_percent: 42.0,
        ..Default::default()
    };
    info.set_memory(6 << 30, 8 << 30);
    info.set_disk(50 << 30, 100 << 30);
    info
}

pub fn sleep_ms(ms: u64) -> tokio::time::Sleep {
    tokio::time::sleep(Duration::from_millis(ms))
}
