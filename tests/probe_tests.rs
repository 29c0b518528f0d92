// Host probe against a fake /proc tree

use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;
use watchdog::probe::{HostMonitor, HostProbe, ProbeMode, ProbePaths};

const STAT: &str = "cpu  100 0 100 800 0 0 0 0 0 0\ncpu0 100 0 100 800 0 0 0 0 0 0\nintr 1\n";

// 8 GiB total, 2 GiB free, 1 GiB buffers, 1 GiB cache: 4 GiB used
const MEMINFO: &str = "MemTotal:       8388608 kB\n\
MemFree:        2097152 kB\n\
MemAvailable:   4194304 kB\n\
Buffers:        1048576 kB\n\
Cached:         1048576 kB\n";

fn fake_proc(dir: &Path) {
    std::fs::write(dir.join("stat"), STAT).unwrap();
    std::fs::write(dir.join("meminfo"), MEMINFO).unwrap();
}

fn containerized(paths: ProbePaths) -> HostProbe {
    HostProbe::with_mode(ProbeMode::Containerized, paths, Duration::from_millis(5))
}

#[tokio::test]
async fn containerized_probe_reads_host_mounts() {
    let host_proc = TempDir::new().unwrap();
    let host_root = TempDir::new().unwrap();
    fake_proc(host_proc.path());

    let probe = containerized(ProbePaths {
        host_proc: host_proc.path().to_path_buf(),
        host_root: host_root.path().to_path_buf(),
        local_proc: "/nonexistent/proc".into(),
        local_root: "/nonexistent".into(),
    });
    assert_eq!(probe.mode(), ProbeMode::Containerized);

    let info = probe.system_info().await.unwrap();
    assert_eq!(info.memory_total_gb, 8.0);
    assert_eq!(info.memory_used_gb, 4.0);
    assert_eq!(info.memory_used_percent, 50.0);
    // counters did not move between samples
    assert_eq!(info.cpu_usage_percent, 0.0);
    assert!(info.disk_total_gb > 0.0);
    assert!((0.0..=100.0).contains(&info.disk_used_percent));
}

#[tokio::test]
async fn missing_host_mount_falls_back_to_local_files() {
    let local_proc = TempDir::new().unwrap();
    let local_root = TempDir::new().unwrap();
    fake_proc(local_proc.path());

    let probe = containerized(ProbePaths {
        host_proc: "/nonexistent/host/proc".into(),
        host_root: "/nonexistent/host".into(),
        local_proc: local_proc.path().to_path_buf(),
        local_root: local_root.path().to_path_buf(),
    });

    let info = probe.system_info().await.unwrap();
    assert_eq!(info.memory_total_gb, 8.0);
    assert!(info.disk_total_gb > 0.0);
}

#[tokio::test]
async fn unreadable_sources_degrade_to_zero() {
    let probe = containerized(ProbePaths {
        host_proc: "/nonexistent/host/proc".into(),
        host_root: "/nonexistent/host".into(),
        local_proc: "/nonexistent/proc".into(),
        local_root: "/nonexistent".into(),
    });

    let info = probe.system_info().await.unwrap();
    assert_eq!(info, Default::default());
}

#[tokio::test]
async fn standalone_probe_reports_plausible_values() {
    let probe = HostProbe::with_mode(
        ProbeMode::Standalone,
        ProbePaths {
            host_proc: "/nonexistent/host/proc".into(),
            host_root: "/nonexistent/host".into(),
            local_proc: "/proc".into(),
            local_root: "/".into(),
        },
        Duration::from_millis(1),
    );

    let info = probe.system_info().await.unwrap();
    assert!((0.0..=100.0).contains(&info.cpu_usage_percent));
    assert!((0.0..=100.0).contains(&info.memory_used_percent));
    assert!(info.memory_used_gb <= info.memory_total_gb);
    assert!(info.disk_free_gb <= info.disk_total_gb);
}
