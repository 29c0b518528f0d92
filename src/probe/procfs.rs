// /proc counters and filesystem statistics, parsed leniently.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct CpuTimes {
    pub total: u64,
    pub idle: u64,
}

/// Aggregate `cpu ` line of /proc/stat. Unparseable columns count as zero.
pub(super) fn parse_cpu_times(stat: &str) -> Option<CpuTimes> {
    let line = stat.lines().find(|l| l.starts_with("cpu "))?;
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 5 {
        return None;
    }
    let total = fields[1..]
        .iter()
        .filter_map(|f| f.parse::<u64>().ok())
        .sum();
    let idle = fields[4].parse().unwrap_or(0);
    Some(CpuTimes { total, idle })
}

/// `100 × (1 − Δidle / Δtotal)`, zero when no ticks elapsed.
pub(super) fn cpu_usage_between(first: CpuTimes, second: CpuTimes) -> f64 {
    let total = second.total.saturating_sub(first.total);
    let idle = second.idle.saturating_sub(first.idle);
    if total == 0 {
        return 0.0;
    }
    (100.0 * (1.0 - idle as f64 / total as f64)).clamp(0.0, 100.0)
}

/// `(used_bytes, total_bytes)` where used excludes free, buffers and page cache.
pub(super) fn parse_meminfo(meminfo: &str) -> Option<(u64, u64)> {
    let mut total_kb = 0u64;
    let mut free_kb = 0u64;
    let mut buffers_kb = 0u64;
    let mut cached_kb = 0u64;
    for line in meminfo.lines() {
        let mut fields = line.split_whitespace();
        let (Some(key), Some(value)) = (fields.next(), fields.next()) else {
            continue;
        };
        let value = value.parse().unwrap_or(0);
        match key {
            "MemTotal:" => total_kb = value,
            "MemFree:" => free_kb = value,
            "Buffers:" => buffers_kb = value,
            "Cached:" => cached_kb = value,
            _ => {}
        }
    }
    if total_kb == 0 {
        return None;
    }
    let used_kb = total_kb.saturating_sub(free_kb + buffers_kb + cached_kb);
    Some((used_kb * 1024, total_kb * 1024))
}

/// `(free_bytes, total_bytes)` of the filesystem holding `path`. Free is
/// what an unprivileged user can still allocate.
pub(super) fn disk_usage(path: &Path) -> Option<(u64, u64)> {
    let stats = nix::sys::statvfs::statvfs(path)
        .inspect_err(|e| tracing::debug!(path = %path.display(), error = %e, "statvfs failed"))
        .ok()?;
    let unit = match stats.fragment_size() as u64 {
        0 => stats.block_size() as u64,
        n => n,
    };
    let total = unit.saturating_mul(stats.blocks() as u64);
    let free = unit.saturating_mul(stats.blocks_available() as u64);
    Some((free, total))
}

/// Contents of the first readable candidate.
pub(super) fn read_first(candidates: &[PathBuf]) -> Option<String> {
    candidates.iter().find_map(|p| match std::fs::read_to_string(p) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::trace!(path = %p.display(), error = %e, "unreadable, trying next");
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT: &str = "cpu  4705 356 584 3699 23 23 0 0 0 0\ncpu0 1393280 32966 572056 13343292 6130 0 17875 0 0 0\nintr 114930548\n";

    #[test]
    fn parses_aggregate_cpu_line_only() {
        let t = parse_cpu_times(STAT).unwrap();
        assert_eq!(t.total, 4705 + 356 + 584 + 3699 + 23 + 23);
        assert_eq!(t.idle, 3699);
    }

    #[test]
    fn short_cpu_line_is_rejected() {
        assert!(parse_cpu_times("cpu  1 2 3\n").is_none());
        assert!(parse_cpu_times("intr 5\n").is_none());
    }

    #[test]
    fn usage_between_samples() {
        let a = CpuTimes { total: 1000, idle: 800 };
        let b = CpuTimes { total: 1100, idle: 850 };
        assert!((cpu_usage_between(a, b) - 50.0).abs() < 1e-9);
        assert_eq!(cpu_usage_between(a, a), 0.0);
        // counter reset must not produce nonsense
        assert_eq!(cpu_usage_between(b, a), 0.0);
    }

    #[test]
    fn meminfo_used_excludes_cache() {
        let m = "MemTotal:       16000000 kB\nMemFree:         4000000 kB\nMemAvailable:   9000000 kB\nBuffers:          500000 kB\nCached:          3500000 kB\n";
        let (used, total) = parse_meminfo(m).unwrap();
        assert_eq!(total, 16_000_000 * 1024);
        assert_eq!(used, 8_000_000 * 1024);
    }

    #[test]
    fn meminfo_without_total_is_unknown() {
        assert!(parse_meminfo("MemFree: 10 kB\n").is_none());
        assert!(parse_meminfo("garbage").is_none());
    }

    #[test]
    fn meminfo_never_underflows() {
        let m = "MemTotal: 100 kB\nMemFree: 80 kB\nCached: 80 kB\n";
        assert_eq!(parse_meminfo(m), Some((0, 100 * 1024)));
    }

    #[test]
    fn disk_usage_of_tempdir() {
        let dir = tempfile::TempDir::new().unwrap();
        let (free, total) = disk_usage(dir.path()).unwrap();
        assert!(total > 0);
        assert!(free <= total);
        assert!(disk_usage(Path::new("/definitely/not/here")).is_none());
    }

    #[test]
    fn read_first_falls_through_missing_paths() {
        let dir = tempfile::TempDir::new().unwrap();
        let present = dir.path().join("stat");
        std::fs::write(&present, "cpu  1 1 1 1\n").unwrap();
        let got = read_first(&[dir.path().join("missing"), present]);
        assert_eq!(got.as_deref(), Some("cpu  1 1 1 1\n"));
        assert!(read_first(&[dir.path().join("nope")]).is_none());
    }
}
