// Turn cumulative Docker stats counters into percentages and human units.

use std::time::Duration;

use bollard::models::ContainerStatsResponse;

use crate::models::ContainerStats;

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const BYTE_UNITS: [char; 6] = ['K', 'M', 'G', 'T', 'P', 'E'];

/// `(Δcontainer / Δsystem) × cpus × 100`; zero when the system delta is not positive.
pub fn cpu_percent(cpu_delta: i64, system_delta: i64, online_cpus: u32) -> f64 {
    if system_delta <= 0 || online_cpus == 0 {
        return 0.0;
    }
    (cpu_delta as f64 / system_delta as f64) * online_cpus as f64 * 100.0
}

pub fn memory_percent(usage: u64, limit: u64) -> f64 {
    if limit == 0 {
        return 0.0;
    }
    usage as f64 / limit as f64 * 100.0
}

/// e.g. "0.25GiB / 0.50GiB"
pub fn format_memory_usage(usage: u64, limit: u64) -> String {
    format!(
        "{:.2}GiB / {:.2}GiB",
        usage as f64 / BYTES_PER_GIB,
        limit as f64 / BYTES_PER_GIB
    )
}

/// Binary-scaled byte count with one decimal: 1023 → "1023B", 1536 → "1.5KB".
pub fn format_bytes(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{bytes}B");
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT && exp < BYTE_UNITS.len() - 1 {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    format!("{:.1}{}B", bytes as f64 / div as f64, BYTE_UNITS[exp])
}

/// "45s", "3m12s", "5h7m", "2d4h".
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    match secs {
        s if s < 60 => format!("{s}s"),
        s if s < 3_600 => format!("{}m{}s", s / 60, s % 60),
        s if s < 86_400 => format!("{}h{}m", s / 3_600, (s / 60) % 60),
        s => format!("{}d{}h", s / 86_400, (s / 3_600) % 24),
    }
}

pub fn format_io_pair(a: u64, b: u64) -> String {
    format!("{} / {}", format_bytes(a), format_bytes(b))
}

/// Process a raw Docker stats response into our ContainerStats. `None` when
/// the CPU sections are missing (container not running).
pub(crate) fn process_statistics(
    s: &ContainerStatsResponse,
    id: &str,
    name: &str,
) -> Option<ContainerStats> {
    let cpu_stats = s.cpu_stats.as_ref()?;
    let precpu_stats = s.precpu_stats.as_ref()?;

    let cpu_usage = cpu_stats.cpu_usage.as_ref()?;
    let precpu_usage = precpu_stats.cpu_usage.as_ref();

    let cpu_delta = cpu_usage.total_usage.unwrap_or(0) as i64
        - precpu_usage.and_then(|u| u.total_usage).unwrap_or(0) as i64;
    let system_delta = cpu_stats.system_cpu_usage.unwrap_or(0) as i64
        - precpu_stats.system_cpu_usage.unwrap_or(0) as i64;
    let online_cpus = cpu_stats
        .online_cpus
        .filter(|n| *n > 0)
        .or_else(|| {
            cpu_usage
                .percpu_usage
                .as_ref()
                .map(|p| p.len() as u32)
                .filter(|n| *n > 0)
        })
        .unwrap_or(1);

    let mem_usage = s.memory_stats.as_ref().and_then(|m| m.usage).unwrap_or(0);
    let mem_limit = s.memory_stats.as_ref().and_then(|m| m.limit).unwrap_or(0);

    let (network_rx, network_tx) = s.networks.as_ref().map_or((0u64, 0u64), |n| {
        n.values().fold((0u64, 0u64), |(rx, tx), v| {
            (
                rx + v.rx_bytes.unwrap_or(0),
                tx + v.tx_bytes.unwrap_or(0),
            )
        })
    });

    let (block_read, block_write) = s
        .blkio_stats
        .as_ref()
        .and_then(|b| b.io_service_bytes_recursive.as_ref())
        .map_or((0u64, 0u64), |b| {
            let mut read = 0u64;
            let mut write = 0u64;
            for e in b {
                if e.op
                    .as_ref()
                    .is_some_and(|op| op.eq_ignore_ascii_case("read"))
                {
                    read += e.value.unwrap_or(0);
                } else if e
                    .op
                    .as_ref()
                    .is_some_and(|op| op.eq_ignore_ascii_case("write"))
                {
                    write += e.value.unwrap_or(0);
                }
            }
            (read, write)
        });

    Some(ContainerStats {
        id: id.to_string(),
        name: name.to_string(),
        cpu_percent: cpu_percent(cpu_delta, system_delta, online_cpus),
        memory_percent: memory_percent(mem_usage, mem_limit),
        memory_usage: format_memory_usage(mem_usage, mem_limit),
        network_io: format_io_pair(network_rx, network_tx),
        block_io: format_io_pair(block_read, block_write),
    })
}
