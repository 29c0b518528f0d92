// Host resource snapshot

use serde::{Deserialize, Serialize};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Host CPU, memory and root filesystem usage. Zero means "unknown", not "empty".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub cpu_usage_percent: f64,
    pub memory_used_gb: f64,
    pub memory_total_gb: f64,
    pub memory_used_percent: f64,
    pub disk_free_gb: f64,
    pub disk_total_gb: f64,
    pub disk_used_percent: f64,
}

impl SystemInfo {
    pub fn set_memory(&mut self, used_bytes: u64, total_bytes: u64) {
        let used = used_bytes.min(total_bytes);
        self.memory_total_gb = total_bytes as f64 / BYTES_PER_GB;
        self.memory_used_gb = used as f64 / BYTES_PER_GB;
        self.memory_used_percent = percent_of(used, total_bytes);
    }

    pub fn set_disk(&mut self, free_bytes: u64, total_bytes: u64) {
        let free = free_bytes.min(total_bytes);
        self.disk_total_gb = total_bytes as f64 / BYTES_PER_GB;
        self.disk_free_gb = free as f64 / BYTES_PER_GB;
        self.disk_used_percent = percent_of(total_bytes - free, total_bytes);
    }
}

fn percent_of(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 / whole as f64 * 100.0).clamp(0.0, 100.0)
}
