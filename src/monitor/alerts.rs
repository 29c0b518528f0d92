// Threshold alerts over host metrics and per-container stats

use std::fmt;

use serde::Serialize;

use crate::config::MonitoringConfig;
use crate::models::{ContainerStats, SystemInfo};
use crate::runtime::service_from_container_name;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertThresholds {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            cpu_percent: 85.0,
            memory_percent: 90.0,
            disk_percent: 90.0,
        }
    }
}

impl From<&MonitoringConfig> for AlertThresholds {
    fn from(c: &MonitoringConfig) -> Self {
        Self {
            cpu_percent: c.cpu_alert_percent,
            memory_percent: c.memory_alert_percent,
            disk_percent: c.disk_alert_percent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Cpu,
    Memory,
    Disk,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Metric::Cpu => "CPU",
            Metric::Memory => "memory",
            Metric::Disk => "disk",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "name")]
pub enum Component {
    Host,
    Service(String),
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Host => f.write_str("host"),
            Component::Service(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub component: Component,
    pub metric: Metric,
    pub value: f64,
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: high {} usage ({:.1}%)",
            self.component, self.metric, self.value
        )
    }
}

/// Container alerts first, then host alerts. A value must exceed its
/// threshold; equal is fine.
pub fn check_alerts(
    system: Option<&SystemInfo>,
    stats: &[ContainerStats],
    thresholds: &AlertThresholds,
) -> Vec<Alert> {
    let mut alerts = Vec::new();

    for s in stats {
        let component = || Component::Service(service_from_container_name(&s.name).to_string());
        if s.cpu_percent > thresholds.cpu_percent {
            alerts.push(Alert {
                component: component(),
                metric: Metric::Cpu,
                value: s.cpu_percent,
            });
        }
        if s.memory_percent > thresholds.memory_percent {
            alerts.push(Alert {
                component: component(),
                metric: Metric::Memory,
                value: s.memory_percent,
            });
        }
    }

    if let Some(sys) = system {
        for (metric, value, limit) in [
            (Metric::Cpu, sys.cpu_usage_percent, thresholds.cpu_percent),
            (Metric::Memory, sys.memory_used_percent, thresholds.memory_percent),
            (Metric::Disk, sys.disk_used_percent, thresholds.disk_percent),
        ] {
            if value > limit {
                alerts.push(Alert {
                    component: Component::Host,
                    metric,
                    value,
                });
            }
        }
    }

    alerts
}
