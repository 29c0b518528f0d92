// Report assembly: full report when it fits, headline summary otherwise.

use std::fmt::Write as _;

use super::alerts::{Alert, AlertThresholds, check_alerts};
use crate::models::{DataSource, MonitorData, MonitorSummary};

/// Turns a monitoring snapshot into text for some output channel.
pub trait ReportRenderer {
    fn render(&self, data: &MonitorData, alerts: &[Alert]) -> String;
    fn render_summary(&self, summary: &MonitorSummary) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    Full(String),
    Summary(String),
}

impl Report {
    pub fn text(&self) -> &str {
        match self {
            Report::Full(s) | Report::Summary(s) => s,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Report::Full(s) | Report::Summary(s) => s,
        }
    }
}

pub fn summarize(data: &MonitorData, thresholds: &AlertThresholds) -> MonitorSummary {
    let system = data.system.as_ref();
    let containers_ok = data.container_error.is_none();
    MonitorSummary {
        cpu_usage_percent: system.map(|s| s.cpu_usage_percent),
        memory_used_percent: system.map(|s| s.memory_used_percent),
        disk_used_percent: system.map(|s| s.disk_used_percent),
        running_containers: containers_ok.then(|| data.running_containers()),
        total_containers: containers_ok.then_some(data.containers.len()),
        alert_count: check_alerts(system, &data.stats, thresholds).len(),
        unavailable: data.unavailable(),
    }
}

/// The full report, or the rendered summary when the full one is longer
/// than `limit` characters. The full report is never cut short.
pub fn assemble_report<R>(
    data: &MonitorData,
    thresholds: &AlertThresholds,
    renderer: &R,
    limit: usize,
) -> Report
where
    R: ReportRenderer + ?Sized,
{
    let alerts = check_alerts(data.system.as_ref(), &data.stats, thresholds);
    let full = renderer.render(data, &alerts);
    let len = full.chars().count();
    if len <= limit {
        return Report::Full(full);
    }
    tracing::debug!(len, limit, "report over limit, falling back to summary");
    Report::Summary(renderer.render_summary(&summarize(data, thresholds)))
}

/// Plain-text rendering for terminals and logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextRenderer;

const UNAVAILABLE: &str = "data unavailable";

impl ReportRenderer for TextRenderer {
    fn render(&self, data: &MonitorData, alerts: &[Alert]) -> String {
        let mut out = String::with_capacity(1024);
        out.push_str("== Host ==\n");
        match (&data.system, &data.system_error) {
            (Some(s), _) => {
                let _ = writeln!(
                    out,
                    "CPU {:.1}% | MEM {:.1}/{:.1} GB ({:.1}%) | DISK {:.1} GB free of {:.1} GB ({:.1}% used)",
                    s.cpu_usage_percent,
                    s.memory_used_gb,
                    s.memory_total_gb,
                    s.memory_used_percent,
                    s.disk_free_gb,
                    s.disk_total_gb,
                    s.disk_used_percent
                );
            }
            (None, Some(e)) => {
                let _ = writeln!(out, "{UNAVAILABLE}: {e}");
            }
            (None, None) => {
                let _ = writeln!(out, "{UNAVAILABLE}");
            }
        }

        out.push_str("\n== Containers ==\n");
        if let Some(e) = &data.container_error {
            let _ = writeln!(out, "{UNAVAILABLE}: {e}");
        } else if data.containers.is_empty() {
            out.push_str("no containers\n");
        } else {
            let stats = data.stats_by_name();
            for c in &data.containers {
                let usage = stats.get(c.name.as_str()).map_or_else(
                    || "-".to_string(),
                    |s| format!("cpu {:.1}% mem {:.1}%", s.cpu_percent, s.memory_percent),
                );
                let _ = writeln!(
                    out,
                    "{} [{}] health={} {} {} {}",
                    c.name,
                    c.state,
                    c.health,
                    usage,
                    if c.running_for.is_empty() { "-" } else { c.running_for.as_str() },
                    c.ports.join(",")
                );
            }
            if let Some(e) = &data.stats_error {
                let _ = writeln!(out, "stats {UNAVAILABLE}: {e}");
            }
        }

        out.push_str("\n== Game servers ==\n");
        if let Some(e) = &data.game_error {
            let _ = writeln!(out, "{UNAVAILABLE}: {e}");
        } else if data.game_containers.is_empty() {
            out.push_str("no game servers\n");
        } else {
            for g in &data.game_containers {
                let _ = writeln!(out, "{} ({})", g.service_or_name(), g.state);
            }
        }

        out.push_str("\n== Alerts ==\n");
        if alerts.is_empty() {
            out.push_str("none\n");
        } else {
            for a in alerts {
                let _ = writeln!(out, "! {a}");
            }
        }
        out
    }

    fn render_summary(&self, s: &MonitorSummary) -> String {
        let mut out = String::from("Monitoring summary (full report too long)\n");
        match (s.cpu_usage_percent, s.memory_used_percent, s.disk_used_percent) {
            (Some(cpu), Some(mem), Some(disk)) => {
                let _ = writeln!(out, "Host: CPU {cpu:.1}% | MEM {mem:.1}% | DISK {disk:.1}%");
            }
            _ => {
                let _ = writeln!(out, "Host: {UNAVAILABLE}");
            }
        }
        match (s.running_containers, s.total_containers) {
            (Some(running), Some(total)) => {
                let _ = writeln!(out, "Containers: {running} running / {total} total");
            }
            _ => {
                let _ = writeln!(out, "Containers: {UNAVAILABLE}");
            }
        }
        if s.alert_count > 0 {
            let _ = writeln!(out, "Alerts: {}", s.alert_count);
        }
        let missing: Vec<String> = s
            .unavailable
            .iter()
            .filter(|d| !matches!(d, DataSource::System | DataSource::Containers))
            .map(ToString::to_string)
            .collect();
        if !missing.is_empty() {
            let _ = writeln!(out, "Unavailable: {}", missing.join(", "));
        }
        out
    }
}
