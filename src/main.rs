use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;
use watchdog::config::{AppConfig, Backend};
use watchdog::guard::ServiceLocks;
use watchdog::lifecycle::LifecycleRunner;
use watchdog::models::{ContainerInfo, ContainerStats, SystemInfo};
use watchdog::monitor::{
    Aggregator, AlertThresholds, Report, TextRenderer, assemble_report, summarize,
};
use watchdog::probe::{HostMonitor, HostProbe};
use watchdog::retry::with_retry;
use watchdog::runtime::logs::DEFAULT_LOG_LINES;
use watchdog::runtime::{
    ContainerRuntime, DockerApiRuntime, DockerCliRuntime, Project, ServiceOp,
};

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

/// Game server watchdog: inspect and operate the containers of a compose project.
#[derive(Parser, Debug)]
#[command(name = "watchdog", version)]
struct Cli {
    /// Path of the TOML configuration file.
    #[arg(long, env = "WATCHDOG_CONFIG", default_value = "watchdog.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List all containers of the project.
    Ps,
    /// List game server containers.
    Games,
    /// Resource usage of one container, or of every running one.
    Stats { name: Option<String> },
    /// Tail the logs of a service.
    Logs {
        service: String,
        #[arg(short = 'n', long, default_value_t = i64::from(DEFAULT_LOG_LINES))]
        lines: i64,
    },
    Start { service: String },
    Stop { service: String },
    Restart { service: String },
    /// Full monitoring report (summary when it is too long).
    Monitor {
        #[arg(long)]
        json: bool,
    },
    /// Host CPU, memory and disk usage.
    Host {
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load_from_path(&cli.config)?;
    let project = config.docker.project();
    tracing::debug!(project = %project, backend = ?config.docker.backend, "configuration loaded");

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received shutdown signal");
                cancel.cancel();
            }
        });
    }

    let runtime: Arc<dyn ContainerRuntime> = match config.docker.backend {
        Backend::Api => Arc::new(DockerApiRuntime::connect(&config.docker.game_label)?),
        Backend::Cli => Arc::new(DockerCliRuntime::new(&config.docker.game_label)),
    };
    let result = dispatch(cli.command, &config, &project, runtime.clone(), cancel).await;
    runtime.close().await;
    result
}

async fn dispatch(
    command: Command,
    config: &AppConfig,
    project: &Project,
    runtime: Arc<dyn ContainerRuntime>,
    cancel: CancellationToken,
) -> Result<()> {
    let retry = config.retry.to_retry_config();
    // one budget per command, shared by all attempts and backoff waits
    let deadline = Instant::now() + config.monitoring.deadline();
    match command {
        Command::Ps => {
            let containers =
                with_retry(deadline, &retry, || runtime.list_containers(project)).await?;
            print_containers(&containers);
        }
        Command::Games => {
            let games =
                with_retry(deadline, &retry, || runtime.list_game_containers(project)).await?;
            print_containers(&games);
        }
        Command::Stats { name } => {
            let stats = match name {
                Some(name) => {
                    vec![with_retry(deadline, &retry, || runtime.container_stats(&name)).await?]
                }
                None => {
                    with_retry(deadline, &retry, || runtime.all_container_stats(project)).await?
                }
            };
            print_stats(&stats);
        }
        Command::Logs { service, lines } => {
            let text = with_retry(deadline, &retry, || {
                runtime.container_logs(project, &service, lines)
            })
            .await?;
            println!("{text}");
        }
        Command::Start { service } => {
            lifecycle(config, project, runtime, cancel, &service, ServiceOp::Start).await?
        }
        Command::Stop { service } => {
            lifecycle(config, project, runtime, cancel, &service, ServiceOp::Stop).await?
        }
        Command::Restart { service } => {
            lifecycle(config, project, runtime, cancel, &service, ServiceOp::Restart).await?
        }
        Command::Monitor { json } => {
            let host: Arc<dyn HostMonitor> = Arc::new(HostProbe::new(&config.probe));
            let aggregator = Aggregator::new(runtime, host, project.clone())
                .with_deadline(config.monitoring.deadline());
            let data = aggregator.collect(&cancel).await;
            let thresholds = AlertThresholds::from(&config.monitoring);
            if json {
                println!("{}", serde_json::to_string_pretty(&summarize(&data, &thresholds))?);
            } else {
                let report = assemble_report(
                    &data,
                    &thresholds,
                    &TextRenderer,
                    config.monitoring.report_limit,
                );
                if let Report::Summary(_) = report {
                    tracing::info!(
                        limit = config.monitoring.report_limit,
                        "report too long, printing summary"
                    );
                }
                print!("{}", report.into_text());
            }
        }
        Command::Host { json } => {
            let info = HostProbe::new(&config.probe).system_info().await?;
            print_host(&info, json)?;
        }
    }
    Ok(())
}

/// The guard is per process: it keeps concurrent operations inside this
/// invocation apart, not separate `watchdog` processes.
async fn lifecycle(
    config: &AppConfig,
    project: &Project,
    runtime: Arc<dyn ContainerRuntime>,
    cancel: CancellationToken,
    service: &str,
    op: ServiceOp,
) -> Result<()> {
    let runner = LifecycleRunner::new(runtime, Arc::new(ServiceLocks::new()), project.clone())
        .with_retry(config.retry.to_retry_config())
        .with_timeout(config.lifecycle.timeout())
        .with_parent(cancel);
    let outcome = runner.run(service, op).await?;
    anyhow::ensure!(outcome.is_success(), "{op} {service}: {outcome}");
    println!("{op} {service}: {outcome}");
    Ok(())
}

fn print_containers(containers: &[ContainerInfo]) {
    if containers.is_empty() {
        println!("No containers found.");
        return;
    }
    println!(
        "{:<14} {:<28} {:<16} {:<11} {:<10} {:<10} PORTS",
        "ID", "NAME", "SERVICE", "STATE", "HEALTH", "UPTIME"
    );
    for c in containers {
        println!(
            "{:<14} {:<28} {:<16} {:<11} {:<10} {:<10} {}",
            c.id,
            c.name,
            c.service,
            c.state,
            c.health,
            if c.running_for.is_empty() { "-" } else { c.running_for.as_str() },
            c.ports.join(", ")
        );
    }
}

fn print_stats(stats: &[ContainerStats]) {
    if stats.is_empty() {
        println!("No running containers.");
        return;
    }
    println!(
        "{:<28} {:>7} {:>7} {:<24} {:<22} BLOCK I/O",
        "NAME", "CPU %", "MEM %", "MEM USAGE", "NET I/O"
    );
    for s in stats {
        println!(
            "{:<28} {:>6.2}% {:>6.2}% {:<24} {:<22} {}",
            s.name, s.cpu_percent, s.memory_percent, s.memory_usage, s.network_io, s.block_io
        );
    }
}

fn print_host(info: &SystemInfo, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(info)?);
        return Ok(());
    }
    println!("CPU    {:>5.1}%", info.cpu_usage_percent);
    println!(
        "Memory {:>5.1}%  {:.1} / {:.1} GB",
        info.memory_used_percent, info.memory_used_gb, info.memory_total_gb
    );
    println!(
        "Disk   {:>5.1}%  {:.1} GB free of {:.1} GB",
        info.disk_used_percent, info.disk_free_gb, info.disk_total_gb
    );
    Ok(())
}
