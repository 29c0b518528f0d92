// Domain models shared by the runtime gateway, host probe and aggregator

mod container;
mod monitor;
mod system;

pub use container::{ContainerInfo, ContainerState, ContainerStats, HealthStatus};
pub use monitor::{DataSource, MonitorData, MonitorSummary, SourceError};
pub use system::SystemInfo;
