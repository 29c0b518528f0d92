// Model serialization and derived values

use watchdog::models::{
    ContainerInfo, ContainerState, DataSource, HealthStatus, MonitorData,
    SourceError, SystemInfo,
};

#[test]
fn test_container_info_serializes_camel_case() {
    let info = ContainerInfo {
        id: "0123456789ab".into(),
        name: "games-minecraft-1".into(),
        service: "minecraft".into(),
        image: "itzg/minecraft-server".into(),
        status: "Up 5 minutes".into(),
        state: ContainerState::Running,
        running_for: "5m".into(),
        ports: vec!["25565:25565/tcp".into()],
        health: HealthStatus::Healthy,
        created_at: chrono::DateTime::from_timestamp(1_714_550_000, 0).unwrap(),
    };
    let json = serde_json::to_value(&info).unwrap();
    assert_eq!(json["runningFor"], "5m");
    assert_eq!(json["state"], "running");
    assert_eq!(json["health"], "healthy");
    assert_eq!(json["createdAt"], "2024-05-01T07:53:20Z");

    let back: ContainerInfo = serde_json::from_value(json).unwrap();
    assert_eq!(back, info);
}

#[test]
fn test_unknown_state_deserializes_to_unknown() {
    let s: ContainerState = serde_json::from_str("\"removing\"").unwrap();
    assert_eq!(s, ContainerState::Unknown);
    assert_eq!(ContainerState::from_docker("Created"), ContainerState::Stopped);
    assert_eq!(ContainerState::from_docker("dead"), ContainerState::Exited);
    assert_eq!(HealthStatus::from_docker(""), HealthStatus::None);
}

#[test]
fn test_state_display_honours_width() {
    assert_eq!(format!("[{:<9}]", ContainerState::Running), "[running  ]");
    assert_eq!(format!("{}", HealthStatus::Starting), "starting");
}

#[test]
fn test_service_or_name_prefers_label() {
    let mut info = ContainerInfo {
        id: String::new(),
        name: "games_ark_1".into(),
        service: String::new(),
        image: String::new(),
        status: String::new(),
        state: ContainerState::Running,
        running_for: String::new(),
        ports: vec![],
        health: HealthStatus::None,
        created_at: Default::default(),
    };
    assert_eq!(info.service_or_name(), "ark");
    info.service = "ark-survival".into();
    assert_eq!(info.service_or_name(), "ark-survival");
}

#[test]
fn test_system_info_percentages_are_clamped() {
    let mut info = SystemInfo::default();
    info.set_memory(10 << 30, 8 << 30);
    assert_eq!(info.memory_used_percent, 100.0);
    assert_eq!(info.memory_used_gb, 8.0);

    info.set_disk(25 << 30, 100 << 30);
    assert_eq!(info.disk_used_percent, 75.0);
    assert_eq!(info.disk_free_gb, 25.0);

    info.set_disk(0, 0);
    assert_eq!(info.disk_used_percent, 0.0);
}

#[test]
fn test_monitor_data_reports_unavailable_sources_in_order() {
    let data = MonitorData {
        game_error: Some(SourceError::Canceled),
        stats_error: Some(SourceError::DeadlineExceeded(std::time::Duration::from_secs(60))),
        ..Default::default()
    };
    assert_eq!(data.unavailable(), vec![DataSource::Stats, DataSource::Games]);
    assert_eq!(
        data.error_for(DataSource::Stats).unwrap().to_string(),
        "deadline of 60s exceeded"
    );
    assert!(data.error_for(DataSource::System).is_none());
}
