//! Configuration loading tests

use std::collections::HashMap;
use std::fs;

use fleet_core::config::{ConfigManager, ConfigurationError, FleetConfig};

#[test]
fn test_files_and_overrides_layer_over_defaults() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("fleet.toml"),
        "[scheduler]\nmax_concurrency = 16\n\n[execution]\nproxy_timeout_secs = 120\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("fleet.production.toml"),
        "[scheduler]\nmaxsize_pending = 500\n\n[logging]\njson = true\n",
    )
    .unwrap();

    let overrides = HashMap::from([(
        "FLEET__EXECUTION__FORCE_ALL".to_string(),
        "true".to_string(),
    )]);
    let manager =
        ConfigManager::load_with_overrides(Some(dir.path().to_path_buf()), "production", Some(overrides))
            .unwrap();
    let config = manager.config();

    assert_eq!(config.scheduler.max_concurrency, 16);
    assert_eq!(config.scheduler.maxsize_pending, Some(500));
    assert_eq!(config.execution.proxy_timeout_secs, 120);
    assert!(config.execution.force_all);
    assert!(config.logging.json);
    // untouched values keep their defaults
    assert_eq!(
        config.events.channel_capacity,
        FleetConfig::default().events.channel_capacity
    );
}

#[test]
fn test_overlay_of_other_environment_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("fleet.production.toml"),
        "[scheduler]\nmax_concurrency = 2\n",
    )
    .unwrap();

    let manager = ConfigManager::load_with_overrides(
        Some(dir.path().to_path_buf()),
        "development",
        Some(HashMap::new()),
    )
    .unwrap();
    assert_eq!(
        manager.config().scheduler.max_concurrency,
        FleetConfig::default().scheduler.max_concurrency
    );
}

#[test]
fn test_invalid_values_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("fleet.toml"),
        "[scheduler]\nmax_concurrency = 0\n",
    )
    .unwrap();

    let err = ConfigManager::load_with_overrides(
        Some(dir.path().to_path_buf()),
        "test",
        Some(HashMap::new()),
    )
    .unwrap_err();
    assert!(matches!(err, ConfigurationError::InvalidValue { .. }));
}
