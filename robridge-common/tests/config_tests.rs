//! Tests for TOML config loading and config file resolution
//!
//! Tests that touch ROBRIDGE_CONFIG are marked #[serial] so they do not race
//! on the process environment.

use robridge_common::config::{
    load_toml_config, parse_toml_config, resolve_config_path, AiPolicy, TomlConfig,
    CONFIG_ENV_VAR,
};
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let path = PathBuf::from("/nonexistent/robridge/config.toml");
    let config = load_toml_config(Some(&path)).unwrap();
    assert_eq!(config, TomlConfig::default());
}

#[test]
fn test_no_path_falls_back_to_defaults() {
    let config = load_toml_config(None).unwrap();
    assert_eq!(config.host, "0.0.0.0");
    assert_eq!(config.port, 3001);
    assert_eq!(config.environment, "development");
}

#[test]
fn test_full_file_is_loaded() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
host = "127.0.0.1"
port = 4000
database_url = "sqlite::memory:"
environment = "production"
event_bus_capacity = 16

[ai]
server_url = "http://localhost:9000"
timeout_secs = 3
policy = "capability"

[scans]
device_stale_secs = 30
saved_dedup_window_secs = 120

[logging]
level = "debug"
"#
    )
    .unwrap();

    let config = load_toml_config(Some(file.path())).unwrap();
    assert_eq!(config.host, "127.0.0.1");
    assert_eq!(config.port, 4000);
    assert_eq!(config.database_url, "sqlite::memory:");
    assert_eq!(config.environment, "production");
    assert_eq!(config.event_bus_capacity, 16);
    assert_eq!(config.ai.server_url, "http://localhost:9000");
    assert_eq!(config.ai.timeout_secs, 3);
    assert_eq!(config.ai.policy, AiPolicy::Capability);
    assert_eq!(config.scans.device_stale_secs, 30);
    assert_eq!(config.scans.saved_dedup_window_secs, 120);
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_partial_sections_keep_other_defaults() {
    let config = parse_toml_config(
        r#"
port = 8080

[ai]
timeout_secs = 5
"#,
    )
    .unwrap();

    assert_eq!(config.port, 8080);
    assert_eq!(config.ai.timeout_secs, 5);
    assert_eq!(config.ai.server_url, "https://robridgeaiserver.onrender.com");
    assert_eq!(config.ai.policy, AiPolicy::Always);
    assert_eq!(config.scans.device_stale_secs, 60);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_malformed_file_is_an_error() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "port = \"not a number\"").unwrap();

    let result = load_toml_config(Some(file.path()));
    assert!(result.is_err());
}

#[test]
fn test_unknown_policy_is_an_error() {
    let result = parse_toml_config("[ai]\npolicy = \"never\"\n");
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_cli_path_wins_over_env() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");

    let resolved = resolve_config_path(Some(Path::new("/tmp/from-cli.toml")));
    assert_eq!(resolved, Some(PathBuf::from("/tmp/from-cli.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_env_path_used_without_cli() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");

    let resolved = resolve_config_path(None);
    assert_eq!(resolved, Some(PathBuf::from("/tmp/from-env.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_platform_default_without_overrides() {
    env::remove_var(CONFIG_ENV_VAR);

    let resolved = resolve_config_path(None);
    assert_eq!(resolved, robridge_common::config::default_config_path());
}
