//! Resolved hub configuration
//!
//! Command-line arguments and environment variables (both parsed by clap in
//! `main.rs`) override the TOML file, which overrides built-in defaults.

use robridge_common::config::{AiPolicy, TomlConfig};
use std::time::Duration;

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database_url: Option<String>,
    pub ai_server_url: Option<String>,
    pub ai_policy: Option<AiPolicy>,
    pub environment: Option<String>,
}

/// Settings the hub runs with
#[derive(Debug, Clone, PartialEq)]
pub struct HubConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub environment: String,
    pub event_bus_capacity: usize,
    pub ai_server_url: String,
    pub ai_timeout: Duration,
    pub ai_policy: AiPolicy,
    pub device_stale_after: Duration,
    pub saved_dedup_window: Duration,
    pub log_level: String,
}

impl HubConfig {
    pub fn resolve(toml: TomlConfig, overrides: Overrides) -> Self {
        Self {
            host: overrides.host.unwrap_or(toml.host),
            port: overrides.port.unwrap_or(toml.port),
            database_url: overrides.database_url.unwrap_or(toml.database_url),
            environment: overrides.environment.unwrap_or(toml.environment),
            // A zero-capacity broadcast channel panics on creation
            event_bus_capacity: toml.event_bus_capacity.max(1),
            ai_server_url: overrides.ai_server_url.unwrap_or(toml.ai.server_url),
            ai_timeout: Duration::from_secs(toml.ai.timeout_secs),
            ai_policy: overrides.ai_policy.unwrap_or(toml.ai.policy),
            device_stale_after: Duration::from_secs(toml.scans.device_stale_secs),
            saved_dedup_window: Duration::from_secs(toml.scans.saved_dedup_window_secs),
            log_level: toml.logging.level,
        }
    }

    /// Development mode adds error details to 500 responses
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self::resolve(TomlConfig::default(), Overrides::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HubConfig::default();
        assert_eq!(config.bind_address(), "0.0.0.0:3001");
        assert_eq!(config.ai_timeout, Duration::from_secs(15));
        assert_eq!(config.device_stale_after, Duration::from_secs(60));
        assert_eq!(config.saved_dedup_window, Duration::from_secs(300));
        assert_eq!(config.ai_policy, AiPolicy::Always);
        assert!(config.is_development());
    }

    #[test]
    fn test_overrides_win_over_toml() {
        let mut toml = TomlConfig::default();
        toml.port = 4000;
        toml.database_url = "sqlite://from-toml.db".to_string();
        toml.ai.policy = AiPolicy::Capability;

        let config = HubConfig::resolve(
            toml,
            Overrides {
                port: Some(5000),
                ai_policy: Some(AiPolicy::Always),
                environment: Some("production".to_string()),
                ..Default::default()
            },
        );

        assert_eq!(config.port, 5000);
        assert_eq!(config.database_url, "sqlite://from-toml.db");
        assert_eq!(config.ai_policy, AiPolicy::Always);
        assert!(!config.is_development());
    }

    #[test]
    fn test_zero_bus_capacity_clamped() {
        let mut toml = TomlConfig::default();
        toml.event_bus_capacity = 0;
        assert_eq!(HubConfig::resolve(toml, Overrides::default()).event_bus_capacity, 1);
    }
}
