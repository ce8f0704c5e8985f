//! Shared configuration for rosbridge clients.
//!
//! Configuration is layered by [`ortho_config`]: built-in defaults, then an
//! optional configuration file, then `ROSBRIDGE_*` environment variables, and
//! finally command-line flags. Every binary in the workspace resolves the same
//! [`Config`] so the bridge endpoint, request timeouts, and logging options
//! stay consistent.

mod defaults;
mod endpoint;
mod logging;

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_BRIDGE_HOST, DEFAULT_BRIDGE_PORT, DEFAULT_CALL_TIMEOUT_MS, DEFAULT_GOAL_TIMEOUT_MS,
    DEFAULT_LOG_FILTER, default_bridge_host, default_bridge_port, default_call_timeout_ms,
    default_goal_timeout_ms, default_log_filter, default_log_filter_string, default_log_format,
};
pub use endpoint::{BridgeEndpoint, EndpointParseError};
pub use logging::LogFormat;

/// Resolved configuration shared by the library and the demo binary.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, OrthoConfig)]
#[ortho_config(prefix = "ROSBRIDGE")]
#[serde(default)]
pub struct Config {
    /// Host name or address of the rosbridge server.
    #[serde(default = "defaults::default_bridge_host_string")]
    pub host: String,
    /// TCP port of the rosbridge server.
    #[serde(default = "defaults::default_bridge_port")]
    pub port: u16,
    /// Default timeout, in milliseconds, for blocking service calls.
    #[serde(default = "defaults::default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// Default timeout, in milliseconds, for waiting on action results.
    #[serde(default = "defaults::default_goal_timeout_ms")]
    pub goal_timeout_ms: u64,
    /// Filter expression applied to structured logs.
    #[serde(default = "defaults::default_log_filter_string")]
    pub log_filter: String,
    /// Output format for structured logs.
    #[serde(default = "defaults::default_log_format")]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_bridge_host().to_owned(),
            port: default_bridge_port(),
            call_timeout_ms: default_call_timeout_ms(),
            goal_timeout_ms: default_goal_timeout_ms(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Endpoint of the bridge described by `host` and `port`.
    #[must_use]
    pub fn endpoint(&self) -> BridgeEndpoint {
        BridgeEndpoint::new(self.host.clone(), self.port)
    }

    /// Timeout applied to service calls that do not pass their own.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Timeout applied to action goals that do not pass their own.
    #[must_use]
    pub const fn goal_timeout(&self) -> Duration {
        Duration::from_millis(self.goal_timeout_ms)
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Structured log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use rstest::rstest;

    use super::*;

    #[rstest]
    fn defaults_point_at_local_bridge() {
        let config = Config::default();

        assert_eq!(config.endpoint().to_string(), "ws://localhost:9090");
        assert_eq!(config.call_timeout(), Duration::from_secs(30));
        assert_eq!(config.goal_timeout(), Duration::from_secs(300));
        assert_eq!(config.log_filter(), "info");
        assert_eq!(config.log_format(), LogFormat::Json);
    }

    #[rstest]
    fn endpoint_follows_overridden_fields() {
        let config = Config {
            host: String::from("robot.local"),
            port: 9191,
            ..Config::default()
        };

        assert_eq!(
            config.endpoint(),
            BridgeEndpoint::new("robot.local", 9191)
        );
    }

    #[rstest]
    fn loads_defaults_without_any_layer() {
        let config = Config::load_from_iter([OsString::from("rosbridge-demo")])
            .expect("configuration loads from defaults alone");

        assert_eq!(config, Config::default());
    }
}
