/// Host used when no bridge host is configured.
pub const DEFAULT_BRIDGE_HOST: &str = "localhost";

/// Port the stock `rosbridge_server` WebSocket listener binds.
pub const DEFAULT_BRIDGE_PORT: u16 = 9090;

/// Default service call timeout in milliseconds.
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;

/// Default action goal timeout in milliseconds.
pub const DEFAULT_GOAL_TIMEOUT_MS: u64 = 300_000;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default bridge host.
#[must_use]
pub const fn default_bridge_host() -> &'static str {
    DEFAULT_BRIDGE_HOST
}

/// Owned bridge host used where allocation is required (e.g. serde).
pub(crate) fn default_bridge_host_string() -> String {
    DEFAULT_BRIDGE_HOST.to_owned()
}

/// Default bridge port.
#[must_use]
pub const fn default_bridge_port() -> u16 {
    DEFAULT_BRIDGE_PORT
}

/// Default service call timeout in milliseconds.
#[must_use]
pub const fn default_call_timeout_ms() -> u64 {
    DEFAULT_CALL_TIMEOUT_MS
}

/// Default action goal timeout in milliseconds.
#[must_use]
pub const fn default_goal_timeout_ms() -> u64 {
    DEFAULT_GOAL_TIMEOUT_MS
}

/// Default log filter expression used by the binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}
