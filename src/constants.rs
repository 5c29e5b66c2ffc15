//! Constants definition module
//!
//! Centralizes paths, HAProxy fixed values and the translation tables shared
//! by the config model, the driver and the stats parser.

use std::path::PathBuf;

/// Application basic settings
pub const APP_NAME: &str = "hacfg";

/// Remote device paths
pub const REMOTE_CONFIG_PATH: &str = "/etc/haproxy/haproxy.cfg";
pub const REMOTE_STAGING_PATH: &str = "/tmp/haproxy.cfg.remote";
pub const STATS_SOCKET_PATH: &str = "/var/run/haproxy.sock";
pub const REMOTE_PID_PATH: &str = "/var/run/haproxy.pid";

/// SSH transport defaults
pub const DEFAULT_SSH_USER: &str = "root";
pub const DEFAULT_SSH_PORT: u16 = 22;
pub const DEFAULT_SSH_KEY_PATH: &str = "/root/.ssh/haproxy-keypair.pem";
pub const SSH_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Appliance instance defaults
pub const DEFAULT_FLAVOR_NAME: &str = "m1.tiny";
pub const DEFAULT_KEYPAIR: &str = "haproxy-keypair";

/// Session persistence directives (incremental path)
pub const STICK_TABLE_OPTION: &str = "stick-table type ip size 200k expire 30m";
pub const STICK_ON_SOURCE_OPTION: &str = "stick on src";
pub const COOKIE_INSERT_OPTION: &str = "cookie SRV insert indirect nocache";

/// Defaults for HTTP probes (incremental path)
pub const DEFAULT_PROBE_METHOD: &str = "GET";
pub const DEFAULT_PROBE_URI: &str = "/";
pub const DEFAULT_EXPECTED_CODES: &str = "200";

/// Health value for any check token missing from `HEALTH_MAPPING`
pub const HEALTH_UNKNOWN: &str = "UNKNOWN";

/// Output stat name -> HAProxy `show stat` column
pub const STATS_MAPPING: &[(&str, &str)] = &[
    ("status", "status"),
    ("current_connections", "qcur"),
    ("max_connections", "qmax"),
    ("current_sessions", "scur"),
    ("max_sessions", "smax"),
    ("total_sessions", "stot"),
    ("bytes_in", "bin"),
    ("bytes_out", "bout"),
    ("request_errors", "ereq"),
    ("connection_errors", "econ"),
    ("response_errors", "eresp"),
    ("retries", "wretr"),
    ("failed_checks", "chkfail"),
    ("health", "check_status"),
    ("current_requests", "req_rate"),
    ("max_requests", "req_rate_max"),
    ("total_requests", "req_tot"),
];

/// HAProxy `check_status` token -> health value
pub const HEALTH_MAPPING: &[(&str, &str)] = &[
    ("UNK", HEALTH_UNKNOWN),
    ("SOCKERR", "SOCKET_ERROR"),
    ("L4OK", "TCP_OK"),
    ("L4TOUT", "TCP_TIMEOUT"),
    ("L4CON", "TCP_ERROR"),
    ("L6OK", "SSL_OK"),
    ("L6TOUT", "SSL_TIMEOUT"),
    ("L6RSP", "SSL_ERROR"),
    ("L7OK", "L7_OK"),
    ("L7OKC", "L7_OK"),
    ("L7TOUT", "L7_TIMEOUT"),
    ("L7RSP", "L7_ERROR"),
    ("L7STS", "L7_ERROR"),
];

/// File and directory settings
pub const CONFIG_FILENAME: &str = "config.yaml";

/// Settings file priority (higher = more priority)
/// 1. Path specified via CLI argument
/// 2. $HOME/.hacfg/config.yaml
/// 3. /etc/hacfg/config.yaml
pub fn get_home_config_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".hacfg").join(CONFIG_FILENAME))
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILENAME))
}

pub fn get_system_config_path() -> PathBuf {
    PathBuf::from("/etc").join(APP_NAME).join(CONFIG_FILENAME)
}
