//! Load-balancing domain records
//!
//! Plain data-transfer types for the objects the control plane hands to the
//! engine. Field names follow the control plane's wire format so records can
//! be read straight from YAML/JSON.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Tcp,
    Http,
    Https,
}

impl Protocol {
    /// HAProxy `mode` for this protocol. HTTPS is passed through at L4.
    pub fn mode(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Http => "http",
            Protocol::Https => "tcp",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Http => write!(f, "HTTP"),
            Protocol::Https => write!(f, "HTTPS"),
        }
    }
}

/// Load balancing algorithm
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LbMethod {
    #[default]
    RoundRobin,
    LeastConnections,
    StaticRoundRobin,
    SourceIp,
}

impl LbMethod {
    /// HAProxy `balance` algorithm
    pub fn balance(&self) -> &'static str {
        match self {
            LbMethod::RoundRobin => "roundrobin",
            LbMethod::LeastConnections => "leastconn",
            LbMethod::StaticRoundRobin => "static-rr",
            LbMethod::SourceIp => "source",
        }
    }
}

impl std::fmt::Display for LbMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LbMethod::RoundRobin => write!(f, "ROUND_ROBIN"),
            LbMethod::LeastConnections => write!(f, "LEAST_CONNECTIONS"),
            LbMethod::StaticRoundRobin => write!(f, "STATIC_ROUND_ROBIN"),
            LbMethod::SourceIp => write!(f, "SOURCE_IP"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum MonitorType {
    Tcp,
    Http,
    Https,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PersistenceType {
    SourceIp,
    HttpCookie,
    AppCookie,
}

impl std::fmt::Display for PersistenceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistenceType::SourceIp => write!(f, "SOURCE_IP"),
            PersistenceType::HttpCookie => write!(f, "HTTP_COOKIE"),
            PersistenceType::AppCookie => write!(f, "APP_COOKIE"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pool {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub protocol: Protocol,
    #[serde(default)]
    pub lb_method: LbMethod,
    #[serde(default)]
    pub subnet_id: Option<String>,
    #[serde(default = "default_admin_state_up")]
    pub admin_state_up: bool,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Member {
    pub id: String,
    pub name: String,
    pub pool_id: String,
    pub address: String,
    pub port: u16,
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default = "default_admin_state_up")]
    pub admin_state_up: bool,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthMonitor {
    pub id: String,
    pub pool_id: String,
    #[serde(rename = "type")]
    pub monitor_type: MonitorType,
    /// Check interval
    pub delay: u32,
    /// Connect timeout per check
    pub timeout: u32,
    /// Failed checks before a server is marked down
    pub max_retries: u32,
    #[serde(default)]
    pub http_method: Option<String>,
    #[serde(default)]
    pub url_path: Option<String>,
    /// Single codes, `lo-hi` ranges, comma separated
    #[serde(default)]
    pub expected_codes: Option<String>,
    #[serde(default = "default_admin_state_up")]
    pub admin_state_up: bool,
}

/// Stickiness policy. A value without a type stands for "no persistence".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionPersistence {
    #[serde(rename = "type", default)]
    pub persistence_type: Option<PersistenceType>,
    #[serde(default)]
    pub cookie_name: Option<String>,
}

impl SessionPersistence {
    pub fn is_empty(&self) -> bool {
        self.persistence_type.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Vip {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_bind_address")]
    pub address: String,
    pub port: u16,
    pub protocol: Protocol,
    #[serde(default)]
    pub connection_limit: Option<i64>,
    pub pool_id: String,
    #[serde(default = "default_admin_state_up")]
    pub admin_state_up: bool,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub session_persistence: Option<SessionPersistence>,
    #[serde(default)]
    pub config_handle_id: Option<String>,
}

/// Management endpoint of a HAProxy appliance
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManagementInfo {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub instance_id: Option<String>,
}

/// Device descriptor passed with every driver call
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Device {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub subnet_id: Option<String>,
    #[serde(default)]
    pub management: Option<ManagementInfo>,
}

fn default_admin_state_up() -> bool {
    true
}

fn default_weight() -> u32 {
    1
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
